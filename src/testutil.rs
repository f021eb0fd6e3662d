//! In-memory fakes for the collaborator contracts.
//!
//! Deterministic stand-ins for the device, recorder, audio, playback, and
//! transport layers, driven by tokio's paused clock in tests.

use crate::impact::{AudioLevelProbe, LevelProbe};
use crate::pairing::transport::{ConnectionState, PeerConnection, PeerTransport, RemoteTrack};
use crate::replay::{PlaybackSurface, ReplayRate};
use crate::source::{
    MediaSource, RecorderFactory, Segment, SegmentRecorder, Side, Stream, StreamConstraints,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Advance the paused clock in small steps so timer-driven producers fire
/// in sequence. A single large jump wakes each pending timer exactly once
/// at the post-jump instant, which starves interval-style loops.
pub async fn advance_in_steps(total: Duration, step: Duration) {
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        tokio::time::advance(step).await;
        elapsed += step;
    }
}

// ---------------------------------------------------------------------------
// Media source

pub struct FakeMediaSource {
    fail_devices: Mutex<HashSet<String>>,
    acquired: Mutex<Vec<Stream>>,
    released: Mutex<Vec<Uuid>>,
}

impl FakeMediaSource {
    pub fn new() -> Self {
        Self {
            fail_devices: Mutex::new(HashSet::new()),
            acquired: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Make acquisition fail for a specific device ID.
    pub fn fail_device(&self, device_id: &str) {
        self.fail_devices.lock().insert(device_id.to_string());
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.lock().len()
    }

    pub fn released_count(&self) -> usize {
        self.released.lock().len()
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn acquire(&self, constraints: &StreamConstraints) -> anyhow::Result<Stream> {
        let label = constraints
            .device_id
            .clone()
            .unwrap_or_else(|| "camera".to_string());
        if self.fail_devices.lock().contains(&label) {
            anyhow::bail!("device {label} unavailable");
        }
        let stream = Stream::local(label);
        self.acquired.lock().push(stream.clone());
        Ok(stream)
    }

    async fn release(&self, stream: &Stream) {
        self.released.lock().push(stream.id);
    }
}

// ---------------------------------------------------------------------------
// Recorders

/// Continuous recorder fake: emits `label:instance:seq;` every slice
/// interval and a `label:instance:tail;` final flush on stop. Silence is
/// controlled per label, re-checked on every emission.
pub struct FakeRecorderFactory {
    silent_labels: Arc<Mutex<HashSet<String>>>,
    opened: AtomicUsize,
    unsupported: AtomicBool,
}

impl FakeRecorderFactory {
    pub fn new() -> Self {
        Self {
            silent_labels: Arc::new(Mutex::new(HashSet::new())),
            opened: AtomicUsize::new(0),
            unsupported: AtomicBool::new(false),
        }
    }

    /// Recorders on streams with this label stop producing data.
    pub fn set_silent_label(&self, label: &str) {
        self.silent_labels.lock().insert(label.to_string());
    }

    pub fn set_unsupported(&self, unsupported: bool) {
        self.unsupported.store(unsupported, Ordering::Release);
    }

    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }
}

impl RecorderFactory for FakeRecorderFactory {
    fn choose_supported(&self, priorities: &[String]) -> Option<String> {
        if self.unsupported.load(Ordering::Acquire) {
            None
        } else {
            priorities.first().cloned()
        }
    }

    fn open(&self, stream: &Stream, _mime: &str) -> Box<dyn SegmentRecorder> {
        let instance = self.opened.fetch_add(1, Ordering::AcqRel);
        Box::new(FakeRecorder {
            label: stream.label.clone(),
            instance,
            silent_labels: self.silent_labels.clone(),
            stop_tx: None,
            done_rx: None,
        })
    }
}

pub struct FakeRecorder {
    label: String,
    instance: usize,
    silent_labels: Arc<Mutex<HashSet<String>>>,
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl SegmentRecorder for FakeRecorder {
    async fn start(
        &mut self,
        slice_interval: Duration,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<Segment>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);

        let label = self.label.clone();
        let instance = self.instance;
        let silent_labels = self.silent_labels.clone();
        tokio::spawn(async move {
            let silent = |labels: &Arc<Mutex<HashSet<String>>>| labels.lock().contains(&label);
            let mut seq = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(slice_interval) => {
                        if !silent(&silent_labels) {
                            let payload = format!("{label}:{instance}:{seq};").into_bytes();
                            let _ = tx.send(Segment::new(payload));
                        }
                        seq += 1;
                    }
                }
            }
            // Final flush: one trailing partial segment.
            if !silent(&silent_labels) {
                let payload = format!("{label}:{instance}:tail;").into_bytes();
                let _ = tx.send(Segment::new(payload));
            }
            drop(tx);
            let _ = done_tx.send(());
        });
        Ok(rx)
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        // Resolves only after the final flush has been delivered.
        if let Some(done) = self.done_rx.take() {
            let _ = done.await;
        }
        Ok(())
    }
}

/// Recorder fake that plays back an exact payload script, one segment per
/// slice interval, with no tail. Used for byte-level concatenation checks.
pub struct ScriptedRecorderFactory {
    script: Vec<Vec<u8>>,
}

impl ScriptedRecorderFactory {
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self { script }
    }
}

impl RecorderFactory for ScriptedRecorderFactory {
    fn choose_supported(&self, priorities: &[String]) -> Option<String> {
        priorities.first().cloned()
    }

    fn open(&self, _stream: &Stream, _mime: &str) -> Box<dyn SegmentRecorder> {
        Box::new(ScriptedRecorder {
            script: self.script.clone(),
            stop_tx: None,
            done_rx: None,
        })
    }
}

pub struct ScriptedRecorder {
    script: Vec<Vec<u8>>,
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl SegmentRecorder for ScriptedRecorder {
    async fn start(
        &mut self,
        slice_interval: Duration,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<Segment>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);

        let script = std::mem::take(&mut self.script);
        tokio::spawn(async move {
            for payload in script {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(slice_interval) => {
                        let _ = tx.send(Segment::new(payload));
                    }
                }
            }
            drop(tx);
            let _ = done_tx.send(());
        });
        Ok(rx)
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(done) = self.done_rx.take() {
            let _ = done.await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audio probe

pub struct FakeProbeSource {
    level: Arc<AtomicU8>,
    fail_next: AtomicBool,
    live: Arc<AtomicUsize>,
}

impl FakeProbeSource {
    pub fn new() -> Self {
        Self {
            level: Arc::new(AtomicU8::new(0)),
            fail_next: AtomicBool::new(false),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Uniform frequency-bin magnitude reported by live probes.
    pub fn set_level(&self, level: u8) {
        self.level.store(level, Ordering::Release);
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Release);
    }

    /// Probes acquired and not yet dropped.
    pub fn live_probes(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AudioLevelProbe for FakeProbeSource {
    async fn acquire(&self) -> anyhow::Result<Box<dyn LevelProbe>> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            anyhow::bail!("microphone unavailable");
        }
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(FakeLevelProbe {
            level: self.level.clone(),
            live: self.live.clone(),
        }))
    }
}

struct FakeLevelProbe {
    level: Arc<AtomicU8>,
    live: Arc<AtomicUsize>,
}

impl LevelProbe for FakeLevelProbe {
    fn frequency_bins(&mut self) -> Vec<u8> {
        vec![self.level.load(Ordering::Acquire); 32]
    }
}

impl Drop for FakeLevelProbe {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// Playback surface

pub struct RecordingSurface {
    plays: Mutex<Vec<(Side, ReplayRate)>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            plays: Mutex::new(Vec::new()),
        }
    }

    pub fn plays(&self) -> Vec<(Side, ReplayRate)> {
        self.plays.lock().clone()
    }
}

impl PlaybackSurface for RecordingSurface {
    fn present(&self, side: Side, _clip: &crate::capture::Clip, rate: ReplayRate) {
        self.plays.lock().push((side, rate));
    }
}

// ---------------------------------------------------------------------------
// Peer transport

struct FakeConnInner {
    local: Mutex<Option<String>>,
    remote: Mutex<Option<String>>,
    state_tx: watch::Sender<ConnectionState>,
    tracks_tx: mpsc::UnboundedSender<RemoteTrack>,
    tracks_rx: Mutex<Option<mpsc::UnboundedReceiver<RemoteTrack>>>,
    closed: AtomicBool,
}

/// In-memory peer connection; descriptors are small JSON blobs so parse
/// failures behave like the real transport's.
#[derive(Clone)]
pub struct FakeConnection {
    inner: Arc<FakeConnInner>,
}

impl FakeConnection {
    fn new(initial: ConnectionState) -> Self {
        let (state_tx, _) = watch::channel(initial);
        let (tracks_tx, tracks_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(FakeConnInner {
                local: Mutex::new(None),
                remote: Mutex::new(None),
                state_tx,
                tracks_tx,
                tracks_rx: Mutex::new(Some(tracks_rx)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        let _ = self.inner.state_tx.send(state);
    }

    pub fn push_track(&self, track: RemoteTrack) {
        let _ = self.inner.tracks_tx.send(track);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

fn descriptor(kind: &str) -> String {
    serde_json::json!({
        "type": kind,
        "sdp": "v=0 fake",
        "session": Uuid::new_v4(),
    })
    .to_string()
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn add_stream(&self, _stream: &Stream) -> anyhow::Result<()> {
        Ok(())
    }

    async fn create_offer(&self) -> anyhow::Result<String> {
        Ok(descriptor("offer"))
    }

    async fn create_answer(&self) -> anyhow::Result<String> {
        if self.inner.remote.lock().is_none() {
            anyhow::bail!("no remote offer applied");
        }
        Ok(descriptor("answer"))
    }

    async fn set_local_description(&self, descriptor: &str) -> anyhow::Result<()> {
        *self.inner.local.lock() = Some(descriptor.to_string());
        Ok(())
    }

    async fn set_remote_description(&self, descriptor: &str) -> anyhow::Result<()> {
        let parsed: serde_json::Value = serde_json::from_str(descriptor)?;
        if parsed.get("type").is_none() {
            anyhow::bail!("descriptor missing type");
        }
        *self.inner.remote.lock() = Some(descriptor.to_string());
        Ok(())
    }

    fn local_description(&self) -> Option<String> {
        self.inner.local.lock().clone()
    }

    async fn wait_gathering_complete(&self) {
        // Candidates gather instantly in-memory.
    }

    fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    fn take_remote_tracks(&self) -> Option<mpsc::UnboundedReceiver<RemoteTrack>> {
        self.inner.tracks_rx.lock().take()
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

pub struct FakeTransport {
    created: Mutex<Vec<FakeConnection>>,
    initial_state: Mutex<ConnectionState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            initial_state: Mutex::new(ConnectionState::New),
        }
    }

    /// New connections start in this state, as if the link raced ahead of
    /// the session's negotiation steps.
    pub fn set_initial_state(&self, state: ConnectionState) {
        *self.initial_state.lock() = state;
    }

    /// Connection handles in creation order.
    pub fn connection(&self, index: usize) -> FakeConnection {
        self.created.lock()[index].clone()
    }
}

impl PeerTransport for FakeTransport {
    fn create_connection(&self) -> Box<dyn PeerConnection> {
        let conn = FakeConnection::new(*self.initial_state.lock());
        self.created.lock().push(conn.clone());
        Box::new(conn)
    }
}
