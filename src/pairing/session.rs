//! Sender and viewer pairing sessions
//!
//! Two single-use state machines sharing one negotiation protocol.
//! Descriptors travel out-of-band (copy/paste); `Connected` and `Failed`
//! are observational transitions driven by the transport.

use super::transport::{ConnectionState, PeerConnection, PeerTransport, TrackKind};
use super::GATHERING_TIMEOUT;
use crate::source::{MediaSource, Stream, StreamConstraints};
use crate::utils::error::{AppError, AppResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Sender role lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SenderState {
    Idle,
    OfferGenerated,
    AnswerApplied,
    Connected,
    Failed,
}

/// Viewer role lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewerState {
    Idle,
    AnswerGenerated,
    Connected,
    Failed,
}

/// Wait out candidate gathering, bounded by the pairing timeout.
///
/// On timeout we proceed with whatever candidates are known, trading
/// connection robustness for responsiveness.
async fn await_gathering(conn: &Arc<dyn PeerConnection>) {
    if tokio::time::timeout(GATHERING_TIMEOUT, conn.wait_gathering_complete())
        .await
        .is_err()
    {
        tracing::warn!("candidate gathering timed out, proceeding with partial candidates");
    }
}

fn spawn_sender_watcher(
    conn: &Arc<dyn PeerConnection>,
    state: Arc<RwLock<SenderState>>,
) -> JoinHandle<()> {
    let mut states = conn.connection_states();
    tokio::spawn(async move {
        // Inspect the latest value before waiting: a transition that landed
        // during negotiation would otherwise never wake `changed()`.
        loop {
            let observed = *states.borrow_and_update();
            {
                let mut current = state.write();
                match observed {
                    ConnectionState::Connected
                        if matches!(
                            *current,
                            SenderState::OfferGenerated | SenderState::AnswerApplied
                        ) =>
                    {
                        tracing::info!("sender connection established");
                        *current = SenderState::Connected;
                    }
                    ConnectionState::Failed if *current != SenderState::Failed => {
                        tracing::warn!("sender connection failed");
                        *current = SenderState::Failed;
                    }
                    _ => {}
                }
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Sender side of the pairing handshake.
///
/// `Idle -> OfferGenerated -> AnswerApplied -> Connected | Failed`.
pub struct SenderSession {
    conn: Arc<dyn PeerConnection>,
    media: Arc<dyn MediaSource>,
    stream: Stream,
    offer: String,
    state: Arc<RwLock<SenderState>>,
    watcher: JoinHandle<()>,
}

impl SenderSession {
    /// Acquire a local stream, negotiate an offer, and expose it for
    /// manual transfer.
    pub async fn start(
        transport: &dyn PeerTransport,
        media: Arc<dyn MediaSource>,
        constraints: &StreamConstraints,
    ) -> AppResult<Self> {
        let stream = media
            .acquire(constraints)
            .await
            .map_err(|e| AppError::DeviceUnavailable(e.to_string()))?;

        let conn: Arc<dyn PeerConnection> = Arc::from(transport.create_connection());
        let result = Self::negotiate_offer(&conn, &stream).await;
        let offer = match result {
            Ok(offer) => offer,
            Err(err) => {
                conn.close().await;
                media.release(&stream).await;
                return Err(err);
            }
        };

        let state = Arc::new(RwLock::new(SenderState::OfferGenerated));
        let watcher = spawn_sender_watcher(&conn, state.clone());
        tracing::info!(stream = %stream.id, "sender offer ready for transfer");

        Ok(Self {
            conn,
            media,
            stream,
            offer,
            state,
            watcher,
        })
    }

    async fn negotiate_offer(
        conn: &Arc<dyn PeerConnection>,
        stream: &Stream,
    ) -> AppResult<String> {
        conn.add_stream(stream)
            .await
            .map_err(|e| AppError::TransportFailure(e.to_string()))?;
        let offer = conn
            .create_offer()
            .await
            .map_err(|e| AppError::TransportFailure(e.to_string()))?;
        conn.set_local_description(&offer)
            .await
            .map_err(|e| AppError::TransportFailure(e.to_string()))?;
        await_gathering(conn).await;
        Ok(conn.local_description().unwrap_or(offer))
    }

    /// Serialized offer for manual transfer to the viewer.
    pub fn offer(&self) -> &str {
        &self.offer
    }

    pub fn state(&self) -> SenderState {
        *self.state.read()
    }

    /// Apply the viewer's answer descriptor.
    ///
    /// Requires a prior offer; an empty or unparseable answer is reported
    /// without mutating session state.
    pub async fn apply_answer(&self, descriptor: &str) -> AppResult<()> {
        if *self.state.read() != SenderState::OfferGenerated {
            return Err(AppError::SessionState(
                "no pending offer to answer".to_string(),
            ));
        }
        if descriptor.trim().is_empty() {
            return Err(AppError::SessionState("answer text required".to_string()));
        }

        self.conn
            .set_remote_description(descriptor)
            .await
            .map_err(|e| AppError::SessionState(format!("could not parse answer ({e})")))?;

        *self.state.write() = SenderState::AnswerApplied;
        tracing::info!("viewer answer applied");
        Ok(())
    }

    /// Tear the session down and release the local stream.
    pub async fn close(self) {
        self.watcher.abort();
        self.conn.close().await;
        self.media.release(&self.stream).await;
        tracing::debug!("sender session closed");
    }
}

/// Viewer side of the pairing handshake.
///
/// `Idle -> AnswerGenerated -> Connected | Failed`.
pub struct ViewerSession {
    conn: Arc<dyn PeerConnection>,
    answer: String,
    state: Arc<RwLock<ViewerState>>,
    remote_stream: Arc<RwLock<Option<Stream>>>,
    watcher: JoinHandle<()>,
    composer: JoinHandle<()>,
}

impl ViewerSession {
    /// Apply the sender's offer and produce the answer descriptor.
    pub async fn build_answer(transport: &dyn PeerTransport, offer: &str) -> AppResult<Self> {
        if offer.trim().is_empty() {
            return Err(AppError::SessionState("offer text required".to_string()));
        }

        let conn: Arc<dyn PeerConnection> = Arc::from(transport.create_connection());
        let answer = match Self::negotiate_answer(&conn, offer).await {
            Ok(answer) => answer,
            Err(err) => {
                conn.close().await;
                return Err(err);
            }
        };

        let state = Arc::new(RwLock::new(ViewerState::AnswerGenerated));
        let remote_stream = Arc::new(RwLock::new(None));
        let watcher = Self::spawn_watcher(&conn, state.clone());
        let composer = Self::spawn_composer(&conn, remote_stream.clone());
        tracing::info!("viewer answer ready for transfer");

        Ok(Self {
            conn,
            answer,
            state,
            remote_stream,
            watcher,
            composer,
        })
    }

    async fn negotiate_answer(conn: &Arc<dyn PeerConnection>, offer: &str) -> AppResult<String> {
        conn.set_remote_description(offer)
            .await
            .map_err(|e| AppError::SessionState(format!("could not parse offer ({e})")))?;
        let answer = conn
            .create_answer()
            .await
            .map_err(|e| AppError::TransportFailure(e.to_string()))?;
        conn.set_local_description(&answer)
            .await
            .map_err(|e| AppError::TransportFailure(e.to_string()))?;
        await_gathering(conn).await;
        Ok(conn.local_description().unwrap_or(answer))
    }

    fn spawn_watcher(
        conn: &Arc<dyn PeerConnection>,
        state: Arc<RwLock<ViewerState>>,
    ) -> JoinHandle<()> {
        let mut states = conn.connection_states();
        tokio::spawn(async move {
            // Latest value first, as in the sender watcher.
            loop {
                let observed = *states.borrow_and_update();
                {
                    let mut current = state.write();
                    match observed {
                        ConnectionState::Connected if *current == ViewerState::AnswerGenerated => {
                            tracing::info!("viewer connection established");
                            *current = ViewerState::Connected;
                        }
                        ConnectionState::Failed if *current != ViewerState::Failed => {
                            tracing::warn!("viewer connection failed");
                            *current = ViewerState::Failed;
                        }
                        _ => {}
                    }
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Compose arriving remote tracks into a displayable stream; the first
    /// video track starts live view.
    fn spawn_composer(
        conn: &Arc<dyn PeerConnection>,
        remote_stream: Arc<RwLock<Option<Stream>>>,
    ) -> JoinHandle<()> {
        let mut tracks = conn.take_remote_tracks();
        tokio::spawn(async move {
            let Some(tracks) = tracks.as_mut() else {
                return;
            };
            while let Some(track) = tracks.recv().await {
                let mut composed = remote_stream.write();
                match (&mut *composed, track.kind) {
                    (None, TrackKind::Video) => {
                        tracing::info!(track = %track.id, "remote video arrived, entering live view");
                        *composed = Some(Stream::remote(format!("remote:{}", track.id)));
                    }
                    (Some(stream), TrackKind::Audio) => {
                        stream.has_audio = true;
                    }
                    _ => {
                        tracing::debug!(track = %track.id, "additional remote track ignored");
                    }
                }
            }
        })
    }

    /// Serialized answer for manual transfer back to the sender.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn state(&self) -> ViewerState {
        *self.state.read()
    }

    /// The composed remote stream, once remote video has arrived. Usable
    /// in place of a local camera as a monitor source.
    pub fn remote_stream(&self) -> Option<Stream> {
        self.remote_stream.read().clone()
    }

    pub async fn close(self) {
        self.watcher.abort();
        self.composer.abort();
        self.conn.close().await;
        tracing::debug!("viewer session closed");
    }
}
