//! Remote pairing
//!
//! A two-peer signaling handshake establishing a remote video link in
//! place of local camera access. Descriptors are exchanged manually; the
//! manager enforces single-use, non-stacked sessions per role.

pub mod session;
pub mod transport;

pub use session::{SenderSession, SenderState, ViewerSession, ViewerState};
pub use transport::{ConnectionState, PeerConnection, PeerTransport, RemoteTrack, TrackKind};

use crate::source::{MediaSource, Stream, StreamConstraints};
use crate::utils::error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Bound on candidate gathering before proceeding with partial candidates.
pub const GATHERING_TIMEOUT: Duration = Duration::from_secs(3);

/// Owns at most one live session per role.
///
/// Starting a new session while one exists closes the prior one first;
/// sessions are never stacked or queued.
pub struct PairingManager {
    transport: Arc<dyn PeerTransport>,
    media: Arc<dyn MediaSource>,
    sender: Mutex<Option<SenderSession>>,
    viewer: Mutex<Option<ViewerSession>>,
}

impl PairingManager {
    pub fn new(transport: Arc<dyn PeerTransport>, media: Arc<dyn MediaSource>) -> Self {
        Self {
            transport,
            media,
            sender: Mutex::new(None),
            viewer: Mutex::new(None),
        }
    }

    /// Start a sender session and return the offer descriptor.
    pub async fn start_sender(&self, constraints: &StreamConstraints) -> AppResult<String> {
        let mut slot = self.sender.lock().await;
        if let Some(prior) = slot.take() {
            tracing::debug!("closing prior sender session");
            prior.close().await;
        }

        let session =
            SenderSession::start(self.transport.as_ref(), self.media.clone(), constraints).await?;
        let offer = session.offer().to_string();
        *slot = Some(session);
        Ok(offer)
    }

    /// Apply the viewer's answer to the live sender session.
    pub async fn apply_answer(&self, descriptor: &str) -> AppResult<()> {
        let slot = self.sender.lock().await;
        match slot.as_ref() {
            Some(session) => session.apply_answer(descriptor).await,
            None => Err(AppError::SessionState(
                "no sender session to answer".to_string(),
            )),
        }
    }

    /// Start a viewer session from an offer and return the answer descriptor.
    pub async fn build_answer(&self, offer: &str) -> AppResult<String> {
        let mut slot = self.viewer.lock().await;
        if let Some(prior) = slot.take() {
            tracing::debug!("closing prior viewer session");
            prior.close().await;
        }

        let session = ViewerSession::build_answer(self.transport.as_ref(), offer).await?;
        let answer = session.answer().to_string();
        *slot = Some(session);
        Ok(answer)
    }

    pub async fn sender_state(&self) -> Option<SenderState> {
        self.sender.lock().await.as_ref().map(|s| s.state())
    }

    pub async fn viewer_state(&self) -> Option<ViewerState> {
        self.viewer.lock().await.as_ref().map(|s| s.state())
    }

    /// The viewer's composed remote stream, once live.
    pub async fn remote_stream(&self) -> Option<Stream> {
        self.viewer
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.remote_stream())
    }

    /// Close both roles' sessions, if any.
    pub async fn close_all(&self) {
        if let Some(session) = self.sender.lock().await.take() {
            session.close().await;
        }
        if let Some(session) = self.viewer.lock().await.take() {
            session.close().await;
        }
    }
}
