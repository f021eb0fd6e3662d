//! Peer transport contract
//!
//! The connection-negotiation surface the pairing sessions drive. The
//! descriptor text exchanged out-of-band is opaque here; its format is
//! owned by the transport implementation.

use crate::source::Stream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

/// Underlying connection state, reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connected,
    Failed,
}

/// Kind of media carried by a remote track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A media track arriving from the remote peer.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// One peer connection under negotiation.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Attach a local stream's tracks for sending.
    async fn add_stream(&self, stream: &Stream) -> anyhow::Result<()>;

    async fn create_offer(&self) -> anyhow::Result<String>;

    async fn create_answer(&self) -> anyhow::Result<String>;

    async fn set_local_description(&self, descriptor: &str) -> anyhow::Result<()>;

    /// Apply the remote peer's descriptor. Parse failures are errors and
    /// must leave the connection untouched.
    async fn set_remote_description(&self, descriptor: &str) -> anyhow::Result<()>;

    /// Local descriptor including any candidates gathered so far.
    fn local_description(&self) -> Option<String>;

    /// Resolves when candidate gathering reaches completion.
    async fn wait_gathering_complete(&self);

    /// Connection-state notifications.
    fn connection_states(&self) -> watch::Receiver<ConnectionState>;

    /// Incoming-track events; yields `None` once taken by a prior caller.
    fn take_remote_tracks(&self) -> Option<mpsc::UnboundedReceiver<RemoteTrack>>;

    async fn close(&self);
}

/// Connection factory.
pub trait PeerTransport: Send + Sync {
    fn create_connection(&self) -> Box<dyn PeerConnection>;
}
