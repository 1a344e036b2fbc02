use async_trait::async_trait;
use bytes::Bytes;
use periscope_core::CandidateInit;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport setup failed: {0}")]
    Setup(String),

    #[error("session description rejected: {0}")]
    Description(String),

    #[error("candidate rejected: {0}")]
    Candidate(String),

    #[error("data channel closed")]
    ChannelClosed,
}

/// The open data channel of a negotiated link. Sends are fire-and-forget;
/// no acknowledgement is awaited.
#[async_trait]
pub trait FrameChannel: Send + Sync {
    async fn send(&self, frame: Bytes) -> Result<(), LinkError>;
}

/// Events emitted by a peer link provider, delivered to the negotiation
/// session through a single queue.
pub enum LinkEvent {
    /// A local connectivity candidate was discovered and should be relayed.
    LocalCandidate(CandidateInit),
    /// The data channel is open and ready for frames.
    ChannelOpen(Arc<dyn FrameChannel>),
    /// One complete inbound frame arrived on the data channel.
    FrameReceived(Bytes),
    /// The underlying transport is gone.
    Disconnected,
}

/// External capability that performs connectivity establishment given
/// exchanged descriptions and candidates. The session never looks past
/// these operations into transport internals.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Generate a local offer and install it as the local description.
    async fn create_offer(&self) -> Result<String, LinkError>;

    /// Generate a local answer and install it as the local description.
    async fn create_answer(&self) -> Result<String, LinkError>;

    async fn set_remote_offer(&self, sdp: String) -> Result<(), LinkError>;

    async fn set_remote_answer(&self, sdp: String) -> Result<(), LinkError>;

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), LinkError>;

    /// Release transport resources. Idempotent.
    async fn close(&self) -> Result<(), LinkError>;
}
