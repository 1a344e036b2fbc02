//! Peer-side negotiation: drives one peer link from relayed offer/answer/
//! candidate messages to an open data channel, then moves frames over it.

pub mod link;
pub mod session;
pub mod signaling;
pub mod sink;
pub mod source;
pub mod streamer;
mod webrtc_link;

pub use link::{FrameChannel, LinkError, LinkEvent, PeerLink};
pub use session::{ChannelRole, NegotiationSession, Phase, Role, SessionError, StatusFn};
pub use signaling::SignalingClient;
pub use sink::{CallbackSink, DirSink, FrameSink};
pub use source::{FrameSource, SourceError, TcpFrameSource, TestCardSource, pump_frames};
pub use webrtc_link::WebRtcLink;
