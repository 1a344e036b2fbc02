pub mod framing;
pub mod model;

pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use model::{CandidateInit, IceServerConfig, SignalMessage};
