mod signal;

pub use signal::{CandidateInit, IceServerConfig, SignalMessage};
