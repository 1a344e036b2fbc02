#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use periscope_core::{CandidateInit, SignalMessage};
use periscope_peer::{
    ChannelRole, FrameChannel, FrameSource, LinkError, LinkEvent, NegotiationSession, PeerLink,
    Phase, Role, SessionError, SourceError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Level;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    CreateOffer,
    CreateAnswer,
    SetRemoteOffer(String),
    SetRemoteAnswer(String),
    AddCandidate(CandidateInit),
    Close,
}

/// Peer link provider that records every call and returns canned SDPs.
#[derive(Default)]
pub struct MockPeerLink {
    calls: Mutex<Vec<LinkCall>>,
    pub fail_remote_description: AtomicBool,
    pub fail_candidates: AtomicBool,
}

impl MockPeerLink {
    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn applied_candidates(&self) -> Vec<CandidateInit> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LinkCall::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: LinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PeerLink for MockPeerLink {
    async fn create_offer(&self) -> Result<String, LinkError> {
        self.record(LinkCall::CreateOffer);
        Ok("v=0 mock-offer".into())
    }

    async fn create_answer(&self) -> Result<String, LinkError> {
        self.record(LinkCall::CreateAnswer);
        Ok("v=0 mock-answer".into())
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<(), LinkError> {
        self.record(LinkCall::SetRemoteOffer(sdp));
        if self.fail_remote_description.load(Ordering::Relaxed) {
            return Err(LinkError::Description("mock rejects description".into()));
        }
        Ok(())
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<(), LinkError> {
        self.record(LinkCall::SetRemoteAnswer(sdp));
        if self.fail_remote_description.load(Ordering::Relaxed) {
            return Err(LinkError::Description("mock rejects description".into()));
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), LinkError> {
        self.record(LinkCall::AddCandidate(candidate));
        if self.fail_candidates.load(Ordering::Relaxed) {
            return Err(LinkError::Candidate("mock rejects candidate".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.record(LinkCall::Close);
        Ok(())
    }
}

/// Data channel that records sent frames with virtual-clock timestamps.
#[derive(Default)]
pub struct MockFrameChannel {
    pub sent: Mutex<Vec<(tokio::time::Instant, Bytes)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl FrameChannel for MockFrameChannel {
    async fn send(&self, frame: Bytes) -> Result<(), LinkError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(LinkError::ChannelClosed);
        }
        self.sent
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), frame));
        Ok(())
    }
}

/// Frame source that fails a scripted number of times, then produces
/// numbered frames.
pub struct ScriptedSource {
    failures_remaining: u32,
    produced: u32,
}

impl ScriptedSource {
    pub fn ok() -> Self {
        Self::failing(0)
    }

    pub fn failing(times: u32) -> Self {
        Self {
            failures_remaining: times,
            produced: 0,
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Bytes, SourceError> {
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(SourceError::Encode("scripted capture failure".into()));
        }
        self.produced += 1;
        Ok(Bytes::from(format!("frame-{}", self.produced)))
    }
}

/// A spawned session plus every handle a test needs to drive and observe it.
pub struct TestSession {
    pub link: Arc<MockPeerLink>,
    /// Inject link events (channel open, inbound frames, local candidates).
    pub link_tx: mpsc::Sender<LinkEvent>,
    /// Inject messages "arriving from the relay".
    pub signal_in: mpsc::Sender<SignalMessage>,
    /// Observe messages the session sends to the relay.
    pub signal_out: mpsc::UnboundedReceiver<SignalMessage>,
    pub phase: watch::Receiver<Phase>,
    pub handle: JoinHandle<Result<(), SessionError>>,
}

pub fn spawn_session(role: Role, channel_role: ChannelRole) -> TestSession {
    spawn_session_with(Arc::new(MockPeerLink::default()), role, channel_role)
}

pub fn spawn_session_with(
    link: Arc<MockPeerLink>,
    role: Role,
    channel_role: ChannelRole,
) -> TestSession {
    let (link_tx, link_rx) = mpsc::channel(64);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::channel(64);

    let session = NegotiationSession::new(role, link.clone(), link_rx, out_tx, in_rx, channel_role);
    let phase = session.phase();
    let handle = tokio::spawn(session.run());

    TestSession {
        link,
        link_tx,
        signal_in: in_tx,
        signal_out: out_rx,
        phase,
        handle,
    }
}

pub async fn wait_for_phase(rx: &mut watch::Receiver<Phase>, want: Phase) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|p| *p == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for phase {want:?}"))
        .expect("session dropped before reaching phase");
}

pub async fn expect_signal(rx: &mut mpsc::UnboundedReceiver<SignalMessage>) -> SignalMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for outbound signal")
        .expect("outbound signal channel closed")
}

pub fn candidate(n: u16) -> CandidateInit {
    CandidateInit {
        candidate: format!("candidate:{n} 1 udp 2130706431 192.168.1.{n} 54321 typ host"),
        sdp_mid: "0".into(),
        sdp_m_line_index: 0,
    }
}
