use crate::link::{LinkError, LinkEvent, PeerLink};
use crate::sink::FrameSink;
use crate::source::{FrameSource, pump_frames};
use periscope_core::{CandidateInit, SignalMessage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which side of the offer/answer exchange this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

/// Negotiation phase of the single peer link owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    OfferSent,
    OfferReceived,
    Stable,
    Closed,
}

/// What the session does with the data channel once it opens.
pub enum ChannelRole {
    /// Produce frames at a fixed cadence and transmit each one.
    Send {
        source: Box<dyn FrameSource>,
        interval: Duration,
    },
    /// Hand every inbound message to the sink as one complete frame.
    Receive { sink: Arc<dyn FrameSink> },
}

pub type StatusFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("negotiation failed: {0}")]
    Link(#[from] LinkError),
}

/// Drives one peer link through negotiation using messages arriving from
/// the relay, and starts the frame source or installs the frame sink when
/// the data channel opens.
///
/// All inputs (relayed signals, link events) are consumed one at a time in
/// a single loop, so the state machine never re-enters itself.
pub struct NegotiationSession {
    role: Role,
    link: Arc<dyn PeerLink>,
    link_rx: mpsc::Receiver<LinkEvent>,
    signal_tx: mpsc::UnboundedSender<SignalMessage>,
    signal_rx: mpsc::Receiver<SignalMessage>,
    channel_role: Option<ChannelRole>,
    sink: Option<Arc<dyn FrameSink>>,
    phase_tx: watch::Sender<Phase>,
    /// Candidates received before the remote description, in arrival order.
    pending_candidates: Vec<CandidateInit>,
    remote_set: bool,
    pump: Option<JoinHandle<()>>,
    status: Option<StatusFn>,
}

impl NegotiationSession {
    pub fn new(
        role: Role,
        link: Arc<dyn PeerLink>,
        link_rx: mpsc::Receiver<LinkEvent>,
        signal_tx: mpsc::UnboundedSender<SignalMessage>,
        signal_rx: mpsc::Receiver<SignalMessage>,
        channel_role: ChannelRole,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            role,
            link,
            link_rx,
            signal_tx,
            signal_rx,
            channel_role: Some(channel_role),
            sink: None,
            phase_tx,
            pending_candidates: Vec::new(),
            remote_set: false,
            pump: None,
            status: None,
        }
    }

    /// Install a human-readable status callback ("negotiation stable",
    /// "disconnected", ...).
    pub fn with_status(mut self, status: StatusFn) -> Self {
        self.status = Some(status);
        self
    }

    /// Observe phase transitions (used by callers and tests).
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// Run the session until the link closes. A description application
    /// failure is fatal and surfaces as an error; relay or transport
    /// closure is a normal end.
    pub async fn run(mut self) -> Result<(), SessionError> {
        if self.role == Role::Offerer {
            match self.link.create_offer().await {
                Ok(sdp) => {
                    self.send_signal(SignalMessage::Offer { sdp });
                    self.set_phase(Phase::OfferSent);
                }
                Err(e) => {
                    self.close().await;
                    return Err(e.into());
                }
            }
        }

        loop {
            tokio::select! {
                signal = self.signal_rx.recv() => match signal {
                    Some(msg) => {
                        if let Err(e) = self.handle_signal(msg).await {
                            self.close().await;
                            return Err(e);
                        }
                    }
                    None => {
                        info!("relay connection closed, ending session");
                        self.close().await;
                        return Ok(());
                    }
                },
                event = self.link_rx.recv() => match event {
                    Some(LinkEvent::Disconnected) | None => {
                        info!("peer link disconnected, ending session");
                        self.close().await;
                        return Ok(());
                    }
                    Some(event) => self.handle_link_event(event),
                },
            }
        }
    }

    async fn handle_signal(&mut self, msg: SignalMessage) -> Result<(), SessionError> {
        match msg {
            SignalMessage::Offer { sdp } => self.handle_offer(sdp).await,
            SignalMessage::Answer { sdp } => self.handle_answer(sdp).await,
            SignalMessage::IceCandidate { candidate } => {
                self.handle_candidate(candidate).await;
                Ok(())
            }
        }
    }

    async fn handle_offer(&mut self, sdp: String) -> Result<(), SessionError> {
        let phase = *self.phase_tx.borrow();
        if phase != Phase::Idle {
            warn!("offer received in {phase:?}, renegotiation unsupported, ignoring");
            return Ok(());
        }

        self.link.set_remote_offer(sdp).await?;
        self.remote_set = true;
        self.set_phase(Phase::OfferReceived);
        self.flush_candidates().await;

        let answer = self.link.create_answer().await?;
        self.send_signal(SignalMessage::Answer { sdp: answer });
        self.set_phase(Phase::Stable);
        self.report("negotiation stable");
        Ok(())
    }

    async fn handle_answer(&mut self, sdp: String) -> Result<(), SessionError> {
        let phase = *self.phase_tx.borrow();
        if phase == Phase::Stable {
            warn!("duplicate answer ignored, link already stable");
            return Ok(());
        }
        if phase != Phase::OfferSent {
            warn!("answer received in {phase:?}, ignoring");
            return Ok(());
        }

        self.link.set_remote_answer(sdp).await?;
        self.remote_set = true;
        self.flush_candidates().await;
        self.set_phase(Phase::Stable);
        self.report("negotiation stable");
        Ok(())
    }

    /// Candidates are applied strictly after the remote description exists;
    /// before that they are buffered in arrival order.
    async fn handle_candidate(&mut self, candidate: CandidateInit) {
        if !self.remote_set {
            debug!("buffering candidate until remote description is set");
            self.pending_candidates.push(candidate);
            return;
        }
        if let Err(e) = self.link.add_ice_candidate(candidate).await {
            warn!("skipping candidate: {e}");
        }
    }

    /// Apply every buffered candidate in arrival order, exactly once.
    async fn flush_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = self.link.add_ice_candidate(candidate).await {
                warn!("skipping buffered candidate: {e}");
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::LocalCandidate(candidate) => {
                self.send_signal(SignalMessage::IceCandidate { candidate });
            }
            LinkEvent::ChannelOpen(channel) => {
                info!("data channel open");
                self.report("data channel open");
                match self.channel_role.take() {
                    Some(ChannelRole::Send { source, interval }) => {
                        self.pump = Some(tokio::spawn(pump_frames(source, channel, interval)));
                        self.report("streaming");
                    }
                    Some(ChannelRole::Receive { sink }) => {
                        self.sink = Some(sink);
                        self.report("receiving");
                    }
                    None => debug!("data channel reopened, role already taken"),
                }
            }
            LinkEvent::FrameReceived(frame) => match &self.sink {
                Some(sink) => sink.on_frame(frame),
                None => debug!("dropping {}-byte frame, no sink installed", frame.len()),
            },
            LinkEvent::Disconnected => unreachable!("handled by the run loop"),
        }
    }

    fn send_signal(&self, msg: SignalMessage) {
        if self.signal_tx.send(msg).is_err() {
            warn!("relay writer gone, outbound signal dropped");
        }
    }

    async fn close(&mut self) {
        if *self.phase_tx.borrow() == Phase::Closed {
            return;
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.link.close().await {
            warn!("error closing peer link: {e}");
        }
        self.set_phase(Phase::Closed);
        self.report("disconnected");
    }

    fn set_phase(&self, phase: Phase) {
        debug!("phase -> {phase:?}");
        self.phase_tx.send_replace(phase);
    }

    fn report(&self, status: &str) {
        if let Some(cb) = &self.status {
            cb(status);
        }
    }
}
