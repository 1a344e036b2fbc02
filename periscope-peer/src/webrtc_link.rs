use crate::link::{FrameChannel, LinkError, LinkEvent, PeerLink};
use crate::session::Role;
use async_trait::async_trait;
use bytes::Bytes;
use periscope_core::{CandidateInit, IceServerConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Peer link provider backed by the `webrtc` crate. Events (discovered
/// candidates, channel open, inbound frames, disconnection) flow out
/// through the channel handed to [`WebRtcLink::connect`].
pub struct WebRtcLink {
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcLink {
    /// Create a peer connection with the given reachability-assist servers.
    /// The offerer creates the `media` data channel up front; the answerer
    /// adopts the remote's channel via `on_data_channel`.
    pub async fn connect(
        role: Role,
        ice_servers: &[IceServerConfig],
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Result<Self, LinkError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(setup)?;
        let registry =
            register_default_interceptors(Registry::new(), &mut media_engine).map_err(setup)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone().unwrap_or_default(),
                    credential: s.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(setup)?);

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    info!("peer connection state: {state:?}");
                    match state {
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => {
                            let _ = tx.send(LinkEvent::Disconnected).await;
                        }
                        _ => {}
                    }
                })
            },
        ));

        // Trickle ICE: relay each local candidate as soon as it is found.
        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = CandidateInit {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid.unwrap_or_default(),
                    sdp_m_line_index: init.sdp_mline_index.unwrap_or_default(),
                };
                let _ = tx.send(LinkEvent::LocalCandidate(candidate)).await;
            })
        }));

        match role {
            Role::Offerer => {
                let channel = peer_connection
                    .create_data_channel("media", None)
                    .await
                    .map_err(setup)?;
                wire_channel(channel, event_tx);
            }
            Role::Answerer => {
                peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                    let tx = event_tx.clone();
                    Box::pin(async move {
                        debug!("remote opened data channel '{}'", channel.label());
                        wire_channel(channel, tx);
                    })
                }));
            }
        }

        Ok(Self { peer_connection })
    }
}

fn wire_channel(channel: Arc<RTCDataChannel>, event_tx: mpsc::Sender<LinkEvent>) {
    let open_channel = channel.clone();
    let open_tx = event_tx.clone();
    channel.on_open(Box::new(move || {
        let channel = open_channel.clone();
        let tx = open_tx.clone();
        Box::pin(async move {
            info!("data channel '{}' open", channel.label());
            let sender: Arc<dyn FrameChannel> = Arc::new(DataChannelSender { channel });
            let _ = tx.send(LinkEvent::ChannelOpen(sender)).await;
        })
    }));

    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = event_tx.clone();
        Box::pin(async move {
            let _ = tx.send(LinkEvent::FrameReceived(msg.data)).await;
        })
    }));
}

struct DataChannelSender {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl FrameChannel for DataChannelSender {
    async fn send(&self, frame: Bytes) -> Result<(), LinkError> {
        self.channel
            .send(&frame)
            .await
            .map(|_| ())
            .map_err(|_| LinkError::ChannelClosed)
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<String, LinkError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(description)?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .map_err(description)?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String, LinkError> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(description)?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .map_err(description)?;
        Ok(answer.sdp)
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<(), LinkError> {
        let desc = RTCSessionDescription::offer(sdp).map_err(description)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(description)
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<(), LinkError> {
        let desc = RTCSessionDescription::answer(sdp).map_err(description)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(description)
    }

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), LinkError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_m_line_index),
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| LinkError::Candidate(e.to_string()))
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| LinkError::Setup(e.to_string()))
    }
}

fn setup(e: webrtc::Error) -> LinkError {
    LinkError::Setup(e.to_string())
}

fn description(e: webrtc::Error) -> LinkError {
    LinkError::Description(e.to_string())
}
