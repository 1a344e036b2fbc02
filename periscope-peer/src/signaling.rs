use futures_util::{SinkExt, StreamExt};
use periscope_core::SignalMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{error, info, warn};

/// Connection to the relay. Outbound messages from any task (the session
/// loop, candidate-discovery events) funnel through one writer task, so
/// writes to the socket are serialized.
pub struct SignalingClient {
    tx: mpsc::UnboundedSender<SignalMessage>,
    rx: mpsc::Receiver<SignalMessage>,
}

impl SignalingClient {
    /// Connect to the relay's websocket endpoint. Failure here is fatal to
    /// the attempt and not retried.
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        let (stream, _) = connect_async(url).await?;
        info!("connected to relay at {url}");
        let (mut ws_tx, mut ws_rx) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SignalMessage>();
        let (in_tx, in_rx) = mpsc::channel::<SignalMessage>(64);

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to serialize signal: {e}");
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                match msg {
                    WsMessage::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => {
                            if in_tx.send(signal).await.is_err() {
                                break;
                            }
                        }
                        // Malformed or unknown-tag messages are dropped here,
                        // never fatal to the session.
                        Err(e) => warn!("dropping malformed signal: {e}"),
                    },
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            // in_tx drops here; the session observes the closed channel.
        });

        Ok(Self {
            tx: out_tx,
            rx: in_rx,
        })
    }

    pub fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<SignalMessage>,
        mpsc::Receiver<SignalMessage>,
    ) {
        (self.tx, self.rx)
    }
}
