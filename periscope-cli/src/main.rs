use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use periscope_core::IceServerConfig;
use periscope_peer::{
    CallbackSink, ChannelRole, DirSink, FrameSink, NegotiationSession, Role, SignalingClient,
    TcpFrameSource, TestCardSource, WebRtcLink, streamer::serve_frames,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "periscope", about = "Relay-negotiated peer-to-peer frame streaming")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        #[arg(long, default_value = "0.0.0.0:8000")]
        listen: String,
    },

    /// Bridge a device's frame stream onto a negotiated peer link.
    Bridge {
        /// Device streamer address (ip:port).
        #[arg(long)]
        device: String,

        #[arg(long, default_value = "ws://localhost:8000/ws")]
        signal: String,

        /// Frames per second sent over the data channel.
        #[arg(long, default_value_t = 1)]
        fps: u32,

        #[command(flatten)]
        ice: IceArgs,
    },

    /// View a remote stream: negotiate a link and receive frames.
    View {
        #[arg(long, default_value = "ws://localhost:8000/ws")]
        signal: String,

        /// Directory to write received frames into; log-only if omitted.
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        ice: IceArgs,
    },

    /// Serve test-card frames over TCP, standing in for a capture device.
    Stream {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        #[arg(long, default_value_t = 1)]
        fps: u32,
    },
}

#[derive(Args)]
struct IceArgs {
    #[arg(long, default_value = "stun:stun.l.google.com:19302")]
    stun: String,

    /// TURN server URL (e.g. turn:host:3478).
    #[arg(long)]
    turn: Option<String>,

    #[arg(long, requires = "turn")]
    turn_user: Option<String>,

    #[arg(long, requires = "turn")]
    turn_pass: Option<String>,
}

impl IceArgs {
    fn servers(&self) -> Vec<IceServerConfig> {
        let mut servers = vec![IceServerConfig::stun(&self.stun)];
        if let Some(turn) = &self.turn {
            servers.push(IceServerConfig::turn(
                turn,
                self.turn_user.clone().unwrap_or_default(),
                self.turn_pass.clone().unwrap_or_default(),
            ));
        }
        servers
    }
}

fn fps_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Relay { listen } => {
            println!("{}", "📡 periscope relay".green().bold());
            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("could not bind {listen}"))?;
            periscope_relay::serve(listener).await
        }

        Commands::Bridge {
            device,
            signal,
            fps,
            ice,
        } => {
            println!("{}", "🔗 periscope bridge".green().bold());
            let source = TcpFrameSource::connect(&device)
                .await
                .with_context(|| format!("could not connect to device streamer at {device}"))?;
            info!("connected to device streamer at {device}");

            run_session(
                &signal,
                Role::Answerer,
                ice.servers(),
                ChannelRole::Send {
                    source: Box::new(source),
                    interval: fps_interval(fps),
                },
            )
            .await
        }

        Commands::View { signal, out, ice } => {
            println!("{}", "🔭 periscope viewer".green().bold());
            let sink: Arc<dyn FrameSink> = match out {
                Some(dir) => Arc::new(
                    DirSink::new(&dir)
                        .with_context(|| format!("could not create {}", dir.display()))?,
                ),
                None => Arc::new(CallbackSink::new(|frame| {
                    info!("received frame: {} bytes", frame.len());
                })),
            };

            run_session(
                &signal,
                Role::Offerer,
                ice.servers(),
                ChannelRole::Receive { sink },
            )
            .await
        }

        Commands::Stream { listen, fps } => {
            println!("{}", "🎞  periscope test streamer".green().bold());
            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("could not bind {listen}"))?;
            serve_frames(listener, fps_interval(fps), || {
                Box::new(TestCardSource::default())
            })
            .await
            .context("streamer failed")
        }
    }
}

async fn run_session(
    signal_url: &str,
    role: Role,
    ice_servers: Vec<IceServerConfig>,
    channel_role: ChannelRole,
) -> Result<()> {
    let client = SignalingClient::connect(signal_url)
        .await
        .with_context(|| format!("could not connect to relay at {signal_url}"))?;
    let (signal_tx, signal_rx) = client.split();

    let (link_tx, link_rx) = mpsc::channel(256);
    let link = WebRtcLink::connect(role, &ice_servers, link_tx)
        .await
        .context("could not create peer link")?;

    let session = NegotiationSession::new(
        role,
        Arc::new(link),
        link_rx,
        signal_tx,
        signal_rx,
        channel_role,
    )
    .with_status(Arc::new(|status| info!("status: {status}")));

    session.run().await.context("negotiation failed")
}
