//! Device-leg streamer: serves length-prefixed frames over plain TCP to
//! whichever bridge connects, paced at a fixed rate.

use crate::source::FrameSource;
use periscope_core::{FrameError, write_frame};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Accept loop. Each connection gets its own frame source and is served
/// until it disconnects or a write fails; per-connection errors never end
/// the loop.
pub async fn serve_frames<F>(
    listener: TcpListener,
    interval: Duration,
    make_source: F,
) -> std::io::Result<()>
where
    F: Fn() -> Box<dyn FrameSource> + Send + Sync + 'static,
{
    info!("streamer listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        info!("bridge connected: {peer}");

        let source = make_source();
        tokio::spawn(async move {
            match stream_to(stream, source, interval).await {
                Ok(()) | Err(FrameError::Closed) => info!("bridge disconnected: {peer}"),
                Err(e) => warn!("streaming to {peer} ended: {e}"),
            }
        });
    }
}

async fn stream_to(
    mut stream: TcpStream,
    mut source: Box<dyn FrameSource>,
    interval: Duration,
) -> Result<(), FrameError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match source.next_frame().await {
            Ok(frame) => write_frame(&mut stream, &frame).await?,
            Err(e) => warn!("frame generation failed: {e}"),
        }
    }
}
