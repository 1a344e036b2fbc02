use crate::link::FrameChannel;
use async_trait::async_trait;
use bytes::Bytes;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use periscope_core::{FrameError, read_frame};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("frame encode failed: {0}")]
    Encode(String),
}

/// Produces the next complete encoded frame. Failures are transient; the
/// pump retries on the next interval.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Bytes, SourceError>;
}

/// Fixed-cadence send loop for an open data channel.
///
/// Capture failures are logged and retried one interval later,
/// indefinitely. A send failure means the negotiated link is gone and ends
/// the loop.
pub async fn pump_frames(
    mut source: Box<dyn FrameSource>,
    channel: Arc<dyn FrameChannel>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match source.next_frame().await {
            Ok(frame) => {
                if let Err(e) = channel.send(frame).await {
                    warn!("frame send failed, stopping: {e}");
                    return;
                }
            }
            Err(e) => warn!("frame capture failed, retrying next interval: {e}"),
        }
    }
}

/// Reads length-prefixed frames from the device streamer's TCP leg.
pub struct TcpFrameSource {
    reader: BufReader<TcpStream>,
}

impl TcpFrameSource {
    /// Connect to the streamer. Failure here is fatal to the attempt.
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }
}

#[async_trait]
impl FrameSource for TcpFrameSource {
    async fn next_frame(&mut self) -> Result<Bytes, SourceError> {
        Ok(read_frame(&mut self.reader).await?)
    }
}

/// Generates a solid-color JPEG whose color cycles with the wall-clock
/// second, for running the pipeline without a real capture device.
pub struct TestCardSource {
    width: u32,
    height: u32,
    quality: u8,
}

impl Default for TestCardSource {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            quality: 80,
        }
    }
}

#[async_trait]
impl FrameSource for TestCardSource {
    async fn next_frame(&mut self) -> Result<Bytes, SourceError> {
        let sec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            % 60;
        let sec = sec as u8;
        let image = RgbImage::from_pixel(
            self.width,
            self.height,
            image::Rgb([sec * 4, 255 - sec * 4, 128]),
        );

        let mut buf = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        encoder
            .encode_image(&image)
            .map_err(|e| SourceError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf.into_inner()))
    }
}
