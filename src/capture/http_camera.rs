use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::media_source::{MediaSource, StillSurface, VideoConstraints};
use crate::common::Frame;
use crate::error::CaptureError;

const STALE_FRAME_MS: i64 = 1_000;

/// A network camera that serves still snapshots over HTTP. While acquired, a
/// grabber task keeps the most recent decoded snapshot.
pub struct HttpCameraSource {
    id: Uuid,
    url: String,
    poll_interval: Duration,
    http: reqwest::Client,
    stream: Option<CameraStream>,
    surface: StillSurface,
}

struct CameraStream {
    frames: watch::Receiver<Option<Frame>>,
    cancel_token: CancellationToken,
    grabber: JoinHandle<()>,
}

impl HttpCameraSource {
    pub fn new(
        url: impl Into<String>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, CaptureError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            url: url.into(),
            poll_interval,
            http,
            stream: None,
            surface: StillSurface::new(),
        })
    }

    fn spawn_grabber(
        &self,
        frames_tx: watch::Sender<Option<Frame>>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let http = self.http.clone();
        let url = self.url.clone();
        let poll_interval = self.poll_interval;
        let id = self.id;
        tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                match fetch_snapshot(&http, &url).await {
                    Ok(image) => {
                        if consecutive_failures > 0 {
                            info!("Camera {} recovered after {} failed snapshots", id, consecutive_failures);
                            consecutive_failures = 0;
                        }
                        if frames_tx.send(Some(Frame::new(image, Utc::now()))).is_err() {
                            debug!("Camera {} has no readers left, stopping grabber", id);
                            break;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures == 1 {
                            warn!("Camera {} snapshot failed: {}", id, e);
                        } else {
                            debug!("Camera {} snapshot failed ({} in a row): {}", id, consecutive_failures, e);
                        }
                    }
                }
            }
            debug!("Camera {} grabber stopped", id);
        })
    }
}

async fn fetch_snapshot(http: &reqwest::Client, url: &str) -> Result<RgbImage, String> {
    let response = http.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("camera responded with status {}", status));
    }
    let body = response.bytes().await.map_err(|e| e.to_string())?;
    let image = image::load_from_memory(&body).map_err(|e| e.to_string())?;
    Ok(image.to_rgb8())
}

#[async_trait]
impl MediaSource for HttpCameraSource {
    async fn acquire(&mut self, constraints: VideoConstraints) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            debug!("Camera {} already acquired", self.id);
            return Ok(());
        }

        let probe = fetch_snapshot(&self.http, &self.url)
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", self.url, e)))?;
        if !constraints.matches(probe.dimensions()) {
            debug!(
                "Camera {} delivers {}x{}, requested ideal {}x{}",
                self.id,
                probe.width(),
                probe.height(),
                constraints.ideal_width,
                constraints.ideal_height
            );
        }

        let (frames_tx, frames) = watch::channel(Some(Frame::new(probe, Utc::now())));
        let cancel_token = CancellationToken::new();
        let grabber = self.spawn_grabber(frames_tx, cancel_token.clone());
        self.stream = Some(CameraStream {
            frames,
            cancel_token,
            grabber,
        });
        info!("Camera {} acquired at {}", self.id, self.url);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.cancel_token.cancel();
            stream.grabber.abort();
            info!("Camera {} released", self.id);
        }
    }

    fn capture_still(&mut self) -> Option<&RgbImage> {
        let stream = self.stream.as_ref()?;
        let latest = stream.frames.borrow();
        let frame = latest.as_ref()?;
        let age = frame.age(Utc::now());
        if age > chrono::Duration::milliseconds(STALE_FRAME_MS) {
            debug!(
                "Camera {} frame is {}ms old, snapshots are failing or slow",
                self.id,
                age.num_milliseconds()
            );
        }
        Some(self.surface.copy_from(frame.image()))
    }
}

impl Drop for HttpCameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubResponse, closed_url, spawn_stub};
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn source(url: &str) -> HttpCameraSource {
        HttpCameraSource::new(url, Duration::from_millis(20), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn captures_native_size_frames() {
        let snapshot = png(40, 30);
        let stub = spawn_stub(move |_| StubResponse::bytes(200, "image/png", snapshot.clone())).await;
        let mut camera = source(&format!("{}/snapshot.png", stub.base_url));

        assert!(camera.capture_still().is_none());
        camera.acquire(VideoConstraints::default()).await.unwrap();

        let still = camera.capture_still().unwrap();
        assert_eq!(still.dimensions(), (40, 30));
        assert_eq!(still.get_pixel(0, 0), &Rgb([10, 20, 30]));

        camera.release();
        camera.release();
        assert!(camera.capture_still().is_none());
    }

    #[tokio::test]
    async fn unreachable_camera_is_unavailable() {
        let mut camera = source(&closed_url().await);
        let err = camera.acquire(VideoConstraints::default()).await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(camera.capture_still().is_none());
    }

    #[tokio::test]
    async fn error_status_or_garbage_is_unavailable() {
        let stub = spawn_stub(|request| {
            if request.target == "/missing" {
                StubResponse::bytes(404, "text/plain", b"no".to_vec())
            } else {
                StubResponse::bytes(200, "image/jpeg", b"not an image".to_vec())
            }
        })
        .await;

        let mut camera = source(&format!("{}/missing", stub.base_url));
        assert!(camera.acquire(VideoConstraints::default()).await.is_err());
        let mut camera = source(&format!("{}/garbage", stub.base_url));
        assert!(camera.acquire(VideoConstraints::default()).await.is_err());
    }
}
