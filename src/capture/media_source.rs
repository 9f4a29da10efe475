use async_trait::async_trait;
use image::RgbImage;

use crate::error::CaptureError;

/// Target resolution requested from the device. Devices treat it as a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 960,
            ideal_height: 540,
        }
    }
}

impl VideoConstraints {
    pub fn matches(&self, (width, height): (u32, u32)) -> bool {
        self.ideal_width == width && self.ideal_height == height
    }
}

/// Owner of the camera handle.
#[async_trait]
pub trait MediaSource: Send {
    /// Opens the device and starts playback.
    async fn acquire(&mut self, constraints: VideoConstraints) -> Result<(), CaptureError>;

    /// Stops playback and drops the handle. Calling it without an open
    /// device does nothing.
    fn release(&mut self);

    /// Copies the current frame into the source's surface, or `None` when no
    /// device is attached or no frame has been decoded yet.
    fn capture_still(&mut self) -> Option<&RgbImage>;
}

/// Off-screen raster surface reused across captures.
#[derive(Debug, Default)]
pub struct StillSurface {
    surface: Option<RgbImage>,
    allocations: usize,
}

impl StillSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `frame` in, reallocating only when the frame size changes.
    pub fn copy_from(&mut self, frame: &RgbImage) -> &RgbImage {
        if self.surface.as_ref().map(RgbImage::dimensions) != Some(frame.dimensions()) {
            self.surface = None;
            self.allocations += 1;
        }
        let surface = self
            .surface
            .get_or_insert_with(|| RgbImage::new(frame.width(), frame.height()));
        surface.copy_from_slice(frame.as_raw());
        surface
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }
}
