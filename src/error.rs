use std::time::Duration;
use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Capture Error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Inference Error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Encode Error: {0}")]
    Encode(#[from] EncodeError),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("The controller task is no longer running.")]
    ControllerStopped,
    #[error("An upload is already waiting for the in-flight request to settle.")]
    UploadPending,
    #[error("No annotated image is available yet.")]
    NothingToSave,
}

// Media source errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),
}

// Detection service errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Network error talking to the detection service: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Detection service responded with status {status}: {body}")]
    Service { status: u16, body: String },
    #[error("Malformed response from the detection service: {0}")]
    MalformedResponse(String),
    #[error("Detection request timed out after {0:?}")]
    Timeout(Duration),
}

impl InferenceError {
    /// True for failures that never reached a response (transport, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, InferenceError::Network(_) | InferenceError::Timeout(_))
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
