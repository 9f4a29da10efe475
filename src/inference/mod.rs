pub mod client;
pub mod http_client;
pub mod service;
pub mod wire;

pub use client::{InferenceClient, UploadedImage};
pub use http_client::HttpInferenceClient;
pub use service::{InferenceDispatcher, InferenceRequest, InferenceService};
