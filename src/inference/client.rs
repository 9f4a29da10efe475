use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::encoding::EncodedImage;
use crate::error::InferenceError;
use crate::pipeline::types::{DetectionParameters, InferenceResult};

/// Request/response boundary to the remote detection service. Calls are
/// abandoned by dropping the future; the client never retries.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Live-loop detection on an encoded camera frame.
    async fn infer_frame(
        &self,
        image: EncodedImage,
        parameters: DetectionParameters,
    ) -> Result<InferenceResult, InferenceError>;

    /// One-shot detection on a user supplied file. No class filter is applied.
    async fn infer_upload(
        &self,
        upload: UploadedImage,
        threshold: f32,
    ) -> Result<InferenceResult, InferenceError>;

    async fn list_classes(&self) -> Result<Vec<String>, InferenceError>;
}

/// Raw bytes of an image file picked by the user, sent as-is.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime = guess_mime(&file_name).to_string();
        Self {
            file_name,
            mime,
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

fn guess_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
