use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::Utc;

use crate::error::EncodeError;

pub const JPEG_MIME: &str = "image/jpeg";

/// A compressed still image together with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime: String,
    bytes: Bytes,
}

impl EncodedImage {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn jpeg(bytes: impl Into<Bytes>) -> Self {
        Self::new(JPEG_MIME, bytes)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Parses `data:<mime>;base64,<payload>`.
    pub fn from_data_url(url: &str) -> Result<Self, EncodeError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| EncodeError::InvalidDataUrl("missing data: scheme".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| EncodeError::InvalidDataUrl("missing payload separator".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| EncodeError::InvalidDataUrl("only base64 payloads are supported".to_string()))?;
        let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::new(mime, bytes))
    }

    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            _ => "jpg",
        }
    }

    /// Writes the image to `dir/yolo_snapshot_<unix-millis>.<ext>`.
    pub async fn save_snapshot(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "yolo_snapshot_{}.{}",
            Utc::now().timestamp_millis(),
            self.extension()
        ));
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}
