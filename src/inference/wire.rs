use serde::{Deserialize, Serialize};

use crate::encoding::EncodedImage;
use crate::error::InferenceError;
use crate::pipeline::types::{Detection, InferenceResult};

/// Body of `POST /detect_frame`.
#[derive(Debug, Serialize)]
pub struct DetectFrameRequest {
    pub image_base64: String,
    pub threshold: f32,
    pub classes: Option<Vec<String>>,
}

/// Response of both `/detect_frame` and `/detect`.
#[derive(Debug, Deserialize)]
pub struct DetectionResponse {
    pub image: String,
    #[serde(default)]
    pub detections: Option<Vec<Detection>>,
}

impl DetectionResponse {
    pub fn into_result(self) -> Result<InferenceResult, InferenceError> {
        let annotated_image = EncodedImage::from_data_url(&self.image)
            .map_err(|e| InferenceError::MalformedResponse(format!("annotated image: {}", e)))?;
        Ok(InferenceResult {
            annotated_image,
            detections: self.detections.unwrap_or_default(),
        })
    }
}

/// Response of `GET /classes`.
#[derive(Debug, Default, Deserialize)]
pub struct ClassesResponse {
    #[serde(default)]
    pub classes: Option<Vec<String>>,
}
