use serde::{Deserialize, Serialize};

use crate::encoding::EncodedImage;

/// One detected object. Only the class label is interpreted; bounding box,
/// score and anything else the service sends are carried along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_label: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Detection {
    pub fn new(class_label: impl Into<String>) -> Self {
        Self {
            class_label: class_label.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        self.extra
            .get("confidence")
            .or_else(|| self.extra.get("score"))
            .and_then(serde_json::Value::as_f64)
    }
}

#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub annotated_image: EncodedImage,
    pub detections: Vec<Detection>,
}
