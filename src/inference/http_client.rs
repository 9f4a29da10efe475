use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::encoding::EncodedImage;
use crate::error::InferenceError;
use crate::inference::client::{InferenceClient, UploadedImage};
use crate::inference::wire::{ClassesResponse, DetectFrameRequest, DetectionResponse};
use crate::pipeline::types::{DetectionParameters, InferenceResult};

/// Talks JSON/multipart over HTTP to the detection service at `api_base`.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InferenceError::Network)?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.api_base, route)
    }

    fn transport_error(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.timeout)
        } else {
            InferenceError::Network(err)
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, InferenceError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(InferenceError::Service {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        serde_json::from_slice(&body).map_err(|e| InferenceError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer_frame(
        &self,
        image: EncodedImage,
        parameters: DetectionParameters,
    ) -> Result<InferenceResult, InferenceError> {
        let request = DetectFrameRequest {
            image_base64: image.to_data_url(),
            threshold: parameters.threshold(),
            classes: parameters.class_filter().to_wire(),
        };
        debug!(
            "POST /detect_frame ({} bytes, threshold {})",
            image.len(),
            request.threshold
        );
        let response = self
            .http
            .post(self.url("detect_frame"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.read_json::<DetectionResponse>(response)
            .await?
            .into_result()
    }

    async fn infer_upload(
        &self,
        upload: UploadedImage,
        threshold: f32,
    ) -> Result<InferenceResult, InferenceError> {
        debug!(
            "POST /detect for upload '{}' ({} bytes)",
            upload.file_name,
            upload.bytes.len()
        );
        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name)
            .mime_str(&upload.mime)
            .map_err(InferenceError::Network)?;
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(self.url("detect"))
            .query(&[("threshold", threshold)])
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.read_json::<DetectionResponse>(response)
            .await?
            .into_result()
    }

    async fn list_classes(&self) -> Result<Vec<String>, InferenceError> {
        let response = self
            .http
            .get(self.url("classes"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let classes = self.read_json::<ClassesResponse>(response).await?;
        Ok(classes.classes.unwrap_or_default())
    }
}
