use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use tower::timeout::Timeout;
use tower::timeout::error::Elapsed;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};

use crate::encoding::EncodedImage;
use crate::error::InferenceError;
use crate::inference::client::{InferenceClient, UploadedImage};
use crate::pipeline::types::{DetectionParameters, InferenceResult};

#[derive(Debug, Clone)]
pub enum InferenceRequest {
    Frame {
        image: EncodedImage,
        parameters: DetectionParameters,
    },
    Upload {
        upload: UploadedImage,
        threshold: f32,
    },
}

/// Exposes an [`InferenceClient`] as a tower service.
#[derive(Clone)]
pub struct InferenceService {
    client: Arc<dyn InferenceClient>,
}

impl InferenceService {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }
}

impl Service<InferenceRequest> for InferenceService {
    type Response = InferenceResult;
    type Error = InferenceError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: InferenceRequest) -> Self::Future {
        let client = Arc::clone(&self.client);
        Box::pin(async move {
            match request {
                InferenceRequest::Frame { image, parameters } => {
                    client.infer_frame(image, parameters).await
                }
                InferenceRequest::Upload { upload, threshold } => {
                    client.infer_upload(upload, threshold).await
                }
            }
        })
    }
}

/// Cloneable entry point the controller hands to spawned request tasks:
/// the inference service behind a timeout layer.
#[derive(Clone)]
pub struct InferenceDispatcher {
    service: Timeout<InferenceService>,
    client: Arc<dyn InferenceClient>,
    timeout: Duration,
}

impl InferenceDispatcher {
    pub fn new(client: Arc<dyn InferenceClient>, timeout: Duration) -> Self {
        let service = ServiceBuilder::new()
            .timeout(timeout)
            .service(InferenceService::new(Arc::clone(&client)));
        Self {
            service,
            client,
            timeout,
        }
    }

    pub async fn call(&self, request: InferenceRequest) -> Result<InferenceResult, InferenceError> {
        self.service
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| self.classify(err))
    }

    /// `GET /classes`, bounded by the same timeout.
    pub async fn list_classes(&self) -> Result<Vec<String>, InferenceError> {
        tokio::time::timeout(self.timeout, self.client.list_classes())
            .await
            .map_err(|_| InferenceError::Timeout(self.timeout))?
    }

    fn classify(&self, err: BoxError) -> InferenceError {
        if err.is::<Elapsed>() {
            return InferenceError::Timeout(self.timeout);
        }
        match err.downcast::<InferenceError>() {
            Ok(err) => *err,
            Err(other) => InferenceError::MalformedResponse(other.to_string()),
        }
    }
}
