use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capture::{HttpCameraSource, MediaSource};
use crate::config::Configuration;
use crate::error::AppError;
use crate::inference::{HttpInferenceClient, InferenceClient, InferenceDispatcher};
use crate::pipeline::controller::{ControllerHandle, PollLoopController};
use crate::pipeline::session::SessionContext;
use crate::pipeline::types::{ClassFilter, DetectionParameters};

/// Owns the controller task. Dropping it cancels the task, which stops the
/// loop and releases the camera.
pub struct Coordinator {
    controller_task: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
    handle: ControllerHandle,
}

impl Coordinator {
    fn new(
        configuration: Configuration,
        source: Box<dyn MediaSource>,
        client: Arc<dyn InferenceClient>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let dispatcher = InferenceDispatcher::new(client, configuration.request_timeout());
        let parameters = DetectionParameters::new(
            configuration.default_threshold,
            configuration
                .default_classes
                .iter()
                .cloned()
                .collect::<ClassFilter>(),
        );
        let controller = PollLoopController::new(
            source,
            dispatcher,
            SessionContext::new(parameters),
            &configuration,
        );
        let (controller_task, handle) =
            controller.spawn(configuration.command_buffer_size, cancel_token.clone());
        Self {
            controller_task,
            cancel_token,
            handle,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Cancels the controller and waits for it to release the camera.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Err(e) = (&mut self.controller_task).await {
            tracing::error!("Controller task ended abnormally: {}", e);
        }
        info!("Coordinator shut down");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    source: Option<Box<dyn MediaSource>>,
    client: Option<Arc<dyn InferenceClient>>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            source: None,
            client: None,
        }
    }

    // Overrides the starting threshold from the configuration.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.configuration.default_threshold = threshold;
        self
    }

    pub fn classes(mut self, classes: Vec<String>) -> Self {
        self.configuration.default_classes = classes;
        self
    }

    pub fn media_source(mut self, source: Box<dyn MediaSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn inference_client(mut self, client: Arc<dyn InferenceClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        let source = match self.source {
            Some(source) => source,
            None => Box::new(HttpCameraSource::new(
                self.configuration.camera_url.clone(),
                self.configuration.camera_poll_interval(),
                self.configuration.request_timeout(),
            )?),
        };
        let client = match self.client {
            Some(client) => client,
            None => Arc::new(HttpInferenceClient::new(
                self.configuration.api_base.clone(),
                self.configuration.request_timeout(),
            )?),
        };
        Ok(Coordinator::new(self.configuration, source, client))
    }
}
