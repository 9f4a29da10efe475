use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::{MediaSource, VideoConstraints};
use crate::config::Configuration;
use crate::encoding::{EncodedImage, FrameEncoder};
use crate::error::{AppError, InferenceError};
use crate::inference::{InferenceDispatcher, InferenceRequest, UploadedImage};
use crate::pipeline::history::HistoryEntry;
use crate::pipeline::session::{RoundStats, SessionContext, SessionSnapshot};
use crate::pipeline::types::{InferenceResult, LoopState};

type UploadResponder = oneshot::Sender<Result<InferenceResult, AppError>>;

pub enum ControllerCommand {
    Start {
        responder: oneshot::Sender<Result<(), AppError>>,
    },
    Stop {
        responder: oneshot::Sender<()>,
    },
    SetThreshold {
        threshold: f32,
        responder: oneshot::Sender<f32>,
    },
    ToggleClass {
        label: String,
        responder: oneshot::Sender<Option<bool>>,
    },
    Upload {
        upload: UploadedImage,
        responder: UploadResponder,
    },
    Snapshot {
        responder: oneshot::Sender<SessionSnapshot>,
    },
}

/// Pushed to render targets whenever visible session state changes.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    State(LoopState),
    Annotated(EncodedImage),
    History(HistoryEntry),
}

enum Settlement {
    Frame {
        generation: u64,
        outcome: Result<InferenceResult, InferenceError>,
    },
    Upload {
        responder: UploadResponder,
        outcome: Result<InferenceResult, InferenceError>,
    },
    Classes(Result<Vec<String>, InferenceError>),
}

enum InFlight {
    Frame { generation: u64, task: JoinHandle<()> },
    Upload,
}

/// Drives capture -> encode -> infer -> render on a fixed cadence with at
/// most one inference request outstanding. All session state lives here and
/// is only touched from the controller task.
pub struct PollLoopController {
    source: Box<dyn MediaSource>,
    dispatcher: InferenceDispatcher,
    encoder: FrameEncoder,
    session: SessionContext,
    constraints: VideoConstraints,
    poll_interval: Duration,
    state: LoopState,
    generation: u64,
    next_tick: Option<Pin<Box<Sleep>>>,
    in_flight: Option<InFlight>,
    pending_upload: Option<(UploadedImage, UploadResponder)>,
    stats: RoundStats,
    settle_tx: mpsc::UnboundedSender<Settlement>,
    settle_rx: mpsc::UnboundedReceiver<Settlement>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl PollLoopController {
    pub fn new(
        source: Box<dyn MediaSource>,
        dispatcher: InferenceDispatcher,
        session: SessionContext,
        configuration: &Configuration,
    ) -> Self {
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(configuration.update_buffer_size.max(1));
        Self {
            source,
            dispatcher,
            encoder: FrameEncoder::new(configuration.jpeg_quality),
            session,
            constraints: VideoConstraints {
                ideal_width: configuration.ideal_width,
                ideal_height: configuration.ideal_height,
            },
            poll_interval: configuration.poll_interval(),
            state: LoopState::Idle,
            generation: 0,
            next_tick: None,
            in_flight: None,
            pending_upload: None,
            stats: RoundStats::default(),
            settle_tx,
            settle_rx,
            updates,
        }
    }

    /// Moves the controller onto its own task.
    pub fn spawn(
        self,
        command_buffer_size: usize,
        cancel_token: CancellationToken,
    ) -> (JoinHandle<()>, ControllerHandle) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer_size.max(1));
        let handle = ControllerHandle {
            command_tx,
            updates: self.updates.clone(),
        };
        let task = tokio::spawn(self.run(command_rx, cancel_token));
        (task, handle)
    }

    pub async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<ControllerCommand>,
        cancel_token: CancellationToken,
    ) {
        info!("Poll loop controller started");
        self.load_classes();
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Poll loop controller cancelled");
                    break;
                }
                Some(settlement) = self.settle_rx.recv() => {
                    self.handle_settlement(settlement);
                }
                _ = wait_for_tick(&mut self.next_tick) => {
                    self.on_tick();
                }
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All controller handles dropped");
                        break;
                    }
                },
            }
        }
        self.stop();
        info!("Poll loop controller stopped");
    }

    /// Fetches the class list in the background; the answer arrives as a
    /// settlement so commands are served while it is outstanding.
    fn load_classes(&self) {
        let dispatcher = self.dispatcher.clone();
        let settle_tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.list_classes().await;
            let _ = settle_tx.send(Settlement::Classes(outcome));
        });
    }

    async fn handle_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::Start { responder } => {
                let result = self.start().await;
                let _ = responder.send(result);
            }
            ControllerCommand::Stop { responder } => {
                self.stop();
                let _ = responder.send(());
            }
            ControllerCommand::SetThreshold {
                threshold,
                responder,
            } => {
                let applied = self.session.set_threshold(threshold);
                debug!("Threshold set to {}", applied);
                let _ = responder.send(applied);
            }
            ControllerCommand::ToggleClass { label, responder } => {
                let _ = responder.send(self.session.toggle_class(&label));
            }
            ControllerCommand::Upload { upload, responder } => {
                self.submit_upload(upload, responder);
            }
            ControllerCommand::Snapshot { responder } => {
                let _ = responder.send(self.snapshot());
            }
        }
    }

    /// Idle -> Running. Calling it while already running does nothing.
    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.state.is_active() {
            debug!("Start requested while {}, ignoring", self.state);
            return Ok(());
        }
        self.source.acquire(self.constraints).await?;
        self.generation += 1;
        self.set_state(LoopState::Running);
        // round 0 runs right away
        self.next_tick = Some(Box::pin(sleep_until(Instant::now())));
        info!(
            "Poll loop running (generation {}, every {:?})",
            self.generation, self.poll_interval
        );
        Ok(())
    }

    /// Running/RequestInFlight -> Idle. Calling it while idle does nothing.
    pub fn stop(&mut self) {
        if !self.state.is_active() {
            return;
        }
        self.next_tick = None;
        self.generation += 1;
        // uploads outlive the loop, frame rounds do not
        if let Some(InFlight::Frame { task, .. }) = &self.in_flight {
            task.abort();
            self.in_flight = None;
        }
        self.source.release();
        self.set_state(LoopState::Idle);
        info!("Poll loop stopped");
        self.dispatch_pending_upload();
    }

    fn on_tick(&mut self) {
        if !self.state.is_active() {
            self.next_tick = None;
            return;
        }
        // cadence is measured from tick start, not from request completion
        let started = Instant::now();
        self.next_tick = Some(Box::pin(sleep_until(started + self.poll_interval)));
        self.stats.scheduled += 1;

        if self.in_flight.is_some() {
            self.stats.skipped_busy += 1;
            debug!("Previous request still in flight, skipping tick");
            return;
        }
        let Some(surface) = self.source.capture_still() else {
            self.stats.skipped_not_ready += 1;
            debug!("No camera frame ready, skipping tick");
            return;
        };
        match self.encoder.encode(surface) {
            Ok(image) => self.dispatch_frame(image),
            Err(e) => {
                self.stats.failed += 1;
                warn!("Failed to encode frame, skipping round: {}", e);
            }
        }
    }

    fn dispatch_frame(&mut self, image: EncodedImage) {
        let generation = self.generation;
        let request = InferenceRequest::Frame {
            image,
            parameters: self.session.parameters().clone(),
        };
        let dispatcher = self.dispatcher.clone();
        let settle_tx = self.settle_tx.clone();
        let task = tokio::spawn(async move {
            let outcome = dispatcher.call(request).await;
            let _ = settle_tx.send(Settlement::Frame {
                generation,
                outcome,
            });
        });
        self.in_flight = Some(InFlight::Frame { generation, task });
        self.stats.dispatched += 1;
        self.set_state(LoopState::RequestInFlight);
    }

    fn submit_upload(&mut self, upload: UploadedImage, responder: UploadResponder) {
        if self.in_flight.is_none() {
            self.dispatch_upload(upload, responder);
        } else if self.pending_upload.is_some() {
            let _ = responder.send(Err(AppError::UploadPending));
        } else {
            debug!("Upload '{}' waits for the in-flight request", upload.file_name);
            self.pending_upload = Some((upload, responder));
        }
    }

    fn dispatch_pending_upload(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        if let Some((upload, responder)) = self.pending_upload.take() {
            self.dispatch_upload(upload, responder);
        }
    }

    fn dispatch_upload(&mut self, upload: UploadedImage, responder: UploadResponder) {
        info!("Submitting upload '{}'", upload.file_name);
        let request = InferenceRequest::Upload {
            upload,
            threshold: self.session.parameters().threshold(),
        };
        let dispatcher = self.dispatcher.clone();
        let settle_tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.call(request).await;
            let _ = settle_tx.send(Settlement::Upload { responder, outcome });
        });
        self.in_flight = Some(InFlight::Upload);
    }

    fn handle_settlement(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Frame {
                generation,
                outcome,
            } => {
                let current = generation == self.generation
                    && matches!(self.in_flight, Some(InFlight::Frame { generation: g, .. }) if g == generation);
                if !current {
                    self.stats.discarded_stale += 1;
                    debug!(
                        "Discarding result of generation {} (current {})",
                        generation, self.generation
                    );
                    return;
                }
                self.in_flight = None;
                match outcome {
                    Ok(result) => {
                        self.stats.completed += 1;
                        self.apply(result);
                    }
                    Err(e) => {
                        self.stats.failed += 1;
                        warn!("Detection round failed, keeping previous output: {}", e);
                    }
                }
                self.set_state(LoopState::Running);
            }
            Settlement::Upload { responder, outcome } => {
                if matches!(self.in_flight, Some(InFlight::Upload)) {
                    self.in_flight = None;
                }
                let reply = match outcome {
                    Ok(result) => {
                        self.apply(result.clone());
                        Ok(result)
                    }
                    Err(e) => {
                        error!("Upload detection failed: {}", e);
                        Err(AppError::from(e))
                    }
                };
                let _ = responder.send(reply);
            }
            Settlement::Classes(Ok(classes)) => {
                info!("Detection service offers {} classes", classes.len());
                self.session.set_available_classes(classes);
            }
            Settlement::Classes(Err(e)) => {
                warn!("Could not load class list, continuing without one: {}", e);
                self.session.set_available_classes(Vec::new());
            }
        }
        self.dispatch_pending_upload();
    }

    fn apply(&mut self, result: InferenceResult) {
        let entry = self.session.apply(result);
        debug!("Round tally: {} objects ({})", entry.total_count, entry.summary());
        if let Some(image) = self.session.annotated() {
            let _ = self.updates.send(SessionUpdate::Annotated(image.clone()));
        }
        let _ = self.updates.send(SessionUpdate::History(entry));
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            self.state = state;
            let _ = self.updates.send(SessionUpdate::State(state));
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            parameters: self.session.parameters().clone(),
            available_classes: self.session.available_classes().to_vec(),
            annotated: self.session.annotated().cloned(),
            history: self.session.history().to_vec(),
            stats: self.stats,
        }
    }
}

async fn wait_for_tick(next_tick: &mut Option<Pin<Box<Sleep>>>) {
    match next_tick.as_mut() {
        Some(tick) => tick.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ControllerCommand,
    ) -> Result<T, AppError> {
        let (responder, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(responder))
            .await
            .map_err(|_| AppError::ControllerStopped)?;
        response_rx.await.map_err(|_| AppError::ControllerStopped)
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.request(|responder| ControllerCommand::Start { responder })
            .await?
    }

    pub async fn stop(&self) -> Result<(), AppError> {
        self.request(|responder| ControllerCommand::Stop { responder })
            .await
    }

    /// Returns the threshold actually applied after clamping.
    pub async fn set_threshold(&self, threshold: f32) -> Result<f32, AppError> {
        self.request(|responder| ControllerCommand::SetThreshold {
            threshold,
            responder,
        })
        .await
    }

    /// Returns whether the label is now selected, or `None` if it was rejected.
    pub async fn toggle_class(&self, label: impl Into<String>) -> Result<Option<bool>, AppError> {
        let label = label.into();
        self.request(|responder| ControllerCommand::ToggleClass { label, responder })
            .await
    }

    pub async fn upload(&self, upload: UploadedImage) -> Result<InferenceResult, AppError> {
        self.request(|responder| ControllerCommand::Upload { upload, responder })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, AppError> {
        self.request(|responder| ControllerCommand::Snapshot { responder })
            .await
    }

    /// Writes the current annotated image into `dir`.
    pub async fn save_snapshot(&self, dir: &Path) -> Result<PathBuf, AppError> {
        let snapshot = self.snapshot().await?;
        let image = snapshot.annotated.ok_or(AppError::NothingToSave)?;
        Ok(image.save_snapshot(dir).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }
}
