use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use live_detect::cli::{AppArgs, Command};
use live_detect::inference::{HttpInferenceClient, InferenceClient, UploadedImage};
use live_detect::pipeline::SessionUpdate;
use live_detect::{AppError, Configuration, CoordinatorBuilder};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, debug, info, warn};

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = AppArgs::parse();
    let mut configuration = Configuration::load(args.config.as_deref())?;
    init_logging(&configuration.log_level);

    if let Some(api_base) = args.api_base {
        configuration.api_base = api_base;
    }
    if let Some(camera_url) = args.camera_url {
        configuration.camera_url = camera_url;
    }

    match args.command {
        Command::Live {
            output,
            duration_secs,
            snapshot_dir,
            threshold,
            classes,
        } => {
            let mut builder = CoordinatorBuilder::new(configuration);
            if let Some(threshold) = threshold {
                builder = builder.threshold(threshold);
            }
            if !classes.is_empty() {
                builder = builder.classes(classes);
            }
            run_live(
                builder,
                &output,
                duration_secs.map(Duration::from_secs),
                snapshot_dir,
            )
            .await
        }
        Command::Upload {
            file,
            threshold,
            output,
        } => {
            let mut builder = CoordinatorBuilder::new(configuration);
            if let Some(threshold) = threshold {
                builder = builder.threshold(threshold);
            }
            run_upload(builder, &file, &output).await
        }
        Command::Classes => run_classes(&configuration).await,
    }
}

async fn run_live(
    builder: CoordinatorBuilder,
    output: &Path,
    duration: Option<Duration>,
    snapshot_dir: Option<PathBuf>,
) -> Result<(), AppError> {
    let coordinator = builder.build()?;
    let handle = coordinator.handle();
    let mut updates = handle.subscribe();
    handle.start().await?;

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted, stopping");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed, stopping");
                break;
            }
            update = updates.recv() => match update {
                Ok(SessionUpdate::Annotated(image)) => {
                    tokio::fs::write(output, image.bytes()).await?;
                }
                Ok(SessionUpdate::History(entry)) => {
                    info!(
                        "[{}] {} objects: {}",
                        entry.display_time(),
                        entry.total_count,
                        entry.summary()
                    );
                }
                Ok(SessionUpdate::State(state)) => debug!("Loop state: {}", state),
                Err(RecvError::Lagged(missed)) => warn!("Render target fell behind by {} updates", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.stop().await?;
    if let Some(dir) = snapshot_dir {
        match handle.save_snapshot(&dir).await {
            Ok(path) => info!("Saved snapshot to {}", path.display()),
            Err(AppError::NothingToSave) => warn!("No annotated image to save"),
            Err(e) => return Err(e),
        }
    }
    let snapshot = handle.snapshot().await?;
    info!("Round statistics: {:?}", snapshot.stats);
    coordinator.shutdown().await;
    Ok(())
}

async fn run_upload(builder: CoordinatorBuilder, file: &Path, output: &Path) -> Result<(), AppError> {
    let coordinator = builder.build()?;
    let upload = UploadedImage::from_path(file).await?;
    let result = coordinator.handle().upload(upload).await?;

    tokio::fs::write(output, result.annotated_image.bytes()).await?;
    info!(
        "{} detections, annotated image written to {}",
        result.detections.len(),
        output.display()
    );
    for detection in &result.detections {
        match detection.confidence() {
            Some(confidence) => println!("{} {:.2}", detection.class_label, confidence),
            None => println!("{}", detection.class_label),
        }
    }
    coordinator.shutdown().await;
    Ok(())
}

async fn run_classes(configuration: &Configuration) -> Result<(), AppError> {
    let client = HttpInferenceClient::new(
        configuration.api_base.clone(),
        configuration.request_timeout(),
    )?;
    let classes = client.list_classes().await?;
    if classes.is_empty() {
        warn!("The detection service did not report any classes");
    }
    for class in &classes {
        println!("{}", class);
    }
    Ok(())
}
