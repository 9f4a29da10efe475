pub mod capture;
pub mod cli;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod encoding;
pub mod error;
pub mod inference;
pub mod pipeline;

#[cfg(test)]
mod test_support;

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AppError, CaptureError, EncodeError, InferenceError};
