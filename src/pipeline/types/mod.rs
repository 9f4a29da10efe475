mod detection;
mod loop_state;
mod parameters;

pub use detection::{Detection, InferenceResult};
pub use loop_state::LoopState;
pub use parameters::{ClassFilter, DetectionParameters, MAX_THRESHOLD, MIN_THRESHOLD};
