pub mod controller;
pub mod history;
pub mod session;
pub mod types;

pub use controller::{ControllerHandle, PollLoopController, SessionUpdate};
pub use history::{HISTORY_CAPACITY, HistoryEntry, HistoryLog};
pub use session::{RoundStats, SessionContext, SessionSnapshot};
pub use types::{ClassFilter, Detection, DetectionParameters, InferenceResult, LoopState};
