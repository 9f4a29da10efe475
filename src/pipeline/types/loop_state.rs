use std::fmt;

/// Lifecycle of the poll loop. The camera is held whenever the state is not `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    RequestInFlight,
}

impl LoopState {
    pub fn is_active(&self) -> bool {
        !matches!(self, LoopState::Idle)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::RequestInFlight => "request-in-flight",
        };
        f.write_str(name)
    }
}
