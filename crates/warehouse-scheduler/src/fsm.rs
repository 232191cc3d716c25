/// The six states a `ViewCoordinator` can be in. `Retrying` and
/// `Transforming` carry the retry-attempt index `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initial,
    Waiting,
    Transforming { r: u32 },
    Retrying { r: u32 },
    Materialized,
    Failed,
}

impl State {
    /// The name reported by `GetStatus`. Never includes the retry count:
    /// operators care whether a view is transforming, not which attempt
    /// it's on (that's available via tracing).
    pub fn name(&self) -> &'static str {
        match self {
            State::Initial => "initial",
            State::Waiting => "waiting",
            State::Transforming { .. } => "transforming",
            State::Retrying { .. } => "retrying",
            State::Materialized => "materialized",
            State::Failed => "failed",
        }
    }
}
