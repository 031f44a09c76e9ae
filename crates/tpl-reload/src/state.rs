use std::fmt;

/// Progress of one loader pass.
///
/// Every transition from `Written` on is best-effort: a skipped or failed
/// invalidation step still moves the pass forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassState {
    #[default]
    Idle,
    Loaded,
    Written,
    PlanBuilt,
    CacheReloaded,
    IndexesCleared,
    SchedulerReloaded,
    AuxReloaded,
    Done,
}

impl PassState {
    /// The next state. `Done` is terminal.
    pub fn advance(self) -> Self {
        match self {
            Self::Idle => Self::Loaded,
            Self::Loaded => Self::Written,
            Self::Written => Self::PlanBuilt,
            Self::PlanBuilt => Self::CacheReloaded,
            Self::CacheReloaded => Self::IndexesCleared,
            Self::IndexesCleared => Self::SchedulerReloaded,
            Self::SchedulerReloaded => Self::AuxReloaded,
            Self::AuxReloaded | Self::Done => Self::Done,
        }
    }

    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Written => "written",
            Self::PlanBuilt => "plan-built",
            Self::CacheReloaded => "cache-reloaded",
            Self::IndexesCleared => "indexes-cleared",
            Self::SchedulerReloaded => "scheduler-reloaded",
            Self::AuxReloaded => "aux-reloaded",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// What happened to one invalidation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

impl StepOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_in_order_to_done() {
        let mut state = PassState::Idle;
        let mut seen = vec![state];
        while !state.is_done() {
            state = state.advance();
            seen.push(state);
        }
        assert_eq!(seen.len(), 9);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(PassState::Done.advance(), PassState::Done);
    }

    #[test]
    fn display_is_kebab_case() {
        assert_eq!(PassState::IndexesCleared.to_string(), "indexes-cleared");
    }
}
