use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Per-request pipeline state. Exists only once the router found a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Matched,
    ResolvingDependencies,
    Validating,
    Executing,
    Succeeded,
    Failed,
}

impl PipelineState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Each non-terminal state advances to its successor or to `Failed`;
    /// only `Executing` may reach `Succeeded`.
    #[must_use]
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Matched, ResolvingDependencies)
                | (ResolvingDependencies, Validating)
                | (Validating, Executing)
                | (Executing, Succeeded)
                | (Matched | ResolvingDependencies | Validating | Executing, Failed)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Matched => "matched",
            PipelineState::ResolvingDependencies => "resolving_dependencies",
            PipelineState::Validating => "validating",
            PipelineState::Executing => "executing",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State machine for one request, recording every state it passed through.
#[derive(Debug, Clone)]
pub struct Pipeline {
    history: Vec<PipelineState>,
}

impl Pipeline {
    /// Start in `Matched`.
    #[must_use]
    pub fn start() -> Self {
        Self {
            history: vec![PipelineState::Matched],
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        // history always holds at least `Matched`
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Matched)
    }

    /// Move to `next`. Illegal transitions are logged and ignored, so the
    /// recorded history only ever contains legal steps.
    pub fn advance(&mut self, next: PipelineState) -> bool {
        let current = self.state();
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Illegal pipeline transition ignored");
            return false;
        }
        debug!(from = %current, to = %next, "Pipeline transition");
        self.history.push(next);
        true
    }

    pub fn fail(&mut self) -> bool {
        self.advance(PipelineState::Failed)
    }

    #[must_use]
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    #[must_use]
    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}
