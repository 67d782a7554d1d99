//! Fix strategy selection.
//!
//! The controller picks a strategy from the failure kind and guard state.
//! Structural misses fall through to the generative fixer; generative
//! strategies have no further fallback within an iteration.

use autofix_core::{FailureDescriptor, FailureKind, FixMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStrategy {
    Structural,
    Generative,
    ForcedGenerative,
}

impl FixStrategy {
    pub fn select(failure: &FailureDescriptor, forced: bool) -> Self {
        if forced {
            FixStrategy::ForcedGenerative
        } else if failure.kind == FailureKind::SemanticMismatch {
            FixStrategy::Generative
        } else {
            FixStrategy::Structural
        }
    }

    pub fn method(self) -> FixMethod {
        match self {
            FixStrategy::Structural => FixMethod::Ast,
            FixStrategy::Generative => FixMethod::Llm,
            FixStrategy::ForcedGenerative => FixMethod::ForcedLlm,
        }
    }

    /// Strategy to try when this one yields nothing.
    pub fn fallback(self) -> Option<Self> {
        match self {
            FixStrategy::Structural => Some(FixStrategy::Generative),
            FixStrategy::Generative | FixStrategy::ForcedGenerative => None,
        }
    }
}
