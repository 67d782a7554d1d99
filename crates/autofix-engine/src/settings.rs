use crate::detect::DEFAULT_FORCED_FIX_CONFIDENCE;
use crate::merge::MergePolicy;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const MIN_DERIVED_ITERATIONS: u32 = 3;
pub const MAX_DERIVED_ITERATIONS: u32 = 10;
pub const LINES_PER_EXTRA_ITERATION: usize = 25;

/// Tunables for one `RepairEngine`. Shared read-only by every session.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Budget used when a request omits `max_iterations` and derivation is off.
    pub max_iterations: u32,
    /// Derive the omitted budget from source size instead of `max_iterations`.
    pub derive_budget: bool,
    pub min_derived_iterations: u32,
    pub max_derived_iterations: u32,
    pub lines_per_extra_iteration: usize,
    pub forced_fix_confidence: f32,
    pub merge: MergePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            derive_budget: true,
            min_derived_iterations: MIN_DERIVED_ITERATIONS,
            max_derived_iterations: MAX_DERIVED_ITERATIONS,
            lines_per_extra_iteration: LINES_PER_EXTRA_ITERATION,
            forced_fix_confidence: DEFAULT_FORCED_FIX_CONFIDENCE,
            merge: MergePolicy::default(),
        }
    }
}

impl EngineSettings {
    /// Iteration budget for a request that did not name one.
    pub fn budget_for(&self, code: &str) -> u32 {
        if !self.derive_budget {
            return self.max_iterations.max(1);
        }
        let lines = code.lines().count();
        let extra = lines / self.lines_per_extra_iteration.max(1);
        let extra = u32::try_from(extra).unwrap_or(u32::MAX);
        let ceiling = self.max_derived_iterations.max(self.min_derived_iterations);
        self.min_derived_iterations
            .saturating_add(extra)
            .clamp(self.min_derived_iterations.max(1), ceiling.max(1))
    }
}
