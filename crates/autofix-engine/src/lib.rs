//! Repair engine: classification, detection, fixing, merging and the
//! iteration controller that ties them together.

pub mod classify;
pub mod controller;
pub mod detect;
pub mod error;
pub mod llm;
pub mod merge;
pub mod recorder;
pub mod settings;
pub mod strategy;
pub mod structural;
pub mod surface;

pub use classify::classify;
pub use controller::{RepairEngine, MAX_FAILED_FORCED_ATTEMPTS};
pub use detect::{DetectorRegistry, Finding, PatternDetector};
pub use error::EngineError;
pub use llm::{ChatClient, ChatSettings, GenerativeFixer, ModelClient, ModelError, ModelFuture};
pub use merge::{MergeMode, MergeOutcome, MergePolicy, MergeRejection};
pub use recorder::{apply_records, record, ChangeContext};
pub use settings::EngineSettings;
pub use strategy::FixStrategy;
pub use structural::{NoApplicableRule, StructuralFixer, StructuralRule};
pub use surface::SurfaceRejection;
