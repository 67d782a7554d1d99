//! Runtime adapters for autofix (config, process sandbox, report persistence).

pub mod config;
pub mod report;
pub mod sandbox;
pub mod util;

pub use config::Config;
pub use report::ReportStore;
pub use sandbox::PythonSandbox;
