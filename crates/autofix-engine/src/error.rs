use autofix_core::SandboxError;

/// Failures that end a session and reach the caller.
///
/// Everything recoverable (no applicable rule, model timeouts, merge and
/// surface rejections) is handled inside the controller and never appears here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("model transport failure: {0}")]
    ModelTransport(String),
}

impl EngineError {
    /// Short machine label, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::Sandbox(_) => "sandbox_unavailable",
            EngineError::ModelTransport(_) => "model_transport",
        }
    }
}
