use super::client::{ModelClient, ModelError};
use super::extract::extract_code;
use super::prompts::{RepairPrompt, RepairTrigger, REPAIR_SYSTEM};
use crate::detect::Finding;
use crate::error::EngineError;
use autofix_core::{FailureDescriptor, FixCandidate, FixMethod, Snapshot};
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence attached to model-produced candidates.
pub const GENERATIVE_CONFIDENCE: f32 = 0.5;

/// Generative fallback fixer: one model call per attempt.
#[derive(Clone)]
pub struct GenerativeFixer {
    client: Arc<dyn ModelClient>,
}

impl GenerativeFixer {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Ask the model for a corrected file.
    ///
    /// Soft failures (timeout, unavailable, empty, refused, nothing
    /// extractable) come back as `Ok(None)`. A malformed transport response
    /// is the only error.
    pub async fn attempt(
        &self,
        snapshot: &Snapshot,
        failure: Option<&FailureDescriptor>,
        findings: &[Finding],
        instructions: &str,
        method: FixMethod,
    ) -> Result<Option<FixCandidate>, EngineError> {
        let trigger = if method == FixMethod::ForcedLlm {
            RepairTrigger::Forced
        } else {
            RepairTrigger::Failure
        };
        let user = RepairPrompt {
            code: snapshot.source(),
            failure,
            findings,
            instructions,
            trigger,
        }
        .render();

        let reply = match self.client.complete(REPAIR_SYSTEM, &user).await {
            Ok(reply) => reply,
            Err(err @ ModelError::MalformedTransport(_)) => {
                return Err(EngineError::ModelTransport(err.to_string()));
            }
            Err(err) => {
                warn!(method = %method, error = %err, "generative fix attempt failed");
                return Ok(None);
            }
        };

        let Some(proposed) = extract_code(&reply) else {
            debug!(method = %method, "model reply contained no code");
            return Ok(None);
        };
        Ok(Some(FixCandidate {
            method,
            proposed,
            confidence: GENERATIVE_CONFIDENCE,
            edit: None,
            rationale: self.client.model_name().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ModelFuture;
    use autofix_core::SnapshotChain;

    struct Canned(Result<String, ModelError>);

    impl ModelClient for Canned {
        fn complete<'a>(&'a self, _system: &'a str, _user: &'a str) -> ModelFuture<'a> {
            let reply = self.0.clone();
            Box::pin(async move { reply })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    async fn run(reply: Result<String, ModelError>) -> Result<Option<FixCandidate>, EngineError> {
        let chain = SnapshotChain::new("x = 1\n");
        GenerativeFixer::new(Arc::new(Canned(reply)))
            .attempt(chain.current(), None, &[], "", FixMethod::Llm)
            .await
    }

    #[tokio::test]
    async fn reply_becomes_candidate() {
        let candidate = run(Ok("```python\nx = 2\n```".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candidate.proposed, "x = 2\n");
        assert_eq!(candidate.method, FixMethod::Llm);
        assert_eq!(candidate.confidence, GENERATIVE_CONFIDENCE);
        assert_eq!(candidate.rationale, "canned");
        assert!(candidate.edit.is_none());
    }

    #[tokio::test]
    async fn soft_failures_are_none() {
        for err in [
            ModelError::Timeout(std::time::Duration::from_secs(1)),
            ModelError::Unavailable("down".to_string()),
            ModelError::Empty,
            ModelError::Refused("no".to_string()),
        ] {
            assert!(run(Err(err)).await.unwrap().is_none());
        }
        assert!(run(Ok("```python\n```".to_string())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_transport_is_fatal() {
        let err = run(Err(ModelError::MalformedTransport("html".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelTransport(_)));
    }
}
