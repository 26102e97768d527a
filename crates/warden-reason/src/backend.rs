//! Adapter from a plain text-completion backend to the [`Reasoner`] trait.
//!
//! Model servers expose "prompt in, text out". [`PromptedReasoner`] wraps
//! one behind the structured deliberation contract: it renders the
//! constrained prompt, sends it, and parses the reply into a
//! [`Deliberation`], converting parse failures into structured errors
//! instead of panics.

use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

use crate::{build_prompt, parse_deliberation, Deliberation, ReasonError, ReasonHints, Reasoner};

/// A raw prompt-completion transport (an LLM server client).
///
/// Implementations must respect `deadline` and return
/// [`ReasonError::Unavailable`] when they cannot.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, deadline: Instant) -> Result<String, ReasonError>;
}

/// [`Reasoner`] built from a completion backend plus the constrained
/// prompt and reply parser.
pub struct PromptedReasoner<B> {
    backend: B,
}

impl<B: CompletionBackend> PromptedReasoner<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: CompletionBackend> Reasoner for PromptedReasoner<B> {
    async fn deliberate(
        &self,
        text: &str,
        hints: &ReasonHints,
        deadline: Instant,
    ) -> Result<Deliberation, ReasonError> {
        let prompt = build_prompt(text, hints);
        let reply = self.backend.complete(&prompt, deadline).await?;
        debug!(reply_len = reply.len(), "completion backend replied");
        parse_deliberation(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use warden_contracts::{Action, Escalation, FailureClass};

    struct CannedBackend(&'static str);

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(&self, prompt: &str, _deadline: Instant) -> Result<String, ReasonError> {
            assert!(prompt.contains("<<<TEXT"), "prompt must embed the payload");
            Ok(self.0.to_string())
        }
    }

    fn hints() -> ReasonHints {
        ReasonHints {
            candidates: vec![FailureClass::PromptInjection],
            tentative: Escalation::empty(2, "semantic_clear"),
            context: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_prompted_reasoner_parses_structured_reply() {
        let reasoner = PromptedReasoner::new(CannedBackend(
            r#"Analysis: {"class":"prompt_injection","action":"block","confidence":0.81,"rationale":"indirect override"}"#,
        ));
        let d = reasoner
            .deliberate("text", &hints(), Instant::now() + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(d.class, FailureClass::PromptInjection);
        assert_eq!(d.action, Action::Block);
    }

    #[tokio::test]
    async fn test_prompted_reasoner_surfaces_parse_failure() {
        let reasoner = PromptedReasoner::new(CannedBackend("I cannot comply with that format."));
        let err = reasoner
            .deliberate("text", &hints(), Instant::now() + Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasonError::Parse(_)));
    }
}
