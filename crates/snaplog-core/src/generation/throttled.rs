//! Generation service wrapped by the shared throttle.

use crate::throttle::{ThrottleError, ThrottledInvoker};
use log::debug;
use snaplog_protocol::{GenerationAttempt, GenerationReply, GenerationRequest, GenerationService};
use std::sync::Arc;

/// Routes every request through one `ThrottledInvoker`.
#[derive(Clone)]
pub struct ThrottledGenerator {
    inner: Arc<dyn GenerationService>,
    invoker: Arc<ThrottledInvoker>,
}

impl ThrottledGenerator {
    pub fn new(inner: Arc<dyn GenerationService>, invoker: Arc<ThrottledInvoker>) -> Self {
        Self { inner, invoker }
    }

    pub fn invoker(&self) -> &Arc<ThrottledInvoker> {
        &self.invoker
    }

    /// One throttled round trip, with the attempt record for debugging.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<(GenerationReply, GenerationAttempt), ThrottleError> {
        let label = format!("{}:{}", self.inner.name(), request.purpose.as_str());
        let reply = self
            .invoker
            .invoke(&label, || self.inner.generate(request.clone()))
            .await?;
        let attempt = GenerationAttempt::new(&request, reply.content.clone());
        debug!(
            "generation complete (label={label}, model={}, output_chars={})",
            reply.model,
            reply.content.chars().count()
        );
        Ok((reply, attempt))
    }
}
