use std::sync::Arc;
use std::time::Duration;

use research_core::{Pricing, TokenUsage};
use research_logging::research_trace;

use crate::inference::{InferenceBackend, InferenceError, InferenceFailureKind};
use crate::rate_limit::RateLimiter;
use crate::token::{estimate_usage, TokenCounter, WhitespaceTokenCounter};

/// A completion with its accounted usage and price.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteredCompletion {
    pub text: String,
    pub usage: TokenUsage,
    pub cost: f64,
    /// Usage was estimated locally because the backend reported none.
    pub estimated_usage: bool,
}

/// The only path into the inference backend: rate limited, time boxed, metered.
pub struct ThrottledInference {
    backend: Arc<dyn InferenceBackend>,
    limiter: Arc<RateLimiter>,
    call_timeout: Duration,
    pricing: Pricing,
    counter: Box<dyn TokenCounter>,
}

impl ThrottledInference {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        limiter: Arc<RateLimiter>,
        call_timeout: Duration,
        pricing: Pricing,
    ) -> Self {
        Self {
            backend,
            limiter,
            call_timeout,
            pricing,
            counter: Box::new(WhitespaceTokenCounter),
        }
    }

    pub fn with_token_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Waits for a rate-limit token, then calls the backend under the per-call timeout.
    ///
    /// The timeout covers only the backend call, not the rate-limit wait.
    pub async fn call(&self, prompt: &str) -> Result<MeteredCompletion, InferenceError> {
        self.limiter
            .acquire(1)
            .await
            .map_err(|err| InferenceError::new(InferenceFailureKind::InvalidConfig, err.to_string()))?;

        let completion = tokio::time::timeout(self.call_timeout, self.backend.complete(prompt))
            .await
            .map_err(|_| {
                InferenceError::new(
                    InferenceFailureKind::Timeout,
                    format!("no response within {:?}", self.call_timeout),
                )
            })??;

        let (usage, estimated_usage) = match completion.usage {
            Some(usage) => (usage, false),
            None => (
                estimate_usage(self.counter.as_ref(), prompt, &completion.text),
                true,
            ),
        };
        let cost = self.pricing.cost_of(usage);
        research_trace!(
            "inference call input_tokens={} output_tokens={} cost=${:.6} estimated={}",
            usage.input_tokens,
            usage.output_tokens,
            cost,
            estimated_usage
        );
        Ok(MeteredCompletion {
            text: completion.text,
            usage,
            cost,
            estimated_usage,
        })
    }
}
