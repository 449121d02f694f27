use std::time::Duration;

use research_core::{Pricing, ResearchLimits, DEFAULT_HIGHLIGHT_CAPACITY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::duration_secs;
use crate::rate_limit::RateLimitSettings;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("cost limit must be a non-negative number, got {0}")]
    CostLimit(f64),
    #[error("call timeout must be longer than zero")]
    CallTimeout,
}

/// Tuning for research runs. Every field has a working default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Segments per batch; the stop policy is re-evaluated between batches.
    pub batch_size: usize,
    /// Hard ceiling on in-flight segment analyses.
    pub max_concurrent: usize,
    /// Requested worker count, capped by `max_concurrent`.
    pub workers: usize,
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
    pub highlight_capacity: usize,
    pub limits: ResearchLimits,
    pub pricing: Pricing,
    pub rate_limit: RateLimitSettings,
    /// Evidence records quoted in the final summary.
    pub summary_evidence_limit: usize,
    pub store_retry_attempts: u32,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_concurrent: 4,
            workers: 4,
            call_timeout: Duration::from_secs(120),
            highlight_capacity: DEFAULT_HIGHLIGHT_CAPACITY,
            limits: ResearchLimits::default(),
            pricing: Pricing::default(),
            rate_limit: RateLimitSettings::default(),
            summary_evidence_limit: 10,
            store_retry_attempts: 3,
        }
    }
}

impl ResearchSettings {
    /// Number of segment analyses allowed in flight at once (at least 1).
    pub fn concurrency(&self) -> usize {
        self.workers.min(self.max_concurrent).max(1)
    }

    /// Batch size, at least 1.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Checks the values a run depends on, whichever layer they came from.
    ///
    /// A NaN cost limit would never trip the budget stop and a negative one
    /// would stop every run after the plan call.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sizes = [
            ("batch size", self.batch_size),
            ("max concurrent", self.max_concurrent),
            ("workers", self.workers),
        ];
        if let Some((field, _)) = sizes.into_iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::Zero(field));
        }
        let limit = self.limits.max_total_cost;
        if !limit.is_finite() || limit < 0.0 {
            return Err(SettingsError::CostLimit(limit));
        }
        if self.call_timeout.is_zero() {
            return Err(SettingsError::CallTimeout);
        }
        Ok(())
    }
}

/// Per-run knobs a caller may override without touching deployment settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOverrides {
    pub batch_size: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub workers: Option<usize>,
    pub max_total_cost: Option<f64>,
    pub max_input_tokens: Option<u64>,
}

impl RunOverrides {
    pub fn apply_to(&self, base: &ResearchSettings) -> ResearchSettings {
        let mut settings = base.clone();
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            settings.max_concurrent = max_concurrent;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(max_total_cost) = self.max_total_cost {
            settings.limits.max_total_cost = max_total_cost;
        }
        if let Some(max_input_tokens) = self.max_input_tokens {
            settings.limits.max_input_tokens = max_input_tokens;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_capped_by_max_concurrent() {
        let settings = ResearchSettings {
            workers: 8,
            max_concurrent: 3,
            ..ResearchSettings::default()
        };
        assert_eq!(settings.concurrency(), 3);

        let settings = ResearchSettings {
            workers: 0,
            ..ResearchSettings::default()
        };
        assert_eq!(settings.concurrency(), 1);
    }

    #[test]
    fn overrides_only_touch_given_fields() {
        let base = ResearchSettings::default();
        let overrides = RunOverrides {
            batch_size: Some(5),
            max_total_cost: Some(2.5),
            ..RunOverrides::default()
        };
        let settings = overrides.apply_to(&base);
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.limits.max_total_cost, 2.5);
        assert_eq!(settings.max_concurrent, base.max_concurrent);
        assert_eq!(settings.limits.max_input_tokens, base.limits.max_input_tokens);
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ResearchSettings::default().validate(), Ok(()));
    }

    #[test]
    fn unusable_cost_limits_are_rejected() {
        for limit in [f64::NAN, f64::INFINITY, -1.0] {
            let settings = RunOverrides {
                max_total_cost: Some(limit),
                ..RunOverrides::default()
            }
            .apply_to(&ResearchSettings::default());
            assert!(matches!(
                settings.validate(),
                Err(SettingsError::CostLimit(_))
            ));
        }
        let free = RunOverrides {
            max_total_cost: Some(0.0),
            ..RunOverrides::default()
        }
        .apply_to(&ResearchSettings::default());
        assert_eq!(free.validate(), Ok(()));
    }

    #[test]
    fn zero_sizes_and_timeouts_are_rejected() {
        let settings = ResearchSettings {
            max_concurrent: 0,
            ..ResearchSettings::default()
        };
        assert_eq!(
            settings.validate().unwrap_err().to_string(),
            "max concurrent must be at least 1"
        );
        let settings = ResearchSettings {
            call_timeout: Duration::ZERO,
            ..ResearchSettings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::CallTimeout));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ResearchSettings =
            serde_json::from_str(r#"{"batch_size": 10, "call_timeout": 30}"#).unwrap();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.call_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_concurrent, 4);
    }
}
