use std::fmt;

use serde::{Deserialize, Serialize};

use crate::JobCost;

/// Stop-policy thresholds for one research run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchLimits {
    /// Budget ceiling in USD; exceeding it strictly stops the run.
    pub max_total_cost: f64,
    /// Input-token ceiling; exceeding it strictly stops the run.
    pub max_input_tokens: u64,
    /// Failed segments beyond this count flag the run for strategy adjustment.
    pub failure_threshold: usize,
}

impl Default for ResearchLimits {
    fn default() -> Self {
        Self {
            max_total_cost: 10.0,
            max_input_tokens: 500_000,
            failure_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Every segment has been analyzed.
    AllPagesProcessed,
    BudgetExceeded { total_cost: f64, limit: f64 },
    TokenCeilingExceeded { input_tokens: u64, limit: u64 },
    /// No batches left; some segments failed so coverage is partial.
    BatchesExhausted,
}

impl StopReason {
    /// True when the run ended before every segment had a chance to run.
    pub fn is_early(&self) -> bool {
        matches!(
            self,
            StopReason::BudgetExceeded { .. } | StopReason::TokenCeilingExceeded { .. }
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::AllPagesProcessed => write!(f, "all pages processed"),
            StopReason::BudgetExceeded { total_cost, limit } => {
                write!(f, "budget exceeded (${total_cost:.2} > ${limit:.2})")
            }
            StopReason::TokenCeilingExceeded {
                input_tokens,
                limit,
            } => write!(
                f,
                "input token ceiling exceeded ({input_tokens} > {limit})"
            ),
            StopReason::BatchesExhausted => write!(f, "all batches dispatched"),
        }
    }
}

impl ResearchLimits {
    /// First matching stop condition, in order: coverage, budget, tokens.
    pub fn evaluate(
        &self,
        completed_pages: usize,
        total_pages: usize,
        cost: &JobCost,
    ) -> Option<StopReason> {
        if completed_pages >= total_pages {
            return Some(StopReason::AllPagesProcessed);
        }
        if cost.total_cost > self.max_total_cost {
            return Some(StopReason::BudgetExceeded {
                total_cost: cost.total_cost,
                limit: self.max_total_cost,
            });
        }
        if cost.input_tokens > self.max_input_tokens {
            return Some(StopReason::TokenCeilingExceeded {
                input_tokens: cost.input_tokens,
                limit: self.max_input_tokens,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(total_cost: f64, input_tokens: u64) -> JobCost {
        JobCost {
            input_tokens,
            output_tokens: 0,
            total_cost,
        }
    }

    #[test]
    fn completion_wins_over_budget() {
        let limits = ResearchLimits::default();
        assert_eq!(
            limits.evaluate(10, 10, &cost(50.0, 900_000)),
            Some(StopReason::AllPagesProcessed)
        );
    }

    #[test]
    fn budget_is_a_strict_ceiling() {
        let limits = ResearchLimits::default();
        assert_eq!(limits.evaluate(1, 10, &cost(10.0, 0)), None);
        assert!(matches!(
            limits.evaluate(1, 10, &cost(10.01, 0)),
            Some(StopReason::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn budget_checked_before_tokens() {
        let limits = ResearchLimits::default();
        assert!(matches!(
            limits.evaluate(0, 10, &cost(11.0, 600_000)),
            Some(StopReason::BudgetExceeded { .. })
        ));
        assert!(matches!(
            limits.evaluate(0, 10, &cost(1.0, 500_001)),
            Some(StopReason::TokenCeilingExceeded { .. })
        ));
        assert_eq!(limits.evaluate(0, 10, &cost(1.0, 500_000)), None);
    }
}
