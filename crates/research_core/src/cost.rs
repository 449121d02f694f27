use serde::{Deserialize, Serialize};

use crate::JobCost;

/// Token usage reported (or estimated) for one inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// USD prices per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl Pricing {
    pub fn cost_of(&self, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 / 1_000_000.0 * self.input_per_million
            + usage.output_tokens as f64 / 1_000_000.0 * self.output_per_million
    }
}

/// Running totals for one research run. Only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostTracker {
    input_tokens: u64,
    output_tokens: u64,
    total_cost: f64,
    calls: u64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, usage: TokenUsage, cost: f64) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.total_cost += cost.max(0.0);
        self.calls += 1;
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn summary(&self) -> JobCost {
        JobCost {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_cost: self.total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_is_per_million_tokens() {
        let pricing = Pricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
        };
        let cost = pricing.cost_of(TokenUsage::new(1_000_000, 100_000));
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn tracker_accumulates_and_ignores_negative_cost() {
        let mut tracker = CostTracker::new();
        tracker.record(TokenUsage::new(10, 5), 0.25);
        tracker.record(TokenUsage::new(1, 1), -3.0);
        let summary = tracker.summary();
        assert_eq!(summary.input_tokens, 11);
        assert_eq!(summary.output_tokens, 6);
        assert!((summary.total_cost - 0.25).abs() < 1e-9);
        assert_eq!(tracker.calls(), 2);
    }
}
