//! Budget Tracker
//!
//! Converts token usage and flat provider charges into one running total.
//! The total only ever grows: negative, NaN and infinite amounts are ignored.

use serde::Serialize;

use crate::llm::{Pricing, TokenUsage};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetTracker {
    ceiling: f64,
    spent: f64,
    input_tokens: u64,
    output_tokens: u64,
}

impl BudgetTracker {
    pub fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            spent: 0.0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Charge model usage: `in/1000 * rate_in + out/1000 * rate_out`
    ///
    /// Returns the amount actually added.
    pub fn add_tokens(
        &mut self,
        tokens_in: u64,
        tokens_out: u64,
        rate_in: f64,
        rate_out: f64,
    ) -> f64 {
        self.input_tokens = self.input_tokens.saturating_add(tokens_in);
        self.output_tokens = self.output_tokens.saturating_add(tokens_out);
        let cost = tokens_in as f64 / 1000.0 * rate_in + tokens_out as f64 / 1000.0 * rate_out;
        self.add_flat(cost)
    }

    /// Charge a reasoning turn at the engine's rates
    pub fn add_usage(&mut self, usage: TokenUsage, pricing: Pricing) -> f64 {
        self.add_tokens(
            usage.input_tokens,
            usage.output_tokens,
            pricing.input_per_1k,
            pricing.output_per_1k,
        )
    }

    /// Charge what a capability spent: its cost, already priced, plus the
    /// model tokens behind it
    pub fn add_spend(&mut self, cost: f64, usage: TokenUsage) -> f64 {
        self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
        self.add_flat(cost)
    }

    /// Charge a flat amount; returns the amount actually added
    pub fn add_flat(&mut self, cost: f64) -> f64 {
        if cost.is_finite() && cost > 0.0 {
            self.spent += cost;
            cost
        } else {
            0.0
        }
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Headroom under the run's ceiling, never negative
    pub fn remaining(&self) -> f64 {
        (self.ceiling - self.spent).max(0.0)
    }

    /// Strictly over `ceiling`; spending exactly the ceiling is allowed
    pub fn exceeded_at(&self, ceiling: f64) -> bool {
        self.spent > ceiling
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded_at(self.ceiling)
    }

    pub fn usage(&self) -> TokenUsage {
        TokenUsage::new(self.input_tokens, self.output_tokens)
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cost() {
        let mut budget = BudgetTracker::new(1.0);
        let added = budget.add_tokens(2000, 500, 0.01, 0.03);
        assert!((added - 0.035).abs() < 1e-12);
        assert_eq!(budget.total_tokens(), 2500);
        assert!((budget.remaining() - 0.965).abs() < 1e-12);
    }

    #[test]
    fn test_exceeded_only_above_ceiling() {
        let mut budget = BudgetTracker::new(1.0);
        budget.add_flat(0.6);
        assert!(!budget.is_exceeded());
        budget.add_flat(0.4);
        assert!(!budget.is_exceeded());
        budget.add_flat(0.01);
        assert!(budget.is_exceeded());
        assert_eq!(budget.remaining(), 0.0);
    }

    #[test]
    fn test_invalid_amounts_ignored() {
        let mut budget = BudgetTracker::new(1.0);
        budget.add_flat(0.2);
        assert_eq!(budget.add_flat(-5.0), 0.0);
        assert_eq!(budget.add_flat(f64::NAN), 0.0);
        assert_eq!(budget.add_flat(f64::INFINITY), 0.0);
        assert_eq!(budget.add_tokens(100, 100, -1.0, -1.0), 0.0);
        assert!((budget.spent() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_capability_spend_counts_tokens_once() {
        let mut budget = BudgetTracker::new(1.0);
        budget.add_usage(TokenUsage::new(100, 50), Pricing::new(1.0, 1.0));
        budget.add_spend(0.3, TokenUsage::new(200, 100));
        assert!((budget.spent() - 0.45).abs() < 1e-12);
        assert_eq!(budget.usage(), TokenUsage::new(300, 150));
    }
}
