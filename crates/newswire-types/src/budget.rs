//! Budget ledger snapshots and usage summaries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the daily budget ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub daily_limit_usd: f64,
    /// Recorded spend since `day_boundary` began. Never decreases within a day.
    pub spent_today_usd: f64,
    /// Spend held by calls that are in flight but not yet settled.
    pub reserved_usd: f64,
    /// The UTC date the current counter belongs to.
    pub day_boundary: NaiveDate,
}

impl BudgetState {
    pub fn remaining_usd(&self) -> f64 {
        (self.daily_limit_usd - self.spent_today_usd - self.reserved_usd).max(0.0)
    }

    /// Fraction of the limit already recorded, 0.0 to 1.0 and beyond.
    pub fn used_fraction(&self) -> f64 {
        if self.daily_limit_usd <= 0.0 {
            return 1.0;
        }
        self.spent_today_usd / self.daily_limit_usd
    }
}

/// Totals for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Totals across every recorded call in this process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub by_provider: BTreeMap<String, ProviderUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_clamps_at_zero() {
        let state = BudgetState {
            daily_limit_usd: 5.0,
            spent_today_usd: 4.5,
            reserved_usd: 1.0,
            day_boundary: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };
        assert_eq!(state.remaining_usd(), 0.0);
        assert!((state.used_fraction() - 0.9).abs() < 1e-9);
    }
}
