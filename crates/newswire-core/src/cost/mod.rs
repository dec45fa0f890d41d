//! Spend accounting against the daily budget.

pub mod clock;
pub mod tracker;
