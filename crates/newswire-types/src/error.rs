use thiserror::Error;

use crate::article::RoleFailureReason;
use crate::llm::{LlmError, Role};

/// Rejection from the daily budget ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error(
        "daily budget exceeded: requested ${requested_usd:.6}, spent ${spent_usd:.6}, \
         reserved ${reserved_usd:.6}, limit ${limit_usd:.2}"
    )]
    Exceeded {
        requested_usd: f64,
        spent_usd: f64,
        reserved_usd: f64,
        limit_usd: f64,
    },
}

impl BudgetError {
    pub fn requested_usd(&self) -> f64 {
        match self {
            BudgetError::Exceeded { requested_usd, .. } => *requested_usd,
        }
    }

    /// Headroom left once spend and outstanding holds are subtracted.
    pub fn remaining_usd(&self) -> f64 {
        match self {
            BudgetError::Exceeded {
                spent_usd,
                reserved_usd,
                limit_usd,
                ..
            } => (limit_usd - spent_usd - reserved_usd).max(0.0),
        }
    }
}

/// Terminal failure of one role for one article.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoleError {
    #[error("budget exceeded: requested ${requested_usd:.6}, remaining ${remaining_usd:.6}")]
    BudgetExceeded {
        requested_usd: f64,
        remaining_usd: f64,
    },

    #[error("all providers failed after {attempts} attempts: {last_error}")]
    AllProvidersFailed { last_error: LlmError, attempts: u32 },

    #[error("no providers configured for role '{role}'")]
    NoProviders { role: Role },

    #[error("cancelled")]
    Cancelled,
}

impl From<BudgetError> for RoleError {
    fn from(err: BudgetError) -> Self {
        RoleError::BudgetExceeded {
            requested_usd: err.requested_usd(),
            remaining_usd: err.remaining_usd(),
        }
    }
}

impl From<&RoleError> for RoleFailureReason {
    fn from(err: &RoleError) -> Self {
        match err {
            RoleError::BudgetExceeded {
                requested_usd,
                remaining_usd,
            } => RoleFailureReason::BudgetExceeded {
                requested_usd: *requested_usd,
                remaining_usd: *remaining_usd,
            },
            RoleError::AllProvidersFailed {
                last_error,
                attempts,
            } => RoleFailureReason::AllProvidersFailed {
                last_error: last_error.clone(),
                attempts: *attempts,
            },
            RoleError::NoProviders { .. } => RoleFailureReason::NoProviders,
            RoleError::Cancelled => RoleFailureReason::Cancelled,
        }
    }
}

/// Per-article pipeline outcome when no `ProcessedArticle` is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Every role was refused by the budget ledger before any call was issued.
    #[error("rejected before any call: daily budget exhausted (spent ${spent_usd:.4} of ${limit_usd:.2})")]
    BudgetExhausted { spent_usd: f64, limit_usd: f64 },

    #[error("article '{article_id}' failed (summary: {summary:?}, sentiment: {sentiment:?})")]
    Failed {
        article_id: String,
        summary: Option<RoleError>,
        sentiment: Option<RoleError>,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("role '{role}' routes to unknown provider '{provider}'")]
    UnknownProvider { role: Role, provider: String },

    #[error("role '{role}' must have 1 or 2 providers, found {count}")]
    InvalidRouting { role: Role, count: usize },

    #[error("missing API key: set {env_var} for provider '{provider}'")]
    MissingApiKey { provider: String, env_var: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from repository operations (used by trait definitions in newswire-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors from the upstream news source.
#[derive(Debug, Error)]
pub enum NewsSourceError {
    #[error("news source request failed: {0}")]
    Request(String),

    #[error("news source rejected request: {status} {message}")]
    Rejected { status: u16, message: String },

    #[error("news source returned malformed data: {0}")]
    Malformed(String),
}
