//! Article domain types: the pipeline's input, its per-role outputs and the
//! terminal `ProcessedArticle` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::llm::{LlmError, Role};

/// A news article as delivered by the news source. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub content: String,
}

/// One billed call, as recorded by the cost ledger. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub role: Role,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

/// Sentiment classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Negative => write!(f, "negative"),
            SentimentLabel::Neutral => write!(f, "neutral"),
        }
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            other => Err(format!("invalid sentiment label: '{other}'")),
        }
    }
}

/// A generated summary together with the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub provider: String,
    pub usage: UsageRecord,
}

/// A sentiment judgment together with the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub explanation: String,
    pub provider: String,
    pub usage: UsageRecord,
}

/// Value stored in the response cache, one variant per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum CachedResult {
    Summarize(Summary),
    Sentiment(SentimentResult),
}

impl CachedResult {
    pub fn role(&self) -> Role {
        match self {
            CachedResult::Summarize(_) => Role::Summarize,
            CachedResult::Sentiment(_) => Role::Sentiment,
        }
    }
}

/// A role that did not produce a value, with the error that ended it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleFailure {
    pub role: Role,
    pub error: RoleFailureReason,
}

/// Serializable form of a role-level failure attached to a partial result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RoleFailureReason {
    BudgetExceeded {
        requested_usd: f64,
        remaining_usd: f64,
    },
    AllProvidersFailed {
        last_error: LlmError,
        attempts: u32,
    },
    NoProviders,
    Cancelled,
}

impl fmt::Display for RoleFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleFailureReason::BudgetExceeded {
                requested_usd,
                remaining_usd,
            } => write!(
                f,
                "budget exceeded (requested ${requested_usd:.6}, remaining ${remaining_usd:.6})"
            ),
            RoleFailureReason::AllProvidersFailed {
                last_error,
                attempts,
            } => write!(f, "all providers failed after {attempts} attempts: {last_error}"),
            RoleFailureReason::NoProviders => write!(f, "no providers configured"),
            RoleFailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Whether every role produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Complete,
    Partial,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Complete => write!(f, "complete"),
            ProcessingStatus::Partial => write!(f, "partial"),
        }
    }
}

/// Terminal artifact of one pipeline run for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub article: Article,
    pub summary: Option<Summary>,
    pub sentiment: Option<SentimentResult>,
    /// Roles that produced no value, with their errors.
    #[serde(default)]
    pub failures: Vec<RoleFailure>,
    /// Roles served from the response cache in this run.
    #[serde(default)]
    pub cache_hits: Vec<Role>,
    /// Spend billed by this run. Cache hits contribute nothing.
    pub total_cost_usd: f64,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedArticle {
    pub fn status(&self) -> ProcessingStatus {
        if self.summary.is_some() && self.sentiment.is_some() {
            ProcessingStatus::Complete
        } else {
            ProcessingStatus::Partial
        }
    }

    pub fn failure(&self, role: Role) -> Option<&RoleFailureReason> {
        self.failures
            .iter()
            .find(|f| f.role == role)
            .map(|f| &f.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(role: Role) -> UsageRecord {
        UsageRecord {
            provider: "openai".to_string(),
            role,
            input_tokens: 100,
            output_tokens: 20,
            cost_usd: 0.0001,
            timestamp: Utc::now(),
        }
    }

    fn article() -> Article {
        Article {
            id: "a1".to_string(),
            title: "Markets rally".to_string(),
            source: "Reuters".to_string(),
            published_at: Utc::now(),
            url: "https://example.com/a1".to_string(),
            content: "Stocks rose sharply.".to_string(),
        }
    }

    #[test]
    fn test_sentiment_label_parse_is_lenient_on_case_and_space() {
        assert_eq!(
            " Positive ".parse::<SentimentLabel>().unwrap(),
            SentimentLabel::Positive
        );
        assert!("mixed".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn test_status_partial_when_role_missing() {
        let processed = ProcessedArticle {
            article: article(),
            summary: Some(Summary {
                text: "Stocks rose.".to_string(),
                provider: "openai".to_string(),
                usage: usage(Role::Summarize),
            }),
            sentiment: None,
            failures: vec![RoleFailure {
                role: Role::Sentiment,
                error: RoleFailureReason::NoProviders,
            }],
            cache_hits: vec![],
            total_cost_usd: 0.0001,
            processed_at: Utc::now(),
        };
        assert_eq!(processed.status(), ProcessingStatus::Partial);
        assert_eq!(
            processed.failure(Role::Sentiment),
            Some(&RoleFailureReason::NoProviders)
        );
        assert!(processed.failure(Role::Summarize).is_none());
    }

    #[test]
    fn test_cached_result_tagged_by_role() {
        let cached = CachedResult::Sentiment(SentimentResult {
            label: SentimentLabel::Negative,
            confidence: 0.8,
            explanation: "Layoffs announced.".to_string(),
            provider: "anthropic".to_string(),
            usage: usage(Role::Sentiment),
        });
        let json = serde_json::to_value(&cached).unwrap();
        assert_eq!(json["role"], "sentiment");
        assert_eq!(json["label"], "negative");
        let back: CachedResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.role(), Role::Sentiment);
        assert_eq!(back, cached);
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = RoleFailureReason::AllProvidersFailed {
            last_error: LlmError::AuthenticationFailed,
            attempts: 3,
        };
        let text = reason.to_string();
        assert!(text.contains("3 attempts"), "got {text}");
        assert!(text.contains("authentication"), "got {text}");
    }
}
