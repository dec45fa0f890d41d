//! Prompt construction and response parsing for the two roles.

use serde::Deserialize;

use newswire_types::article::SentimentLabel;
use newswire_types::llm::{CompletionRequest, LlmError, Message};

pub const SUMMARY_MAX_TOKENS: u32 = 300;
pub const SENTIMENT_MAX_TOKENS: u32 = 200;

const SUMMARY_SYSTEM: &str = "You are a news editor. Write concise, factual summaries.";

const SENTIMENT_SYSTEM: &str = "You classify the sentiment of news text. \
Respond with a single JSON object and nothing else: \
{\"label\": \"positive\" | \"negative\" | \"neutral\", \
\"confidence\": number between 0 and 1, \
\"explanation\": one short sentence}";

/// Chat framing tokens charged per message, and once more per request.
const FRAMING_TOKENS: u32 = 8;

/// Rough token estimate (~4 characters per token), billed when a backend
/// omits usage.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

/// Input token estimate for a whole request, system prompt included.
pub fn estimate_request_tokens(request: &CompletionRequest) -> u32 {
    let system = request.system.as_deref().map(estimate_tokens).unwrap_or(0);
    let messages: u32 = request
        .messages
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum();
    system + messages
}

/// Upper bound on the input tokens a request can be billed for.
///
/// Byte-level BPE tokenizers never emit more tokens than the text has UTF-8
/// bytes, so the byte length bounds every script, CJK included.
pub fn max_request_tokens(request: &CompletionRequest) -> u32 {
    let bytes = request.system.as_deref().map_or(0, str::len)
        + request
            .messages
            .iter()
            .map(|m| m.content.len())
            .sum::<usize>();
    let framing = FRAMING_TOKENS.saturating_mul(request.messages.len() as u32 + 1);
    u32::try_from(bytes)
        .unwrap_or(u32::MAX)
        .saturating_add(framing)
}

pub fn summarize_request(model: &str, content: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![Message::user(format!(
            "Summarize the following news article in 2-3 sentences.\n\n{content}"
        ))],
        system: Some(SUMMARY_SYSTEM.to_string()),
        max_tokens: SUMMARY_MAX_TOKENS,
        temperature: Some(0.3),
    }
}

pub fn sentiment_request(model: &str, text: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![Message::user(format!(
            "Analyze the sentiment of this news text.\n\n{text}"
        ))],
        system: Some(SENTIMENT_SYSTEM.to_string()),
        max_tokens: SENTIMENT_MAX_TOKENS,
        temperature: Some(0.0),
    }
}

/// Reject empty or whitespace-only summaries.
pub fn parse_summary(raw: &str) -> Result<String, LlmError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(LlmError::invalid_response("empty summary"));
    }
    Ok(text.to_string())
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    label: String,
    confidence: f64,
    #[serde(default)]
    explanation: String,
}

/// A parsed sentiment judgment, before provider/usage are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSentiment {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub explanation: String,
}

/// Parse the JSON sentiment object out of a model reply.
///
/// Tolerates surrounding prose or a code fence; everything else about the
/// payload must be well formed.
pub fn parse_sentiment(raw: &str) -> Result<ParsedSentiment, LlmError> {
    let start = raw
        .find('{')
        .ok_or_else(|| LlmError::invalid_response("no JSON object in sentiment reply"))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| LlmError::invalid_response("unterminated JSON object in sentiment reply"))?;

    let parsed: RawSentiment = serde_json::from_str(&raw[start..=end])
        .map_err(|e| LlmError::invalid_response(format!("sentiment JSON: {e}")))?;

    let label = parsed
        .label
        .parse::<SentimentLabel>()
        .map_err(LlmError::invalid_response)?;

    if !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(LlmError::invalid_response(format!(
            "confidence {} outside 0..=1",
            parsed.confidence
        )));
    }

    Ok(ParsedSentiment {
        label,
        confidence: parsed.confidence,
        explanation: parsed.explanation.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // Multibyte characters count once each.
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn summarize_request_embeds_content_once() {
        let request = summarize_request("gpt-4o-mini", "BODY");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content.matches("BODY").count(), 1);
        assert_eq!(request.max_tokens, SUMMARY_MAX_TOKENS);
        assert!(estimate_request_tokens(&request) > 0);
    }

    #[test]
    fn max_request_tokens_bounds_non_latin_text() {
        let body = "新".repeat(1_000);
        let request = summarize_request("gpt-4o-mini", &body);

        // One token per character is common for CJK; the bound must cover it.
        let bound = max_request_tokens(&request);
        assert!(bound >= 3_000, "bound {bound} below byte length");
        assert!(bound > estimate_request_tokens(&request) * 4);
    }

    #[test]
    fn max_request_tokens_counts_framing() {
        let request = CompletionRequest {
            model: "m".to_string(),
            messages: vec![Message::user("")],
            system: None,
            max_tokens: 10,
            temperature: None,
        };
        assert_eq!(max_request_tokens(&request), 2 * FRAMING_TOKENS);
    }

    #[test]
    fn parse_summary_rejects_blank() {
        assert!(matches!(
            parse_summary("  \n "),
            Err(LlmError::InvalidResponse { .. })
        ));
        assert_eq!(parse_summary(" Done. ").unwrap(), "Done.");
    }

    #[test]
    fn parse_sentiment_plain_json() {
        let parsed = parse_sentiment(
            r#"{"label": "Negative", "confidence": 0.82, "explanation": "Plant closures."}"#,
        )
        .unwrap();
        assert_eq!(parsed.label, SentimentLabel::Negative);
        assert!((parsed.confidence - 0.82).abs() < f64::EPSILON);
        assert_eq!(parsed.explanation, "Plant closures.");
    }

    #[test]
    fn parse_sentiment_inside_code_fence() {
        let raw = "```json\n{\"label\":\"neutral\",\"confidence\":0.5,\"explanation\":\"Routine.\"}\n```";
        let parsed = parse_sentiment(raw).unwrap();
        assert_eq!(parsed.label, SentimentLabel::Neutral);
    }

    #[test]
    fn parse_sentiment_rejects_bad_payloads() {
        for raw in [
            "",
            "The sentiment is positive.",
            r#"{"label": "mixed", "confidence": 0.5}"#,
            r#"{"label": "positive", "confidence": 1.5}"#,
            r#"{"label": "positive"}"#,
            "} {",
        ] {
            assert!(
                matches!(parse_sentiment(raw), Err(LlmError::InvalidResponse { .. })),
                "expected InvalidResponse for {raw:?}"
            );
        }
    }
}
