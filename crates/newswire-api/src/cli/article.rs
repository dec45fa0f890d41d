//! Stored-article commands: list, search, show.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use newswire_core::storage::article::ArticleRepository;
use newswire_infra::llm::pricing::format_cost;
use newswire_types::article::{ProcessedArticle, ProcessingStatus, SentimentLabel};
use newswire_types::llm::Role;

use crate::state::AppState;

const TITLE_WIDTH: usize = 60;

pub async fn list_articles(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let articles = state.articles.list(limit).await?;
    let total = state.articles.count().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }

    if articles.is_empty() {
        println!();
        println!(
            "  {} No articles stored yet. Fetch some with: {}",
            style("i").blue().bold(),
            style("nwire process").yellow()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", article_table(&articles));
    println!();
    println!(
        "  showing {} of {} article{}",
        style(articles.len()).bold(),
        total,
        if total == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

pub async fn search_articles(state: &AppState, keyword: &str, limit: u32, json: bool) -> Result<()> {
    let articles = state.articles.search(keyword, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }

    println!();
    if articles.is_empty() {
        println!(
            "  {} No articles match '{}'",
            style("i").blue().bold(),
            style(keyword).yellow()
        );
    } else {
        println!("{}", article_table(&articles));
        println!();
        println!(
            "  {} match{} for '{}'",
            style(articles.len()).bold(),
            if articles.len() == 1 { "" } else { "es" },
            keyword
        );
    }
    println!();
    Ok(())
}

pub async fn show_article(state: &AppState, url: &str, json: bool) -> Result<()> {
    let article = state
        .articles
        .get_by_url(url)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no stored article with URL '{url}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&article)?);
        return Ok(());
    }

    print_article(&article);
    Ok(())
}

/// Detailed view of one processed article.
pub fn print_article(processed: &ProcessedArticle) {
    let article = &processed.article;
    println!();
    println!("  {}", style(&article.title).bold().cyan());
    println!(
        "  {} {} {}",
        style(&article.source).dim(),
        style("·").dim(),
        style(article.published_at.format("%Y-%m-%d %H:%M UTC")).dim()
    );
    println!("  {}", style(&article.url).underlined().dim());
    println!();

    println!("  {}", style("── Summary ──").dim());
    match (&processed.summary, processed.failure(Role::Summarize)) {
        (Some(summary), _) => {
            println!("  {}", summary.text);
            println!("  {}", style(format!("via {}", summary.provider)).dim());
        }
        (None, Some(reason)) => println!("  {} {}", style("✗").red(), reason),
        (None, None) => println!("  {}", style("unavailable").dim()),
    }
    println!();

    println!("  {}", style("── Sentiment ──").dim());
    match (&processed.sentiment, processed.failure(Role::Sentiment)) {
        (Some(sentiment), _) => {
            println!(
                "  {} ({:.0}% confidence)",
                styled_label(sentiment.label),
                sentiment.confidence * 100.0
            );
            println!("  {}", sentiment.explanation);
            println!("  {}", style(format!("via {}", sentiment.provider)).dim());
        }
        (None, Some(reason)) => println!("  {} {}", style("✗").red(), reason),
        (None, None) => println!("  {}", style("unavailable").dim()),
    }
    println!();

    let cached = if processed.cache_hits.is_empty() {
        String::new()
    } else {
        let roles: Vec<String> = processed.cache_hits.iter().map(|r| r.to_string()).collect();
        format!(" · cached: {}", roles.join(", "))
    };
    println!(
        "  {}",
        style(format!(
            "{} · {}{} · processed {}",
            processed.status(),
            format_cost(processed.total_cost_usd),
            cached,
            processed.processed_at.format("%Y-%m-%d %H:%M UTC")
        ))
        .dim()
    );
    println!();
}

pub fn article_table(articles: &[ProcessedArticle]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Title").fg(Color::White),
        Cell::new("Source").fg(Color::White),
        Cell::new("Sentiment").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Cost").fg(Color::White),
        Cell::new("Processed").fg(Color::White),
    ]);

    for processed in articles {
        let sentiment_cell = match &processed.sentiment {
            Some(s) => Cell::new(s.label.to_string()).fg(label_color(s.label)),
            None => Cell::new("—").fg(Color::DarkGrey),
        };
        let status_cell = match processed.status() {
            ProcessingStatus::Complete => Cell::new("● complete").fg(Color::Green),
            ProcessingStatus::Partial => Cell::new("◐ partial").fg(Color::Yellow),
        };

        table.add_row(vec![
            Cell::new(shorten(&processed.article.title, TITLE_WIDTH)).fg(Color::Cyan),
            Cell::new(&processed.article.source),
            sentiment_cell,
            status_cell,
            Cell::new(format_cost(processed.total_cost_usd)),
            Cell::new(processed.processed_at.format("%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    table
}

fn label_color(label: SentimentLabel) -> Color {
    match label {
        SentimentLabel::Positive => Color::Green,
        SentimentLabel::Negative => Color::Red,
        SentimentLabel::Neutral => Color::Grey,
    }
}

fn styled_label(label: SentimentLabel) -> console::StyledObject<String> {
    let text = label.to_string();
    match label {
        SentimentLabel::Positive => style(text).green().bold(),
        SentimentLabel::Negative => style(text).red().bold(),
        SentimentLabel::Neutral => style(text).bold(),
    }
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_keeps_short_text() {
        assert_eq!(shorten("Short title", 60), "Short title");
    }

    #[test]
    fn test_shorten_is_char_safe() {
        let title = "Überraschung: Märkte steigen";
        let short = shorten(title, 10);
        assert_eq!(short, "Überras...");
        assert_eq!(short.chars().count(), 10);
    }
}
