//! The `process` command: fetch, summarize, score, store.

use std::time::{Duration, Instant};

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use newswire_core::event::bus::EventBus;
use newswire_core::news::NewsSource;
use newswire_core::storage::article::ArticleRepository;
use newswire_infra::llm::pricing::format_cost;
use newswire_types::article::ProcessedArticle;
use newswire_types::budget::{BudgetState, UsageSummary};
use newswire_types::error::PipelineError;
use newswire_types::event::PipelineEvent;

use super::article::article_table;
use super::clamp_count;
use crate::state::AppState;

pub struct ProcessArgs {
    pub category: String,
    pub count: u32,
    pub sequential: bool,
    pub concurrency: Option<usize>,
}

pub async fn process(state: &AppState, args: ProcessArgs, json: bool) -> Result<()> {
    let count = clamp_count(args.count);
    if count != args.count {
        tracing::warn!(requested = args.count, count, "Article count clamped");
    }

    let events = EventBus::default();
    let pipeline = state.build_pipeline(&events).await?;
    let source = state.news_source()?;

    let spinner = spinner(json);
    spinner.set_message(format!("Fetching {count} {} headlines...", args.category));
    let articles = match source.fetch_articles(&args.category, count).await {
        Ok(articles) => articles,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    if articles.is_empty() {
        spinner.finish_and_clear();
        if json {
            println!("{}", serde_json::json!({ "processed": [], "failed": [] }));
        } else {
            println!();
            println!(
                "  {} No articles found for category '{}'",
                style("i").blue().bold(),
                args.category
            );
            println!();
        }
        return Ok(());
    }

    let total = articles.len();
    spinner.set_message(format!("Processing {total} article{}...", plural(total)));

    let cancel = CancellationToken::new();
    let signal = cancel_on_ctrl_c(cancel.clone());
    let printer = (!json).then(|| print_events(&events, spinner.clone()));

    let started = Instant::now();
    let outcomes = if args.sequential {
        pipeline.process_sequential(articles, &cancel).await
    } else {
        let concurrency = args.concurrency.unwrap_or(state.config.max_concurrency);
        pipeline.process_batch(articles, concurrency, &cancel).await
    };
    let elapsed = started.elapsed();

    signal.abort();
    if let Some(printer) = printer {
        printer.abort();
    }
    spinner.finish_and_clear();

    let mut processed = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(article) => processed.push(article),
            Err(e) => failed.push(e),
        }
    }

    if !processed.is_empty() {
        let saved = state.articles.save_many(&processed).await?;
        tracing::info!(saved, "Stored processed articles");
    }

    let summary = pipeline.tracker().summary();
    let budget = pipeline.tracker().budget_state();
    let cache_stats = pipeline.cache().map(|c| c.stats());

    if json {
        let failed: Vec<String> = failed.iter().map(|e| e.to_string()).collect();
        let body = serde_json::json!({
            "processed": processed,
            "failed": failed,
            "cancelled": cancel.is_cancelled(),
            "usage": summary,
            "budget": budget,
            "cache": cache_stats,
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    render_outcome(&processed, &failed, cancel.is_cancelled(), elapsed);
    render_usage(&summary, &budget);
    if let Some(stats) = cache_stats {
        println!(
            "  {}",
            style(format!(
                "cache: {} hit{}, {} miss{} ({:.0}%)",
                stats.hits,
                plural(stats.hits as usize),
                stats.misses,
                if stats.misses == 1 { "" } else { "es" },
                stats.hit_rate()
            ))
            .dim()
        );
        println!();
    }

    Ok(())
}

fn spinner(json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Cancel the run on the first Ctrl+C. In-flight calls are still billed.
fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling remaining work");
            cancel.cancel();
        }
    })
}

/// Print pipeline events above the spinner until aborted.
fn print_events(events: &EventBus, spinner: ProgressBar) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => spinner.println(describe_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn describe_event(event: &PipelineEvent) -> String {
    let line = match event {
        PipelineEvent::RateLimitWait {
            provider,
            waited_ms,
        } => format!("⏳ {provider}: waited {waited_ms}ms for rate limit"),
        PipelineEvent::ProviderFallback {
            role,
            from_provider,
            to_provider,
            reason,
        } => format!("↪ {role}: {from_provider} → {to_provider} ({reason})"),
        PipelineEvent::RetryScheduled {
            role,
            provider,
            attempt,
            delay_ms,
            reason,
        } => format!("↻ {role}: retrying {provider} (attempt {attempt}) in {delay_ms}ms ({reason})"),
        PipelineEvent::BudgetWarning {
            spent_usd,
            limit_usd,
        } => format!(
            "! budget at {} of {}",
            format_cost(*spent_usd),
            format_cost(*limit_usd)
        ),
        PipelineEvent::BudgetExceeded {
            role,
            provider,
            requested_usd,
            remaining_usd,
        } => format!(
            "✗ {role}: {provider} call refused, needs {} with {} left",
            format_cost(*requested_usd),
            format_cost(*remaining_usd)
        ),
    };
    format!("  {}", style(line).dim())
}

fn render_outcome(
    processed: &[ProcessedArticle],
    failed: &[PipelineError],
    cancelled: bool,
    elapsed: Duration,
) {
    println!();
    if !processed.is_empty() {
        println!("{}", article_table(processed));
        println!();
    }

    for err in failed {
        println!("  {} {}", style("✗").red().bold(), err);
    }
    if !failed.is_empty() {
        println!();
    }

    let done = processed.len();
    println!(
        "  {} {} article{} processed, {} failed in {:.1}s",
        if failed.is_empty() {
            style("✓").green().bold()
        } else {
            style("!").yellow().bold()
        },
        done,
        plural(done),
        failed.len(),
        elapsed.as_secs_f64()
    );
    if cancelled {
        println!("  {}", style("Run was cancelled; unfinished articles were skipped.").yellow());
    }
    println!();
}

fn render_usage(summary: &UsageSummary, budget: &BudgetState) {
    println!("  {}", style("── Usage ──").dim());
    for (provider, usage) in &summary.by_provider {
        println!(
            "  {:<12} {} call{} · {} in / {} out · {}",
            provider,
            usage.requests,
            plural(usage.requests as usize),
            usage.input_tokens,
            usage.output_tokens,
            format_cost(usage.cost_usd)
        );
    }
    let remaining = budget.remaining_usd();
    let line = format!(
        "  Spent {} of {} today · {} left",
        format_cost(budget.spent_today_usd),
        format_cost(budget.daily_limit_usd),
        format_cost(remaining)
    );
    if budget.used_fraction() >= 0.9 {
        println!("{}", style(line).yellow());
    } else {
        println!("{line}");
    }
    println!();
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
