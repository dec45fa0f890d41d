//! Response cache maintenance.

use anyhow::Result;
use console::style;

use newswire_core::cache::ResponseCache;

use crate::state::AppState;

pub async fn clear_cache(state: &AppState, json: bool) -> Result<()> {
    let Some(cache) = state.open_cache().await else {
        return report_disabled(json);
    };

    let removed = cache.stats().entries;
    cache.clear().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "cleared": removed }))?
        );
    } else {
        println!();
        println!(
            "  {} Cleared {} cached response{}",
            style("✓").green().bold(),
            removed,
            if removed == 1 { "" } else { "s" }
        );
        println!();
    }
    Ok(())
}

pub async fn cache_stats(state: &AppState, json: bool) -> Result<()> {
    let Some(cache) = state.open_cache().await else {
        return report_disabled(json);
    };

    let stats = cache.stats();
    if json {
        let body = serde_json::json!({
            "path": cache.path().display().to_string(),
            "entries": stats.entries,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Response cache ──").dim());
    println!("  Entries: {}", style(stats.entries).bold());
    println!("  File:    {}", style(cache.path().display()).dim());
    println!();
    Ok(())
}

fn report_disabled(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "enabled": false }));
    } else {
        println!();
        println!(
            "  {} Response cache is disabled ({})",
            style("i").blue().bold(),
            style("[cache] enabled = false").yellow()
        );
        println!();
    }
    Ok(())
}
