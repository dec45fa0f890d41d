//! Budget and provider overview.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use newswire_infra::llm::pricing::{format_cost, resolve_profile};
use newswire_types::llm::Role;

use crate::state::AppState;

/// Show the daily limit, each provider's model, rate limit and pricing, and
/// the per-role routing order.
///
/// Spend is tracked per process, so this reports configuration rather than
/// a running total.
pub async fn budget(state: &AppState, json: bool) -> Result<()> {
    let config = &state.config;
    let profiles: Vec<_> = config.providers.iter().map(resolve_profile).collect();

    if json {
        let routing: serde_json::Map<String, serde_json::Value> = Role::ALL
            .iter()
            .map(|role| {
                (
                    role.to_string(),
                    serde_json::json!(config.routing.route(*role)),
                )
            })
            .collect();
        let overview = serde_json::json!({
            "daily_budget_usd": config.daily_budget_usd,
            "max_retries": config.max_retries,
            "request_timeout_secs": config.request_timeout_secs,
            "providers": profiles,
            "routing": routing,
        });
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Daily budget: {}",
        style("$").green().bold(),
        style(format_cost(config.daily_budget_usd)).bold()
    );
    println!(
        "  {}",
        style(format!(
            "{} attempts per provider · {}s timeout per attempt",
            config.max_retries, config.request_timeout_secs
        ))
        .dim()
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("RPM").fg(Color::White),
        Cell::new("Input $/M").fg(Color::White),
        Cell::new("Output $/M").fg(Color::White),
    ]);
    for profile in &profiles {
        table.add_row(vec![
            Cell::new(&profile.name).fg(Color::Cyan),
            Cell::new(&profile.model),
            Cell::new(profile.requests_per_minute),
            Cell::new(format!("{:.2}", profile.input_price_per_million)),
            Cell::new(format!("{:.2}", profile.output_price_per_million)),
        ]);
    }
    println!("{table}");
    println!();

    println!("  {}", style("── Routing ──").dim());
    for role in Role::ALL {
        println!(
            "  {:<10} {}",
            role.to_string(),
            config.routing.route(role).join(" → ")
        );
    }
    println!();

    Ok(())
}
