//! Show the effective configuration.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    let config_path = state.data_dir.join("config.toml");

    if json {
        let output = serde_json::json!({
            "config_path": config_path.display().to_string(),
            "config_exists": config_path.exists(),
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} ipbus v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("  {}  {}", style("Config file:").bold(), style(config_path.display()).dim());
    if !config_path.exists() {
        println!("  {}", style("(not found, using defaults)").dim());
    }
    println!();
    for line in toml::to_string_pretty(&state.config)?.lines() {
        println!("  {line}");
    }
    println!();

    Ok(())
}
