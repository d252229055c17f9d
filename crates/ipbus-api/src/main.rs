//! ipbus CLI entry point.
//!
//! Binary name: `ipbus`
//!
//! Parses CLI arguments, loads configuration, starts an in-process engine and
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,ipbus_core=debug,ipbus_infra=debug",
        _ => "trace",
    };
    ipbus_observe::init_tracing(filter, cli.otel).map_err(|e| anyhow::anyhow!(e))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "ipbus", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await;

    let result = match cli.command {
        Commands::Ping { count, size } => cli::ping::ping(&state, count, size, cli.json).await,

        Commands::Bench {
            sizes,
            count,
            region,
        } => cli::bench::bench(&state, &sizes, count, region, cli.json).await,

        Commands::Latency { count, interval_ms } => {
            cli::latency::latency(&state, count, interval_ms, cli.json).await
        }

        Commands::Eval {
            labels,
            all,
            any,
            none,
        } => cli::eval::eval(labels, all, any, none, cli.json),

        Commands::Config => cli::config::show_config(&state, cli.json),

        Commands::Completions { .. } => unreachable!("handled above"),
    };

    ipbus_observe::shutdown_tracing();
    result
}
