//! Round-trip messages between two sessions.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tracing::Instrument;

use ipbus_core::join_with_config;
use ipbus_observe::bus_attrs::{BUS_IDENTIFIER, BUS_OPERATION_NAME, OP_PING};
use ipbus_types::{BytesMessage, Options, Selector, labels};

use super::format::{LatencyStats, format_millis};
use crate::state::AppState;

const IDENTIFIER: &str = "ipbus.ping";
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Send `count` messages of `size` bytes to an echoing session and report
/// round-trip times.
pub async fn ping(state: &AppState, count: u32, size: usize, json: bool) -> Result<()> {
    let span = tracing::info_span!(
        "ping",
        { BUS_OPERATION_NAME } = OP_PING,
        { BUS_IDENTIFIER } = IDENTIFIER
    );
    let samples = run(state, count, size).instrument(span).await?;

    let Some(stats) = LatencyStats::from_samples(&samples) else {
        bail!("no replies received");
    };

    if json {
        let output = serde_json::json!({
            "identifier": IDENTIFIER,
            "size": size,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} round trips of {} bytes",
        style("⚡").bold(),
        style(stats.samples).bold(),
        size
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Min").fg(Color::White),
        Cell::new("Avg").fg(Color::White),
        Cell::new("p50").fg(Color::White),
        Cell::new("p99").fg(Color::White),
        Cell::new("Max").fg(Color::White),
    ]);
    table.add_row(
        [stats.min_us, stats.avg_us, stats.p50_us, stats.p99_us, stats.max_us]
            .map(|us| Cell::new(format_millis(Duration::from_micros(us))).fg(Color::Cyan)),
    );
    println!("{table}");
    println!();

    Ok(())
}

async fn run(state: &AppState, count: u32, size: usize) -> Result<Vec<Duration>> {
    let ponger = join_with_config(
        state.bus(),
        Options::new(IDENTIFIER, labels!("pong"), ""),
        Some(REPLY_TIMEOUT),
        &state.config,
    )
    .await
    .context("pong session failed to join")?;
    let pinger = join_with_config(
        state.bus(),
        Options::new(IDENTIFIER, labels!("ping"), ""),
        Some(REPLY_TIMEOUT),
        &state.config,
    )
    .await
    .context("ping session failed to join")?;

    let (pong_tx, pong_rx) = ponger.split();
    let pong_close = pong_rx.close_handle();
    let echo = tokio::spawn(async move {
        while let Ok(message) = pong_rx.recv(None).await {
            if pong_tx
                .send(Selector::unicast("ping"), message.payload, Vec::new())
                .is_err()
            {
                break;
            }
        }
    });

    let (tx, rx) = pinger.split();
    let mut samples = Vec::with_capacity(count as usize);
    for seq in 0..count {
        let start = Instant::now();
        tx.send(
            Selector::unicast("pong"),
            BytesMessage::new(seq, vec![0u8; size]),
            Vec::new(),
        )?;

        let reply = rx.recv(Some(REPLY_TIMEOUT)).await?;
        if reply.payload.format != seq {
            bail!("reply {} arrived out of order (expected {seq})", reply.payload.format);
        }
        samples.push(start.elapsed());
    }

    pong_close.close();
    echo.await?;
    rx.close();

    Ok(samples)
}
