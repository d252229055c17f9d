//! One-way throughput benchmark.
//!
//! For each payload size a fresh receiving session joins, the sender streams
//! a start marker, `count` payloads and an end marker, and the receiver times
//! the span between the markers.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::Instrument;

use ipbus_core::{Receiver, Resource, Sender, join_with_config};
use ipbus_observe::bus_attrs::{
    BUS_MESSAGE_COUNT, BUS_MESSAGE_SIZE, BUS_OPERATION_NAME, BUS_SESSION_ID, OP_BENCH,
};
use ipbus_types::{BytesMessage, LabelSet, Options, Selector, labels};

use super::format::{format_bytes, format_count};
use crate::state::AppState;

const IDENTIFIER: &str = "ipbus.bench";

const FORMAT_START: u32 = 0;
const FORMAT_END: u32 = 1;
const FORMAT_PAYLOAD: u32 = 2;

/// Marker TTL, so markers survive a receiver that has not joined yet.
const MARKER_TTL_MS: u32 = 2_000;

/// One line of benchmark output.
#[derive(Debug, Clone, Serialize)]
pub struct BenchRow {
    pub size: usize,
    pub messages: u64,
    pub seconds: f64,
    pub messages_per_sec: f64,
    pub bytes_per_sec: f64,
}

impl BenchRow {
    fn new(size: usize, messages: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64().max(f64::EPSILON);
        let messages_per_sec = messages as f64 / seconds;
        Self {
            size,
            messages,
            seconds,
            messages_per_sec,
            bytes_per_sec: messages_per_sec * size as f64,
        }
    }
}

pub async fn bench(
    state: &AppState,
    sizes: &[usize],
    count: u32,
    region: bool,
    json: bool,
) -> Result<()> {
    if sizes.is_empty() {
        bail!("at least one payload size is required");
    }

    let sender = join_with_config(
        state.bus(),
        Options::new(IDENTIFIER, labels!("sender"), ""),
        None,
        &state.config,
    )
    .await
    .context("sender session failed to join")?;
    let (tx, _) = sender.split();

    let mut rows = Vec::with_capacity(sizes.len());
    for (i, &size) in sizes.iter().enumerate() {
        let span = tracing::info_span!(
            "bench",
            { BUS_OPERATION_NAME } = OP_BENCH,
            { BUS_SESSION_ID } = %tx.session(),
            { BUS_MESSAGE_SIZE } = size,
            { BUS_MESSAGE_COUNT } = count
        );
        let row = run_size(state, &tx, i, size, count, region, json)
            .instrument(span)
            .await?;
        rows.push(row);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} messages per size{}",
        style("⚡").bold(),
        format_count(u64::from(count)),
        if region { " (shared regions)" } else { "" }
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Size").fg(Color::White),
        Cell::new("Messages/s").fg(Color::White),
        Cell::new("Throughput").fg(Color::White),
        Cell::new("Elapsed").fg(Color::White),
    ]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(format_bytes(row.size as f64)),
            Cell::new(format_count(row.messages_per_sec as u64)).fg(Color::Cyan),
            Cell::new(format!("{}/s", format_bytes(row.bytes_per_sec))).fg(Color::Cyan),
            Cell::new(format!("{:.2}s", row.seconds)).fg(Color::DarkGrey),
        ]);
    }
    println!("{table}");
    println!();

    Ok(())
}

async fn run_size(
    state: &AppState,
    tx: &Sender,
    index: usize,
    size: usize,
    count: u32,
    region: bool,
    quiet: bool,
) -> Result<BenchRow> {
    let label = format!("receiver-{index}");
    let receiver = join_with_config(
        state.bus(),
        Options::new(IDENTIFIER, LabelSet::from_iter([label.as_str()]), ""),
        None,
        &state.config,
    )
    .await
    .context("receiver session failed to join")?;
    let (_, rx) = receiver.split();
    let consumer = tokio::spawn(consume(rx));

    let selector = Selector::unicast(label.as_str()).with_ttl(MARKER_TTL_MS);
    tx.send(selector.clone(), BytesMessage::new(FORMAT_START, Vec::new()), Vec::new())?;

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(u64::from(count));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.cyan} {msg:>10} [{bar:30.cyan/dim}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(format_bytes(size as f64));
        bar
    };

    let body = vec![b'x'; size];
    for _ in 0..count {
        let (data, resources) = if region {
            (Vec::new(), vec![Resource::Buffer(body.clone())])
        } else {
            (body.clone(), Vec::new())
        };
        tx.send(selector.clone(), BytesMessage::new(FORMAT_PAYLOAD, data), resources)?;
        progress.inc(1);
        // Let the consumer drain as we go.
        tokio::task::yield_now().await;
    }
    progress.finish_and_clear();

    tx.send(selector, BytesMessage::new(FORMAT_END, Vec::new()), Vec::new())?;

    let (messages, elapsed) = consumer.await??;
    Ok(BenchRow::new(size, messages, elapsed))
}

/// Count payloads between the start and end markers.
async fn consume(rx: Receiver) -> Result<(u64, Duration)> {
    let mut start = None;
    let mut messages = 0u64;

    loop {
        let message = rx.recv(None).await?;
        match message.payload.format {
            FORMAT_START => start = Some(Instant::now()),
            FORMAT_END => break,
            _ => messages += 1,
        }
    }

    let start = start.context("start marker lost")?;
    Ok((messages, start.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_rates_follow_elapsed_time() {
        let row = BenchRow::new(1024, 2_000, Duration::from_secs(2));
        assert_eq!(row.messages_per_sec, 1_000.0);
        assert_eq!(row.bytes_per_sec, 1_024_000.0);
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let row = BenchRow::new(16, 10, Duration::ZERO);
        assert!(row.messages_per_sec.is_finite());
    }
}
