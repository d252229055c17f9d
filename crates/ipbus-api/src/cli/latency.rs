//! One-way latency of periodic messages.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use console::style;
use tracing::Instrument;

use ipbus_core::join_with_config;
use ipbus_observe::bus_attrs::{BUS_IDENTIFIER, BUS_OPERATION_NAME, OP_LATENCY};
use ipbus_types::{BytesMessage, Options, Selector, labels};

use super::format::{LatencyStats, format_millis};
use crate::state::AppState;

const IDENTIFIER: &str = "ipbus.latency";

/// Payload carries the send time as microseconds since `epoch`.
fn encode_sent_at(epoch: Instant) -> Vec<u8> {
    let micros = u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
    micros.to_le_bytes().to_vec()
}

fn decode_sent_at(data: &[u8]) -> Result<Duration> {
    let bytes: [u8; 8] = data
        .try_into()
        .with_context(|| format!("expected an 8-byte timestamp, got {} bytes", data.len()))?;
    Ok(Duration::from_micros(u64::from_le_bytes(bytes)))
}

pub async fn latency(state: &AppState, count: u32, interval_ms: u64, json: bool) -> Result<()> {
    let span = tracing::info_span!(
        "latency",
        { BUS_OPERATION_NAME } = OP_LATENCY,
        { BUS_IDENTIFIER } = IDENTIFIER
    );
    let samples = run(state, count, Duration::from_millis(interval_ms), json)
        .instrument(span)
        .await?;

    let Some(stats) = LatencyStats::from_samples(&samples) else {
        bail!("no messages received");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} messages  min {}  avg {}  max {}",
        style("⚡").bold(),
        style(stats.samples).bold(),
        format_millis(Duration::from_micros(stats.min_us)),
        style(format_millis(Duration::from_micros(stats.avg_us))).cyan(),
        format_millis(Duration::from_micros(stats.max_us)),
    );
    println!();

    Ok(())
}

async fn run(
    state: &AppState,
    count: u32,
    interval: Duration,
    quiet: bool,
) -> Result<Vec<Duration>> {
    let receiver = join_with_config(
        state.bus(),
        Options::new(IDENTIFIER, labels!("receiver"), ""),
        None,
        &state.config,
    )
    .await
    .context("receiver session failed to join")?;
    let sender = join_with_config(
        state.bus(),
        Options::new(IDENTIFIER, labels!("sender"), ""),
        None,
        &state.config,
    )
    .await
    .context("sender session failed to join")?;

    let epoch = Instant::now();
    let (tx, _) = sender.split();
    let producer = tokio::spawn(async move {
        for _ in 0..count {
            let payload = BytesMessage::new(0, encode_sent_at(epoch));
            tx.send(Selector::unicast("receiver"), payload, Vec::new())?;
            tokio::time::sleep(interval).await;
        }
        anyhow::Ok(())
    });

    let (_, rx) = receiver.split();
    let wait = interval + Duration::from_secs(1);
    let mut samples = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let message = rx.recv(Some(wait)).await?;
        let sample = epoch.elapsed().saturating_sub(decode_sent_at(&message.payload.data)?);
        if !quiet {
            println!("  {}", format_millis(sample));
        }
        samples.push(sample);
    }

    producer.await??;
    Ok(samples)
}
