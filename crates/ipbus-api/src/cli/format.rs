//! Formatting helpers shared by the measurement commands.

use std::time::Duration;

use serde::Serialize;

/// Format a byte count with binary units, e.g. `1.5 KiB`.
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Format a count with thousands separators, e.g. `1,234,567`.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Milliseconds with microsecond precision, e.g. `0.125ms`.
pub fn format_millis(d: Duration) -> String {
    format!("{:.3}ms", d.as_secs_f64() * 1000.0)
}

/// Summary of a set of latency samples, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_us: u64,
    pub avg_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    /// `None` when there are no samples.
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut micros: Vec<u64> = samples
            .iter()
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .collect();
        micros.sort_unstable();

        let percentile = |p: usize| micros[((micros.len() - 1) * p) / 100];
        let sum: u128 = micros.iter().map(|&m| u128::from(m)).sum();

        Some(Self {
            samples: micros.len(),
            min_us: micros[0],
            avg_us: (sum / micros.len() as u128) as u64,
            p50_us: percentile(50),
            p99_us: percentile(99),
            max_us: micros[micros.len() - 1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KiB");
        assert_eq!(format_bytes(16.0 * 1024.0 * 1024.0), "16.0 MiB");
    }

    #[test]
    fn counts_get_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn millis_have_three_decimals() {
        assert_eq!(format_millis(Duration::from_micros(1_250)), "1.250ms");
    }

    #[test]
    fn stats_of_empty_samples() {
        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[test]
    fn stats_summarize_samples() {
        let samples: Vec<Duration> = (1..=100).rev().map(Duration::from_micros).collect();
        let stats = LatencyStats::from_samples(&samples).unwrap();

        assert_eq!(stats.samples, 100);
        assert_eq!(stats.min_us, 1);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.avg_us, 50);
        assert_eq!(stats.p50_us, 50);
        assert_eq!(stats.p99_us, 99);
    }
}
