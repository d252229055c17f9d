//! CLI command definitions for the `ipbus` binary.
//!
//! Every command runs against an in-process engine: the sessions taking part
//! live in this process and talk through the bus exactly as separate
//! programs would.

pub mod bench;
pub mod config;
pub mod eval;
pub mod format;
pub mod latency;
pub mod ping;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Exercise the ipbus message bus.
#[derive(Parser)]
#[command(name = "ipbus", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "IPBUS_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Round-trip messages between two sessions.
    Ping {
        /// Number of round trips.
        #[arg(short = 'n', long, default_value = "10")]
        count: u32,

        /// Payload size in bytes.
        #[arg(short, long, default_value = "64")]
        size: usize,
    },

    /// Measure one-way throughput for a range of payload sizes.
    Bench {
        /// Payload sizes in bytes, comma separated.
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "16,64,1024,4096,16384"
        )]
        sizes: Vec<usize>,

        /// Messages sent per payload size.
        #[arg(short = 'n', long, default_value = "10000")]
        count: u32,

        /// Carry payloads in shared regions instead of the message body.
        #[arg(long)]
        region: bool,
    },

    /// Report one-way latency of periodic messages.
    Latency {
        /// Number of messages.
        #[arg(short = 'n', long, default_value = "10")]
        count: u32,

        /// Delay between messages, in milliseconds.
        #[arg(long, default_value = "100")]
        interval_ms: u64,
    },

    /// Evaluate a label expression against a label set.
    Eval {
        /// Labels of the receiving session, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        labels: Vec<String>,

        /// Labels that must all be present.
        #[arg(long, value_delimiter = ',')]
        all: Vec<String>,

        /// Labels of which at least one must be present.
        #[arg(long, value_delimiter = ',')]
        any: Vec<String>,

        /// Labels that must all be absent.
        #[arg(long, value_delimiter = ',')]
        none: Vec<String>,
    },

    /// Show the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
