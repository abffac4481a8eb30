//! CLI module for sensord
//!
//! Provides the command-line interface of the monitoring agent.

pub mod probe;
pub mod run;

use clap::{Parser, Subcommand};

/// sensord - endpoint monitoring agent
#[derive(Parser, Debug)]
#[command(name = "sensord")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    SENSORD_MANIFEST_URL         Check manifest location (http, https or file URL)
    SENSORD_LOCATION             Location tag attached to every sample (default: undefined)
    SENSORD_SAMPLE_INTERVAL_MS   Sampling interval per check (default: 1000)
    SENSORD_MANIFEST_INTERVAL_SECS  Manifest refresh interval (default: 10)
    SENSORD_MODE                 Delivery mode: stream or batch (default: stream)
    SENSORD_FLUSH_INTERVAL_MS    Batch flush interval (default: 1000)
    SENSORD_BATCH_URLS           Comma-separated batch POST destinations
    SENSORD_UDP_ADDRS            Comma-separated UDP destinations (host:port)
    SENSORD_LOGFMT               Write logfmt lines to stdout
    SENSORD_FEED_ADDR            Streaming feed bind address (disabled if unset)
    SENSORD_FEED_USER            Feed basic auth user
    SENSORD_FEED_PASSWORD        Feed basic auth password
    SENSORD_FORWARDER_COUNT      Channel consumers (default: 1)
    SENSORD_LANE_QUEUE_CAPACITY  Per-destination queue size (default: 1024)
    SENSORD_LANE_CONCURRENCY     Per-destination in-flight deliveries (default: 4)
    SENSORD_PROBE_TIMEOUT_SECS   Probe timeout (default: 10)
    SENSORD_DELIVERY_TIMEOUT_SECS  Batch POST and manifest fetch timeout (default: 10)
    SENSORD_LOG_LEVEL            Log level (default: info)
    SENSORD_LOG_FORMAT           Log format: text or json (default: text)

DEPRECATED (still read):
    MANIFEST_URL, LOCATION, LOG_LEVEL
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Agent options when no subcommand is given
    #[command(flatten)]
    pub run: run::RunArgs,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitoring agent (default)
    Run(run::RunArgs),
    /// Probe a single URL and print the sample
    Probe(probe::ProbeArgs),
}
