//! poolwatchd — the poolwatch daemon.
//!
//! Two modes:
//! - `collector`: durable snapshot store, operator REST API, and command
//!   dispatch to agents
//! - `demo-agent`: an agent hosting a few sample worker pools under load
//!
//! # Usage
//!
//! ```text
//! poolwatchd collector --port 8080 --data-dir /var/lib/poolwatch
//! poolwatchd demo-agent --agent-args url=http://collector:8080/api/v1/pools/upload,interval=10,port=9999
//! ```

mod collector_mode;
mod demo_agent;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use poolwatch_state::MergePolicy;

#[derive(Parser)]
#[command(name = "poolwatchd", about = "poolwatch daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collector service.
    Collector {
        /// Port for the REST API and snapshot ingest.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for the collector store.
        #[arg(long, default_value = "/var/lib/poolwatch")]
        data_dir: PathBuf,

        /// Port agents serve their control endpoint on.
        #[arg(long, default_value = "9999")]
        control_port: u16,

        /// Timeout for one control command, in milliseconds.
        #[arg(long, default_value = "3000")]
        control_timeout_ms: u64,

        /// How later snapshots for a known pool are merged
        /// (`arrival` or `captured-at`).
        #[arg(long, default_value = "arrival")]
        merge_policy: MergePolicy,
    },

    /// Run an agent with sample worker pools.
    DemoAgent {
        /// TOML configuration file with an `[agent]` table.
        #[arg(long, conflicts_with = "agent_args")]
        config: Option<PathBuf>,

        /// Agent argument string, e.g. `url=...,interval=10,port=9999`.
        #[arg(long)]
        agent_args: Option<String>,

        /// Seconds between bursts of sample work.
        #[arg(long, default_value = "2")]
        workload_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,poolwatchd=debug,poolwatch=debug"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Collector {
            port,
            data_dir,
            control_port,
            control_timeout_ms,
            merge_policy,
        } => {
            collector_mode::run_collector(
                port,
                data_dir,
                control_port,
                control_timeout_ms,
                merge_policy,
            )
            .await
        }
        Command::DemoAgent {
            config,
            agent_args,
            workload_interval,
        } => demo_agent::run_demo_agent(config, agent_args, workload_interval).await,
    }
}
