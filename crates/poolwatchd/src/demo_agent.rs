//! Demo agent mode — an application embedding the poolwatch agent.
//!
//! Builds three sample pools through the agent's factory so they are
//! discovered the moment they exist, then feeds them short sleeping tasks
//! so the collector has live load to show.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use poolwatch_agent::{Agent, PoolError, WorkerPool, WorkerPoolConfig};
use poolwatch_core::AgentConfig;
use tracing::{debug, error, info};

fn load_config(config: Option<PathBuf>, agent_args: Option<String>) -> anyhow::Result<AgentConfig> {
    let config = match (config, agent_args) {
        (Some(path), _) => AgentConfig::from_file(&path)?,
        (None, Some(args)) => AgentConfig::from_args(&args)?,
        (None, None) => AgentConfig::default(),
    };
    Ok(config)
}

fn sample_pools() -> Vec<WorkerPoolConfig> {
    vec![
        WorkerPoolConfig::new(5, 10)
            .with_keep_alive(Duration::from_secs(60))
            .with_queue_capacity(100),
        WorkerPoolConfig::new(5, 20)
            .with_name("cachedThreadPool")
            .with_keep_alive(Duration::from_secs(30))
            .with_queue_capacity(0),
        WorkerPoolConfig::new(3, 5)
            .with_name("scheduledPool")
            .with_keep_alive(Duration::from_secs(120))
            .with_queue_capacity(50),
    ]
}

fn submit_burst(pools: &[Arc<WorkerPool>], burst: usize) {
    for pool in pools {
        for _ in 0..burst {
            let task_pool = pool.clone();
            let result = pool.execute(move || {
                std::thread::sleep(Duration::from_millis(200));
                task_pool.record_custom_task();
            });
            match result {
                Ok(()) => {}
                Err(PoolError::Saturated { workers }) => {
                    debug!(workers, "sample pool saturated, task rejected");
                }
                Err(e) => error!(error = %e, "sample task submission failed"),
            }
        }
    }
}

/// Run the demo agent until CTRL+C.
pub async fn run_demo_agent(
    config: Option<PathBuf>,
    agent_args: Option<String>,
    workload_interval: u64,
) -> anyhow::Result<()> {
    info!("poolwatch daemon starting in demo-agent mode");
    let config = load_config(config, agent_args)?;

    let agent = Agent::start(config).await?;

    // ── Sample pools ─────────────────────────────────────────────
    let mut pools = Vec::new();
    for pool_config in sample_pools() {
        pools.push(agent.factory().build(pool_config)?);
    }
    info!(pools = pools.len(), control_addr = %agent.control_addr(), "sample pools registered");

    // ── Workload ─────────────────────────────────────────────────
    let interval = Duration::from_secs(workload_interval.max(1));
    let workload_pools = pools.clone();
    let workload = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut burst = 1;
        loop {
            ticker.tick().await;
            submit_burst(&workload_pools, burst);
            // Ramp up then fall back so the queue metrics move.
            burst = if burst >= 8 { 1 } else { burst * 2 };
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for CTRL+C");
    }
    info!("shutdown signal received");

    workload.abort();
    agent.shutdown().await;
    for pool in &pools {
        pool.shutdown();
    }

    info!("demo agent stopped");
    Ok(())
}
