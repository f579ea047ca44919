//! Worker daemon: leases tasks from the web app's queue and bitifies their images.

pub mod client;
pub mod heartbeat;
pub mod poll;
pub mod stats;
pub mod task;

use anyhow::Result;
use log::info;
use std::sync::Arc;
use std::sync::mpsc;

use crate::config::daemon::DaemonConfig;
use crate::imaging::Bitifier;
use client::HttpCloud;
use heartbeat::spawn_heartbeat;
use poll::{Poller, SleepPolicy};
use stats::Stats;

pub fn run(config: DaemonConfig) -> Result<()> {
    let bitifier = Arc::new(Bitifier::from_config(&config)?);
    let cloud = Arc::new(HttpCloud::new(&config)?);
    let stats = Arc::new(Stats::default());

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let _heartbeat = spawn_heartbeat(stats.clone(), &config, shutdown_tx);
    info!(
        "Polling {} on {} ({} tasks per lease, {} s leases)",
        config.queue_name,
        config.app_base(),
        config.num_tasks_to_lease,
        config.lease_time_sec
    );

    Poller::new(cloud, bitifier, stats, SleepPolicy::from_config(&config)).run(shutdown_rx);
    Ok(())
}
