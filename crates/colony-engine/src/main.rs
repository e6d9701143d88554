//! Colony engine binary.
//!
//! Wires the cycle orchestrator to a demo world and a simulated compute
//! host, then runs the cycle loop until the cycle limit or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `COLONY_CONFIG` (default `colony-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the snapshot store and restore colony state from it
//! 4. Lay out the demo world and wrap it in the compute meter
//! 5. Run the cycle loop with the spawner as the per-cycle callback
//! 6. Log the result

mod error;
mod host_callback;
mod layout;
mod sim_host;
mod spawner;

use std::path::Path;

use anyhow::Context as _;
use colony_cache::JsonFileStore;
use colony_core::config::{ColonyConfig, LoggingConfig};
use colony_core::runner::{self, StopSignal};
use colony_core::ColonyState;
use colony_world::SimWorldConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::host_callback::HostCallback;
use crate::sim_host::{ComputeMeter, MeteredWorld, SimHost};
use crate::spawner::Spawner;

/// Cycles between colony status lines.
const STATUS_EVERY: u64 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = ColonyConfig::path_from_env();
    let config = load_config(&config_path).context("loading colony configuration")?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        seed = config.world.seed,
        zones = config.world.zones,
        max_cycles = config.run.max_cycles,
        tick_interval_ms = config.run.tick_interval_ms,
        "colony-engine starting"
    );

    // 3. Restore colony state.
    let snapshot_path = config.persistence.snapshot_path.clone();
    let store = match JsonFileStore::open(&snapshot_path) {
        Ok(store) => store,
        Err(e) => {
            warn!(
                path = %snapshot_path.display(),
                error = %e,
                "Snapshot unreadable, starting fresh"
            );
            JsonFileStore::fresh(&snapshot_path)
        }
    };
    let mut state = ColonyState::restore(&config, Box::new(store));

    // 4. Build the world and the host.
    let (sim, zones) = layout::build_world(&config.world, SimWorldConfig::default())
        .context("laying out the demo world")?;
    let meter = ComputeMeter::new();
    let mut world = MeteredWorld::new(sim, meter.clone(), &config.host);
    let mut host = SimHost::new(meter, config.host);

    let spawner_config = spawner::load_spawner_config(&config_path).context("loading spawner configuration")?;
    let spawner = Spawner::new(spawner_config, zones, config.world.body_lifetime);
    let mut callback = HostCallback::new(spawner, STATUS_EVERY);

    // 5. Run until the cycle limit or Ctrl-C.
    let stop = StopSignal::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current cycle");
            ctrl_c.request_stop();
        }
    });

    let summary = runner::run_colony(
        &mut state,
        &mut world,
        &mut host,
        &config.run,
        &stop,
        &mut callback,
    )
    .await;

    // 6. Log results.
    runner::log_run_end(&summary);
    info!(
        end_reason = ?summary.end_reason,
        total_cycles = summary.total_cycles,
        "colony-engine shutdown complete"
    );
    Ok(())
}

/// Load the config at `path`, falling back to defaults when it is absent.
fn load_config(path: &Path) -> Result<ColonyConfig, error::EngineError> {
    if path.exists() {
        Ok(ColonyConfig::from_file(path)?)
    } else {
        // Still apply the environment overrides.
        Ok(ColonyConfig::parse("{}")?)
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
