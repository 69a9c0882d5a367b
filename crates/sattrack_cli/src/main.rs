//! SatTrack command-line client.
//!
//! # Responsibility
//! - Drive `sattrack_core` against a live tracking API from a terminal.
//! - Offer one-shot commands for each use case plus a `watch` loop that
//!   runs a full tracking session.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sattrack_core::{
    default_log_level, init_logging, HttpSatelliteService, PositionHistory, PositionPoller,
    RefreshBus, SelectionRegistry, StaticSession, TickOutcome, TrackStatus, TrackerConfig,
    TrackingCoordinator, TrackingSnapshot,
};
use std::path::PathBuf;
use std::sync::Arc;

type Service = HttpSatelliteService<StaticSession>;

#[derive(Parser, Debug)]
#[command(name = "sattrack")]
#[command(version, about = "Track satellite positions from the command line")]
struct Cli {
    /// Base URL of the tracking API; overrides SATTRACK_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(long, global = true, env = "SATTRACK_USERNAME", default_value = "anonymous")]
    username: String,

    /// Bearer token sent with every request.
    #[arg(long, global = true, env = "SATTRACK_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// trace|debug|info|warn|error; defaults by build mode.
    #[arg(long, global = true, env = "SATTRACK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for rolling log files; defaults to a temp directory.
    #[arg(long, global = true, env = "SATTRACK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check core linkage and print the version.
    Ping,
    /// List the satellite catalog.
    Catalog,
    /// List the satellites currently tracked.
    Selections,
    /// Start tracking a catalog satellite.
    Select { satellite_id: i64 },
    /// Stop tracking a selection.
    Deselect { selection_id: i64 },
    /// Fetch positions of every tracked satellite once.
    Positions,
    /// Run a tracking session and print every update.
    Watch {
        /// Exit after this many position updates.
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Command::Ping = cli.command {
        println!("sattrack_core ping={}", sattrack_core::ping());
        println!("sattrack_core version={}", sattrack_core::core_version());
        return Ok(());
    }

    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("sattrack-logs"));
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    if let Err(err) = init_logging(&log_level, &log_dir.to_string_lossy()) {
        eprintln!("warning: logging disabled: {err}");
    }

    let config = load_config(cli.api_url.as_deref())?;
    let service = Arc::new(
        HttpSatelliteService::new(&config, StaticSession::new(cli.username.as_str(), cli.token))
            .context("failed to build HTTP client")?,
    );
    let registry = || {
        SelectionRegistry::new(
            Arc::clone(&service),
            RefreshBus::new(),
            config.max_selections,
        )
    };

    match cli.command {
        Command::Ping => {}
        Command::Catalog => {
            for satellite in registry().list_catalog().await? {
                let status = if satellite.is_active { "active" } else { "inactive" };
                println!(
                    "{:>6}  {:<24} {:<12} {}",
                    satellite.id,
                    satellite.name,
                    satellite.external_id.as_deref().unwrap_or("-"),
                    status
                );
            }
        }
        Command::Selections => {
            let selections = registry().list_selections().await?;
            if selections.is_empty() {
                println!("No satellites tracked.");
            }
            for selection in selections {
                println!(
                    "{:>6}  {:<24} since {}",
                    selection.id,
                    selection.satellite_name,
                    selection.selected_at.to_rfc3339()
                );
            }
        }
        Command::Select { satellite_id } => {
            let registry = registry();
            registry.reload().await?;
            let selection = registry.select(satellite_id).await?;
            println!(
                "Tracking {} (selection {}).",
                selection.satellite_name, selection.id
            );
        }
        Command::Deselect { selection_id } => {
            registry().deselect(selection_id).await?;
            println!("Stopped tracking selection {selection_id}.");
        }
        Command::Positions => {
            let poller = PositionPoller::new(
                Arc::clone(&service),
                RefreshBus::new(),
                config.poll_interval,
            );
            match poller.poll_once().await {
                TickOutcome::Failed(err) => bail!(err),
                _ => print_history(&poller.history()),
            }
        }
        Command::Watch { ticks } => watch(service, &config, ticks).await?,
    }
    Ok(())
}

fn load_config(api_url: Option<&str>) -> anyhow::Result<TrackerConfig> {
    let mut config = TrackerConfig::from_env().context("invalid SATTRACK_* environment")?;
    if let Some(url) = api_url {
        config.api_base_url = url.to_string();
        config = config.validated().context("invalid --api-url")?;
    }
    Ok(config)
}

async fn watch(
    service: Arc<Service>,
    config: &TrackerConfig,
    ticks: Option<u64>,
) -> anyhow::Result<()> {
    let session = TrackingCoordinator::new(service, config);
    let mut updates = session.subscribe_updates();
    session.start().await;

    let mut progress = WatchProgress::default();
    loop {
        let snapshot = session.snapshot();
        if progress.observe(&snapshot) {
            print_snapshot(&snapshot);
        }
        if ticks.is_some_and(|limit| progress.updates >= limit) {
            break;
        }
        if updates.changed().await.is_none() {
            break;
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Filters read-model updates down to the ones `watch` prints.
#[derive(Debug, Default)]
struct WatchProgress {
    last_update: Option<DateTime<Utc>>,
    last_poll_error: Option<String>,
    updates: u64,
}

impl WatchProgress {
    /// True for a new successful tick or a poll banner not printed yet.
    fn observe(&mut self, snapshot: &TrackingSnapshot) -> bool {
        let new_tick = snapshot.last_update_time != self.last_update;
        let new_error =
            snapshot.poll_error.is_some() && snapshot.poll_error != self.last_poll_error;
        if new_tick {
            self.last_update = snapshot.last_update_time;
            self.updates += 1;
        }
        self.last_poll_error = snapshot.poll_error.clone();
        new_tick || new_error
    }
}

fn print_snapshot(snapshot: &TrackingSnapshot) {
    let updated = snapshot
        .last_update_time
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("-- {} | updated {}", snapshot.selection_summary(), updated);
    for message in [&snapshot.error, &snapshot.poll_error].into_iter().flatten() {
        println!("!! {message}");
    }
    print_history(&snapshot.position_history);
}

fn print_history(history: &PositionHistory) {
    if history.is_empty() {
        println!("No satellites tracked.");
        return;
    }
    for (name, _) in history.iter() {
        match (history.status(name), history.latest(name)) {
            (TrackStatus::Tracking { samples }, Some(latest)) => println!(
                "{:<24} lat={:>9.4} lon={:>9.4} alt={} ({} samples, {})",
                name,
                latest.latitude,
                latest.longitude,
                latest
                    .altitude
                    .map(|km| format!("{km:.1}km"))
                    .unwrap_or_else(|| "-".to_string()),
                samples,
                latest.timestamp.to_rfc3339()
            ),
            _ => println!("{name:<24} waiting for position data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WatchProgress;
    use chrono::{TimeZone, Utc};
    use sattrack_core::{PollerPhase, PositionHistory, TrackingSnapshot};

    fn snapshot() -> TrackingSnapshot {
        TrackingSnapshot {
            catalog: Vec::new(),
            selections: Vec::new(),
            max_selections: 2,
            position_history: PositionHistory::new(),
            loading: false,
            error: None,
            notice: None,
            poll_error: None,
            last_update_time: None,
            refresh_token: 0,
            poller_phase: PollerPhase::Scheduled,
        }
    }

    #[test]
    fn poll_banner_is_printed_once_until_it_changes() {
        let mut progress = WatchProgress::default();
        let mut current = snapshot();
        assert!(!progress.observe(&current));

        current.last_update_time = Utc.timestamp_opt(1_740_824_130, 0).single();
        assert!(progress.observe(&current));
        assert_eq!(progress.updates, 1);

        current.poll_error = Some("Failed to load satellite positions: timeout".to_string());
        assert!(progress.observe(&current));
        // Registry syncs and dismissals re-deliver the same banner.
        assert!(!progress.observe(&current));
        assert!(!progress.observe(&current));

        current.poll_error = Some("Failed to load satellite positions: refused".to_string());
        assert!(progress.observe(&current));

        current.poll_error = None;
        current.last_update_time = Utc.timestamp_opt(1_740_824_190, 0).single();
        assert!(progress.observe(&current));
        assert_eq!(progress.updates, 2);
    }
}
