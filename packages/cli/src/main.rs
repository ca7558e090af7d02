#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for loading and inspecting signal coverage data.
//!
//! Uses `indicatif-log-bridge` (via [`signal_map_cli_utils::init_logger`])
//! so log lines and the load progress bar share the terminal cleanly.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use signal_map_cli_utils::{IndicatifProgress, MultiProgress};
use signal_map_live::LiveUpdateChannel;
use signal_map_loader::{LoadCoordinator, SessionOutcome};
use signal_map_signal_models::{FilterCategory, FilterSet, TimeSeriesInterval};
use signal_map_source::{FilterOptionsClient, TimeSeriesClient};
use signal_map_source::api::SignalApi;
use signal_map_spatial::parse_districts;
use tokio::io::AsyncBufReadExt;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "signal_map", about = "Signal coverage data loader")]
struct Cli {
    /// TOML config file with `[api]`, `[live]` and `[loader]` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the selectable filter values as JSON
    Options,
    /// Load points (optionally narrowed) and print a summary
    Load {
        /// Narrow the load to one province
        #[arg(long)]
        province: Option<String>,
        /// Narrow the load to one municipality
        #[arg(long)]
        municipality: Option<String>,
    },
    /// Load points, then print per-district statistics for a `GeoJSON` file
    District {
        /// `GeoJSON` Feature, `FeatureCollection` or bare geometry with
        /// Polygon / `MultiPolygon` boundaries
        #[arg(long)]
        boundary: PathBuf,
        /// Narrow the load to one province
        #[arg(long)]
        province: Option<String>,
    },
    /// Print measurement counts per time bucket as JSON
    Timeseries {
        /// Bucket width: `hour` or `day`
        #[arg(long, default_value_t = TimeSeriesInterval::Hour)]
        interval: TimeSeriesInterval,
        /// Restrict the series to one province
        #[arg(long)]
        province: Option<String>,
    },
    /// Load, then follow live updates and periodic refreshes until Ctrl-C.
    /// Press Enter to request a manual refresh.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = signal_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let api = Arc::new(SignalApi::new(&config.api)?);

    match cli.command {
        Commands::Options => {
            let options = api.fetch_filter_options().await?;
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Commands::Load {
            province,
            municipality,
        } => {
            let filters = narrowing_filters(province, municipality);
            let coordinator = load(&config, &api, &multi, filters).await?;
            print_summary(&coordinator);
        }
        Commands::District { boundary, province } => {
            let text = std::fs::read_to_string(&boundary)?;
            let districts = parse_districts(&text)?;
            log::info!(
                "Parsed {} district(s) from {}",
                districts.len(),
                boundary.display()
            );

            let coordinator = load(&config, &api, &multi, narrowing_filters(province, None)).await?;

            let report: serde_json::Map<String, serde_json::Value> = districts
                .iter()
                .map(|(name, boundary)| {
                    let stats = coordinator.compute_district_stats(boundary);
                    Ok((name.clone(), serde_json::to_value(stats)?))
                })
                .collect::<Result<_, serde_json::Error>>()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Timeseries { interval, province } => {
            let series = api.fetch_time_series(interval, province.as_deref()).await?;
            log::info!("Fetched {} {interval} bucket(s)", series.data.len());
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        Commands::Watch => watch(&config, &api, &multi).await?,
    }

    Ok(())
}

fn narrowing_filters(province: Option<String>, municipality: Option<String>) -> FilterSet {
    FilterSet::new()
        .with(FilterCategory::Province, province)
        .with(FilterCategory::Municipality, municipality)
}

fn coordinator(config: &AppConfig, api: &Arc<SignalApi>, multi: &MultiProgress) -> LoadCoordinator {
    LoadCoordinator::with_progress(
        config.loader.clone(),
        api.clone(),
        api.clone(),
        IndicatifProgress::points_bar(multi, "Loading signals"),
    )
}

/// Runs one load generation for `filters` to completion, along with a
/// statistics refresh.
async fn load(
    config: &AppConfig,
    api: &Arc<SignalApi>,
    multi: &MultiProgress,
    filters: FilterSet,
) -> Result<LoadCoordinator, Box<dyn std::error::Error>> {
    let coordinator = coordinator(config, api, multi);

    let change = coordinator.set_filters(filters);
    let session = match change.reload {
        Some(session) => session,
        None => coordinator.start(),
    };

    let outcome = session.await?;
    change.stats.await?;

    if outcome == SessionOutcome::Failed {
        return Err("point load failed; see log for the request error".into());
    }

    Ok(coordinator)
}

fn print_summary(coordinator: &LoadCoordinator) {
    println!("Points loaded:  {}", coordinator.point_count());
    println!("Remote cursor:  {}", coordinator.cursor());
    if let Some(updated) = coordinator.last_update() {
        println!("Last update:    {}", updated.to_rfc3339());
    }

    match coordinator.aggregate_stats() {
        Some(stats) if !stats.is_empty() => {
            println!("Total signals:  {}", stats.total_signals);
            println!("Avg battery:    {:.1}", stats.average_battery);
            println!();
            println!("{:<20} SIGNALS", "COMPANY");
            println!("{}", "-".repeat(30));
            for (company, count) in &stats.signals_by_company {
                println!("{company:<20} {count}");
            }
        }
        _ => println!("Aggregate stats: no data"),
    }
}

async fn watch(
    config: &AppConfig,
    api: &Arc<SignalApi>,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = coordinator(config, api, multi);
    coordinator.start();
    coordinator.refresh_stats();

    let (live, events) = LiveUpdateChannel::spawn(config.live.clone());
    let attached = coordinator.attach_live(events);
    let poller = coordinator.spawn_poller();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status = tokio::time::interval(Duration::from_secs(5));
    let mut last_connected = None;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                log::info!("Shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    let route = coordinator.request_refresh(Some(&live));
                    log::info!("Manual refresh requested ({route:?})");
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = status.tick() => {
                let connected = coordinator.is_connected();
                if last_connected != Some(connected) {
                    log::info!("Live updates {}", if connected { "online" } else { "offline" });
                    last_connected = Some(connected);
                }
                log::info!(
                    "{} points, phase {:?}, last update {}",
                    coordinator.point_count(),
                    coordinator.phase(),
                    coordinator
                        .last_update()
                        .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339())
                );
            }
        }
    }

    live.shutdown();
    attached.abort();
    if let Some(poller) = poller {
        poller.abort();
    }

    Ok(())
}
