// ABOUTME: Entry point for the trailstore binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs store or hub commands.

mod config;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use trailstore_core::{Marker, Track, TrackId, TrackPoint, TrackStatistics};
use trailstore_hub::TrackDataListener;
use trailstore_store::{TrackStore, migration};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "trailstore", version, about = "Inspect and maintain a GPS track store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all tracks as JSON, newest first.
    Tracks,
    /// Print movement and sensor statistics of a track as JSON.
    Stats { id: i64 },
    /// Delete a track together with its points and markers.
    Delete { id: i64 },
    /// Move the database schema to a specific version.
    Migrate {
        #[arg(long)]
        to: Option<u32>,
    },
    /// Stream a track through the hub and log what a display would receive.
    Watch { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "trailstore=info,trailstore_store=info,trailstore_hub=info",
                )
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Migrate { to } => {
            let target = to.unwrap_or_else(migration::latest_version);
            let previous = migration::migrate_file(&config.database, target)
                .with_context(|| format!("migrating {}", config.database.display()))?;
            println!("schema version {previous} -> {target}");
        }
        Command::Tracks => {
            let store = open_store(&config)?;
            let tracks = store.get_tracks()?;
            println!("{}", serde_json::to_string_pretty(&tracks)?);
        }
        Command::Stats { id } => {
            let store = open_store(&config)?;
            let track_id = TrackId(id);
            let Some(track) = store.get_track(track_id)? else {
                bail!("track {id} not found");
            };
            let sensors = store.sensor_statistics(track_id)?;
            let report = serde_json::json!({
                "track": track.name,
                "statistics": track.statistics,
                "average_speed_mps": track.statistics.average_speed(),
                "max_speed_mps": track.statistics.max_speed(),
                "sensors": sensors,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Delete { id } => {
            let store = open_store(&config)?;
            let rows = store
                .delete_track(TrackId(id))
                .with_context(|| format!("deleting track {id}"))?;
            println!("deleted {rows} rows");
        }
        Command::Watch { id } => watch(&config, TrackId(id)).await?,
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> anyhow::Result<TrackStore> {
    TrackStore::open(&config.store())
        .with_context(|| format!("opening {}", config.database.display()))
}

async fn watch(config: &AppConfig, track_id: TrackId) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config)?);
    let hub = trailstore_hub::spawn(store, config.hub())?;
    hub.register_listener(LoggingListener::default()).await?;
    hub.load_track(track_id).await?;
    hub.start().await?;

    tracing::info!(track_id = %track_id, "watching track, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    hub.shutdown().await?;
    Ok(())
}

/// Logs a summary of each stream the hub delivers.
#[derive(Default)]
struct LoggingListener {
    sampled_in: u64,
    sampled_out: u64,
    markers: u64,
    latest: Option<TrackStatistics>,
}

impl TrackDataListener for LoggingListener {
    fn on_track_updated(&mut self, track: &Track) {
        tracing::info!(name = %track.name, activity = track.activity_type.id(), "track updated");
    }

    fn clear_track_points(&mut self) {
        self.sampled_in = 0;
        self.sampled_out = 0;
    }

    fn on_sampled_in_point(&mut self, _point: &TrackPoint, statistics: &TrackStatistics) {
        self.sampled_in += 1;
        self.latest = Some(statistics.clone());
    }

    fn on_sampled_out_point(&mut self, _point: &TrackPoint, statistics: &TrackStatistics) {
        self.sampled_out += 1;
        self.latest = Some(statistics.clone());
    }

    fn on_point_stream_done(&mut self) {
        let (distance, moving) = self
            .latest
            .as_ref()
            .map_or((0.0, 0), |s| (s.total_distance_m, s.moving_time_ms));
        tracing::info!(
            sampled_in = self.sampled_in,
            sampled_out = self.sampled_out,
            distance_m = distance,
            moving_time_ms = moving,
            "points streamed"
        );
    }

    fn clear_markers(&mut self) {
        self.markers = 0;
    }

    fn on_new_marker(&mut self, marker: &Marker) {
        self.markers += 1;
        tracing::debug!(name = %marker.name, "marker");
    }

    fn on_marker_stream_done(&mut self) {
        tracing::info!(markers = self.markers, "markers streamed");
    }
}
