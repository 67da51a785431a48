use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use locus_core::{AppError, Config};
use locus_geo::{Coordinate, GeoFenceEvaluator, PeerId, Transition};
use locus_live::{
    LiveSession, LocalHub, MarkerLayer, PositionSource, ReplaySource, SessionEvent,
    TransportChannel, WatchOptions,
};
use locus_weather::WeatherProvider;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "locus", version, about = "Live location tracking with a circular geo-fence")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "LOCUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify a single coordinate against the fence
    Check {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Replay a recorded track through a full tracking session
    Replay {
        /// JSON array of {"latitude", "longitude"} objects
        track: PathBuf,
        /// Delay between samples
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Simulated peer as NAME=TRACK.json (repeatable)
        #[arg(long = "peer", value_parser = parse_peer)]
        peers: Vec<(String, PathBuf)>,
        /// Skip weather lookups even if configured
        #[arg(long)]
        no_weather: bool,
    },
    /// Show the configuration file and its validation result
    Config,
}

fn parse_peer(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=TRACK.json, got '{}'", s)),
    }
}

fn load_track(path: &Path, interval: Duration) -> Result<ReplaySource> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read track {}", path.display()))?;
    ReplaySource::from_json(&json, interval)
        .with_context(|| format!("Failed to parse track {}", path.display()))
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Config::config_path(),
    }
}

fn check(config: &Config, at: Coordinate) -> Result<()> {
    let mut evaluator = GeoFenceEvaluator::new(config.fence.to_fence()?);
    let evaluation = evaluator.evaluate(at);

    println!(
        "{} is {:.1} m from the fence center: {}",
        at,
        evaluation.distance_meters,
        if evaluation.inside { "inside" } else { "outside" }
    );
    Ok(())
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Transition {
            entity,
            transition,
            at,
            distance_meters,
        } => {
            let verb = match transition {
                Transition::Entered => "entered",
                Transition::Exited => "exited",
            };
            format!(
                "{} {} the Geo-Fence at {} ({:.0} m from center)",
                entity, verb, at, distance_meters
            )
        }
        SessionEvent::Alert { message, .. } => format!("ALERT: {}", message),
        SessionEvent::PeerLeft(peer) => format!("device {} disconnected", peer),
        SessionEvent::PositionFailed(e) => format!("position error: {}", e),
        SessionEvent::PublishFailed(e) => format!("publish failed: {}", e),
        SessionEvent::WeatherUpdated(widget) => widget.render().replace('\n', " | "),
    }
}

/// Publish a peer's recorded track through its own hub connection.
fn spawn_peer(hub: &LocalHub, name: String, track: ReplaySource) {
    let connection = hub.connect_as(PeerId::new(name));
    tokio::spawn(async move {
        let mut samples = track.watch(&WatchOptions::default());
        while let Some(update) = samples.recv().await {
            if let Ok(at) = update {
                if let Err(e) = connection.publish(at).await {
                    tracing::warn!("Peer {} failed to publish: {}", connection.peer_id(), e);
                    break;
                }
            }
        }
        // Dropping the connection announces the disconnect.
    });
}

async fn replay(
    config: &Config,
    track: &Path,
    interval: Duration,
    peers: Vec<(String, PathBuf)>,
    no_weather: bool,
) -> Result<()> {
    let local = load_track(track, interval)?;
    let hub = LocalHub::from_config(&config.transport);
    let connection = hub.connect_as(PeerId::new("local"));

    let (session, mut events) = LiveSession::from_config(config, MarkerLayer::new(), connection)?;

    let api_key = config.weather.resolved_api_key();
    let session = match api_key {
        Some(key) if config.weather.enabled && !no_weather => {
            let provider = WeatherProvider::new(key, config.weather.temperature_unit)?
                .with_base_url(&config.weather.base_url)?;
            session.with_weather(provider)
        }
        _ => {
            tracing::info!("Weather lookups disabled");
            session
        }
    };

    let positions = local.watch(&WatchOptions::from(&config.position));
    let remote = session.transport().subscribe();

    for (name, path) in peers {
        spawn_peer(&hub, name, load_track(&path, interval)?);
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", describe(&event));
        }
    });

    let session = session.run(positions, remote, shutdown).await;

    println!("\nMarkers:");
    for (peer, at) in session.map().markers() {
        println!("  {}: {}", peer, at);
    }
    println!("\nWeather:\n  {}", session.widget().render().replace('\n', "\n  "));

    drop(session);
    printer.await.context("Event printer failed")?;
    Ok(())
}

fn show_config(path: &Path) -> Result<()> {
    let config = Config::load_from(path)?;
    let validation = config.validate();

    println!("Config file: {}", path.display());
    println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);

    for error in &validation.errors {
        println!("error: {}", error);
    }
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    if validation.is_valid() {
        println!("Configuration is valid");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let path = config_path(&cli)?;

    match cli.command {
        Command::Check {
            latitude,
            longitude,
        } => {
            let config = Config::load_from(&path)?;
            check(&config, Coordinate::new(latitude, longitude))
        }
        Command::Replay {
            track,
            interval_ms,
            peers,
            no_weather,
        } => {
            let (config, _) = Config::load_validated(&path)?;
            replay(
                &config,
                &track,
                Duration::from_millis(interval_ms),
                peers,
                no_weather,
            )
            .await
        }
        Command::Config => show_config(&path),
    }
}

/// Text shown to the user when a command fails.
fn failure_message(err: anyhow::Error) -> String {
    let err = AppError::from(err);
    format!("{}\n  {}", err.user_message(), err)
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = locus_core::init() {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {:#}", e);
            eprintln!("{}", failure_message(e));
            ExitCode::FAILURE
        }
    }
}
