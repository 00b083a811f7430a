use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use tsuiseki_core::{
    AnimeId, AppConfig, Catalog, CoreError, MediaTimer, MediaTracker, Notifier, TrackerContext,
    TrackerEvent, WatchEvent,
};
use tsuiseki_detect::{
    enabled_players, DetectError, MediaEnumerator, PlayerCategory, PlayerDatabase,
    StreamDatabase, SystemEnumerator,
};

#[derive(Debug, Parser)]
#[command(name = "tsuiseki", version, about = "Track what you are watching")]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to daily rotated files in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch running players and report watching sessions (default).
    Watch {
        /// Seconds between detection ticks.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run a single detection pass and print the result as JSON.
    Detect,
    /// List the known media players.
    Players,
    /// Write the default config file if there is none yet.
    Init,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no usable media players in {0}")]
    Registry(PathBuf),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref());

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command.unwrap_or(Command::Watch { interval: None }) {
        Command::Watch { interval } => watch(&config, interval).await,
        Command::Detect => detect(&config),
        Command::Players => list_players(&config),
        Command::Init => init_config(cli.config.unwrap_or_else(AppConfig::config_path)),
    }
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tsuiseki=debug"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tsuiseki.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Reports tracker notifications through the log.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn clear_status(&self) {
        debug!("Status cleared");
    }

    fn set_now_playing(&self, anime_id: AnimeId) {
        info!(anime = %anime_id, "Now playing");
    }

    fn recognition_failed(&self, title: &str) {
        warn!(title = %title, "Media was not recognized");
    }

    fn registry_error(&self, message: &str, path: &Path) {
        tracing::error!(path = %path.display(), "Could not read media players: {message}");
    }
}

/// Remembers that the tracker asked for a fresh tick countdown.
#[derive(Default)]
struct IntervalTimer {
    reset: Cell<bool>,
}

impl IntervalTimer {
    fn take(&self) -> bool {
        self.reset.replace(false)
    }
}

impl MediaTimer for IntervalTimer {
    fn reset(&self) {
        self.reset.set(true);
    }
}

async fn watch(config: &AppConfig, interval_override: Option<u64>) -> Result<(), CliError> {
    let settings = config.tracker_settings();
    let heuristics = StreamDatabase::load(&config.streams_path());
    let catalog = Catalog::load(&config.catalog_path())?;
    let notifier = LogNotifier;
    let timer = IntervalTimer::default();

    let players_path = config.players_path();
    let mut tracker = MediaTracker::new();
    if !tracker.load_registry(&players_path, &notifier) {
        return Err(CliError::Registry(players_path));
    }

    let ctx = TrackerContext {
        settings: &settings,
        enumerator: &SystemEnumerator,
        heuristics: &heuristics,
        recognizer: &catalog,
        library: &catalog,
        notifier: &notifier,
        timer: &timer,
    };

    let seconds = interval_override
        .unwrap_or(config.general.detection_interval)
        .max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval = seconds,
        players = tracker.registry().len(),
        streams = heuristics.len(),
        anime = catalog.len(),
        "Watching for media players"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut in_background = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for event in tracker.on_tick(&ctx) {
                    report(&event, &catalog);
                    if matches!(event, WatchEvent::StartWatching { .. }) && !settings.wait_player {
                        tracker.mark_processed();
                    }
                }
                let background =
                    tracker.player_running() && !tracker.is_active_player_foreground(&ctx);
                if background != in_background {
                    let player = tracker.current_player_name();
                    if background {
                        debug!(player = %player, "Player is not in the foreground");
                    } else if tracker.player_running() {
                        debug!(player = %player, "Player is back in the foreground");
                    }
                    in_background = background;
                }
                if timer.take() {
                    interval.reset();
                }
            }
            _ = &mut shutdown => {
                info!("Stopping");
                break;
            }
        }
    }

    for (at, event) in tracker.event_log().snapshot() {
        if event != TrackerEvent::Tick {
            debug!(at = %at, event = ?event, "Recent tracker event");
        }
    }
    Ok(())
}

fn report(event: &WatchEvent, catalog: &Catalog) {
    let anime_id = event.anime_id();
    let title = catalog
        .get(anime_id)
        .map(|e| e.title.as_str())
        .unwrap_or_default();
    let episode = event.episode().episode_number;
    match event {
        WatchEvent::StartWatching { .. } => {
            info!(anime_id, anime = %title, episode = ?episode, "Started watching");
        }
        WatchEvent::EndWatching { .. } => {
            info!(anime_id, anime = %title, episode = ?episode, "Stopped watching");
        }
        WatchEvent::UpdateList { episode: guess, .. } if guess.processed => {
            debug!(anime_id, episode = ?episode, "List already up to date");
        }
        WatchEvent::UpdateList { .. } => {
            info!(anime_id, anime = %title, episode = ?episode, "Update list entry");
        }
    }
}

fn detect(config: &AppConfig) -> Result<(), CliError> {
    let registry = load_players(config)?;
    let players = enabled_players(&registry, config.tracker_settings().detection_filter());
    let results = SystemEnumerator.enumerate(&players, &|_| true)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn list_players(config: &AppConfig) -> Result<(), CliError> {
    let registry = load_players(config)?;
    let width = registry
        .players
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or_default();
    for player in &registry.players {
        let name = &player.name;
        let category = match player.category {
            PlayerCategory::Default => "player",
            PlayerCategory::WebBrowser => "browser",
        };
        let enabled = if player.enabled { "enabled" } else { "disabled" };
        println!("{name:<width$}  {category:<7}  {enabled}");
    }
    Ok(())
}

fn init_config(path: PathBuf) -> Result<(), CliError> {
    if path.exists() {
        info!(path = %path.display(), "Config file already exists");
        return Ok(());
    }
    AppConfig::default().save_to(&path)?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}

fn load_players(config: &AppConfig) -> Result<PlayerDatabase, CliError> {
    let path = config.players_path();
    PlayerDatabase::load(&path).map_err(|e| {
        tracing::error!(error = %e, "Could not read media players");
        CliError::Registry(path)
    })
}
