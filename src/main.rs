// Denizli transit proxy server and line tracker

use clap::{Parser, Subcommand};
use log::{error, info};
use std::process::ExitCode;

use denizli_transit::config::AppConfig;
use denizli_transit::history::{HistoryKind, HistoryRepository, JsonFileStore};
use denizli_transit::models::Direction;
use denizli_transit::server;
use denizli_transit::tracker::LineTracker;
use denizli_transit::upstream::TransitClient;

#[derive(Parser)]
#[command(version, about = "Denizli bus transit proxy and live line tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API proxy (default)
    Serve,
    /// Follow the live buses of a line in the terminal
    TrackLine {
        line_code: String,
        #[arg(long, default_value = "go", value_parser = parse_direction)]
        direction: Direction,
    },
    /// List recently viewed stations, cards or lines
    Recent {
        #[arg(default_value = "lines", value_parser = parse_kind)]
        kind: HistoryKind,
    },
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    s.parse().map_err(|e: denizli_transit::TransitError| e.to_string())
}

fn parse_kind(s: &str) -> Result<HistoryKind, String> {
    s.parse().map_err(|e: denizli_transit::TransitError| e.to_string())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::new_from_env_vars();

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => actix_web::rt::System::new()
            .block_on(server::run_server(config))
            .map_err(|e| format!("Server stopped: {}", e)),
        Command::TrackLine {
            line_code,
            direction,
        } => actix_web::rt::System::new().block_on(track_line(config, line_code, direction)),
        Command::Recent { kind } => print_recent(&config, kind),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn track_line(config: AppConfig, line_code: String, direction: Direction) -> Result<(), String> {
    let client = TransitClient::new(&config).map_err(|e| e.to_string())?;
    let history = HistoryRepository::new(JsonFileStore::new(config.history_path.clone()));
    if let Err(e) = history.record(HistoryKind::Lines, &line_code) {
        log::warn!("⚠️  Could not remember line {}: {}", line_code, e);
    }

    let mut tracker = LineTracker::new(client, config.poll_interval);
    tracker
        .select(&line_code, direction)
        .await
        .map_err(|e| format!("Could not load line {}: {}", line_code, e))?;

    info!(
        "🔄 Tracking {} ({}), refreshing every {}s. Ctrl-C to stop.",
        line_code,
        direction,
        config.poll_interval.as_secs()
    );

    // Print once for the initial load, then after every finished refresh
    let mut refreshed = tracker.subscribe();
    print_view(&tracker);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = refreshed.changed() => match changed {
                Ok(()) => print_view(&tracker),
                Err(_) => break,
            },
            _ = &mut shutdown => break,
        }
    }

    tracker.stop();
    Ok(())
}

fn print_view<S: denizli_transit::upstream::LineSource>(tracker: &LineTracker<S>) {
    let view = tracker.snapshot();
    let Some(route) = view.route() else {
        return;
    };

    println!(
        "\n🚏 {} - {} - {}",
        route.route_code(),
        route.direction,
        server::format_timestamp_full(chrono::Utc::now().timestamp())
    );
    if let Some(message) = view.error() {
        println!("❌ {}", message);
        return;
    }
    for row in view.timeline() {
        println!("{}", row);
    }
    match view.focus_sequence() {
        Some(sequence) => println!("🎯 First bus at stop #{}", sequence),
        None => println!("ℹ️  No bus currently on this route"),
    }
}

fn print_recent(config: &AppConfig, kind: HistoryKind) -> Result<(), String> {
    let history = HistoryRepository::new(JsonFileStore::new(config.history_path.clone()));
    let list = history.recent(kind).map_err(|e| e.to_string())?;

    if list.is_empty() {
        println!("No recent {} yet", kind);
    }
    for (i, entry) in list.entries().iter().enumerate() {
        println!("{:>2}. {}", i + 1, entry);
    }
    Ok(())
}
