//! LoRaScope Spectrum Activity Scanner
//!
//! Main application entry point: hops the radio across the configured plan,
//! keeps the event history and per-frequency rankings, and takes single-key
//! commands on stdin.

use anyhow::Result;
use clap::Parser;
use lorascope_hal::create_adapter;
use lorascope_scanner::{
    Clock, FrequencyListener, MonotonicClock, RadarPoint, ScanSample, StatisticsCollector,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

mod config;
mod status;

use config::AppConfig;
use status::StatusBoard;

#[derive(Parser)]
#[command(name = "lorascope")]
#[command(version, about = "LoRaScope spectrum activity scanner", long_about = None)]
struct Args {
    /// Configuration file (default: standard search paths)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Do not start scanning on launch
    #[arg(long)]
    paused: bool,
}

/// Keyboard commands, one per line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    ToggleScan,
    Clear,
    PrevFrequency,
    NextFrequency,
    Ranking,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "s" => Some(Command::ToggleScan),
            "c" => Some(Command::Clear),
            "-" => Some(Command::PrevFrequency),
            "=" | "+" => Some(Command::NextFrequency),
            "r" => Some(Command::Ranking),
            "h" | "?" => Some(Command::Help),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Everything the foreground loop drives
struct Scanner {
    listener: Option<FrequencyListener>,
    events: Option<mpsc::Receiver<RadarPoint>>,
    collector: StatisticsCollector,
    board: Arc<StatusBoard>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    tracing::info!("╔══════════════════════════════════════════╗");
    tracing::info!("║   LoRaScope Spectrum Activity Scanner    ║");
    tracing::info!("║            Version {:<22}║", env!("CARGO_PKG_VERSION"));
    tracing::info!("╚══════════════════════════════════════════╝");

    let config = AppConfig::resolve(args.config.as_deref())?;
    tracing::info!("Configuration loaded from {:?}", config.config_path);

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let board = Arc::new(StatusBoard::new());
    let mut scanner = Scanner {
        listener: None,
        events: None,
        collector: StatisticsCollector::with_clock(clock.clone()),
        board: board.clone(),
    };

    tracing::info!("Initializing radio ({})...", config.hal.module);
    match create_adapter(&config.hal) {
        Ok(radio) => {
            let (mut listener, events) = FrequencyListener::new(radio, clock.clone());
            listener.set_sink(board.clone());

            match listener.init(config.listener_config()) {
                Ok(()) => {
                    if config.auto_start && !args.paused {
                        if let Err(e) = listener.start() {
                            tracing::error!("Could not start scanning: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Radio initialization failed: {}", e);
                    tracing::warn!("Running in degraded mode, scanning is INACTIVE");
                }
            }

            scanner.listener = Some(listener);
            scanner.events = Some(events);
        }
        Err(e) => {
            tracing::error!("No usable radio: {}", e);
            tracing::warn!("Running in degraded mode, scanning is INACTIVE");
        }
    }

    print_system_status(&config, &scanner);

    tracing::info!("Commands: s=start/stop c=clear -/= prev/next r=ranking q=quit");
    tracing::info!("Press Ctrl+C to stop");

    run(&config, &mut scanner).await;

    tracing::info!("Shutting down...");
    if let Some(listener) = scanner.listener.as_mut() {
        listener.power_down().await;
        let stats = listener.get_event_stats();
        tracing::info!(
            "Session total: {} events ({} ok, {} CRC errors)",
            stats.total_events,
            stats.rx_done_count,
            stats.rx_error_count
        );
    }
    tracing::info!("LoRaScope shutdown complete");

    Ok(())
}

/// Foreground loop: events, periodic refresh, status, commands
async fn run(config: &AppConfig, scanner: &mut Scanner) {
    let mut stats_tick = tokio::time::interval(Duration::from_millis(config.stats_interval_ms.max(1)));
    let mut status_tick = tokio::time::interval(Duration::from_secs(config.status_interval_secs.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            Some(point) = next_event(&mut scanner.events) => {
                scanner.collector.add_sample(ScanSample::from(&point));
            }
            _ = stats_tick.tick() => {
                scanner.collector.update_statistics();
                scanner.collector.cleanup(config.stats_max_age_ms);
            }
            _ = status_tick.tick() => report_status(scanner),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let Some(command) = Command::parse(&line) else {
                        if !line.trim().is_empty() {
                            tracing::warn!("Unknown command {:?}, h for help", line.trim());
                        }
                        continue;
                    };
                    if command == Command::Quit {
                        break;
                    }
                    handle_command(command, scanner).await;
                }
                Ok(None) => {
                    tracing::debug!("stdin closed, commands disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read command: {}", e);
                    stdin_open = false;
                }
            },
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<RadarPoint>>) -> Option<RadarPoint> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_command(command: Command, scanner: &mut Scanner) {
    match command {
        Command::Ranking => {
            scanner.collector.update_statistics();
            print_ranking(&scanner.collector);
            return;
        }
        Command::Help => {
            tracing::info!("s start/stop, c clear, - previous, = next, r ranking, q quit");
            return;
        }
        Command::Clear => {
            scanner.collector.clear();
        }
        _ => {}
    }

    let Some(listener) = scanner.listener.as_mut() else {
        tracing::warn!("No radio, scanning is INACTIVE");
        return;
    };

    match command {
        Command::ToggleScan => {
            if listener.is_running() {
                listener.stop().await;
            } else if let Err(e) = listener.start() {
                tracing::warn!("Cannot start scanning: {}", e);
            }
        }
        Command::Clear => {
            listener.clear_radar_points();
            listener.clear_event_stats();
            tracing::info!("History and statistics cleared");
        }
        Command::PrevFrequency | Command::NextFrequency => {
            let hopped = if command == Command::NextFrequency {
                listener.next_frequency()
            } else {
                listener.prev_frequency()
            };
            match hopped {
                Ok(hz) => tracing::info!(
                    "Listening on {:.3} MHz ({}/{})",
                    hz as f64 / 1_000_000.0,
                    listener.current_index() + 1,
                    listener.frequency_count()
                ),
                Err(e) => tracing::warn!("Cannot change frequency: {}", e),
            }
        }
        Command::Ranking | Command::Help | Command::Quit => {}
    }
}

fn report_status(scanner: &Scanner) {
    let board = scanner.board.snapshot();
    let now = chrono::Local::now().format("%H:%M:%S");

    let Some(listener) = scanner.listener.as_ref() else {
        tracing::info!("[{}] Scanning INACTIVE (no radio)", now);
        return;
    };

    let stats = listener.get_event_stats();
    let avg = stats
        .avg_rssi_dbm()
        .map(|v| format!("{} dBm", v))
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        "[{}] {} | {:.3} MHz ({}/{}) | last {} dBm | events {} (ok {}, crc {}, {:.0}% err) | avg {} | tracked {}",
        now,
        if board.scanning { "SCANNING" } else { "INACTIVE" },
        board.current_freq as f64 / 1_000_000.0,
        board.index + 1,
        board.total,
        board.rssi,
        stats.total_events,
        stats.rx_done_count,
        stats.rx_error_count,
        stats.error_rate() * 100.0,
        avg,
        scanner.collector.frequency_count()
    );

    if let Some(point) = listener.get_radar_points().last() {
        tracing::debug!(
            "Latest: {:?} on {:.3} MHz at {} dBm",
            point.event_type,
            point.frequency as f64 / 1_000_000.0,
            point.rssi
        );
    }
}

fn print_ranking(collector: &StatisticsCollector) {
    let ranked = collector.get_all_stats();
    if ranked.is_empty() {
        tracing::info!("No activity recorded yet");
        return;
    }

    tracing::info!("Most active frequencies:");
    for (i, stats) in ranked.iter().take(10).enumerate() {
        tracing::info!(
            "{:>2}. {:>9.3} MHz  score {:.2}  avg {:>4} dBm  packets {}/{}",
            i + 1,
            stats.frequency as f64 / 1_000_000.0,
            stats.activity_score,
            stats.avg_rssi,
            stats.packet_count,
            stats.sample_count
        );
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,lorascope=debug,lorascope_hal=info,lorascope_scanner=debug")
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false))
            .init();
    }
}

fn print_system_status(config: &AppConfig, scanner: &Scanner) {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();

    let plan = &config.plan;
    let radio = scanner
        .listener
        .as_ref()
        .map(|l| l.radio_name())
        .unwrap_or_else(|| "none".to_string());

    tracing::info!("╭─────────────── System Status ───────────────╮");
    tracing::info!("│ Hostname: {:>33} │", System::host_name().unwrap_or_default());
    tracing::info!("│ Memory: {:>26} MB / {} MB │",
        sys.used_memory() / 1024 / 1024,
        sys.total_memory() / 1024 / 1024);
    tracing::info!("├──────────────── Configuration ──────────────┤");
    tracing::info!("│ Radio: {:>36} │", radio);
    tracing::info!("│ Range: {:>16.3} - {:.3} MHz │",
        plan.start_hz as f64 / 1_000_000.0,
        plan.end_hz as f64 / 1_000_000.0);
    tracing::info!("│ Channels: {:>33} │", plan.frequencies().len());
    tracing::info!("│ RX Window: {:>29} ms │", plan.rx_window_ms);
    tracing::info!("│ BW / SF / CR: {:>14} kHz / {} / 4/{} │",
        plan.bandwidth, plan.spreading_factor, plan.coding_rate);
    tracing::info!("╰─────────────────────────────────────────────╯");
}
