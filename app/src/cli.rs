//! LoRaScope CLI Tool
//!
//! Command-line interface for inspecting the frequency plan and running
//! one-off activity surveys.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lorascope_hal::create_adapter;
use lorascope_scanner::{
    Clock, FrequencyStats, FrequencySweeper, MonotonicClock, StatisticsCollector, SweepOrder,
};
use std::path::PathBuf;
use std::sync::Arc;

mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "lorascope-cli")]
#[command(author = "LoRaScope Team")]
#[command(version)]
#[command(about = "LoRaScope Spectrum Activity Scanner CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: standard search paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate sample configuration
    Config {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the frequencies the plan expands to
    Plan {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Sweep the plan and rank frequencies by activity
    Survey {
        /// Number of passes (ignored with --continuous)
        #[arg(short, long, default_value_t = 1)]
        passes: u32,

        /// Observations per frequency per pass
        #[arg(short, long)]
        samples: Option<u32>,

        /// Visit frequencies in random order
        #[arg(long)]
        shuffle: bool,

        /// Keep sweeping until Ctrl+C
        #[arg(long)]
        continuous: bool,

        /// Only show the N most active frequencies
        #[arg(short, long)]
        top: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// System information
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            generate_config(output)?;
        }

        Commands::Plan { format } => {
            let config = AppConfig::resolve(cli.config.as_deref())?;
            show_plan(&config, format)?;
        }

        Commands::Survey { passes, samples, shuffle, continuous, top, format } => {
            let mut config = AppConfig::resolve(cli.config.as_deref())?;
            if let Some(samples) = samples {
                config.sweep.samples_per_freq = samples;
            }
            if shuffle {
                config.sweep.order = SweepOrder::Random;
            }
            config.sweep.continuous |= continuous;
            survey(&config, passes, top, format).await?;
        }

        Commands::Info => {
            let config = AppConfig::resolve(cli.config.as_deref())?;
            show_info(&config);
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let example = AppConfig::example();

    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, example)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Configuration written to: {:?}", path);
    } else {
        println!("{}", example);
    }

    Ok(())
}

fn show_plan(config: &AppConfig, format: Format) -> Result<()> {
    let channels = config.plan.frequencies();

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&channels)?);
        }
        Format::Table => {
            if channels.is_empty() {
                println!("Plan is empty (start above end?)");
                return Ok(());
            }

            println!("╭──────┬───────────────────────────────────────────────────────╮");
            println!("│    # │ Channel                                               │");
            println!("├──────┼───────────────────────────────────────────────────────┤");
            for (i, channel) in channels.iter().enumerate() {
                println!("│ {:>4} │ {:53} │", i + 1, channel.describe());
            }
            println!("╰──────┴───────────────────────────────────────────────────────╯");
            println!("\nTotal channels: {}", channels.len());
        }
    }

    Ok(())
}

async fn survey(config: &AppConfig, passes: u32, top: Option<usize>, format: Format) -> Result<()> {
    let channels = config.plan.frequencies();
    if channels.is_empty() {
        bail!("frequency plan is empty");
    }

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let radio = create_adapter(&config.hal)?;
    let mut sweeper = FrequencySweeper::new(radio, channels, config.sweep.clone(), clock.clone());
    sweeper.init()?;

    let mut collector = StatisticsCollector::with_clock(clock);

    if sweeper.is_continuous() {
        eprintln!("Sweeping continuously, Ctrl+C to stop");
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                swept = sweeper.sweep_once(&mut collector) => {
                    swept?;
                    if format == Format::Table {
                        print_ranking(&collector.get_all_stats(), top, sweeper.passes());
                    }
                }
            }
        }
    } else {
        for pass in 1..=passes.max(1) {
            let taken = sweeper.sweep_once(&mut collector).await?;
            eprintln!("Pass {}/{}: {} samples", pass, passes.max(1), taken);
        }
    }

    let mut ranked = collector.get_all_stats();
    if let Some(top) = top {
        ranked.truncate(top);
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&ranked)?),
        Format::Table => print_ranking(&ranked, None, sweeper.passes()),
    }

    let mut radio = sweeper.into_radio();
    radio.sleep();
    Ok(())
}

fn print_ranking(ranked: &[FrequencyStats], top: Option<usize>, passes: u64) {
    let shown = top.unwrap_or(ranked.len()).min(ranked.len());

    println!("╭─────────────┬─────────┬──────────┬──────────┬──────────┬───────────╮");
    println!("│ Frequency   │ Score   │ Avg dBm  │ Max dBm  │ Min dBm  │ Packets   │");
    println!("├─────────────┼─────────┼──────────┼──────────┼──────────┼───────────┤");
    for stats in &ranked[..shown] {
        println!("│ {:>7.3} MHz │ {:>7.3} │ {:>8} │ {:>8} │ {:>8} │ {:>4}/{:<4} │",
            stats.frequency as f64 / 1_000_000.0,
            stats.activity_score,
            stats.avg_rssi,
            stats.max_rssi,
            stats.min_rssi,
            stats.packet_count,
            stats.sample_count);
    }
    println!("╰─────────────┴─────────┴──────────┴──────────┴──────────┴───────────╯");
    println!("{} frequencies after {} pass(es), {}",
        ranked.len(),
        passes,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
}

fn show_info(config: &AppConfig) {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("╭──────────────────────────────────────────────────────────────╮");
    println!("│             LoRaScope System Information                     │");
    println!("╰──────────────────────────────────────────────────────────────╯\n");

    println!("System:");
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  OS: {} {}",
        System::name().unwrap_or_default(),
        System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());

    println!("\nHardware:");
    println!("  CPU: {}", sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown"));
    println!("  Cores: {}", sys.cpus().len());
    println!("  Memory: {} MB total, {} MB used",
        sys.total_memory() / 1024 / 1024,
        sys.used_memory() / 1024 / 1024);

    println!("\nLoRaScope:");
    println!("  Version: {}", env!("CARGO_PKG_VERSION"));
    println!("  Config: {}", if config.config_path.as_os_str().is_empty() {
        "defaults".to_string()
    } else {
        config.config_path.display().to_string()
    });
    println!("  Module: {}", config.hal.module);

    println!("\nRadio Availability:");
    if config.hal.module.is_serial() {
        let present = std::path::Path::new(&config.hal.serial_port).exists();
        println!("  {} @ {} baud: {}",
            config.hal.serial_port,
            config.hal.baud,
            if present { "✓" } else { "✗" });
    } else {
        println!("  No serial port needed for {}", config.hal.module);
    }
}
