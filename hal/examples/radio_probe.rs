//! Radio Probe Example
//!
//! Tunes the simulated radio across a few channels and prints what each
//! one hears over a short listening window.

use lorascope_hal::{create_adapter, FrameStatus, HalConfig};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("╔══════════════════════════════════════╗");
    println!("║        LoRaScope Radio Probe         ║");
    println!("╚══════════════════════════════════════╝\n");

    let config = HalConfig::default();
    let mut radio = create_adapter(&config)?;
    radio.init()?;

    println!("Radio initialized: {}\n", radio.name());
    println!("Frequency    | Frames | CRC err | Noise");
    println!("-------------|--------|---------|--------");

    for freq in [433_125_000u32, 434_125_000, 435_125_000, 470_125_000] {
        radio.set_frequency(freq)?;

        let start = Instant::now();
        let mut frames = 0;
        let mut errors = 0;

        while start.elapsed() < Duration::from_millis(500) {
            match radio.receive_frame()?.status {
                FrameStatus::Done => frames += 1,
                FrameStatus::CrcError => errors += 1,
                FrameStatus::Empty => {}
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        println!("{:>8.3} MHz | {:>6} | {:>7} | {:>4} dBm",
            freq as f64 / 1_000_000.0,
            frames,
            errors,
            radio.get_rssi());
    }

    radio.sleep();
    Ok(())
}
