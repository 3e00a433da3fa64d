use std::thread;
use std::time::Duration;

use car_finder::compass_sensor::{Calibration, CalibrationWindow, CompassError, CompassSensor};
use eyre::Result;
use tracing::{trace, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Magnetometer Calibration Tool                    ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("Instructions:");
    println!("1. Keep the board LEVEL (horizontal)");
    println!("2. Slowly rotate the board through a FULL 360° circle");
    println!("3. Take at least 30 seconds to complete the rotation");
    println!("4. Try to rotate smoothly at constant speed");
    println!("5. Press Ctrl+C when done, then copy the offsets into config.json\n");

    println!("Starting in 5 seconds...\n");
    thread::sleep(Duration::from_secs(5));

    let mut compass = CompassSensor::new(Calibration::default())?;
    let mut window = CalibrationWindow::default();

    println!("Collecting samples... (ROTATE NOW!)");
    println!(
        "\n{:^8} | {:^20} | {:^20} | {:^20}",
        "Sample", "X Range", "Y Range", "Calculated Offsets"
    );
    println!("{:-<8}-+-{:-<20}-+-{:-<20}-+-{:-<20}", "", "", "", "");

    loop {
        match compass.read_raw_magnetometer() {
            Ok((x, y)) => {
                window.update(x, y);

                // Print update every 10 samples
                if window.samples % 10 == 0
                    && let Some((x_offset, y_offset)) = window.offsets()
                {
                    println!(
                        "{:^8} | {:>7.0} to {:>7.0} | {:>7.0} to {:>7.0} | X: {:>7.0}  Y: {:>7.0}",
                        window.samples,
                        window.x_min,
                        window.x_max,
                        window.y_min,
                        window.y_max,
                        x_offset,
                        y_offset
                    );
                }
            }
            Err(CompassError::NotReady) => trace!("no sample yet"),
            Err(e) => warn!("Read failed: {}", e),
        }

        thread::sleep(Duration::from_millis(100));
    }
}
