use std::path::PathBuf;

use clap::{Parser, Subcommand, crate_version};
use eyre::Result;
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use car_finder::compass_sensor::{Calibration, CompassHeading, CompassSensor};
use car_finder::config::Settings;
use car_finder::nmea_sensor::NmeaSensor;
use car_finder::notify::{DeepLinkAction, LogNotifier, Notifier};
use car_finder::sensor::{HeadingSource, NoHeading};
use car_finder::storage::{JsonFileStore, LocationStore};
use car_finder::{ArrowMode, GpsTracker, SavedLocation, TrackingState, guide};

/// Find your way back to where you parked.
#[derive(Parser)]
#[command(name = "car-finder", version = crate_version!())]
struct Opts {
    /// Configuration file (default ~/.config/car-finder/config.json)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
    /// GPS serial device
    #[arg(short = 'D', long)]
    device: Option<PathBuf>,
    /// File holding the saved location
    #[arg(short = 's', long)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Save the current position as the car's location
    Save {
        /// Number of GPS samples to pick the best from
        #[arg(short = 'n', long)]
        samples: Option<usize>,
    },
    /// Guide back to the saved location until interrupted
    Find {
        /// North-up arrow, ignore the compass
        #[arg(long)]
        simple: bool,
    },
    /// Print the saved location
    Show,
    /// Forget the saved location
    Clear,
    /// Act on a reminder link such as "?action=find"
    Open { link: String },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(fmt).init();
    trace!("Logging initialised.");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let opts = Opts::parse();

    let cfg = opts.config.unwrap_or_else(Settings::default_file);
    let mut settings = Settings::load(&cfg)?;
    if let Some(device) = opts.device {
        settings.device = device;
    }
    if let Some(store) = opts.store {
        settings.store = store;
    }
    debug!("settings={:?}", settings);

    let store = JsonFileStore::new(&settings.store);

    match opts.subcmd {
        SubCommand::Save { samples } => save(&settings, &store, samples).await,
        SubCommand::Find { simple } => find(&settings, &store, simple).await,
        SubCommand::Show => {
            show(&store);
            Ok(())
        }
        SubCommand::Clear => clear(&store),
        SubCommand::Open { link } => match DeepLinkAction::parse(&link) {
            Some(DeepLinkAction::Find) => find(&settings, &store, false).await,
            Some(DeepLinkAction::Update) => save(&settings, &store, None).await,
            Some(DeepLinkAction::Clear) => clear(&store),
            None => {
                warn!("Nothing to do for {:?}", link);
                Ok(())
            }
        },
    }
}

async fn save(settings: &Settings, store: &impl LocationStore, samples: Option<usize>) -> Result<()> {
    let sensor = NmeaSensor::open(&settings.device, settings.uere_m)?;
    let tracker = GpsTracker::with_settings(sensor, settings);

    let samples = samples.unwrap_or(settings.sample_count);
    println!("Taking {} GPS samples...", samples);
    let fix = tracker.best_reading(samples).await?;

    let saved = SavedLocation::from_fix(&fix);
    store.save(&saved)?;
    println!("✓ Car location saved: {}", saved);

    LogNotifier.notify(&saved);
    Ok(())
}

fn show(store: &impl LocationStore) {
    match store.load() {
        Some(saved) => println!("Car is at {}", saved),
        None => println!("No saved location."),
    }
}

fn clear(store: &impl LocationStore) -> Result<()> {
    store.clear()?;
    println!("Saved location cleared.");
    Ok(())
}

fn heading_source(settings: &Settings, simple: bool) -> (Box<dyn HeadingSource>, ArrowMode) {
    if simple {
        return (Box::new(NoHeading::new()), ArrowMode::Simple);
    }

    match CompassSensor::new(Calibration::from(settings)) {
        Ok(sensor) => (Box::new(CompassHeading::spawn(sensor)), ArrowMode::Compass),
        Err(e) => {
            warn!("No compass ({}), falling back to simple mode", e);
            (Box::new(NoHeading::new()), ArrowMode::Simple)
        }
    }
}

async fn find(settings: &Settings, store: &impl LocationStore, simple: bool) -> Result<()> {
    let Some(saved) = store.load() else {
        println!("No saved location. Run `car-finder save` first.");
        return Ok(());
    };
    let destination = saved.coordinate();
    println!("Car is at {}", saved);

    let (source, mode) = heading_source(settings, simple);
    let mut heading = source.subscribe();

    let sensor = NmeaSensor::open(&settings.device, settings.uere_m)?;
    let mut tracker = GpsTracker::with_settings(sensor, settings);
    let mut updates = tracker.subscribe();
    let mut follow_heading = mode == ArrowMode::Compass;
    tracker.start_tracking();
    println!("Waiting for GPS fix... (Ctrl+C to stop)");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if !state.tracking {
                    warn!("GPS feed ended");
                    break;
                }
                report(&state, &heading, &destination, mode);
            }
            changed = heading.changed(), if follow_heading => {
                if changed.is_err() {
                    warn!("Compass went away");
                    follow_heading = false;
                    continue;
                }
                heading.borrow_and_update();
                report(&tracker.state(), &heading, &destination, mode);
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    tracker.stop_tracking();
    Ok(())
}

fn report(
    state: &TrackingState,
    heading: &watch::Receiver<Option<f64>>,
    destination: &car_finder::Coordinate,
    mode: ArrowMode,
) {
    if let Some(e) = state.error {
        println!("  ! {}", e);
    }
    if let Some(position) = state.position {
        let guidance = guide(&position, destination, *heading.borrow(), mode);
        println!("  → {}", guidance);
    }
}
