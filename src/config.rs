use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use home::home_dir;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::sensor::FixOptions;

// ** SAMPLING CONFIGURATION ** //

/// Number of one-shot samples taken when saving the car's location.
pub const DEFAULT_SAMPLE_COUNT: usize = 3;
/// Pause between samples to decorrelate their error.
pub const SAMPLE_DELAY_MS: u64 = 800;
/// Each one-shot request gives up after this long.
pub const SAMPLE_TIMEOUT_SECS: u64 = 15;

// ** TRACKING CONFIGURATION ** //

/// Number of recent fixes averaged while tracking.
pub const POSITION_BUFFER_SIZE: usize = 5;
/// A new position is only reported once it moves more than
/// this fraction of the incoming fix's accuracy.
pub const MOVEMENT_THRESHOLD_FACTOR: f64 = 0.5;
/// Floor applied to accuracy before weighting (meters).
pub const MIN_WEIGHT_ACCURACY_M: f64 = 0.01;

// ** GPS RECEIVER CONFIGURATION ** //

pub const GPS_DEVICE: &str = "/dev/serial0";
/// User equivalent range error, multiplied by HDOP to get accuracy in meters.
pub const GPS_UERE_M: f64 = 5.0;
/// Accuracy assumed for a fix that came without HDOP.
pub const GPS_DEFAULT_ACCURACY_M: f64 = 50.0;

// ** CALIBRATION CONFIGURATION ** //

// Magnetometer calibration offsets (hard iron correction)
// Obtained from calibration: rotate board 360° and record min/max X,Y values
pub const X_OFFSET: f64 = -2776.0; // (X_min + X_max) / 2
pub const Y_OFFSET: f64 = 2556.0; // (Y_min + Y_max) / 2
pub const HEADING_OFFSET: f64 = 88.0; // Overall heading correction for this location
pub const COMPASS_POLL_MS: u64 = 100;

// ** FILES ** //

const BASEDIR: &str = ".config";
const APP_DIR: &str = "car-finder";
const CONFIG_FILE: &str = "config.json";
const LOCATION_FILE: &str = "location.json";

/// Overrides for the constants above, read from `~/.config/car-finder/config.json`.
///
/// Every field is optional; missing ones keep their default.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub device: PathBuf,
    pub store: PathBuf,
    pub sample_count: usize,
    pub sample_delay_ms: u64,
    pub sample_timeout_secs: u64,
    pub buffer_size: usize,
    pub movement_threshold_factor: f64,
    pub uere_m: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub heading_offset: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: PathBuf::from(GPS_DEVICE),
            store: app_dir().join(LOCATION_FILE),
            sample_count: DEFAULT_SAMPLE_COUNT,
            sample_delay_ms: SAMPLE_DELAY_MS,
            sample_timeout_secs: SAMPLE_TIMEOUT_SECS,
            buffer_size: POSITION_BUFFER_SIZE,
            movement_threshold_factor: MOVEMENT_THRESHOLD_FACTOR,
            uere_m: GPS_UERE_M,
            x_offset: X_OFFSET,
            y_offset: Y_OFFSET,
            heading_offset: HEADING_OFFSET,
        }
    }
}

impl Settings {
    /// Load the given file; a missing file yields the defaults.
    pub fn load(fname: &Path) -> Result<Settings> {
        if !fname.exists() {
            debug!("No config at {:?}, using defaults", fname);
            return Ok(Settings::default());
        }

        trace!("Reading {:?}", fname);
        let content = fs::read_to_string(fname)?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Returns the path of the default config file.
    pub fn default_file() -> PathBuf {
        app_dir().join(CONFIG_FILE)
    }

    fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be at least 1".into()));
        }
        if self.movement_threshold_factor.is_nan() || self.movement_threshold_factor < 0.0 {
            return Err(Error::Config(
                "movement_threshold_factor must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }

    /// Options for the one-shot samples taken by best-of-N.
    pub fn fix_options(&self) -> FixOptions {
        FixOptions {
            timeout: Duration::from_secs(self.sample_timeout_secs),
            maximum_age: Duration::ZERO,
        }
    }
}

fn app_dir() -> PathBuf {
    let base = home_dir().unwrap_or_else(|| PathBuf::from("."));
    [base, PathBuf::from(BASEDIR), PathBuf::from(APP_DIR)]
        .iter()
        .collect()
}
