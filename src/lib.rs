pub mod compass;
pub mod compass_sensor;
pub mod config;
pub mod error;
pub mod fix;
pub mod gps_tracker;
pub mod guidance;
pub mod nmea_sensor;
pub mod notify;
pub mod position;
pub mod sensor;
pub mod smoothing;
pub mod storage;
pub mod units;

// Re-export commonly used types
pub use compass::{Direction, cardinal, normalize, relative_heading};
pub use error::{Error, Result, SensorError};
pub use fix::{Fix, SavedLocation};
pub use gps_tracker::{GpsTracker, TrackingState};
pub use guidance::{ArrowMode, Guidance, guide};
pub use position::{Coordinate, bearing, distance};
pub use units::{DisplayDistance, DistanceUnit, format_distance};

#[cfg(test)]
pub(crate) mod mocks;
