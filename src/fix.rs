use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::position::Coordinate;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// One raw reading from the location sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    /// 1-sigma radius in meters, lower is better.
    pub accuracy: f64,
    /// Capture time, ms since epoch.
    pub timestamp: u64,
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ±{:.1}m", self.coordinate, self.accuracy)
    }
}

impl Fix {
    pub fn new(coordinate: Coordinate, accuracy: f64, timestamp: u64) -> Self {
        Self {
            coordinate,
            accuracy,
            timestamp,
        }
    }
}

/// Where the car was left. This is the only record that gets persisted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl SavedLocation {
    /// Stamp a fix with the current time.
    pub fn from_fix(fix: &Fix) -> Self {
        Self {
            latitude: fix.coordinate.latitude,
            longitude: fix.coordinate.longitude,
            timestamp: now_millis(),
            accuracy: Some(fix.accuracy),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl fmt::Display for SavedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coordinate())?;
        if let Some(accuracy) = self.accuracy {
            write!(f, " ±{:.1}m", accuracy)?;
        }
        Ok(())
    }
}
