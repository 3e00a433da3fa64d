//! Distance display: whole feet up close, meters rounded to 10 further out.

use std::fmt;

pub const FEET_PER_METER: f64 = 3.28084;

/// Below this many feet the readout stays in feet.
pub const FEET_DISPLAY_LIMIT: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceUnit {
    Feet,
    Meters,
}

impl DistanceUnit {
    pub fn abbreviation(&self) -> &str {
        match self {
            DistanceUnit::Feet => "ft",
            DistanceUnit::Meters => "m",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayDistance {
    pub value: String,
    pub unit: DistanceUnit,
}

impl fmt::Display for DisplayDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

pub fn format_distance(meters: f64) -> DisplayDistance {
    let feet = meters * FEET_PER_METER;

    if feet < FEET_DISPLAY_LIMIT {
        DisplayDistance {
            value: format!("{:.0}", feet.round()),
            unit: DistanceUnit::Feet,
        }
    } else {
        DisplayDistance {
            value: format!("{:.0}", (meters / 10.0).round() * 10.0),
            unit: DistanceUnit::Meters,
        }
    }
}
