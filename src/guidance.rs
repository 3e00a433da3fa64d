//! Everything the arrow and the readout need for one position update.

use std::fmt;

use crate::compass::{Direction, cardinal, relative_heading};
use crate::fix::Fix;
use crate::position::Coordinate;
use crate::units::{DisplayDistance, format_distance};

/// How the arrow is oriented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArrowMode {
    /// Arrow relative to where the device is facing.
    #[default]
    Compass,
    /// North-up: the arrow shows the absolute bearing.
    Simple,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Guidance {
    /// Meters to the destination.
    pub distance: f64,
    /// Absolute bearing to the destination, degrees [0, 360).
    pub bearing: f64,
    /// Arrow rotation, degrees [0, 360).
    pub rotation: f64,
    pub direction: Direction,
    pub display: DisplayDistance,
    /// Accuracy of the position the readout is based on.
    pub accuracy: f64,
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({:.0}°), arrow {:.0}°, ±{:.0}m",
            self.display, self.direction, self.bearing, self.rotation, self.accuracy
        )
    }
}

/// Combine the current fix, the destination and the device heading.
///
/// A `None` heading is treated as 0, which shows the absolute bearing.
pub fn guide(
    current: &Fix,
    destination: &Coordinate,
    heading: Option<f64>,
    mode: ArrowMode,
) -> Guidance {
    let distance = current.coordinate.distance_to(destination);
    let bearing = current.coordinate.bearing_to(destination);

    let device_heading = match mode {
        ArrowMode::Compass => heading.unwrap_or(0.0),
        ArrowMode::Simple => 0.0,
    };

    Guidance {
        distance,
        bearing,
        rotation: relative_heading(bearing, device_heading),
        direction: cardinal(bearing),
        display: format_distance(distance),
        accuracy: current.accuracy,
    }
}
