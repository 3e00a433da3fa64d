//! Angle arithmetic and 8-point compass labels (N, NE, E, etc.).

/// Represents an 8-point compass rose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    N,  // north
    NE, // northeast
    E,  // east
    SE, // southeast
    S,  // south
    SW, // southwest
    W,  // west
    NW, // northwest
}

/// Ordered clockwise from north, indexed by `round(bearing / 45) mod 8`.
const ROSE: [Direction; 8] = [
    Direction::N,
    Direction::NE,
    Direction::E,
    Direction::SE,
    Direction::S,
    Direction::SW,
    Direction::W,
    Direction::NW,
];

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl Direction {
    pub fn name(&self) -> &str {
        match self {
            Direction::N => "north",
            Direction::NE => "northeast",
            Direction::E => "east",
            Direction::SE => "southeast",
            Direction::S => "south",
            Direction::SW => "southwest",
            Direction::W => "west",
            Direction::NW => "northwest",
        }
    }

    pub fn abbreviation(&self) -> &str {
        match self {
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::E => "E",
            Direction::SE => "SE",
            Direction::S => "S",
            Direction::SW => "SW",
            Direction::W => "W",
            Direction::NW => "NW",
        }
    }
}

/// Bring any angle into [0, 360). NaN stays NaN.
pub fn normalize(angle: f64) -> f64 {
    let mut wrapped = angle % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    // tiny negatives round up to exactly 360.0 above
    if wrapped >= 360.0 {
        wrapped = 0.0;
    }
    // turns -0.0 into 0.0
    wrapped + 0.0
}

/// Arrow rotation for a target `bearing` seen from a device facing `device_heading`.
pub fn relative_heading(bearing: f64, device_heading: f64) -> f64 {
    normalize(bearing - device_heading)
}

/// Converts the bearing to an 8-point compass direction.
///
/// Each sector spans 45° and is centered on its label, so boundaries fall on
/// odd multiples of 22.5°.
pub fn cardinal(bearing: f64) -> Direction {
    let sector = (normalize(bearing) / 45.0).round() as usize;
    ROSE[sector % ROSE.len()]
}
