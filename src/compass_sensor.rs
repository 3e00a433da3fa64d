use std::thread;
use std::time::Duration;

use rppal::i2c::I2c;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::compass::normalize;
use crate::config::{COMPASS_POLL_MS, HEADING_OFFSET, Settings, X_OFFSET, Y_OFFSET};
use crate::sensor::HeadingSource;

const LIS3MDL_ADDR: u16 = 0x1C;
const LIS3MDL_ID: u8 = 0x3D;

// LIS3MDL Register addresses
const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const CTRL_REG2: u8 = 0x21;
const CTRL_REG3: u8 = 0x22;
const CTRL_REG4: u8 = 0x23;
const CTRL_REG5: u8 = 0x24;
const STATUS_REG: u8 = 0x27;
const OUT_X_L: u8 = 0x28;

#[derive(Debug, Error)]
pub enum CompassError {
    #[error("I2C: {0}")]
    I2c(#[from] rppal::i2c::Error),
    #[error("Wrong device ID: 0x{0:02X}, expected 0x3D")]
    WrongDevice(u8),
    #[error("Magnetometer hardware not responding (no data ready)")]
    NotResponding,
    #[error("Magnetometer data not ready")]
    NotReady,
}

/// Hard-iron offsets plus the final correction for this location.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub x_offset: f64,
    pub y_offset: f64,
    pub heading_offset: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            x_offset: X_OFFSET,
            y_offset: Y_OFFSET,
            heading_offset: HEADING_OFFSET,
        }
    }
}

impl From<&Settings> for Calibration {
    fn from(settings: &Settings) -> Self {
        Self {
            x_offset: settings.x_offset,
            y_offset: settings.y_offset,
            heading_offset: settings.heading_offset,
        }
    }
}

impl Calibration {
    /// Heading in degrees [0, 360) from raw X/Y magnetometer counts.
    pub fn heading(&self, x_raw: f64, y_raw: f64) -> f64 {
        // Apply hard iron calibration (center the readings)
        let x = x_raw - self.x_offset;
        let y = y_raw - self.y_offset;

        let raw_heading = y.atan2(x).to_degrees();

        normalize(raw_heading + self.heading_offset)
    }
}

/// Running min/max of raw readings while the board is turned a full circle.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationWindow {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub samples: usize,
}

impl Default for CalibrationWindow {
    fn default() -> Self {
        Self {
            x_min: f64::MAX,
            x_max: f64::MIN,
            y_min: f64::MAX,
            y_max: f64::MIN,
            samples: 0,
        }
    }
}

impl CalibrationWindow {
    pub fn update(&mut self, x: f64, y: f64) {
        self.x_min = self.x_min.min(x);
        self.x_max = self.x_max.max(x);
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
        self.samples += 1;
    }

    /// Center of the circle traced so far, `None` before the first sample.
    pub fn offsets(&self) -> Option<(f64, f64)> {
        (self.samples > 0).then(|| {
            (
                (self.x_min + self.x_max) / 2.0,
                (self.y_min + self.y_max) / 2.0,
            )
        })
    }
}

/// LIS3MDL magnetometer on the Pi's I2C bus.
pub struct CompassSensor {
    i2c: I2c,
    calibration: Calibration,
}

impl CompassSensor {
    pub fn new(calibration: Calibration) -> Result<Self, CompassError> {
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(LIS3MDL_ADDR)?;

        // Verify device ID (should be 0x3D for LIS3MDL)
        let who_am_i = i2c.smbus_read_byte(WHO_AM_I)?;
        if who_am_i != LIS3MDL_ID {
            return Err(CompassError::WrongDevice(who_am_i));
        }

        // CTRL_REG1: Temperature enabled, Ultra-high performance mode (X,Y), ODR = 80 Hz
        i2c.smbus_write_byte(CTRL_REG1, 0xFC)?;

        // CTRL_REG2: Full scale ±4 gauss
        i2c.smbus_write_byte(CTRL_REG2, 0x00)?;

        // CTRL_REG3: Continuous conversion mode
        i2c.smbus_write_byte(CTRL_REG3, 0x00)?;

        // CTRL_REG4: Ultra-high performance mode (Z-axis), little endian
        i2c.smbus_write_byte(CTRL_REG4, 0x0C)?;

        // CTRL_REG5: Block data update enabled
        i2c.smbus_write_byte(CTRL_REG5, 0x40)?;

        thread::sleep(Duration::from_millis(100));

        let status = i2c.smbus_read_byte(STATUS_REG)?;
        if status == 0 {
            return Err(CompassError::NotResponding);
        }

        info!("Compass (LIS3MDL) initialized");
        Ok(Self { i2c, calibration })
    }

    pub fn read_heading(&mut self) -> Result<f64, CompassError> {
        let (x, y) = self.read_raw_magnetometer()?;
        Ok(self.calibration.heading(x, y))
    }

    /// Read raw magnetometer X, Y values (for calibration)
    pub fn read_raw_magnetometer(&mut self) -> Result<(f64, f64), CompassError> {
        let status = self.i2c.smbus_read_byte(STATUS_REG)?;
        if status & 0x08 == 0 {
            return Err(CompassError::NotReady);
        }

        // X and Y, low byte first
        let mut data = [0u8; 4];
        for (i, item) in data.iter_mut().enumerate() {
            *item = self.i2c.smbus_read_byte(OUT_X_L + i as u8)?;
        }

        let x = i16::from_le_bytes([data[0], data[1]]) as f64;
        let y = i16::from_le_bytes([data[2], data[3]]) as f64;

        Ok((x, y))
    }
}

/// Heading source that polls a `CompassSensor` on its own thread.
///
/// The thread exits once this value and every receiver are dropped.
pub struct CompassHeading {
    rx: watch::Receiver<Option<f64>>,
}

impl CompassHeading {
    pub fn spawn(mut sensor: CompassSensor) -> Self {
        let (tx, rx) = watch::channel(None);
        let interval = Duration::from_millis(COMPASS_POLL_MS);

        thread::spawn(move || {
            while !tx.is_closed() {
                let heading = match sensor.read_heading() {
                    Ok(heading) => Some(heading),
                    // keep the last value while the chip catches up
                    Err(CompassError::NotReady) => *tx.borrow(),
                    Err(e) => {
                        trace!("compass read failed: {}", e);
                        None
                    }
                };
                tx.send_if_modified(|current| {
                    let changed = *current != heading;
                    *current = heading;
                    changed
                });
                thread::sleep(interval);
            }
            debug!("compass polling stopped");
        });

        Self { rx }
    }
}

impl HeadingSource for CompassHeading {
    fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.rx.clone()
    }
}
