use std::io;

use thiserror::Error;

/// What the location sensor can report instead of a fix.
///
/// The `Display` text is meant to be shown to the user as-is.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("Location permission denied. Please enable location access.")]
    PermissionDenied,
    #[error("Location information is unavailable.")]
    Unavailable,
    #[error("Location request timed out. Please try again.")]
    Timeout,
    #[error("An unknown error occurred while getting your location.")]
    Unknown,
}

impl From<io::Error> for SensorError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => SensorError::PermissionDenied,
            io::ErrorKind::NotFound => SensorError::Unavailable,
            io::ErrorKind::TimedOut => SensorError::Timeout,
            _ => SensorError::Unknown,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error("All {attempts} location samples failed: {last}")]
    AllSamplesFailed { attempts: usize, last: SensorError },
    #[error("Can not store location: {0}")]
    StorageWrite(String),
    #[error("Stored location is unreadable: {0}")]
    StorageReadCorrupt(String),
    #[error("Bad configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(SensorError::from(denied), SensorError::PermissionDenied);

        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(SensorError::from(missing), SensorError::Unavailable);

        let other = io::Error::other("boom");
        assert_eq!(SensorError::from(other), SensorError::Unknown);
    }

    #[test]
    fn test_messages() {
        let e = Error::AllSamplesFailed {
            attempts: 3,
            last: SensorError::Timeout,
        };
        assert_eq!(
            e.to_string(),
            "All 3 location samples failed: Location request timed out. Please try again."
        );
        assert_eq!(
            Error::from(SensorError::Unavailable).to_string(),
            "Location information is unavailable."
        );
    }
}
