//! Seams between the tracker and the hardware it reads.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::SensorError;
use crate::fix::Fix;

/// Continuous stream of readings. Dropping the receiver cancels the subscription.
pub type FixStream = mpsc::UnboundedReceiver<Result<Fix, SensorError>>;

/// How a reading should be taken.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixOptions {
    pub timeout: Duration,
    /// Oldest cached fix that may be returned, `ZERO` means a fresh one only.
    pub maximum_age: Duration,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::SAMPLE_TIMEOUT_SECS),
            maximum_age: Duration::ZERO,
        }
    }
}

pub trait LocationSensor {
    /// Take a single reading.
    fn read(&self, options: FixOptions) -> impl Future<Output = Result<Fix, SensorError>> + Send;

    /// Subscribe to every reading until the returned stream is dropped.
    /// Errors are delivered in-band and do not end the stream.
    fn watch(&self, options: FixOptions) -> FixStream;
}

impl<T: LocationSensor> LocationSensor for Arc<T> {
    fn read(&self, options: FixOptions) -> impl Future<Output = Result<Fix, SensorError>> + Send {
        (**self).read(options)
    }

    fn watch(&self, options: FixOptions) -> FixStream {
        (**self).watch(options)
    }
}

/// Anything that knows which way the device is facing.
pub trait HeadingSource {
    /// Latest heading in degrees [0, 360), `None` while unknown.
    fn subscribe(&self) -> watch::Receiver<Option<f64>>;
}

/// Heading source for devices without a compass; the arrow shows absolute bearing.
#[derive(Debug)]
pub struct NoHeading {
    tx: watch::Sender<Option<f64>>,
}

impl NoHeading {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }
}

impl Default for NoHeading {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadingSource for NoHeading {
    fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_heading_is_none() {
        let source = NoHeading::default();
        assert_eq!(*source.subscribe().borrow(), None);
    }
}
