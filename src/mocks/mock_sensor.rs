// This file is only compiled during tests

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use crate::error::SensorError;
use crate::fix::Fix;
use crate::sensor::{FixOptions, FixStream, LocationSensor};

type Reading = Result<Fix, SensorError>;

/// Scripted location sensor.
///
/// One-shot reads pop from the script and hang forever once it runs out.
/// The stream side is driven by `push` from the test.
#[derive(Default)]
pub struct MockSensor {
    readings: Mutex<VecDeque<Reading>>,
    stream: Mutex<Option<mpsc::UnboundedSender<Reading>>>,
    reads: AtomicUsize,
    watches: AtomicUsize,
}

impl MockSensor {
    pub fn with_readings(readings: Vec<Reading>) -> Self {
        Self {
            readings: Mutex::new(readings.into()),
            ..Default::default()
        }
    }

    /// Deliver a reading on the live stream. False when nobody listens.
    pub fn push(&self, reading: Reading) -> bool {
        match self.stream.lock().unwrap().as_ref() {
            Some(tx) => tx.send(reading).is_ok(),
            None => false,
        }
    }

    /// Close the stream from the sensor side.
    pub fn end_stream(&self) {
        self.stream.lock().unwrap().take();
    }

    pub fn is_subscribed(&self) -> bool {
        self.stream
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }
}

impl LocationSensor for MockSensor {
    fn read(&self, _options: FixOptions) -> impl Future<Output = Reading> + Send {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let next = self.readings.lock().unwrap().pop_front();
        async move {
            match next {
                Some(reading) => reading,
                None => std::future::pending().await,
            }
        }
    }

    fn watch(&self, _options: FixOptions) -> FixStream {
        self.watches.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream.lock().unwrap() = Some(tx);
        rx
    }
}
