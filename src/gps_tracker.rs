use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::Settings;
use crate::error::{Error, Result, SensorError};
use crate::fix::Fix;
use crate::sensor::{FixOptions, LocationSensor};
use crate::smoothing::Smoother;

/// What observers of a tracker see.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingState {
    pub tracking: bool,
    /// Last smoothed position that passed the movement gate.
    pub position: Option<Fix>,
    /// Latest sensor error, cleared by the next good fix.
    pub error: Option<SensorError>,
}

/// Owns a location sensor and turns it into either one good fix or a
/// smoothed stream of positions.
///
/// Tracking runs on a spawned tokio task, so `start_tracking` must be called
/// from within a runtime.
pub struct GpsTracker<S> {
    sensor: S,
    options: FixOptions,
    sample_delay: Duration,
    buffer_size: usize,
    threshold_factor: f64,
    state: Arc<watch::Sender<TrackingState>>,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl<S> GpsTracker<S> {
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TrackingState {
        self.state.borrow().clone()
    }

    /// Last position that passed the movement gate, kept across stop/start.
    pub fn reported(&self) -> Option<Fix> {
        self.state.borrow().position
    }

    pub fn is_tracking(&self) -> bool {
        self.state.borrow().tracking
    }

    /// Cancel the sensor subscription. Calling this while idle does nothing.
    pub fn stop_tracking(&mut self) {
        // no update is applied once this returns
        self.active.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
            debug!("tracking stopped");
        }

        self.state.send_if_modified(|s| {
            let was_tracking = s.tracking;
            s.tracking = false;
            was_tracking
        });
    }
}

impl<S: LocationSensor> GpsTracker<S> {
    pub fn new(sensor: S) -> Self {
        Self::with_settings(sensor, &Settings::default())
    }

    pub fn with_settings(sensor: S, settings: &Settings) -> Self {
        let (tx, _) = watch::channel(TrackingState::default());
        Self {
            sensor,
            options: settings.fix_options(),
            sample_delay: settings.sample_delay(),
            buffer_size: settings.buffer_size,
            threshold_factor: settings.movement_threshold_factor,
            state: Arc::new(tx),
            active: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Take `samples` readings one after the other and keep the most precise.
    ///
    /// Failed samples are skipped; only when every one of them fails is
    /// `Error::AllSamplesFailed` returned.
    pub async fn best_reading(&self, samples: usize) -> Result<Fix> {
        let samples = samples.max(1);
        let mut best: Option<Fix> = None;
        let mut last_error = SensorError::Unknown;

        for sample in 1..=samples {
            if sample > 1 {
                sleep(self.sample_delay).await;
            }

            let reading = timeout(self.options.timeout, self.sensor.read(self.options))
                .await
                .unwrap_or(Err(SensorError::Timeout));

            match reading {
                Ok(fix) => {
                    debug!(sample, accuracy = fix.accuracy, "got sample {}", fix);
                    if best.is_none_or(|b| fix.accuracy < b.accuracy) {
                        best = Some(fix);
                    }
                }
                Err(e) => {
                    warn!(sample, "location sample failed: {}", e);
                    last_error = e;
                }
            }
        }

        match best {
            Some(fix) => {
                info!("best of {} samples: {}", samples, fix);
                Ok(fix)
            }
            None => Err(Error::AllSamplesFailed {
                attempts: samples,
                last: last_error,
            }),
        }
    }

    /// Subscribe to the sensor and publish smoothed, movement-gated positions.
    ///
    /// Any previous subscription is cancelled first and the smoothing buffer
    /// starts empty. The last reported position is kept.
    pub fn start_tracking(&mut self) {
        self.stop_tracking();

        let mut stream = self.sensor.watch(self.options);
        let mut smoother =
            Smoother::new(self.buffer_size, self.threshold_factor).with_reported(self.reported());
        let state = Arc::clone(&self.state);
        let active = Arc::new(AtomicBool::new(true));
        self.active = Arc::clone(&active);

        state.send_modify(|s| {
            s.tracking = true;
            s.error = None;
        });
        debug!("tracking started");

        self.task = Some(tokio::spawn(async move {
            while let Some(reading) = stream.recv().await {
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                match reading {
                    Ok(fix) => {
                        trace!("raw fix {}", fix);
                        let moved = smoother.push(fix);
                        state.send_if_modified(|s| {
                            // stop_tracking clears the flag before taking this lock
                            if !active.load(Ordering::SeqCst) {
                                return false;
                            }
                            let changed = moved.is_some() || s.error.is_some();
                            s.error = None;
                            if let Some(position) = moved {
                                debug!("position now {}", position);
                                s.position = Some(position);
                            }
                            changed
                        });
                    }
                    Err(e) => {
                        warn!("location update failed: {}", e);
                        state.send_if_modified(|s| {
                            if !active.load(Ordering::SeqCst) {
                                return false;
                            }
                            s.error = Some(e);
                            true
                        });
                    }
                }
            }

            if active.swap(false, Ordering::SeqCst) {
                debug!("sensor stream ended");
                state.send_modify(|s| s.tracking = false);
            }
        }));
    }
}

impl<S> Drop for GpsTracker<S> {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}
