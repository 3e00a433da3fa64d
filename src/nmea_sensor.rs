//! Location sensor backed by an NMEA 0183 GPS receiver on a serial line.

use std::fs::File;
use std::future::Future;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use nmea::sentences::FixType;
use nmea::{Nmea, SentenceType};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::GPS_DEFAULT_ACCURACY_M;
use crate::error::SensorError;
use crate::fix::{Fix, now_millis};
use crate::position::Coordinate;
use crate::sensor::{FixOptions, FixStream, LocationSensor};

type Reading = Result<Fix, SensorError>;

/// Fixes kept for subscribers that fall behind.
const FEED_CAPACITY: usize = 64;

/// Accumulates NMEA sentences and yields a fix for every valid GGA.
pub struct FixParser {
    nmea: Nmea,
    uere: f64,
}

impl FixParser {
    /// `uere` is the per-unit-of-HDOP error in meters.
    pub fn new(uere: f64) -> Self {
        Self {
            nmea: Nmea::default(),
            uere,
        }
    }

    pub fn parse_line(&mut self, line: &str) -> Option<Fix> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        match self.nmea.parse(trimmed) {
            Ok(SentenceType::GGA) => self.current_fix(),
            Ok(_) => None,
            Err(e) => {
                trace!("Parse error on line '{}': {}", trimmed, e);
                None
            }
        }
    }

    fn current_fix(&self) -> Option<Fix> {
        if matches!(self.nmea.fix_type, None | Some(FixType::Invalid)) {
            return None;
        }

        let (latitude, longitude) = (self.nmea.latitude?, self.nmea.longitude?);
        let accuracy = self
            .nmea
            .hdop
            .map(|hdop| f64::from(hdop) * self.uere)
            .unwrap_or(GPS_DEFAULT_ACCURACY_M);

        Some(Fix::new(
            Coordinate::new(latitude, longitude),
            accuracy,
            now_millis(),
        ))
    }
}

/// Reads NMEA lines on a background thread and fans fixes out to readers.
///
/// Watchers only see fixes produced after they subscribe. A one-shot read
/// returns the last fix only when it is younger than `maximum_age`,
/// otherwise it waits for the next one.
pub struct NmeaSensor {
    feed: Weak<broadcast::Sender<Reading>>,
    last: Arc<Mutex<Option<Fix>>>,
}

impl NmeaSensor {
    /// Open a serial device such as `/dev/serial0`.
    pub fn open(path: &Path, uere: f64) -> Result<Self, SensorError> {
        info!("Opening {}...", path.display());
        let file = File::open(path).map_err(|e| {
            warn!("Can not open {}: {}", path.display(), e);
            SensorError::from(e)
        })?;
        Ok(Self::from_reader(BufReader::new(file), uere))
    }

    pub fn from_reader<R>(reader: R, uere: f64) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self::from_lines(reader.lines(), uere)
    }

    pub fn from_lines<I>(lines: I, uere: f64) -> Self
    where
        I: Iterator<Item = io::Result<String>> + Send + 'static,
    {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        let feed = Arc::new(tx);
        let weak = Arc::downgrade(&feed);
        let last = Arc::new(Mutex::new(None));

        let cache = Arc::clone(&last);
        thread::spawn(move || run_feed(lines, uere, feed, cache));

        Self { feed: weak, last }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<Reading>> {
        self.feed.upgrade().map(|feed| feed.subscribe())
    }

    /// Last fix if it is at most `maximum_age` old. `ZERO` never hits.
    fn cached(&self, maximum_age: Duration) -> Option<Fix> {
        if maximum_age.is_zero() {
            return None;
        }
        let last = (*self.last.lock().ok()?)?;
        let age = now_millis().saturating_sub(last.timestamp);
        (u128::from(age) <= maximum_age.as_millis()).then_some(last)
    }
}

fn run_feed<I>(
    lines: I,
    uere: f64,
    feed: Arc<broadcast::Sender<Reading>>,
    cache: Arc<Mutex<Option<Fix>>>,
) where
    I: Iterator<Item = io::Result<String>>,
{
    let mut parser = FixParser::new(uere);

    for line in lines {
        match line {
            Ok(content) => {
                if let Some(fix) = parser.parse_line(&content) {
                    trace!("GPS fix {}", fix);
                    if let Ok(mut last) = cache.lock() {
                        *last = Some(fix);
                    }
                    // nobody listening is fine
                    let _ = feed.send(Ok(fix));
                }
            }
            // line noise, keep going
            Err(e) if matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::Interrupted) => {
                trace!("Skipping unreadable line: {}", e);
            }
            Err(e) => {
                warn!("Error reading GPS line: {}", e);
                let _ = feed.send(Err(SensorError::from(e)));
                break;
            }
        }
    }
    debug!("GPS feed ended");
}

async fn next_reading(rx: &mut broadcast::Receiver<Reading>) -> Reading {
    loop {
        match rx.recv().await {
            Ok(reading) => return reading,
            Err(RecvError::Lagged(skipped)) => trace!(skipped, "GPS reader fell behind"),
            Err(RecvError::Closed) => return Err(SensorError::Unavailable),
        }
    }
}

impl LocationSensor for NmeaSensor {
    fn read(&self, options: FixOptions) -> impl Future<Output = Reading> + Send {
        let cached = self.cached(options.maximum_age);
        // subscribe now so the fix has to come after the request
        let rx = self.subscribe();
        let wait = options.timeout;

        async move {
            if let Some(fix) = cached {
                trace!("using cached fix {}", fix);
                return Ok(fix);
            }
            let mut rx = rx.ok_or(SensorError::Unavailable)?;
            timeout(wait, next_reading(&mut rx))
                .await
                .unwrap_or(Err(SensorError::Timeout))
        }
    }

    fn watch(&self, _options: FixOptions) -> FixStream {
        let (tx, rx) = mpsc::unbounded_channel();

        let Some(mut sub) = self.subscribe() else {
            let _ = tx.send(Err(SensorError::Unavailable));
            return rx;
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = sub.recv() => match received {
                        Ok(reading) => {
                            if tx.send(reading).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => trace!(skipped, "GPS watcher fell behind"),
                        Err(RecvError::Closed) => {
                            let _ = tx.send(Err(SensorError::Unavailable));
                            break;
                        }
                    },
                }
            }
            debug!("GPS watch finished");
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    const GGA: &str = "$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76";
    const GGA_NO_FIX: &str = "$GPGGA,092751.000,,,,,0,00,99.99,,M,,M,,*5E";
    const GGA_HDOP_2: &str = "$GPGGA,092752.000,5321.6902,N,00630.3372,W,1,9,2.00,61.7,M,55.2,M,,*74";
    const GGA_NO_HDOP: &str = "$GPGGA,092753.000,5321.6802,N,00630.3372,W,1,5,,61.7,M,55.2,M,,*64";
    const RMC: &str = "$GPRMC,092750.000,A,5321.6802,N,00630.3372,W,0.02,31.66,280511,,,A*43";

    const UERE: f64 = 5.0;

    fn options() -> FixOptions {
        FixOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn channel_sensor() -> (std_mpsc::Sender<io::Result<String>>, NmeaSensor) {
        let (tx, rx) = std_mpsc::channel();
        (tx, NmeaSensor::from_lines(rx.into_iter(), UERE))
    }

    #[test]
    fn test_parser_emits_on_gga() {
        let mut parser = FixParser::new(UERE);

        assert!(parser.parse_line("").is_none());
        assert!(parser.parse_line(RMC).is_none());

        let fix = parser.parse_line(GGA).expect("GGA with a fix");
        assert!((fix.coordinate.latitude - 53.361336).abs() < 1e-6);
        assert!((fix.coordinate.longitude + 6.505620).abs() < 1e-6);
        assert!((fix.accuracy - 1.03 * UERE).abs() < 1e-3);
    }

    #[test]
    fn test_parser_skips_invalid_and_garbage() {
        let mut parser = FixParser::new(UERE);

        assert!(parser.parse_line(GGA_NO_FIX).is_none());
        assert!(parser.parse_line("$GPGGA,garbage*00").is_none());
        assert!(parser.parse_line("not nmea at all").is_none());
    }

    #[test]
    fn test_parser_default_accuracy_without_hdop() {
        let mut parser = FixParser::new(UERE);
        let fix = parser.parse_line(GGA_NO_HDOP).unwrap();
        assert_eq!(fix.accuracy, GPS_DEFAULT_ACCURACY_M);
    }

    #[test]
    fn test_open_missing_device() {
        let result = NmeaSensor::open(Path::new("/nonexistent/serial0"), UERE);
        assert!(matches!(result, Err(SensorError::Unavailable)));
    }

    #[tokio::test]
    async fn test_read_returns_next_fix() {
        let (lines, sensor) = channel_sensor();

        let pending = sensor.read(options());
        lines.send(Ok(RMC.to_string())).unwrap();
        lines.send(Ok(GGA_HDOP_2.to_string())).unwrap();

        let fix = pending.await.unwrap();
        assert!((fix.accuracy - 10.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_without_fix() {
        let (lines, sensor) = channel_sensor();

        let pending = sensor.read(options());
        lines.send(Ok(GGA_NO_FIX.to_string())).unwrap();

        assert_eq!(pending.await, Err(SensorError::Timeout));
    }

    #[tokio::test]
    async fn test_read_after_feed_closed() {
        let (lines, sensor) = channel_sensor();
        drop(lines);

        assert_eq!(sensor.read(options()).await, Err(SensorError::Unavailable));
    }

    #[tokio::test]
    async fn test_read_accepts_recent_cached_fix() {
        let (lines, sensor) = channel_sensor();
        let mut stream = sensor.watch(options());
        lines.send(Ok(GGA_HDOP_2.to_string())).unwrap();
        stream.recv().await.unwrap().unwrap();

        let relaxed = FixOptions {
            maximum_age: Duration::from_secs(60),
            ..options()
        };
        let fix = sensor.read(relaxed).await.unwrap();
        assert!((fix.accuracy - 10.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_ignores_cache_when_fresh_fix_required() {
        let (lines, sensor) = channel_sensor();
        let mut stream = sensor.watch(options());
        lines.send(Ok(GGA_HDOP_2.to_string())).unwrap();
        stream.recv().await.unwrap().unwrap();

        assert_eq!(sensor.read(options()).await, Err(SensorError::Timeout));
    }

    #[tokio::test]
    async fn test_watch_streams_fixes_then_errors() {
        let (lines, sensor) = channel_sensor();
        let mut stream = sensor.watch(options());

        lines.send(Ok(GGA.to_string())).unwrap();
        lines.send(Ok(GGA_NO_FIX.to_string())).unwrap();
        lines.send(Ok(GGA_HDOP_2.to_string())).unwrap();
        lines.send(Err(io::Error::other("unplugged"))).unwrap();

        let first = stream.recv().await.unwrap().unwrap();
        assert!((first.accuracy - 1.03 * UERE).abs() < 1e-3);

        let second = stream.recv().await.unwrap().unwrap();
        assert!((second.accuracy - 10.0).abs() < 1e-6);

        assert_eq!(stream.recv().await, Some(Err(SensorError::Unknown)));
        assert_eq!(stream.recv().await, Some(Err(SensorError::Unavailable)));
        assert_eq!(stream.recv().await, None);
    }
}
