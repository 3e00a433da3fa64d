//! Confidence-weighted smoothing and movement gating for tracked fixes.

use std::collections::VecDeque;

use tracing::trace;

use crate::compass::normalize;
use crate::config::{MIN_WEIGHT_ACCURACY_M, MOVEMENT_THRESHOLD_FACTOR, POSITION_BUFFER_SIZE};
use crate::fix::Fix;
use crate::position::Coordinate;

/// Fixed-capacity FIFO of the most recent fixes.
#[derive(Debug)]
pub struct SmoothingBuffer {
    fixes: VecDeque<Fix>,
    capacity: usize,
}

impl SmoothingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            fixes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a fix, evicting the oldest once full.
    pub fn push(&mut self, fix: Fix) {
        if self.fixes.len() == self.capacity {
            self.fixes.pop_front();
        }
        self.fixes.push_back(fix);
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn clear(&mut self) {
        self.fixes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fix> {
        self.fixes.iter()
    }

    /// Mean of the buffered coordinates weighted by `1/accuracy`.
    ///
    /// Longitudes are averaged as offsets from the newest fix, so fixes on
    /// both sides of the antimeridian stay together. The result carries the
    /// best (smallest) buffered accuracy and the newest timestamp.
    pub fn smoothed(&self) -> Option<Fix> {
        let newest = self.fixes.back()?;
        let anchor = newest.coordinate.longitude;

        let weight = |fix: &Fix| 1.0 / fix.accuracy.max(MIN_WEIGHT_ACCURACY_M);
        let weight_sum: f64 = self.fixes.iter().map(weight).sum();

        let mut latitude = 0.0;
        let mut offset = 0.0;
        let mut best_accuracy = f64::INFINITY;

        // normalized weights, so a lone fix comes back unchanged
        for fix in &self.fixes {
            let share = weight(fix) / weight_sum;
            latitude += fix.coordinate.latitude * share;
            offset += longitude_offset(fix.coordinate.longitude, anchor) * share;
            best_accuracy = best_accuracy.min(fix.accuracy);
        }

        let mut longitude = anchor + offset;
        if longitude > 180.0 {
            longitude -= 360.0;
        } else if longitude < -180.0 {
            longitude += 360.0;
        }

        Some(Fix::new(
            Coordinate::new(latitude, longitude),
            best_accuracy,
            newest.timestamp,
        ))
    }
}

/// `longitude - anchor` folded into [-180, 180).
fn longitude_offset(longitude: f64, anchor: f64) -> f64 {
    normalize(longitude - anchor + 180.0) - 180.0
}

impl Default for SmoothingBuffer {
    fn default() -> Self {
        Self::new(POSITION_BUFFER_SIZE)
    }
}

/// Turns raw fixes into the position shown to the user.
///
/// Single writer: every fix goes through `&mut self`, so the buffer and the
/// reported fix never see overlapping updates.
#[derive(Debug)]
pub struct Smoother {
    buffer: SmoothingBuffer,
    threshold_factor: f64,
    reported: Option<Fix>,
}

impl Smoother {
    pub fn new(capacity: usize, threshold_factor: f64) -> Self {
        Self {
            buffer: SmoothingBuffer::new(capacity),
            threshold_factor,
            reported: None,
        }
    }

    /// Start from an already reported fix, e.g. when tracking restarts.
    pub fn with_reported(mut self, reported: Option<Fix>) -> Self {
        self.reported = reported;
        self
    }

    pub fn reported(&self) -> Option<Fix> {
        self.reported
    }

    pub fn buffer(&self) -> &SmoothingBuffer {
        &self.buffer
    }

    /// Feed one raw fix. Returns the new reported fix when it moved far enough.
    pub fn push(&mut self, fix: Fix) -> Option<Fix> {
        self.buffer.push(fix);
        let smoothed = self.buffer.smoothed()?;

        let moved = match self.reported {
            None => true,
            Some(last) => {
                let shift = last.coordinate.distance_to(&smoothed.coordinate);
                let threshold = fix.accuracy * self.threshold_factor;
                trace!(shift, threshold, "movement check");
                shift > threshold
            }
        };

        if moved {
            self.reported = Some(smoothed);
            Some(smoothed)
        } else {
            None
        }
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(POSITION_BUFFER_SIZE, MOVEMENT_THRESHOLD_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: Coordinate = Coordinate {
        latitude: 40.0,
        longitude: -75.0,
    };

    fn fix_at(coordinate: Coordinate, accuracy: f64, timestamp: u64) -> Fix {
        Fix::new(coordinate, accuracy, timestamp)
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buffer = SmoothingBuffer::default();
        for i in 0..7 {
            buffer.push(fix_at(ORIGIN, 10.0, i));
        }

        assert_eq!(buffer.len(), POSITION_BUFFER_SIZE);
        let stamps: Vec<u64> = buffer.iter().map(|f| f.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_empty_buffer_has_no_smoothed_fix() {
        let buffer = SmoothingBuffer::default();
        assert!(buffer.is_empty());
        assert!(buffer.smoothed().is_none());
    }

    #[test]
    fn test_weighted_mean_favours_precise_fixes() {
        let mut buffer = SmoothingBuffer::default();
        buffer.push(fix_at(Coordinate::new(40.0, -75.0), 1.0, 1));
        buffer.push(fix_at(Coordinate::new(41.0, -74.0), 3.0, 2));

        let smoothed = buffer.smoothed().unwrap();
        // weights 1 and 1/3
        assert!((smoothed.coordinate.latitude - 40.25).abs() < 1e-9);
        assert!((smoothed.coordinate.longitude + 74.75).abs() < 1e-9);
        assert_eq!(smoothed.accuracy, 1.0);
        assert_eq!(smoothed.timestamp, 2);
    }

    #[test]
    fn test_mean_across_antimeridian() {
        let east = Coordinate::new(-17.0, 179.99995);
        let west = Coordinate::new(-17.0, -179.99995);

        let mut buffer = SmoothingBuffer::default();
        buffer.push(fix_at(east, 5.0, 1));
        buffer.push(fix_at(west, 5.0, 2));

        let smoothed = buffer.smoothed().unwrap();
        assert!(smoothed.coordinate.is_valid(), "{}", smoothed.coordinate);
        assert!((smoothed.coordinate.longitude.abs() - 180.0).abs() < 1e-4);
        assert!(east.distance_to(&smoothed.coordinate) < 10.0);
        assert!(west.distance_to(&smoothed.coordinate) < 10.0);

        // the gate sees a few meters of jitter, not a jump around the globe
        let mut smoother = Smoother::default();
        let first = smoother.push(fix_at(east, 5.0, 1)).unwrap();
        smoother.push(fix_at(west, 5.0, 2));
        let reported = smoother.reported().unwrap();
        assert!(reported.coordinate.is_valid());
        assert!(first.coordinate.distance_to(&reported.coordinate) < 100.0);
    }

    #[test]
    fn test_zero_accuracy_does_not_divide_by_zero() {
        let mut buffer = SmoothingBuffer::default();
        buffer.push(fix_at(Coordinate::new(40.0, -75.0), 0.0, 1));
        buffer.push(fix_at(Coordinate::new(40.001, -75.0), 0.0, 2));

        let smoothed = buffer.smoothed().unwrap();
        assert!(smoothed.coordinate.latitude.is_finite());
        assert!((smoothed.coordinate.latitude - 40.0005).abs() < 1e-9);
        assert_eq!(smoothed.accuracy, 0.0);
    }

    #[test]
    fn test_first_fix_is_always_reported() {
        let mut smoother = Smoother::default();
        let first = fix_at(ORIGIN, 20.0, 1);

        assert_eq!(smoother.push(first), Some(first));
        assert_eq!(smoother.reported(), Some(first));
    }

    #[test]
    fn test_jitter_within_threshold_is_suppressed() {
        let mut smoother = Smoother::default();
        let first = fix_at(ORIGIN, 20.0, 1);
        smoother.push(first);

        // threshold is 20 * 0.5 = 10 m
        for (i, bearing) in [0.0, 90.0, 180.0, 270.0].into_iter().enumerate() {
            let wobble = fix_at(ORIGIN.project(bearing, 8.0), 20.0, 2 + i as u64);
            assert_eq!(smoother.push(wobble), None);
            assert_eq!(smoother.reported(), Some(first));
        }
    }

    #[test]
    fn test_movement_beyond_threshold_updates() {
        let mut smoother = Smoother::default();
        smoother.push(fix_at(ORIGIN, 20.0, 1));
        smoother.push(fix_at(ORIGIN.project(0.0, 5.0), 20.0, 2));

        let far = fix_at(ORIGIN.project(0.0, 200.0), 20.0, 3);
        let reported = smoother.push(far).expect("should move");

        // equal weights: (0 + 5 + 200) / 3 m north of the origin
        let shift = ORIGIN.distance_to(&reported.coordinate);
        assert!((shift - 205.0 / 3.0).abs() < 0.5, "shift was {shift}");
        assert_eq!(reported.timestamp, 3);
        assert_eq!(smoother.reported(), Some(reported));
    }

    #[test]
    fn test_gate_uses_last_reported_not_last_raw() {
        let mut smoother = Smoother::new(1, MOVEMENT_THRESHOLD_FACTOR);
        let first = fix_at(ORIGIN, 20.0, 1);
        smoother.push(first);

        // each step is under 10 m from the previous raw fix but creeps away
        // from the reported one until it crosses the threshold
        assert_eq!(smoother.push(fix_at(ORIGIN.project(0.0, 6.0), 20.0, 2)), None);
        let crossed = smoother.push(fix_at(ORIGIN.project(0.0, 12.0), 20.0, 3));
        assert!(crossed.is_some());
    }

    #[test]
    fn test_restart_keeps_reported() {
        let last = fix_at(ORIGIN, 10.0, 1);
        let mut smoother = Smoother::default().with_reported(Some(last));

        assert!(smoother.buffer().is_empty());
        assert_eq!(smoother.push(fix_at(ORIGIN.project(0.0, 2.0), 10.0, 2)), None);
        assert_eq!(smoother.reported(), Some(last));
    }
}
