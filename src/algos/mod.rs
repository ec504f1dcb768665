//! Derived-data algorithms: timing resolution, curve flattening, slider
//! scoring times and stacking.

pub mod curve;
pub mod slider;
pub mod stacking;

use crate::file::beatmap::{Timestamp, TimingPoint};
use crate::TimestampedSlice;

/// Sorts timing points into pipeline order.
///
/// The sort is stable so that points the file listed in a deliberate order
/// keep it; the key orders by offset, uninherited points first within an
/// offset, then sample set, sample index and kiai flag.
pub fn sort_timing_points(timing_points: &mut [TimingPoint]) {
    timing_points.sort_by_key(|tp| {
        (
            tp.offset,
            !tp.uninherited,
            tp.sample_set,
            tp.sample_index,
            tp.kiai,
        )
    });
}

/// Resolved tempo state at one point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingInfo {
    /// Milliseconds per beat of the governing uninherited point.
    pub beat_length: f64,
    /// Slider velocity multiplier from the governing inherited point,
    /// `1.0` when none applies.
    pub velocity_multiplier: f64,
}

/// Resolves the governing tempo and velocity at `time`.
///
/// The governing uninherited point is the last one at or before `time`, or
/// the first uninherited point in the map when `time` precedes them all. The
/// velocity multiplier comes from the last inherited point with a negative
/// beat length that lies at or after the governing uninherited point and at
/// or before `time`.
///
/// Expects `timing_points` sorted by [`sort_timing_points`] with at least one
/// uninherited point; returns a bare 1000ms beat if the slice has none.
#[must_use]
pub fn timing_info_at(timing_points: &[TimingPoint], time: Timestamp) -> TimingInfo {
    let mut base_index = None;
    for (i, tp) in timing_points.iter().enumerate() {
        if !tp.uninherited {
            continue;
        }
        if tp.offset as Timestamp <= time || base_index.is_none() {
            base_index = Some(i);
        }
        if tp.offset as Timestamp > time {
            break;
        }
    }

    let Some(base_index) = base_index else {
        return TimingInfo {
            beat_length: 1000.0,
            velocity_multiplier: 1.0,
        };
    };

    let beat_length = timing_points[base_index].ms_per_beat;

    let mut velocity_multiplier = 1.0;
    let tail = &timing_points[base_index..];
    for tp in tail.between(..=time) {
        if !tp.uninherited && tp.ms_per_beat < 0.0 {
            velocity_multiplier = (-tp.ms_per_beat).clamp(10.0, 1000.0) / 100.0;
        }
    }

    TimingInfo {
        beat_length,
        velocity_multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(offset: i64, ms_per_beat: f64, uninherited: bool) -> TimingPoint {
        TimingPoint {
            offset,
            ms_per_beat,
            uninherited,
            volume: 100,
            ..TimingPoint::default()
        }
    }

    #[test]
    fn sort_orders_by_offset_then_uninherited_first() {
        let mut points = vec![
            tp(1000, -50.0, false),
            tp(1000, 500.0, true),
            tp(0, 500.0, true),
        ];
        sort_timing_points(&mut points);

        assert_eq!(points[0].offset, 0);
        assert_eq!(points[1].offset, 1000);
        assert!(points[1].uninherited);
        assert!(!points[2].uninherited);
    }

    #[test]
    fn uninherited_resolution_falls_back_to_first() {
        let points = vec![tp(1000, 500.0, true), tp(2000, 300.0, true)];

        // Before the first point, the first uninherited one governs anyway.
        assert_eq!(timing_info_at(&points, 0.0).beat_length, 500.0);
        assert_eq!(timing_info_at(&points, 1500.0).beat_length, 500.0);
        assert_eq!(timing_info_at(&points, 2000.0).beat_length, 300.0);
    }

    #[test]
    fn inherited_point_scales_velocity() {
        let mut points = vec![
            tp(0, 500.0, true),
            tp(1000, -50.0, false),
            tp(2000, -200.0, false),
            tp(3000, 400.0, true),
        ];
        sort_timing_points(&mut points);

        assert_eq!(timing_info_at(&points, 500.0).velocity_multiplier, 1.0);
        assert_eq!(timing_info_at(&points, 1000.0).velocity_multiplier, 0.5);
        assert_eq!(timing_info_at(&points, 2500.0).velocity_multiplier, 2.0);

        // A new uninherited point resets the multiplier.
        let info = timing_info_at(&points, 3500.0);
        assert_eq!(info.beat_length, 400.0);
        assert_eq!(info.velocity_multiplier, 1.0);
    }

    #[test]
    fn multiplier_clamps_to_sane_range() {
        let points = vec![tp(0, 500.0, true), tp(0, -1.0, false)];
        assert_eq!(timing_info_at(&points, 100.0).velocity_multiplier, 0.1);

        let points = vec![tp(0, 500.0, true), tp(0, -100_000.0, false)];
        assert_eq!(timing_info_at(&points, 100.0).velocity_multiplier, 10.0);
    }
}
