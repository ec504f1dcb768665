//! Slider timing: span durations, tick layout and flattened scoring times.
//!
//! Everything here runs off the nominal pixel length and the resolved tempo;
//! the flattened curve geometry is only needed later, for positions.

use crate::file::beatmap::{
    BeatmapError, PrimitiveContainer, ScoringTimeKind, SliderScoringTime, Timestamp,
};
use crate::limits::ParseLimits;
use crate::CancelToken;

use super::{timing_info_at, TimingInfo};

/// Fills in `duration`, `span_duration`, `tick_percents` and `scoring_times`
/// of every slider in the container.
///
/// The scoring-time expansion is guarded by `limits.max_scoring_times` before
/// it allocates anything, so an adversarial repeat/tick combination fails
/// fast instead of expanding. The cancellation signal is polled per slider.
///
/// # Errors
///
/// Returns [`BeatmapError::LoadInterrupted`] on cancellation and
/// [`BeatmapError::TooManyHitObjects`] when a slider would exceed the
/// scoring-time ceiling.
pub fn process_sliders(
    container: &mut PrimitiveContainer,
    limits: &ParseLimits,
    cancel: &CancelToken,
) -> Result<(), BeatmapError> {
    let slider_multiplier = f64::from(container.slider_multiplier).max(0.01);
    let tick_rate = f64::from(container.slider_tick_rate).max(0.01);
    let version = container.version;
    let timing_points = std::mem::take(&mut container.timing_points);

    let mut result = Ok(());
    for slider in &mut container.sliders {
        if cancel.is_cancelled() {
            result = Err(BeatmapError::LoadInterrupted);
            break;
        }

        let timing = timing_info_at(&timing_points, slider.time as Timestamp);

        // A beat length of b ms with velocity multiplier m moves the ball
        // 100 * SM px per (b * m) ms.
        let effective_beat_length = timing.beat_length * timing.velocity_multiplier;
        let span_duration =
            (effective_beat_length * slider.pixel_length / (100.0 * slider_multiplier)).max(1.0);

        slider.span_duration = span_duration;
        slider.duration = span_duration * f64::from(slider.repeat);
        slider.tick_percents =
            tick_percents(slider.pixel_length, &timing, slider_multiplier, tick_rate, version, limits);

        let spans = slider.repeat.max(1) as usize;
        if spans.saturating_mul(slider.tick_percents.len()) > limits.max_scoring_times {
            result = Err(BeatmapError::TooManyHitObjects);
            break;
        }

        slider.scoring_times = scoring_times(
            slider.time as Timestamp,
            span_duration,
            spans,
            &slider.tick_percents,
            limits.end_inside_check_offset,
        );
    }

    container.timing_points = timing_points;
    result
}

/// Tick positions of one span, as fractions of the pixel length.
///
/// Version 8 changed tick spacing to track the inherited velocity, so ticks
/// land on constant beat fractions; older files space them by raw distance.
fn tick_percents(
    pixel_length: f64,
    timing: &TimingInfo,
    slider_multiplier: f64,
    tick_rate: f64,
    version: u32,
    limits: &ParseLimits,
) -> Vec<f64> {
    if pixel_length <= 0.0 {
        return Vec::new();
    }

    let mut tick_distance = 100.0 * slider_multiplier / tick_rate;
    if version >= 8 {
        tick_distance /= timing.velocity_multiplier;
    }
    if !(tick_distance.is_finite() && tick_distance > 0.0) {
        return Vec::new();
    }

    let effective_beat_length = timing.beat_length * timing.velocity_multiplier;
    let velocity = if effective_beat_length > 0.0 {
        100.0 * slider_multiplier * 1000.0 / effective_beat_length
    } else {
        0.0
    };

    // A tick closer to the tail than 1% of the per-second travel is dropped;
    // it would be inside the end circle.
    let min_tail_distance = 0.01 * velocity;

    let count = (pixel_length / tick_distance).ceil() as i64 - 1;
    let count = count.clamp(0, limits.max_slider_ticks as i64) as usize;

    let mut percents = Vec::with_capacity(count);
    for i in 1..=count {
        let distance = i as f64 * tick_distance;
        if pixel_length - distance <= min_tail_distance {
            break;
        }
        percents.push(distance / pixel_length);
    }

    percents
}

/// Flattens ticks, repeats and the end event of all spans into one sorted
/// scoring-time list.
fn scoring_times(
    start: Timestamp,
    span_duration: f64,
    spans: usize,
    tick_percents: &[f64],
    end_inside_check_offset: f64,
) -> Vec<SliderScoringTime> {
    let mut times = Vec::with_capacity(spans * tick_percents.len() + spans);

    for span in 0..spans {
        let span_start = start + span_duration * span as f64;
        let reversed = span % 2 == 1;

        for &percent in tick_percents {
            let percent = if reversed { 1.0 - percent } else { percent };
            times.push(SliderScoringTime {
                kind: ScoringTimeKind::Tick,
                time: span_start + span_duration * percent,
            });
        }

        // Every span boundary except the final tail is a repeat hit.
        if span + 1 < spans {
            times.push(SliderScoringTime {
                kind: ScoringTimeKind::Repeat,
                time: span_start + span_duration,
            });
        }
    }

    let duration = span_duration * spans as f64;
    times.push(SliderScoringTime {
        kind: ScoringTimeKind::End,
        time: (start + duration / 2.0).max(start + duration - end_inside_check_offset),
    });

    times.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| a.kind.cmp(&b.kind))
    });

    times
}
