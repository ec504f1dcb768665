//! Scalar game-rule formulas shared by stacking and the object builders.

/// Base object radius in osu! pixels at circle size 0, doubled.
const OBJECT_DIAMETER: f64 = 128.0;

/// The legacy client rounds its gamefield scaling through a slightly-off
/// constant. Stack offsets depend on it, so it is reproduced verbatim.
pub const BROKEN_GAMEFIELD_ROUNDING_ALLOWANCE: f64 = 1.00041;

/// Time in milliseconds an object is visible before its hit time.
#[must_use]
pub fn approach_time(approach_rate: f32) -> f64 {
    let ar = f64::from(approach_rate);
    if ar < 5.0 {
        1200.0 + 600.0 * (5.0 - ar) / 5.0
    } else {
        1200.0 - 750.0 * (ar - 5.0) / 5.0
    }
}

/// Raw (unscaled) circle diameter in osu! pixels for a circle size value.
#[must_use]
pub fn raw_circle_diameter(circle_size: f32) -> f64 {
    let cs = f64::from(circle_size);
    (OBJECT_DIAMETER / 2.0) * (1.0 - 0.7 * (cs - 5.0) / 5.0)
}

/// Per-stack-level positional nudge in osu! pixels, applied on both axes.
#[must_use]
pub fn stack_offset(circle_size: f32) -> f64 {
    raw_circle_diameter(circle_size) / 128.0 / BROKEN_GAMEFIELD_ROUNDING_ALLOWANCE * 6.4
}
