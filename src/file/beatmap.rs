//! Primitive data model of one parsed `.osu` file.
//!
//! Everything in here is a faithful record of what the file said, plus the
//! derived slider timing fields filled in by [`crate::algos::slider`]. The
//! container is produced once per parse and consumed, by move, by exactly one
//! of the two object builders.

use std::fmt;
use std::str::FromStr;

use crate::point::Point;
use crate::Timestamped;

pub mod errors;
pub mod parsing;

pub use errors::*;

pub type Timestamp = f64;

/// Section a classified line belongs to. The first non-comment, non-blank
/// line is always the header regardless of content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Header,
    General,
    Editor,
    Metadata,
    Difficulty,
    Events,
    TimingPoints,
    Colours,
    HitObjects,
    Unknown,
}

/// Timing and control points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingPoint {
    /// Start time in milliseconds, rounded to the nearest integer.
    pub offset: i64,
    /// Two meanings, selected by sign: positive is the duration of a beat in
    /// milliseconds (uninherited), negative is an inverse slider velocity
    /// multiplier as a percentage (inherited).
    pub ms_per_beat: f64,
    /// Default sample set for hit objects in this section.
    pub sample_set: i32,
    /// Custom sample index. `0` is the default hitsound set.
    pub sample_index: i32,
    /// Volume percentage, clamped to `[0, 100]`.
    pub volume: i32,
    /// Whether this point sets tempo (true) or only scales velocity (false).
    pub uninherited: bool,
    /// Kiai time flag.
    pub kiai: bool,
}

impl Timestamped for TimingPoint {
    fn timestamp(&self) -> Timestamp {
        self.offset as Timestamp
    }
}

/// A break range from the Events section. Total break time is a derived sum.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Break {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl Break {
    #[must_use]
    pub fn duration(&self) -> Timestamp {
        self.end_time - self.start_time
    }
}

/// One entry of the combo color table from the Colours section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComboColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Hitsound bit flags attached to an object or slider edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct HitSound(pub u8);

impl HitSound {
    pub const NONE: Self = Self(0b0000);
    pub const NORMAL: Self = Self(0b0001);
    pub const WHISTLE: Self = Self(0b0010);
    pub const FINISH: Self = Self(0b0100);
    pub const CLAP: Self = Self(0b1000);
}

impl fmt::Display for HitSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for HitSound {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(u8::from_str(s)?))
    }
}

/// Colon-separated hit sample sub-fields. Each is individually optional and
/// defaults to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HitSample {
    pub normal_set: i32,
    pub addition_set: i32,
    pub index: i32,
    pub volume: i32,
}

/// Sample sets played on one slider edge, in `normal:addition` form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeSampleSet {
    pub normal_set: i32,
    pub addition_set: i32,
}

/// Type of curve used to construct a slider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliderCurveType {
    Bezier,
    Catmull,
    Linear,
    PerfectCurve,
}

/// Tag of one scoring-relevant time event along a slider. The declaration
/// order is the tie-break ordinal for events at the same time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScoringTimeKind {
    Tick,
    Repeat,
    End,
}

/// One scoring-relevant time event of a slider, sorted by `(time, kind)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliderScoringTime {
    pub kind: ScoringTimeKind,
    pub time: Timestamp,
}

/// Hit circle primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct HitCircle {
    pub pos: Point,
    pub time: i64,
    /// Running combo number as displayed in game.
    pub combo_number: i32,
    /// Raw combo color counter at this object.
    pub color_counter: i32,
    /// Accumulated 3-bit color-skip offset at this object.
    pub color_offset: i32,
    pub new_combo: bool,
    pub hit_sound: HitSound,
    pub hit_sample: HitSample,
}

/// Slider primitive, including the derived timing fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Slider {
    pub pos: Point,
    pub time: i64,
    pub curve_type: SliderCurveType,
    /// Control points, always beginning with the object's own anchor. A
    /// degenerate one-point curve is padded to two identical points.
    pub control_points: Vec<Point>,
    /// Number of spans the player traverses (1 = no repeats).
    pub repeat: i32,
    /// Visual length in osu! pixels, saturated into the sanity bound.
    pub pixel_length: f64,
    pub combo_number: i32,
    pub color_counter: i32,
    pub color_offset: i32,
    pub new_combo: bool,
    pub hit_sound: HitSound,
    pub edge_hit_sounds: Vec<HitSound>,
    pub edge_sample_sets: Vec<EdgeSampleSet>,
    pub hit_sample: HitSample,

    /// Total duration in milliseconds over all spans. Derived.
    pub duration: Timestamp,
    /// Duration of one span, floored at 1 ms. Derived.
    pub span_duration: Timestamp,
    /// Tick positions as fractions of the pixel length, first span. Derived.
    pub tick_percents: Vec<f64>,
    /// Flattened, sorted scoring events over all spans. Derived.
    pub scoring_times: Vec<SliderScoringTime>,
}

impl Slider {
    #[must_use]
    pub fn end_time(&self) -> Timestamp {
        self.time as Timestamp + self.duration
    }
}

/// Spinner primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct Spinner {
    pub pos: Point,
    pub time: i64,
    pub end_time: i64,
    pub combo_number: i32,
    pub color_counter: i32,
    pub color_offset: i32,
    pub new_combo: bool,
    pub hit_sound: HitSound,
    pub hit_sample: HitSample,
}

/// Aggregate of all primitives for one file, plus derived counts and the
/// fatal error slot. Produced once per parse and consumed exactly once by
/// exactly one of the two object builders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimitiveContainer {
    /// `None` means the parse was usable.
    pub error: Option<BeatmapError>,
    pub version: u32,

    pub stack_leniency: f32,
    pub slider_multiplier: f32,
    pub slider_tick_rate: f32,
    pub circle_size: f32,
    pub approach_rate: f32,
    pub overall_difficulty: f32,
    pub hp_drain_rate: f32,
    pub audio_filename: String,
    /// Millisecond offset of the song preview, `-1` when the file never set one.
    pub preview_time: Timestamp,

    pub circles: Vec<HitCircle>,
    pub sliders: Vec<Slider>,
    pub spinners: Vec<Spinner>,
    pub breaks: Vec<Break>,
    pub timing_points: Vec<TimingPoint>,
    pub combo_colors: Vec<ComboColor>,
}

impl PrimitiveContainer {
    #[must_use]
    pub fn num_objects(&self) -> usize {
        self.num_circles() + self.num_sliders() + self.num_spinners()
    }

    #[must_use]
    pub fn num_circles(&self) -> usize {
        self.circles.len()
    }

    #[must_use]
    pub fn num_sliders(&self) -> usize {
        self.sliders.len()
    }

    #[must_use]
    pub fn num_spinners(&self) -> usize {
        self.spinners.len()
    }

    #[must_use]
    pub fn total_break_duration(&self) -> Timestamp {
        self.breaks.iter().map(Break::duration).sum()
    }
}
