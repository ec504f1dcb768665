//! The parse pass: line classification, timing point parsing and primitive
//! hit object parsing.
//!
//! The classifier walks the raw buffer line by line and tags each line with
//! its section; the per-section parsers below turn tagged lines into the
//! primitive records of [`PrimitiveContainer`]. Error policy follows the
//! legacy client: TimingPoints and Colours lines drop silently, HitObjects
//! lines abort the remainder of the block only when a mandatory prefix field
//! is malformed.

use tracing::{debug, warn};

use super::{
    Break, ComboColor, EdgeSampleSet, HitCircle, HitObjectParseError, HitSample, HitSound,
    PrimitiveContainer, Section, Slider, SliderCurveType, Spinner, TimingPoint,
    TimingPointParseError,
};
use crate::file::beatmap::BeatmapError;
use crate::limits::ParseLimits;
use crate::point::Point;
use crate::source::BeatmapSource;
use crate::CancelToken;

const SECTION_HEADERS: &[(&str, Section)] = &[
    ("[General]", Section::General),
    ("[Editor]", Section::Editor),
    ("[Metadata]", Section::Metadata),
    ("[Difficulty]", Section::Difficulty),
    ("[Events]", Section::Events),
    ("[TimingPoints]", Section::TimingPoints),
    ("[Colours]", Section::Colours),
    ("[HitObjects]", Section::HitObjects),
];

/// Lazy, restartable sequence of `(section, line)` pairs over a text buffer.
///
/// Comment lines (`//` at line start only), blank lines and section header
/// lines are consumed here. `[Metadata]` lines are consumed but never
/// forwarded; a metadata-only pass owns those. Lines in an unrecognized
/// section are dropped silently.
pub(crate) struct ClassifiedLines<'a> {
    lines: std::str::Lines<'a>,
    section: Section,
    header_seen: bool,
}

pub(crate) fn classify(text: &str) -> ClassifiedLines<'_> {
    ClassifiedLines {
        lines: text.lines(),
        section: Section::Unknown,
        header_seen: false,
    }
}

impl<'a> Iterator for ClassifiedLines<'a> {
    type Item = (Section, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            let line = line.strip_suffix('\r').unwrap_or(line);

            // Comments only count at line start; a mid-line `//` is content.
            if line.starts_with("//") || line.trim().is_empty() {
                continue;
            }

            if !self.header_seen {
                self.header_seen = true;
                return Some((Section::Header, line));
            }

            if let Some(&(_, section)) = SECTION_HEADERS
                .iter()
                .find(|(header, _)| line.contains(header))
            {
                self.section = section;
                continue;
            }

            match self.section {
                Section::Unknown | Section::Metadata => continue,
                section => return Some((section, line)),
            }
        }
    }
}

/// Per-parse flags so recoverable failures log once per distinct site.
#[derive(Default)]
struct WarnOnce {
    timing_point: bool,
    colour: bool,
    control_point: bool,
    dropped_object: bool,
}

impl WarnOnce {
    fn warn(flag: &mut bool, site: &str, line: &str) {
        if !*flag {
            *flag = true;
            warn!("dropping malformed {site} line (further drops logged at debug): {line:?}");
        } else {
            debug!("dropping malformed {site} line: {line:?}");
        }
    }
}

/// Running combo bookkeeping while hit object lines are decoded.
#[derive(Default)]
struct ComboState {
    combo_number: i32,
    color_counter: i32,
    color_offset: i32,
    /// Set once the first non-spinner object has been seen; the color
    /// counter quirk hinges on it.
    first_real_seen: bool,
}

impl ComboState {
    fn new() -> Self {
        Self {
            combo_number: 1,
            ..Self::default()
        }
    }

    /// Applies the new-combo rules and returns
    /// `(combo_number, color_counter, color_offset)` for the object.
    fn next(&mut self, new_combo: bool, color_skip: i32, is_spinner: bool) -> (i32, i32, i32) {
        if new_combo {
            self.combo_number = 1;

            // Legacy quirk: spinners and the very first non-spinner object
            // never advance the color counter. The offset always advances.
            if !is_spinner && self.first_real_seen {
                self.color_counter += 1;
            }
            self.color_offset += color_skip;
        }

        let assigned = (self.combo_number, self.color_counter, self.color_offset);
        self.combo_number += 1;

        if !is_spinner {
            self.first_real_seen = true;
        }

        assigned
    }
}

/// Parses one TimingPoints line, attempting the three legacy shapes in order
/// of decreasing specificity. Output ordering is imposed later by the sorter.
pub(crate) fn parse_timing_point(line: &str) -> Result<TimingPoint, TimingPointParseError> {
    let values: Vec<&str> = line.split(',').map(str::trim).collect();

    if values.len() < 2 {
        return Err(TimingPointParseError::WrongValueCount(values.len()));
    }

    if values.len() >= 8 {
        if let Some(tp) = try_shape(&values, true) {
            return Ok(tp);
        }
    }
    if values.len() >= 7 {
        if let Some(tp) = try_shape(&values, false) {
            return Ok(tp);
        }
    }

    // Legacy two-value shape: everything else defaulted.
    let offset = parse_offset(values[0])?;
    let ms_per_beat: f64 = values[1].parse()?;

    Ok(TimingPoint {
        offset,
        ms_per_beat,
        sample_set: 0,
        sample_index: 0,
        volume: 100,
        uninherited: true,
        kiai: false,
    })
}

fn parse_offset(value: &str) -> Result<i64, TimingPointParseError> {
    let offset: f64 = value.parse()?;
    Ok(offset.round() as i64)
}

fn try_shape(values: &[&str], with_kiai: bool) -> Option<TimingPoint> {
    let offset = parse_offset(values[0]).ok()?;
    let ms_per_beat: f64 = values[1].parse().ok()?;
    let _meter: i32 = values[2].parse().ok()?;
    let sample_set: i32 = values[3].parse().ok()?;
    let sample_index: i32 = values[4].parse().ok()?;
    let volume: i32 = values[5].parse().ok()?;
    let uninherited = values[6].parse::<i32>().ok()? != 0;
    let kiai = if with_kiai {
        values[7].parse::<i32>().ok()? & 1 == 1
    } else {
        false
    };

    Some(TimingPoint {
        offset,
        ms_per_beat,
        sample_set,
        sample_index,
        volume: volume.clamp(0, 100),
        uninherited,
        kiai,
    })
}

/// Raw type bit-field of a hit object line.
mod type_bits {
    pub const CIRCLE: i32 = 1 << 0;
    pub const SLIDER: i32 = 1 << 1;
    pub const NEW_COMBO: i32 = 1 << 2;
    pub const SPINNER: i32 = 1 << 3;
    pub const COLOR_SKIP_MASK: i32 = 0b0111_0000;
    pub const HOLD: i32 = 1 << 7;
}

enum Primitive {
    Circle(HitCircle),
    Slider(Slider),
    Spinner(Spinner),
}

fn parse_hit_sample(token: &str) -> HitSample {
    let mut fields = token.split(':');
    let mut next = || fields.next().and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);

    HitSample {
        normal_set: next(),
        addition_set: next(),
        index: next(),
        volume: next(),
    }
}

fn parse_edge_hit_sounds(token: &str, spans: i32) -> Vec<HitSound> {
    if token.is_empty() {
        return vec![HitSound::NONE; spans.max(0) as usize + 1];
    }

    token
        .split('|')
        .map(|v| v.parse().unwrap_or(HitSound::NONE))
        .collect()
}

fn parse_edge_sample_sets(token: &str) -> Vec<EdgeSampleSet> {
    token
        .split('|')
        .map(|pair| {
            let (normal, addition) = pair.split_once(':').unwrap_or(("0", "0"));
            EdgeSampleSet {
                normal_set: normal.parse().unwrap_or(0),
                addition_set: addition.parse().unwrap_or(0),
            }
        })
        .collect()
}

/// Parses the `B|150:150|200:100` curve token. Control points that fail to
/// parse as finite numbers are skipped, never fatal; this is a compatibility
/// carve-out for malformed historical content.
fn parse_curve(token: &str, anchor: Point, warned: &mut WarnOnce) -> (SliderCurveType, Vec<Point>) {
    let mut tokens = token.split('|');

    let curve_type = match tokens.next().unwrap_or("") {
        "B" => SliderCurveType::Bezier,
        "C" => SliderCurveType::Catmull,
        "L" => SliderCurveType::Linear,
        "P" => SliderCurveType::PerfectCurve,
        other => {
            debug!("unknown curve type {other:?}, assuming bezier");
            SliderCurveType::Bezier
        }
    };

    let mut points = vec![anchor];
    for token in tokens {
        let parsed = token.split_once(':').and_then(|(x, y)| {
            let x: f64 = x.parse().ok()?;
            let y: f64 = y.parse().ok()?;
            (x.is_finite() && y.is_finite()).then(|| Point::new(x, y))
        });

        match parsed {
            Some(point) => points.push(point),
            None => WarnOnce::warn(&mut warned.control_point, "slider control point", token),
        }
    }

    // A degenerate one-point curve is padded to two identical points.
    if points.len() == 1 {
        points.push(anchor);
    }

    (curve_type, points)
}

/// Parses the slider pixel length, preserving the legacy exponent-notation
/// fallback: a length that fails to parse but carries an exponent marker is
/// treated as a saturating infinity of the written sign, not as an error.
fn parse_pixel_length(token: &str, bound: f64) -> Result<f64, HitObjectParseError> {
    match token.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.clamp(-bound, bound)),
        Ok(value) => Ok(if value.is_sign_negative() { -bound } else { bound }),
        Err(err) => {
            if token.contains(['e', 'E']) {
                let negative = token.trim_start().starts_with('-');
                Ok(if negative { -bound } else { bound })
            } else {
                Err(err.into())
            }
        }
    }
}

fn parse_hit_object(
    line: &str,
    limits: &ParseLimits,
    combo: &mut ComboState,
    warned: &mut WarnOnce,
) -> Result<Primitive, HitObjectParseError> {
    let args: Vec<&str> = line.split(',').collect();
    let [x, y, time, object_type, hit_sound, extras @ ..] = &args[..] else {
        return Err(HitObjectParseError::NotEnoughArguments(args.len()));
    };

    let x: f64 = x.trim().parse()?;
    let y: f64 = y.trim().parse()?;
    let time = parse_time(time)?;
    let object_type: i32 = object_type.trim().parse()?;
    let hit_sound = HitSound(hit_sound.trim().parse::<i32>()? as u8);

    if !x.is_finite() || !y.is_finite() {
        return Err(HitObjectParseError::NonFinitePosition);
    }
    if object_type & type_bits::HOLD != 0 {
        return Err(HitObjectParseError::HoldNote);
    }

    let pos = Point::new(x, y);
    let new_combo = object_type & type_bits::NEW_COMBO != 0;
    let color_skip = (object_type & type_bits::COLOR_SKIP_MASK) >> 4;
    let is_spinner = object_type & type_bits::SPINNER != 0;

    if object_type & type_bits::CIRCLE != 0 {
        let (combo_number, color_counter, color_offset) = combo.next(new_combo, color_skip, false);
        let hit_sample = extras.first().map(|t| parse_hit_sample(t)).unwrap_or_default();

        Ok(Primitive::Circle(HitCircle {
            pos,
            time,
            combo_number,
            color_counter,
            color_offset,
            new_combo,
            hit_sound,
            hit_sample,
        }))
    } else if object_type & type_bits::SLIDER != 0 {
        let [curve, repeat, length, leftover @ ..] = extras else {
            return Err(HitObjectParseError::IncompleteSlider);
        };

        let (curve_type, control_points) = parse_curve(curve, pos, warned);
        let repeat = repeat.trim().parse::<i32>()?.max(1);
        let pixel_length = parse_pixel_length(length, limits.pixel_length_bound)?;

        let mut edge_hit_sounds = Vec::new();
        let mut edge_sample_sets = Vec::new();
        let mut hit_sample = HitSample::default();

        // Trailing fields are optional; malformed ones fall back to defaults.
        if let [sounds, rest @ ..] = leftover {
            edge_hit_sounds = parse_edge_hit_sounds(sounds, repeat);
            if let [sets, rest @ ..] = rest {
                edge_sample_sets = parse_edge_sample_sets(sets);
                if let [sample, ..] = rest {
                    hit_sample = parse_hit_sample(sample);
                }
            }
        }

        let (combo_number, color_counter, color_offset) = combo.next(new_combo, color_skip, false);

        Ok(Primitive::Slider(Slider {
            pos,
            time,
            curve_type,
            control_points,
            repeat,
            pixel_length,
            combo_number,
            color_counter,
            color_offset,
            new_combo,
            hit_sound,
            edge_hit_sounds,
            edge_sample_sets,
            hit_sample,
            duration: 0.0,
            span_duration: 0.0,
            tick_percents: Vec::new(),
            scoring_times: Vec::new(),
        }))
    } else if is_spinner {
        let [end_time, leftover @ ..] = extras else {
            return Err(HitObjectParseError::IncompleteSpinner);
        };

        let end_time = parse_time(end_time)?;
        let hit_sample = leftover.first().map(|t| parse_hit_sample(t)).unwrap_or_default();
        let (combo_number, color_counter, color_offset) = combo.next(new_combo, color_skip, true);

        Ok(Primitive::Spinner(Spinner {
            pos,
            time,
            end_time,
            combo_number,
            color_counter,
            color_offset,
            new_combo,
            hit_sound,
            hit_sample,
        }))
    } else {
        Err(HitObjectParseError::UnknownType(object_type))
    }
}

/// Times are integral in practice, but the legacy scanner accepted anything
/// with an integral prefix, so a fractional time truncates instead of failing.
fn parse_time(token: &str) -> Result<i64, HitObjectParseError> {
    let time: f64 = token.trim().parse()?;
    Ok(time.trunc() as i64)
}

fn parse_break(line: &str) -> Option<Break> {
    let mut values = line.split(',').map(str::trim);
    let kind = values.next()?;

    if kind != "2" && kind != "Break" {
        return None;
    }

    let start_time: f64 = values.next()?.parse().ok()?;
    let end_time: f64 = values.next()?.parse().ok()?;

    Some(Break { start_time, end_time })
}

fn parse_combo_color(line: &str) -> Option<ComboColor> {
    let (field, value) = line.split_once(':')?;

    if !field.trim().starts_with("Combo") {
        return None;
    }

    let mut nums = value.split(',').map(str::trim);
    let r: u8 = nums.next()?.parse().ok()?;
    let g: u8 = nums.next()?.parse().ok()?;
    let b: u8 = nums.next()?.parse().ok()?;

    Some(ComboColor { r, g, b })
}

fn parse_format_version(line: &str) -> Option<u32> {
    // v128 files sometimes start with a ZERO WIDTH NO-BREAK SPACE.
    line.trim_start_matches('\u{feff}')
        .trim()
        .strip_prefix("osu file format v")?
        .trim()
        .parse()
        .ok()
}

/// Parses a whole file buffer into a [`PrimitiveContainer`].
///
/// Always returns a container; fatal conditions are recorded in its `error`
/// slot so the caller can hand one tagged result to the session collaborator.
/// The cancellation signal is polled at line granularity.
#[must_use]
pub fn parse_primitives(
    source: &BeatmapSource,
    limits: &ParseLimits,
    cancel: &CancelToken,
) -> PrimitiveContainer {
    let mut container = PrimitiveContainer {
        version: 14,
        stack_leniency: 0.7,
        slider_multiplier: 1.4,
        slider_tick_rate: 1.0,
        circle_size: 5.0,
        approach_rate: 5.0,
        overall_difficulty: 5.0,
        hp_drain_rate: 5.0,
        preview_time: -1.0,
        ..PrimitiveContainer::default()
    };

    if cancel.is_cancelled() {
        container.error = Some(BeatmapError::LoadInterrupted);
        return container;
    }
    if source.is_empty() {
        container.error = Some(BeatmapError::FileLoad);
        return container;
    }

    let text = String::from_utf8_lossy(source.bytes());
    let mut warned = WarnOnce::default();
    let mut combo = ComboState::new();
    let mut approach_rate_seen = false;
    let mut hitobjects_aborted = false;

    for (section, line) in classify(&text) {
        if cancel.is_cancelled() {
            container.error = Some(BeatmapError::LoadInterrupted);
            return container;
        }

        match section {
            Section::Header => {
                if let Some(version) = parse_format_version(line) {
                    container.version = version;
                } else {
                    debug!("unrecognized header line {line:?}, keeping default version");
                }

                // Forward compatibility is explicitly rejected, not guessed.
                if container.version > limits.max_format_version {
                    container.error = Some(BeatmapError::Metadata);
                    return container;
                }
            }
            Section::General => {
                let Some((field, value)) = key_value(line) else { continue };

                match field {
                    "AudioFilename" => container.audio_filename = value.replace('\\', "/"),
                    "PreviewTime" => {
                        if let Ok(time) = value.parse() {
                            container.preview_time = time;
                        }
                    }
                    "StackLeniency" => {
                        if let Ok(leniency) = value.parse() {
                            container.stack_leniency = leniency;
                        }
                    }
                    "Mode" => {
                        // Only the standard ruleset belongs to this pipeline.
                        if value.parse::<i32>().map_or(false, |mode| mode != 0) {
                            container.error = Some(BeatmapError::Metadata);
                            return container;
                        }
                    }
                    _ => {}
                }
            }
            Section::Difficulty => {
                let Some((field, value)) = key_value(line) else { continue };
                let Ok(parsed) = value.parse::<f32>() else { continue };

                match field {
                    "SliderMultiplier" => container.slider_multiplier = parsed,
                    "SliderTickRate" => container.slider_tick_rate = parsed,
                    "CircleSize" => container.circle_size = parsed,
                    "OverallDifficulty" => container.overall_difficulty = parsed,
                    "HPDrainRate" => container.hp_drain_rate = parsed,
                    "ApproachRate" => {
                        container.approach_rate = parsed;
                        approach_rate_seen = true;
                    }
                    _ => {}
                }
            }
            Section::Events => {
                if let Some(brk) = parse_break(line) {
                    container.breaks.push(brk);
                }
            }
            Section::TimingPoints => match parse_timing_point(line) {
                Ok(tp) => container.timing_points.push(tp),
                Err(_) => WarnOnce::warn(&mut warned.timing_point, "timing point", line),
            },
            Section::Colours => match parse_combo_color(line) {
                Some(color) => container.combo_colors.push(color),
                None => WarnOnce::warn(&mut warned.colour, "colour", line),
            },
            Section::HitObjects => {
                if hitobjects_aborted {
                    continue;
                }

                match parse_hit_object(line, limits, &mut combo, &mut warned) {
                    Ok(Primitive::Circle(circle)) => container.circles.push(circle),
                    Ok(Primitive::Slider(slider)) => {
                        if slider.repeat > limits.max_slider_repeats {
                            container.error = Some(BeatmapError::TooManyHitObjects);
                            return container;
                        }
                        container.sliders.push(slider);
                    }
                    Ok(Primitive::Spinner(spinner)) => container.spinners.push(spinner),
                    Err(err) if err.is_mandatory() => {
                        // Historical strict-prefix parsing: a malformed
                        // mandatory field stops the whole block, keeping
                        // whatever parsed before it.
                        warn!("malformed hit object line, aborting block: {err} ({line:?})");
                        hitobjects_aborted = true;
                    }
                    Err(_) => WarnOnce::warn(&mut warned.dropped_object, "hit object", line),
                }
            }
            Section::Editor | Section::Metadata | Section::Unknown => {}
        }
    }

    // Legacy files without an ApproachRate fall back to OverallDifficulty.
    if !approach_rate_seen {
        container.approach_rate = container.overall_difficulty;
    }

    if container.num_objects() > limits.max_hitobjects {
        container.error = Some(BeatmapError::TooManyHitObjects);
        return container;
    }

    if !container.timing_points.iter().any(|tp| tp.uninherited) {
        container.error = Some(BeatmapError::NoTimingPoints);
        return container;
    }

    crate::algos::sort_timing_points(&mut container.timing_points);

    container
}

fn key_value(line: &str) -> Option<(&str, &str)> {
    let (field, value) = line.split_once(':')?;
    Some((field.trim(), value.trim()))
}
