//! Concrete gameplay objects for the live session.

use crate::algos::curve::SliderCurve;
use crate::algos::slider::process_sliders;
use crate::algos::stacking::{apply_stacking, StackEntry, StackKind};
use crate::file::beatmap::{
    BeatmapError, ComboColor, EdgeSampleSet, HitSample, HitSound, PrimitiveContainer,
    SliderScoringTime, Timestamp,
};
use crate::limits::ParseLimits;
use crate::point::Point;
use crate::rules::stack_offset;
use crate::CancelToken;

#[derive(Clone, Debug)]
pub struct GameplayCircle {
    pub pos: Point,
    pub time: Timestamp,
    pub hit_sound: HitSound,
    pub hit_sample: HitSample,
}

#[derive(Clone, Debug)]
pub struct GameplaySlider {
    pub pos: Point,
    pub time: Timestamp,
    pub duration: f64,
    pub span_duration: f64,
    pub repeat: i32,
    pub pixel_length: f64,
    pub curve: SliderCurve,
    pub scoring_times: Vec<SliderScoringTime>,
    pub hit_sound: HitSound,
    pub edge_hit_sounds: Vec<HitSound>,
    pub edge_sample_sets: Vec<EdgeSampleSet>,
    pub hit_sample: HitSample,
}

#[derive(Clone, Debug)]
pub struct GameplaySpinner {
    pub pos: Point,
    pub time: Timestamp,
    pub end_time: Timestamp,
    pub hit_sound: HitSound,
    pub hit_sample: HitSample,
}

/// Closed set of concrete object variants the session iterates over.
#[derive(Clone, Debug)]
pub enum GameplayObjectKind {
    Circle(GameplayCircle),
    Slider(GameplaySlider),
    Spinner(GameplaySpinner),
}

impl GameplayObjectKind {
    fn ordinal(&self) -> u8 {
        match self {
            Self::Circle(_) => 0,
            Self::Slider(_) => 1,
            Self::Spinner(_) => 2,
        }
    }
}

/// One live-session object plus its combo bookkeeping.
#[derive(Clone, Debug)]
pub struct GameplayObject {
    pub kind: GameplayObjectKind,
    pub combo_number: i32,
    pub color_counter: i32,
    pub color_offset: i32,
    pub new_combo: bool,
    /// True iff the next object starts a new combo, or there is none.
    pub is_end_of_combo: bool,
    pub stack_height: i32,
}

impl GameplayObject {
    #[must_use]
    pub fn start_time(&self) -> Timestamp {
        match &self.kind {
            GameplayObjectKind::Circle(c) => c.time,
            GameplayObjectKind::Slider(s) => s.time,
            GameplayObjectKind::Spinner(s) => s.time,
        }
    }

    #[must_use]
    pub fn end_time(&self) -> Timestamp {
        match &self.kind {
            GameplayObjectKind::Circle(c) => c.time,
            GameplayObjectKind::Slider(s) => s.time + s.duration,
            GameplayObjectKind::Spinner(s) => s.end_time,
        }
    }

    #[must_use]
    pub fn raw_pos(&self) -> Point {
        match &self.kind {
            GameplayObjectKind::Circle(c) => c.pos,
            GameplayObjectKind::Slider(s) => s.pos,
            GameplayObjectKind::Spinner(s) => s.pos,
        }
    }

    /// Number of combo-contributing scoring events of this object.
    fn combo_events(&self) -> u32 {
        match &self.kind {
            GameplayObjectKind::Circle(_) | GameplayObjectKind::Spinner(_) => 1,
            GameplayObjectKind::Slider(s) => 1 + s.scoring_times.len() as u32,
        }
    }

    fn stack_entry(&self) -> StackEntry {
        let kind = match &self.kind {
            GameplayObjectKind::Circle(_) => StackKind::Circle,
            GameplayObjectKind::Slider(s) => StackKind::Slider {
                end_pos: s.curve.end_position(),
            },
            GameplayObjectKind::Spinner(_) => StackKind::Spinner,
        };

        StackEntry {
            kind,
            pos: self.raw_pos(),
            start_time: self.start_time(),
            end_time: self.end_time(),
            stack_height: 0,
        }
    }
}

/// The live-session view of one loaded beatmap.
#[derive(Clone, Debug)]
pub struct GameplayBeatmap {
    /// Sorted by `(time, kind, x, y)`.
    pub objects: Vec<GameplayObject>,
    pub max_possible_combo: u32,
    /// Normalization ceiling for the combo portion of the alternate scoring
    /// mode, replayed ahead of time over the full combo growth.
    pub score_v2_combo_portion_max: f64,
    /// Per-level positional nudge in osu! pixels for this circle size.
    pub stack_nudge: f64,
    /// Combo color rotation from the Colours section, file order.
    pub combo_colors: Vec<ComboColor>,
    pub audio_filename: String,
    pub preview_time: Timestamp,
}

impl GameplayBeatmap {
    /// Consumes a primitive container into concrete gameplay objects.
    ///
    /// # Errors
    ///
    /// Propagates the container's fatal error, slider ceiling violations and
    /// cancellation; an object-less map is fatal on this path.
    pub fn build(
        mut primitives: PrimitiveContainer,
        limits: &ParseLimits,
        cancel: &CancelToken,
    ) -> Result<Self, BeatmapError> {
        if let Some(error) = primitives.error {
            return Err(error);
        }
        if primitives.num_objects() == 0 {
            return Err(BeatmapError::NoObjects);
        }

        process_sliders(&mut primitives, limits, cancel)?;

        let mut objects = Vec::with_capacity(primitives.num_objects());

        for circle in &primitives.circles {
            objects.push(GameplayObject {
                kind: GameplayObjectKind::Circle(GameplayCircle {
                    pos: circle.pos,
                    time: circle.time as Timestamp,
                    hit_sound: circle.hit_sound,
                    hit_sample: circle.hit_sample,
                }),
                combo_number: circle.combo_number,
                color_counter: circle.color_counter,
                color_offset: circle.color_offset,
                new_combo: circle.new_combo,
                is_end_of_combo: false,
                stack_height: 0,
            });
        }

        for slider in primitives.sliders.drain(..) {
            let curve =
                SliderCurve::build(slider.curve_type, &slider.control_points, slider.pixel_length);

            objects.push(GameplayObject {
                kind: GameplayObjectKind::Slider(GameplaySlider {
                    pos: slider.pos,
                    time: slider.time as Timestamp,
                    duration: slider.duration,
                    span_duration: slider.span_duration,
                    repeat: slider.repeat,
                    pixel_length: slider.pixel_length,
                    curve,
                    scoring_times: slider.scoring_times,
                    hit_sound: slider.hit_sound,
                    edge_hit_sounds: slider.edge_hit_sounds,
                    edge_sample_sets: slider.edge_sample_sets,
                    hit_sample: slider.hit_sample,
                }),
                combo_number: slider.combo_number,
                color_counter: slider.color_counter,
                color_offset: slider.color_offset,
                new_combo: slider.new_combo,
                is_end_of_combo: false,
                stack_height: 0,
            });
        }

        for spinner in &primitives.spinners {
            objects.push(GameplayObject {
                kind: GameplayObjectKind::Spinner(GameplaySpinner {
                    pos: spinner.pos,
                    time: spinner.time as Timestamp,
                    end_time: spinner.end_time as Timestamp,
                    hit_sound: spinner.hit_sound,
                    hit_sample: spinner.hit_sample,
                }),
                combo_number: spinner.combo_number,
                color_counter: spinner.color_counter,
                color_offset: spinner.color_offset,
                new_combo: spinner.new_combo,
                is_end_of_combo: false,
                stack_height: 0,
            });
        }

        if cancel.is_cancelled() {
            return Err(BeatmapError::LoadInterrupted);
        }

        objects.sort_by(|a, b| {
            a.start_time()
                .total_cmp(&b.start_time())
                .then_with(|| a.kind.ordinal().cmp(&b.kind.ordinal()))
                .then_with(|| a.raw_pos().x.total_cmp(&b.raw_pos().x))
                .then_with(|| a.raw_pos().y.total_cmp(&b.raw_pos().y))
        });

        for i in 0..objects.len() {
            let ends_combo = objects.get(i + 1).map_or(true, |next| next.new_combo);
            objects[i].is_end_of_combo = ends_combo;
        }

        if limits.apply_stacking {
            if cancel.is_cancelled() {
                return Err(BeatmapError::LoadInterrupted);
            }

            let mut entries: Vec<StackEntry> =
                objects.iter().map(GameplayObject::stack_entry).collect();
            apply_stacking(
                &mut entries,
                primitives.version,
                primitives.stack_leniency,
                primitives.approach_rate,
            );

            for (object, entry) in objects.iter_mut().zip(&entries) {
                object.stack_height = entry.stack_height;
            }
        }

        let max_possible_combo = objects.iter().map(GameplayObject::combo_events).sum();
        let score_v2_combo_portion_max = score_v2_combo_portion(max_possible_combo);

        let mut beatmap = Self {
            objects,
            max_possible_combo,
            score_v2_combo_portion_max,
            stack_nudge: stack_offset(primitives.circle_size),
            combo_colors: primitives.combo_colors,
            audio_filename: primitives.audio_filename,
            preview_time: primitives.preview_time,
        };

        if limits.combo_number_cap > 0 {
            beatmap.wrap_combo_numbers(limits.combo_number_cap);
        }

        Ok(beatmap)
    }

    /// Display position of one object after the stacking nudge.
    #[must_use]
    pub fn stacked_pos(&self, object: &GameplayObject) -> Point {
        if object.stack_height == 0 || matches!(object.kind, GameplayObjectKind::Spinner(_)) {
            return object.raw_pos();
        }

        let nudge = self.stack_nudge * f64::from(object.stack_height);
        object.raw_pos() - Point::new(nudge, nudge)
    }

    /// Recomputes combo numbers from the new-combo flags alone, ignoring the
    /// numbers the file carried. Cosmetic only.
    pub fn renumber_combos(&mut self) {
        let mut number = 0;
        for object in &mut self.objects {
            if object.new_combo || number == 0 {
                number = 0;
            }
            number += 1;
            object.combo_number = number;
        }
    }

    /// Wraps displayed combo numbers modulo `cap`. Cosmetic only; a zero cap
    /// leaves everything untouched.
    pub fn wrap_combo_numbers(&mut self, cap: i32) {
        if cap <= 0 {
            return;
        }

        for object in &mut self.objects {
            object.combo_number = (object.combo_number - 1).rem_euclid(cap) + 1;
        }
    }
}

/// Replays the combo growth formula: each combo-contributing event is worth
/// `300 * (1 + combo / 10)` with the combo counting up from zero.
fn score_v2_combo_portion(combo_events: u32) -> f64 {
    let mut total = 0.0;
    for combo in 0..combo_events {
        total += 300.0 * (1.0 + f64::from(combo) / 10.0);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::beatmap::parsing::parse_primitives;
    use crate::BeatmapSource;

    fn build(text: &str) -> GameplayBeatmap {
        let limits = ParseLimits::default();
        let source = BeatmapSource::new(text.as_bytes().to_vec());
        let primitives = parse_primitives(&source, &limits, &CancelToken::new());
        GameplayBeatmap::build(primitives, &limits, &CancelToken::new()).unwrap()
    }

    const THREE_COMBOS: &str = "osu file format v14\n\
        [TimingPoints]\n\
        0,500,4,2,1,60,1,0\n\
        [HitObjects]\n\
        0,0,100,5,0\n\
        50,0,200,1,0\n\
        100,0,300,5,0\n\
        150,0,400,1,0\n";

    #[test]
    fn end_of_combo_tracks_the_next_object() {
        let map = build(THREE_COMBOS);

        let flags: Vec<bool> = map.objects.iter().map(|o| o.is_end_of_combo).collect();
        assert_eq!(flags, vec![false, true, false, true]);
    }

    #[test]
    fn empty_map_is_fatal_on_the_session_path() {
        let limits = ParseLimits::default();
        let source = BeatmapSource::new(
            b"osu file format v14\n[TimingPoints]\n0,500,4,2,1,60,1,0\n".to_vec(),
        );
        let primitives = parse_primitives(&source, &limits, &CancelToken::new());
        let err = GameplayBeatmap::build(primitives, &limits, &CancelToken::new()).unwrap_err();

        assert_eq!(err, BeatmapError::NoObjects);
    }

    #[test]
    fn session_metadata_survives_the_build() {
        let map = build(
            "osu file format v14\n\
             [General]\n\
             AudioFilename: song.mp3\n\
             PreviewTime: 12345\n\
             [Colours]\n\
             Combo1 : 255,128,0\n\
             Combo2 : 0,202,0\n\
             [TimingPoints]\n\
             0,500,4,2,1,60,1,0\n\
             [HitObjects]\n\
             0,0,100,5,0\n",
        );

        assert_eq!(map.audio_filename, "song.mp3");
        assert_eq!(map.preview_time, 12345.0);
        assert_eq!(
            map.combo_colors,
            vec![
                ComboColor { r: 255, g: 128, b: 0 },
                ComboColor { r: 0, g: 202, b: 0 },
            ]
        );
    }

    #[test]
    fn combo_portion_replays_the_growth_formula() {
        let map = build(THREE_COMBOS);

        assert_eq!(map.max_possible_combo, 4);
        // 300*(1.0 + 1.1 + 1.2 + 1.3)
        assert!((map.score_v2_combo_portion_max - 1380.0).abs() < 1e-9);
    }

    #[test]
    fn slider_objects_carry_their_scoring_times() {
        let map = build(
            "osu file format v14\n\
             [Difficulty]\n\
             SliderMultiplier: 1.4\n\
             SliderTickRate: 1\n\
             [TimingPoints]\n\
             0,300,4,2,1,100,1,0\n\
             [HitObjects]\n\
             100,100,500,2,0,B|150:150|200:100,1,150\n",
        );

        let GameplayObjectKind::Slider(slider) = &map.objects[0].kind else {
            panic!("expected a slider");
        };
        assert!(!slider.scoring_times.is_empty());
        assert_eq!(map.max_possible_combo, 1 + slider.scoring_times.len() as u32);
    }

    #[test]
    fn renumber_and_wrap_are_cosmetic_and_ordered() {
        let mut map = build(THREE_COMBOS);
        map.renumber_combos();

        let numbers: Vec<i32> = map.objects.iter().map(|o| o.combo_number).collect();
        assert_eq!(numbers, vec![1, 2, 1, 2]);

        map.wrap_combo_numbers(1);
        let numbers: Vec<i32> = map.objects.iter().map(|o| o.combo_number).collect();
        assert_eq!(numbers, vec![1, 1, 1, 1]);
    }

    #[test]
    fn stacked_pos_nudges_by_height() {
        let map = build(
            "osu file format v9\n\
             [TimingPoints]\n\
             0,500,4,2,1,60,1,0\n\
             [HitObjects]\n\
             100,100,1000,1,0\n\
             100,100,1100,1,0\n",
        );

        let raised = map
            .objects
            .iter()
            .find(|o| o.stack_height != 0)
            .expect("one object should be stacked");
        let pos = map.stacked_pos(raised);
        let expected = raised.raw_pos() - Point::new(map.stack_nudge, map.stack_nudge);

        assert!((pos.x - expected.x).abs() < 1e-9);
        assert!((pos.y - expected.y).abs() < 1e-9);
    }
}
