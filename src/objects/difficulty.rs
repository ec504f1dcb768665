//! The analysis-only generalized object sequence.

use crate::algos::curve::SliderCurve;
use crate::algos::slider::process_sliders;
use crate::algos::stacking::{apply_stacking, StackEntry, StackKind};
use crate::file::beatmap::{
    BeatmapError, PrimitiveContainer, SliderScoringTime, Timestamp,
};
use crate::limits::ParseLimits;
use crate::point::Point;
use crate::rules::stack_offset;
use crate::CancelToken;

/// Kind tag of a generalized object. Declaration order is the sort ordinal.
#[derive(Clone, Debug)]
pub enum DifficultyObjectKind {
    Circle,
    Slider {
        /// Flattened geometry, present only in accurate mode.
        curve: Option<SliderCurve>,
        repeat: i32,
        pixel_length: f64,
    },
    Spinner,
}

impl DifficultyObjectKind {
    fn ordinal(&self) -> u8 {
        match self {
            Self::Circle => 0,
            Self::Slider { .. } => 1,
            Self::Spinner => 2,
        }
    }
}

/// One generalized analysis object. Owned exclusively by the invocation that
/// built it; the analysis engine consumes the whole sequence by move.
#[derive(Clone, Debug)]
pub struct DifficultyObject {
    pub kind: DifficultyObjectKind,
    pub pos: Point,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Ticks, repeats and end of a slider; empty for everything else and in
    /// fast mode.
    pub scoring_times: Vec<SliderScoringTime>,
    pub stack_height: i32,
    pub span_duration: f64,
}

impl DifficultyObject {
    fn stack_entry(&self) -> StackEntry {
        let kind = match &self.kind {
            DifficultyObjectKind::Circle => StackKind::Circle,
            DifficultyObjectKind::Slider { curve, .. } => StackKind::Slider {
                end_pos: curve
                    .as_ref()
                    .map_or(self.pos, SliderCurve::end_position),
            },
            DifficultyObjectKind::Spinner => StackKind::Spinner,
        };

        StackEntry {
            kind,
            pos: self.pos,
            start_time: self.start_time,
            end_time: self.end_time,
            stack_height: 0,
        }
    }
}

/// The analysis view of one loaded beatmap.
#[derive(Clone, Debug)]
pub struct DifficultyBeatmap {
    /// Sorted by `(time, kind, x, y)`.
    pub objects: Vec<DifficultyObject>,
    /// `max_combo_table[i]` is the combo total through object `i`. Empty in
    /// fast mode, where only the aggregate survives.
    pub max_combo_table: Vec<u32>,
    pub max_combo: u32,
    /// Last object's end time minus first object's start time.
    pub playable_length: Timestamp,
    pub total_break_duration: Timestamp,
}

impl DifficultyBeatmap {
    /// Consumes a primitive container into the analysis sequence at normal
    /// playback speed.
    ///
    /// # Errors
    ///
    /// Propagates the container's fatal error, slider ceiling violations and
    /// cancellation.
    pub fn build(
        primitives: PrimitiveContainer,
        limits: &ParseLimits,
        cancel: &CancelToken,
    ) -> Result<Self, BeatmapError> {
        Self::build_scaled(primitives, limits, cancel, 1.0)
    }

    /// Like [`Self::build`], additionally rescaling every time value by
    /// `1.0 / speed_multiplier` for rate-changed analysis.
    ///
    /// # Errors
    ///
    /// Propagates the container's fatal error, slider ceiling violations and
    /// cancellation.
    pub fn build_scaled(
        mut primitives: PrimitiveContainer,
        limits: &ParseLimits,
        cancel: &CancelToken,
        speed_multiplier: f64,
    ) -> Result<Self, BeatmapError> {
        if let Some(error) = primitives.error {
            return Err(error);
        }

        process_sliders(&mut primitives, limits, cancel)?;

        // Fast mode drops curve geometry and per-object scoring times; only
        // the aggregate combo number survives.
        let accurate = primitives.sliders.len() < limits.eager_curve_slider_threshold;

        let mut objects = Vec::with_capacity(primitives.num_objects());

        for circle in &primitives.circles {
            objects.push(DifficultyObject {
                kind: DifficultyObjectKind::Circle,
                pos: circle.pos,
                start_time: circle.time as Timestamp,
                end_time: circle.time as Timestamp,
                scoring_times: Vec::new(),
                stack_height: 0,
                span_duration: 0.0,
            });
        }

        for slider in &primitives.sliders {
            let curve = accurate.then(|| {
                SliderCurve::build(slider.curve_type, &slider.control_points, slider.pixel_length)
            });

            objects.push(DifficultyObject {
                kind: DifficultyObjectKind::Slider {
                    curve,
                    repeat: slider.repeat,
                    pixel_length: slider.pixel_length,
                },
                pos: slider.pos,
                start_time: slider.time as Timestamp,
                end_time: slider.end_time(),
                scoring_times: if accurate {
                    slider.scoring_times.clone()
                } else {
                    Vec::new()
                },
                stack_height: 0,
                span_duration: slider.span_duration,
            });
        }

        for spinner in &primitives.spinners {
            objects.push(DifficultyObject {
                kind: DifficultyObjectKind::Spinner,
                pos: spinner.pos,
                start_time: spinner.time as Timestamp,
                end_time: spinner.end_time as Timestamp,
                scoring_times: Vec::new(),
                stack_height: 0,
                span_duration: 0.0,
            });
        }

        if cancel.is_cancelled() {
            return Err(BeatmapError::LoadInterrupted);
        }

        objects.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.kind.ordinal().cmp(&b.kind.ordinal()))
                .then_with(|| a.pos.x.total_cmp(&b.pos.x))
                .then_with(|| a.pos.y.total_cmp(&b.pos.y))
        });

        if limits.apply_stacking {
            if cancel.is_cancelled() {
                return Err(BeatmapError::LoadInterrupted);
            }

            let mut entries: Vec<StackEntry> =
                objects.iter().map(DifficultyObject::stack_entry).collect();
            apply_stacking(
                &mut entries,
                primitives.version,
                primitives.stack_leniency,
                primitives.approach_rate,
            );

            let offset = stack_offset(primitives.circle_size);
            for (object, entry) in objects.iter_mut().zip(&entries) {
                object.stack_height = entry.stack_height;

                // Only objects holding a curve are ever repositioned; bare
                // circles keep their raw coordinates.
                let has_curve = matches!(
                    &object.kind,
                    DifficultyObjectKind::Slider { curve: Some(_), .. }
                );
                if has_curve && object.stack_height != 0 {
                    let nudge = offset * f64::from(object.stack_height);
                    object.pos = object.pos - Point::new(nudge, nudge);
                }
            }
        }

        if speed_multiplier > 0.0 && (speed_multiplier - 1.0).abs() > f64::EPSILON {
            if cancel.is_cancelled() {
                return Err(BeatmapError::LoadInterrupted);
            }

            let inverse = 1.0 / speed_multiplier;
            for object in &mut objects {
                object.start_time *= inverse;
                object.end_time *= inverse;
                object.span_duration *= inverse;
                for st in &mut object.scoring_times {
                    st.time *= inverse;
                }
            }
        }

        let playable_length = match (objects.first(), objects.last()) {
            (Some(first), Some(last)) => last.end_time - first.start_time,
            _ => 0.0,
        };

        let (max_combo_table, max_combo) = if accurate {
            let mut table = Vec::with_capacity(objects.len());
            let mut running = 0u32;
            for object in &objects {
                running += 1 + object.scoring_times.len() as u32;
                table.push(running);
            }
            (table, running)
        } else {
            // Scoring times were not propagated onto the objects; recount
            // from the slider primitives directly.
            let mut total = objects.len() as u32;
            for slider in &primitives.sliders {
                total += slider.scoring_times.len() as u32;
            }
            (Vec::new(), total)
        };

        Ok(Self {
            objects,
            max_combo_table,
            max_combo,
            playable_length,
            total_break_duration: primitives.total_break_duration(),
        })
    }

    /// Combo total achievable through object `index`, O(1). Falls back to
    /// the aggregate in fast mode.
    #[must_use]
    pub fn max_combo_at(&self, index: usize) -> u32 {
        match self.max_combo_table.get(index) {
            Some(&combo) => combo,
            None => self.max_combo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::beatmap::parsing::parse_primitives;
    use crate::BeatmapSource;

    fn parse(text: &str, limits: &ParseLimits) -> PrimitiveContainer {
        let source = BeatmapSource::new(text.as_bytes().to_vec());
        parse_primitives(&source, limits, &CancelToken::new())
    }

    fn build(text: &str) -> DifficultyBeatmap {
        let limits = ParseLimits::default();
        DifficultyBeatmap::build(parse(text, &limits), &limits, &CancelToken::new()).unwrap()
    }

    const SLIDER_MAP: &str = "osu file format v14\n\
        [Difficulty]\n\
        SliderMultiplier: 1.4\n\
        SliderTickRate: 1\n\
        [TimingPoints]\n\
        0,300,4,2,1,100,1,0\n\
        [HitObjects]\n\
        100,100,500,2,0,B|150:150|200:100,1,150\n\
        256,192,2000,1,0,0:0:0:0:\n";

    #[test]
    fn objects_are_sorted_and_aggregated() {
        let map = build(SLIDER_MAP);

        assert_eq!(map.objects.len(), 2);
        assert!(matches!(
            map.objects[0].kind,
            DifficultyObjectKind::Slider { .. }
        ));

        // 150px at 300ms/beat and single-precision SM 1.4 is ~321.4ms per span.
        let slider = &map.objects[0];
        assert!((slider.span_duration - 300.0 * 150.0 / 140.0).abs() < 1e-3);
        assert!((map.playable_length - (2000.0 - 500.0)).abs() < 1e-9);
    }

    #[test]
    fn max_combo_table_accumulates_slider_events() {
        let map = build(SLIDER_MAP);

        // Slider head plus its scoring events, then one circle.
        let slider_combo = 1 + map.objects[0].scoring_times.len() as u32;
        assert_eq!(map.max_combo_table, vec![slider_combo, slider_combo + 1]);
        assert_eq!(map.max_combo, slider_combo + 1);
        assert_eq!(map.max_combo_at(0), slider_combo);
        assert_eq!(map.max_combo_at(10), map.max_combo);
    }

    #[test]
    fn fast_mode_drops_curves_but_keeps_the_total() {
        let limits = ParseLimits {
            eager_curve_slider_threshold: 0,
            ..ParseLimits::default()
        };
        let accurate = build(SLIDER_MAP);
        let fast =
            DifficultyBeatmap::build(parse(SLIDER_MAP, &limits), &limits, &CancelToken::new())
                .unwrap();

        let slider = fast
            .objects
            .iter()
            .find(|o| matches!(o.kind, DifficultyObjectKind::Slider { .. }))
            .unwrap();
        assert!(matches!(
            &slider.kind,
            DifficultyObjectKind::Slider { curve: None, .. }
        ));
        assert!(slider.scoring_times.is_empty());
        assert!(fast.max_combo_table.is_empty());
        assert_eq!(fast.max_combo, accurate.max_combo);
    }

    #[test]
    fn stacked_circles_get_distinct_heights() {
        let map = build(
            "osu file format v9\n\
             [TimingPoints]\n\
             0,500,4,2,1,60,1,0\n\
             [HitObjects]\n\
             100,100,1000,1,0\n\
             101,100,1100,1,0\n",
        );

        let h0 = map.objects[0].stack_height;
        let h1 = map.objects[1].stack_height;
        assert_eq!((h0 - h1).abs(), 1);

        // Bare circles carry no curve, so their positions stay raw.
        assert_eq!(map.objects[0].pos, Point::new(100.0, 100.0));
    }

    #[test]
    fn speed_rescale_divides_every_time() {
        let limits = ParseLimits::default();
        let map = DifficultyBeatmap::build_scaled(
            parse(SLIDER_MAP, &limits),
            &limits,
            &CancelToken::new(),
            1.5,
        )
        .unwrap();

        let slider = &map.objects[0];
        assert!((slider.start_time - 500.0 / 1.5).abs() < 1e-9);
        for st in &slider.scoring_times {
            assert!(st.time <= slider.end_time + 1e-9);
        }
        assert!((map.playable_length - 1500.0 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn fatal_parse_errors_propagate() {
        let limits = ParseLimits::default();
        let primitives = parse("", &limits);
        let err =
            DifficultyBeatmap::build(primitives, &limits, &CancelToken::new()).unwrap_err();
        assert_eq!(err, BeatmapError::FileLoad);
    }

    #[test]
    fn hitobject_ceiling_reports_without_tick_expansion() {
        let limits = ParseLimits {
            max_hitobjects: 1,
            ..ParseLimits::default()
        };
        let primitives = parse(SLIDER_MAP, &limits);

        assert_eq!(primitives.error, Some(BeatmapError::TooManyHitObjects));
        assert!(primitives.sliders[0].scoring_times.is_empty());

        let err =
            DifficultyBeatmap::build(primitives, &limits, &CancelToken::new()).unwrap_err();
        assert_eq!(err, BeatmapError::TooManyHitObjects);
    }
}
