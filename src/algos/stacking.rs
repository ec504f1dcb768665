//! Stack height assignment.
//!
//! Two scans exist because the game changed its algorithm in format
//! version 6: newer files use a backward scan seeded from the latest object
//! of each stack, older files a forward scan that also pushes trailing
//! objects below slider tails. Heights are signed; the positional nudge per
//! height level is [`crate::rules::stack_offset`].

use crate::point::Point;
use crate::rules::approach_time;

/// Objects closer than this (in osu! pixels) stack.
pub const STACK_DISTANCE: f64 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StackKind {
    Circle,
    Slider { end_pos: Point },
    Spinner,
}

/// Positional view of one object for the stacking pass, time-ordered.
#[derive(Clone, Debug)]
pub struct StackEntry {
    pub kind: StackKind,
    pub pos: Point,
    pub start_time: f64,
    pub end_time: f64,
    pub stack_height: i32,
}

impl StackEntry {
    fn is_circle(&self) -> bool {
        matches!(self.kind, StackKind::Circle)
    }

    fn is_slider(&self) -> bool {
        matches!(self.kind, StackKind::Slider { .. })
    }

    fn is_spinner(&self) -> bool {
        matches!(self.kind, StackKind::Spinner)
    }

    fn end_pos(&self) -> Point {
        match self.kind {
            StackKind::Slider { end_pos } => end_pos,
            _ => self.pos,
        }
    }
}

/// Assigns stack heights in place. `entries` must be sorted by start time.
pub fn apply_stacking(
    entries: &mut [StackEntry],
    version: u32,
    stack_leniency: f32,
    approach_rate: f32,
) {
    let stack_threshold = approach_time(approach_rate) * f64::from(stack_leniency);

    if version > 5 {
        stack_backward(entries, stack_threshold);
    } else {
        stack_forward(entries, stack_threshold);
    }
}

/// Backward scan, format version 6 and later.
///
/// Walks from the newest object down; every object that already has a height
/// was handled as part of a later stack and is skipped, which keeps
/// interwound stacks independent.
fn stack_backward(entries: &mut [StackEntry], stack_threshold: f64) {
    let Some(last) = entries.len().checked_sub(1) else {
        return;
    };

    for i in (1..=last).rev() {
        let mut n = i;
        let mut base = i;

        if entries[base].stack_height != 0 || entries[base].is_spinner() {
            continue;
        }

        if entries[base].is_circle() {
            while let Some(prev) = n.checked_sub(1) {
                n = prev;

                if entries[n].is_spinner() {
                    continue;
                }
                if entries[base].start_time - entries[n].end_time > stack_threshold {
                    break;
                }

                // A circle resting on a slider tail pushes the whole run of
                // tail-stacked circles below the slider instead of above it.
                if entries[n].is_slider()
                    && entries[n].end_pos().distance(entries[base].pos) < STACK_DISTANCE
                {
                    let offset = entries[base].stack_height - entries[n].stack_height + 1;

                    for j in (n + 1)..=i {
                        if entries[n].end_pos().distance(entries[j].pos) < STACK_DISTANCE {
                            entries[j].stack_height -= offset;
                        }
                    }

                    // The slider itself restarts as a base in the outer loop.
                    break;
                }

                if entries[n].pos.distance(entries[base].pos) < STACK_DISTANCE {
                    entries[n].stack_height = entries[base].stack_height + 1;
                    base = n;
                }
            }
        } else if entries[base].is_slider() {
            // A slider stack only ever grows upward.
            while let Some(prev) = n.checked_sub(1) {
                n = prev;

                if entries[n].is_spinner() {
                    continue;
                }
                if entries[base].start_time - entries[n].start_time > stack_threshold {
                    break;
                }

                if entries[n].end_pos().distance(entries[base].pos) < STACK_DISTANCE {
                    entries[n].stack_height = entries[base].stack_height + 1;
                    base = n;
                }
            }
        }
    }
}

/// Forward scan, format version 5 and earlier.
///
/// The base object climbs upward for every overlapping start; objects that
/// overlap its tail instead of its head are pushed downward by a running
/// slider-stack counter.
fn stack_forward(entries: &mut [StackEntry], stack_threshold: f64) {
    for i in 0..entries.len() {
        if entries[i].stack_height != 0 && !entries[i].is_slider() {
            continue;
        }

        let mut start_time = entries[i].end_time;
        let end_pos = entries[i].end_pos();
        let mut slider_stack = 0;

        for n in (i + 1)..entries.len() {
            if entries[n].start_time - stack_threshold > start_time {
                break;
            }

            if entries[n].pos.distance(entries[i].pos) < STACK_DISTANCE {
                entries[i].stack_height += 1;
                start_time = entries[n].end_time;
            } else if entries[n].pos.distance(end_pos) < STACK_DISTANCE {
                slider_stack += 1;
                entries[n].stack_height -= slider_stack;
                start_time = entries[n].end_time;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(x: f64, y: f64, time: f64) -> StackEntry {
        StackEntry {
            kind: StackKind::Circle,
            pos: Point::new(x, y),
            start_time: time,
            end_time: time,
            stack_height: 0,
        }
    }

    fn slider(x: f64, y: f64, time: f64, end_time: f64, end: Point) -> StackEntry {
        StackEntry {
            kind: StackKind::Slider { end_pos: end },
            pos: Point::new(x, y),
            start_time: time,
            end_time,
            stack_height: 0,
        }
    }

    fn heights(entries: &[StackEntry]) -> Vec<i32> {
        entries.iter().map(|e| e.stack_height).collect()
    }

    #[test]
    fn two_overlapping_circles_stack_in_both_eras() {
        for version in [5, 9] {
            let mut entries = vec![circle(100.0, 100.0, 0.0), circle(101.0, 100.0, 100.0)];
            apply_stacking(&mut entries, version, 0.7, 5.0);

            let h = heights(&entries);
            assert_eq!(
                (h[0] - h[1]).abs(),
                1,
                "version {version} should stack, got {h:?}"
            );
        }
    }

    #[test]
    fn eras_diverge_when_a_slider_starts_on_another_tail() {
        let joint = Point::new(200.0, 100.0);
        let pattern = || {
            vec![
                slider(100.0, 100.0, 0.0, 300.0, joint),
                slider(200.0, 100.0, 700.0, 1000.0, Point::new(300.0, 100.0)),
            ]
        };

        // The backward scan lifts the earlier slider above the one resting
        // on its tail; the forward scan pushes the later slider underneath.
        let mut modern = pattern();
        apply_stacking(&mut modern, 9, 0.7, 5.0);
        assert_eq!(heights(&modern), vec![1, 0]);

        let mut legacy = pattern();
        apply_stacking(&mut legacy, 5, 0.7, 5.0);
        assert_eq!(heights(&legacy), vec![0, -1]);
    }

    #[test]
    fn distant_circles_do_not_stack() {
        let mut entries = vec![circle(100.0, 100.0, 0.0), circle(110.0, 100.0, 100.0)];
        apply_stacking(&mut entries, 9, 0.7, 5.0);
        assert_eq!(heights(&entries), vec![0, 0]);
    }

    #[test]
    fn time_window_limits_stacking() {
        // AT(5) = 1200ms, leniency 0.7 gives an 840ms window.
        let mut entries = vec![circle(100.0, 100.0, 0.0), circle(100.0, 100.0, 2000.0)];
        apply_stacking(&mut entries, 9, 0.7, 5.0);
        assert_eq!(heights(&entries), vec![0, 0]);

        let mut entries = vec![circle(100.0, 100.0, 0.0), circle(100.0, 100.0, 800.0)];
        apply_stacking(&mut entries, 9, 0.7, 5.0);
        assert_eq!(heights(&entries), vec![1, 0]);
    }

    #[test]
    fn circles_under_a_slider_tail_go_negative() {
        let tail = Point::new(200.0, 100.0);
        let mut entries = vec![
            slider(100.0, 100.0, 0.0, 300.0, tail),
            circle(200.0, 100.0, 400.0),
            circle(200.0, 100.0, 500.0),
        ];
        apply_stacking(&mut entries, 9, 0.7, 5.0);

        assert_eq!(entries[0].stack_height, 0);
        assert!(entries[1].stack_height < 0);
        assert!(entries[2].stack_height < entries[1].stack_height);
    }

    #[test]
    fn legacy_scan_pushes_tail_overlaps_down() {
        let tail = Point::new(200.0, 100.0);
        let mut entries = vec![
            slider(100.0, 100.0, 0.0, 300.0, tail),
            circle(200.0, 100.0, 400.0),
            circle(200.0, 100.0, 500.0),
        ];
        apply_stacking(&mut entries, 5, 0.7, 5.0);

        assert_eq!(heights(&entries), vec![0, -1, -2]);
    }

    #[test]
    fn spinners_never_stack() {
        let mut entries = vec![
            circle(100.0, 100.0, 0.0),
            StackEntry {
                kind: StackKind::Spinner,
                pos: Point::new(100.0, 100.0),
                start_time: 100.0,
                end_time: 200.0,
                stack_height: 0,
            },
            circle(100.0, 100.0, 300.0),
        ];
        apply_stacking(&mut entries, 9, 0.7, 5.0);

        assert_eq!(entries[1].stack_height, 0);
        // The circles still see each other across the spinner.
        assert_eq!(entries[0].stack_height, 1);
        assert_eq!(entries[2].stack_height, 0);
    }
}
