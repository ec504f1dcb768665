//! Loader pipeline for legacy `.osu` beatmap files of the standard ruleset.
//!
//! The pipeline runs in two stages. [`file::beatmap::parsing::parse_primitives`]
//! turns raw file bytes into a [`file::beatmap::PrimitiveContainer`] of hit
//! circles, sliders, spinners, timing points and breaks. The container is then
//! consumed by exactly one of the two builders in [`objects`]: the analysis
//! path ([`objects::difficulty`]) or the session path ([`objects::gameplay`]).
//!
//! Fatal conditions never panic and never bubble as bare results out of the
//! parse pass; they are recorded in the container's `error` slot so a
//! background loader can always hand one tagged outcome to its caller. The
//! path-taking conveniences at the crate root wrap that outcome in a
//! [`error_stack::Report`] for callers that want context-rich errors.

#[cfg(all(feature = "async_tokio", feature = "async_std"))]
compile_error!("only one of the features `async_tokio` and `async_std` can be enabled");

pub mod algos;
pub mod file;
pub mod limits;
pub mod objects;
pub mod point;
pub mod rules;
pub mod source;

use std::ops::{Bound, RangeBounds};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use error_stack::{IntoReport, Report, ResultExt};

use file::beatmap::{BeatmapError, Timestamp};
pub use limits::ParseLimits;
use objects::difficulty::DifficultyBeatmap;
use objects::gameplay::GameplayBeatmap;
pub use source::BeatmapSource;

pub trait Timestamped {
    fn timestamp(&self) -> Timestamp;
}

pub trait TimestampedSlice<T: Timestamped> {
    fn between(&self, time_range: impl RangeBounds<Timestamp>) -> &[T];
}

impl<T: Timestamped> TimestampedSlice<T> for &[T] {
    fn between(&self, time_range: impl RangeBounds<Timestamp>) -> &[T] {
        let start_index = match time_range.start_bound() {
            Bound::Included(start) => self.partition_point(|o| o.timestamp() < *start),
            Bound::Excluded(start) => self.partition_point(|o| o.timestamp() <= *start),
            Bound::Unbounded => 0,
        };

        let end_index = match time_range.end_bound() {
            Bound::Included(end) => self.partition_point(|o| o.timestamp() <= *end),
            Bound::Excluded(end) => self.partition_point(|o| o.timestamp() < *end),
            Bound::Unbounded => self.len(),
        };

        &self[start_index..end_index]
    }
}

/// Cooperative cancellation signal, shared between the requesting thread and
/// a background load. Cancelling is sticky and can happen at any point; the
/// pipeline polls it at line and slider granularity.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Loads a file and runs the analysis path in one call.
///
/// # Errors
///
/// Returns a [`BeatmapError`] report if the file could not be read or any
/// fatal pipeline condition was hit.
pub fn load_difficulty<P: AsRef<Path>>(
    path: P,
    limits: &ParseLimits,
    cancel: &CancelToken,
) -> error_stack::Result<DifficultyBeatmap, BeatmapError> {
    let path = path.as_ref();
    let source = BeatmapSource::from_path(path)
        .report()
        .change_context(BeatmapError::FileLoad)
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;

    let primitives = file::beatmap::parsing::parse_primitives(&source, limits, cancel);
    DifficultyBeatmap::build(primitives, limits, cancel)
        .map_err(Report::new)
        .attach_printable_lazy(|| format!("path: {}", path.display()))
}

/// Loads a file and runs the session path in one call.
///
/// # Errors
///
/// Returns a [`BeatmapError`] report if the file could not be read or any
/// fatal pipeline condition was hit.
pub fn load_gameplay<P: AsRef<Path>>(
    path: P,
    limits: &ParseLimits,
    cancel: &CancelToken,
) -> error_stack::Result<GameplayBeatmap, BeatmapError> {
    let path = path.as_ref();
    let source = BeatmapSource::from_path(path)
        .report()
        .change_context(BeatmapError::FileLoad)
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;

    let primitives = file::beatmap::parsing::parse_primitives(&source, limits, cancel);
    GameplayBeatmap::build(primitives, limits, cancel)
        .map_err(Report::new)
        .attach_printable_lazy(|| format!("path: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_sticky_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn between_uses_binary_search_bounds() {
        struct T(f64);
        impl Timestamped for T {
            fn timestamp(&self) -> Timestamp {
                self.0
            }
        }

        let items = [T(0.0), T(10.0), T(20.0), T(30.0)];
        let slice = &items[..];
        assert_eq!(slice.between(5.0..25.0).len(), 2);
        assert_eq!(slice.between(10.0..=30.0).len(), 3);
        assert_eq!(slice.between(..).len(), 4);
    }
}
