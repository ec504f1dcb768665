use std::num::{ParseFloatError, ParseIntError};

/// Fatal outcome of a load. Anything here aborts the pipeline; the session
/// collaborator owns the user-visible messaging, this crate only logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BeatmapError {
    #[error("beatmap file is empty or unreadable")]
    FileLoad,

    #[error("beatmap load was interrupted")]
    LoadInterrupted,

    #[error("beatmap exceeds the hit object resource ceiling")]
    TooManyHitObjects,

    #[error("beatmap has no usable timing points")]
    NoTimingPoints,

    #[error("beatmap has no hit objects")]
    NoObjects,

    #[error("unsupported format version or game mode")]
    Metadata,
}

#[derive(Debug, thiserror::Error)]
pub enum TimingPointParseError {
    #[error("expected 2, 7 or 8 comma-separated values, got {0}")]
    WrongValueCount(usize),

    #[error("invalid float")]
    InvalidFloat(
        #[from]
        #[source]
        ParseFloatError,
    ),

    #[error("invalid int")]
    InvalidInt(
        #[from]
        #[source]
        ParseIntError,
    ),
}

#[derive(Debug, thiserror::Error)]
pub enum HitObjectParseError {
    #[error("expected at least 5 comma-separated arguments, got {0}")]
    NotEnoughArguments(usize),

    #[error("hit object position is not finite")]
    NonFinitePosition,

    #[error("hold notes are not part of the standard ruleset")]
    HoldNote,

    #[error("unknown hit object type bits: {0}")]
    UnknownType(i32),

    #[error("slider is missing curve, repeat or length fields")]
    IncompleteSlider,

    #[error("spinner is missing its end time")]
    IncompleteSpinner,

    #[error("invalid float")]
    InvalidFloat(
        #[from]
        #[source]
        ParseFloatError,
    ),

    #[error("invalid int")]
    InvalidInt(
        #[from]
        #[source]
        ParseIntError,
    ),
}

impl HitObjectParseError {
    /// Whether this failure is in a mandatory prefix field. A mandatory
    /// failure aborts the rest of the HitObjects block; anything else only
    /// drops or defaults the current line.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Self::NonFinitePosition | Self::HoldNote | Self::UnknownType(_))
    }
}
