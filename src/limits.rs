//! Numeric bounds for resource-bounded parsing.
//!
//! Every ceiling the pipeline honors lives here so that the caller (usually
//! the session owning the background loader) can tighten or relax them in one
//! place. The defaults match what the legacy client shipped with.

/// Resource and compatibility bounds consulted throughout the pipeline.
#[derive(Clone, Debug)]
pub struct ParseLimits {
    /// Maximum number of primitive hit objects in one file.
    pub max_hitobjects: usize,
    /// Maximum repeat count of a single slider.
    pub max_slider_repeats: i32,
    /// Maximum number of ticks generated for one slider span.
    pub max_slider_ticks: usize,
    /// Ceiling on `repeats x ticks` before scoring-time expansion.
    pub max_scoring_times: usize,
    /// Sanity bound for a slider's visual pixel length. Non-finite or
    /// out-of-range lengths saturate to this value.
    pub pixel_length_bound: f64,
    /// Backwards offset in milliseconds for the slider END scoring event.
    pub end_inside_check_offset: f64,
    /// Eagerly evaluate slider curves only while the file has fewer sliders
    /// than this. Above it the analysis path runs in fast/inaccurate mode.
    pub eager_curve_slider_threshold: usize,
    /// Whether the stacking pass runs at all.
    pub apply_stacking: bool,
    /// Highest `osu file format` version accepted.
    pub max_format_version: u32,
    /// Displayed combo numbers wrap modulo this cap (cosmetic pass only).
    pub combo_number_cap: i32,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_hitobjects: 40_000,
            max_slider_repeats: 9_000,
            max_slider_ticks: 2_048,
            max_scoring_times: 32_768,
            pixel_length_bound: 131_072.0,
            end_inside_check_offset: 36.0,
            eager_curve_slider_threshold: 8_192,
            apply_stacking: true,
            max_format_version: 128,
            combo_number_cap: 0,
        }
    }
}
