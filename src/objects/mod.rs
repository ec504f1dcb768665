//! The two derived object sequences.
//!
//! A [`crate::file::beatmap::PrimitiveContainer`] is consumed, by move, by
//! exactly one of these builders: [`difficulty`] produces the generalized
//! analysis sequence, [`gameplay`] the owned concrete objects of a live
//! session. Both sort by `(time, kind, x, y)` with a stable sort and run the
//! stacking engine once, selected by file version.

pub mod difficulty;
pub mod gameplay;
