//! Structural (non-semantic) metrics
//!
//! Everything in here consumes count-only `TaskActivity` projections and is
//! therefore callable in every seal state, including the blind period.

pub mod structural;

pub use structural::{Category, StructuralReport, TaskRow};
