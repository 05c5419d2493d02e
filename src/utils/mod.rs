//! Utilities for autotap.
//!
//! Submodules:
//! - `random`: bounded jitter applied to gesture positions and durations.

pub mod random;
