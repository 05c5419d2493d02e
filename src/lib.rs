#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Autotap — a frame-driven scenario engine for screen automation.
//!
//! A scenario is a list of events. Each event holds conditions (images or text on the
//! captured frame, counters, timers, broadcasts) combined by an operator, and the ordered
//! actions to run when they hold (gestures, intents, counter changes, event toggles,
//! notifications). The engine verifies the events once per frame and keeps the cross-frame
//! state (counters, enabled flags, timers).
//!
//! Modules:
//! - `config`: scenario models, loader, validation and schema helpers.
//! - `engine`: processing state, condition verification, action execution, frame loop.
//! - `device`: detector/executor capabilities and the desktop and replay implementations.
//! - `sources`: frame sources (file, stdin).
//! - `utils`: randomization helpers.
//!
//! Use `autotap::prelude::*` to bring commonly used items into scope quickly.

/// Public module: scenario definitions (models, loader, schema helpers).
pub mod config;
/// Public module: device capabilities and their implementations.
pub mod device;
/// Public module: the scenario processing engine.
pub mod engine;
/// Public module: engine errors.
pub mod error;
/// Public module: frame sources (file, stdin).
pub mod sources;
/// Public module: utilities.
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a simple level name (trace|debug|info|warn|error).
pub fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(tracing::Level::INFO);
    init_tracing_with_level(level);
}

/// Initialize tracing at an explicit level. No-op if a subscriber is already set.
pub fn init_tracing_with_level(level: tracing::Level) {
    // Ignore the error if the global subscriber was already set.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use autotap::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    // External crates (namespaced) if callers want direct access
    pub use crate as autotap;
    pub use tokio_util::sync::CancellationToken;

    // Frequently used items
    pub use crate::config::{Scenario, load_from_path, load_from_path_async};
    pub use crate::device::{BitmapSupplier, Detector, DeviceExecutor};
    pub use crate::engine::{DebugRecorder, ProcessOutcome, ScenarioProcessor};
    pub use crate::error::EngineError;
    pub use crate::{config, device, engine, sources, utils};
}
