//! Scenario definitions for autotap.
//!
//! This module wires together the data models and loading/validation helpers used
//! throughout the crate. Import from here for a convenient, stable API.
//!
//! Example:
//! use autotap::config::{Scenario, load_from_path};
//!
//! let scenario = load_from_path("scenarios/daily.json")?;

pub mod loader;
pub mod models;

// Re-export core data models
pub use models::{
    Action, ClickPosition, ComparisonOperation, Condition, ConditionId, ConditionKind,
    ConditionOperator, CounterOperand, CounterOperation, DetectionType, Event, EventId, EventKind,
    EventToggle, ExtraValue, ImageCondition, IntentExtra, NotificationImportance,
    NotificationMessage, Point, ProcessingSettings, RandomizationSettings, Rect, Scenario,
    TextCondition, ToggleOperation, ToggleTarget, UnblockSettings,
};

// Re-export loader utilities
pub use loader::{
    generate_schema, load_from_path, load_from_path_async, load_from_reader, load_from_str,
    validate_scenario, write_schema_to_writer,
};
