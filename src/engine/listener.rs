//! Processing progress hooks and the debug report built from them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::results::{ConditionResult, ConditionsResults};
use crate::config::{Condition, ConditionId, Event, EventId, Scenario};

/// Observer of the processing progress. Every hook defaults to a no-op.
///
/// Hooks are called synchronously from the processing loop; keep them short.
pub trait ProcessingListener: Send + Sync {
    fn on_session_started(&self, _scenario: &Scenario) {}
    fn on_session_ended(&self) {}

    fn on_trigger_event_processing_started(&self, _event: &Event) {}
    fn on_trigger_event_fulfilled(&self, _event: &Event, _results: &ConditionsResults) {}

    fn on_image_events_processing_started(&self) {}
    fn on_image_event_processing_started(&self, _event: &Event) {}
    fn on_image_condition_processed(&self, _condition: &Condition, _result: &ConditionResult) {}
    fn on_image_event_fulfilled(&self, _event: &Event, _results: &ConditionsResults) {}
    fn on_image_events_processing_completed(&self) {}
    fn on_image_events_processing_cancelled(&self) {}

    fn on_counter_value_changed(&self, _counter: &str, _previous: Option<i64>, _value: i64) {}
    fn on_event_state_changed(&self, _event: EventId, _enabled: bool) {}
}

/// Summary of a processing session.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DebugReport {
    pub scenario: String,
    pub session_duration_ms: u64,
    pub frame_count: u64,
    pub average_frame_processing_ms: f64,
    pub image_event_fulfilled_count: u64,
    pub trigger_event_fulfilled_count: u64,
    pub events: BTreeMap<u64, EventStats>,
    pub conditions: BTreeMap<u64, ConditionStats>,
    pub counter_changes: Vec<CounterChange>,
    pub event_state_changes: Vec<EventStateChange>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EventStats {
    pub processed: u64,
    pub fulfilled: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ConditionStats {
    pub processed: u64,
    pub detected: u64,
    pub fulfilled: u64,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CounterChange {
    pub counter: String,
    pub previous: Option<i64>,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventStateChange {
    pub event_id: u64,
    pub enabled: bool,
}

#[derive(Debug, Default)]
struct Recording {
    report: DebugReport,
    session_start: Option<Instant>,
    frame_start: Option<Instant>,
    total_frame_processing: Duration,
    confidence_sums: BTreeMap<ConditionId, f64>,
}

/// Listener building a [`DebugReport`].
#[derive(Debug, Default)]
pub struct DebugRecorder {
    inner: Mutex<Recording>,
}

impl DebugRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the report so far.
    pub fn report(&self) -> DebugReport {
        let rec = self.lock();
        let mut report = rec.report.clone();
        if let Some(start) = rec.session_start {
            report.session_duration_ms = start.elapsed().as_millis() as u64;
        }
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessingListener for DebugRecorder {
    fn on_session_started(&self, scenario: &Scenario) {
        let mut rec = self.lock();
        *rec = Recording::default();
        rec.report.scenario = scenario.name.clone();
        rec.session_start = Some(Instant::now());
    }

    fn on_session_ended(&self) {
        let mut rec = self.lock();
        if let Some(start) = rec.session_start.take() {
            rec.report.session_duration_ms = start.elapsed().as_millis() as u64;
        }
    }

    fn on_trigger_event_processing_started(&self, event: &Event) {
        self.lock().report.events.entry(event.id.0).or_default().processed += 1;
    }

    fn on_trigger_event_fulfilled(&self, event: &Event, _results: &ConditionsResults) {
        let mut rec = self.lock();
        rec.report.trigger_event_fulfilled_count += 1;
        rec.report.events.entry(event.id.0).or_default().fulfilled += 1;
    }

    fn on_image_events_processing_started(&self) {
        let mut rec = self.lock();
        rec.report.frame_count += 1;
        rec.frame_start = Some(Instant::now());
    }

    fn on_image_event_processing_started(&self, event: &Event) {
        self.lock().report.events.entry(event.id.0).or_default().processed += 1;
    }

    fn on_image_condition_processed(&self, condition: &Condition, result: &ConditionResult) {
        let ConditionResult::Screen {
            fulfilled,
            was_detected,
            confidence,
            ..
        } = *result
        else {
            return;
        };

        let mut rec = self.lock();
        let sum = {
            let sum = rec.confidence_sums.entry(condition.id).or_default();
            *sum += confidence;
            *sum
        };
        let stats = rec.report.conditions.entry(condition.id.0).or_default();
        stats.processed += 1;
        stats.detected += u64::from(was_detected);
        stats.fulfilled += u64::from(fulfilled);
        stats.min_confidence = Some(stats.min_confidence.map_or(confidence, |m| m.min(confidence)));
        stats.max_confidence = Some(stats.max_confidence.map_or(confidence, |m| m.max(confidence)));
        stats.average_confidence = sum / stats.processed as f64;
    }

    fn on_image_event_fulfilled(&self, event: &Event, _results: &ConditionsResults) {
        let mut rec = self.lock();
        rec.report.image_event_fulfilled_count += 1;
        rec.report.events.entry(event.id.0).or_default().fulfilled += 1;
    }

    fn on_image_events_processing_completed(&self) {
        let mut rec = self.lock();
        if let Some(start) = rec.frame_start.take() {
            rec.total_frame_processing += start.elapsed();
            let frames = rec.report.frame_count.max(1) as f64;
            rec.report.average_frame_processing_ms =
                rec.total_frame_processing.as_secs_f64() * 1000.0 / frames;
        }
    }

    fn on_image_events_processing_cancelled(&self) {
        self.lock().frame_start = None;
    }

    fn on_counter_value_changed(&self, counter: &str, previous: Option<i64>, value: i64) {
        self.lock().report.counter_changes.push(CounterChange {
            counter: counter.to_string(),
            previous,
            value,
        });
    }

    fn on_event_state_changed(&self, event: EventId, enabled: bool) {
        self.lock().report.event_state_changes.push(EventStateChange {
            event_id: event.0,
            enabled,
        });
    }
}
