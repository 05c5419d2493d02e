use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::{ConditionId, ConditionKind, Event, EventId, ToggleOperation};

/// Mutable state of one running scenario.
///
/// Counters, enabled flags and timers persist for the whole run; received broadcasts only
/// for one processing loop. Owned by the processor, lent to the verifier and the action
/// executor for each call.
#[derive(Debug, Default)]
pub struct ProcessingState {
    counters: HashMap<String, i64>,
    events: HashMap<EventId, EventFlags>,
    timers: HashMap<ConditionId, Instant>,
    broadcasts: HashSet<String>,
}

#[derive(Debug, Clone, Copy)]
struct EventFlags {
    is_image: bool,
    enabled: bool,
}

impl ProcessingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)populate the state for a new run.
    /// - enabled flags from each event's `enabled_on_start`
    /// - every counter in `counter_names` at 0
    /// - every timer condition armed at `now + duration`
    pub fn on_start<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
        counter_names: impl IntoIterator<Item = String>,
        now: Instant,
    ) {
        self.on_stop();

        for event in events {
            self.events.insert(
                event.id,
                EventFlags {
                    is_image: event.is_image(),
                    enabled: event.enabled_on_start,
                },
            );
            for condition in &event.conditions {
                if let ConditionKind::OnTimerReached { duration_ms, .. } = condition.kind {
                    self.arm_timer(condition.id, now, Duration::from_millis(duration_ms));
                }
            }
        }
        for name in counter_names {
            self.counters.insert(name, 0);
        }

        debug!(
            target: "autotap::state",
            events = self.events.len(),
            counters = self.counters.len(),
            timers = self.timers.len(),
            "Processing state initialized"
        );
    }

    /// Release everything.
    pub fn on_stop(&mut self) {
        self.counters.clear();
        self.events.clear();
        self.timers.clear();
        self.broadcasts.clear();
    }

    // --- Counters ---

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(name).copied()
    }

    /// Set a counter, creating it if needed. Returns the previous value.
    pub fn set_counter(&mut self, name: &str, value: i64) -> Option<i64> {
        trace!(target: "autotap::state", counter = name, value, "set_counter");
        self.counters.insert(name.to_string(), value)
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, i64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    // --- Events ---

    pub fn is_event_enabled(&self, id: EventId) -> bool {
        self.events.get(&id).is_some_and(|f| f.enabled)
    }

    /// Ids of every known event.
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.keys().copied()
    }

    pub fn enable_event(&mut self, id: EventId) -> Option<bool> {
        self.apply_toggle(id, ToggleOperation::Enable)
    }

    pub fn disable_event(&mut self, id: EventId) -> Option<bool> {
        self.apply_toggle(id, ToggleOperation::Disable)
    }

    pub fn toggle_event(&mut self, id: EventId) -> Option<bool> {
        self.apply_toggle(id, ToggleOperation::Toggle)
    }

    /// Apply `op` to a known event and return its new enabled value.
    /// Unknown events are ignored.
    pub fn apply_toggle(&mut self, id: EventId, op: ToggleOperation) -> Option<bool> {
        let flags = self.events.get_mut(&id)?;
        flags.enabled = match op {
            ToggleOperation::Enable => true,
            ToggleOperation::Disable => false,
            ToggleOperation::Toggle => !flags.enabled,
        };
        trace!(target: "autotap::state", event_id = id.0, enabled = flags.enabled, "event state");
        Some(flags.enabled)
    }

    pub fn enable_all(&mut self) {
        self.apply_toggle_all(ToggleOperation::Enable);
    }

    pub fn disable_all(&mut self) {
        self.apply_toggle_all(ToggleOperation::Disable);
    }

    pub fn toggle_all(&mut self) {
        self.apply_toggle_all(ToggleOperation::Toggle);
    }

    pub fn apply_toggle_all(&mut self, op: ToggleOperation) {
        for flags in self.events.values_mut() {
            flags.enabled = match op {
                ToggleOperation::Enable => true,
                ToggleOperation::Disable => false,
                ToggleOperation::Toggle => !flags.enabled,
            };
        }
    }

    pub fn are_all_events_disabled(&self) -> bool {
        self.events.values().all(|f| !f.enabled)
    }

    pub fn are_all_image_events_disabled(&self) -> bool {
        self.events.values().filter(|f| f.is_image).all(|f| !f.enabled)
    }

    pub fn are_all_trigger_events_disabled(&self) -> bool {
        self.events.values().filter(|f| !f.is_image).all(|f| !f.enabled)
    }

    // --- Timers ---

    pub fn arm_timer(&mut self, id: ConditionId, now: Instant, duration: Duration) {
        self.timers.insert(id, now + duration);
    }

    pub fn disarm_timer(&mut self, id: ConditionId) {
        self.timers.remove(&id);
    }

    pub fn timer_end(&self, id: ConditionId) -> Option<Instant> {
        self.timers.get(&id).copied()
    }

    // --- Broadcasts ---

    pub fn mark_broadcast_received(&mut self, action: &str) {
        self.broadcasts.insert(action.to_string());
    }

    pub fn was_broadcast_received(&self, action: &str) -> bool {
        self.broadcasts.contains(action)
    }

    /// Reset the values only valid for one processing loop.
    pub fn clear_iteration_state(&mut self) {
        self.broadcasts.clear();
    }
}
