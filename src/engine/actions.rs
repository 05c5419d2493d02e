use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::listener::ProcessingListener;
use super::results::ConditionsResults;
use super::state::ProcessingState;
use super::unblock::UnblockGestureScheduler;
use super::verifier::operand_value;
use crate::config::{
    Action, ClickPosition, ConditionOperator, CounterOperation, Event, NotificationMessage,
    Point, ProcessingSettings, ToggleTarget,
};
use crate::device::{DeviceExecutor, Gesture, IntentRequest, NotificationRequest};
use crate::error::EngineError;
use crate::utils::random::{Jitter, maybe_duration, maybe_point};

/// Wait after sending a broadcast.
pub const BROADCAST_COOLDOWN: Duration = Duration::from_millis(100);
/// Wait after starting an activity.
pub const START_ACTIVITY_COOLDOWN: Duration = Duration::from_millis(1000);

/// Runs the actions of fulfilled events, one after the other.
pub struct ActionExecutor {
    device: Arc<dyn DeviceExecutor>,
    jitter: Option<Jitter>,
    unblock: Option<UnblockGestureScheduler>,
    listener: Option<Arc<dyn ProcessingListener>>,
}

impl ActionExecutor {
    pub fn new(device: Arc<dyn DeviceExecutor>, settings: &ProcessingSettings, now: Instant) -> Self {
        let mut executor = Self {
            device,
            jitter: None,
            unblock: None,
            listener: None,
        };
        executor.reset(settings, now);
        executor
    }

    /// Rebuild the jitter and restart the unblock scheduler for a new session.
    pub fn reset(&mut self, settings: &ProcessingSettings, now: Instant) {
        self.jitter = settings
            .randomize
            .then(|| Jitter::new(&settings.randomization));
        self.unblock = UnblockGestureScheduler::new(&settings.unblock, now);
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn ProcessingListener>>) {
        self.listener = listener;
    }

    pub fn device(&self) -> &Arc<dyn DeviceExecutor> {
        &self.device
    }

    /// Execute the actions of `event` in order, awaiting each one.
    ///
    /// Device failures abort the remaining actions. Actions without a target (no detected
    /// position, unset counter) are skipped.
    pub async fn execute_actions(
        &mut self,
        state: &mut ProcessingState,
        event: &Event,
        results: &ConditionsResults,
    ) -> Result<(), EngineError> {
        for (index, action) in event.actions.iter().enumerate() {
            debug!(
                target: "autotap::actions",
                event_id = event.id.0,
                action_index = index,
                action = action.kind_name(),
                "Executing action"
            );
            self.execute_action(state, event, results, action).await?;
        }
        Ok(())
    }

    /// Called once at the end of every processing loop.
    pub async fn on_scenario_loop_finished(&mut self) -> Result<(), EngineError> {
        let due = self
            .unblock
            .as_mut()
            .is_some_and(|s| s.on_loop_finished(Instant::now()));
        if due {
            trace!(target: "autotap::actions", "Injecting unblock gesture");
            self.device
                .execute_gesture(UnblockGestureScheduler::gesture())
                .await
                .map_err(EngineError::dispatch("unblock gesture"))?;
        }
        Ok(())
    }

    async fn execute_action(
        &mut self,
        state: &mut ProcessingState,
        event: &Event,
        results: &ConditionsResults,
        action: &Action,
    ) -> Result<(), EngineError> {
        match action {
            Action::Click {
                position,
                press_duration_ms,
            } => {
                let Some(target) = click_target(event, results, position) else {
                    warn!(
                        target: "autotap::actions",
                        event_id = event.id.0,
                        "No position to click on; action skipped"
                    );
                    return Ok(());
                };
                let at = maybe_point(self.jitter.as_mut(), target);
                let duration = maybe_duration(self.jitter.as_mut(), *press_duration_ms);
                self.gesture(Gesture::tap(at, duration)).await
            }

            Action::Swipe {
                from,
                to,
                duration_ms,
            } => {
                let from = maybe_point(self.jitter.as_mut(), *from);
                let to = maybe_point(self.jitter.as_mut(), *to);
                let duration = maybe_duration(self.jitter.as_mut(), *duration_ms);
                self.gesture(Gesture::line(from, to, duration)).await
            }

            Action::Pause { duration_ms } => {
                tokio::time::sleep(maybe_duration(self.jitter.as_mut(), *duration_ms)).await;
                Ok(())
            }

            Action::Intent {
                is_broadcast,
                action: intent_action,
                component,
                flags,
                extras,
            } => {
                let intent = IntentRequest {
                    action: intent_action.clone(),
                    component: component.clone(),
                    flags: *flags,
                    extras: extras
                        .iter()
                        .map(|e| (e.key.clone(), e.value.clone()))
                        .collect(),
                };
                if *is_broadcast {
                    self.device
                        .execute_send_broadcast(intent)
                        .await
                        .map_err(EngineError::dispatch("broadcast"))?;
                    tokio::time::sleep(BROADCAST_COOLDOWN).await;
                } else {
                    self.device
                        .execute_start_activity(intent)
                        .await
                        .map_err(EngineError::dispatch("start activity"))?;
                    tokio::time::sleep(START_ACTIVITY_COOLDOWN).await;
                }
                Ok(())
            }

            Action::ToggleEvent { target } => {
                self.toggle_events(state, target);
                Ok(())
            }

            Action::ChangeCounter {
                counter,
                operation,
                value,
            } => {
                // An unset target is left alone rather than created from 0.
                let Some(current) = state.counter(counter) else {
                    warn!(
                        target: "autotap::actions",
                        counter = %counter,
                        "Counter not set; change ignored"
                    );
                    return Ok(());
                };
                let operand = operand_value(state, value);
                let updated = match operation {
                    CounterOperation::Add => current.saturating_add(operand),
                    CounterOperation::Minus => current.saturating_sub(operand),
                    CounterOperation::Set => operand,
                };
                let previous = state.set_counter(counter, updated);
                if let Some(listener) = &self.listener {
                    listener.on_counter_value_changed(counter, previous, updated);
                }
                Ok(())
            }

            Action::Notification {
                title,
                message,
                importance,
            } => {
                let message = match message {
                    NotificationMessage::Text { text } => text.clone(),
                    NotificationMessage::CounterValue { counter } => match state.counter(counter) {
                        Some(value) => format!("{counter} = {value}"),
                        None => {
                            warn!(
                                target: "autotap::actions",
                                counter = %counter,
                                "Counter not set; notification skipped"
                            );
                            return Ok(());
                        }
                    },
                };
                let request = NotificationRequest {
                    event_id: event.id.0,
                    group: event.name.clone(),
                    title: title.clone().unwrap_or_else(|| event.name.clone()),
                    message,
                    importance: *importance,
                };
                self.device
                    .execute_notification(request)
                    .await
                    .map_err(EngineError::dispatch("notification"))
            }
        }
    }

    async fn gesture(&self, gesture: Gesture) -> Result<(), EngineError> {
        self.device
            .execute_gesture(gesture)
            .await
            .map_err(EngineError::dispatch("gesture"))
    }

    fn toggle_events(&self, state: &mut ProcessingState, target: &ToggleTarget) {
        match target {
            ToggleTarget::All { operation } => {
                state.apply_toggle_all(*operation);
                if let Some(listener) = &self.listener {
                    for id in state.event_ids() {
                        listener.on_event_state_changed(id, state.is_event_enabled(id));
                    }
                }
            }
            ToggleTarget::Events { toggles } => {
                for toggle in toggles {
                    match state.apply_toggle(toggle.event_id, toggle.operation) {
                        Some(enabled) => {
                            if let Some(listener) = &self.listener {
                                listener.on_event_state_changed(toggle.event_id, enabled);
                            }
                        }
                        None => warn!(
                            target: "autotap::actions",
                            event_id = toggle.event_id.0,
                            "Unknown event; toggle ignored"
                        ),
                    }
                }
            }
        }
    }
}

/// Point targeted by a click, before jitter.
///
/// With `Or`, the first condition both fulfilled and detected is used; with `And`, the
/// referenced condition.
fn click_target(
    event: &Event,
    results: &ConditionsResults,
    position: &ClickPosition,
) -> Option<Point> {
    match position {
        ClickPosition::UserSelected { point } => Some(*point),
        ClickPosition::OnDetectedCondition {
            condition_id,
            offset,
        } => {
            let detected = match event.operator {
                ConditionOperator::Or => results.first_detected_position(),
                ConditionOperator::And => condition_id
                    .and_then(|id| results.get(id))
                    .and_then(|r| r.detected_position()),
            };
            detected.map(|p| p.offset(*offset))
        }
    }
}
