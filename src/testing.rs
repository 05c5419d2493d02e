//! Builders and a recording device for unit tests.

use anyhow::bail;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{
    ComparisonOperation, Condition, ConditionId, ConditionKind, ConditionOperator, CounterOperand,
    DetectionType, Event, EventId, EventKind, ImageCondition, Rect, TextCondition,
};
use crate::device::{DeviceExecutor, Gesture, IntentRequest, NotificationRequest};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DeviceCall {
    Gesture(Gesture),
    StartActivity(IntentRequest),
    SendBroadcast(IntentRequest),
    Notification(NotificationRequest),
}

/// Records every call; fails them all while `failing` is set.
#[derive(Debug, Default)]
pub(crate) struct RecordingExecutor {
    calls: Mutex<Vec<DeviceCall>>,
    failing: AtomicBool,
    clears: AtomicUsize,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn gestures(&self) -> Vec<Gesture> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Gesture(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    fn record(&self, call: DeviceCall) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("device unavailable");
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl DeviceExecutor for RecordingExecutor {
    async fn execute_gesture(&self, gesture: Gesture) -> anyhow::Result<()> {
        self.record(DeviceCall::Gesture(gesture))
    }

    async fn execute_start_activity(&self, intent: IntentRequest) -> anyhow::Result<()> {
        self.record(DeviceCall::StartActivity(intent))
    }

    async fn execute_send_broadcast(&self, intent: IntentRequest) -> anyhow::Result<()> {
        self.record(DeviceCall::SendBroadcast(intent))
    }

    async fn execute_notification(&self, request: NotificationRequest) -> anyhow::Result<()> {
        self.record(DeviceCall::Notification(request))
    }

    fn clear_state(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

fn event(id: u64, kind: EventKind, conditions: Vec<Condition>) -> Event {
    Event {
        id: EventId(id),
        name: format!("event {id}"),
        priority: 0,
        kind,
        operator: ConditionOperator::And,
        conditions,
        actions: vec![],
        enabled_on_start: true,
    }
}

pub(crate) fn image_event(id: u64, conditions: Vec<Condition>) -> Event {
    event(id, EventKind::Image { keep_detecting: false }, conditions)
}

pub(crate) fn trigger_event(id: u64, conditions: Vec<Condition>) -> Event {
    event(id, EventKind::Trigger, conditions)
}

fn condition(id: u64, kind: ConditionKind) -> Condition {
    Condition {
        id: ConditionId(id),
        name: format!("condition {id}"),
        kind,
    }
}

/// Image searched on the whole screen with the default threshold.
pub(crate) fn image_condition(id: u64, path: &str) -> Condition {
    condition(
        id,
        ConditionKind::Image(ImageCondition {
            path: path.into(),
            area: Rect::new(0, 0, 10, 10),
            detection: DetectionType::WholeScreen,
            threshold: 4,
            should_be_detected: true,
        }),
    )
}

pub(crate) fn text_condition(id: u64, text: &str) -> Condition {
    condition(
        id,
        ConditionKind::Text(TextCondition {
            text: text.into(),
            language: "eng".into(),
            area: Rect::new(0, 0, 10, 10),
            detection: DetectionType::WholeScreen,
            threshold: 4,
            should_be_detected: true,
        }),
    )
}

pub(crate) fn broadcast_condition(id: u64, action: &str) -> Condition {
    condition(
        id,
        ConditionKind::OnBroadcastReceived {
            action: action.into(),
        },
    )
}

pub(crate) fn counter_condition(
    id: u64,
    counter: &str,
    comparison: ComparisonOperation,
    value: CounterOperand,
) -> Condition {
    condition(
        id,
        ConditionKind::OnCounterReached {
            counter: counter.into(),
            comparison,
            value,
        },
    )
}

pub(crate) fn timer_condition(id: u64, duration_ms: u64, restart_when_reached: bool) -> Condition {
    condition(
        id,
        ConditionKind::OnTimerReached {
            duration_ms,
            restart_when_reached,
        },
    )
}
