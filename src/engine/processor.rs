use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::actions::ActionExecutor;
use super::listener::ProcessingListener;
use super::state::ProcessingState;
use super::verifier::ConditionsVerifier;
use crate::config::{Event, Scenario};
use crate::device::{BitmapSupplier, Detector, DeviceExecutor, ScreenFrame, ScreenSize};
use crate::error::EngineError;

/// What the caller should do after a `process` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Hand over the next frame.
    Continue,
    /// Every event is disabled; the scenario is over.
    StopRequested,
}

/// Processes the frames of one running scenario.
///
/// For each frame, trigger events are verified first (in priority order), then image
/// events against the frame. The actions of a fulfilled event run before the next event
/// is verified.
pub struct ScenarioProcessor<D, B> {
    scenario: Scenario,
    trigger_events: Vec<Event>,
    image_events: Vec<Event>,
    state: ProcessingState,
    verifier: ConditionsVerifier<D, B>,
    actions: ActionExecutor,
    listener: Option<Arc<dyn ProcessingListener>>,
    cancel: CancellationToken,
    screen_size: Option<ScreenSize>,
    stop_reported: bool,
}

impl<D, B> ScenarioProcessor<D, B>
where
    D: Detector,
    B: BitmapSupplier<Bitmap = D::Bitmap>,
{
    pub fn new(scenario: Scenario, detector: D, bitmaps: B, device: Arc<dyn DeviceExecutor>) -> Self {
        let (mut image_events, mut trigger_events): (Vec<Event>, Vec<Event>) =
            scenario.events.iter().cloned().partition(Event::is_image);
        image_events.sort_by_key(|e| e.priority);
        trigger_events.sort_by_key(|e| e.priority);

        let actions = ActionExecutor::new(device, &scenario.settings, Instant::now());
        Self {
            scenario,
            trigger_events,
            image_events,
            state: ProcessingState::new(),
            verifier: ConditionsVerifier::new(detector, bitmaps),
            actions,
            listener: None,
            cancel: CancellationToken::new(),
            screen_size: None,
            stop_reported: false,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProcessingListener>) -> Self {
        self.verifier.set_listener(Some(listener.clone()));
        self.actions.set_listener(Some(listener.clone()));
        self.listener = Some(listener);
        self
    }

    /// Token cancelling the processing at its next yield point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn detector(&self) -> &D {
        self.verifier.detector()
    }

    /// Start a new session: reset the device and the processing state.
    ///
    /// A token cancelled during a previous session is replaced; fetch
    /// [`cancellation_token`](Self::cancellation_token) again after restarting.
    pub fn on_scenario_start(&mut self) {
        let now = Instant::now();
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.actions.device().clear_state();
        self.state.on_start(
            &self.scenario.events,
            self.scenario.counter_names(),
            now,
        );
        self.actions.reset(&self.scenario.settings, now);
        self.screen_size = None;
        self.stop_reported = false;

        if let Some(listener) = &self.listener {
            listener.on_session_started(&self.scenario);
        }
        info!(
            target: "autotap::processor",
            scenario = %self.scenario.name,
            image_events = self.image_events.len(),
            trigger_events = self.trigger_events.len(),
            "Scenario started"
        );
    }

    pub fn on_scenario_stop(&mut self) {
        self.state.on_stop();
        if let Some(listener) = &self.listener {
            listener.on_session_ended();
        }
        info!(target: "autotap::processor", scenario = %self.scenario.name, "Scenario stopped");
    }

    /// Force the detector metrics to be recomputed on the next frame.
    pub fn invalidate_screen_metrics(&mut self) {
        self.screen_size = None;
    }

    /// Record a broadcast, visible to trigger events until the end of the next loop.
    pub fn on_broadcast_received(&mut self, action: &str) {
        trace!(target: "autotap::processor", %action, "Broadcast received");
        self.state.mark_broadcast_received(action);
    }

    /// Process one frame.
    pub async fn process(&mut self, frame: &D::Frame) -> Result<ProcessOutcome, EngineError> {
        if self.state.are_all_events_disabled() {
            if !self.stop_reported {
                info!(
                    target: "autotap::processor",
                    scenario = %self.scenario.name,
                    "All events are disabled; stop requested"
                );
                self.stop_reported = true;
            }
            return Ok(ProcessOutcome::StopRequested);
        }

        let triggers = if self.state.are_all_trigger_events_disabled() {
            Ok(())
        } else {
            self.process_trigger_events().await
        };

        // Broadcasts are only visible to this loop's trigger events, even when one failed.
        self.state.clear_iteration_state();
        triggers?;

        if !self.state.are_all_image_events_disabled() {
            let size = frame.size();
            if self.screen_size != Some(size) {
                debug!(
                    target: "autotap::processor",
                    width = size.width, height = size.height,
                    "Screen metrics updated"
                );
                self.verifier
                    .detector_mut()
                    .set_metrics(frame, self.scenario.settings.detection_quality);
                self.screen_size = Some(size);
            }
            self.verifier.detector_mut().set_screen_frame(frame);

            if let Some(listener) = &self.listener {
                listener.on_image_events_processing_started();
            }
            match self.process_image_events().await {
                Ok(()) => {
                    if let Some(listener) = &self.listener {
                        listener.on_image_events_processing_completed();
                    }
                }
                Err(err) => {
                    if let (EngineError::Cancelled, Some(listener)) = (&err, &self.listener) {
                        listener.on_image_events_processing_cancelled();
                    }
                    return Err(err);
                }
            }
        }

        self.actions.on_scenario_loop_finished().await?;
        Ok(ProcessOutcome::Continue)
    }

    async fn process_trigger_events(&mut self) -> Result<(), EngineError> {
        let Self {
            trigger_events,
            state,
            verifier,
            actions,
            listener,
            cancel,
            ..
        } = self;

        for event in trigger_events.iter() {
            // An earlier trigger of this loop may have disabled it.
            if !state.is_event_enabled(event.id) || event.conditions.is_empty() {
                continue;
            }
            if let Some(listener) = listener.as_deref() {
                listener.on_trigger_event_processing_started(event);
            }

            let results = verifier
                .verify_conditions(state, event.operator, &event.conditions, cancel)
                .await?;
            if results.is_fulfilled() {
                debug!(target: "autotap::processor", event_id = event.id.0, "Trigger event fulfilled");
                if let Some(listener) = listener.as_deref() {
                    listener.on_trigger_event_fulfilled(event, &results);
                }
                actions.execute_actions(state, event, &results).await?;
            }
        }
        Ok(())
    }

    async fn process_image_events(&mut self) -> Result<(), EngineError> {
        let Self {
            image_events,
            state,
            verifier,
            actions,
            listener,
            cancel,
            ..
        } = self;

        for (index, event) in image_events.iter().enumerate() {
            if state.is_event_enabled(event.id) && !event.conditions.is_empty() {
                if let Some(listener) = listener.as_deref() {
                    listener.on_image_event_processing_started(event);
                }

                let results = verifier
                    .verify_conditions(state, event.operator, &event.conditions, cancel)
                    .await?;
                if results.is_fulfilled() {
                    debug!(target: "autotap::processor", event_id = event.id.0, "Image event fulfilled");
                    if let Some(listener) = listener.as_deref() {
                        listener.on_image_event_fulfilled(event, &results);
                    }
                    actions.execute_actions(state, event, &results).await?;

                    if !event.keep_detecting() {
                        break;
                    }
                }
            }

            if index + 1 < image_events.len() {
                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Action, ClickPosition, ComparisonOperation, ConditionId, CounterOperand, CounterOperation,
        EventId, EventKind, EventToggle, Point, ToggleOperation, ToggleTarget,
    };
    use crate::device::{Gesture, PathBitmapSupplier, RecordedFrame, ReplayDetector};
    use crate::engine::listener::DebugRecorder;
    use crate::testing::{
        RecordingExecutor, broadcast_condition, counter_condition, image_condition, image_event,
        trigger_event,
    };
    use std::time::Duration;

    type Processor = ScenarioProcessor<ReplayDetector, PathBitmapSupplier>;

    fn click_at(x: i32, y: i32) -> Action {
        Action::Click {
            position: ClickPosition::UserSelected {
                point: Point::new(x, y),
            },
            press_duration_ms: 1,
        }
    }

    fn tap(x: i32, y: i32) -> Gesture {
        Gesture::tap(Point::new(x, y), Duration::from_millis(1))
    }

    fn clicking_image_event(id: u64, priority: i32, keep_detecting: bool, x: i32) -> Event {
        let mut event = image_event(id, vec![image_condition(id * 10, "target.png")]);
        event.priority = priority;
        event.kind = EventKind::Image { keep_detecting };
        event.actions = vec![click_at(x, x)];
        event
    }

    fn started(events: Vec<Event>, device: &Arc<RecordingExecutor>) -> Processor {
        let scenario = Scenario {
            name: "test".into(),
            events,
            ..Default::default()
        };
        let mut p = ScenarioProcessor::new(
            scenario,
            ReplayDetector::new(),
            PathBitmapSupplier::new(None),
            device.clone(),
        );
        p.on_scenario_start();
        p
    }

    fn frame() -> RecordedFrame {
        RecordedFrame::new(1080, 1920).with_image("target.png", 50, 50, 1.0)
    }

    #[tokio::test]
    async fn first_fulfilled_image_event_stops_the_pass() {
        let device = RecordingExecutor::new();
        let mut p = started(
            vec![
                clicking_image_event(2, 1, false, 2),
                clicking_image_event(1, 0, false, 1),
            ],
            &device,
        );
        assert_eq!(p.process(&frame()).await.unwrap(), ProcessOutcome::Continue);
        assert_eq!(device.gestures(), vec![tap(1, 1)]);
    }

    #[tokio::test]
    async fn keep_detecting_continues_with_lower_priorities() {
        let device = RecordingExecutor::new();
        let mut p = started(
            vec![
                clicking_image_event(1, 0, true, 1),
                clicking_image_event(2, 1, false, 2),
                clicking_image_event(3, 2, false, 3),
            ],
            &device,
        );
        p.process(&frame()).await.unwrap();
        assert_eq!(device.gestures(), vec![tap(1, 1), tap(2, 2)]);
    }

    #[tokio::test]
    async fn all_disabled_requests_stop_without_verifying() {
        let device = RecordingExecutor::new();
        let recorder = Arc::new(DebugRecorder::new());
        let mut event = clicking_image_event(1, 0, false, 1);
        event.enabled_on_start = false;
        let mut p = started(vec![event], &device).with_listener(recorder.clone());

        assert_eq!(p.process(&frame()).await.unwrap(), ProcessOutcome::StopRequested);
        assert_eq!(p.process(&frame()).await.unwrap(), ProcessOutcome::StopRequested);
        assert!(recorder.report().events.is_empty());
        assert_eq!(p.detector().metrics_updates(), 0);
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn metrics_are_cached_per_screen_size() {
        let device = RecordingExecutor::new();
        let mut p = started(vec![clicking_image_event(1, 0, false, 1)], &device);

        p.process(&frame()).await.unwrap();
        p.process(&frame()).await.unwrap();
        assert_eq!(p.detector().metrics_updates(), 1);

        p.process(&RecordedFrame::new(720, 1280)).await.unwrap();
        assert_eq!(p.detector().metrics_updates(), 2);

        p.invalidate_screen_metrics();
        p.process(&RecordedFrame::new(720, 1280)).await.unwrap();
        assert_eq!(p.detector().metrics_updates(), 3);
        assert_eq!(p.detector().quality(), Some(1200));
    }

    #[tokio::test]
    async fn trigger_disabled_earlier_in_the_loop_is_skipped() {
        let device = RecordingExecutor::new();
        let mut first = trigger_event(1, vec![broadcast_condition(10, "go")]);
        first.actions = vec![Action::ToggleEvent {
            target: ToggleTarget::Events {
                toggles: vec![EventToggle {
                    event_id: EventId(2),
                    operation: ToggleOperation::Disable,
                }],
            },
        }];
        let mut second = trigger_event(2, vec![broadcast_condition(20, "go")]);
        second.priority = 1;
        second.actions = vec![Action::ChangeCounter {
            counter: "runs".into(),
            operation: CounterOperation::Add,
            value: CounterOperand::Number(1),
        }];
        let mut p = started(vec![second, first], &device);

        p.on_broadcast_received("go");
        p.process(&RecordedFrame::new(10, 10)).await.unwrap();
        assert_eq!(p.state().counter("runs"), Some(0));
        assert!(!p.state().is_event_enabled(EventId(2)));
    }

    #[tokio::test]
    async fn broadcasts_last_one_loop() {
        let device = RecordingExecutor::new();
        let mut event = trigger_event(1, vec![broadcast_condition(10, "go")]);
        event.actions = vec![Action::ChangeCounter {
            counter: "runs".into(),
            operation: CounterOperation::Add,
            value: CounterOperand::Number(1),
        }];
        let mut p = started(vec![event], &device);

        p.on_broadcast_received("go");
        p.process(&RecordedFrame::new(10, 10)).await.unwrap();
        p.process(&RecordedFrame::new(10, 10)).await.unwrap();
        assert_eq!(p.state().counter("runs"), Some(1));
    }

    #[tokio::test]
    async fn broadcasts_are_cleared_when_a_trigger_action_fails() {
        let device = RecordingExecutor::new();
        let mut event = trigger_event(1, vec![broadcast_condition(10, "go")]);
        event.actions = vec![click_at(3, 3)];
        let mut p = started(vec![event], &device);

        device.set_failing(true);
        p.on_broadcast_received("go");
        let err = p.process(&RecordedFrame::new(10, 10)).await.unwrap_err();
        assert!(matches!(err, EngineError::Dispatch { .. }));
        assert!(!p.state().was_broadcast_received("go"));

        device.set_failing(false);
        p.process(&RecordedFrame::new(10, 10)).await.unwrap();
        assert!(device.gestures().is_empty());
    }

    #[tokio::test]
    async fn extreme_click_offset_saturates() {
        let device = RecordingExecutor::new();
        let mut event = clicking_image_event(1, 0, false, 1);
        event.actions = vec![Action::Click {
            position: ClickPosition::OnDetectedCondition {
                condition_id: Some(ConditionId(10)),
                offset: Point::new(i32::MAX, 0),
            },
            press_duration_ms: 1,
        }];
        let mut p = started(vec![event], &device);

        p.process(&frame()).await.unwrap();
        assert_eq!(device.gestures(), vec![tap(i32::MAX, 50)]);
    }

    #[tokio::test]
    async fn restarted_session_gets_a_fresh_token() {
        let device = RecordingExecutor::new();
        let mut p = started(
            vec![
                clicking_image_event(1, 0, true, 1),
                clicking_image_event(2, 1, true, 2),
            ],
            &device,
        );
        p.cancellation_token().cancel();
        assert!(matches!(p.process(&frame()).await, Err(EngineError::Cancelled)));

        p.on_scenario_stop();
        p.on_scenario_start();
        assert!(!p.cancellation_token().is_cancelled());
        assert_eq!(p.process(&frame()).await.unwrap(), ProcessOutcome::Continue);
    }

    #[tokio::test]
    async fn counter_trigger_disabling_itself_requests_stop() {
        let device = RecordingExecutor::new();
        let mut event = trigger_event(
            1,
            vec![counter_condition(
                10,
                "runs",
                ComparisonOperation::GreaterOrEquals,
                CounterOperand::Number(0),
            )],
        );
        event.actions = vec![Action::ToggleEvent {
            target: ToggleTarget::All {
                operation: ToggleOperation::Disable,
            },
        }];
        let mut p = started(vec![event], &device);

        assert_eq!(p.process(&RecordedFrame::new(1, 1)).await.unwrap(), ProcessOutcome::Continue);
        assert_eq!(
            p.process(&RecordedFrame::new(1, 1)).await.unwrap(),
            ProcessOutcome::StopRequested
        );
    }

    #[tokio::test]
    async fn start_clears_the_device_state() {
        let device = RecordingExecutor::new();
        let mut p = started(vec![clicking_image_event(1, 0, false, 1)], &device);
        assert_eq!(device.clear_count(), 1);
        p.on_scenario_stop();
        p.on_scenario_start();
        assert_eq!(device.clear_count(), 2);
    }

    #[tokio::test]
    async fn dispatch_errors_end_the_loop() {
        let device = RecordingExecutor::new();
        device.set_failing(true);
        let mut p = started(vec![clicking_image_event(1, 0, false, 1)], &device);
        let err = p.process(&frame()).await.unwrap_err();
        assert!(matches!(err, EngineError::Dispatch { .. }));
        assert!(!err.is_configuration());
    }

    #[tokio::test]
    async fn cancellation_between_image_events() {
        let device = RecordingExecutor::new();
        let recorder = Arc::new(DebugRecorder::new());
        let mut p = started(
            vec![
                clicking_image_event(1, 0, true, 1),
                clicking_image_event(2, 1, true, 2),
            ],
            &device,
        )
        .with_listener(recorder.clone());
        p.cancellation_token().cancel();

        let err = p.process(&frame()).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(device.gestures(), vec![tap(1, 1)]);
        assert_eq!(recorder.report().image_event_fulfilled_count, 1);
    }
}
