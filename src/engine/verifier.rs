use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::listener::ProcessingListener;
use super::results::{ConditionResult, ConditionsResults};
use super::state::ProcessingState;
use crate::config::{
    Condition, ConditionId, ConditionKind, ConditionOperator, CounterOperand, DetectionType,
    ImageCondition, Rect, TextCondition,
};
use crate::device::{BitmapSupplier, DetectionResult, Detector};
use crate::error::EngineError;

/// Evaluates condition lists under an operator, short-circuiting on the first decisive
/// condition.
pub struct ConditionsVerifier<D, B> {
    detector: D,
    bitmaps: B,
    listener: Option<Arc<dyn ProcessingListener>>,
}

impl<D, B> ConditionsVerifier<D, B>
where
    D: Detector,
    B: BitmapSupplier<Bitmap = D::Bitmap>,
{
    pub fn new(detector: D, bitmaps: B) -> Self {
        Self {
            detector,
            bitmaps,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn ProcessingListener>>) {
        self.listener = listener;
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Verify `conditions` in order.
    ///
    /// With `Or`, the first fulfilled condition ends the pass with a true verdict; with
    /// `And`, the first unfulfilled one ends it with a false verdict. Conditions after the
    /// decisive one get no result. Timer conditions all see the same "now".
    pub async fn verify_conditions(
        &mut self,
        state: &mut ProcessingState,
        operator: ConditionOperator,
        conditions: &[Condition],
        cancel: &CancellationToken,
    ) -> Result<ConditionsResults, EngineError> {
        let mut results = ConditionsResults::new();
        let now = Instant::now();

        for (index, condition) in conditions.iter().enumerate() {
            let result = self.verify_condition(state, condition, now).await?;
            trace!(
                target: "autotap::verifier",
                condition_id = condition.id.0,
                fulfilled = result.is_fulfilled(),
                "condition verified"
            );
            if condition.is_screen_condition() {
                if let Some(listener) = &self.listener {
                    listener.on_image_condition_processed(condition, &result);
                }
            }
            results.add_result(condition.id, result);

            match (operator, result.is_fulfilled()) {
                (ConditionOperator::Or, true) => {
                    results.set_fulfilled(true);
                    return Ok(results);
                }
                (ConditionOperator::And, false) => {
                    results.set_fulfilled(false);
                    return Ok(results);
                }
                _ => {}
            }

            if index + 1 < conditions.len() {
                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
            }
        }

        results.set_fulfilled(operator == ConditionOperator::And);
        Ok(results)
    }

    async fn verify_condition(
        &mut self,
        state: &mut ProcessingState,
        condition: &Condition,
        now: Instant,
    ) -> Result<ConditionResult, EngineError> {
        let result = match &condition.kind {
            ConditionKind::Image(image) => self.verify_image(condition.id, image).await?,
            ConditionKind::Text(text) => self.verify_text(condition.id, text)?,
            ConditionKind::OnBroadcastReceived { action } => ConditionResult::Trigger {
                fulfilled: state.was_broadcast_received(action),
            },
            ConditionKind::OnCounterReached {
                counter,
                comparison,
                value,
            } => {
                let fulfilled = match state.counter(counter) {
                    Some(current) => comparison.compare(current, operand_value(state, value)),
                    None => {
                        trace!(target: "autotap::verifier", counter = %counter, "counter not set");
                        false
                    }
                };
                ConditionResult::Trigger { fulfilled }
            }
            ConditionKind::OnTimerReached {
                duration_ms,
                restart_when_reached,
            } => {
                let fulfilled = state.timer_end(condition.id).is_some_and(|end| now > end);
                if fulfilled {
                    if *restart_when_reached {
                        state.arm_timer(condition.id, now, Duration::from_millis(*duration_ms));
                    } else {
                        state.disarm_timer(condition.id);
                    }
                }
                ConditionResult::Trigger { fulfilled }
            }
        };
        Ok(result)
    }

    async fn verify_image(
        &mut self,
        id: ConditionId,
        image: &ImageCondition,
    ) -> Result<ConditionResult, EngineError> {
        let area = detection_area(id, image.area, image.detection)?;
        let Some(bitmap) = self.bitmaps.load(image).await else {
            // Not fulfilled whatever the polarity: an absent reference proves nothing.
            warn!(
                target: "autotap::verifier",
                condition_id = id.0,
                path = %image.path,
                "No bitmap for condition; not detected and not fulfilled"
            );
            return Ok(ConditionResult::Screen {
                fulfilled: false,
                was_detected: false,
                position: None,
                confidence: 0.0,
            });
        };
        let detection = self.detector.detect(&bitmap, area, image.threshold);
        Ok(screen_result(detection, image.should_be_detected))
    }

    fn verify_text(
        &mut self,
        id: ConditionId,
        text: &TextCondition,
    ) -> Result<ConditionResult, EngineError> {
        let area = detection_area(id, text.area, text.detection)?;
        let detection = self
            .detector
            .detect_text(&text.text, &text.language, area, text.threshold);
        Ok(screen_result(detection, text.should_be_detected))
    }
}

/// Search area for a screen condition. `None` means the whole screen.
fn detection_area(
    id: ConditionId,
    area: Rect,
    detection: DetectionType,
) -> Result<Option<Rect>, EngineError> {
    match detection {
        DetectionType::Exact => Ok(Some(area)),
        DetectionType::WholeScreen => Ok(None),
        DetectionType::InArea { area: Some(area) } => Ok(Some(area)),
        DetectionType::InArea { area: None } => Err(EngineError::InvalidCondition {
            condition: id,
            reason: "in_area detection without an area".to_string(),
        }),
    }
}

fn screen_result(detection: DetectionResult, should_be_detected: bool) -> ConditionResult {
    ConditionResult::Screen {
        fulfilled: detection.is_detected == should_be_detected,
        was_detected: detection.is_detected,
        position: detection.position,
        confidence: detection.confidence,
    }
}

/// Value of a counter operand; an unset counter reads as 0.
pub(crate) fn operand_value(state: &ProcessingState, operand: &CounterOperand) -> i64 {
    match operand {
        CounterOperand::Number(n) => *n,
        CounterOperand::Counter(name) => state.counter(name).unwrap_or(0),
    }
}
