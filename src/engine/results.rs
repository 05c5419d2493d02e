use crate::config::{ConditionId, Point};

/// Outcome of one condition in a verification pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConditionResult {
    /// Image or text condition.
    Screen {
        fulfilled: bool,
        was_detected: bool,
        position: Option<Point>,
        confidence: f64,
    },
    /// Broadcast, counter or timer condition.
    Trigger { fulfilled: bool },
}

impl ConditionResult {
    pub fn is_fulfilled(&self) -> bool {
        match *self {
            ConditionResult::Screen { fulfilled, .. } | ConditionResult::Trigger { fulfilled } => {
                fulfilled
            }
        }
    }

    /// Detected position of a screen condition that was both fulfilled and found on screen.
    pub fn detected_position(&self) -> Option<Point> {
        match *self {
            ConditionResult::Screen {
                fulfilled: true,
                was_detected: true,
                position,
                ..
            } => position,
            _ => None,
        }
    }
}

/// Results of one verification pass over a condition list.
///
/// Results are kept in evaluation order; conditions skipped by the short-circuit have no
/// entry. The aggregate verdict is written exactly once per pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionsResults {
    results: Vec<(ConditionId, ConditionResult)>,
    fulfilled: Option<bool>,
}

impl ConditionsResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_result(&mut self, id: ConditionId, result: ConditionResult) {
        self.results.push((id, result));
    }

    /// Set the aggregate verdict. Later writes are ignored (and trip a debug assertion).
    pub(crate) fn set_fulfilled(&mut self, fulfilled: bool) {
        debug_assert!(
            self.fulfilled.is_none(),
            "aggregate verdict written twice in the same pass"
        );
        if self.fulfilled.is_none() {
            self.fulfilled = Some(fulfilled);
        }
    }

    /// Aggregate verdict; `None` until the pass completed.
    pub fn fulfilled(&self) -> Option<bool> {
        self.fulfilled
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled == Some(true)
    }

    pub fn get(&self, id: ConditionId) -> Option<&ConditionResult> {
        self.results.iter().find(|(c, _)| *c == id).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConditionId, &ConditionResult)> {
        self.results.iter().map(|(id, r)| (*id, r))
    }

    /// Position of the first screen condition fulfilled and detected, in evaluation order.
    pub fn first_detected_position(&self) -> Option<Point> {
        self.results.iter().find_map(|(_, r)| r.detected_position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(fulfilled: bool, detected: bool, x: i32) -> ConditionResult {
        ConditionResult::Screen {
            fulfilled,
            was_detected: detected,
            position: Some(Point::new(x, x)),
            confidence: 0.9,
        }
    }

    #[test]
    fn first_detected_skips_undetected_and_unfulfilled() {
        let mut r = ConditionsResults::new();
        r.add_result(ConditionId(1), screen(true, false, 1));
        r.add_result(ConditionId(2), screen(false, true, 2));
        r.add_result(ConditionId(3), screen(true, true, 3));
        assert_eq!(r.first_detected_position(), Some(Point::new(3, 3)));
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn aggregate_unset_until_written() {
        let mut r = ConditionsResults::new();
        assert_eq!(r.fulfilled(), None);
        assert!(!r.is_fulfilled());
        r.set_fulfilled(true);
        assert_eq!(r.fulfilled(), Some(true));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "written twice")]
    fn second_aggregate_write_panics_in_debug() {
        let mut r = ConditionsResults::new();
        r.set_fulfilled(false);
        r.set_fulfilled(true);
    }

    #[test]
    fn trigger_results_have_no_position() {
        let r = ConditionResult::Trigger { fulfilled: true };
        assert!(r.is_fulfilled());
        assert_eq!(r.detected_position(), None);
    }
}
