use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::collections::BTreeSet;
use std::fmt;

/// Root of an authored scenario.
///
/// This structure is intended to be deserialized from a JSON scenario file.
/// It captures everything the engine needs for one run:
/// - processing `settings` (randomization, detection quality, workarounds)
/// - the `events`, each with its conditions and ordered actions
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Scenario {
    /// Display name, used in logs and reports.
    #[serde(default)]
    pub name: String,

    /// Processing settings applied for the whole run.
    #[serde(default)]
    pub settings: ProcessingSettings,

    /// Image and trigger events. Order within a priority level is kept.
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Scenario {
    /// Find an event by id.
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Every counter name referenced by a condition or an action of this scenario.
    pub fn counter_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for event in &self.events {
            for condition in &event.conditions {
                if let ConditionKind::OnCounterReached { counter, value, .. } = &condition.kind {
                    names.insert(counter.clone());
                    if let CounterOperand::Counter(other) = value {
                        names.insert(other.clone());
                    }
                }
            }
            for action in &event.actions {
                match action {
                    Action::ChangeCounter { counter, value, .. } => {
                        names.insert(counter.clone());
                        if let CounterOperand::Counter(other) = value {
                            names.insert(other.clone());
                        }
                    }
                    Action::Notification {
                        message: NotificationMessage::CounterValue { counter },
                        ..
                    } => {
                        names.insert(counter.clone());
                    }
                    _ => {}
                }
            }
        }
        names
    }
}

/// Settings of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingSettings {
    /// Apply a small random offset to positions and durations before dispatch.
    #[serde(default)]
    pub randomize: bool,

    /// Bounds of the randomization, used only when `randomize` is set.
    #[serde(default)]
    pub randomization: RandomizationSettings,

    /// Quality hint handed to the detector when the screen metrics change.
    #[serde(default = "default_detection_quality")]
    pub detection_quality: u32,

    /// Periodic unblock gesture (workaround for input throttling on some devices).
    #[serde(default)]
    pub unblock: UnblockSettings,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            randomize: false,
            randomization: RandomizationSettings::default(),
            detection_quality: default_detection_quality(),
            unblock: UnblockSettings::default(),
        }
    }
}

/// Randomization bounds.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RandomizationSettings {
    /// Maximum offset, in pixels, applied on each axis of a gesture point.
    #[serde(default = "default_position_offset_px")]
    pub position_offset_px: i32,

    /// Maximum offset, in milliseconds, applied to press/swipe/pause durations.
    #[serde(default = "default_duration_offset_ms")]
    pub duration_offset_ms: u64,

    /// Fixed seed for reproducible runs. Seeded from the OS when omitted.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RandomizationSettings {
    fn default() -> Self {
        Self {
            position_offset_px: default_position_offset_px(),
            duration_offset_ms: default_duration_offset_ms(),
            seed: None,
        }
    }
}

/// Unblock gesture scheduling. The gesture is injected once either threshold is reached.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct UnblockSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Inject after this many processing loops.
    #[serde(default)]
    pub every_loops: Option<u32>,
    /// Inject after this many milliseconds.
    #[serde(default)]
    pub every_ms: Option<u64>,
}

/// Identifier of an event.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Identifier of a condition, unique across the scenario.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct ConditionId(pub u64);

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition#{}", self.0)
    }
}

/// An authored rule: conditions combined by an operator, and the actions to run when they hold.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub id: EventId,

    #[serde(default)]
    pub name: String,

    /// Lower runs first.
    #[serde(default)]
    pub priority: i32,

    pub kind: EventKind,

    #[serde(default)]
    pub operator: ConditionOperator,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Executed in order, one after the other.
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Initial value of the runtime enabled flag.
    #[serde(default = "default_true")]
    pub enabled_on_start: bool,
}

impl Event {
    pub fn is_image(&self) -> bool {
        matches!(self.kind, EventKind::Image { .. })
    }

    /// For image events: keep evaluating lower priority image events after this one fired.
    pub fn keep_detecting(&self) -> bool {
        match self.kind {
            EventKind::Image { keep_detecting } => keep_detecting,
            EventKind::Trigger => true,
        }
    }
}

/// Event class. Image events are evaluated against the frame, trigger events against the
/// runtime state only.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Image {
        /// When false, a fulfilled event stops the evaluation of the next image events for
        /// the current frame.
        #[serde(default)]
        keep_detecting: bool,
    },
    Trigger,
}

/// Boolean operator applied between the conditions of an event.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    And,
    Or,
}

/// A predicate of an event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Condition {
    pub id: ConditionId,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub kind: ConditionKind,
}

impl Condition {
    /// True for conditions verified on the screen frame.
    pub fn is_screen_condition(&self) -> bool {
        matches!(self.kind, ConditionKind::Image(_) | ConditionKind::Text(_))
    }
}

/// Condition variants. Use `type` to select one.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKind {
    /// A reference image searched on the frame.
    Image(ImageCondition),

    /// A text literal searched on the frame.
    Text(TextCondition),

    /// A broadcast with this action was received since the previous loop.
    OnBroadcastReceived { action: String },

    /// A counter compared to a number or to another counter.
    OnCounterReached {
        counter: String,
        comparison: ComparisonOperation,
        value: CounterOperand,
    },

    /// A timer armed at scenario start elapsed.
    OnTimerReached {
        duration_ms: u64,
        /// Re-arm the timer each time it is reached instead of disarming it.
        #[serde(default)]
        restart_when_reached: bool,
    },
}

/// Reference image condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
pub struct ImageCondition {
    /// Path of the reference image, resolved by the bitmap supplier.
    #[validate(min_length = 1)]
    pub path: String,

    /// Where the image was captured.
    pub area: Rect,

    #[serde(default)]
    pub detection: DetectionType,

    /// Difference tolerated between the reference and the frame, in percent.
    #[validate(maximum = 100)]
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// The condition is fulfilled when the detection outcome equals this value.
    #[serde(default = "default_true")]
    pub should_be_detected: bool,
}

/// Text condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
pub struct TextCondition {
    #[validate(min_length = 1)]
    pub text: String,

    #[serde(default)]
    pub language: String,

    pub area: Rect,

    #[serde(default)]
    pub detection: DetectionType,

    #[validate(maximum = 100)]
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    #[serde(default = "default_true")]
    pub should_be_detected: bool,
}

/// Where a screen condition is searched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionType {
    /// Only at the capture area of the condition.
    #[default]
    Exact,
    /// Anywhere on the screen.
    WholeScreen,
    /// Inside an explicit area.
    InArea {
        #[serde(default)]
        area: Option<Rect>,
    },
}

/// Comparison used by counter conditions.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperation {
    Equals,
    Lower,
    LowerOrEquals,
    Greater,
    GreaterOrEquals,
}

impl ComparisonOperation {
    pub fn compare(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Equals => lhs == rhs,
            Self::Lower => lhs < rhs,
            Self::LowerOrEquals => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterOrEquals => lhs >= rhs,
        }
    }
}

/// Right-hand side of a counter comparison or operation.
/// Example: `{ "number": 3 }` or `{ "counter": "lives" }`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterOperand {
    Number(i64),
    Counter(String),
}

/// Action definition. Use `type` to select a variant.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Press on a point.
    Click {
        position: ClickPosition,
        #[serde(default = "default_press_duration_ms")]
        press_duration_ms: u64,
    },

    /// Press, move from `from` to `to`, release.
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u64,
    },

    /// Wait before the next action.
    Pause { duration_ms: u64 },

    /// Start an activity or send a broadcast.
    Intent {
        #[serde(default)]
        is_broadcast: bool,
        action: String,
        #[serde(default)]
        component: Option<String>,
        #[serde(default)]
        flags: i32,
        #[serde(default)]
        extras: Vec<IntentExtra>,
    },

    /// Enable, disable or toggle events.
    ToggleEvent { target: ToggleTarget },

    /// Add to, subtract from or set a counter.
    ChangeCounter {
        counter: String,
        operation: CounterOperation,
        value: CounterOperand,
    },

    /// Post a notification.
    Notification {
        #[serde(default)]
        title: Option<String>,
        message: NotificationMessage,
        #[serde(default)]
        importance: NotificationImportance,
    },
}

impl Action {
    /// Short variant name, for logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Swipe { .. } => "swipe",
            Action::Pause { .. } => "pause",
            Action::Intent { .. } => "intent",
            Action::ToggleEvent { .. } => "toggle_event",
            Action::ChangeCounter { .. } => "change_counter",
            Action::Notification { .. } => "notification",
        }
    }
}

/// How the point of a click is obtained.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClickPosition {
    /// A fixed point chosen by the user.
    UserSelected { point: Point },

    /// The position where a condition of the event was detected.
    /// With the `or` operator, the first detected condition is used and `condition_id` is
    /// ignored; with `and`, `condition_id` selects the condition.
    OnDetectedCondition {
        #[serde(default)]
        condition_id: Option<ConditionId>,
        #[serde(default)]
        offset: Point,
    },
}

/// Events affected by a toggle action.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToggleTarget {
    All { operation: ToggleOperation },
    Events { toggles: Vec<EventToggle> },
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EventToggle {
    pub event_id: EventId,
    pub operation: ToggleOperation,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOperation {
    Enable,
    Disable,
    Toggle,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterOperation {
    Add,
    Minus,
    Set,
}

/// Notification content.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationMessage {
    Text { text: String },
    /// Rendered as `"<counter> = <value>"`.
    CounterValue { counter: String },
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationImportance {
    Min,
    Low,
    #[default]
    Default,
    High,
}

/// A key/value extra attached to an intent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct IntentExtra {
    pub key: String,
    pub value: ExtraValue,
}

/// Typed intent extra value. Example: `{ "integer": 42 }`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExtraValue {
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// A point on screen.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by `by`, saturating at the `i32` bounds.
    pub fn offset(self, by: Point) -> Self {
        Self::new(self.x.saturating_add(by.x), self.y.saturating_add(by.y))
    }
}

/// A rectangle region on screen.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment; edges are computed in `i64` so large areas never overflow.
    pub fn contains(&self, point: Point) -> bool {
        let (px, py) = (i64::from(point.x), i64::from(point.y));
        let (x, y) = (i64::from(self.x), i64::from(self.y));
        px >= x
            && py >= y
            && px < x + i64::from(self.width)
            && py < y + i64::from(self.height)
    }
}

fn default_true() -> bool {
    true
}

fn default_detection_quality() -> u32 {
    1200
}

fn default_position_offset_px() -> i32 {
    5
}

fn default_duration_offset_ms() -> u64 {
    5
}

fn default_threshold() -> u32 {
    4
}

fn default_press_duration_ms() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offset_saturates_at_the_bounds() {
        let p = Point::new(50, -50);
        assert_eq!(p.offset(Point::new(i32::MAX, 0)), Point::new(i32::MAX, -50));
        assert_eq!(p.offset(Point::new(0, i32::MIN)), Point::new(50, i32::MIN));
        assert_eq!(p.offset(Point::new(-5, 5)), Point::new(45, -45));
    }

    #[test]
    fn contains_handles_extreme_areas() {
        let huge = Rect::new(i32::MAX - 1, 0, i32::MAX, i32::MAX);
        assert!(huge.contains(Point::new(i32::MAX, 10)));
        assert!(!huge.contains(Point::new(0, 10)));

        let r = Rect::new(10, 10, 5, 5);
        assert!(r.contains(Point::new(10, 14)));
        assert!(!r.contains(Point::new(15, 10)));
    }

    #[test]
    fn condition_flattens_kind_fields() {
        let c: Condition = serde_json::from_value(json!({
            "id": 7,
            "type": "on_counter_reached",
            "counter": "score",
            "comparison": "greater_or_equals",
            "value": { "number": 10 }
        }))
        .unwrap();
        assert_eq!(c.id, ConditionId(7));
        assert_eq!(
            c.kind,
            ConditionKind::OnCounterReached {
                counter: "score".into(),
                comparison: ComparisonOperation::GreaterOrEquals,
                value: CounterOperand::Number(10),
            }
        );
    }

    #[test]
    fn image_condition_defaults() {
        let c: Condition = serde_json::from_value(json!({
            "id": 1,
            "type": "image",
            "path": "ok_button.png",
            "area": { "x": 10, "y": 20, "width": 30, "height": 40 }
        }))
        .unwrap();
        let ConditionKind::Image(image) = c.kind else {
            panic!("expected an image condition");
        };
        assert_eq!(image.detection, DetectionType::Exact);
        assert!(image.should_be_detected);
        assert!(c.id == ConditionId(1));
    }

    #[test]
    fn unknown_detection_type_is_rejected() {
        let res = serde_json::from_value::<DetectionType>(json!({ "type": "around" }));
        assert!(res.is_err());
    }

    #[test]
    fn counter_names_cover_conditions_and_actions() {
        let scenario: Scenario = serde_json::from_value(json!({
            "name": "s",
            "events": [{
                "id": 1,
                "kind": { "type": "trigger" },
                "conditions": [{
                    "id": 1, "type": "on_counter_reached", "counter": "a",
                    "comparison": "equals", "value": { "counter": "b" }
                }],
                "actions": [
                    { "type": "change_counter", "counter": "c", "operation": "add", "value": { "number": 1 } },
                    { "type": "notification", "message": { "type": "counter_value", "counter": "d" } }
                ]
            }]
        }))
        .unwrap();
        let names: Vec<_> = scenario.counter_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn comparison_operations() {
        assert!(ComparisonOperation::Equals.compare(3, 3));
        assert!(ComparisonOperation::Lower.compare(2, 3));
        assert!(!ComparisonOperation::Lower.compare(3, 3));
        assert!(ComparisonOperation::LowerOrEquals.compare(3, 3));
        assert!(ComparisonOperation::Greater.compare(4, 3));
        assert!(ComparisonOperation::GreaterOrEquals.compare(3, 3));
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.contains(Point::new(0, 0)));
        assert!(r.contains(Point::new(9, 9)));
        assert!(!r.contains(Point::new(10, 5)));
    }
}
