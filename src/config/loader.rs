use anyhow::{Context, Result, anyhow, bail};
use schemars::{Schema, schema_for};
use serde_valid::Validate;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::models::{
    Action, ClickPosition, ConditionKind, CounterOperand, DetectionType, Event, EventKind,
    NotificationMessage, Scenario, ToggleTarget,
};

/// Load a scenario from a string slice.
pub fn load_from_str(s: &str) -> Result<Scenario> {
    let scenario: Scenario =
        serde_json::from_str(s).context("Failed to parse JSON scenario string")?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

/// Load a scenario from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<Scenario> {
    let scenario: Scenario =
        serde_json::from_reader(reader).context("Failed to parse JSON scenario from reader")?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

/// Load a scenario from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Scenario> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open scenario file {}", path_ref.display()))?;
    let scenario = load_from_reader(file)?;
    debug!(target: "autotap::loader", "Loaded scenario from {}", path_ref.display());
    Ok(scenario)
}

/// Load a scenario from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<Scenario> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read scenario file {}", path_ref.display()))?;
    let scenario: Scenario = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON scenario from {}", path_ref.display()))?;
    validate_scenario(&scenario)?;
    debug!(target: "autotap::loader", "Loaded scenario from {}", path_ref.display());
    Ok(scenario)
}

/// Generate the JSON Schema of a scenario file.
pub fn generate_schema() -> Schema {
    schema_for!(Scenario)
}

/// Write the JSON Schema of a scenario file to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Reject scenarios the engine would fail on or silently misbehave with.
/// - Event and condition ids are unique.
/// - Image events only hold image/text conditions, trigger events only trigger conditions.
/// - Screen conditions have valid fields and an area when detected `in_area`.
/// - Toggle and click actions reference existing events and conditions.
/// - Counter names are not empty.
pub fn validate_scenario(scenario: &Scenario) -> Result<()> {
    let mut event_ids = HashSet::new();
    for event in &scenario.events {
        if !event_ids.insert(event.id) {
            bail!("Duplicate event id {}", event.id);
        }
    }

    let mut condition_ids = HashSet::new();
    for event in &scenario.events {
        for condition in &event.conditions {
            if !condition_ids.insert(condition.id) {
                bail!("Duplicate condition id {} in {}", condition.id, event.id);
            }
        }
    }

    for event in &scenario.events {
        validate_event(event, &event_ids)
            .with_context(|| format!("Invalid {} '{}'", event.id, event.name))?;
    }

    Ok(())
}

fn validate_event(event: &Event, event_ids: &HashSet<crate::config::EventId>) -> Result<()> {
    for condition in &event.conditions {
        if event.is_image() != condition.is_screen_condition() {
            bail!(
                "{} does not match the event kind ({})",
                condition.id,
                if event.is_image() { "image" } else { "trigger" }
            );
        }

        match &condition.kind {
            ConditionKind::Image(image) => {
                image
                    .validate()
                    .map_err(|e| anyhow!("{}: {e}", condition.id))?;
                validate_detection(&image.detection)
                    .with_context(|| format!("Invalid detection for {}", condition.id))?;
            }
            ConditionKind::Text(text) => {
                text.validate()
                    .map_err(|e| anyhow!("{}: {e}", condition.id))?;
                validate_detection(&text.detection)
                    .with_context(|| format!("Invalid detection for {}", condition.id))?;
            }
            ConditionKind::OnBroadcastReceived { action } => {
                if action.is_empty() {
                    bail!("{} listens to an empty broadcast action", condition.id);
                }
            }
            ConditionKind::OnCounterReached { counter, value, .. } => {
                validate_counter_name(counter)?;
                validate_operand(value)?;
            }
            ConditionKind::OnTimerReached { .. } => {}
        }
    }

    let screen_conditions: BTreeSet<_> = event
        .conditions
        .iter()
        .filter(|c| c.is_screen_condition())
        .map(|c| c.id)
        .collect();

    for (idx, action) in event.actions.iter().enumerate() {
        validate_action(event, action, &screen_conditions, event_ids)
            .with_context(|| format!("Invalid {} action at index {}", action.kind_name(), idx))?;
    }

    Ok(())
}

fn validate_action(
    event: &Event,
    action: &Action,
    screen_conditions: &BTreeSet<crate::config::ConditionId>,
    event_ids: &HashSet<crate::config::EventId>,
) -> Result<()> {
    match action {
        Action::Click {
            position: ClickPosition::OnDetectedCondition { condition_id, .. },
            ..
        } => {
            if matches!(event.kind, EventKind::Trigger) {
                bail!("Trigger events have no detected position to click on");
            }
            if let Some(id) = condition_id {
                if !screen_conditions.contains(id) {
                    bail!("{} is not a screen condition of this event", id);
                }
            }
        }
        Action::ToggleEvent {
            target: ToggleTarget::Events { toggles },
        } => {
            for toggle in toggles {
                if !event_ids.contains(&toggle.event_id) {
                    bail!("Toggled {} does not exist", toggle.event_id);
                }
            }
        }
        Action::ChangeCounter { counter, value, .. } => {
            validate_counter_name(counter)?;
            validate_operand(value)?;
        }
        Action::Notification {
            message: NotificationMessage::CounterValue { counter },
            ..
        } => validate_counter_name(counter)?,
        Action::Intent { action, .. } => {
            if action.is_empty() {
                bail!("Intent action is empty");
            }
        }
        Action::Click { .. }
        | Action::Swipe { .. }
        | Action::Pause { .. }
        | Action::ToggleEvent { .. }
        | Action::Notification { .. } => {}
    }
    Ok(())
}

fn validate_detection(detection: &DetectionType) -> Result<()> {
    if let DetectionType::InArea { area: None } = detection {
        bail!("'in_area' detection requires an area");
    }
    Ok(())
}

fn validate_counter_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Counter name is empty");
    }
    Ok(())
}

fn validate_operand(operand: &CounterOperand) -> Result<()> {
    match operand {
        CounterOperand::Counter(name) => validate_counter_name(name),
        CounterOperand::Number(_) => Ok(()),
    }
}
