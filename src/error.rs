use thiserror::Error;

use crate::config::ConditionId;

/// Errors raised while processing a frame.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The authored scenario is malformed. Should have been rejected by the loader.
    #[error("Invalid {condition}: {reason}")]
    InvalidCondition {
        condition: ConditionId,
        reason: String,
    },

    /// The device rejected a gesture, intent or notification.
    #[error("Failed to dispatch {action}: {source:#}")]
    Dispatch {
        action: &'static str,
        source: anyhow::Error,
    },

    /// Processing was cancelled at a yield point.
    #[error("Processing cancelled")]
    Cancelled,
}

impl EngineError {
    /// Configuration defects are permanent; the scenario should be stopped.
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::InvalidCondition { .. })
    }

    pub(crate) fn dispatch(action: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| EngineError::Dispatch { action, source }
    }
}
