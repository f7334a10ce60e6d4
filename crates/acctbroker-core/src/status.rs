//! Translation of external operation states into broker states

use serde::{Deserialize, Serialize};

/// External state of an account-creation request that is still running
pub const IN_PROGRESS: &str = "IN_PROGRESS";
/// External state of a completed account-creation request
pub const SUCCEEDED: &str = "SUCCEEDED";
/// External state of a failed account-creation request
pub const FAILED: &str = "FAILED";

/// State of an instance's last operation as reported to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastOperationState {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl std::fmt::Display for LastOperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LastOperationState::InProgress => write!(f, "in progress"),
            LastOperationState::Succeeded => write!(f, "succeeded"),
            LastOperationState::Failed => write!(f, "failed"),
        }
    }
}

/// Translate an external state into a [`LastOperationState`].
///
/// Anything other than `IN_PROGRESS` or `SUCCEEDED` is `Failed`, including
/// values this broker has never seen.
pub fn translate(external_state: &str) -> LastOperationState {
    match external_state {
        IN_PROGRESS => LastOperationState::InProgress,
        SUCCEEDED => LastOperationState::Succeeded,
        _ => LastOperationState::Failed,
    }
}

/// Answer to a last-operation query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOperation {
    pub state: LastOperationState,

    /// Human-readable rendering of the raw external status
    pub description: String,
}
