//! Saga lifecycle status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a saga in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──┬──► Completed
///           └──► Compensating ──► Failed
/// ```
///
/// A saga never returns to `Pending` once any step has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Forward steps are being dispatched and acknowledged.
    #[default]
    Pending,

    /// A step failed and compensating commands are in flight.
    Compensating,

    /// All steps completed successfully (terminal).
    Completed,

    /// Compensation finished, or was abandoned, after a failure (terminal).
    Failed,
}

impl SagaStatus {
    /// Returns true if forward steps may still advance.
    pub fn can_advance(&self) -> bool {
        matches!(self, SagaStatus::Pending)
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaStatus::Pending)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "PENDING",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
        }
    }

    /// Non-terminal statuses.
    pub const ACTIVE: [SagaStatus; 2] = [SagaStatus::Pending, SagaStatus::Compensating];

    /// Terminal statuses.
    pub const TERMINAL: [SagaStatus; 2] = [SagaStatus::Completed, SagaStatus::Failed];
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown saga status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for SagaStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SagaStatus::Pending),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "FAILED" => Ok(SagaStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
