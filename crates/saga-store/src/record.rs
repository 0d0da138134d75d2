use chrono::{DateTime, Utc};
use common::{Tenant, TransactionId};
use serde::{Deserialize, Serialize};

use crate::SagaStatus;

/// A persisted saga: a JSON blob plus the columns the store filters on.
///
/// The store never interprets `data`; it only needs the indexed columns
/// to enforce the no-regression rule and to answer sweeper queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaRecord {
    pub tenant: Tenant,
    pub transaction_id: TransactionId,
    pub saga_type: String,
    pub status: SagaStatus,
    pub current_step_index: u32,
    pub compensation_incomplete: bool,
    /// Terminal saga whose SAGA_COMPLETED / SAGA_FAILED has not been confirmed sent.
    #[serde(default)]
    pub outcome_pending: bool,
    pub data: serde_json::Value,
    /// Version assigned by the store on the last successful put (0 = never stored).
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
    /// When the in-flight command was last sent; `None` when nothing is awaited.
    #[serde(default)]
    pub awaiting_since: Option<DateTime<Utc>>,
}

impl SagaRecord {
    /// Returns true if the saga reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the record has been purge-eligible since before `cutoff`.
    pub fn terminal_before(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(self.terminal_at, Some(at) if at <= cutoff)
    }

    /// Returns true if the in-flight command was sent at or before `cutoff`.
    pub fn awaiting_before(&self, cutoff: DateTime<Utc>) -> bool {
        !self.is_terminal() && matches!(self.awaiting_since, Some(at) if at <= cutoff)
    }

    /// Returns true if the saga's wall-clock budget expired at or before `now`.
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && matches!(self.timeout_at, Some(at) if at <= now)
    }
}
