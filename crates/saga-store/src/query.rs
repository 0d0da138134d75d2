use chrono::{DateTime, Utc};
use common::TenantId;

use crate::{SagaRecord, SagaStatus};

/// Builder for constructing saga queries.
///
/// Every filter is optional; an empty query matches every saga of every tenant.
/// Results are ordered by creation time, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SagaQuery {
    /// Restrict to one tenant.
    pub tenant_id: Option<TenantId>,

    /// Match any of these statuses.
    pub statuses: Option<Vec<SagaStatus>>,

    /// Filter by saga type.
    pub saga_type: Option<String>,

    /// Non-terminal sagas whose timeout elapsed at or before this instant.
    pub timed_out_at: Option<DateTime<Utc>>,

    /// Terminal sagas that finished at or before this instant.
    pub terminal_before: Option<DateTime<Utc>>,

    /// Filter on the compensation-incomplete flag.
    pub compensation_incomplete: Option<bool>,

    /// Filter on the unsent-outcome flag.
    pub outcome_pending: Option<bool>,

    /// Non-terminal sagas whose in-flight command was sent at or before this instant.
    pub awaiting_before: Option<DateTime<Utc>>,

    /// Maximum number of sagas to return.
    pub limit: Option<usize>,

    /// Number of sagas to skip.
    pub offset: Option<usize>,
}

impl SagaQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one tenant's sagas.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Default::default()
        }
    }

    /// Creates a query for every non-terminal saga.
    pub fn active() -> Self {
        Self::new().statuses(SagaStatus::ACTIVE.to_vec())
    }

    /// Creates a query for sagas whose timeout elapsed by `now`.
    pub fn timed_out(now: DateTime<Utc>) -> Self {
        Self {
            timed_out_at: Some(now),
            ..Self::active()
        }
    }

    /// Creates a query for sagas whose in-flight command was sent by `cutoff`.
    pub fn stale(cutoff: DateTime<Utc>) -> Self {
        Self {
            awaiting_before: Some(cutoff),
            ..Self::active()
        }
    }

    /// Creates a query for terminal sagas whose outcome event was never sent.
    pub fn outcome_unsent() -> Self {
        Self {
            outcome_pending: Some(true),
            ..Self::new().statuses(SagaStatus::TERMINAL.to_vec())
        }
    }

    /// Creates a query for terminal sagas eligible for purge at `cutoff`.
    ///
    /// Sagas that gave up on compensation, or whose outcome is still unsent,
    /// are never purge-eligible.
    pub fn purgeable(cutoff: DateTime<Utc>) -> Self {
        Self {
            terminal_before: Some(cutoff),
            compensation_incomplete: Some(false),
            outcome_pending: Some(false),
            ..Self::new().statuses(SagaStatus::TERMINAL.to_vec())
        }
    }

    pub fn tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn status(mut self, status: SagaStatus) -> Self {
        self.statuses = Some(vec![status]);
        self
    }

    pub fn statuses(mut self, statuses: Vec<SagaStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn saga_type(mut self, saga_type: impl Into<String>) -> Self {
        self.saga_type = Some(saga_type.into());
        self
    }

    pub fn compensation_incomplete(mut self, flag: bool) -> Self {
        self.compensation_incomplete = Some(flag);
        self
    }

    /// Limits the number of sagas returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many sagas before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Evaluates the filters against a record; used by in-memory stores.
    pub fn matches(&self, record: &SagaRecord) -> bool {
        if let Some(tenant_id) = self.tenant_id
            && record.tenant.id != tenant_id
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&record.status)
        {
            return false;
        }
        if let Some(ref saga_type) = self.saga_type
            && &record.saga_type != saga_type
        {
            return false;
        }
        if let Some(now) = self.timed_out_at
            && !record.timed_out(now)
        {
            return false;
        }
        if let Some(cutoff) = self.terminal_before
            && !record.terminal_before(cutoff)
        {
            return false;
        }
        if let Some(flag) = self.compensation_incomplete
            && record.compensation_incomplete != flag
        {
            return false;
        }
        if let Some(flag) = self.outcome_pending
            && record.outcome_pending != flag
        {
            return false;
        }
        if let Some(cutoff) = self.awaiting_before
            && !record.awaiting_before(cutoff)
        {
            return false;
        }
        true
    }
}
