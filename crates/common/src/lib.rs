//! Identifier and tenant types shared across the orchestrator workspace.

pub mod tenant;
pub mod types;

pub use tenant::{Tenant, TenantId};
pub use types::TransactionId;
