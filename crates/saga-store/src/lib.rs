//! Tenant-scoped persistence for saga aggregates.
//!
//! Sagas are stored as JSON blobs keyed by `(tenant id, transaction id)`
//! alongside a handful of indexed columns (status, step index, deadlines)
//! that the orchestrator's sweeper queries on. Two implementations ship:
//! [`InMemorySagaStore`] for tests and single-process use, and
//! [`PostgresSagaStore`] for durable deployments.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod status;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use query::SagaQuery;
pub use record::SagaRecord;
pub use status::SagaStatus;
pub use store::{PutOptions, SagaStore, SagaStoreExt};
