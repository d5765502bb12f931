//! Persistence for the static schedule.
//!
//! [`ScheduleStore`] is the one seam every backend sits behind: the SQL
//! store (SQLite, MySQL or PostgreSQL, picked from the URL) and the snapshot
//! file store. Callers only see the trait.

mod snapshot_store;
mod sql;

pub use snapshot_store::SnapshotStore;
pub use sql::{Backend, SqlStore};

use async_trait::async_trait;

use crate::schedule::{Agency, DuplicateTrip, FieldError, Route, ScheduleIndex, Stop, Trip};
use crate::snapshot::SnapshotError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Sql(#[from] sqlx::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("unsupported database url {0:?}; expected sqlite:, mysql: or postgres:")]
    UnsupportedUrl(String),
    #[error("stored {table} row is invalid: {source}")]
    Corrupt {
        table: &'static str,
        #[source]
        source: FieldError,
    },
    #[error(transparent)]
    DuplicateTrip(#[from] DuplicateTrip),
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Replaces everything stored with the contents of `index`. Either the
    /// whole schedule is written or nothing changes.
    async fn replace_schedule(&self, index: &ScheduleIndex) -> Result<(), StoreError>;

    async fn agency(&self, agency_id: &str) -> Result<Option<Agency>, StoreError>;

    async fn route(&self, route_id: i64) -> Result<Option<Route>, StoreError>;

    async fn stop(&self, stop_id: i64) -> Result<Option<Stop>, StoreError>;

    async fn trip(&self, trip_id: i64, route_id: i64) -> Result<Option<Trip>, StoreError>;

    /// Rebuilds a full index from what is stored.
    async fn load_schedule(&self) -> Result<ScheduleIndex, StoreError>;
}
