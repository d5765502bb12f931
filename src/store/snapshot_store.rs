use async_trait::async_trait;
use std::path::PathBuf;

use super::{ScheduleStore, StoreError};
use crate::schedule::{Agency, Route, ScheduleIndex, Stop, Trip};
use crate::snapshot::{self, SnapshotFormat};

/// File-backed store holding one whole-index snapshot.
///
/// Every lookup reads the file again; use [`ScheduleStore::load_schedule`]
/// once and query the index when many lookups are needed.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    format: SnapshotFormat,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, format: SnapshotFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Format taken from the file extension; `gzip` applies to binary files.
    pub fn for_path(path: impl Into<PathBuf>, gzip: bool) -> Self {
        let path = path.into();
        let format = match SnapshotFormat::for_path(&path) {
            SnapshotFormat::Binary { .. } => SnapshotFormat::Binary { gzip },
            SnapshotFormat::Json => SnapshotFormat::Json,
        };
        Self::new(path, format)
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }
}

#[async_trait]
impl ScheduleStore for SnapshotStore {
    async fn replace_schedule(&self, index: &ScheduleIndex) -> Result<(), StoreError> {
        // sibling file, then rename into place
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        snapshot::write(&tmp, index, self.format)?;
        std::fs::rename(&tmp, &self.path).map_err(snapshot::SnapshotError::from)?;
        Ok(())
    }

    async fn agency(&self, agency_id: &str) -> Result<Option<Agency>, StoreError> {
        Ok(self.load_schedule().await?.agency(agency_id).cloned())
    }

    async fn route(&self, route_id: i64) -> Result<Option<Route>, StoreError> {
        Ok(self.load_schedule().await?.route(route_id).cloned())
    }

    async fn stop(&self, stop_id: i64) -> Result<Option<Stop>, StoreError> {
        Ok(self.load_schedule().await?.stop(stop_id).cloned())
    }

    async fn trip(&self, trip_id: i64, route_id: i64) -> Result<Option<Trip>, StoreError> {
        Ok(self.load_schedule().await?.trip(trip_id, route_id).cloned())
    }

    async fn load_schedule(&self) -> Result<ScheduleIndex, StoreError> {
        Ok(snapshot::read_as(&self.path, self.format)?)
    }
}
