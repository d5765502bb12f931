//! Explicit configuration passed into each component constructor.

use std::time::Duration;

pub const DEFAULT_STATIC_URL: &str = "https://itsmarta.com/google_transit_feed/google_transit.zip";
pub const DEFAULT_VEHICLES_URL: &str =
    "https://gtfs-rt.itsmarta.com/TMGTFSRealTimeWebService/vehicle/vehiclepositions.pb";
pub const DEFAULT_TRIP_UPDATES_URL: &str =
    "https://gtfs-rt.itsmarta.com/TMGTFSRealTimeWebService/tripupdate/tripupdates.pb";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Rows per persistence batch.
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Where the static and realtime feeds live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub static_url: String,
    pub vehicles_url: String,
    pub trip_updates_url: String,
    /// Whole-request timeout for every fetch.
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            static_url: DEFAULT_STATIC_URL.to_string(),
            vehicles_url: DEFAULT_VEHICLES_URL.to_string(),
            trip_updates_url: DEFAULT_TRIP_UPDATES_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// SQL persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `sqlite:`, `mysql:` or `postgres:` connection URL.
    pub database_url: String,
    /// Rows per INSERT; values below 1 are treated as 1.
    pub batch_size: usize,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}
