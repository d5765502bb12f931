//! Output formatting for enriched realtime data.
//!
//! Supports pretty-printing, JSON to stdout, and CSV append.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::enrich::{EnrichedVehicle, VehiclesByRoute};

/// Logs any value using Rust's debug pretty-print format.
pub fn print_pretty<T: std::fmt::Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Writes `value` to stdout as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// One flat CSV line per enriched vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRow {
    pub observed_at: DateTime<Utc>,
    pub route: String,
    pub vehicle_id: String,
    pub trip_id: i64,
    pub route_id: i64,
    pub direction_id: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub latitude: f32,
    pub longitude: f32,
    pub bearing: Option<f32>,
    pub geohash: String,
    pub timestamp: Option<u64>,
    pub current_status: Option<String>,
    pub agency_name: Option<String>,
    pub trip_headsign: Option<String>,
}

impl VehicleRow {
    pub fn new(route: &str, v: &EnrichedVehicle, observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            route: route.to_string(),
            vehicle_id: v.vehicle_id.clone(),
            trip_id: v.trip_id,
            route_id: v.route_id,
            direction_id: v.direction_id,
            start_date: v.start_date,
            latitude: v.latitude,
            longitude: v.longitude,
            bearing: v.bearing,
            geohash: v.geohash.clone(),
            timestamp: v.timestamp,
            current_status: v.current_status.clone(),
            agency_name: v.resolved.agency.as_ref().map(|a| a.name.clone()),
            trip_headsign: v.resolved.trip.as_ref().map(|t| t.headsign.clone()),
        }
    }

    /// Flattens grouped vehicles in route then vehicle id order.
    pub fn from_groups(groups: &VehiclesByRoute, observed_at: DateTime<Utc>) -> Vec<Self> {
        groups
            .iter()
            .flat_map(|(route, by_id)| {
                by_id
                    .values()
                    .map(move |v| Self::new(route, v, observed_at))
            })
            .collect()
    }
}

/// Appends rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records<T: Serialize>(path: &str, rows: &[T]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
