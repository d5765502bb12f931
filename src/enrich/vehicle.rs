use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{EnrichError, Enricher, Resolved, TripKey, geohash_for};
use crate::gtfs_rt::VehiclePosition;

/// route short name -> vehicle id -> vehicle
pub type VehiclesByRoute = BTreeMap<String, BTreeMap<String, EnrichedVehicle>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedVehicle {
    pub entity_id: String,
    /// Vehicle descriptor id, falling back to the entity id.
    pub vehicle_id: String,
    pub label: Option<String>,
    pub license_plate: Option<String>,
    pub trip_id: i64,
    pub route_id: i64,
    pub direction_id: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub schedule_relationship: Option<String>,
    pub latitude: f32,
    pub longitude: f32,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub odometer: Option<f64>,
    pub geohash: String,
    pub timestamp: Option<u64>,
    pub current_stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub current_status: Option<String>,
    pub occupancy_status: Option<String>,
    pub congestion_level: Option<String>,
    #[serde(flatten)]
    pub resolved: Resolved,
}

impl Enricher {
    pub fn enrich_vehicle(
        &self,
        entity_id: &str,
        v: &VehiclePosition,
    ) -> Result<EnrichedVehicle, EnrichError> {
        let key = TripKey::parse(entity_id, v.trip.as_ref())?;

        let (latitude, longitude, bearing, speed, odometer) = v
            .position
            .as_ref()
            .map_or((0.0, 0.0, None, None, None), |p| {
                (p.latitude, p.longitude, p.bearing, p.speed, p.odometer)
            });
        let geohash = geohash_for(entity_id, f64::from(latitude), f64::from(longitude))?;

        let vehicle_id = v
            .vehicle
            .as_ref()
            .and_then(|d| d.id.as_deref())
            .filter(|id| !id.is_empty())
            .unwrap_or(entity_id)
            .to_string();

        Ok(EnrichedVehicle {
            entity_id: entity_id.to_string(),
            vehicle_id,
            label: v.vehicle.as_ref().and_then(|d| d.label.clone()),
            license_plate: v.vehicle.as_ref().and_then(|d| d.license_plate.clone()),
            trip_id: key.trip_id,
            route_id: key.route_id,
            direction_id: v.trip.as_ref().and_then(|t| t.direction_id),
            start_date: key.start_date,
            start_time: v.trip.as_ref().and_then(|t| t.start_time.clone()),
            schedule_relationship: v
                .trip
                .as_ref()
                .filter(|t| t.schedule_relationship.is_some())
                .map(|t| t.schedule_relationship().as_str_name().to_string()),
            latitude,
            longitude,
            bearing,
            speed,
            odometer,
            geohash,
            timestamp: v.timestamp,
            current_stop_sequence: v.current_stop_sequence,
            stop_id: v.stop_id.clone(),
            current_status: v
                .current_status
                .map(|_| v.current_status().as_str_name().to_string()),
            occupancy_status: v
                .occupancy_status
                .map(|_| v.occupancy_status().as_str_name().to_string()),
            congestion_level: v
                .congestion_level
                .map(|_| v.congestion_level().as_str_name().to_string()),
            resolved: self.resolve(key.route_id, key.trip_id),
        })
    }
}

pub(super) fn insert(groups: &mut VehiclesByRoute, vehicle: EnrichedVehicle) {
    groups
        .entry(vehicle.resolved.route_key())
        .or_default()
        .insert(vehicle.vehicle_id.clone(), vehicle);
}
