use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::{EnrichError, Enricher, Resolved, TripKey};
use crate::gtfs_rt::TripUpdate;
use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
use crate::schedule::Stop;

/// route short name -> trip updates in feed order
pub type TripUpdatesByRoute = BTreeMap<String, Vec<EnrichedTripUpdate>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedStopTimeUpdate {
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival_delay: Option<i32>,
    pub arrival_time: Option<i64>,
    pub arrival_uncertainty: Option<i32>,
    pub departure_delay: Option<i32>,
    pub departure_time: Option<i64>,
    pub departure_uncertainty: Option<i32>,
    pub schedule_relationship: String,
    pub stop: Option<Stop>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTripUpdate {
    pub entity_id: String,
    /// Set from the owning entity's `is_deleted` flag.
    pub deleted: bool,
    pub trip_id: i64,
    pub route_id: i64,
    pub direction_id: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub vehicle_id: Option<String>,
    pub delay: Option<i32>,
    pub timestamp: Option<u64>,
    pub stop_time_updates: Vec<EnrichedStopTimeUpdate>,
    #[serde(flatten)]
    pub resolved: Resolved,
}

impl Enricher {
    pub fn enrich_trip_update(
        &self,
        entity_id: &str,
        tu: &TripUpdate,
    ) -> Result<EnrichedTripUpdate, EnrichError> {
        let key = TripKey::parse(entity_id, Some(&tu.trip))?;

        let stop_time_updates = tu
            .stop_time_update
            .iter()
            .map(|stu| self.enrich_stop_time_update(stu))
            .collect();

        Ok(EnrichedTripUpdate {
            entity_id: entity_id.to_string(),
            deleted: false,
            trip_id: key.trip_id,
            route_id: key.route_id,
            direction_id: tu.trip.direction_id,
            start_date: key.start_date,
            start_time: tu.trip.start_time.clone(),
            vehicle_id: tu.vehicle.as_ref().and_then(|d| d.id.clone()),
            delay: tu.delay,
            timestamp: tu.timestamp,
            stop_time_updates,
            resolved: self.resolve(key.route_id, key.trip_id),
        })
    }

    fn enrich_stop_time_update(&self, stu: &StopTimeUpdate) -> EnrichedStopTimeUpdate {
        let stop = stu.stop_id.as_deref().and_then(|raw| match raw.trim().parse::<i64>() {
            Ok(id) => self.schedule.stop(id).cloned(),
            Err(_) => {
                debug!(stop_id = raw, "Non-numeric stop_id in stop time update");
                None
            }
        });

        let (arrival_delay, arrival_time, arrival_uncertainty) = event(stu.arrival.as_ref());
        let (departure_delay, departure_time, departure_uncertainty) =
            event(stu.departure.as_ref());

        EnrichedStopTimeUpdate {
            stop_sequence: stu.stop_sequence,
            stop_id: stu.stop_id.clone(),
            arrival_delay,
            arrival_time,
            arrival_uncertainty,
            departure_delay,
            departure_time,
            departure_uncertainty,
            schedule_relationship: stu.schedule_relationship().as_str_name().to_string(),
            stop,
        }
    }
}

fn event(e: Option<&StopTimeEvent>) -> (Option<i32>, Option<i64>, Option<i32>) {
    e.map_or((None, None, None), |e| (e.delay, e.time, e.uncertainty))
}
