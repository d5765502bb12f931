//! Joins decoded realtime entities against the schedule index.
//!
//! Enrichment never mutates the index. A foreign key that does not resolve
//! leaves the matching field as `None`; only an unparsable identifier fails
//! the entity.

mod trip_update;
mod vehicle;

pub use trip_update::{EnrichedStopTimeUpdate, EnrichedTripUpdate, TripUpdatesByRoute};
pub use vehicle::{EnrichedVehicle, VehiclesByRoute};

use chrono::NaiveDate;
use geohash::Coord;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::gtfs_rt::{FeedMessage, TripDescriptor};
use crate::parser::{FeedPayload, payloads};
use crate::schedule::fields::{FieldError, parse_date, parse_int};
use crate::schedule::{Agency, Route, ScheduleIndex, Trip};

/// Group key for entities whose route is not in the schedule.
pub const UNKNOWN_ROUTE: &str = "unknown";

/// Geohash length; 12 characters is a cell of a few centimetres.
pub const GEOHASH_PRECISION: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum EnrichError {
    #[error("entity {entity_id}: {source}")]
    Field {
        entity_id: String,
        #[source]
        source: FieldError,
    },
    #[error("entity {entity_id}: cannot geohash position: {source}")]
    Geohash {
        entity_id: String,
        #[source]
        source: geohash::GeohashError,
    },
}

/// Schedule context attached to one realtime record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolved {
    pub agency: Option<Agency>,
    pub route: Option<Route>,
    pub trip: Option<Trip>,
}

impl Resolved {
    /// Route short name, or [`UNKNOWN_ROUTE`] when the route did not resolve.
    pub fn route_key(&self) -> String {
        self.route
            .as_ref()
            .map_or_else(|| UNKNOWN_ROUTE.to_string(), |r| r.short_name.clone())
    }
}

/// Everything one realtime poll produced.
#[derive(Debug, Default, Serialize)]
pub struct EnrichedFeed {
    pub vehicles: VehiclesByRoute,
    pub trip_updates: TripUpdatesByRoute,
    pub alerts_skipped: usize,
}

impl EnrichedFeed {
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.values().map(|by_id| by_id.len()).sum()
    }

    pub fn trip_update_count(&self) -> usize {
        self.trip_updates.values().map(Vec::len).sum()
    }
}

pub struct Enricher {
    schedule: Arc<ScheduleIndex>,
}

impl Enricher {
    pub fn new(schedule: Arc<ScheduleIndex>) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &ScheduleIndex {
        &self.schedule
    }

    /// Route, then agency (only through a resolved route with a non-blank
    /// agency_id), then trip.
    pub fn resolve(&self, route_id: i64, trip_id: i64) -> Resolved {
        let route = self.schedule.route(route_id).cloned();
        if route.is_none() {
            debug!(route_id, trip_id, "Route not in schedule");
        }

        let agency = route
            .as_ref()
            .map(|r| r.agency_id.trim())
            .filter(|agency_id| !agency_id.is_empty())
            .and_then(|agency_id| self.schedule.agency(agency_id).cloned());

        let trip = self.schedule.trip(trip_id, route_id).cloned();

        Resolved {
            agency,
            route,
            trip,
        }
    }

    /// Enriches every entity of `feed` in order. Alerts are counted and
    /// skipped; the first entity that fails aborts the whole feed.
    pub fn enrich_feed(&self, feed: &FeedMessage) -> Result<EnrichedFeed, EnrichError> {
        let mut out = EnrichedFeed::default();

        for (entity, payload) in payloads(feed) {
            match payload {
                FeedPayload::Vehicle(v) => {
                    let enriched = self.enrich_vehicle(&entity.id, v)?;
                    vehicle::insert(&mut out.vehicles, enriched);
                }
                FeedPayload::TripUpdate(tu) => {
                    let mut update = self.enrich_trip_update(&entity.id, tu)?;
                    update.deleted = entity.is_deleted();
                    out.trip_updates
                        .entry(update.resolved.route_key())
                        .or_default()
                        .push(update);
                }
                FeedPayload::Alert(_) => {
                    debug!(entity_id = %entity.id, "Skipping alert entity");
                    out.alerts_skipped += 1;
                }
                FeedPayload::Empty => {
                    debug!(entity_id = %entity.id, "Entity has no payload");
                }
            }
        }

        Ok(out)
    }
}

/// Integer identifiers and the service date decoded from a trip descriptor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TripKey {
    pub trip_id: i64,
    pub route_id: i64,
    pub start_date: Option<NaiveDate>,
}

impl TripKey {
    /// A missing descriptor is treated like one with empty ids, which fail
    /// the integer parse.
    pub(crate) fn parse(
        entity_id: &str,
        trip: Option<&TripDescriptor>,
    ) -> Result<Self, EnrichError> {
        let field_err = |source: FieldError| EnrichError::Field {
            entity_id: entity_id.to_string(),
            source,
        };

        let trip_id = parse_int("trip_id", trip.map_or("", |t| t.trip_id())).map_err(field_err)?;
        let route_id =
            parse_int("route_id", trip.map_or("", |t| t.route_id())).map_err(field_err)?;

        let raw_date = trip.map_or("", |t| t.start_date()).trim();
        let start_date = if raw_date.is_empty() {
            None
        } else {
            Some(parse_date("start_date", raw_date).map_err(field_err)?)
        };

        Ok(Self {
            trip_id,
            route_id,
            start_date,
        })
    }
}

/// Geohash of a position, or an empty string when either coordinate is
/// exactly zero. A vehicle on the equator or the prime meridian is therefore
/// reported without a geohash.
pub fn geohash_for(entity_id: &str, lat: f64, lon: f64) -> Result<String, EnrichError> {
    if lat == 0.0 || lon == 0.0 {
        return Ok(String::new());
    }
    geohash::encode(Coord { x: lon, y: lat }, GEOHASH_PRECISION).map_err(|source| {
        EnrichError::Geohash {
            entity_id: entity_id.to_string(),
            source,
        }
    })
}
