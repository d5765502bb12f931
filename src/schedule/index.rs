//! In-memory schedule index keyed by the GTFS natural and composite keys.
//!
//! The index is filled once by the loader (or rehydrated from a store or a
//! snapshot) and is read-only afterwards. Callers share it behind an `Arc`
//! and replace the whole reference on reload.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::records::{
    Agency, Calendar, CalendarDate, ExceptionType, Route, ShapePoint, Stop, StopTime, Trip,
};

/// The same (trip_id, route_id) pair was inserted twice.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("duplicate trip: trip_id {trip_id} on route_id {route_id}")]
pub struct DuplicateTrip {
    pub trip_id: i64,
    pub route_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleIndex {
    agencies: HashMap<String, Agency>,
    routes: HashMap<i64, Route>,
    stops: HashMap<i64, Stop>,
    calendars: HashMap<i64, Calendar>,
    /// trip_id -> route_id -> trip
    trips: HashMap<i64, HashMap<i64, Trip>>,
    /// shape_id -> sequence -> point
    shapes: HashMap<i64, BTreeMap<i64, ShapePoint>>,
    /// trip_id -> stop_id -> stop time
    stop_times: HashMap<i64, HashMap<i64, StopTime>>,
    /// service_id -> date -> exception
    calendar_dates: HashMap<i64, HashMap<NaiveDate, CalendarDate>>,
}

impl ScheduleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agency(&mut self, agency: Agency) {
        self.agencies.insert(agency.agency_id.clone(), agency);
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.insert(route.route_id, route);
    }

    pub fn add_stop(&mut self, stop: Stop) {
        self.stops.insert(stop.stop_id, stop);
    }

    pub fn add_calendar(&mut self, calendar: Calendar) {
        self.calendars.insert(calendar.service_id, calendar);
    }

    /// Inserts a trip under its (trip_id, route_id) pair. A repeated pair is
    /// rejected and leaves the first trip in place.
    pub fn add_trip(&mut self, trip: Trip) -> Result<(), DuplicateTrip> {
        let by_route = self.trips.entry(trip.trip_id).or_default();
        if by_route.contains_key(&trip.route_id) {
            return Err(DuplicateTrip {
                trip_id: trip.trip_id,
                route_id: trip.route_id,
            });
        }
        by_route.insert(trip.route_id, trip);
        Ok(())
    }

    /// Returns the point previously stored at the same (shape_id, sequence).
    pub fn add_shape(&mut self, point: ShapePoint) -> Option<ShapePoint> {
        let previous = self
            .shapes
            .entry(point.shape_id)
            .or_default()
            .insert(point.sequence, point);
        if let Some(prev) = &previous {
            warn!(
                shape_id = prev.shape_id,
                sequence = prev.sequence,
                "Shape point overwritten"
            );
        }
        previous
    }

    /// Returns the stop time previously stored at the same (trip_id, stop_id).
    pub fn add_stop_time(&mut self, stop_time: StopTime) -> Option<StopTime> {
        let previous = self
            .stop_times
            .entry(stop_time.trip_id)
            .or_default()
            .insert(stop_time.stop_id, stop_time);
        if let Some(prev) = &previous {
            warn!(
                trip_id = prev.trip_id,
                stop_id = prev.stop_id,
                "Stop time overwritten"
            );
        }
        previous
    }

    pub fn add_calendar_date(&mut self, date: CalendarDate) -> Option<CalendarDate> {
        self.calendar_dates
            .entry(date.service_id)
            .or_default()
            .insert(date.date, date)
    }

    pub fn agency(&self, agency_id: &str) -> Option<&Agency> {
        self.agencies.get(agency_id)
    }

    pub fn route(&self, route_id: i64) -> Option<&Route> {
        self.routes.get(&route_id)
    }

    pub fn trip(&self, trip_id: i64, route_id: i64) -> Option<&Trip> {
        self.trips.get(&trip_id)?.get(&route_id)
    }

    pub fn stop(&self, stop_id: i64) -> Option<&Stop> {
        self.stops.get(&stop_id)
    }

    pub fn calendar(&self, service_id: i64) -> Option<&Calendar> {
        self.calendars.get(&service_id)
    }

    /// Points of one shape ordered by `shape_pt_sequence`.
    pub fn shape(&self, shape_id: i64) -> Option<impl Iterator<Item = &ShapePoint>> {
        self.shapes.get(&shape_id).map(|points| points.values())
    }

    /// Stop times of one trip ordered by `stop_sequence`.
    pub fn stop_times_for_trip(&self, trip_id: i64) -> Option<Vec<&StopTime>> {
        let by_stop = self.stop_times.get(&trip_id)?;
        let mut times: Vec<&StopTime> = by_stop.values().collect();
        times.sort_by_key(|st| st.stop_sequence);
        Some(times)
    }

    /// Whether `service_id` operates on `date`. A calendar_dates exception
    /// wins over the weekly calendar.
    pub fn service_runs_on(&self, service_id: i64, date: NaiveDate) -> bool {
        if let Some(exception) = self
            .calendar_dates
            .get(&service_id)
            .and_then(|dates| dates.get(&date))
        {
            return exception.exception_type == ExceptionType::Added;
        }
        self.calendars
            .get(&service_id)
            .is_some_and(|cal| cal.covers(date))
    }

    pub fn agencies(&self) -> impl Iterator<Item = &Agency> {
        self.agencies.values()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.values()
    }

    pub fn calendars(&self) -> impl Iterator<Item = &Calendar> {
        self.calendars.values()
    }

    pub fn calendar_dates(&self) -> impl Iterator<Item = &CalendarDate> {
        self.calendar_dates.values().flat_map(|m| m.values())
    }

    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values().flat_map(|m| m.values())
    }

    pub fn shape_points(&self) -> impl Iterator<Item = &ShapePoint> {
        self.shapes.values().flat_map(|m| m.values())
    }

    pub fn stop_times(&self) -> impl Iterator<Item = &StopTime> {
        self.stop_times.values().flat_map(|m| m.values())
    }

    pub fn trip_count(&self) -> usize {
        self.trips.values().map(HashMap::len).sum()
    }

    pub fn shape_point_count(&self) -> usize {
        self.shapes.values().map(BTreeMap::len).sum()
    }

    pub fn stop_time_count(&self) -> usize {
        self.stop_times.values().map(HashMap::len).sum()
    }

    pub fn calendar_date_count(&self) -> usize {
        self.calendar_dates.values().map(HashMap::len).sum()
    }

    pub fn agency_count(&self) -> usize {
        self.agencies.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn calendar_count(&self) -> usize {
        self.calendars.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schedule::records::{PickupDropOff, RouteType};

    pub(crate) fn route(route_id: i64, agency_id: &str, short_name: &str) -> Route {
        Route {
            route_id,
            agency_id: agency_id.to_string(),
            short_name: short_name.to_string(),
            long_name: String::new(),
            desc: String::new(),
            route_type: RouteType::Bus,
            url: String::new(),
            color: [0xFF, 0xFF, 0xFF],
            text_color: [0, 0, 0],
        }
    }

    pub(crate) fn trip(trip_id: i64, route_id: i64) -> Trip {
        Trip {
            route_id,
            service_id: 2,
            trip_id,
            headsign: String::new(),
            short_name: String::new(),
            direction_id: 0,
            block_id: 1,
            shape_id: 1,
            wheelchair_accessible: false,
            bikes_allowed: false,
        }
    }

    fn stop_time(trip_id: i64, stop_id: i64, seq: i64) -> StopTime {
        StopTime {
            trip_id,
            arrival_time: "6:00:00".to_string(),
            departure_time: "6:00:00".to_string(),
            stop_id,
            stop_sequence: seq,
            stop_headsign: String::new(),
            pickup_type: PickupDropOff::Regular,
            drop_off_type: PickupDropOff::Regular,
            shape_dist_traveled: 0.0,
            timepoint: true,
        }
    }

    fn point(shape_id: i64, sequence: i64, lat: f64) -> ShapePoint {
        ShapePoint {
            shape_id,
            lat,
            lon: -84.4,
            sequence,
            dist_traveled: 0.0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trip_lookup_by_composite_key() {
        let mut index = ScheduleIndex::new();
        index.add_trip(trip(500, 100)).unwrap();
        index.add_trip(trip(500, 101)).unwrap();

        assert_eq!(index.trip(500, 100).unwrap().route_id, 100);
        assert_eq!(index.trip(500, 101).unwrap().route_id, 101);
        assert!(index.trip(500, 102).is_none());
        assert!(index.trip(501, 100).is_none());
        assert_eq!(index.trip_count(), 2);
    }

    #[test]
    fn test_duplicate_trip_is_rejected() {
        let mut index = ScheduleIndex::new();
        index.add_trip(trip(500, 100)).unwrap();

        let mut again = trip(500, 100);
        again.headsign = "second".to_string();
        let err = index.add_trip(again).unwrap_err();

        assert_eq!(
            err,
            DuplicateTrip {
                trip_id: 500,
                route_id: 100
            }
        );
        assert_eq!(index.trip(500, 100).unwrap().headsign, "");
    }

    #[test]
    fn test_missing_lookups_are_none() {
        let index = ScheduleIndex::new();
        assert!(index.agency("MARTA").is_none());
        assert!(index.route(100).is_none());
        assert!(index.stop(27).is_none());
        assert!(index.shape(1).is_none());
        assert!(index.stop_times_for_trip(500).is_none());
    }

    #[test]
    fn test_single_key_tables_overwrite() {
        let mut index = ScheduleIndex::new();
        index.add_route(route(100, "MARTA", "10"));
        index.add_route(route(100, "MARTA", "10A"));
        assert_eq!(index.route_count(), 1);
        assert_eq!(index.route(100).unwrap().short_name, "10A");
    }

    #[test]
    fn test_shape_points_come_back_in_sequence_order() {
        let mut index = ScheduleIndex::new();
        index.add_shape(point(7, 3, 33.3));
        index.add_shape(point(7, 1, 33.1));
        index.add_shape(point(7, 2, 33.2));

        let lats: Vec<f64> = index.shape(7).unwrap().map(|p| p.lat).collect();
        assert_eq!(lats, vec![33.1, 33.2, 33.3]);

        let previous = index.add_shape(point(7, 2, 40.0));
        assert_eq!(previous.unwrap().lat, 33.2);
        assert_eq!(index.shape_point_count(), 3);
    }

    #[test]
    fn test_stop_times_for_trip_sorted_by_sequence() {
        let mut index = ScheduleIndex::new();
        index.add_stop_time(stop_time(500, 30, 2));
        index.add_stop_time(stop_time(500, 27, 1));
        index.add_stop_time(stop_time(501, 27, 1));

        let stops: Vec<i64> = index
            .stop_times_for_trip(500)
            .unwrap()
            .iter()
            .map(|st| st.stop_id)
            .collect();
        assert_eq!(stops, vec![27, 30]);
        assert_eq!(index.stop_time_count(), 3);
    }

    #[test]
    fn test_service_runs_on_applies_exceptions() {
        let mut index = ScheduleIndex::new();
        index.add_calendar(Calendar {
            service_id: 2,
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
            start_date: date(2022, 4, 1),
            end_date: date(2022, 8, 12),
        });
        // Memorial Day 2022 is a Monday
        index.add_calendar_date(CalendarDate {
            service_id: 2,
            date: date(2022, 5, 30),
            exception_type: ExceptionType::Removed,
        });
        index.add_calendar_date(CalendarDate {
            service_id: 2,
            date: date(2022, 5, 28),
            exception_type: ExceptionType::Added,
        });

        assert!(index.service_runs_on(2, date(2022, 5, 31)));
        assert!(!index.service_runs_on(2, date(2022, 5, 30)));
        assert!(index.service_runs_on(2, date(2022, 5, 28)));
        assert!(!index.service_runs_on(2, date(2022, 5, 29)));
        assert!(!index.service_runs_on(2, date(2022, 9, 1)));
        assert!(!index.service_runs_on(3, date(2022, 5, 31)));
    }
}
