use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::gtfs_rt::FeedMessage;
use crate::schedule::ScheduleIndex;

/// Field coverage of one realtime poll.
#[derive(Debug, Default, Serialize)]
pub struct FeedStats {
    pub timestamp: DateTime<Utc>,
    pub feed_name: Option<String>,
    pub feed_timestamp: Option<u64>,
    pub total_entities: usize,

    // entity types
    pub vehicles: usize,
    pub trip_updates: usize,
    pub alerts: usize,
    pub deleted: usize,

    // vehicle fields
    pub with_trip: usize,
    pub with_vehicle_descriptor: usize,
    pub with_position: usize,
    pub with_bearing: usize,
    pub with_speed: usize,
    pub with_current_stop_sequence: usize,
    pub with_stop_id: usize,
    pub with_current_status: usize,
    pub with_timestamp: usize,
    pub with_occupancy: usize,

    // trip update fields
    pub with_delay: usize,
    pub stop_time_updates: usize,
}

impl FeedStats {
    pub fn from_feed(feed: &FeedMessage) -> Self {
        let mut s = FeedStats {
            timestamp: Utc::now(),
            feed_timestamp: feed.header.timestamp,
            total_entities: feed.entity.len(),
            ..Default::default()
        };

        for e in &feed.entity {
            if e.is_deleted() {
                s.deleted += 1;
            }

            if let Some(v) = &e.vehicle {
                s.vehicles += 1;

                if v.trip.is_some() {
                    s.with_trip += 1;
                }

                if v.vehicle.is_some() {
                    s.with_vehicle_descriptor += 1;
                }

                if let Some(pos) = &v.position {
                    s.with_position += 1;

                    if pos.bearing.is_some() {
                        s.with_bearing += 1;
                    }

                    if pos.speed.is_some() {
                        s.with_speed += 1;
                    }
                }

                if v.current_stop_sequence.is_some() {
                    s.with_current_stop_sequence += 1;
                }

                if v.stop_id.is_some() {
                    s.with_stop_id += 1;
                }

                if v.current_status.is_some() {
                    s.with_current_status += 1;
                }

                if v.timestamp.is_some() {
                    s.with_timestamp += 1;
                }

                if v.occupancy_status.is_some() {
                    s.with_occupancy += 1;
                }
            }

            if let Some(tu) = &e.trip_update {
                s.trip_updates += 1;

                if tu.delay.is_some() {
                    s.with_delay += 1;
                }

                s.stop_time_updates += tu.stop_time_update.len();
            }

            if e.alert.is_some() {
                s.alerts += 1;
            }
        }

        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn position_pct(&self) -> f64 {
        Self::pct(self.with_position, self.vehicles)
    }

    pub fn bearing_pct(&self) -> f64 {
        Self::pct(self.with_bearing, self.vehicles)
    }

    /// Share of vehicles carrying a trip descriptor, the only ones that can
    /// be joined to the schedule.
    pub fn trip_pct(&self) -> f64 {
        Self::pct(self.with_trip, self.vehicles)
    }

    pub fn with_feed_name(mut self, feed_name: &str) -> Self {
        self.feed_name = Some(feed_name.to_string());
        self
    }

    pub fn log(&self) {
        info!(
            feed = self.feed_name.as_deref().unwrap_or("unnamed"),
            entities = self.total_entities,
            vehicles = self.vehicles,
            trip_updates = self.trip_updates,
            alerts = self.alerts,
            stop_time_updates = self.stop_time_updates,
            position_pct = self.position_pct(),
            bearing_pct = self.bearing_pct(),
            trip_pct = self.trip_pct(),
            deleted = self.deleted,
            "Feed stats"
        );
        debug!(
            feed = self.feed_name.as_deref().unwrap_or("unnamed"),
            with_trip = self.with_trip,
            with_vehicle_descriptor = self.with_vehicle_descriptor,
            with_speed = self.with_speed,
            with_current_stop_sequence = self.with_current_stop_sequence,
            with_stop_id = self.with_stop_id,
            with_current_status = self.with_current_status,
            with_timestamp = self.with_timestamp,
            with_occupancy = self.with_occupancy,
            with_delay = self.with_delay,
            "Vehicle field coverage"
        );
    }
}

/// Row counts per static table.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleStats {
    pub agencies: usize,
    pub routes: usize,
    pub stops: usize,
    pub calendars: usize,
    pub calendar_dates: usize,
    pub trips: usize,
    pub shape_points: usize,
    pub stop_times: usize,
}

impl ScheduleStats {
    pub fn from_index(index: &ScheduleIndex) -> Self {
        Self {
            agencies: index.agency_count(),
            routes: index.route_count(),
            stops: index.stop_count(),
            calendars: index.calendar_count(),
            calendar_dates: index.calendar_date_count(),
            trips: index.trip_count(),
            shape_points: index.shape_point_count(),
            stop_times: index.stop_time_count(),
        }
    }

    pub fn log(&self) {
        info!(
            agencies = self.agencies,
            routes = self.routes,
            stops = self.stops,
            calendars = self.calendars,
            calendar_dates = self.calendar_dates,
            trips = self.trips,
            shape_points = self.shape_points,
            stop_times = self.stop_times,
            "Schedule stats"
        );
    }
}
