//! Correlates GTFS-Realtime vehicle positions and trip updates with the GTFS
//! static schedule they refer to.

pub mod config;
pub mod enrich;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod schedule;
pub mod snapshot;
pub mod stats;
pub mod store;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
