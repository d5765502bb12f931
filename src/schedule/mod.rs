//! GTFS static schedule: CSV parsing, typed records and the lookup index.

pub mod fields;
pub mod index;
pub mod loader;
pub mod records;

pub use fields::{FieldError, RowError};
pub use index::{DuplicateTrip, ScheduleIndex};
pub use loader::{ScheduleError, load_archive, update};
pub use records::{
    Agency, Calendar, CalendarDate, ExceptionType, GtfsRecord, PickupDropOff, Route, RouteType,
    ShapePoint, Stop, StopTime, Trip,
};
