//! Typed records for the eight GTFS static tables.
//!
//! Each record knows its file name, the exact column set it expects and how
//! to build itself from a header-driven [`Row`]. `to_row` writes the fields
//! back in `COLUMNS` order.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::fields::{FieldError, FieldErrorKind, Row, format_date};

/// A static table whose rows parse into `Self`.
pub trait GtfsRecord: Sized {
    const FILE_NAME: &'static str;
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError>;

    fn to_row(&self) -> Vec<String>;
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

// agency_id,agency_name,agency_url,agency_timezone,agency_lang,agency_phone,agency_fare_url
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub agency_id: String,
    pub name: String,
    pub url: String,
    pub timezone: String,
    pub lang: String,
    pub phone: String,
    pub fare_url: String,
}

impl GtfsRecord for Agency {
    const FILE_NAME: &'static str = "agency.txt";
    const COLUMNS: &'static [&'static str] = &[
        "agency_id",
        "agency_name",
        "agency_url",
        "agency_timezone",
        "agency_lang",
        "agency_phone",
        "agency_fare_url",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            agency_id: row.string("agency_id"),
            name: row.string("agency_name"),
            url: row.string("agency_url"),
            timezone: row.string("agency_timezone"),
            lang: row.string("agency_lang"),
            phone: row.string("agency_phone"),
            fare_url: row.string("agency_fare_url"),
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.agency_id.clone(),
            self.name.clone(),
            self.url.clone(),
            self.timezone.clone(),
            self.lang.clone(),
            self.phone.clone(),
            self.fare_url.clone(),
        ]
    }
}

// service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    pub service_id: i64,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Calendar {
    pub fn runs_on_weekday(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// True when `date` is inside the inclusive range and its weekday is flagged.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date && self.runs_on_weekday(date.weekday())
    }
}

impl GtfsRecord for Calendar {
    const FILE_NAME: &'static str = "calendar.txt";
    const COLUMNS: &'static [&'static str] = &[
        "service_id",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
        "start_date",
        "end_date",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            service_id: row.int("service_id")?,
            monday: row.int_flag("monday")?,
            tuesday: row.int_flag("tuesday")?,
            wednesday: row.int_flag("wednesday")?,
            thursday: row.int_flag("thursday")?,
            friday: row.int_flag("friday")?,
            saturday: row.int_flag("saturday")?,
            sunday: row.int_flag("sunday")?,
            start_date: row.date("start_date")?,
            end_date: row.date("end_date")?,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.service_id.to_string(),
            flag(self.monday),
            flag(self.tuesday),
            flag(self.wednesday),
            flag(self.thursday),
            flag(self.friday),
            flag(self.saturday),
            flag(self.sunday),
            format_date(self.start_date),
            format_date(self.end_date),
        ]
    }
}

/// calendar_dates.txt exception_type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionType {
    Added,
    Removed,
}

impl ExceptionType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Added => 1,
            Self::Removed => 2,
        }
    }
}

// service_id,date,exception_type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDate {
    pub service_id: i64,
    pub date: NaiveDate,
    pub exception_type: ExceptionType,
}

impl GtfsRecord for CalendarDate {
    const FILE_NAME: &'static str = "calendar_dates.txt";
    const COLUMNS: &'static [&'static str] = &["service_id", "date", "exception_type"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        let code = row.int("exception_type")?;
        let exception_type = ExceptionType::from_code(code).ok_or_else(|| {
            FieldError::new(
                "exception_type",
                row.text("exception_type"),
                FieldErrorKind::OutOfRange,
            )
        })?;

        Ok(Self {
            service_id: row.int("service_id")?,
            date: row.date("date")?,
            exception_type,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.service_id.to_string(),
            format_date(self.date),
            self.exception_type.code().to_string(),
        ]
    }
}

/// routes.txt route_type. Unlisted codes are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
    Other(i64),
}

impl RouteType {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Tram,
            1 => Self::Subway,
            2 => Self::Rail,
            3 => Self::Bus,
            4 => Self::Ferry,
            5 => Self::CableTram,
            6 => Self::AerialLift,
            7 => Self::Funicular,
            11 => Self::Trolleybus,
            12 => Self::Monorail,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Tram => 0,
            Self::Subway => 1,
            Self::Rail => 2,
            Self::Bus => 3,
            Self::Ferry => 4,
            Self::CableTram => 5,
            Self::AerialLift => 6,
            Self::Funicular => 7,
            Self::Trolleybus => 11,
            Self::Monorail => 12,
            Self::Other(code) => code,
        }
    }
}

/// GTFS default when route_color is blank.
pub const DEFAULT_ROUTE_COLOR: [u8; 3] = [0xFF, 0xFF, 0xFF];
/// GTFS default when route_text_color is blank.
pub const DEFAULT_ROUTE_TEXT_COLOR: [u8; 3] = [0x00, 0x00, 0x00];

// route_id,agency_id,route_short_name,route_long_name,route_desc,route_type,route_url,route_color,route_text_color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: i64,
    pub agency_id: String,
    pub short_name: String,
    pub long_name: String,
    pub desc: String,
    pub route_type: RouteType,
    pub url: String,
    pub color: [u8; 3],
    pub text_color: [u8; 3],
}

impl GtfsRecord for Route {
    const FILE_NAME: &'static str = "routes.txt";
    const COLUMNS: &'static [&'static str] = &[
        "route_id",
        "agency_id",
        "route_short_name",
        "route_long_name",
        "route_desc",
        "route_type",
        "route_url",
        "route_color",
        "route_text_color",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            route_id: row.int("route_id")?,
            agency_id: row.string("agency_id"),
            short_name: row.string("route_short_name"),
            long_name: row.string("route_long_name"),
            desc: row.string("route_desc"),
            route_type: RouteType::from_code(row.int("route_type")?),
            url: row.string("route_url"),
            color: row.color("route_color", DEFAULT_ROUTE_COLOR)?,
            text_color: row.color("route_text_color", DEFAULT_ROUTE_TEXT_COLOR)?,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.route_id.to_string(),
            self.agency_id.clone(),
            self.short_name.clone(),
            self.long_name.clone(),
            self.desc.clone(),
            self.route_type.code().to_string(),
            self.url.clone(),
            hex::encode_upper(self.color),
            hex::encode_upper(self.text_color),
        ]
    }
}

// shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence,shape_dist_traveled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub shape_id: i64,
    pub lat: f64,
    pub lon: f64,
    pub sequence: i64,
    pub dist_traveled: f64,
}

impl GtfsRecord for ShapePoint {
    const FILE_NAME: &'static str = "shapes.txt";
    const COLUMNS: &'static [&'static str] = &[
        "shape_id",
        "shape_pt_lat",
        "shape_pt_lon",
        "shape_pt_sequence",
        "shape_dist_traveled",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            shape_id: row.int("shape_id")?,
            lat: row.float("shape_pt_lat")?,
            lon: row.float("shape_pt_lon")?,
            sequence: row.int("shape_pt_sequence")?,
            dist_traveled: row.float("shape_dist_traveled")?,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.shape_id.to_string(),
            self.lat.to_string(),
            self.lon.to_string(),
            self.sequence.to_string(),
            self.dist_traveled.to_string(),
        ]
    }
}

/// pickup_type / drop_off_type in stop_times.txt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupDropOff {
    Regular,
    NotAvailable,
    PhoneAgency,
    CoordinateWithDriver,
}

impl PickupDropOff {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Regular),
            1 => Some(Self::NotAvailable),
            2 => Some(Self::PhoneAgency),
            3 => Some(Self::CoordinateWithDriver),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Regular => 0,
            Self::NotAvailable => 1,
            Self::PhoneAgency => 2,
            Self::CoordinateWithDriver => 3,
        }
    }

    fn parse(row: &Row<'_>, field: &'static str) -> Result<Self, FieldError> {
        let code = row.int(field)?;
        Self::from_code(code)
            .ok_or_else(|| FieldError::new(field, row.text(field), FieldErrorKind::OutOfRange))
    }
}

// trip_id,arrival_time,departure_time,stop_id,stop_sequence,stop_headsign,pickup_type,drop_off_type,shape_dist_traveled,timepoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: i64,
    /// Raw `H:MM:SS`; hours may run past 24 for after-midnight service.
    pub arrival_time: String,
    pub departure_time: String,
    pub stop_id: i64,
    pub stop_sequence: i64,
    pub stop_headsign: String,
    pub pickup_type: PickupDropOff,
    pub drop_off_type: PickupDropOff,
    pub shape_dist_traveled: f64,
    pub timepoint: bool,
}

impl GtfsRecord for StopTime {
    const FILE_NAME: &'static str = "stop_times.txt";
    const COLUMNS: &'static [&'static str] = &[
        "trip_id",
        "arrival_time",
        "departure_time",
        "stop_id",
        "stop_sequence",
        "stop_headsign",
        "pickup_type",
        "drop_off_type",
        "shape_dist_traveled",
        "timepoint",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            trip_id: row.int("trip_id")?,
            arrival_time: row.string("arrival_time"),
            departure_time: row.string("departure_time"),
            stop_id: row.int("stop_id")?,
            stop_sequence: row.int("stop_sequence")?,
            stop_headsign: row.string("stop_headsign"),
            pickup_type: PickupDropOff::parse(row, "pickup_type")?,
            drop_off_type: PickupDropOff::parse(row, "drop_off_type")?,
            shape_dist_traveled: row.float_or_zero("shape_dist_traveled")?,
            timepoint: row.int_flag("timepoint")?,
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.trip_id.to_string(),
            self.arrival_time.clone(),
            self.departure_time.clone(),
            self.stop_id.to_string(),
            self.stop_sequence.to_string(),
            self.stop_headsign.clone(),
            self.pickup_type.code().to_string(),
            self.drop_off_type.code().to_string(),
            self.shape_dist_traveled.to_string(),
            flag(self.timepoint),
        ]
    }
}

// stop_id,stop_code,stop_name,stop_desc,stop_lat,stop_lon,zone_id,stop_url,location_type,parent_station,stop_timezone,wheelchair_boarding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: i64,
    pub code: i64,
    pub name: String,
    pub desc: String,
    pub lat: f64,
    pub lon: f64,
    pub zone_id: i64,
    pub url: String,
    pub location_type: i64,
    pub parent_station: String,
    pub timezone: String,
    pub wheelchair_boarding: bool,
}

impl GtfsRecord for Stop {
    const FILE_NAME: &'static str = "stops.txt";
    const COLUMNS: &'static [&'static str] = &[
        "stop_id",
        "stop_code",
        "stop_name",
        "stop_desc",
        "stop_lat",
        "stop_lon",
        "zone_id",
        "stop_url",
        "location_type",
        "parent_station",
        "stop_timezone",
        "wheelchair_boarding",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            stop_id: row.int("stop_id")?,
            code: row.int("stop_code")?,
            name: row.string("stop_name"),
            desc: row.string("stop_desc"),
            lat: row.float("stop_lat")?,
            lon: row.float("stop_lon")?,
            zone_id: row.int_or_zero("zone_id")?,
            url: row.string("stop_url"),
            location_type: row.int_or_zero("location_type")?,
            parent_station: row.string("parent_station"),
            timezone: row.string("stop_timezone"),
            wheelchair_boarding: row.is_one("wheelchair_boarding"),
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.stop_id.to_string(),
            self.code.to_string(),
            self.name.clone(),
            self.desc.clone(),
            self.lat.to_string(),
            self.lon.to_string(),
            self.zone_id.to_string(),
            self.url.clone(),
            self.location_type.to_string(),
            self.parent_station.clone(),
            self.timezone.clone(),
            flag(self.wheelchair_boarding),
        ]
    }
}

// route_id,service_id,trip_id,trip_headsign,trip_short_name,direction_id,block_id,shape_id,wheelchair_accessible,bikes_allowed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub route_id: i64,
    pub service_id: i64,
    pub trip_id: i64,
    pub headsign: String,
    pub short_name: String,
    /// 0 or 1.
    pub direction_id: u32,
    pub block_id: i64,
    pub shape_id: i64,
    pub wheelchair_accessible: bool,
    pub bikes_allowed: bool,
}

impl GtfsRecord for Trip {
    const FILE_NAME: &'static str = "trips.txt";
    const COLUMNS: &'static [&'static str] = &[
        "route_id",
        "service_id",
        "trip_id",
        "trip_headsign",
        "trip_short_name",
        "direction_id",
        "block_id",
        "shape_id",
        "wheelchair_accessible",
        "bikes_allowed",
    ];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        let direction_id = match row.int("direction_id")? {
            0 => 0,
            1 => 1,
            _ => {
                return Err(FieldError::new(
                    "direction_id",
                    row.text("direction_id"),
                    FieldErrorKind::OutOfRange,
                ));
            }
        };

        Ok(Self {
            route_id: row.int("route_id")?,
            service_id: row.int("service_id")?,
            trip_id: row.int("trip_id")?,
            headsign: row.text("trip_headsign").trim().to_string(),
            short_name: row.text("trip_short_name").trim().to_string(),
            direction_id,
            block_id: row.int("block_id")?,
            shape_id: row.int("shape_id")?,
            wheelchair_accessible: row.is_one("wheelchair_accessible"),
            bikes_allowed: row.is_one("bikes_allowed"),
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.route_id.to_string(),
            self.service_id.to_string(),
            self.trip_id.to_string(),
            self.headsign.clone(),
            self.short_name.clone(),
            self.direction_id.to_string(),
            self.block_id.to_string(),
            self.shape_id.to_string(),
            flag(self.wheelchair_accessible),
            flag(self.bikes_allowed),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::fields::Columns;
    use csv::StringRecord;

    fn parse<T: GtfsRecord>(values: &[&str]) -> Result<T, FieldError> {
        let columns = Columns::from_header(&StringRecord::from(T::COLUMNS.to_vec()));
        let record = StringRecord::from(values.to_vec());
        T::from_row(&Row::new(&columns, &record))
    }

    #[test]
    fn test_route_row_round_trips() {
        let values = [
            "16883",
            "MARTA",
            "1",
            "Marietta Blvd/Joseph E Lowery Blvd",
            "",
            "3",
            "https://itsmarta.com/1.aspx",
            "FF00FF",
            "000000",
        ];
        let route: Route = parse(&values).unwrap();
        assert_eq!(route.route_id, 16883);
        assert_eq!(route.route_type, RouteType::Bus);
        assert_eq!(route.color, [0xFF, 0x00, 0xFF]);
        assert_eq!(route.to_row(), values.map(String::from).to_vec());
    }

    #[test]
    fn test_route_bad_color_is_route_color_error() {
        let mut values = ["100", "MARTA", "10", "", "", "3", "", "ZZ00FF", "000000"];
        let err = parse::<Route>(&values).unwrap_err();
        assert_eq!(err.field, "route_color");

        values[7] = "FF00";
        let err = parse::<Route>(&values).unwrap_err();
        assert_eq!(err.field, "route_color");
    }

    #[test]
    fn test_route_blank_colors_take_defaults() {
        let values = ["100", "MARTA", "10", "", "", "3", "", "", ""];
        let route: Route = parse(&values).unwrap();
        assert_eq!(route.color, DEFAULT_ROUTE_COLOR);
        assert_eq!(route.text_color, DEFAULT_ROUTE_TEXT_COLOR);
    }

    #[test]
    fn test_stop_row_with_blank_optionals() {
        let values = [
            "27",
            "907933",
            "HAMILTON E HOLMES STATION",
            "70 HAMILTON E HOLMES DR NW & CSX TRANSPORTATION",
            "33.754553",
            "-84.469302",
            "",
            "",
            "",
            "",
            "",
            "1",
        ];
        let stop: Stop = parse(&values).unwrap();
        assert_eq!(stop.stop_id, 27);
        assert_eq!(stop.zone_id, 0);
        assert_eq!(stop.location_type, 0);
        assert!(stop.wheelchair_boarding);
        assert_eq!(stop.lat, 33.754553);
    }

    #[test]
    fn test_stop_bad_zone_id_is_error() {
        let values = ["27", "1", "A", "", "33.7", "-84.4", "z1", "", "", "", "", ""];
        let err = parse::<Stop>(&values).unwrap_err();
        assert_eq!(err.field, "zone_id");
    }

    #[test]
    fn test_stop_time_keeps_raw_times_past_midnight() {
        let values = ["7142673", "25:43:00", " 6:43:00", "27", "1", "", "0", "0", "", "1"];
        let st: StopTime = parse(&values).unwrap();
        assert_eq!(st.arrival_time, "25:43:00");
        assert_eq!(st.departure_time, " 6:43:00");
        assert_eq!(st.shape_dist_traveled, 0.0);
        assert!(st.timepoint);
        assert_eq!(st.pickup_type, PickupDropOff::Regular);
    }

    #[test]
    fn test_stop_time_pickup_type_out_of_range() {
        let values = ["1", "6:00:00", "6:00:00", "27", "1", "", "7", "0", "", "1"];
        let err = parse::<StopTime>(&values).unwrap_err();
        assert_eq!(err.field, "pickup_type");
    }

    #[test]
    fn test_trip_flags_are_lenient() {
        let values = [
            "17114",
            "2",
            "7142675",
            " BLUE EASTBOUND TO INDIAN CREEK STATION ",
            "",
            "0",
            "1075016",
            "100750",
            "1",
            "",
        ];
        let trip: Trip = parse(&values).unwrap();
        assert_eq!(trip.headsign, "BLUE EASTBOUND TO INDIAN CREEK STATION");
        assert!(trip.wheelchair_accessible);
        assert!(!trip.bikes_allowed);
    }

    #[test]
    fn test_trip_direction_must_be_binary() {
        let values = ["1", "2", "3", "", "", "2", "4", "5", "0", "0"];
        let err = parse::<Trip>(&values).unwrap_err();
        assert_eq!(err.field, "direction_id");
    }

    #[test]
    fn test_calendar_round_trips() {
        let values = ["20", "1", "1", "1", "1", "1", "0", "0", "20220423", "20220812"];
        let cal: Calendar = parse(&values).unwrap();
        assert!(cal.monday && !cal.sunday);
        assert_eq!(cal.to_row(), values.map(String::from).to_vec());
    }

    #[test]
    fn test_calendar_covers_weekday_in_range() {
        let values = ["20", "1", "0", "0", "0", "0", "0", "0", "20220401", "20220430"];
        let cal: Calendar = parse(&values).unwrap();
        // 2022-04-04 is a Monday, 2022-04-05 a Tuesday
        assert!(cal.covers(NaiveDate::from_ymd_opt(2022, 4, 4).unwrap()));
        assert!(!cal.covers(NaiveDate::from_ymd_opt(2022, 4, 5).unwrap()));
        assert!(!cal.covers(NaiveDate::from_ymd_opt(2022, 5, 2).unwrap()));
    }

    #[test]
    fn test_calendar_date_exception_type() {
        let cd: CalendarDate = parse(&["34", "20220530", "1"]).unwrap();
        assert_eq!(cd.exception_type, ExceptionType::Added);
        let err = parse::<CalendarDate>(&["34", "20220530", "3"]).unwrap_err();
        assert_eq!(err.field, "exception_type");
    }

    #[test]
    fn test_shape_point_numeric_normalization() {
        let shape: ShapePoint = parse(&["100095", "33.818860", "-84.450519", "01", "0.0000"]).unwrap();
        assert_eq!(shape.sequence, 1);
        assert_eq!(
            shape.to_row(),
            vec!["100095", "33.81886", "-84.450519", "1", "0"]
        );
    }
}
