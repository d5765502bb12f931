//! Header-driven access to GTFS CSV rows and scalar field conversion.
//!
//! Every conversion failure names the GTFS column it came from so the loader
//! can report `routes.txt line 12: route_color: ...` without guessing.

use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use std::num::{ParseFloatError, ParseIntError};

/// GTFS compact date layout, `YYYYMMDD`.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// A single field that could not be converted.
#[derive(thiserror::Error, Debug)]
#[error("{field}: {kind} (value {value:?})")]
pub struct FieldError {
    pub field: &'static str,
    pub value: String,
    pub kind: FieldErrorKind,
}

#[derive(thiserror::Error, Debug)]
pub enum FieldErrorKind {
    #[error("invalid integer: {0}")]
    Integer(#[source] ParseIntError),
    #[error("invalid float: {0}")]
    Float(#[source] ParseFloatError),
    #[error("invalid date: {0}")]
    Date(#[source] chrono::ParseError),
    #[error("invalid color: {0}")]
    Color(#[source] hex::FromHexError),
    #[error("value out of range")]
    OutOfRange,
}

impl FieldError {
    pub fn new(field: &'static str, value: &str, kind: FieldErrorKind) -> Self {
        Self {
            field,
            value: value.to_string(),
            kind,
        }
    }
}

/// Why a CSV row was rejected.
#[derive(thiserror::Error, Debug)]
pub enum RowError {
    #[error("invalid record length: expected {expected}, found {found}")]
    Length { expected: usize, found: usize },
    #[error("missing column {0}")]
    MissingColumn(&'static str),
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Column name to position mapping, built once from a file's header row.
#[derive(Debug, Clone)]
pub struct Columns {
    positions: HashMap<String, usize>,
}

impl Columns {
    pub fn from_header(header: &StringRecord) -> Self {
        let positions = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), i))
            .collect();
        Self { positions }
    }

    /// Fails on the first column in `names` the header does not carry.
    pub fn require(&self, names: &[&'static str]) -> Result<(), RowError> {
        match names.iter().find(|n| !self.positions.contains_key(**n)) {
            Some(missing) => Err(RowError::MissingColumn(missing)),
            None => Ok(()),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// One data row viewed through its file's [`Columns`].
pub struct Row<'a> {
    columns: &'a Columns,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    pub fn new(columns: &'a Columns, record: &'a StringRecord) -> Self {
        Self { columns, record }
    }

    /// Raw text of `field`, or `""` when the column or cell is absent.
    pub fn text(&self, field: &str) -> &'a str {
        self.columns
            .position(field)
            .and_then(|i| self.record.get(i))
            .unwrap_or("")
    }

    pub fn string(&self, field: &str) -> String {
        self.text(field).to_string()
    }

    pub fn int(&self, field: &'static str) -> Result<i64, FieldError> {
        parse_int(field, self.text(field))
    }

    pub fn float(&self, field: &'static str) -> Result<f64, FieldError> {
        parse_float(field, self.text(field))
    }

    /// Integer where an empty cell means zero.
    pub fn int_or_zero(&self, field: &'static str) -> Result<i64, FieldError> {
        let raw = self.text(field);
        if raw.trim().is_empty() {
            return Ok(0);
        }
        parse_int(field, raw)
    }

    /// Float where an empty cell means zero.
    pub fn float_or_zero(&self, field: &'static str) -> Result<f64, FieldError> {
        let raw = self.text(field);
        if raw.trim().is_empty() {
            return Ok(0.0);
        }
        parse_float(field, raw)
    }

    pub fn date(&self, field: &'static str) -> Result<NaiveDate, FieldError> {
        parse_date(field, self.text(field))
    }

    /// Lenient flag: exactly `"1"` is true, anything else (empty included) is false.
    pub fn is_one(&self, field: &str) -> bool {
        self.text(field).trim() == "1"
    }

    /// Strict flag: must be an integer, true only when it equals 1.
    pub fn int_flag(&self, field: &'static str) -> Result<bool, FieldError> {
        Ok(self.int(field)? == 1)
    }

    /// Six hex digits decoded into RGB; an empty cell yields `default`.
    pub fn color(&self, field: &'static str, default: [u8; 3]) -> Result<[u8; 3], FieldError> {
        let raw = self.text(field).trim();
        if raw.is_empty() {
            return Ok(default);
        }
        parse_color(field, raw)
    }
}

pub fn parse_int(field: &'static str, raw: &str) -> Result<i64, FieldError> {
    raw.trim()
        .parse()
        .map_err(|e| FieldError::new(field, raw, FieldErrorKind::Integer(e)))
}

pub fn parse_float(field: &'static str, raw: &str) -> Result<f64, FieldError> {
    raw.trim()
        .parse()
        .map_err(|e| FieldError::new(field, raw, FieldErrorKind::Float(e)))
}

pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, FieldError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| FieldError::new(field, raw, FieldErrorKind::Date(e)))
}

pub fn parse_color(field: &'static str, raw: &str) -> Result<[u8; 3], FieldError> {
    let mut rgb = [0u8; 3];
    hex::decode_to_slice(raw, &mut rgb)
        .map_err(|e| FieldError::new(field, raw, FieldErrorKind::Color(e)))?;
    Ok(rgb)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Columns {
        Columns::from_header(&StringRecord::from(names.to_vec()))
    }

    #[test]
    fn test_header_bom_and_whitespace_are_stripped() {
        let cols = columns(&["\u{feff}agency_id", " agency_name "]);
        assert_eq!(cols.position("agency_id"), Some(0));
        assert_eq!(cols.position("agency_name"), Some(1));
    }

    #[test]
    fn test_require_reports_missing_column() {
        let cols = columns(&["stop_id", "stop_name"]);
        let err = cols.require(&["stop_id", "stop_lat"]).unwrap_err();
        assert!(matches!(err, RowError::MissingColumn("stop_lat")));
    }

    #[test]
    fn test_empty_optional_numbers_default_to_zero() {
        let cols = columns(&["zone_id", "shape_dist_traveled"]);
        let record = StringRecord::from(vec!["", "  "]);
        let row = Row::new(&cols, &record);
        assert_eq!(row.int_or_zero("zone_id").unwrap(), 0);
        assert_eq!(row.float_or_zero("shape_dist_traveled").unwrap(), 0.0);
    }

    #[test]
    fn test_bad_optional_number_names_field() {
        let cols = columns(&["shape_dist_traveled"]);
        let record = StringRecord::from(vec!["abc"]);
        let row = Row::new(&cols, &record);
        let err = row.float_or_zero("shape_dist_traveled").unwrap_err();
        assert_eq!(err.field, "shape_dist_traveled");
        assert!(err.to_string().starts_with("shape_dist_traveled"));
    }

    #[test]
    fn test_is_one_is_lenient() {
        let cols = columns(&["a", "b", "c"]);
        let record = StringRecord::from(vec!["1", "2", ""]);
        let row = Row::new(&cols, &record);
        assert!(row.is_one("a"));
        assert!(!row.is_one("b"));
        assert!(!row.is_one("c"));
    }

    #[test]
    fn test_date_parsing() {
        let date = parse_date("start_date", "20220423").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 4, 23).unwrap());
        assert_eq!(format_date(date), "20220423");
        assert!(parse_date("start_date", "2022-04-23").is_err());
    }

    #[test]
    fn test_color_must_be_six_hex_digits() {
        assert_eq!(parse_color("route_color", "FF00ff").unwrap(), [0xFF, 0x00, 0xFF]);
        assert!(parse_color("route_color", "ZZ00FF").is_err());
        assert!(parse_color("route_color", "FF00").is_err());
        assert!(parse_color("route_color", "FF00FF00").is_err());
    }
}
