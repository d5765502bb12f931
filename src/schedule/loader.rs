//! Builds a [`ScheduleIndex`] from a GTFS static ZIP archive.

use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::fields::{Columns, Row, RowError};
use super::index::{DuplicateTrip, ScheduleIndex};
use super::records::{
    Agency, Calendar, CalendarDate, GtfsRecord, Route, ShapePoint, Stop, StopTime, Trip,
};
use crate::fetch::{FetchError, HttpClient, fetch_bytes};

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("{file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("{file} line {line}: {source}")]
    Parse {
        file: &'static str,
        line: u64,
        #[source]
        source: RowError,
    },
    #[error(transparent)]
    DuplicateTrip(#[from] DuplicateTrip),
    #[error("archive has no {0}")]
    MissingMember(&'static str),
}

/// Downloads the static feed at `url` and parses it into a fresh index.
#[tracing::instrument(skip(client))]
pub async fn update<C: HttpClient>(client: &C, url: &str) -> Result<ScheduleIndex, ScheduleError> {
    let bytes = fetch_bytes(client, url).await?;
    info!(bytes = bytes.len(), "Static feed downloaded");
    load_archive(&bytes)
}

/// Parses every table of a GTFS ZIP held in memory.
///
/// Members are matched by file name, so archives that nest the tables inside
/// a directory load the same as flat ones. `calendar.txt`,
/// `calendar_dates.txt` and `shapes.txt` may be absent; the other five are
/// required. The first bad row aborts the whole load.
pub fn load_archive(bytes: &[u8]) -> Result<ScheduleIndex, ScheduleError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut members = HashMap::new();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if let Some(base) = Path::new(entry.name()).file_name().and_then(|n| n.to_str()) {
            members.insert(base.to_string(), i);
        }
    }

    let mut index = ScheduleIndex::new();

    load_member::<Agency, _>(&mut archive, &members, true, |a| {
        index.add_agency(a);
        Ok(())
    })?;
    load_member::<Route, _>(&mut archive, &members, true, |r| {
        index.add_route(r);
        Ok(())
    })?;
    load_member::<Stop, _>(&mut archive, &members, true, |s| {
        index.add_stop(s);
        Ok(())
    })?;
    load_member::<Calendar, _>(&mut archive, &members, false, |c| {
        index.add_calendar(c);
        Ok(())
    })?;
    load_member::<CalendarDate, _>(&mut archive, &members, false, |d| {
        index.add_calendar_date(d);
        Ok(())
    })?;
    load_member::<Trip, _>(&mut archive, &members, true, |t| {
        index.add_trip(t)?;
        Ok(())
    })?;
    load_member::<ShapePoint, _>(&mut archive, &members, false, |p| {
        index.add_shape(p);
        Ok(())
    })?;
    load_member::<StopTime, _>(&mut archive, &members, true, |st| {
        index.add_stop_time(st);
        Ok(())
    })?;

    info!(
        agencies = index.agency_count(),
        routes = index.route_count(),
        stops = index.stop_count(),
        trips = index.trip_count(),
        stop_times = index.stop_time_count(),
        shape_points = index.shape_point_count(),
        "Schedule index built"
    );

    Ok(index)
}

fn load_member<T, F>(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    members: &HashMap<String, usize>,
    required: bool,
    sink: F,
) -> Result<(), ScheduleError>
where
    T: GtfsRecord,
    F: FnMut(T) -> Result<(), ScheduleError>,
{
    let Some(&i) = members.get(T::FILE_NAME) else {
        if required {
            return Err(ScheduleError::MissingMember(T::FILE_NAME));
        }
        warn!(file = T::FILE_NAME, "Optional table not in archive, skipping");
        return Ok(());
    };

    info!(file = T::FILE_NAME, "parsing {}", T::FILE_NAME);
    let file = archive.by_index(i)?;
    let rows = read_table(file, sink)?;
    debug!(file = T::FILE_NAME, rows, "Table parsed");
    Ok(())
}

/// Streams one CSV table through `sink`, returning the number of data rows.
///
/// The header is read first and every column in `T::COLUMNS` must be present.
/// Each data row must carry exactly `T::COLUMNS.len()` cells.
pub fn read_table<T, R, F>(reader: R, mut sink: F) -> Result<usize, ScheduleError>
where
    T: GtfsRecord,
    R: Read,
    F: FnMut(T) -> Result<(), ScheduleError>,
{
    let file = T::FILE_NAME;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header = rdr
        .headers()
        .map_err(|source| ScheduleError::Csv { file, source })?;
    let columns = Columns::from_header(header);
    columns
        .require(T::COLUMNS)
        .map_err(|source| ScheduleError::Parse {
            file,
            line: 1,
            source,
        })?;

    let expected = T::COLUMNS.len();
    let mut count = 0;
    for result in rdr.records() {
        let record = result.map_err(|source| ScheduleError::Csv { file, source })?;
        let line = record.position().map_or(0, |p| p.line());

        if record.len() != expected {
            return Err(ScheduleError::Parse {
                file,
                line,
                source: RowError::Length {
                    expected,
                    found: record.len(),
                },
            });
        }

        let parsed = T::from_row(&Row::new(&columns, &record)).map_err(|e| ScheduleError::Parse {
            file,
            line,
            source: e.into(),
        })?;
        sink(parsed)?;
        count += 1;
    }

    Ok(count)
}
