//! Whole-index snapshot files.
//!
//! Binary snapshots are bincode (length-prefixed, standard config) and may be
//! gzip-compressed; reading detects compression from the gzip magic bytes.
//! JSON snapshots exist for debugging and interoperability.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::schedule::ScheduleIndex;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary snapshot encode: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("binary snapshot decode: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("json snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Binary { gzip: bool },
    Json,
}

impl SnapshotFormat {
    /// `.json` files are JSON, anything else is binary.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Binary { gzip: false },
        }
    }
}

pub fn encode(index: &ScheduleIndex, format: SnapshotFormat) -> Result<Vec<u8>, SnapshotError> {
    let mut out = Vec::new();
    encode_into(index, format, &mut out)?;
    Ok(out)
}

fn encode_into<W: Write>(
    index: &ScheduleIndex,
    format: SnapshotFormat,
    mut writer: W,
) -> Result<(), SnapshotError> {
    let config = bincode::config::standard();
    match format {
        SnapshotFormat::Json => serde_json::to_writer(&mut writer, index)?,
        SnapshotFormat::Binary { gzip: false } => {
            bincode::serde::encode_into_std_write(index, &mut writer, config)?;
        }
        SnapshotFormat::Binary { gzip: true } => {
            let mut encoder = GzEncoder::new(&mut writer, Compression::default());
            bincode::serde::encode_into_std_write(index, &mut encoder, config)?;
            encoder.finish()?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Decodes a snapshot held in memory. `json` selects JSON; otherwise the
/// bytes are binary, gunzipped first when they start with the gzip magic.
pub fn decode(bytes: &[u8], json: bool) -> Result<ScheduleIndex, SnapshotError> {
    if json {
        return Ok(serde_json::from_slice(bytes)?);
    }
    decode_binary(bytes)
}

fn decode_binary<R: Read>(reader: R) -> Result<ScheduleIndex, SnapshotError> {
    let mut reader = BufReader::new(reader);
    let config = bincode::config::standard();

    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    debug!(gzipped, "Decoding binary snapshot");

    if gzipped {
        let mut decoder = GzDecoder::new(reader);
        Ok(bincode::serde::decode_from_std_read(&mut decoder, config)?)
    } else {
        Ok(bincode::serde::decode_from_std_read(&mut reader, config)?)
    }
}

#[tracing::instrument(skip(index))]
pub fn write(path: &Path, index: &ScheduleIndex, format: SnapshotFormat) -> Result<(), SnapshotError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = File::create(path)?;
    encode_into(index, format, BufWriter::new(file))?;
    info!(path = %path.display(), ?format, "Snapshot written");
    Ok(())
}

/// Reads a snapshot, picking the format from the file extension.
pub fn read(path: &Path) -> Result<ScheduleIndex, SnapshotError> {
    read_as(path, SnapshotFormat::for_path(path))
}

/// Reads a snapshot written with `format`. Binary snapshots are gunzipped
/// whenever the file starts with the gzip magic, whatever `gzip` says.
#[tracing::instrument]
pub fn read_as(path: &Path, format: SnapshotFormat) -> Result<ScheduleIndex, SnapshotError> {
    let file = File::open(path)?;
    let index = match format {
        SnapshotFormat::Json => serde_json::from_reader(BufReader::new(file))?,
        SnapshotFormat::Binary { .. } => decode_binary(file)?,
    };
    info!(
        path = %path.display(),
        routes = index.route_count(),
        trips = index.trip_count(),
        "Snapshot loaded"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::index::tests::{route, trip};
    use crate::schedule::{CalendarDate, ExceptionType, ShapePoint};
    use chrono::NaiveDate;
    use std::env;

    fn sample() -> ScheduleIndex {
        let mut index = ScheduleIndex::new();
        index.add_route(route(100, "MARTA", "10"));
        index.add_trip(trip(500, 100)).unwrap();
        index.add_shape(ShapePoint {
            shape_id: 1,
            lat: 33.81886,
            lon: -84.450519,
            sequence: 1,
            dist_traveled: 0.0,
        });
        index.add_calendar_date(CalendarDate {
            service_id: 2,
            date: NaiveDate::from_ymd_opt(2022, 5, 30).unwrap(),
            exception_type: ExceptionType::Removed,
        });
        index
    }

    #[test]
    fn test_binary_and_gzip_and_json_reproduce_index() {
        let index = sample();
        for format in [
            SnapshotFormat::Binary { gzip: false },
            SnapshotFormat::Binary { gzip: true },
            SnapshotFormat::Json,
        ] {
            let bytes = encode(&index, format).unwrap();
            let back = decode(&bytes, format == SnapshotFormat::Json).unwrap();
            assert_eq!(back, index, "format {format:?}");
        }
    }

    #[test]
    fn test_gzip_snapshot_is_detected_by_magic() {
        let bytes = encode(&sample(), SnapshotFormat::Binary { gzip: true }).unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));
    }

    #[test]
    fn test_write_then_read_file() {
        let path = env::temp_dir().join("gtfs_rt_enricher_test_snapshot.bin.gz");
        let _ = std::fs::remove_file(&path);

        write(&path, &sample(), SnapshotFormat::Binary { gzip: true }).unwrap();
        let back = read(&path).unwrap();
        assert_eq!(back, sample());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_json_keeps_full_precision_floats() {
        let mut index = ScheduleIndex::new();
        for (sequence, dist) in [
            -401.44236656053437,
            0.1 + 0.2,
            std::f64::consts::PI * 1e5,
            1.0000000000000002,
        ]
        .into_iter()
        .enumerate()
        {
            index.add_shape(ShapePoint {
                shape_id: 9,
                lat: 33.75455312345678 + dist / 1e7,
                lon: -84.46930212345678,
                sequence: sequence as i64,
                dist_traveled: dist,
            });
        }

        let bytes = encode(&index, SnapshotFormat::Json).unwrap();
        let back = decode(&bytes, true).unwrap();

        let dists: Vec<u64> = back
            .shape(9)
            .unwrap()
            .map(|p| p.dist_traveled.to_bits())
            .collect();
        let expected: Vec<u64> = index
            .shape(9)
            .unwrap()
            .map(|p| p.dist_traveled.to_bits())
            .collect();
        assert_eq!(dists, expected);
        assert_eq!(back, index);
    }

    #[test]
    fn test_read_as_ignores_extension() {
        let path = env::temp_dir().join("gtfs_rt_enricher_test_binary_named.json");
        let _ = std::fs::remove_file(&path);

        write(&path, &sample(), SnapshotFormat::Binary { gzip: false }).unwrap();
        assert!(matches!(read(&path), Err(SnapshotError::Json(_))));
        assert_eq!(
            read_as(&path, SnapshotFormat::Binary { gzip: false }).unwrap(),
            sample()
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_truncated_snapshot_is_error() {
        let bytes = encode(&sample(), SnapshotFormat::Binary { gzip: false }).unwrap();
        let err = decode(&bytes[..bytes.len() / 2], false).unwrap_err();
        assert!(matches!(err, SnapshotError::Decode(_)));
    }
}
