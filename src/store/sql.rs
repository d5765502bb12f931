use async_trait::async_trait;
use csv::StringRecord;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{ScheduleStore, StoreError};
use crate::config::StoreConfig;
use crate::schedule::fields::{Columns, Row as FieldRow};
use crate::schedule::{
    Agency, Calendar, CalendarDate, GtfsRecord, Route, ScheduleIndex, ShapePoint, Stop, StopTime,
    Trip,
};

/// Stay under SQLite's bound-parameter limit in one INSERT.
const MAX_BINDS: usize = 32_766;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    MySql,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(StoreError::UnsupportedUrl(url.to_string())),
        }
    }

    /// Bind marker for the `n`th (1-based) parameter.
    fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::Sqlite | Self::MySql => "?".to_string(),
        }
    }
}

/// A GTFS table persisted with one text column per CSV column.
trait Table: GtfsRecord + Send {
    const KEY: &'static [&'static str];

    fn table() -> &'static str {
        Self::FILE_NAME.trim_end_matches(".txt")
    }

    fn create_sql() -> String {
        let columns: Vec<String> = Self::COLUMNS
            .iter()
            .map(|c| {
                let ty = if Self::KEY.contains(c) {
                    "VARCHAR(255)"
                } else {
                    "TEXT"
                };
                format!("{c} {ty} NOT NULL")
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
            Self::table(),
            columns.join(", "),
            Self::KEY.join(", ")
        )
    }

    fn columns() -> Columns {
        Columns::from_header(&StringRecord::from(Self::COLUMNS.to_vec()))
    }
}

impl Table for Agency {
    const KEY: &'static [&'static str] = &["agency_id"];
}
impl Table for Route {
    const KEY: &'static [&'static str] = &["route_id"];
}
impl Table for Stop {
    const KEY: &'static [&'static str] = &["stop_id"];
}
impl Table for Calendar {
    const KEY: &'static [&'static str] = &["service_id"];
}
impl Table for CalendarDate {
    const KEY: &'static [&'static str] = &["service_id", "date"];
}
impl Table for Trip {
    const KEY: &'static [&'static str] = &["trip_id", "route_id"];
}
impl Table for ShapePoint {
    const KEY: &'static [&'static str] = &["shape_id", "shape_pt_sequence"];
}
impl Table for StopTime {
    const KEY: &'static [&'static str] = &["trip_id", "stop_id"];
}

fn decode_row<T: Table>(columns: &Columns, row: &AnyRow) -> Result<T, StoreError> {
    let values = (0..T::COLUMNS.len())
        .map(|i| row.try_get::<String, _>(i))
        .collect::<Result<Vec<_>, _>>()?;
    let record = StringRecord::from(values);
    T::from_row(&FieldRow::new(columns, &record)).map_err(|source| StoreError::Corrupt {
        table: T::table(),
        source,
    })
}

/// Schedule persistence over the `sqlx` Any driver.
pub struct SqlStore {
    pool: AnyPool,
    backend: Backend,
    batch_size: usize,
}

impl SqlStore {
    /// Connects and creates the eight tables if they do not exist yet.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend = Backend::from_url(&config.database_url)?;
        sqlx::any::install_default_drivers();

        // An in-memory SQLite database lives and dies with its connection.
        let options = match backend {
            Backend::Sqlite => AnyPoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>),
            Backend::MySql | Backend::Postgres => AnyPoolOptions::new().max_connections(5),
        };
        let pool = options.connect(&config.database_url).await?;

        let store = Self {
            pool,
            backend,
            batch_size: config.batch_size.max(1),
        };
        store.create_tables().await?;
        info!(?backend, batch_size = store.batch_size, "Schedule store ready");
        Ok(store)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        for sql in [
            Agency::create_sql(),
            Route::create_sql(),
            Stop::create_sql(),
            Calendar::create_sql(),
            CalendarDate::create_sql(),
            Trip::create_sql(),
            ShapePoint::create_sql(),
            StopTime::create_sql(),
        ] {
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn replace_table<T: Table>(
        &self,
        tx: &mut Transaction<'static, Any>,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError> {
        let table = T::table();
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut **tx)
            .await?;

        let width = T::COLUMNS.len();
        let per_statement = self.batch_size.min(MAX_BINDS / width).max(1);
        let head = format!("INSERT INTO {table} ({}) VALUES ", T::COLUMNS.join(", "));

        for (batch, chunk) in rows.chunks(per_statement).enumerate() {
            let mut sql = head.clone();
            let mut n = 0;
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let marks: Vec<String> = (0..width)
                    .map(|_| {
                        n += 1;
                        self.backend.placeholder(n)
                    })
                    .collect();
                sql.push('(');
                sql.push_str(&marks.join(", "));
                sql.push(')');
            }

            let mut query = sqlx::query(&sql);
            for value in chunk.iter().flatten() {
                query = query.bind(value.as_str());
            }
            query.execute(&mut **tx).await?;
            debug!(table, batch, rows = chunk.len(), "Inserted batch");
        }

        info!(table, rows = rows.len(), "Table replaced");
        Ok(())
    }

    async fn find<T: Table>(&self, key: &[String]) -> Result<Option<T>, StoreError> {
        let filter: Vec<String> = T::KEY
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{k} = {}", self.backend.placeholder(i + 1)))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            T::COLUMNS.join(", "),
            T::table(),
            filter.join(" AND ")
        );

        let mut query = sqlx::query(&sql);
        for value in key {
            query = query.bind(value.as_str());
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.map(|r| decode_row::<T>(&T::columns(), &r)).transpose()
    }

    async fn all<T: Table>(&self) -> Result<Vec<T>, StoreError> {
        let sql = format!("SELECT {} FROM {}", T::COLUMNS.join(", "), T::table());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let columns = T::columns();
        rows.iter().map(|r| decode_row::<T>(&columns, r)).collect()
    }
}

fn rows_of<'a, T: GtfsRecord + 'a>(records: impl Iterator<Item = &'a T>) -> Vec<Vec<String>> {
    records.map(T::to_row).collect()
}

#[async_trait]
impl ScheduleStore for SqlStore {
    #[tracing::instrument(skip_all, fields(backend = ?self.backend))]
    async fn replace_schedule(&self, index: &ScheduleIndex) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        self.replace_table::<Agency>(&mut tx, rows_of(index.agencies()))
            .await?;
        self.replace_table::<Route>(&mut tx, rows_of(index.routes()))
            .await?;
        self.replace_table::<Stop>(&mut tx, rows_of(index.stops()))
            .await?;
        self.replace_table::<Calendar>(&mut tx, rows_of(index.calendars()))
            .await?;
        self.replace_table::<CalendarDate>(&mut tx, rows_of(index.calendar_dates()))
            .await?;
        self.replace_table::<Trip>(&mut tx, rows_of(index.trips()))
            .await?;
        self.replace_table::<ShapePoint>(&mut tx, rows_of(index.shape_points()))
            .await?;
        self.replace_table::<StopTime>(&mut tx, rows_of(index.stop_times()))
            .await?;

        tx.commit().await?;
        info!("Schedule committed");
        Ok(())
    }

    async fn agency(&self, agency_id: &str) -> Result<Option<Agency>, StoreError> {
        self.find(&[agency_id.to_string()]).await
    }

    async fn route(&self, route_id: i64) -> Result<Option<Route>, StoreError> {
        self.find(&[route_id.to_string()]).await
    }

    async fn stop(&self, stop_id: i64) -> Result<Option<Stop>, StoreError> {
        self.find(&[stop_id.to_string()]).await
    }

    async fn trip(&self, trip_id: i64, route_id: i64) -> Result<Option<Trip>, StoreError> {
        self.find(&[trip_id.to_string(), route_id.to_string()])
            .await
    }

    #[tracing::instrument(skip_all, fields(backend = ?self.backend))]
    async fn load_schedule(&self) -> Result<ScheduleIndex, StoreError> {
        let mut index = ScheduleIndex::new();
        for a in self.all::<Agency>().await? {
            index.add_agency(a);
        }
        for r in self.all::<Route>().await? {
            index.add_route(r);
        }
        for s in self.all::<Stop>().await? {
            index.add_stop(s);
        }
        for c in self.all::<Calendar>().await? {
            index.add_calendar(c);
        }
        for d in self.all::<CalendarDate>().await? {
            index.add_calendar_date(d);
        }
        for t in self.all::<Trip>().await? {
            index.add_trip(t)?;
        }
        for p in self.all::<ShapePoint>().await? {
            index.add_shape(p);
        }
        for st in self.all::<StopTime>().await? {
            index.add_stop_time(st);
        }
        info!(
            routes = index.route_count(),
            trips = index.trip_count(),
            "Schedule loaded from database"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::PickupDropOff;
    use crate::schedule::index::tests::{route, trip};

    fn sample() -> ScheduleIndex {
        let mut index = ScheduleIndex::new();
        index.add_agency(Agency {
            agency_id: "MARTA".to_string(),
            name: "Metropolitan Atlanta Rapid Transit Authority".to_string(),
            url: "https://itsmarta.com".to_string(),
            timezone: "America/New_York".to_string(),
            lang: "en".to_string(),
            phone: "(404)848-5000".to_string(),
            fare_url: String::new(),
        });
        index.add_route(route(100, "MARTA", "10"));
        index.add_route(route(101, "MARTA", "11"));
        index.add_trip(trip(500, 100)).unwrap();
        index.add_trip(trip(500, 101)).unwrap();
        index.add_trip(trip(501, 100)).unwrap();
        index.add_stop_time(StopTime {
            trip_id: 500,
            arrival_time: "25:01:00".to_string(),
            departure_time: "25:01:30".to_string(),
            stop_id: 27,
            stop_sequence: 1,
            stop_headsign: String::new(),
            pickup_type: PickupDropOff::Regular,
            drop_off_type: PickupDropOff::NotAvailable,
            shape_dist_traveled: 1.25,
            timepoint: true,
        });
        index
    }

    async fn memory_store(batch_size: usize) -> SqlStore {
        SqlStore::connect(&StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            batch_size,
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(Backend::from_url("sqlite::memory:").unwrap(), Backend::Sqlite);
        assert_eq!(
            Backend::from_url("postgres://u:p@localhost/gtfs").unwrap(),
            Backend::Postgres
        );
        assert_eq!(Backend::from_url("mysql://localhost/gtfs").unwrap(), Backend::MySql);
        assert!(matches!(
            Backend::from_url("redis://localhost"),
            Err(StoreError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn test_create_sql_keys() {
        let sql = Trip::create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS trips ("));
        assert!(sql.contains("trip_id VARCHAR(255) NOT NULL"));
        assert!(sql.contains("trip_headsign TEXT NOT NULL"));
        assert!(sql.ends_with("PRIMARY KEY (trip_id, route_id))"));
    }

    #[tokio::test]
    async fn test_replace_then_point_lookups() {
        let store = memory_store(2000).await;
        store.replace_schedule(&sample()).await.unwrap();

        let agency = store.agency("MARTA").await.unwrap().unwrap();
        assert_eq!(agency.phone, "(404)848-5000");
        assert_eq!(store.route(101).await.unwrap().unwrap().short_name, "11");
        assert!(store.route(999).await.unwrap().is_none());
        assert!(store.trip(500, 101).await.unwrap().is_some());
        assert!(store.trip(501, 101).await.unwrap().is_none());
        assert!(store.stop(27).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_batch_size_still_writes_rows() {
        let store = memory_store(0).await;
        store.replace_schedule(&sample()).await.unwrap();
        assert_eq!(store.load_schedule().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_load_schedule_matches_written_index() {
        // batch of one row forces many INSERT statements
        let store = memory_store(1).await;
        let index = sample();
        store.replace_schedule(&index).await.unwrap();

        let loaded = store.load_schedule().await.unwrap();
        assert_eq!(loaded, index);
    }

    #[tokio::test]
    async fn test_replace_twice_does_not_accumulate() {
        let store = memory_store(2).await;
        store.replace_schedule(&sample()).await.unwrap();
        store.replace_schedule(&sample()).await.unwrap();

        let loaded = store.load_schedule().await.unwrap();
        assert_eq!(loaded.trip_count(), 3);
        assert_eq!(loaded, sample());
    }
}
