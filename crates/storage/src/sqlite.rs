//! SQLite-backed series store

use crate::sample::{
    EnvironmentSample, Metric, NoiseSample, Road, Series, SeriesRow, TrafficSample,
};
use crate::store::{BucketAverage, RangeAverage, SeriesStore};
use crate::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

const ENVIRONMENT_COLUMNS: &str =
    "timestamp, location, pm2_5, temperature, weather, wind_speed, rain";

const NOISE_COLUMNS: &str =
    "timestamp, datetime, laeq, lafmax, la10, la90, lceq, lcfmax, lc10, lc90";

fn traffic_columns() -> String {
    let roads: Vec<&str> = Road::ALL.iter().map(|road| road.column()).collect();
    format!("timestamp, {}", roads.join(", "))
}

fn select_columns(series: Series) -> String {
    match series {
        Series::Environment => ENVIRONMENT_COLUMNS.to_string(),
        Series::Traffic => traffic_columns(),
        Series::Noise => NOISE_COLUMNS.to_string(),
    }
}

fn check_timestamp(series: Series, timestamp: i64) -> Result<(), StorageError> {
    if timestamp < 0 {
        return Err(StorageError::InvalidRecord(format!(
            "{} sample has negative timestamp {}",
            series, timestamp
        )));
    }
    Ok(())
}

/// Series store over a sqlx SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database URL such as `sqlite://data/bikehood.db` and
    /// make sure the schema exists
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path_part).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StorageError::DatabaseError(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!("Connected to database: {}", db_url);

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Private in-memory database.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the schema must already be in place
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize database schema
    async fn init(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS environment (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                location TEXT NOT NULL,
                pm2_5 REAL,
                temperature REAL,
                weather TEXT,
                wind_speed REAL,
                rain REAL
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        let road_columns: Vec<String> = Road::ALL
            .iter()
            .map(|road| format!("{} REAL", road.column()))
            .collect();
        let traffic_ddl = format!(
            "CREATE TABLE IF NOT EXISTS traffic (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                timestamp INTEGER NOT NULL, \
                {}\
            );",
            road_columns.join(", ")
        );
        sqlx::query(&traffic_ddl).execute(&mut *conn).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS noise (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                datetime TEXT NOT NULL,
                laeq REAL NOT NULL,
                lafmax REAL NOT NULL,
                la10 REAL NOT NULL,
                la90 REAL NOT NULL,
                lceq REAL NOT NULL,
                lcfmax REAL NOT NULL,
                lc10 REAL NOT NULL,
                lc90 REAL NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        for series in [Series::Environment, Series::Traffic, Series::Noise] {
            let index = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table} (timestamp);",
                table = series.table()
            );
            sqlx::query(&index).execute(&mut *conn).await?;
        }

        info!("Database schema initialized.");
        Ok(())
    }

    pub async fn insert_environment(&self, sample: &EnvironmentSample) -> Result<(), StorageError> {
        check_timestamp(Series::Environment, sample.timestamp)?;
        sqlx::query(
            r#"
            INSERT INTO environment (timestamp, location, pm2_5, temperature, weather, wind_speed, rain)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.timestamp)
        .bind(&sample.location)
        .bind(sample.pm2_5)
        .bind(sample.temperature)
        .bind(&sample.weather)
        .bind(sample.wind_speed)
        .bind(sample.rain)
        .execute(&self.pool)
        .await?;

        debug!("Inserted environment sample at {}", sample.timestamp);
        Ok(())
    }

    pub async fn insert_traffic(&self, sample: &TrafficSample) -> Result<(), StorageError> {
        check_timestamp(Series::Traffic, sample.timestamp)?;
        let placeholders = vec!["?"; Road::ALL.len() + 1].join(", ");
        let sql = format!(
            "INSERT INTO traffic ({}) VALUES ({})",
            traffic_columns(),
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(sample.timestamp);
        for road in Road::ALL {
            query = query.bind(sample.road(road));
        }
        query.execute(&self.pool).await?;

        debug!("Inserted traffic sample at {}", sample.timestamp);
        Ok(())
    }

    pub async fn insert_noise(&self, sample: &NoiseSample) -> Result<(), StorageError> {
        check_timestamp(Series::Noise, sample.timestamp)?;
        sqlx::query(
            r#"
            INSERT INTO noise (timestamp, datetime, laeq, lafmax, la10, la90, lceq, lcfmax, lc10, lc90)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.timestamp)
        .bind(&sample.datetime)
        .bind(sample.laeq)
        .bind(sample.lafmax)
        .bind(sample.la10)
        .bind(sample.la90)
        .bind(sample.lceq)
        .bind(sample.lcfmax)
        .bind(sample.lc10)
        .bind(sample.lc90)
        .execute(&self.pool)
        .await?;

        debug!("Inserted noise sample at {}", sample.timestamp);
        Ok(())
    }

    async fn fetch_row<T>(
        &self,
        sql: &str,
        binds: &[i64],
    ) -> Result<Option<T>, StorageError>
    where
        T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut query = sqlx::query_as::<_, T>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn fetch_series_row(
        &self,
        series: Series,
        sql: &str,
        binds: &[i64],
    ) -> Result<Option<SeriesRow>, StorageError> {
        let row = match series {
            Series::Environment => self
                .fetch_row::<EnvironmentSample>(sql, binds)
                .await?
                .map(SeriesRow::Environment),
            Series::Traffic => self
                .fetch_row::<TrafficSample>(sql, binds)
                .await?
                .map(SeriesRow::Traffic),
            Series::Noise => self
                .fetch_row::<NoiseSample>(sql, binds)
                .await?
                .map(SeriesRow::Noise),
        };
        Ok(row)
    }
}

#[async_trait]
impl SeriesStore for SqliteStore {
    async fn max_timestamp(&self, series: Series) -> Result<Option<i64>, StorageError> {
        let sql = format!("SELECT MAX(timestamp) FROM {}", series.table());
        let max: Option<i64> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(max)
    }

    async fn latest(&self, series: Series) -> Result<Option<SeriesRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY timestamp DESC, id DESC LIMIT 1",
            select_columns(series),
            series.table()
        );
        self.fetch_series_row(series, &sql, &[]).await
    }

    async fn nearest(
        &self,
        series: Series,
        start: i64,
        end: i64,
        target: i64,
    ) -> Result<Option<SeriesRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE timestamp BETWEEN ? AND ? \
             ORDER BY ABS(timestamp - ?) ASC, id ASC LIMIT 1",
            select_columns(series),
            series.table()
        );
        self.fetch_series_row(series, &sql, &[start, end, target]).await
    }

    async fn range_average(
        &self,
        metric: Metric,
        start: i64,
        end: i64,
    ) -> Result<RangeAverage, StorageError> {
        let expr = metric.sql_expr();
        let sql = format!(
            "SELECT AVG({expr}) AS average, COUNT({expr}) AS samples \
             FROM {table} WHERE timestamp BETWEEN ? AND ?",
            expr = expr,
            table = metric.series().table()
        );

        let row = sqlx::query(&sql)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

        Ok(RangeAverage {
            average: row.try_get::<Option<f64>, _>("average")?,
            count: row.try_get::<i64, _>("samples")?,
        })
    }

    async fn bucket_averages(
        &self,
        metric: Metric,
        bucket_secs: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<BucketAverage>, StorageError> {
        if bucket_secs <= 0 {
            return Err(StorageError::InvalidRecord(format!(
                "bucket width must be positive, got {}",
                bucket_secs
            )));
        }

        // Stored timestamps are never negative, so integer division floors.
        let expr = metric.sql_expr();
        let sql = format!(
            "SELECT (timestamp / ?) * ? AS bucket, AVG({expr}) AS average, COUNT({expr}) AS samples \
             FROM {table} WHERE timestamp BETWEEN ? AND ? \
             GROUP BY bucket HAVING COUNT({expr}) > 0 ORDER BY bucket ASC",
            expr = expr,
            table = metric.series().table()
        );

        let rows = sqlx::query(&sql)
            .bind(bucket_secs)
            .bind(bucket_secs)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        let mut buckets = Vec::with_capacity(rows.len());
        for row in rows {
            let average: Option<f64> = row.try_get("average")?;
            if let Some(average) = average {
                buckets.push(BucketAverage {
                    bucket: row.try_get("bucket")?,
                    average,
                    count: row.try_get("samples")?,
                });
            }
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{EnvironmentField, NoiseField};

    fn env(timestamp: i64, pm2_5: Option<f64>) -> EnvironmentSample {
        EnvironmentSample {
            timestamp,
            location: "Ongar".to_string(),
            pm2_5,
            temperature: Some(11.5),
            weather: Some("Rain".to_string()),
            wind_speed: Some(4.1),
            rain: Some(0.3),
        }
    }

    fn noise(timestamp: i64, laeq: f64) -> NoiseSample {
        NoiseSample {
            timestamp,
            datetime: "2025-01-01 00:00:00".to_string(),
            laeq,
            lafmax: laeq + 10.0,
            la10: laeq + 2.0,
            la90: laeq - 5.0,
            lceq: laeq + 1.0,
            lcfmax: laeq + 12.0,
            lc10: laeq + 3.0,
            lc90: laeq - 4.0,
        }
    }

    const PM25: Metric = Metric::Environment(EnvironmentField::Pm25);

    #[tokio::test]
    async fn test_empty_series() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.max_timestamp(Series::Traffic).await.unwrap(), None);
        assert!(store.latest(Series::Noise).await.unwrap().is_none());

        let avg = store.range_average(PM25, 0, 100).await.unwrap();
        assert_eq!(avg, RangeAverage { average: None, count: 0 });
    }

    #[tokio::test]
    async fn test_latest_prefers_max_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_environment(&env(3000, Some(3.0))).await.unwrap();
        store.insert_environment(&env(5000, Some(5.0))).await.unwrap();
        store.insert_environment(&env(4000, Some(4.0))).await.unwrap();

        let latest = store.latest(Series::Environment).await.unwrap().unwrap();
        assert_eq!(latest.timestamp(), 5000);
        assert_eq!(store.max_timestamp(Series::Environment).await.unwrap(), Some(5000));
    }

    #[tokio::test]
    async fn test_nearest_tie_goes_to_first_written() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_noise(&noise(90, 40.0)).await.unwrap();
        store.insert_noise(&noise(110, 50.0)).await.unwrap();
        store.insert_noise(&noise(300, 60.0)).await.unwrap();

        let row = store.nearest(Series::Noise, 0, 200, 100).await.unwrap().unwrap();
        match row {
            SeriesRow::Noise(sample) => assert_eq!(sample.laeq, 40.0),
            other => panic!("unexpected row {:?}", other),
        }

        assert!(store.nearest(Series::Noise, 400, 500, 450).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_average_skips_nulls() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_environment(&env(10, Some(10.0))).await.unwrap();
        store.insert_environment(&env(20, None)).await.unwrap();
        store.insert_environment(&env(30, Some(20.0))).await.unwrap();

        let avg = store.range_average(PM25, 0, 30).await.unwrap();
        assert_eq!(avg.count, 2);
        assert!((avg.average.unwrap() - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_bucket_averages() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_environment(&env(1000, Some(10.0))).await.unwrap();
        store.insert_environment(&env(3700, Some(20.0))).await.unwrap();
        store.insert_environment(&env(3800, Some(30.0))).await.unwrap();
        store.insert_environment(&env(7300, None)).await.unwrap();

        let buckets = store.bucket_averages(PM25, 3600, 0, 10_000).await.unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket, 0);
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[1].bucket, 3600);
        assert!((buckets[1].average - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_traffic_mean_and_road_columns() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut sample = TrafficSample::uniform(100, 9.0);
        sample.set_road(Road::StationRoad, Some(0.0));
        store.insert_traffic(&sample).await.unwrap();

        let mean = store.range_average(Metric::TrafficMean, 0, 200).await.unwrap();
        assert!((mean.average.unwrap() - 8.0).abs() < 1e-9);

        let road = store
            .range_average(Metric::Road(Road::StationRoad), 0, 200)
            .await
            .unwrap();
        assert_eq!(road.average, Some(0.0));

        let latest = store.latest(Series::Traffic).await.unwrap().unwrap();
        assert_eq!(latest, SeriesRow::Traffic(sample));
    }

    #[tokio::test]
    async fn test_noise_field_average() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_noise(&noise(10, 50.0)).await.unwrap();
        store.insert_noise(&noise(20, 60.0)).await.unwrap();

        let avg = store
            .range_average(Metric::Noise(NoiseField::La90), 0, 20)
            .await
            .unwrap();
        assert_eq!(avg.average, Some(50.0));
    }

    #[tokio::test]
    async fn test_negative_timestamp_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.insert_environment(&env(-1, None)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }
}
