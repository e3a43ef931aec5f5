use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::calendar;
use crate::candle::Candle;
use crate::error::PoolDataError;
use crate::schema;

/// Filesystem-backed store for minute candle data in Parquet format.
///
/// Directory layout: `{root}/data/{pool}/{YYYY}/{MM}/{YYYY-MM-DD}.parquet`,
/// where `pool` is the lowercase pool address.
pub struct CandleStore {
    data_dir: PathBuf,
}

impl CandleStore {
    /// Create a store rooted at the given directory.
    /// The `data/` subdirectory is used automatically.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            data_dir: root.as_ref().join("data"),
        }
    }

    /// Create a store pointing directly at the data directory (no `data/` suffix).
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Path to the Parquet file for a given pool and date.
    pub fn file_path(&self, pool: &str, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(pool)
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(format!("{}.parquet", date.format("%Y-%m-%d")))
    }

    /// Check if data exists for a pool on a given date.
    pub fn has_data(&self, pool: &str, date: NaiveDate) -> bool {
        self.file_path(pool, date).exists()
    }

    /// Find which days in a range are missing data for a pool.
    /// Every calendar day counts; a DEX has no closed days.
    pub fn missing_dates(&self, pool: &str, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        calendar::days(start, end)
            .into_iter()
            .filter(|d| !self.has_data(pool, *d))
            .collect()
    }

    /// Write candles for a single date to a Parquet file.
    /// Creates parent directories as needed. Overwrites if file already exists.
    pub fn write_day(
        &self,
        pool: &str,
        date: NaiveDate,
        candles: &[Candle],
    ) -> Result<(), PoolDataError> {
        let path = self.file_path(pool, date);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        schema::write_parquet(&path, candles)
    }

    /// Read all candles for a pool on a specific date.
    pub fn read_day(&self, pool: &str, date: NaiveDate) -> Result<Vec<Candle>, PoolDataError> {
        let path = self.file_path(pool, date);
        if !path.exists() {
            return Err(PoolDataError::NoData {
                pool: pool.to_string(),
                date,
            });
        }
        schema::read_parquet(&path)
    }

    /// Read candles for a pool across a date range (inclusive).
    /// Returns candles sorted by bucket start. Skips dates without data.
    pub fn read_range(
        &self,
        pool: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, PoolDataError> {
        let dates = calendar::days(start, end);
        let mut all_candles = Vec::new();

        for date in dates {
            if self.has_data(pool, date) {
                let mut candles = schema::read_parquet(&self.file_path(pool, date))?;
                all_candles.append(&mut candles);
            }
        }

        all_candles.sort_by_key(|c| c.bucket_start);
        Ok(all_candles)
    }

    /// List all pools that have data in the store.
    pub fn list_pools(&self) -> Result<Vec<String>, PoolDataError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut pools = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                pools.push(name.to_string());
            }
        }
        pools.sort();
        Ok(pools)
    }

    /// List all dates with data for a given pool, sorted ascending.
    pub fn list_dates(&self, pool: &str) -> Result<Vec<NaiveDate>, PoolDataError> {
        let pool_dir = self.data_dir.join(pool);
        if !pool_dir.exists() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();

        // Walk year directories
        for year_entry in std::fs::read_dir(&pool_dir)? {
            let year_entry = year_entry?;
            if !year_entry.file_type()?.is_dir() {
                continue;
            }

            // Walk month directories
            for month_entry in std::fs::read_dir(year_entry.path())? {
                let month_entry = month_entry?;
                if !month_entry.file_type()?.is_dir() {
                    continue;
                }

                // Walk parquet files
                for file_entry in std::fs::read_dir(month_entry.path())? {
                    let file_entry = file_entry?;
                    let file_name = file_entry.file_name();
                    let name = file_name.to_string_lossy();
                    if let Some(date_str) = name.strip_suffix(".parquet")
                        && let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                    {
                        dates.push(date);
                    }
                }
            }
        }

        dates.sort();
        Ok(dates)
    }

    /// Get the date range (earliest, latest) for a pool, or None if no data.
    pub fn date_range(&self, pool: &str) -> Result<Option<(NaiveDate, NaiveDate)>, PoolDataError> {
        let dates = self.list_dates(pool)?;
        Ok(dates.first().copied().zip(dates.last().copied()))
    }
}
