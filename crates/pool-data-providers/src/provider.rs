use async_trait::async_trait;
use chrono::NaiveDate;
use pool_data_core::trade::{PoolMetadata, TradeEvent};

use crate::error::ProviderError;

/// Trait for fetching raw pool trade data from an external source.
#[async_trait]
pub trait TradeProvider: Send + Sync {
    /// Provider name (for logging/display).
    fn name(&self) -> &str;

    /// Fetch token precision metadata for a pool.
    async fn fetch_pool(&self, pool: &str) -> Result<PoolMetadata, ProviderError>;

    /// Fetch every trade executed in a pool on a specific UTC day.
    /// Returns the full in-memory event collection sorted by timestamp;
    /// an empty vec means the pool saw no trades that day.
    async fn fetch_trades(
        &self,
        pool: &str,
        date: NaiveDate,
    ) -> Result<Vec<TradeEvent>, ProviderError>;
}
