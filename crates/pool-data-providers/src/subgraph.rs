use async_trait::async_trait;
use chrono::NaiveDate;
use pool_data_core::trade::{PoolMetadata, TradeEvent};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::TradeProvider;

const DEFAULT_SUBGRAPH_URL: &str = "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v3";

/// Rows per swap query. The subgraph caps `first` at 1000.
const PAGE_SIZE: usize = 1000;

const POOL_QUERY: &str = r#"
query Pool($pool: ID!) {
  pool(id: $pool) {
    token0 { decimals }
    token1 { decimals }
  }
}"#;

const SWAPS_QUERY: &str = r#"
query Swaps($pool: String!, $start: BigInt!, $end: BigInt!, $first: Int!, $skip: Int!) {
  swaps(
    first: $first
    skip: $skip
    orderBy: timestamp
    orderDirection: asc
    where: { pool: $pool, timestamp_gte: $start, timestamp_lt: $end }
  ) {
    timestamp
    amountUSD
    sqrtPriceX96
    amount0
    amount1
  }
}"#;

/// GraphQL provider for a Uniswap-v3-style subgraph.
/// No authentication required.
pub struct SubgraphProvider {
    client: Client,
    endpoint: String,
}

impl SubgraphProvider {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_SUBGRAPH_URL.to_string())
    }

    /// Create with a custom endpoint (self-hosted graph node, or testing).
    pub fn with_endpoint(endpoint: String) -> Self {
        Self {
            client: Client::builder()
                .user_agent("pool-data")
                .build()
                .expect("failed to build reqwest client"),
            endpoint,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: body,
            });
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("failed to parse response: {e}")))?;

        if let Some(errors) = body.errors
            && !errors.is_empty()
        {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(ProviderError::Api {
                status: 0,
                message: messages.join("; "),
            });
        }

        body.data
            .ok_or_else(|| ProviderError::Parse("no data in response".into()))
    }
}

impl Default for SubgraphProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PoolData {
    pool: Option<PoolRecord>,
}

#[derive(Debug, Deserialize)]
struct PoolRecord {
    token0: TokenRecord,
    token1: TokenRecord,
}

#[derive(Debug, Deserialize)]
struct TokenRecord {
    decimals: Option<String>,
}

impl PoolRecord {
    /// Decimal counts coerce leniently; an uncoercible count becomes `None`,
    /// which the aggregator treats as degenerate metadata.
    fn to_metadata(&self) -> PoolMetadata {
        PoolMetadata {
            token0_decimals: parse_decimals(&self.token0),
            token1_decimals: parse_decimals(&self.token1),
        }
    }
}

fn parse_decimals(token: &TokenRecord) -> Option<i32> {
    token.decimals.as_deref().and_then(|v| v.parse::<i32>().ok())
}

#[derive(Debug, Deserialize)]
struct SwapsData {
    swaps: Vec<SwapRecord>,
}

/// Raw swap row as the subgraph returns it: every number is a JSON string.
#[derive(Debug, Deserialize)]
struct SwapRecord {
    timestamp: Option<String>,
    #[serde(rename = "amountUSD")]
    amount_usd: Option<String>,
    #[serde(rename = "sqrtPriceX96")]
    sqrt_price_x96: Option<String>,
    amount0: Option<String>,
    amount1: Option<String>,
}

impl SwapRecord {
    /// Coerce a raw row into a typed event. Rows missing a timestamp or USD
    /// notional (or carrying uncoercible ones) yield `None`; the optional
    /// price fields survive or fail individually.
    fn to_event(&self) -> Option<TradeEvent> {
        let timestamp = self.timestamp.as_deref()?.parse::<i64>().ok()?;
        let amount_usd = self.amount_usd.as_deref()?.parse::<Decimal>().ok()?;
        let sqrt_price_x96 = self
            .sqrt_price_x96
            .as_deref()
            .and_then(|v| v.parse::<f64>().ok());
        let amount0 = self.amount0.as_deref().and_then(|v| v.parse::<Decimal>().ok());
        let amount1 = self.amount1.as_deref().and_then(|v| v.parse::<Decimal>().ok());

        Some(TradeEvent {
            timestamp,
            amount_usd,
            sqrt_price_x96,
            amount0,
            amount1,
        })
    }
}

/// Work out the query window for the page after `page`.
///
/// The cursor is the last timestamp seen; `skip` counts the rows already
/// consumed at that exact second, so a second whose swaps straddle a page
/// boundary is re-queried without duplicating rows. Returns `None` when the
/// page carries no timestamp to advance on.
fn next_cursor(page: &[SwapRecord], cursor: &str, skip: usize) -> Option<(String, usize)> {
    let last = page.iter().rev().find_map(|r| r.timestamp.clone())?;
    if last == cursor {
        Some((last, skip + page.len()))
    } else {
        let tail = page
            .iter()
            .filter(|r| r.timestamp.as_deref() == Some(last.as_str()))
            .count();
        Some((last, tail))
    }
}

#[async_trait]
impl TradeProvider for SubgraphProvider {
    fn name(&self) -> &str {
        "subgraph"
    }

    async fn fetch_pool(&self, pool: &str) -> Result<PoolMetadata, ProviderError> {
        let pool = pool.to_lowercase();
        let data: PoolData = self
            .execute(POOL_QUERY, json!({ "pool": pool.as_str() }))
            .await?;
        let record = data.pool.ok_or(ProviderError::PoolNotFound { pool })?;
        Ok(record.to_metadata())
    }

    async fn fetch_trades(
        &self,
        pool: &str,
        date: NaiveDate,
    ) -> Result<Vec<TradeEvent>, ProviderError> {
        let pool = pool.to_lowercase();
        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let day_end = date
            .succ_opt()
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();

        let mut events = Vec::new();
        let mut dropped = 0usize;
        let mut cursor = day_start.to_string();
        let mut skip = 0usize;

        loop {
            let data: SwapsData = self
                .execute(
                    SWAPS_QUERY,
                    json!({
                        "pool": pool.as_str(),
                        "start": cursor.as_str(),
                        "end": day_end.to_string(),
                        "first": PAGE_SIZE,
                        "skip": skip,
                    }),
                )
                .await?;

            for record in &data.swaps {
                match record.to_event() {
                    Some(event) => events.push(event),
                    None => dropped += 1,
                }
            }

            if data.swaps.len() < PAGE_SIZE {
                break;
            }
            match next_cursor(&data.swaps, &cursor, skip) {
                Some((next, next_skip)) => {
                    cursor = next;
                    skip = next_skip;
                }
                None => break,
            }
        }

        if dropped > 0 {
            debug!("{pool} {date}: dropped {dropped} malformed swap record(s)");
        }

        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(timestamp: &str) -> SwapRecord {
        SwapRecord {
            timestamp: Some(timestamp.to_string()),
            amount_usd: Some("100".to_string()),
            sqrt_price_x96: None,
            amount0: None,
            amount1: None,
        }
    }

    #[test]
    fn swap_record_to_event() {
        let record = SwapRecord {
            timestamp: Some("1736951400".to_string()),
            amount_usd: Some("12345.678".to_string()),
            sqrt_price_x96: Some("79228162514264337593543950336".to_string()),
            amount0: Some("-1.5".to_string()),
            amount1: Some("2775.0".to_string()),
        };

        let event = record.to_event().unwrap();
        assert_eq!(event.timestamp, 1736951400);
        assert_eq!(event.amount_usd, dec!(12345.678));
        assert_eq!(event.sqrt_price_x96, Some(79228162514264337593543950336.0));
        assert_eq!(event.amount0, Some(dec!(-1.5)));
        assert_eq!(event.amount1, Some(dec!(2775.0)));
    }

    #[test]
    fn swap_record_missing_required_fields() {
        let record = SwapRecord {
            timestamp: None,
            amount_usd: Some("100".to_string()),
            sqrt_price_x96: None,
            amount0: None,
            amount1: None,
        };
        assert!(record.to_event().is_none());

        let record = SwapRecord {
            timestamp: Some("1736951400".to_string()),
            amount_usd: None,
            sqrt_price_x96: None,
            amount0: None,
            amount1: None,
        };
        assert!(record.to_event().is_none());
    }

    #[test]
    fn swap_record_uncoercible_required_field() {
        let record = SwapRecord {
            timestamp: Some("not-a-number".to_string()),
            amount_usd: Some("100".to_string()),
            sqrt_price_x96: None,
            amount0: None,
            amount1: None,
        };
        assert!(record.to_event().is_none());
    }

    #[test]
    fn swap_record_bad_optional_field_survives() {
        let record = SwapRecord {
            timestamp: Some("1736951400".to_string()),
            amount_usd: Some("100".to_string()),
            sqrt_price_x96: Some("garbage".to_string()),
            amount0: Some("1".to_string()),
            amount1: Some("200".to_string()),
        };

        let event = record.to_event().unwrap();
        assert_eq!(event.sqrt_price_x96, None);
        assert_eq!(event.amount0, Some(dec!(1)));
    }

    #[test]
    fn parse_swaps_response_json() {
        let json = r#"{
            "data": {
                "swaps": [
                    {
                        "timestamp": "1736951400",
                        "amountUSD": "1000.50",
                        "sqrtPriceX96": "79228162514264337593543950336",
                        "amount0": "1.0",
                        "amount1": "-2775.0"
                    },
                    {
                        "timestamp": "1736951412",
                        "amountUSD": "250.25",
                        "sqrtPriceX96": null,
                        "amount0": "0.1",
                        "amount1": "-277.5"
                    }
                ]
            }
        }"#;

        let response: GraphQlResponse<SwapsData> = serde_json::from_str(json).unwrap();
        let swaps = response.data.unwrap().swaps;
        assert_eq!(swaps.len(), 2);
        assert_eq!(swaps[0].amount_usd.as_deref(), Some("1000.50"));
        assert!(swaps[1].sqrt_price_x96.is_none());
    }

    #[test]
    fn parse_pool_response_json() {
        let json = r#"{
            "data": {
                "pool": {
                    "token0": { "decimals": "6" },
                    "token1": { "decimals": "18" }
                }
            }
        }"#;

        let response: GraphQlResponse<PoolData> = serde_json::from_str(json).unwrap();
        let meta = response.data.unwrap().pool.unwrap().to_metadata();
        assert_eq!(meta.token0_decimals, Some(6));
        assert_eq!(meta.token1_decimals, Some(18));
    }

    #[test]
    fn parse_pool_uncoercible_decimals() {
        let json = r#"{
            "data": {
                "pool": {
                    "token0": { "decimals": "many" },
                    "token1": { "decimals": "18" }
                }
            }
        }"#;

        let response: GraphQlResponse<PoolData> = serde_json::from_str(json).unwrap();
        let meta = response.data.unwrap().pool.unwrap().to_metadata();
        assert_eq!(meta.token0_decimals, None);
        assert_eq!(meta.rescale_exponent(), None);
    }

    #[test]
    fn parse_graphql_error_response() {
        let json = r#"{
            "data": null,
            "errors": [
                { "message": "pool does not exist" }
            ]
        }"#;

        let response: GraphQlResponse<PoolData> = serde_json::from_str(json).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors.unwrap()[0].message, "pool does not exist");
    }

    #[test]
    fn next_cursor_advances_to_new_second() {
        let page = vec![record("100"), record("100"), record("105"), record("105")];
        let (cursor, skip) = next_cursor(&page, "90", 0).unwrap();
        assert_eq!(cursor, "105");
        assert_eq!(skip, 2);
    }

    #[test]
    fn next_cursor_accumulates_skip_within_one_second() {
        let page = vec![record("100"), record("100"), record("100")];
        let (cursor, skip) = next_cursor(&page, "100", 3).unwrap();
        assert_eq!(cursor, "100");
        assert_eq!(skip, 6);
    }

    #[test]
    fn next_cursor_without_timestamps() {
        let page = vec![SwapRecord {
            timestamp: None,
            amount_usd: Some("1".to_string()),
            sqrt_price_x96: None,
            amount0: None,
            amount1: None,
        }];
        assert!(next_cursor(&page, "100", 0).is_none());
    }
}
