use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::candle::Candle;
use crate::trade::{PoolMetadata, TradeEvent};

/// Width of an aggregation bucket in seconds.
const BUCKET_SECS: i64 = 60;

/// 2^96, the denominator of the Q64.96 square-root price encoding.
const Q96: f64 = 79228162514264337593543950336.0;

/// Result of aggregating one pool's trade events.
///
/// An empty `candles` vec is the normal outcome for a period with no trades
/// or no derivable prices, not an error. `unscaled` is set when prices were
/// recovered from the encoded square-root form without the token-decimal
/// rescale because the pool metadata was missing or negative.
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteSeries {
    pub candles: Vec<Candle>,
    pub unscaled: bool,
}

impl MinuteSeries {
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// How a trade's price was derived.
enum PriceSource {
    Encoded,
    Ratio,
}

/// A trade that survived validation and carries a derived price.
struct PricedTrade {
    timestamp: i64,
    price: Decimal,
    volume: Decimal,
    source: PriceSource,
}

/// Running OHLCV state for one minute bucket.
struct Bucket {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    trade_count: i64,
}

impl Bucket {
    fn to_candle(&self, bucket_start: DateTime<Utc>) -> Candle {
        Candle {
            bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            trade_count: self.trade_count,
        }
    }
}

/// Recover a price from the Q64.96 square-root encoding: `(value / 2^96)^2`,
/// rescaled by `10^(token1_decimals - token0_decimals)` when the metadata
/// allows it.
fn decode_sqrt_price(sqrt_price_x96: f64, rescale_exponent: Option<i32>) -> Option<Decimal> {
    if !sqrt_price_x96.is_finite() {
        return None;
    }
    let ratio = sqrt_price_x96 / Q96;
    let mut price = ratio * ratio;
    if let Some(exp) = rescale_exponent {
        price *= 10f64.powi(exp);
    }
    if !price.is_finite() {
        return None;
    }
    Decimal::try_from(price).ok()
}

/// Derive a trade's price. The encoded square-root form wins whenever it
/// yields a usable value; the token-amount ratio is the fallback. Trades
/// with neither carry no price and are excluded from aggregation.
fn derive_price(event: &TradeEvent, rescale_exponent: Option<i32>) -> Option<(Decimal, PriceSource)> {
    if let Some(sqrt_price) = event.sqrt_price_x96
        && let Some(price) = decode_sqrt_price(sqrt_price, rescale_exponent)
    {
        return Some((price, PriceSource::Encoded));
    }
    match (event.amount0, event.amount1) {
        (Some(a0), Some(a1)) if !a0.is_zero() => Some((a1.abs() / a0.abs(), PriceSource::Ratio)),
        _ => None,
    }
}

fn gap_candle(bucket_start: DateTime<Utc>, close: Decimal) -> Candle {
    Candle {
        bucket_start,
        open: close,
        high: close,
        low: close,
        close,
        volume: Decimal::ZERO,
        trade_count: 0,
    }
}

/// Aggregate raw trade events into an ascending, gap-filled sequence of
/// one-minute candles.
///
/// Input order is irrelevant except as the tie-break between trades sharing
/// a timestamp. Every minute between the first and last populated bucket
/// appears exactly once; minutes without trades carry the prior close
/// forward with zero volume. Nothing is synthesized outside the observed
/// range.
pub fn aggregate_minute_candles(events: &[TradeEvent], meta: &PoolMetadata) -> MinuteSeries {
    let rescale = meta.rescale_exponent();

    // Stable sort keeps input order as the tie-break for equal timestamps.
    // Events whose timestamp falls outside the representable datetime range
    // are dropped along with the priceless ones.
    let mut trades: Vec<PricedTrade> = events
        .iter()
        .filter_map(|event| {
            DateTime::from_timestamp(event.timestamp, 0)?;
            let (price, source) = derive_price(event, rescale)?;
            Some(PricedTrade {
                timestamp: event.timestamp,
                price,
                volume: event.amount_usd.abs(),
                source,
            })
        })
        .collect();
    trades.sort_by_key(|t| t.timestamp);

    let unscaled = rescale.is_none()
        && trades
            .iter()
            .any(|t| matches!(t.source, PriceSource::Encoded));

    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for trade in &trades {
        let bucket_start = trade.timestamp - trade.timestamp.rem_euclid(BUCKET_SECS);
        buckets
            .entry(bucket_start)
            .and_modify(|b| {
                b.high = b.high.max(trade.price);
                b.low = b.low.min(trade.price);
                b.close = trade.price;
                b.volume += trade.volume;
                b.trade_count += 1;
            })
            .or_insert(Bucket {
                open: trade.price,
                high: trade.price,
                low: trade.price,
                close: trade.price,
                volume: trade.volume,
                trade_count: 1,
            });
    }

    // Fold over the populated buckets in ascending order, synthesizing a
    // carried-forward candle for every minute missing in between.
    let mut candles = Vec::new();
    let mut prev_close: Option<Decimal> = None;
    let mut next_expected: Option<i64> = None;
    for (&start, bucket) in &buckets {
        if let (Some(close), Some(mut expected)) = (prev_close, next_expected) {
            while expected < start {
                if let Some(ts) = DateTime::from_timestamp(expected, 0) {
                    candles.push(gap_candle(ts, close));
                }
                expected += BUCKET_SECS;
            }
        }
        let Some(ts) = DateTime::from_timestamp(start, 0) else {
            continue;
        };
        candles.push(bucket.to_candle(ts));
        prev_close = Some(bucket.close);
        next_expected = Some(start + BUCKET_SECS);
    }

    MinuteSeries { candles, unscaled }
}
