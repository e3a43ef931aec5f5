use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single executed swap in a pool.
///
/// Providers validate raw API rows once at the boundary and only construct a
/// `TradeEvent` when `timestamp` and `amount_usd` coerce; the price fields
/// stay optional because the source omits them for some deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Seconds since epoch. Not necessarily unique or sorted; paginated
    /// fetches can interleave equal timestamps.
    pub timestamp: i64,
    /// Signed USD notional of the trade.
    pub amount_usd: Decimal,
    /// Q64.96 square-root price encoding. Carried as `f64` since values for
    /// common pools exceed a 96-bit decimal mantissa.
    pub sqrt_price_x96: Option<f64>,
    /// Signed raw token0 amount, used as a price fallback.
    pub amount0: Option<Decimal>,
    /// Signed raw token1 amount, used as a price fallback.
    pub amount1: Option<Decimal>,
}

/// Token precision metadata for a pool, fetched once per pool.
/// Only used to rescale prices recovered from the encoded square-root form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub token0_decimals: Option<i32>,
    pub token1_decimals: Option<i32>,
}

impl PoolMetadata {
    pub fn new(token0_decimals: i32, token1_decimals: i32) -> Self {
        Self {
            token0_decimals: Some(token0_decimals),
            token1_decimals: Some(token1_decimals),
        }
    }

    /// Exponent of the `10^(token1_decimals - token0_decimals)` factor
    /// applied to decoded prices. `None` when either decimal count is
    /// missing or negative; callers then use the decoded price unscaled.
    pub fn rescale_exponent(&self) -> Option<i32> {
        match (self.token0_decimals, self.token1_decimals) {
            (Some(d0), Some(d1)) if d0 >= 0 && d1 >= 0 => Some(d1 - d0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_exponent_from_decimals() {
        assert_eq!(PoolMetadata::new(6, 18).rescale_exponent(), Some(12));
        assert_eq!(PoolMetadata::new(18, 6).rescale_exponent(), Some(-12));
        assert_eq!(PoolMetadata::new(18, 18).rescale_exponent(), Some(0));
    }

    #[test]
    fn rescale_exponent_missing_decimals() {
        let meta = PoolMetadata {
            token0_decimals: None,
            token1_decimals: Some(18),
        };
        assert_eq!(meta.rescale_exponent(), None);
    }

    #[test]
    fn rescale_exponent_negative_decimals() {
        assert_eq!(PoolMetadata::new(-1, 18).rescale_exponent(), None);
        assert_eq!(PoolMetadata::new(6, -2).rescale_exponent(), None);
    }
}
