use crate::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price level, serialised as a `[price, size]` pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Level(pub Decimal, pub Decimal);

impl Level {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn amount(&self) -> Decimal {
        self.1
    }
}

/// Order book snapshot: bids sorted descending, asks ascending, depth
/// bounded by the subscription limit.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn level_serialises_as_pair() {
        let level = Level(dec!(19000.0), dec!(0.000789));
        let value = serde_json::to_value(level).unwrap();
        assert_eq!(value, serde_json::json!(["19000.0", "0.000789"]));
    }

    #[test]
    fn de_level_from_pair() {
        let level: Level = serde_json::from_str("[19000.0, 0.000789]").unwrap();
        assert_eq!(level.price(), dec!(19000.0));
        assert_eq!(level.amount(), dec!(0.000789));
    }
}
