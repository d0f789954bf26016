//! Venue response normalisation.
//!
//! Venues report loose key sets and millisecond timestamps; everything
//! crossing into the gateway is reduced to the canonical model with
//! microsecond times. Unknown keys are ignored at deserialisation.

use crate::{
    AssetName, Symbol,
    balance::{Balance, BalanceSnapshot},
    book::{Level, OrderBook},
    order::{ClientOrderId, Order, OrderId, OrderKind, OrderRequestOpen, OrderStatus, Side},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Order book as a venue returns it: millisecond timestamp, superfluous
/// keys dropped on deserialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderBook {
    pub symbol: Symbol,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<RawOrderBook> for OrderBook {
    fn from(raw: RawOrderBook) -> Self {
        Self {
            symbol: raw.symbol,
            bids: raw.bids,
            asks: raw.asks,
            timestamp: raw.timestamp,
        }
    }
}

/// Order as a venue returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrder {
    pub id: OrderId,
    #[serde(default, rename = "clientOrderId")]
    pub client_order_id: Option<ClientOrderId>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub symbol: Symbol,
    #[serde(default, rename = "type")]
    pub kind: Option<OrderKind>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub filled: Option<Decimal>,
}

/// Normalise a raw venue order, filling keys the venue omitted from the
/// originating request when one is available (create path).
pub fn order(raw: RawOrder, request: Option<&OrderRequestOpen>) -> Order {
    Order {
        id: raw.id,
        client_order_id: raw
            .client_order_id
            .or_else(|| request.map(|request| request.client_order_id.clone())),
        timestamp: raw.timestamp,
        status: raw.status,
        symbol: raw.symbol,
        kind: raw.kind.or_else(|| request.map(|request| request.kind)),
        side: raw.side.or_else(|| request.map(|request| request.side)),
        price: raw.price.or_else(|| request.map(|request| request.price)),
        amount: raw.amount.or_else(|| request.map(|request| request.amount)),
        filled: raw.filled,
    }
}

/// Filter a raw venue balance down to the requested assets. Assets the
/// venue did not report come back as `{0, 0, 0}`.
pub fn partial_balance(
    raw: &FnvHashMap<AssetName, Balance>,
    assets: &[AssetName],
    timestamp: Option<DateTime<Utc>>,
) -> BalanceSnapshot {
    let assets = assets
        .iter()
        .map(|asset| (asset.clone(), raw.get(asset).copied().unwrap_or_default()))
        .collect();

    BalanceSnapshot { assets, timestamp }
}
