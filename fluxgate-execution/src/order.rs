use crate::Symbol;
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Caller-assigned order identifier, globally unique within one gateway
/// instance. The only identifier the trading core ever sees.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct ClientOrderId(pub SmolStr);

impl ClientOrderId {
    pub fn new<S: Into<SmolStr>>(id: S) -> Self {
        Self(id.into())
    }
}

impl From<&str> for ClientOrderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Venue-assigned order identifier, private to the gateway.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id))
    }
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

/// Order status as observed by the gateway.
///
/// `Open` is the only live status; every other status is terminal and
/// sticky - the gateway never transitions an order backwards.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// Canonical order record crossing the bus.
///
/// `client_order_id` is absent only transiently, between a venue response
/// and the correlator annotation; every emitted order carries it.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub client_order_id: Option<ClientOrderId>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub symbol: Symbol,
    #[serde(rename = "type")]
    pub kind: Option<OrderKind>,
    pub side: Option<Side>,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub filled: Option<Decimal>,
}

/// Parameters of a single order in a `create_orders` command.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderRequestOpen {
    pub client_order_id: ClientOrderId,
    pub symbol: Symbol,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
}

/// Reference to a previously created order, as used by `cancel_orders`
/// and `get_orders` commands.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderRef {
    pub client_order_id: ClientOrderId,
    pub symbol: Symbol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_open_is_live() {
        assert!(!OrderStatus::Open.is_terminal());
        for status in [
            OrderStatus::Closed,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn de_order_request_open() {
        let input = r#"{
            "symbol": "BTC/USDT",
            "type": "market",
            "side": "buy",
            "amount": 0.002,
            "price": 20342.14,
            "client_order_id": "0fa56216-fb3e-11ec-b939-0242ac120004"
        }"#;

        let request: OrderRequestOpen = serde_json::from_str(input).unwrap();

        assert_eq!(request.symbol, Symbol::from("BTC/USDT"));
        assert_eq!(request.kind, OrderKind::Market);
        assert_eq!(request.side, Side::Buy);
        assert_eq!(
            request.client_order_id,
            ClientOrderId::from("0fa56216-fb3e-11ec-b939-0242ac120004")
        );
    }

    #[test]
    fn serialize_order_timestamp_as_integer_microseconds() {
        let order = Order {
            id: OrderId::new("X1"),
            client_order_id: Some(ClientOrderId::from("cid-1")),
            timestamp: Some(DateTime::from_timestamp_micros(1656839306000000).unwrap()),
            status: OrderStatus::Open,
            symbol: Symbol::from("BTC/USDT"),
            kind: Some(OrderKind::Limit),
            side: Some(Side::Sell),
            price: None,
            amount: None,
            filled: None,
        };

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["timestamp"], serde_json::json!(1656839306000000_i64));
        assert_eq!(value["type"], serde_json::json!("limit"));
    }
}
