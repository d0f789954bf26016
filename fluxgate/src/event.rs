//! Canonical event envelope and codec.
//!
//! Every message crossing the bus is one JSON envelope. Decoding is strict
//! on `action` (an unknown action fails the decode and is routed back to
//! the caller as an ERROR) and lenient on unknown envelope keys. Decimal
//! payload values serialise as normalized decimal strings; every timestamp
//! is an integer count of microseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;
use uuid::Uuid;

/// Event class carried in the `event` wire field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Command,
    Data,
    Error,
}

/// Reporting node within the trading system.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Configurator,
    Core,
    Gate,
    Agent,
}

/// Command or update selector; determines the payload shape.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GetBalance,
    CreateOrders,
    CancelOrders,
    CancelAllOrders,
    GetOrders,
    OrderBookUpdate,
    BalanceUpdate,
    OrdersUpdate,
    Ping,
    Metrics,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CodecError {
    #[error("decode: {0}")]
    Decode(String),

    #[error("encode: {0}")]
    Encode(String),
}

/// Canonical event envelope. Immutable once offered to the bus.
///
/// `action` is absent only on decode-failure errors, where the inbound
/// action could not be established.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    pub event_id: Uuid,
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub exchange: SmolStr,
    pub node: Node,
    pub instance: SmolStr,
    pub algo: SmolStr,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Event {
    pub fn decode(message: &str) -> Result<Self, CodecError> {
        serde_json::from_str(message).map_err(|error| CodecError::Decode(error.to_string()))
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|error| CodecError::Encode(error.to_string()))
    }

    /// Decode `data` as the payload type matched to this event's action.
    pub fn decode_data<T>(&self) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.data.clone().unwrap_or(Value::Null))
            .map_err(|error| CodecError::Decode(error.to_string()))
    }
}

/// Builds outbound envelopes from the per-instance constants.
#[derive(Debug, Clone)]
pub struct EventFactory {
    exchange: SmolStr,
    algo: SmolStr,
    node: Node,
    instance: SmolStr,
}

impl EventFactory {
    pub fn new(exchange: SmolStr, algo: SmolStr, node: Node, instance: SmolStr) -> Self {
        Self {
            exchange,
            algo,
            node,
            instance,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    fn template(&self, kind: EventKind, action: Option<Action>, event_id: Option<Uuid>) -> Event {
        Event {
            event_id: event_id.unwrap_or_else(Uuid::new_v4),
            kind,
            exchange: self.exchange.clone(),
            node: self.node,
            instance: self.instance.clone(),
            algo: self.algo.clone(),
            action,
            message: None,
            timestamp: Utc::now(),
            data: None,
        }
    }

    /// DATA envelope. A fresh UUIDv4 is allocated when no originating
    /// event id is supplied.
    pub fn data<T>(
        &self,
        action: Action,
        event_id: Option<Uuid>,
        data: &T,
    ) -> Result<Event, CodecError>
    where
        T: Serialize,
    {
        let mut event = self.template(EventKind::Data, Some(action), event_id);
        event.data = Some(
            serde_json::to_value(data).map_err(|error| CodecError::Encode(error.to_string()))?,
        );
        Ok(event)
    }

    /// ERROR envelope.
    pub fn error(
        &self,
        action: Option<Action>,
        event_id: Option<Uuid>,
        message: String,
        data: Option<Value>,
    ) -> Event {
        let mut event = self.template(EventKind::Error, action, event_id);
        event.message = Some(message);
        event.data = data;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CREATE_ORDERS_COMMAND: &str = r#"{
        "event_id": "0bf733e3-da9b-4516-8288-c34c8d838d30",
        "event": "command",
        "exchange": "exmo",
        "node": "core",
        "instance": "test",
        "algo": "multi_3t",
        "action": "create_orders",
        "message": null,
        "timestamp": 1502962946216000,
        "data": [
            {
                "symbol": "BTC/USDT",
                "type": "market",
                "side": "buy",
                "amount": 0.002,
                "price": 20342.14,
                "client_order_id": "0fa56216-fb3e-11ec-b939-0242ac120004"
            }
        ]
    }"#;

    fn factory() -> EventFactory {
        EventFactory::new("exmo".into(), "multi_3t".into(), Node::Gate, "test".into())
    }

    #[test]
    fn round_trips_valid_envelope() {
        let event = Event::decode(CREATE_ORDERS_COMMAND).unwrap();

        assert_eq!(event.kind, EventKind::Command);
        assert_eq!(event.action, Some(Action::CreateOrders));
        assert_eq!(event.timestamp.timestamp_micros(), 1502962946216000);

        let encoded = event.encode().unwrap();
        let reencoded: Value = serde_json::from_str(&encoded).unwrap();
        let original: Value = serde_json::from_str(CREATE_ORDERS_COMMAND).unwrap();
        assert_eq!(reencoded, original);
    }

    #[test]
    fn rejects_unknown_action() {
        let message = CREATE_ORDERS_COMMAND.replace("create_orders", "explode_orders");
        assert!(Event::decode(&message).is_err());
    }

    #[test]
    fn ignores_unknown_envelope_keys() {
        let mut value: Value = serde_json::from_str(CREATE_ORDERS_COMMAND).unwrap();
        value["debug_marker"] = json!(42);

        let event = Event::decode(&value.to_string()).unwrap();
        assert_eq!(event.action, Some(Action::CreateOrders));
    }

    #[test]
    fn factory_stamps_microsecond_timestamps() {
        let event = factory().data(Action::Ping, None, &7u64).unwrap();

        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        let timestamp = value["timestamp"].as_i64().unwrap();

        // 16-digit integer: microseconds, not milliseconds or seconds.
        assert!((1_000_000_000_000_000..10_000_000_000_000_000).contains(&timestamp));
        assert_eq!(value["data"], json!(7));
        assert_eq!(value["event"], json!("data"));
    }

    #[test]
    fn factory_error_keeps_originating_event_id() {
        let event_id = Uuid::new_v4();
        let event = factory().error(
            Some(Action::CancelOrders),
            Some(event_id),
            "unknown client order id: cid-9".to_owned(),
            Some(json!([{"client_order_id": "cid-9", "symbol": "BTC/USDT"}])),
        );

        assert_eq!(event.event_id, event_id);
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.action, Some(Action::CancelOrders));
    }

    #[test]
    fn decode_data_matches_action_payload() {
        use fluxgate_execution::order::{OrderKind, OrderRequestOpen, Side};

        let event = Event::decode(CREATE_ORDERS_COMMAND).unwrap();
        let params: Vec<OrderRequestOpen> = event.decode_data().unwrap();

        assert_eq!(params.len(), 1);
        assert_eq!(params[0].kind, OrderKind::Market);
        assert_eq!(params[0].side, Side::Buy);
    }
}
