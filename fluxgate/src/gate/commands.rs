//! Command dispatch.
//!
//! Every inbound bus message is decoded, mirrored to LOGS with this gate
//! as the reporting node, and dispatched by action. No failure escapes a
//! handler: each catch site emits an ERROR envelope to CORE and LOGS.

use super::Gate;
use crate::{
    event::{Action, Event, Node},
    transmitter::Destination,
};
use fluxgate_execution::{
    AssetName,
    client::ExchangeClient,
    error::ClientError,
    order::{Order, OrderRef, OrderRequestOpen, OrderStatus},
};
use serde_json::{Value, json};
use tracing::{debug, error, warn};
use uuid::Uuid;

impl<Client> Gate<Client>
where
    Client: ExchangeClient,
{
    pub(crate) async fn handle_message(&self, message: String) {
        let command = match Event::decode(&message) {
            Ok(event) => event,
            Err(decode_error) => {
                let response = self.inner.factory.error(
                    None,
                    None,
                    decode_error.to_string(),
                    Some(json!([message])),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
        };

        debug!(event_id = %command.event_id, action = ?command.action, "command received");

        // Mirror the decoded command with this gate as the reporting node.
        let mut mirrored = command.clone();
        mirrored.node = Node::Gate;
        self.inner.transmitter.offer(&mirrored, Destination::Logs).await;

        match command.action {
            Some(Action::CreateOrders) => self.create_orders(&command).await,
            Some(Action::CancelOrders) => self.cancel_orders(&command).await,
            Some(Action::CancelAllOrders) => self.cancel_all_orders(&command).await,
            Some(Action::GetOrders) => self.get_orders(&command).await,
            Some(Action::GetBalance) => self.get_balance(&command).await,
            action => {
                let message = match action {
                    Some(action) => format!("unsupported command action: {action:?}"),
                    None => "missing command action".to_owned(),
                };
                let response = self.inner.factory.error(
                    action,
                    Some(command.event_id),
                    message,
                    command.data.clone(),
                );
                self.offer_with_log(&response, Destination::Core).await;
            }
        }
    }

    /// Offer to the destination stream, then mirror to LOGS.
    pub(crate) async fn offer_with_log(&self, event: &Event, destination: Destination) {
        self.inner.transmitter.offer(event, destination).await;
        self.inner.transmitter.offer(event, Destination::Logs).await;
    }

    async fn create_orders(&self, command: &Event) {
        let params: Vec<OrderRequestOpen> = match command.decode_data() {
            Ok(params) => params,
            Err(decode_error) => {
                let response = self.inner.factory.error(
                    Some(Action::CreateOrders),
                    Some(command.event_id),
                    decode_error.to_string(),
                    command.data.clone(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
        };

        // The burst closes the priority gate; periodic polling resumes
        // once the pass drops.
        let _pass = self.inner.priority_gate.enter();
        for request in params {
            self.create_order(request, command.event_id).await;
        }
    }

    async fn create_order(&self, request: OrderRequestOpen, event_id: Uuid) {
        if self.inner.private_pool.is_contended() {
            debug!("credential pool contended, create_order will wait");
        }

        let result = {
            self.inner.metrics.record_private_call();
            let client = self.inner.private_pool.acquire().await;
            client.create_order(request.clone()).await
        };

        match result {
            Ok(mut order) => {
                order.client_order_id = Some(request.client_order_id.clone());

                // Mappings must exist before the order can surface in the
                // orders loop; only then does it enter the open set.
                if let Err(store_error) = self
                    .inner
                    .correlator
                    .record_create(&request.client_order_id, &order.id, event_id)
                    .await
                {
                    warn!(%store_error, "failed to persist order correlation");
                }
                self.inner
                    .open_orders
                    .insert(request.client_order_id.clone(), request.symbol.clone());

                match self
                    .inner
                    .factory
                    .data(Action::CreateOrders, Some(event_id), &vec![order])
                {
                    Ok(response) => self.offer_with_log(&response, Destination::Core).await,
                    Err(encode_error) => {
                        warn!(%encode_error, "failed to encode create_orders response")
                    }
                }
            }
            Err(client_error) => {
                self.log_client_error(&client_error, "create_order failed");
                let response = self.inner.factory.error(
                    Some(Action::CreateOrders),
                    Some(event_id),
                    client_error.to_string(),
                    serde_json::to_value(vec![&request]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
            }
        }
    }

    async fn cancel_orders(&self, command: &Event) {
        let params: Vec<OrderRef> = match command.decode_data() {
            Ok(params) => params,
            Err(decode_error) => {
                let response = self.inner.factory.error(
                    Some(Action::CancelOrders),
                    Some(command.event_id),
                    decode_error.to_string(),
                    command.data.clone(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
        };

        for param in params {
            self.cancel_order(param, command.event_id).await;
        }
    }

    async fn cancel_order(&self, param: OrderRef, event_id: Uuid) {
        let order_id = match self.inner.correlator.order_id(&param.client_order_id).await {
            Ok(Some(order_id)) => order_id,
            Ok(None) => {
                // Never fabricate a venue id: unknown client id is a
                // caller error and no venue call is made.
                let response = self.inner.factory.error(
                    Some(Action::CancelOrders),
                    Some(event_id),
                    format!("unknown client order id: {}", param.client_order_id),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
            Err(store_error) => {
                warn!(%store_error, "correlator lookup failed");
                let response = self.inner.factory.error(
                    Some(Action::CancelOrders),
                    Some(event_id),
                    store_error.to_string(),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
        };

        let result = {
            self.inner.metrics.record_private_call();
            let client = self.inner.private_pool.acquire().await;
            client.cancel_order(&order_id, &param.symbol).await
        };

        match result {
            // No positive acknowledgement: the later ORDERS_UPDATE is it.
            Ok(()) => {}
            Err(client_error @ ClientError::OrderNotFound(_)) => {
                // The venue no longer knows the order. Reflect observed
                // reality with a synthetic terminal update, then report
                // the failed cancel itself.
                let update = Order {
                    id: order_id,
                    client_order_id: Some(param.client_order_id.clone()),
                    timestamp: None,
                    status: OrderStatus::Canceled,
                    symbol: param.symbol.clone(),
                    kind: None,
                    side: None,
                    price: None,
                    amount: None,
                    filled: None,
                };
                self.inner
                    .open_orders
                    .remove(&param.client_order_id, &param.symbol);

                let update_event_id = self
                    .inner
                    .correlator
                    .event_id(&param.client_order_id)
                    .await
                    .ok()
                    .flatten();
                match self
                    .inner
                    .factory
                    .data(Action::OrdersUpdate, update_event_id, &vec![update])
                {
                    Ok(response) => self.offer_with_log(&response, Destination::Core).await,
                    Err(encode_error) => {
                        warn!(%encode_error, "failed to encode orders_update response")
                    }
                }

                let response = self.inner.factory.error(
                    Some(Action::CancelOrders),
                    Some(event_id),
                    client_error.to_string(),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
            }
            Err(client_error) => {
                self.log_client_error(&client_error, "cancel_order failed");
                let response = self.inner.factory.error(
                    Some(Action::CancelOrders),
                    Some(event_id),
                    client_error.to_string(),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
            }
        }
    }

    async fn cancel_all_orders(&self, command: &Event) {
        let result = {
            self.inner.metrics.record_private_call();
            let client = self.inner.private_pool.acquire().await;
            client.cancel_all_orders(&self.inner.symbols).await
        };

        // No per-order events on success.
        if let Err(client_error) = result {
            self.log_client_error(&client_error, "cancel_all_orders failed");
            let response = self.inner.factory.error(
                Some(Action::CancelAllOrders),
                Some(command.event_id),
                client_error.to_string(),
                None,
            );
            self.offer_with_log(&response, Destination::Core).await;
        }
    }

    async fn get_orders(&self, command: &Event) {
        let params: Vec<OrderRef> = match command.decode_data() {
            Ok(params) => params,
            Err(decode_error) => {
                let response = self.inner.factory.error(
                    Some(Action::GetOrders),
                    Some(command.event_id),
                    decode_error.to_string(),
                    command.data.clone(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
        };

        for param in params {
            self.get_order(param, command.event_id).await;
        }
    }

    async fn get_order(&self, param: OrderRef, event_id: Uuid) {
        let order_id = match self.inner.correlator.order_id(&param.client_order_id).await {
            Ok(Some(order_id)) => order_id,
            Ok(None) => {
                let response = self.inner.factory.error(
                    Some(Action::GetOrders),
                    Some(event_id),
                    format!("unknown client order id: {}", param.client_order_id),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
            Err(store_error) => {
                warn!(%store_error, "correlator lookup failed");
                let response = self.inner.factory.error(
                    Some(Action::GetOrders),
                    Some(event_id),
                    store_error.to_string(),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
                return;
            }
        };

        let result = {
            self.inner.metrics.record_private_call();
            let client = self.inner.private_pool.acquire().await;
            client.fetch_order(&order_id, &param.symbol).await
        };

        match result {
            Ok(mut order) => {
                order.client_order_id = Some(param.client_order_id.clone());
                match self
                    .inner
                    .factory
                    .data(Action::GetOrders, Some(event_id), &vec![order])
                {
                    Ok(response) => self.offer_with_log(&response, Destination::Core).await,
                    Err(encode_error) => {
                        warn!(%encode_error, "failed to encode get_orders response")
                    }
                }
            }
            Err(client_error) => {
                self.log_client_error(&client_error, "get_order failed");
                let response = self.inner.factory.error(
                    Some(Action::GetOrders),
                    Some(event_id),
                    client_error.to_string(),
                    serde_json::to_value(vec![&param]).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
            }
        }
    }

    async fn get_balance(&self, command: &Event) {
        let requested: Vec<AssetName> = match &command.data {
            None | Some(Value::Null) => Vec::new(),
            Some(_) => match command.decode_data() {
                Ok(assets) => assets,
                Err(decode_error) => {
                    let response = self.inner.factory.error(
                        Some(Action::GetBalance),
                        Some(command.event_id),
                        decode_error.to_string(),
                        command.data.clone(),
                    );
                    self.offer_with_log(&response, Destination::Core).await;
                    return;
                }
            },
        };

        // Empty request resolves to the configured asset universe.
        let assets = if requested.is_empty() {
            self.inner.assets.clone()
        } else {
            requested
        };

        let result = {
            self.inner.metrics.record_private_call();
            let client = self.inner.private_pool.acquire().await;
            client.fetch_partial_balance(&assets).await
        };

        match result {
            Ok(snapshot) => {
                match self
                    .inner
                    .factory
                    .data(Action::GetBalance, Some(command.event_id), &snapshot)
                {
                    Ok(response) => {
                        self.inner
                            .transmitter
                            .offer(&response, Destination::Balance)
                            .await;
                        self.inner
                            .transmitter
                            .offer(&response, Destination::Logs)
                            .await;
                    }
                    Err(encode_error) => {
                        warn!(%encode_error, "failed to encode get_balance response")
                    }
                }
            }
            Err(client_error) => {
                self.log_client_error(&client_error, "get_balance failed");
                let response = self.inner.factory.error(
                    Some(Action::GetBalance),
                    Some(command.event_id),
                    client_error.to_string(),
                    serde_json::to_value(&assets).ok(),
                );
                self.offer_with_log(&response, Destination::Core).await;
            }
        }
    }

    /// Transient venue failures keep their short description; everything
    /// else is an unhandled venue/internal error.
    pub(crate) fn log_client_error(&self, client_error: &ClientError, context: &'static str) {
        if client_error.is_transient() {
            warn!(%client_error, context);
        } else {
            error!(%client_error, context);
        }
    }
}
