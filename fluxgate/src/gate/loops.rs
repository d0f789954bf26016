//! Subscription loops.
//!
//! Each loop is an infinite task: a failed iteration logs, emits an ERROR
//! envelope to CORE and LOGS, and continues. Order-book data flows to the
//! ORDER_BOOK stream only; balance and order updates mirror to LOGS.

use super::Gate;
use crate::{config::CollectionMethod, event::Action, transmitter::Destination};
use fluxgate_execution::{
    Symbol,
    book::OrderBook,
    client::ExchangeClient,
    error::ClientError,
    order::{Order, OrderRef},
};
use serde_json::Value;
use std::{future::Future, time::Instant};
use tracing::{debug, warn};

impl<Client> Gate<Client>
where
    Client: ExchangeClient,
{
    pub(crate) async fn order_book_loop(&self) {
        match self.inner.methods.order_book {
            CollectionMethod::Http => self.order_book_http_loop().await,
            CollectionMethod::Websocket => {
                let watchers = self
                    .inner
                    .symbols
                    .iter()
                    .map(|symbol| self.order_book_watch_loop(symbol));
                futures::future::join_all(watchers).await;
            }
        }
    }

    /// One batched fetch across all symbols per round, paced by the public
    /// pool delay. Round latency feeds the metrics window.
    async fn order_book_http_loop(&self) {
        loop {
            let started = Instant::now();
            let result = self
                .inner
                .public_pool
                .client()
                .fetch_order_books(&self.inner.symbols, self.inner.depth)
                .await;

            match result {
                Ok(books) => {
                    self.inner.metrics.record_fetch_latency(started.elapsed());
                    self.publish_books(books).await;
                }
                Err(client_error) => {
                    self.emit_loop_error(
                        Action::OrderBookUpdate,
                        &client_error,
                        serde_json::to_value(&self.inner.symbols).ok(),
                    )
                    .await;
                }
            }

            tokio::time::sleep(self.inner.public_pool.delay()).await;
        }
    }

    /// Tight per-symbol watch loop.
    async fn order_book_watch_loop(&self, symbol: &Symbol) {
        loop {
            match self
                .inner
                .public_pool
                .client()
                .watch_order_book(symbol, self.inner.depth)
                .await
            {
                Ok(book) => self.publish_books(vec![book]).await,
                Err(client_error) => {
                    self.emit_loop_error(
                        Action::OrderBookUpdate,
                        &client_error,
                        serde_json::to_value(symbol).ok(),
                    )
                    .await;
                    tokio::time::sleep(self.inner.public_pool.delay()).await;
                }
            }
        }
    }

    /// ORDER_BOOK_UPDATE events bypass the LOGS mirror: they are the one
    /// high-rate stream.
    async fn publish_books(&self, books: Vec<OrderBook>) {
        self.inner.metrics.record_books(books.len() as u64);

        for book in books {
            match self.inner.factory.data(Action::OrderBookUpdate, None, &book) {
                Ok(event) => {
                    self.inner
                        .transmitter
                        .offer(&event, Destination::OrderBook)
                        .await
                }
                Err(encode_error) => {
                    warn!(%encode_error, "failed to encode order_book_update")
                }
            }
        }
    }

    pub(crate) async fn balance_loop(&self) {
        let is_watch = self.inner.methods.balance == CollectionMethod::Websocket;

        loop {
            self.inner.priority_gate.wait_idle().await;

            let result = {
                self.inner.metrics.record_private_call();
                let client = self.inner.private_pool.acquire().await;
                if is_watch {
                    self.with_subscribe_timeout(client.watch_balance()).await
                } else {
                    client.fetch_partial_balance(&self.inner.assets).await
                }
            };

            match result {
                Ok(snapshot) => {
                    match self.inner.factory.data(Action::BalanceUpdate, None, &snapshot) {
                        Ok(event) => {
                            self.inner
                                .transmitter
                                .offer(&event, Destination::Balance)
                                .await;
                            self.inner.transmitter.offer(&event, Destination::Logs).await;
                        }
                        Err(encode_error) => {
                            warn!(%encode_error, "failed to encode balance_update")
                        }
                    }
                }
                // A bounded watch with no update is a normal idle interval.
                Err(ClientError::Timeout) if is_watch && self.inner.subscribe_timeout.is_some() => {
                    debug!("watch_balance idle interval elapsed");
                }
                Err(client_error) => {
                    self.emit_loop_error(
                        Action::BalanceUpdate,
                        &client_error,
                        serde_json::to_value(&self.inner.assets).ok(),
                    )
                    .await;
                }
            }

            tokio::time::sleep(self.inner.balance_delay).await;
        }
    }

    pub(crate) async fn orders_loop(&self) {
        match self.inner.methods.order {
            CollectionMethod::Websocket => self.orders_stream_loop().await,
            CollectionMethod::Http => self.orders_poll_loop().await,
        }
    }

    async fn orders_stream_loop(&self) {
        loop {
            self.inner.priority_gate.wait_idle().await;

            let result = {
                self.inner.metrics.record_private_call();
                let client = self.inner.private_pool.acquire().await;
                self.with_subscribe_timeout(client.watch_orders()).await
            };

            match result {
                Ok(orders) => {
                    for order in orders {
                        self.emit_order_update(order).await;
                    }
                }
                // A bounded watch with no update is a normal idle interval,
                // not a failure worth surfacing.
                Err(ClientError::Timeout) if self.inner.subscribe_timeout.is_some() => {
                    debug!("watch_orders idle interval elapsed");
                }
                Err(client_error) => {
                    self.emit_loop_error(Action::OrdersUpdate, &client_error, None)
                        .await;
                }
            }
        }
    }

    /// Annotate, maintain the open set, and emit one ORDERS_UPDATE.
    ///
    /// Updates for orders the correlator does not know are dropped: they
    /// are not ours.
    async fn emit_order_update(&self, mut order: Order) {
        let client_order_id = match self.inner.correlator.client_order_id(&order.id).await {
            Ok(Some(client_order_id)) => client_order_id,
            Ok(None) => {
                debug!(order_id = %order.id, "dropping update for unknown order");
                return;
            }
            Err(store_error) => {
                warn!(%store_error, "correlator lookup failed");
                return;
            }
        };

        order.client_order_id = Some(client_order_id.clone());
        if order.status.is_terminal() {
            self.inner.open_orders.remove(&client_order_id, &order.symbol);
        }

        let event_id = self
            .inner
            .correlator
            .event_id(&client_order_id)
            .await
            .ok()
            .flatten();

        match self
            .inner
            .factory
            .data(Action::OrdersUpdate, event_id, &vec![order])
        {
            Ok(event) => self.offer_with_log(&event, Destination::Core).await,
            Err(encode_error) => warn!(%encode_error, "failed to encode orders_update"),
        }
    }

    async fn orders_poll_loop(&self) {
        loop {
            let open_orders = self.inner.open_orders.snapshot();
            if open_orders.is_empty() {
                tokio::time::sleep(self.inner.order_status_delay).await;
                continue;
            }

            for (client_order_id, symbol) in open_orders {
                self.inner.priority_gate.wait_idle().await;

                let order_id = match self.inner.correlator.order_id(&client_order_id).await {
                    Ok(Some(order_id)) => order_id,
                    Ok(None) | Err(_) => {
                        warn!(%client_order_id, "open order without venue id mapping");
                        self.inner.open_orders.remove(&client_order_id, &symbol);
                        continue;
                    }
                };

                let result = {
                    self.inner.metrics.record_private_call();
                    let client = self.inner.private_pool.acquire().await;
                    client.fetch_order(&order_id, &symbol).await
                };

                match result {
                    Ok(mut order) => {
                        order.client_order_id = Some(client_order_id.clone());
                        if order.status.is_terminal() {
                            self.inner.open_orders.remove(&client_order_id, &symbol);
                        }

                        let event_id = self
                            .inner
                            .correlator
                            .event_id(&client_order_id)
                            .await
                            .ok()
                            .flatten();

                        match self
                            .inner
                            .factory
                            .data(Action::OrdersUpdate, event_id, &vec![order])
                        {
                            Ok(event) => self.offer_with_log(&event, Destination::Core).await,
                            Err(encode_error) => {
                                warn!(%encode_error, "failed to encode orders_update")
                            }
                        }
                    }
                    Err(client_error) => {
                        // The fetch is not retried: the order leaves the
                        // open set and the failure is reported.
                        self.inner.open_orders.remove(&client_order_id, &symbol);
                        self.emit_loop_error(
                            Action::OrdersUpdate,
                            &client_error,
                            serde_json::to_value(vec![OrderRef {
                                client_order_id: client_order_id.clone(),
                                symbol: symbol.clone(),
                            }])
                            .ok(),
                        )
                        .await;
                    }
                }

                debug!(open_orders = self.inner.open_orders.len(), "order status pass");
                tokio::time::sleep(self.inner.order_status_delay).await;
            }

            tokio::task::yield_now().await;
        }
    }

    /// Liveness PING every second, plus a METRICS snapshot whenever the
    /// window holds enough latency samples.
    pub(crate) async fn telemetry_loop(&self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));

        loop {
            interval.tick().await;

            match self
                .inner
                .factory
                .data(Action::Ping, None, &self.inner.metrics.books_received_total())
            {
                Ok(event) => self.inner.transmitter.offer(&event, Destination::Logs).await,
                Err(encode_error) => warn!(%encode_error, "failed to encode ping"),
            }

            let snapshot = self
                .inner
                .metrics
                .take_snapshot(self.inner.factory.exchange(), self.inner.factory.instance());
            if let Some(metric) = snapshot {
                match self.inner.factory.data(Action::Metrics, None, &metric) {
                    Ok(event) => {
                        self.inner.transmitter.offer(&event, Destination::Logs).await
                    }
                    Err(encode_error) => warn!(%encode_error, "failed to encode metrics"),
                }
            }
        }
    }

    async fn with_subscribe_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        match self.inner.subscribe_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, operation).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            },
            None => operation.await,
        }
    }

    /// Loop failures emit an ERROR envelope (fresh event id) to CORE and
    /// LOGS; the loop itself continues.
    async fn emit_loop_error(
        &self,
        action: Action,
        client_error: &ClientError,
        data: Option<Value>,
    ) {
        self.log_client_error(client_error, "subscription loop iteration failed");

        let event = self
            .inner
            .factory
            .error(Some(action), None, client_error.to_string(), data);
        self.offer_with_log(&event, Destination::Core).await;
    }
}
