//! Simulated venue.
//!
//! An in-process venue backing paper runs of the gateway binary and the
//! integration test-suite. Orders rest in an internal store until a test
//! hook (or `cancel_order`) transitions them; `watch_*` operations drain
//! push queues fed by those transitions.

use crate::{
    AssetName, Symbol,
    balance::{Balance, BalanceSnapshot},
    book::{Level, OrderBook},
    client::ExchangeClient,
    error::ClientError,
    format,
    order::{Order, OrderId, OrderRequestOpen, OrderStatus},
};
use chrono::Utc;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct MockExchangeConfig {
    pub initial_balances: FnvHashMap<AssetName, Balance>,
    /// Artificial latency applied to every operation.
    pub latency_ms: u64,
}

/// Operations the venue records and can be primed to fail.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MockOp {
    CreateOrder,
    CancelOrder,
    FetchOrder,
    FetchOpenOrders,
    FetchOrderBook,
    WatchOrderBook,
    FetchBalance,
    WatchBalance,
    WatchOrders,
}

#[derive(Debug, Clone)]
pub struct MockExchange {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: MockExchangeConfig,
    next_order_id: AtomicU64,
    staged_order_ids: Mutex<VecDeque<OrderId>>,
    orders: Mutex<FnvHashMap<OrderId, Order>>,
    balances: Mutex<FnvHashMap<AssetName, Balance>>,
    books: Mutex<FnvHashMap<Symbol, OrderBook>>,
    order_updates: Mutex<VecDeque<Vec<Order>>>,
    orders_notify: Notify,
    balance_updates: Mutex<VecDeque<BalanceSnapshot>>,
    balance_notify: Notify,
    failures: Mutex<FnvHashMap<MockOp, VecDeque<ClientError>>>,
    calls: Mutex<Vec<MockOp>>,
    closed: AtomicBool,
}

impl Default for MockExchange {
    fn default() -> Self {
        <Self as ExchangeClient>::new(MockExchangeConfig::default())
    }
}

impl MockExchange {
    async fn enter(&self, op: MockOp) -> Result<(), ClientError> {
        if self.inner.closed.load(Ordering::Relaxed) {
            return Err(ClientError::Connectivity("client closed".to_owned()));
        }

        self.inner.calls.lock().push(op);

        if self.inner.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.inner.config.latency_ms))
                .await;
        }

        match self.take_failure(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn take_failure(&self, op: MockOp) -> Option<ClientError> {
        self.inner
            .failures
            .lock()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }

    fn next_order_id(&self) -> OrderId {
        if let Some(staged) = self.inner.staged_order_ids.lock().pop_front() {
            return staged;
        }

        let sequence = self.inner.next_order_id.fetch_add(1, Ordering::Relaxed) + 1;
        OrderId::new(format!("SIM-{sequence}"))
    }

    fn synthetic_book(&self, symbol: &Symbol, depth: usize) -> OrderBook {
        let mid = Decimal::from(100);
        let tick = Decimal::new(1, 2);

        let bids = (1..=depth as i64)
            .map(|level| Level(mid - tick * Decimal::from(level), Decimal::ONE))
            .collect();
        let asks = (1..=depth as i64)
            .map(|level| Level(mid + tick * Decimal::from(level), Decimal::ONE))
            .collect();

        OrderBook {
            symbol: symbol.clone(),
            bids,
            asks,
            timestamp: Some(Utc::now()),
        }
    }

    /// Use the provided id for the next created order instead of the
    /// generated `SIM-n` sequence.
    pub fn stage_order_id(&self, id: OrderId) {
        self.inner.staged_order_ids.lock().push_back(id);
    }

    pub fn set_order_book(&self, book: OrderBook) {
        self.inner.books.lock().insert(book.symbol.clone(), book);
    }

    pub fn set_balance(&self, asset: AssetName, balance: Balance) {
        self.inner.balances.lock().insert(asset, balance);
    }

    /// Queue an update batch for the next `watch_orders` call.
    pub fn push_order_update(&self, orders: Vec<Order>) {
        self.inner.order_updates.lock().push_back(orders);
        self.inner.orders_notify.notify_one();
    }

    /// Queue a snapshot for the next `watch_balance` call.
    pub fn push_balance_update(&self, snapshot: BalanceSnapshot) {
        self.inner.balance_updates.lock().push_back(snapshot);
        self.inner.balance_notify.notify_one();
    }

    /// Transition a resting order to `closed` and push the update.
    pub fn complete_order(&self, id: &OrderId, filled: Decimal) {
        let update = {
            let mut orders = self.inner.orders.lock();
            let Some(order) = orders.get_mut(id) else {
                return;
            };
            order.status = OrderStatus::Closed;
            order.filled = Some(filled);
            order.clone()
        };

        self.push_order_update(vec![update]);
    }

    /// Prime the next call of `op` to fail with `error`.
    pub fn fail_next(&self, op: MockOp, error: ClientError) {
        self.inner
            .failures
            .lock()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Operations invoked so far, in call order.
    pub fn calls(&self) -> Vec<MockOp> {
        self.inner.calls.lock().clone()
    }
}

impl ExchangeClient for MockExchange {
    type Config = MockExchangeConfig;

    fn new(config: Self::Config) -> Self {
        let balances = config.initial_balances.clone();

        Self {
            inner: Arc::new(Inner {
                config,
                next_order_id: AtomicU64::new(0),
                staged_order_ids: Mutex::new(VecDeque::new()),
                orders: Mutex::new(FnvHashMap::default()),
                balances: Mutex::new(balances),
                books: Mutex::new(FnvHashMap::default()),
                order_updates: Mutex::new(VecDeque::new()),
                orders_notify: Notify::new(),
                balance_updates: Mutex::new(VecDeque::new()),
                balance_notify: Notify::new(),
                failures: Mutex::new(FnvHashMap::default()),
                calls: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBook, ClientError> {
        self.enter(MockOp::FetchOrderBook).await?;

        let stored = self.inner.books.lock().get(symbol).cloned();
        let mut book = match stored {
            Some(book) => book,
            None => self.synthetic_book(symbol, depth),
        };

        book.bids.truncate(depth);
        book.asks.truncate(depth);
        Ok(book)
    }

    async fn watch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBook, ClientError> {
        self.enter(MockOp::WatchOrderBook).await?;

        // Streaming is simulated by pacing snapshot reads.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let stored = self.inner.books.lock().get(symbol).cloned();
        let mut book = match stored {
            Some(book) => book,
            None => self.synthetic_book(symbol, depth),
        };

        book.bids.truncate(depth);
        book.asks.truncate(depth);
        Ok(book)
    }

    async fn fetch_partial_balance(
        &self,
        assets: &[AssetName],
    ) -> Result<BalanceSnapshot, ClientError> {
        self.enter(MockOp::FetchBalance).await?;

        let balances = self.inner.balances.lock();
        Ok(format::partial_balance(&balances, assets, Some(Utc::now())))
    }

    async fn watch_balance(&self) -> Result<BalanceSnapshot, ClientError> {
        self.enter(MockOp::WatchBalance).await?;

        loop {
            let notified = self.inner.balance_notify.notified();
            let snapshot = self.inner.balance_updates.lock().pop_front();
            if let Some(snapshot) = snapshot {
                return Ok(snapshot);
            }
            notified.await;
        }
    }

    async fn watch_orders(&self) -> Result<Vec<Order>, ClientError> {
        self.enter(MockOp::WatchOrders).await?;

        loop {
            let notified = self.inner.orders_notify.notified();
            let batch = self.inner.order_updates.lock().pop_front();
            if let Some(batch) = batch {
                return Ok(batch);
            }
            notified.await;
        }
    }

    async fn fetch_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<Order, ClientError> {
        self.enter(MockOp::FetchOrder).await?;

        self.inner
            .orders
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::OrderNotFound(id.clone()))
    }

    async fn fetch_open_orders(&self, symbols: &[Symbol]) -> Result<Vec<Order>, ClientError> {
        self.enter(MockOp::FetchOpenOrders).await?;

        let orders = self.inner.orders.lock();
        Ok(orders
            .values()
            .filter(|order| order.status == OrderStatus::Open && symbols.contains(&order.symbol))
            .cloned()
            .collect())
    }

    async fn create_order(&self, request: OrderRequestOpen) -> Result<Order, ClientError> {
        self.enter(MockOp::CreateOrder).await?;

        let raw = format::RawOrder {
            id: self.next_order_id(),
            client_order_id: None,
            timestamp: Some(Utc::now()),
            status: OrderStatus::Open,
            symbol: request.symbol.clone(),
            kind: None,
            side: None,
            price: None,
            amount: None,
            filled: Some(Decimal::ZERO),
        };

        let order = format::order(raw, Some(&request));
        self.inner
            .orders
            .lock()
            .insert(order.id.clone(), order.clone());

        Ok(order)
    }

    async fn cancel_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<(), ClientError> {
        self.enter(MockOp::CancelOrder).await?;

        let update = {
            let mut orders = self.inner.orders.lock();
            let Some(order) = orders.get_mut(id) else {
                return Err(ClientError::OrderNotFound(id.clone()));
            };
            order.status = OrderStatus::Canceled;
            order.clone()
        };

        self.push_order_update(vec![update]);
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        self.inner.orders_notify.notify_waiters();
        self.inner.balance_notify.notify_waiters();
        debug!("simulated venue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderKind, Side};
    use rust_decimal_macros::dec;

    fn request(cid: &str) -> OrderRequestOpen {
        OrderRequestOpen {
            client_order_id: cid.into(),
            symbol: "BTC/USDT".into(),
            kind: OrderKind::Limit,
            side: Side::Sell,
            price: dec!(100000),
            amount: dec!(0.00001),
        }
    }

    #[tokio::test]
    async fn create_then_cancel_pushes_canceled_update() {
        let exchange = MockExchange::default();
        exchange.stage_order_id(OrderId::new("X1"));

        let order = exchange.create_order(request("cid-1")).await.unwrap();
        assert_eq!(order.id, OrderId::new("X1"));
        assert_eq!(order.client_order_id, Some("cid-1".into()));
        assert_eq!(order.status, OrderStatus::Open);

        exchange
            .cancel_order(&order.id, &order.symbol)
            .await
            .unwrap();

        let update = exchange.watch_orders().await.unwrap();
        assert_eq!(update[0].status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_not_found() {
        let exchange = MockExchange::default();

        let result = exchange
            .cancel_order(&OrderId::new("missing"), &"BTC/USDT".into())
            .await;

        assert_eq!(
            result,
            Err(ClientError::OrderNotFound(OrderId::new("missing")))
        );
    }

    #[tokio::test]
    async fn primed_failure_fires_once() {
        let exchange = MockExchange::default();
        exchange.fail_next(MockOp::CreateOrder, ClientError::RateLimit);

        assert_eq!(
            exchange.create_order(request("cid-1")).await,
            Err(ClientError::RateLimit)
        );
        assert!(exchange.create_order(request("cid-2")).await.is_ok());
    }

    #[tokio::test]
    async fn synthetic_book_respects_depth() {
        let exchange = MockExchange::default();

        let book = exchange
            .fetch_order_book(&"ETH/USDT".into(), 10)
            .await
            .unwrap();

        assert_eq!(book.bids.len(), 10);
        assert_eq!(book.asks.len(), 10);
        assert!(book.bids[0].price() > book.bids[9].price());
        assert!(book.asks[0].price() < book.asks[9].price());
    }

    #[tokio::test]
    async fn complete_order_transitions_and_pushes() {
        let exchange = MockExchange::default();
        exchange.stage_order_id(OrderId::new("X1"));
        let order = exchange.create_order(request("cid-1")).await.unwrap();

        exchange.complete_order(&order.id, dec!(0.00001));

        let update = exchange.watch_orders().await.unwrap();
        assert_eq!(update[0].status, OrderStatus::Closed);
        assert_eq!(update[0].filled, Some(dec!(0.00001)));
    }
}
