use crate::{
    AssetName, Symbol,
    balance::BalanceSnapshot,
    book::OrderBook,
    error::ClientError,
    order::{Order, OrderId, OrderRequestOpen},
};
use std::future::Future;

pub mod mock;

/// Uniform surface over one venue.
///
/// One instance is bound to one set of API credentials; the credential
/// pool dispenses instances round-robin. `watch_*` operations yield a
/// single update per call - the subscription loops call them in a loop.
pub trait ExchangeClient
where
    Self: Clone + Send + Sync + 'static,
{
    type Config: Clone;

    fn new(config: Self::Config) -> Self;

    fn fetch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> impl Future<Output = Result<OrderBook, ClientError>> + Send;

    fn watch_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> impl Future<Output = Result<OrderBook, ClientError>> + Send;

    /// Batched one-shot fetch across symbols.
    fn fetch_order_books(
        &self,
        symbols: &[Symbol],
        depth: usize,
    ) -> impl Future<Output = Result<Vec<OrderBook>, ClientError>> + Send {
        async move {
            let mut books = Vec::with_capacity(symbols.len());
            for symbol in symbols {
                books.push(self.fetch_order_book(symbol, depth).await?);
            }
            Ok(books)
        }
    }

    /// Balance filtered to the provided asset list; assets the venue does
    /// not report come back zeroed.
    fn fetch_partial_balance(
        &self,
        assets: &[AssetName],
    ) -> impl Future<Output = Result<BalanceSnapshot, ClientError>> + Send;

    fn watch_balance(&self) -> impl Future<Output = Result<BalanceSnapshot, ClientError>> + Send;

    fn watch_orders(&self) -> impl Future<Output = Result<Vec<Order>, ClientError>> + Send;

    fn fetch_order(
        &self,
        id: &OrderId,
        symbol: &Symbol,
    ) -> impl Future<Output = Result<Order, ClientError>> + Send;

    fn fetch_open_orders(
        &self,
        symbols: &[Symbol],
    ) -> impl Future<Output = Result<Vec<Order>, ClientError>> + Send;

    fn create_order(
        &self,
        request: OrderRequestOpen,
    ) -> impl Future<Output = Result<Order, ClientError>> + Send;

    fn cancel_order(
        &self,
        id: &OrderId,
        symbol: &Symbol,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn cancel_all_orders(
        &self,
        symbols: &[Symbol],
    ) -> impl Future<Output = Result<(), ClientError>> + Send {
        async move {
            let orders = self.fetch_open_orders(symbols).await?;
            for order in orders {
                self.cancel_order(&order.id, &order.symbol).await?;
            }
            Ok(())
        }
    }

    fn close(&self) -> impl Future<Output = ()> + Send;
}
