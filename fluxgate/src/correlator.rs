//! Order id correlation and the open-order tracker.

use fluxgate_execution::{
    Symbol,
    order::{ClientOrderId, OrderId},
};
use fluxgate_integration::kv::{KeyValueStore, StoreError};
use fnv::FnvHashSet;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

const ORDER_ID_PREFIX: &str = "order_id";
const CLIENT_ORDER_ID_PREFIX: &str = "client_order_id";
const EVENT_ID_PREFIX: &str = "event_id";

/// Bidirectional `client order id <-> venue order id` mappings plus the
/// originating event id per client order, persisted in the external cache
/// so they survive in-process restarts.
///
/// The venue id never crosses the bus; unknown lookups return `None` and
/// the dispatcher turns them into ERROR events rather than fabricating
/// an id.
#[derive(Clone)]
pub struct OrderCorrelator {
    store: Arc<dyn KeyValueStore>,
}

impl OrderCorrelator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(prefix: &str, id: &str) -> String {
        format!("{prefix}:{id}")
    }

    /// Record all three mappings at the moment a create returns. A client
    /// id that has been successfully placed keeps exactly one venue id.
    pub async fn record_create(
        &self,
        client_order_id: &ClientOrderId,
        order_id: &OrderId,
        event_id: Uuid,
    ) -> Result<(), StoreError> {
        self.store
            .set(
                &Self::key(ORDER_ID_PREFIX, &client_order_id.0),
                &order_id.0,
            )
            .await?;
        self.store
            .set(
                &Self::key(CLIENT_ORDER_ID_PREFIX, &order_id.0),
                &client_order_id.0,
            )
            .await?;
        self.store
            .set(
                &Self::key(EVENT_ID_PREFIX, &client_order_id.0),
                &event_id.to_string(),
            )
            .await?;
        Ok(())
    }

    pub async fn order_id(
        &self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<OrderId>, StoreError> {
        let value = self
            .store
            .get(&Self::key(ORDER_ID_PREFIX, &client_order_id.0))
            .await?;
        Ok(value.map(OrderId::new))
    }

    pub async fn client_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ClientOrderId>, StoreError> {
        let value = self
            .store
            .get(&Self::key(CLIENT_ORDER_ID_PREFIX, &order_id.0))
            .await?;
        Ok(value.map(ClientOrderId::new))
    }

    /// Originating event id, reused by unsolicited order updates so the
    /// core can correlate.
    pub async fn event_id(
        &self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<Uuid>, StoreError> {
        let value = self
            .store
            .get(&Self::key(EVENT_ID_PREFIX, &client_order_id.0))
            .await?;
        Ok(value.and_then(|value| Uuid::parse_str(&value).ok()))
    }
}

/// Set of `(client order id, symbol)` pairs the gateway believes are still
/// live on the venue.
///
/// Mutated only by the create path and the orders loop; the mutex makes
/// that safe on a threaded runtime. Terminal statuses never resurrect an
/// entry because removal is idempotent and insertion happens only in the
/// create path.
#[derive(Debug, Clone, Default)]
pub struct OpenOrders {
    set: Arc<Mutex<FnvHashSet<(ClientOrderId, Symbol)>>>,
}

impl OpenOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client_order_id: ClientOrderId, symbol: Symbol) -> bool {
        self.set.lock().insert((client_order_id, symbol))
    }

    pub fn remove(&self, client_order_id: &ClientOrderId, symbol: &Symbol) -> bool {
        self.set
            .lock()
            .remove(&(client_order_id.clone(), symbol.clone()))
    }

    pub fn contains(&self, client_order_id: &ClientOrderId, symbol: &Symbol) -> bool {
        self.set
            .lock()
            .contains(&(client_order_id.clone(), symbol.clone()))
    }

    /// Copy of the current set, for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<(ClientOrderId, Symbol)> {
        self.set.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.set.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxgate_integration::kv::InMemoryStore;

    #[tokio::test]
    async fn create_mapping_round_trips() {
        let correlator = OrderCorrelator::new(Arc::new(InMemoryStore::new()));
        let cid = ClientOrderId::from("cid-1");
        let order_id = OrderId::new("X1");
        let event_id = Uuid::new_v4();

        correlator
            .record_create(&cid, &order_id, event_id)
            .await
            .unwrap();

        let mapped = correlator.order_id(&cid).await.unwrap().unwrap();
        let round_tripped = correlator.client_order_id(&mapped).await.unwrap();
        assert_eq!(round_tripped, Some(cid.clone()));

        assert_eq!(correlator.event_id(&cid).await.unwrap(), Some(event_id));
    }

    #[tokio::test]
    async fn unknown_lookups_are_none() {
        let correlator = OrderCorrelator::new(Arc::new(InMemoryStore::new()));

        assert_eq!(
            correlator
                .order_id(&ClientOrderId::from("cid-unknown"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            correlator
                .client_order_id(&OrderId::new("X-unknown"))
                .await
                .unwrap(),
            None
        );
    }

    #[test]
    fn open_orders_has_set_semantics() {
        let open = OpenOrders::new();
        let cid = ClientOrderId::from("cid-1");
        let symbol = Symbol::from("BTC/USDT");

        assert!(open.insert(cid.clone(), symbol.clone()));
        assert!(!open.insert(cid.clone(), symbol.clone()));
        assert_eq!(open.len(), 1);

        assert!(open.remove(&cid, &symbol));
        assert!(!open.remove(&cid, &symbol));
        assert!(open.is_empty());
    }
}
