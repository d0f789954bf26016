//! The gateway: orchestration, priority gate and the command poll loop.
//!
//! [`Gate`] owns every shared component and runs the cooperating loops as
//! concurrent siblings. Command handlers spawn as tracked background
//! tasks; periodic private polling yields to command bursts through the
//! [`PriorityGate`].

use crate::{
    config::{DataCollectionMethods, RuntimeConfig},
    correlator::{OpenOrders, OrderCorrelator},
    event::EventFactory,
    metrics::MetricsRecorder,
    transmitter::Transmitter,
};
use fluxgate_execution::{
    AssetName, Symbol,
    client::ExchangeClient,
    pool::{CredentialPool, PublicPool},
};
use fluxgate_integration::{
    bus::{SleepingIdleStrategy, Subscription},
    kv::KeyValueStore,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinSet};
use tracing::info;

mod commands;
mod loops;

/// Latch closed while command bursts run, reopened when the burst
/// completes or aborts. Periodic private polling awaits it before each
/// venue call so command traffic wins the credential pool.
#[derive(Debug, Clone)]
pub struct PriorityGate {
    bursts: watch::Sender<usize>,
}

impl Default for PriorityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityGate {
    pub fn new() -> Self {
        Self {
            bursts: watch::channel(0).0,
        }
    }

    /// Close the gate for one burst. The returned pass reopens it on drop.
    pub fn enter(&self) -> PriorityPass {
        self.bursts.send_modify(|bursts| *bursts += 1);
        PriorityPass {
            bursts: self.bursts.clone(),
        }
    }

    /// Wait until no burst is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.bursts.subscribe();
        // Fails only when the sender is dropped, which `&self` precludes.
        let _ = rx.wait_for(|bursts| *bursts == 0).await;
    }
}

pub struct PriorityPass {
    bursts: watch::Sender<usize>,
}

impl Drop for PriorityPass {
    fn drop(&mut self) {
        self.bursts
            .send_modify(|bursts| *bursts = bursts.saturating_sub(1));
    }
}

pub struct Gate<Client> {
    inner: Arc<GateInner<Client>>,
}

impl<Client> Clone for Gate<Client> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct GateInner<Client> {
    pub(crate) factory: EventFactory,
    pub(crate) transmitter: Transmitter,
    pub(crate) correlator: OrderCorrelator,
    pub(crate) open_orders: OpenOrders,
    pub(crate) private_pool: CredentialPool<Client>,
    pub(crate) public_pool: PublicPool<Client>,
    pub(crate) priority_gate: PriorityGate,
    pub(crate) metrics: MetricsRecorder,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) assets: Vec<AssetName>,
    pub(crate) depth: usize,
    pub(crate) balance_delay: Duration,
    pub(crate) order_status_delay: Duration,
    pub(crate) methods: DataCollectionMethods,
    pub(crate) subscribe_timeout: Option<Duration>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl<Client> Gate<Client>
where
    Client: ExchangeClient,
{
    pub fn new(
        config: &RuntimeConfig,
        private_clients: Vec<Client>,
        public_pool: PublicPool<Client>,
        transmitter: Transmitter,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let gate_config = config.gate_config();

        let factory = EventFactory::new(
            gate_config.info.exchange.clone(),
            config.algo.clone(),
            gate_config.info.node,
            gate_config.info.instance.clone(),
        );

        Self {
            inner: Arc::new(GateInner {
                factory,
                transmitter,
                correlator: OrderCorrelator::new(store),
                open_orders: OpenOrders::new(),
                private_pool: CredentialPool::new(private_clients),
                public_pool,
                priority_gate: PriorityGate::new(),
                metrics: MetricsRecorder::new(),
                symbols: config.symbols(),
                assets: config.assets(),
                depth: gate_config.gate.order_book_depth,
                balance_delay: Duration::from_secs_f64(gate_config.gate.balance_delay),
                order_status_delay: Duration::from_secs_f64(
                    gate_config.gate.order_status_delay,
                ),
                methods: gate_config.data_collection_method.clone(),
                subscribe_timeout: gate_config
                    .rate_limits
                    .subscribe_timeout
                    .map(Duration::from_secs_f64),
                shutdown: watch::channel(false).0,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Run the gateway until shutdown is triggered: bus command polling,
    /// the three subscription loops and telemetry as concurrent siblings.
    pub async fn run(&self, subscription: Box<dyn Subscription>) {
        tokio::select! {
            _ = self.poll_commands(subscription) => {}
            _ = self.order_book_loop() => {}
            _ = self.balance_loop() => {}
            _ = self.orders_loop() => {}
            _ = self.telemetry_loop() => {}
        }
    }

    /// Request an orderly shutdown; [`Gate::run`] returns once in-flight
    /// command handlers have drained.
    pub fn trigger_shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    /// Close venue clients, then the bus transmitter. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for client in self.inner.private_pool.clients() {
            client.close().await;
        }
        self.inner.public_pool.client().close().await;
        self.inner.transmitter.close();

        info!("gateway closed");
    }

    pub fn open_order_count(&self) -> usize {
        self.inner.open_orders.len()
    }

    pub fn correlator(&self) -> &OrderCorrelator {
        &self.inner.correlator
    }

    async fn poll_commands(&self, mut subscription: Box<dyn Subscription>) {
        let idle = SleepingIdleStrategy::new(Duration::from_millis(1));
        let mut handlers: JoinSet<()> = JoinSet::new();
        let mut shutdown = self.inner.shutdown.subscribe();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let mut messages = Vec::new();
            let read = subscription.poll(&mut |message| messages.push(message.to_owned()));

            for message in messages {
                let gate = self.clone();
                handlers.spawn(async move { gate.handle_message(message).await });
            }

            // Reap completed handlers so the set only pins live tasks.
            while handlers.try_join_next().is_some() {}

            tokio::select! {
                _ = idle.idle(read) => {}
                _ = shutdown.changed() => {}
            }
        }

        subscription.close();

        // Let in-flight handlers finish before close() tears clients down.
        while handlers.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn priority_gate_open_when_idle() {
        let gate = PriorityGate::new();

        tokio::time::timeout(Duration::from_millis(20), gate.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn priority_gate_closed_while_burst_in_flight() {
        let gate = PriorityGate::new();
        let pass = gate.enter();

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), gate.wait_idle()).await;
        assert!(blocked.is_err());

        drop(pass);
        tokio::time::timeout(Duration::from_millis(20), gate.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn priority_gate_counts_nested_bursts() {
        let gate = PriorityGate::new();
        let first = gate.enter();
        let second = gate.enter();

        drop(first);
        let blocked =
            tokio::time::timeout(Duration::from_millis(20), gate.wait_idle()).await;
        assert!(blocked.is_err());

        drop(second);
        tokio::time::timeout(Duration::from_millis(20), gate.wait_idle())
            .await
            .unwrap();
    }
}
