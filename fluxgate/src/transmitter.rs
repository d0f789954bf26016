//! Multi-stream bus transmitter.
//!
//! Owns the four outbound publications and applies the per-status retry
//! policy: transient back-pressure retries indefinitely with idle sleeps
//! (this is the intentional form of core→gateway backpressure), every
//! other failure is logged locally and the message dropped. Publish
//! failures never propagate to the emitting task.

use crate::event::Event;
use fluxgate_integration::bus::{OfferError, Publication, SleepingIdleStrategy};
use std::time::Duration;
use tracing::warn;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Outbound stream selector.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Destination {
    OrderBook,
    Balance,
    Core,
    Logs,
}

pub struct Transmitter {
    order_books: Box<dyn Publication>,
    balances: Box<dyn Publication>,
    core: Box<dyn Publication>,
    logs: Box<dyn Publication>,
    idle: SleepingIdleStrategy,
}

impl Transmitter {
    pub fn new(
        order_books: Box<dyn Publication>,
        balances: Box<dyn Publication>,
        core: Box<dyn Publication>,
        logs: Box<dyn Publication>,
    ) -> Self {
        Self {
            order_books,
            balances,
            core,
            logs,
            idle: SleepingIdleStrategy::new(IDLE_SLEEP),
        }
    }

    /// Serialise the event once and publish it to the selected stream.
    pub async fn offer(&self, event: &Event, destination: Destination) {
        let message = match event.encode() {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "failed to encode outbound event");
                return;
            }
        };

        let publication = match destination {
            Destination::OrderBook => &self.order_books,
            Destination::Balance => &self.balances,
            Destination::Core => &self.core,
            Destination::Logs => &self.logs,
        };

        self.offer_until_success(publication.as_ref(), &message)
            .await;
    }

    async fn offer_until_success(&self, publication: &dyn Publication, message: &str) {
        loop {
            match publication.offer(message) {
                Ok(()) => break,
                Err(OfferError::AdminAction) => self.idle.idle(0).await,
                Err(error) => {
                    warn!(%error, "dropping outbound message");
                    break;
                }
            }
        }
    }

    pub fn close(&self) {
        self.order_books.close();
        self.balances.close();
        self.core.close();
        self.logs.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Action, EventFactory, Node};
    use fluxgate_integration::bus::{StreamId, Subscription, ipc::IpcDriver};

    fn transmitter(driver: &IpcDriver) -> Transmitter {
        Transmitter::new(
            Box::new(driver.publication("aeron:ipc", StreamId(1))),
            Box::new(driver.publication("aeron:ipc", StreamId(2))),
            Box::new(driver.publication("aeron:ipc", StreamId(3))),
            Box::new(driver.publication("aeron:ipc", StreamId(4))),
        )
    }

    #[tokio::test]
    async fn routes_by_destination() {
        let driver = IpcDriver::new();
        let mut core = driver.subscription("aeron:ipc", StreamId(3));
        let mut logs = driver.subscription("aeron:ipc", StreamId(4));
        let transmitter = transmitter(&driver);

        let factory =
            EventFactory::new("exmo".into(), "algo".into(), Node::Gate, "test".into());
        let event = factory.data(Action::Ping, None, &1u64).unwrap();

        transmitter.offer(&event, Destination::Core).await;

        let mut received = Vec::new();
        core.poll(&mut |message| received.push(message.to_owned()));
        assert_eq!(received.len(), 1);

        let mut mirrored = Vec::new();
        logs.poll(&mut |message| mirrored.push(message.to_owned()));
        assert!(mirrored.is_empty());
    }

    #[tokio::test]
    async fn missing_subscriber_drops_without_error() {
        let driver = IpcDriver::new();
        let transmitter = transmitter(&driver);

        let factory =
            EventFactory::new("exmo".into(), "algo".into(), Node::Gate, "test".into());
        let event = factory.data(Action::Ping, None, &1u64).unwrap();

        // No subscription registered anywhere: offer must return, not hang.
        transmitter.offer(&event, Destination::Balance).await;
    }
}
