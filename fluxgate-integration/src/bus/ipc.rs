//! Process-local bus driver.
//!
//! Streams are routed inside the process: every subscription registers a
//! bounded queue under its `(channel, stream id)` key, and publications
//! fan messages out to the registered queues. A full queue surfaces as
//! [`OfferError::AdminAction`] so publishers experience the same
//! back-pressure they would against the real media driver.

use super::{OfferError, POLL_FRAGMENT_LIMIT, Publication, StreamId, Subscription};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::mpsc;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

type StreamKey = (String, StreamId);

/// Registry routing publications to subscriptions within one process.
#[derive(Debug, Clone, Default)]
pub struct IpcDriver {
    streams: Arc<Mutex<FnvHashMap<StreamKey, Vec<mpsc::Sender<String>>>>>,
}

impl IpcDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publication(&self, channel: &str, stream_id: StreamId) -> IpcPublication {
        IpcPublication {
            driver: self.clone(),
            key: (channel.to_owned(), stream_id),
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscription(&self, channel: &str, stream_id: StreamId) -> IpcSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);

        self.streams
            .lock()
            .entry((channel.to_owned(), stream_id))
            .or_default()
            .push(tx);

        IpcSubscription { rx }
    }

    fn offer(&self, key: &StreamKey, message: &str) -> Result<(), OfferError> {
        let mut streams = self.streams.lock();

        let Some(queues) = streams.get_mut(key) else {
            return Err(OfferError::NotConnected);
        };

        queues.retain(|queue| !queue.is_closed());
        if queues.is_empty() {
            streams.remove(key);
            return Err(OfferError::NotConnected);
        }

        let mut back_pressured = false;
        for queue in queues.iter() {
            match queue.try_send(message.to_owned()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => back_pressured = true,
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        if back_pressured {
            Err(OfferError::AdminAction)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct IpcPublication {
    driver: IpcDriver,
    key: StreamKey,
    closed: AtomicBool,
}

impl Publication for IpcPublication {
    fn offer(&self, message: &str) -> Result<(), OfferError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(OfferError::Closed);
        }
        self.driver.offer(&self.key, message)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct IpcSubscription {
    rx: mpsc::Receiver<String>,
}

impl Subscription for IpcSubscription {
    fn poll(&mut self, on_message: &mut dyn FnMut(&str)) -> usize {
        let mut read = 0;
        while read < POLL_FRAGMENT_LIMIT {
            match self.rx.try_recv() {
                Ok(message) => {
                    on_message(&message);
                    read += 1;
                }
                Err(_) => break,
            }
        }
        read
    }

    fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_id() -> StreamId {
        StreamId(1001)
    }

    #[test]
    fn offer_without_subscriber_is_not_connected() {
        let driver = IpcDriver::new();
        let publication = driver.publication("aeron:ipc", stream_id());

        assert_eq!(
            publication.offer("msg"),
            Err(OfferError::NotConnected)
        );
    }

    #[test]
    fn offer_reaches_subscriber() {
        let driver = IpcDriver::new();
        let mut subscription = driver.subscription("aeron:ipc", stream_id());
        let publication = driver.publication("aeron:ipc", stream_id());

        publication.offer("one").unwrap();
        publication.offer("two").unwrap();

        let mut received = Vec::new();
        let read = subscription.poll(&mut |message| received.push(message.to_owned()));

        assert_eq!(read, 2);
        assert_eq!(received, vec!["one".to_owned(), "two".to_owned()]);
    }

    #[test]
    fn full_subscriber_queue_back_pressures() {
        let driver = IpcDriver::new();
        let _subscription = driver.subscription("aeron:ipc", stream_id());
        let publication = driver.publication("aeron:ipc", stream_id());

        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY {
            publication.offer("fill").unwrap();
        }

        assert_eq!(publication.offer("overflow"), Err(OfferError::AdminAction));
    }

    #[test]
    fn closed_publication_rejects_offers() {
        let driver = IpcDriver::new();
        let _subscription = driver.subscription("aeron:ipc", stream_id());
        let publication = driver.publication("aeron:ipc", stream_id());

        publication.close();

        assert_eq!(publication.offer("msg"), Err(OfferError::Closed));
    }

    #[test]
    fn poll_respects_fragment_limit() {
        let driver = IpcDriver::new();
        let mut subscription = driver.subscription("aeron:ipc", stream_id());
        let publication = driver.publication("aeron:ipc", stream_id());

        for _ in 0..POLL_FRAGMENT_LIMIT + 3 {
            publication.offer("msg").unwrap();
        }

        let read = subscription.poll(&mut |_| {});
        assert_eq!(read, POLL_FRAGMENT_LIMIT);

        let read = subscription.poll(&mut |_| {});
        assert_eq!(read, 3);
    }
}
