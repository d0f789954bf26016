//! Named-stream log bus.
//!
//! The gateway talks to the trading core over a set of named,
//! unidirectional streams provided by a UDP/IPC log transport. This module
//! defines the seam the rest of the gateway programs against:
//! [`Publication`] / [`Subscription`] with aeron-style offer statuses, plus
//! the two bundled media implementations ([`ipc`] for process-local
//! streams, [`udp`] for datagram endpoints).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod ipc;
pub mod udp;

use ipc::IpcDriver;

/// Maximum messages drained per [`Subscription::poll`] call.
pub const POLL_FRAGMENT_LIMIT: usize = 10;

/// Stream identifier within a bus channel.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct StreamId(pub i32);

/// Endpoint of one named stream, as found in the gateway configuration blob.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct StreamConfig {
    pub channel: String,
    pub stream_id: StreamId,
}

/// Parsed bus channel URI.
///
/// Supported forms: `aeron:ipc` and `aeron:udp?endpoint=<host:port>`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ChannelUri {
    Ipc,
    Udp { endpoint: String },
}

impl ChannelUri {
    pub fn parse(uri: &str) -> Result<Self, ChannelUriError> {
        let invalid = || ChannelUriError(uri.to_owned());

        let remainder = uri.strip_prefix("aeron:").ok_or_else(invalid)?;

        match remainder {
            "ipc" => Ok(Self::Ipc),
            _ => {
                let params = remainder.strip_prefix("udp?").ok_or_else(invalid)?;
                let endpoint = params
                    .split('|')
                    .find_map(|param| param.strip_prefix("endpoint="))
                    .ok_or_else(invalid)?;

                if endpoint.is_empty() {
                    return Err(invalid());
                }

                Ok(Self::Udp {
                    endpoint: endpoint.to_owned(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("invalid bus channel uri: {0}")]
pub struct ChannelUriError(pub String);

/// Status of a failed [`Publication::offer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum OfferError {
    /// Transient driver back-pressure; the caller may retry.
    #[error("publication back-pressured (admin action)")]
    AdminAction,

    /// No subscriber is connected to the stream.
    #[error("publication not connected")]
    NotConnected,

    #[error("publication closed")]
    Closed,
}

/// Outbound half of one named stream.
pub trait Publication: Send + Sync {
    /// Offer a single message to the stream. Returns immediately with the
    /// driver status; retry policy is the caller's concern.
    fn offer(&self, message: &str) -> Result<(), OfferError>;

    fn close(&self);
}

/// Inbound half of one named stream.
///
/// Fragmentation is a transport concern: `on_message` always receives
/// whole, reassembled messages.
pub trait Subscription: Send {
    /// Drain up to [`POLL_FRAGMENT_LIMIT`] pending messages, invoking
    /// `on_message` per message. Returns the number of messages read.
    fn poll(&mut self, on_message: &mut dyn FnMut(&str)) -> usize;

    fn close(&mut self);
}

/// Idle strategy for cooperative poll loops: sleep when a poll returned no
/// work, otherwise yield back to the scheduler.
#[derive(Debug, Clone)]
pub struct SleepingIdleStrategy {
    duration: Duration,
}

impl SleepingIdleStrategy {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub async fn idle(&self, work_count: usize) {
        if work_count == 0 {
            tokio::time::sleep(self.duration).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("channel: {0}")]
    Uri(#[from] ChannelUriError),

    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
}

/// Construct the [`Publication`] for a configured stream endpoint.
///
/// IPC channels attach to the provided process-local driver; UDP channels
/// open their own socket.
pub fn publication(
    driver: &IpcDriver,
    config: &StreamConfig,
) -> Result<Box<dyn Publication>, BusError> {
    match ChannelUri::parse(&config.channel)? {
        ChannelUri::Ipc => Ok(Box::new(driver.publication(&config.channel, config.stream_id))),
        ChannelUri::Udp { endpoint } => {
            Ok(Box::new(udp::UdpPublication::connect(&endpoint)?))
        }
    }
}

/// Construct the [`Subscription`] for a configured stream endpoint.
pub fn subscription(
    driver: &IpcDriver,
    config: &StreamConfig,
) -> Result<Box<dyn Subscription>, BusError> {
    match ChannelUri::parse(&config.channel)? {
        ChannelUri::Ipc => Ok(Box::new(
            driver.subscription(&config.channel, config.stream_id),
        )),
        ChannelUri::Udp { endpoint } => Ok(Box::new(udp::UdpSubscription::bind(&endpoint)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_uri_parses_ipc() {
        assert_eq!(ChannelUri::parse("aeron:ipc").unwrap(), ChannelUri::Ipc);
    }

    #[test]
    fn channel_uri_parses_udp_endpoint() {
        assert_eq!(
            ChannelUri::parse("aeron:udp?endpoint=127.0.0.1:40123").unwrap(),
            ChannelUri::Udp {
                endpoint: "127.0.0.1:40123".to_owned()
            }
        );
    }

    #[test]
    fn channel_uri_rejects_unknown_media() {
        assert!(ChannelUri::parse("aeron:tcp?endpoint=x").is_err());
        assert!(ChannelUri::parse("udp?endpoint=x").is_err());
        assert!(ChannelUri::parse("aeron:udp?endpoint=").is_err());
    }
}
