//! Datagram media for the log bus.
//!
//! One message per datagram. Sockets are non-blocking: a send that would
//! block maps to [`OfferError::AdminAction`] and a refused connection maps
//! to [`OfferError::NotConnected`], mirroring the IPC driver statuses.

use super::{OfferError, POLL_FRAGMENT_LIMIT, Publication, Subscription};
use std::{
    io::ErrorKind,
    net::UdpSocket,
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::warn;

const RECV_BUFFER_LEN: usize = 64 * 1024;

#[derive(Debug)]
pub struct UdpPublication {
    socket: UdpSocket,
    closed: AtomicBool,
}

impl UdpPublication {
    pub fn connect(endpoint: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(endpoint)?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket,
            closed: AtomicBool::new(false),
        })
    }
}

impl Publication for UdpPublication {
    fn offer(&self, message: &str) -> Result<(), OfferError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(OfferError::Closed);
        }

        match self.socket.send(message.as_bytes()) {
            Ok(_) => Ok(()),
            Err(error) if error.kind() == ErrorKind::WouldBlock => Err(OfferError::AdminAction),
            Err(error) if error.kind() == ErrorKind::ConnectionRefused => {
                Err(OfferError::NotConnected)
            }
            Err(error) => {
                warn!(%error, "udp offer failed");
                Err(OfferError::NotConnected)
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct UdpSubscription {
    socket: UdpSocket,
    buffer: Vec<u8>,
    closed: bool,
}

impl UdpSubscription {
    pub fn bind(endpoint: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(endpoint)?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket,
            buffer: vec![0; RECV_BUFFER_LEN],
            closed: false,
        })
    }
}

impl Subscription for UdpSubscription {
    fn poll(&mut self, on_message: &mut dyn FnMut(&str)) -> usize {
        if self.closed {
            return 0;
        }

        let mut read = 0;
        while read < POLL_FRAGMENT_LIMIT {
            match self.socket.recv(&mut self.buffer) {
                Ok(len) => {
                    read += 1;
                    match std::str::from_utf8(&self.buffer[..len]) {
                        Ok(message) => on_message(message),
                        Err(error) => warn!(%error, "discarding non-utf8 datagram"),
                    }
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(error) => {
                    warn!(%error, "udp poll failed");
                    break;
                }
            }
        }
        read
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
