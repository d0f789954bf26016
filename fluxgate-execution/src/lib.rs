//! Exchange-client seam for the fluxgate market-access gateway.
//!
//! Defines the canonical domain model (orders, order books, balances), the
//! [`client::ExchangeClient`] trait every venue driver implements, the
//! response normalisation helpers ([`format`]), and the credential pools
//! that gate concurrent private-API calls ([`pool`]).

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Domain balances.
pub mod balance;

/// Domain order books.
pub mod book;

/// `ExchangeClient` trait and the bundled simulated venue.
pub mod client;

/// Client error taxonomy.
pub mod error;

/// Venue response normalisation.
pub mod format;

/// Domain orders, requests and identifiers.
pub mod order;

/// Credential pools.
pub mod pool;

/// Market symbol in the gateway's common representation, eg/ "BTC/USDT".
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct Symbol(SmolStr);

impl Symbol {
    pub fn new<S>(symbol: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Asset code in the gateway's common representation, eg/ "BTC".
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct AssetName(SmolStr);

impl AssetName {
    pub fn new<S>(name: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
