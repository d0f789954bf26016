use crate::AssetName;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Funds held in one asset. `free + used = total` is expected but not
/// enforced by the gateway.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize, Constructor,
)]
pub struct Balance {
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// Balance snapshot for a set of assets.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct BalanceSnapshot {
    pub assets: FnvHashMap<AssetName, Balance>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}
