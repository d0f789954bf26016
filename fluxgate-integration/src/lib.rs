//! Integration plumbing shared by the fluxgate gateway components.
//!
//! - [`bus`]: the named-stream log bus the gateway uses to talk to the
//!   trading core (publications, subscriptions, offer statuses).
//! - [`kv`]: the external key-value cache backing the order correlator.
//! - [`metric`]: telemetry sample model emitted on the LOGS stream.

pub mod bus;
pub mod kv;
pub mod metric;
