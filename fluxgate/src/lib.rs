//! Market-access gateway between a trading core and a crypto venue.
//!
//! The gateway receives abstract commands (place, cancel, query orders,
//! request balance) from the core over a named-stream log bus, executes
//! them against a pooled venue client, and lifts every venue-originated
//! update (order books, balances, order lifecycle events) back into the
//! core's canonical event schema.

/// Bootstrap and runtime configuration model.
pub mod config;

/// Runtime configuration fetcher.
pub mod configurator;

/// Order id correlation and the open-order tracker.
pub mod correlator;

/// Canonical event envelope and codec.
pub mod event;

/// The gateway itself: dispatcher, subscription loops, orchestration.
pub mod gate;

/// `tracing` initialisation.
pub mod logging;

/// Latency/rate telemetry window.
pub mod metrics;

/// Multi-stream bus transmitter.
pub mod transmitter;
