//! Core engine for the widget reconciliation daemon.
//!
//! The daemon continuously polls a source container acting as a surrogate
//! queue, fetches pending change events, and applies each event's intent
//! (create, update, delete) to the configured sinks: a mirrored object-store
//! container and/or a primary-key table store.
//!
//! Data flows strictly downward each cycle:
//!
//! ```text
//! source listing -> selector -> parser -> dispatcher -> sinks -> acknowledge
//! ```
//!
//! Delivery is at-least-once. Transient sink failures leave the event in the
//! source for the next cycle; deterministic failures (malformed payloads,
//! missing identity fields) are logged and acknowledged so a single bad event
//! can never stall the stream.

pub mod consumer;
pub mod event;
pub mod normalize;
pub mod paths;
pub mod router;
pub mod selector;
pub mod sink;
pub mod source;

pub use consumer::Consumer;
