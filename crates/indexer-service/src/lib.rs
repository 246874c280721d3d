//! Assembled indexing service: configuration-driven wiring of the store,
//! queues, protocol handlers, order adapters and reconciliation workers.

pub mod service;

pub use service::{IndexerService, OrderSaveHandler};
