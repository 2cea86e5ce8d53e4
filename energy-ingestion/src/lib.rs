pub mod alerts;
pub mod bootstrap;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod query_api;
pub mod simulator;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{BatchOrchestrator, BatchOutcome, Envelope, Pipeline};
