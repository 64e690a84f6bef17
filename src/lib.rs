//! Pitchlake indexing pipeline.
//!
//! Three-stage pipeline for the Pitchlake options-vault protocol: chain
//! ingress journals blocks and vault events off the node host, the replayer
//! folds the journal into a relational projection with reorg-safe reverse
//! application, and the fan-out server pushes incremental updates to
//! WebSocket subscribers.

pub mod config;
pub mod db;
pub mod errors;
pub mod felt;
pub mod ingress;
pub mod models;
pub mod replay;
pub mod server;

pub use errors::IndexerError;
