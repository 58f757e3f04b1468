//! Worker side of the lease protocol.
//!
//! A worker repeatedly leases a batch, keeps the lease alive while it
//! processes the tokens, and releases it with Done. Results are kept only
//! for batches the coordinator accepted.
//!
//! # Components
//!
//! - [`LeaseClient`]: gRPC client for the coordinator (worker and admin calls)
//! - [`HeartbeatAgent`]: background heartbeat for one lease
//! - [`BatchRunner`]: the batch loop and result-file output
//! - [`EchoProcessor`], [`CopyProcessor`], [`IoTestProcessor`]: reference [`TokenProcessor`]s

pub mod client;
pub mod heartbeat;
pub mod processor;
pub mod runner;

pub use client::{LeaseApi, LeaseClient};
pub use heartbeat::{HeartbeatAgent, LeaseSignal};
pub use processor::{
    CopyProcessor, CopyRecord, EchoProcessor, IoTestProcessor, IoTestRecord, TokenProcessor,
};
pub use runner::{write_output, BatchRunner, RunSummary};
