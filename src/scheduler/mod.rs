//! Coordinator-side lease bookkeeping.
//!
//! - [`catalog`]: the token catalog and the sources it is rebuilt from
//! - [`job`]: per-job records (cursor, leases, heartbeats, lifecycle)
//! - [`registry`]: the map of job records
//! - [`lease`]: [`LeaseScheduler`], the Get/Done/HeartBeat state machine
//! - [`sweeper`]: periodic eviction of old job records

pub mod catalog;
pub mod job;
pub mod lease;
pub mod registry;
pub mod sweeper;

pub use catalog::{DirectorySource, StaticSource, TokenCatalog, TokenSource};
pub use job::{Batch, JobRecord, JobSummary, LeaseRange};
pub use lease::LeaseScheduler;
pub use registry::JobRegistry;
pub use sweeper::RegistrySweeper;
