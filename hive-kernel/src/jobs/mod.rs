//! Durable job registry, assignment ledger, and distribution

pub mod distributor;
pub mod job;
pub mod registry;
pub mod store;

pub use distributor::{BalancedDistributor, JobDistributor};
pub use job::Job;
pub use registry::{JobRegistry, RegistryEvent};
pub use store::JobStore;
