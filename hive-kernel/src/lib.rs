//! Hive coordination kernel
//!
//! Cooperating daemon instances ("members") share a set of independently
//! runnable jobs. The kernel keeps a membership view through heartbeats,
//! elects a single leader deterministically, lets the leader rebalance the
//! job-assignment ledger, and converges each member's running worker set to
//! its ledger entry. All durable state lives in the KV facade; components
//! talk to each other only through it and through typed event channels.

pub mod cluster;
pub mod error;
pub mod jobs;
pub mod kernel;
pub mod workers;

pub(crate) mod keys;

// Re-export main types and traits
pub use cluster::{
    Cluster, ClusterCoordinator, ClusterHandle, Member, MemberHealthCheck, MembershipChange,
};
pub use error::{KernelError, KernelResult};
pub use jobs::{BalancedDistributor, Job, JobDistributor, JobRegistry, RegistryEvent};
pub use kernel::{Kernel, KernelBuilder};
pub use workers::{
    DispatchingFactory, FanoutFactory, Worker, WorkerFactory, WorkerScope, WorkerSupervisor,
};
