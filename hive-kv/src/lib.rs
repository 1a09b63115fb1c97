//! KV facade for the Hive coordination kernel
//!
//! All durable coordination state (membership, heartbeats, leadership, jobs,
//! assignments, checkpoints) lives behind the [`KvStore`] trait: durable
//! put/get, prefix scan, delete, and change watches. The `etcd` module talks
//! to a real etcd cluster; the `memory` module backs tests and single-process
//! development.

pub mod error;
pub mod etcd;
pub mod memory;
pub mod store;

pub use error::{KvError, KvResult};
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use store::{KvEvent, KvEventKind, KvPair, KvStore, KvStoreExt, Watch};
