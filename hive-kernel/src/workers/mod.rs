//! Worker lifecycle: factories, capability scopes, and supervision

pub mod factory;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use factory::{DispatchingFactory, FanoutFactory, WorkerFactory};
pub use store::WorkerStore;
pub use supervisor::WorkerSupervisor;
pub use worker::{Worker, WorkerScope};
