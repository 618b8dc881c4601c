//! Collaborator seams over the external persistent store, plus the
//! in-memory implementation used by tests and the demo wiring.

pub mod collaborators;
pub mod memory;

pub use collaborators::{
    CounterStore, EventHistory, OrderActivity, Page, SnapshotStore, StoreRoster,
};
pub use memory::MemoryDatastore;
