/// Session management module - Gateway

mod storage;
mod store;

pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{SessionStore, Snapshot, StoreState};
