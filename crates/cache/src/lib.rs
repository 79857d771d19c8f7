#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;
pub mod storage;
pub mod store;

pub use client::RedisStorage;
pub use local::MemoryStorage;
pub use storage::{FileStorage, SelectionStorage};
pub use store::WizardStateStore;
