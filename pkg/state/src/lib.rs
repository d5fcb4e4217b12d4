pub mod client;
pub mod leader;
pub mod memory;
pub mod store;
pub mod typed;
pub mod watch;

pub use client::StateStore;
pub use memory::MemoryStore;
pub use store::{ObjectStore, Record, StoreError};
pub use typed::Versioned;
pub use watch::{EventLog, EventType, WatchEvent};
