//! Ephemeral, read-once message storage keyed by phone number.
//!
//! Every message expires after a fixed window whether or not it was read,
//! and a successful read removes it, so no message is delivered twice.

mod entry;
mod error;
mod memory;
mod redis_store;
mod state;
mod store;

pub use entry::Entry;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::{RedisOptions, RedisStore};
pub use state::{ConnectionMonitor, ConnectionState};
pub use store::Store;
