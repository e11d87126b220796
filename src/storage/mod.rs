mod error;
mod in_memory;
mod store;

pub use error::StorageError;
pub use in_memory::{InMemoryInboxStorage, InMemoryTx, StorageStats};
pub use store::{InboxStorage, IsolationLevel};
