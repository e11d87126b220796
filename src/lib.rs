mod config;
mod coordinator;
mod error;
mod handler;
mod message;
mod record;
mod retry;
mod statement;
pub mod storage;

pub use config::{InboxConfig, ProbeDescriptor};
pub use coordinator::InboxCoordinator;
pub use error::{BoxError, InboxError};
pub use handler::{HandlerContext, InboxHandler};
pub use message::{CancellationToken, MessageContext, ReceivedMessage};
pub use record::{InboxRecord, RecordKey};
pub use retry::{AttemptOutcome, ExecuteOnce, RetryStrategy, TransientRetry, UnitOfWork};
pub use statement::{
    LockStatement, LockStatementProvider, MySqlLockStatements, PostgresLockStatements,
    ProviderSelection, SqlServerLockStatements, TableDescriptor,
};
pub use storage::{InMemoryInboxStorage, InboxStorage, IsolationLevel, StorageError};
