use serde::{Deserialize, Serialize};

use crate::statement::{ProviderSelection, TableDescriptor};
use crate::storage::IsolationLevel;

/// Coordinator configuration.
///
/// Recognized options mirror the endpoint configuration surface:
/// `isolationLevel` for every opened transaction,
/// `lockStatementProvider` to pick a shipped dialect, and the consumer
/// identity that scopes the inbox records. A custom provider can still
/// be supplied by constructing the coordinator with it directly.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct InboxConfig {
    pub isolation_level: IsolationLevel,
    /// Dialect selection; construct the coordinator with
    /// `config.lock_statement_provider.provider()` to honor it.
    pub lock_statement_provider: ProviderSelection,
    pub table: TableDescriptor,
    pub id_column: String,
    pub consumer_column: String,
    /// Logical consumer/endpoint identity owning the records.
    pub consumer_id: String,
}

impl Default for InboxConfig {
    fn default() -> Self {
        InboxConfig {
            isolation_level: IsolationLevel::default(),
            lock_statement_provider: ProviderSelection::default(),
            table: TableDescriptor::new("inbox"),
            id_column: "message_id".into(),
            consumer_column: "consumer_id".into(),
            consumer_id: "default".into(),
        }
    }
}

impl InboxConfig {
    pub fn new(consumer_id: impl Into<String>) -> Self {
        InboxConfig {
            consumer_id: consumer_id.into(),
            ..InboxConfig::default()
        }
    }

    pub fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.table = table;
        self
    }
}

/// Read-only descriptor for external observability tooling. No
/// behavioral effect.
#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
pub struct ProbeDescriptor {
    pub component: &'static str,
    pub provider: &'static str,
}

impl ProbeDescriptor {
    /// JSON form as handed to probe endpoints.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "component": self.component, "provider": self.provider })
    }
}
