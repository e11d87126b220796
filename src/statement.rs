use serde::{Deserialize, Serialize};

/// Table holding the inbox records, optionally schema-qualified.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TableDescriptor {
    pub schema: Option<String>,
    pub name: String,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        TableDescriptor {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Schema-qualified table name as it appears in generated statements.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Dialect statement template for the locking read.
///
/// Two positional parameters: message id, then consumer id. Executed
/// inside an open transaction it acquires a row-level exclusive lock and
/// returns zero or one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockStatement {
    pub sql: String,
}

impl LockStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        LockStatement { sql: sql.into() }
    }
}

const RECORD_COLUMNS: &str = "received_at, lock_token, receive_count";

/// Generates the dialect-specific locking read for one (message, consumer)
/// pair.
///
/// Pure statement generation: no transaction is opened, nothing is
/// executed, and repeated calls with the same inputs return the same
/// template. The coordinator computes the statement once per process and
/// reuses it.
pub trait LockStatementProvider: Send + Sync {
    /// Implementation name, surfaced by the probe descriptor.
    fn name(&self) -> &'static str;

    /// Build the locking read template for the given table and identity
    /// columns.
    fn statement_for(
        &self,
        table: &TableDescriptor,
        id_column: &str,
        consumer_column: &str,
    ) -> LockStatement;
}

impl LockStatementProvider for Box<dyn LockStatementProvider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn statement_for(
        &self,
        table: &TableDescriptor,
        id_column: &str,
        consumer_column: &str,
    ) -> LockStatement {
        (**self).statement_for(table, id_column, consumer_column)
    }
}

/// Configuration-bindable selection of a shipped provider, recognized as
/// the `lockStatementProvider` endpoint option.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelection {
    #[default]
    Postgres,
    SqlServer,
    MySql,
}

impl ProviderSelection {
    /// Build the selected provider with its default settings.
    pub fn provider(self) -> Box<dyn LockStatementProvider> {
        match self {
            ProviderSelection::Postgres => Box::new(PostgresLockStatements),
            ProviderSelection::SqlServer => Box::new(SqlServerLockStatements::new()),
            ProviderSelection::MySql => Box::new(MySqlLockStatements),
        }
    }
}

/// PostgreSQL: `SELECT ... FOR UPDATE`. Row locks are released when the
/// transaction ends, so a crashed holder's lock clears with its
/// connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresLockStatements;

impl LockStatementProvider for PostgresLockStatements {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn statement_for(
        &self,
        table: &TableDescriptor,
        id_column: &str,
        consumer_column: &str,
    ) -> LockStatement {
        LockStatement::new(format!(
            "SELECT {id}, {consumer}, {columns} FROM {table} \
             WHERE {id} = $1 AND {consumer} = $2 FOR UPDATE",
            id = id_column,
            consumer = consumer_column,
            columns = RECORD_COLUMNS,
            table = table.qualified(),
        ))
    }
}

/// SQL Server: `WITH (UPDLOCK, ROWLOCK)` behind a bounded `LOCK_TIMEOUT`
/// so a stale holder cannot block a reader indefinitely.
#[derive(Clone, Copy, Debug)]
pub struct SqlServerLockStatements {
    lock_wait_ms: u32,
}

impl Default for SqlServerLockStatements {
    fn default() -> Self {
        SqlServerLockStatements { lock_wait_ms: 30_000 }
    }
}

impl SqlServerLockStatements {
    pub fn new() -> Self {
        SqlServerLockStatements::default()
    }

    /// Bound the lock wait. The storage engine reports a timeout as a
    /// transient fault, which the retry strategy may re-run.
    pub fn with_lock_wait_ms(mut self, lock_wait_ms: u32) -> Self {
        self.lock_wait_ms = lock_wait_ms;
        self
    }
}

impl LockStatementProvider for SqlServerLockStatements {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn statement_for(
        &self,
        table: &TableDescriptor,
        id_column: &str,
        consumer_column: &str,
    ) -> LockStatement {
        LockStatement::new(format!(
            "SET LOCK_TIMEOUT {wait}; \
             SELECT {id}, {consumer}, {columns} FROM {table} WITH (UPDLOCK, ROWLOCK) \
             WHERE {id} = @p1 AND {consumer} = @p2",
            wait = self.lock_wait_ms,
            id = id_column,
            consumer = consumer_column,
            columns = RECORD_COLUMNS,
            table = table.qualified(),
        ))
    }
}

/// MySQL / MariaDB: `SELECT ... FOR UPDATE` with `?` placeholders.
#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlLockStatements;

impl LockStatementProvider for MySqlLockStatements {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn statement_for(
        &self,
        table: &TableDescriptor,
        id_column: &str,
        consumer_column: &str,
    ) -> LockStatement {
        LockStatement::new(format!(
            "SELECT {id}, {consumer}, {columns} FROM {table} \
             WHERE {id} = ? AND {consumer} = ? FOR UPDATE",
            id = id_column,
            consumer = consumer_column,
            columns = RECORD_COLUMNS,
            table = table.qualified(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_table_names() {
        assert_eq!(TableDescriptor::new("inbox").qualified(), "inbox");
        assert_eq!(
            TableDescriptor::new("inbox").with_schema("messaging").qualified(),
            "messaging.inbox"
        );
    }

    #[test]
    fn postgres_statement_locks_the_row() {
        let table = TableDescriptor::new("inbox");
        let statement =
            PostgresLockStatements.statement_for(&table, "message_id", "consumer_id");

        assert_eq!(
            statement.sql,
            "SELECT message_id, consumer_id, received_at, lock_token, receive_count \
             FROM inbox WHERE message_id = $1 AND consumer_id = $2 FOR UPDATE"
        );
    }

    #[test]
    fn sqlserver_statement_bounds_the_wait() {
        let table = TableDescriptor::new("inbox").with_schema("dbo");
        let provider = SqlServerLockStatements::new().with_lock_wait_ms(5_000);
        let statement = provider.statement_for(&table, "message_id", "consumer_id");

        assert!(statement.sql.starts_with("SET LOCK_TIMEOUT 5000; "));
        assert!(statement.sql.contains("FROM dbo.inbox WITH (UPDLOCK, ROWLOCK)"));
        assert!(statement.sql.ends_with("WHERE message_id = @p1 AND consumer_id = @p2"));
    }

    #[test]
    fn mysql_statement_uses_positional_placeholders() {
        let table = TableDescriptor::new("inbox");
        let statement = MySqlLockStatements.statement_for(&table, "message_id", "consumer_id");

        assert!(statement.sql.contains("WHERE message_id = ? AND consumer_id = ?"));
        assert!(statement.sql.ends_with("FOR UPDATE"));
    }

    #[test]
    fn selection_builds_the_named_provider() {
        assert_eq!(ProviderSelection::Postgres.provider().name(), "postgres");
        assert_eq!(ProviderSelection::SqlServer.provider().name(), "sqlserver");
        assert_eq!(ProviderSelection::MySql.provider().name(), "mysql");
    }

    #[test]
    fn selection_binds_from_configuration_values() {
        let selection: ProviderSelection = serde_json::from_str("\"sqlserver\"").unwrap();
        assert_eq!(selection, ProviderSelection::SqlServer);
        assert_eq!(ProviderSelection::default(), ProviderSelection::Postgres);
    }

    #[test]
    fn boxed_provider_forwards() {
        let table = TableDescriptor::new("inbox");
        let boxed = ProviderSelection::MySql.provider();
        assert_eq!(
            boxed.statement_for(&table, "message_id", "consumer_id"),
            MySqlLockStatements.statement_for(&table, "message_id", "consumer_id")
        );
    }

    #[test]
    fn generation_is_idempotent() {
        let table = TableDescriptor::new("inbox");
        let first = PostgresLockStatements.statement_for(&table, "message_id", "consumer_id");
        let second = PostgresLockStatements.statement_for(&table, "message_id", "consumer_id");
        assert_eq!(first, second);
    }
}
