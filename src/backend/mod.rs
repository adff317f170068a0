pub mod memory;

pub use memory::{BackendStats, MemoryBackend};

use crate::core::{Result, Value};
use crate::sql::{SelectStatement, Statement};

pub type Row = Vec<Value>;

/// Result of one executed statement.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub rows_affected: usize,

    /// Identity value generated by an insert, when the target table has an
    /// auto-increment column and the statement did not supply it.
    pub last_insert_id: Option<i64>,
}

/// One database connection with an explicit transaction scope.
///
/// Backends are scoped: a caller acquires one, runs a save against it, and
/// releases it. They are never shared across concurrent saves.
pub trait Backend {
    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome>;

    fn query(&mut self, select: &SelectStatement) -> Result<Vec<Row>>;

    /// Live metadata probe. The provider's existence cache sits in front
    /// of this.
    fn table_exists(&mut self, table: &str) -> Result<bool>;
}
