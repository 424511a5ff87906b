use crate::{
    ColumnInfo, ConnectOptions, DbError, Driver, ResultSet, Result, RoutineCall, RoutineResults,
    SqlWriter, TableRef, Value,
};
use anyhow::bail;
use log::debug;
use std::future::Future;

/// Bookkeeping for the savepoint-emulated nested transaction stack.
///
/// `depth` counts the open levels; level 0 is the engine transaction, deeper
/// levels are savepoints. `dirty` is set by the accessor when any operation
/// inside the transaction reports a failure, and decides whether
/// [`Connection::complete`] commits or rolls back.
#[derive(Debug, Default)]
pub struct TransactionState {
    depth: u32,
    dirty: bool,
    savepoints: Vec<String>,
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// A live connection to one engine.
///
/// Drivers implement the required methods; the transaction protocol is
/// provided here once, in terms of the dialect's transaction verbs, so every
/// engine gets identical nesting semantics.
pub trait Connection: Send + Sized {
    type Driver: Driver<Connection = Self>;

    fn driver(&self) -> &Self::Driver;

    /// Opens a connection from a URL carrying the driver's scheme.
    fn connect(url: &str) -> impl Future<Output = Result<Self>> + Send;

    fn close(self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Runs one statement and buffers whatever it returns. Statements are
    /// issued one at a time per connection; the unit of work is the
    /// connection itself.
    fn execute(&mut self, sql: &str) -> impl Future<Output = Result<ResultSet>> + Send;

    fn state(&mut self) -> &mut TransactionState;

    /// Invokes a stored routine. Parameter passing and OUT retrieval are
    /// dialect-specific enough that each driver supplies its own protocol.
    fn call_routine(
        &mut self,
        call: &RoutineCall,
    ) -> impl Future<Output = Result<RoutineResults>> + Send;

    fn connect_with(options: &ConnectOptions) -> impl Future<Output = Result<Self>> + Send {
        async move {
            let url = options.url(Self::Driver::NAME)?;
            Self::connect(&url).await
        }
    }

    /// Opens a transaction level. The first level starts an engine
    /// transaction, deeper levels create savepoints.
    fn begin(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let writer = self.driver().sql_writer();
            let mut sql = String::new();
            let depth = self.state().depth;
            if depth == 0 {
                writer.write_begin(&mut sql);
                self.execute(&sql).await?;
            } else {
                let name = format!("strata_sp_{}", depth);
                writer.write_savepoint(&mut sql, &name);
                self.execute(&sql).await?;
                self.state().savepoints.push(name);
            }
            self.state().depth += 1;
            Ok(())
        }
    }

    /// Closes the innermost level, keeping its work. Dialects without a
    /// savepoint release verb render nothing and the statement is skipped.
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let writer = self.driver().sql_writer();
            let mut sql = String::new();
            match self.state().depth {
                0 => bail!("Commit with no open transaction"),
                1 => {
                    writer.write_commit(&mut sql);
                    self.execute(&sql).await?;
                    self.state().mark_clean();
                }
                _ => {
                    let name = self
                        .state()
                        .savepoints
                        .pop()
                        .unwrap_or_else(|| format!("strata_sp_{}", self.state().depth - 1));
                    writer.write_release_savepoint(&mut sql, &name);
                    if !sql.is_empty() {
                        self.execute(&sql).await?;
                    }
                }
            }
            self.state().depth -= 1;
            Ok(())
        }
    }

    /// Discards the innermost level's work.
    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let writer = self.driver().sql_writer();
            let mut sql = String::new();
            match self.state().depth {
                0 => bail!("Rollback with no open transaction"),
                1 => {
                    writer.write_rollback(&mut sql);
                    self.execute(&sql).await?;
                    self.state().mark_clean();
                }
                _ => {
                    let name = self
                        .state()
                        .savepoints
                        .pop()
                        .unwrap_or_else(|| format!("strata_sp_{}", self.state().depth - 1));
                    writer.write_rollback_to(&mut sql, &name);
                    self.execute(&sql).await?;
                    sql.clear();
                    writer.write_release_savepoint(&mut sql, &name);
                    if !sql.is_empty() {
                        self.execute(&sql).await?;
                    }
                }
            }
            self.state().depth -= 1;
            Ok(())
        }
    }

    /// Marks a caller-named savepoint, independent of the level stack.
    fn savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut sql = String::new();
            self.driver().sql_writer().write_savepoint(&mut sql, name);
            self.execute(&sql).await?;
            Ok(())
        }
    }

    fn release_savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut sql = String::new();
            self.driver()
                .sql_writer()
                .write_release_savepoint(&mut sql, name);
            if !sql.is_empty() {
                self.execute(&sql).await?;
            }
            Ok(())
        }
    }

    fn rollback_to(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut sql = String::new();
            self.driver().sql_writer().write_rollback_to(&mut sql, name);
            self.execute(&sql).await?;
            Ok(())
        }
    }

    /// Unwinds every open level at once: commits when no operation inside
    /// the transaction failed, rolls back otherwise. Returns whether the
    /// work was kept. A no-op outside a transaction.
    fn complete(&mut self) -> impl Future<Output = Result<bool>> + Send {
        async move {
            let dirty = self.state().is_dirty();
            if self.state().depth > 0 {
                let writer = self.driver().sql_writer();
                let mut sql = String::new();
                if dirty {
                    writer.write_rollback(&mut sql);
                } else {
                    writer.write_commit(&mut sql);
                }
                self.execute(&sql).await?;
                self.state().depth = 0;
                self.state().savepoints.clear();
            }
            self.state().mark_clean();
            Ok(!dirty)
        }
    }

    /// Last identity value the engine generated on this connection, when the
    /// dialect exposes one. Engine errors are demoted to `None`; identity
    /// retrieval is best-effort and the caller re-reads the row anyway.
    fn last_insert_id(&mut self) -> impl Future<Output = Result<Option<i64>>> + Send {
        async move {
            let writer = self.driver().sql_writer();
            let mut sql = String::new();
            writer.write_last_insert_id(&mut sql);
            if sql.is_empty() {
                return Ok(None);
            }
            match self.execute(&sql).await {
                // engines report 0 when the statement generated nothing
                Ok(set) => Ok(set.scalar().and_then(Value::as_i64).filter(|id| *id != 0)),
                Err(e) if e.downcast_ref::<DbError>().is_some() => {
                    debug!("Could not retrieve the last inserted id: {:#}", e);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
    }

    /// Column names of the table's primary key, in ordinal order.
    fn primary_key(
        &mut self,
        table: &TableRef,
    ) -> impl Future<Output = Result<Vec<String>>> + Send {
        async move {
            let writer = self.driver().sql_writer();
            let mut sql = String::new();
            writer.write_primary_key_query(&mut sql, table);
            let set = self.execute(&sql).await?;
            Ok(set
                .iter()
                .filter_map(|row| row.values().first().and_then(Value::as_text))
                .collect())
        }
    }

    /// Name, portable kind and declared length of every column of the table.
    fn column_data(
        &mut self,
        table: &TableRef,
    ) -> impl Future<Output = Result<Vec<ColumnInfo>>> + Send {
        async move {
            let writer = self.driver().sql_writer();
            let mut sql = String::new();
            writer.write_column_data_query(&mut sql, table);
            let set = self.execute(&sql).await?;
            Ok(set
                .iter()
                .filter_map(|row| {
                    let values = row.values();
                    let name = values.first().and_then(Value::as_text)?;
                    let native = values.get(1).and_then(Value::as_text).unwrap_or_default();
                    let length = values
                        .get(2)
                        .and_then(Value::as_i64)
                        .and_then(|l| u32::try_from(l).ok());
                    Some(ColumnInfo {
                        name,
                        kind: writer.normalize_type(&native),
                        length,
                    })
                })
                .collect())
        }
    }
}
