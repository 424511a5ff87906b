use crate::{Connection, DbError, SqlWriter};

/// One supported engine family. A driver ties together the connection type,
/// the SQL writer for the engine's dialect, and the predicates that classify
/// the engine's structured errors into the portable outcome codes.
pub trait Driver {
    type Connection: Connection;
    type SqlWriter: SqlWriter + Send;

    /// Scheme expected at the front of connection URLs, e.g. `postgres`.
    const NAME: &'static str;

    fn sql_writer(&self) -> Self::SqlWriter;

    /// Whether the error reports a unique-constraint violation.
    fn is_duplicate_key_error(&self, error: &DbError) -> bool;

    /// Whether the error reports a foreign-key violation, on either side of
    /// the reference.
    fn is_foreign_key_error(&self, error: &DbError) -> bool;
}
