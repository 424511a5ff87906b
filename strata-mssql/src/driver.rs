use crate::{MssqlConnection, MssqlSqlWriter};
use strata_core::{DbError, Driver};

#[derive(Clone, Copy, Debug, Default)]
pub struct MssqlDriver;

impl Driver for MssqlDriver {
    type Connection = MssqlConnection;
    type SqlWriter = MssqlSqlWriter;

    const NAME: &'static str = "mssql";

    fn sql_writer(&self) -> Self::SqlWriter {
        MssqlSqlWriter {}
    }

    // 2627: violation of a PRIMARY KEY/UNIQUE constraint, 2601: duplicate
    // key on a unique index
    fn is_duplicate_key_error(&self, error: &DbError) -> bool {
        error.code_is("2627") || error.code_is("2601")
    }

    // 547: constraint conflict, raised for FK violations on either side
    fn is_foreign_key_error(&self, error: &DbError) -> bool {
        error.code_is("547")
    }
}
