use crate::{PostgresConnection, PostgresSqlWriter};
use strata_core::{DbError, Driver};

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDriver;

impl Driver for PostgresDriver {
    type Connection = PostgresConnection;
    type SqlWriter = PostgresSqlWriter;

    const NAME: &'static str = "postgres";

    fn sql_writer(&self) -> Self::SqlWriter {
        PostgresSqlWriter {}
    }

    // SQLSTATE class 23: integrity constraint violations.
    fn is_duplicate_key_error(&self, error: &DbError) -> bool {
        error.code_is("23505")
    }

    fn is_foreign_key_error(&self, error: &DbError) -> bool {
        error.code_is("23503")
    }
}
