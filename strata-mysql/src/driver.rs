use crate::{MySqlConnection, MySqlSqlWriter};
use strata_core::{DbError, Driver};

#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlDriver;

impl Driver for MySqlDriver {
    type Connection = MySqlConnection;
    type SqlWriter = MySqlSqlWriter;

    const NAME: &'static str = "mysql";

    fn sql_writer(&self) -> Self::SqlWriter {
        MySqlSqlWriter {}
    }

    // ER_DUP_ENTRY
    fn is_duplicate_key_error(&self, error: &DbError) -> bool {
        error.code_is("1062")
    }

    // ER_NO_REFERENCED_ROW / ER_ROW_IS_REFERENCED, old and new numbers
    fn is_foreign_key_error(&self, error: &DbError) -> bool {
        ["1216", "1217", "1451", "1452"]
            .iter()
            .any(|code| error.code_is(code))
    }
}
