use std::fmt::Write;
use strata_core::{FieldKind, GenericSqlWriter, SqlWriter};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MssqlSqlWriter;

impl SqlWriter for MssqlSqlWriter {
    fn rowversion_field(&self) -> Option<&'static str> {
        Some("rowversion")
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('[');
        self.write_escaped(out, value, ']', "]]");
        out.push(']');
    }

    fn write_value_bool(&self, out: &mut String, value: bool) {
        out.push(['0', '1'][value as usize]);
    }

    fn write_value_string(&self, out: &mut String, value: &str) {
        out.push_str("N'");
        self.write_escaped(out, value, '\'', "''");
        out.push('\'');
    }

    fn write_value_blob(&self, out: &mut String, value: &[u8]) {
        out.push_str("0x");
        for b in value {
            let _ = write!(out, "{:02X}", b);
        }
    }

    /// Rowversion markers captured from the server are `0x...` varbinary
    /// literals and compare unquoted.
    fn write_value_rowversion(&self, out: &mut String, value: &str) {
        if value.starts_with("0x") || value.starts_with("0X") {
            out.push_str(value);
        } else {
            self.write_value_string(out, value);
        }
    }

    fn write_begin(&self, out: &mut String) {
        out.push_str("BEGIN TRANSACTION");
    }

    fn write_savepoint(&self, out: &mut String, name: &str) {
        out.push_str("SAVE TRANSACTION ");
        self.write_identifier_quoted(out, name);
    }

    // SQL Server has no savepoint release; the connection skips the empty
    // statement.
    fn write_release_savepoint(&self, _out: &mut String, _name: &str) {}

    fn write_rollback_to(&self, out: &mut String, name: &str) {
        out.push_str("ROLLBACK TRANSACTION ");
        self.write_identifier_quoted(out, name);
    }

    fn write_last_insert_id(&self, out: &mut String) {
        out.push_str("SELECT @@IDENTITY");
    }

    fn write_pagination(&self, out: &mut String, limit: u64, offset: u64) {
        out.push_str("OFFSET ");
        write_integer!(out, offset);
        out.push_str(" ROWS FETCH NEXT ");
        write_integer!(out, limit);
        out.push_str(" ROWS ONLY");
    }

    fn normalize_type(&self, native: &str) -> FieldKind {
        // the catalog still reports rowversion columns as `timestamp`
        if native.eq_ignore_ascii_case("timestamp") || native.eq_ignore_ascii_case("rowversion") {
            FieldKind::Rowversion
        } else {
            GenericSqlWriter {}.normalize_type(native)
        }
    }
}
