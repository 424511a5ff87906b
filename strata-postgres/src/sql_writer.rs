use std::fmt::Write;
use strata_core::{SqlWriter, TableRef};

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresSqlWriter;

impl SqlWriter for PostgresSqlWriter {
    fn supports_ilike(&self) -> bool {
        true
    }

    fn rowversion_field(&self) -> Option<&'static str> {
        Some("xmin")
    }

    /// `xmin` is a transaction id and comes back through the wire as a type
    /// the client cannot decode; selecting it cast to text keeps the label
    /// while producing a readable value.
    fn write_select_column(&self, out: &mut String, table: Option<&TableRef>, name: &str) {
        self.write_column(out, table, name);
        if name == "xmin" {
            out.push_str("::text");
        }
    }

    fn write_value_blob(&self, out: &mut String, value: &[u8]) {
        out.push_str("'\\x");
        for b in value {
            let _ = write!(out, "{:02X}", b);
        }
        out.push('\'');
    }

    fn write_last_insert_id(&self, out: &mut String) {
        out.push_str("SELECT lastval()");
    }

    fn write_primary_key_query(&self, out: &mut String, table: &TableRef) {
        out.push_str(
            "SELECT a.attname FROM pg_catalog.pg_index i \
             JOIN pg_catalog.pg_class c ON c.oid = i.indrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey) \
             WHERE i.indisprimary AND c.relname = ",
        );
        self.write_value_string(out, &table.name);
        out.push_str(" AND n.nspname = ");
        if table.schema.is_empty() {
            out.push_str("current_schema()");
        } else {
            self.write_value_string(out, &table.schema);
        }
        out.push_str(" ORDER BY a.attnum");
    }
}
