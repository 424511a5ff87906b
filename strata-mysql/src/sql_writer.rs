use strata_core::SqlWriter;

#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlSqlWriter;

impl SqlWriter for MySqlSqlWriter {
    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('`');
        self.write_escaped(out, value, '`', "``");
        out.push('`');
    }

    fn write_value_bool(&self, out: &mut String, value: bool) {
        out.push(['0', '1'][value as usize]);
    }

    // Backslash is an escape character in MySQL string literals.
    fn write_value_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        for c in value.chars() {
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                c => out.push(c),
            }
        }
        out.push('\'');
    }

    fn write_begin(&self, out: &mut String) {
        out.push_str("START TRANSACTION");
    }

    fn write_last_insert_id(&self, out: &mut String) {
        out.push_str("SELECT LAST_INSERT_ID()");
    }
}
