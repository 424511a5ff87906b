use crate::{
    BuildError, Constraint, Entity, FieldKind, Join, JoinKind, MatchAnchor, OrderDirection,
    Result, TableRef, Value, WhereField, separated_by,
};
use anyhow::bail;
use std::fmt::Write;
use time::{Date, Time};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}
macro_rules! write_float {
    ($out:ident, $value:expr) => {{
        let mut buffer = ryu::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// A where/order/select field resolved against the primary entity and the
/// joined entities.
struct ResolvedField {
    table: Option<TableRef>,
    column: String,
    /// `None` when the field belongs to a join target without a descriptor;
    /// such a field can only be compared against an explicit literal.
    value: Option<Value>,
}

fn resolve_field(
    entity: &Entity,
    refs: &[&Entity],
    joins: &[Join],
    name: &str,
    qualify: bool,
) -> Result<ResolvedField> {
    if let Some((table, column)) = name.split_once('.') {
        let unknown = || BuildError::UnknownWhereField(name.to_owned());
        if table == entity.table().name {
            let Some(value) = entity.get(column) else {
                bail!(unknown());
            };
            return Ok(ResolvedField {
                table: qualify.then(|| entity.table().clone()),
                column: column.to_owned(),
                value: Some(value.clone()),
            });
        }
        if let Some(reference) = refs.iter().find(|e| e.table().name == table) {
            let Some(value) = reference.get(column) else {
                bail!(unknown());
            };
            return Ok(ResolvedField {
                table: Some(reference.table().clone()),
                column: column.to_owned(),
                value: Some(value.clone()),
            });
        }
        // A join target without a descriptor: existence cannot be checked,
        // the comparison value must come from an explicit literal.
        if joins.iter().any(|j| j.right.name == table) {
            return Ok(ResolvedField {
                table: Some(TableRef::new(table)),
                column: column.to_owned(),
                value: None,
            });
        }
        bail!(unknown());
    }
    let Some(value) = entity.get(name) else {
        bail!(BuildError::UnknownWhereField(name.to_owned()));
    };
    Ok(ResolvedField {
        table: qualify.then(|| entity.table().clone()),
        column: name.to_owned(),
        value: Some(value.clone()),
    })
}

/// Renders dialect-correct SQL. The defaults are ANSI; each driver's writer
/// overrides only the fragments its engine disagrees on (quoting, literals,
/// pagination, transaction verbs, metadata queries).
pub trait SqlWriter {
    // ---- dialect facts ----

    /// Whether the engine has a native case-insensitive LIKE.
    fn supports_ilike(&self) -> bool {
        false
    }

    /// Name of the engine-maintained rowversion field, when one exists.
    fn rowversion_field(&self) -> Option<&'static str> {
        None
    }

    // ---- identifiers and literals ----

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    fn write_table_ref(&self, out: &mut String, value: &TableRef) {
        if !value.schema.is_empty() {
            self.write_identifier_quoted(out, &value.schema);
            out.push('.');
        }
        self.write_identifier_quoted(out, &value.name);
    }

    fn write_column(&self, out: &mut String, table: Option<&TableRef>, name: &str) {
        if let Some(table) = table {
            self.write_identifier_quoted(out, &table.name);
            out.push('.');
        }
        self.write_identifier_quoted(out, name);
    }

    /// Select-list rendering of one entity field. Dialects override this for
    /// columns that need a cast to come back in a readable form.
    fn write_select_column(&self, out: &mut String, table: Option<&TableRef>, name: &str) {
        self.write_column(out, table, name);
    }

    fn write_value(&self, out: &mut String, value: &Value) {
        if value.is_null() {
            out.push_str("NULL");
            return;
        }
        let _ = match value {
            Value::Boolean(Some(v)) => self.write_value_bool(out, *v),
            Value::Int8(Some(v)) => write_integer!(out, *v),
            Value::Int16(Some(v)) => write_integer!(out, *v),
            Value::Int32(Some(v)) => write_integer!(out, *v),
            Value::Int64(Some(v)) => write_integer!(out, *v),
            Value::Float32(Some(v)) => write_float!(out, *v),
            Value::Float64(Some(v)) => write_float!(out, *v),
            Value::Decimal(Some(v)) => drop(write!(out, "{}", v)),
            Value::Varchar(Some(v)) => self.write_value_string(out, v),
            Value::Blob(Some(v)) => self.write_value_blob(out, v),
            Value::Date(Some(v)) => {
                out.push('\'');
                self.write_value_date(out, v);
                out.push('\'');
            }
            Value::Time(Some(v)) => {
                out.push('\'');
                self.write_value_time(out, v);
                out.push('\'');
            }
            Value::Timestamp(Some(v)) => {
                out.push('\'');
                self.write_value_date(out, &v.date());
                out.push('T');
                self.write_value_time(out, &v.time());
                out.push('\'');
            }
            Value::Uuid(Some(v)) => drop(write!(out, "'{}'", v)),
            Value::Rowversion(Some(v)) => self.write_value_rowversion(out, v),
            _ => unreachable!("null variants are handled above"),
        };
    }

    fn write_value_bool(&self, out: &mut String, value: bool) {
        out.push_str(["FALSE", "TRUE"][value as usize]);
    }

    fn write_value_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        self.write_escaped(out, value, '\'', "''");
        out.push('\'');
    }

    fn write_value_blob(&self, out: &mut String, value: &[u8]) {
        out.push_str("X'");
        for b in value {
            let _ = write!(out, "{:02X}", b);
        }
        out.push('\'');
    }

    fn write_value_date(&self, out: &mut String, value: &Date) {
        let _ = write!(
            out,
            "{:04}-{:02}-{:02}",
            value.year(),
            value.month() as u8,
            value.day()
        );
    }

    fn write_value_time(&self, out: &mut String, value: &Time) {
        let _ = write!(
            out,
            "{:02}:{:02}:{:02}",
            value.hour(),
            value.minute(),
            value.second()
        );
        if value.nanosecond() != 0 {
            let _ = write!(out, ".{:06}", value.nanosecond() / 1_000);
        }
    }

    /// Rowversion markers are kept as opaque text; most engines compare them
    /// as a quoted literal.
    fn write_value_rowversion(&self, out: &mut String, value: &str) {
        self.write_value_string(out, value);
    }

    // ---- transaction verbs ----

    fn write_begin(&self, out: &mut String) {
        out.push_str("BEGIN");
    }

    fn write_commit(&self, out: &mut String) {
        out.push_str("COMMIT");
    }

    fn write_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK");
    }

    fn write_savepoint(&self, out: &mut String, name: &str) {
        out.push_str("SAVEPOINT ");
        self.write_identifier_quoted(out, name);
    }

    /// Engines without savepoint release leave the buffer empty and the
    /// connection skips the statement.
    fn write_release_savepoint(&self, out: &mut String, name: &str) {
        out.push_str("RELEASE SAVEPOINT ");
        self.write_identifier_quoted(out, name);
    }

    fn write_rollback_to(&self, out: &mut String, name: &str) {
        out.push_str("ROLLBACK TO SAVEPOINT ");
        self.write_identifier_quoted(out, name);
    }

    /// Query returning the last id the engine generated on this connection.
    /// Empty means the dialect has no such facility.
    fn write_last_insert_id(&self, out: &mut String) {
        let _ = out;
    }

    fn write_pagination(&self, out: &mut String, limit: u64, offset: u64) {
        out.push_str("LIMIT ");
        write_integer!(out, limit);
        if offset > 0 {
            out.push_str(" OFFSET ");
            write_integer!(out, offset);
        }
    }

    // ---- metadata introspection ----

    fn write_primary_key_query(&self, out: &mut String, table: &TableRef) {
        out.push_str(
            "SELECT kcu.column_name FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
             ON kcu.constraint_name = tc.constraint_name AND kcu.table_name = tc.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = ",
        );
        self.write_value_string(out, &table.name);
        if !table.schema.is_empty() {
            out.push_str(" AND tc.table_schema = ");
            self.write_value_string(out, &table.schema);
        }
        out.push_str(" ORDER BY kcu.ordinal_position");
    }

    fn write_column_data_query(&self, out: &mut String, table: &TableRef) {
        out.push_str(
            "SELECT column_name, data_type, character_maximum_length \
             FROM information_schema.columns WHERE table_name = ",
        );
        self.write_value_string(out, &table.name);
        if !table.schema.is_empty() {
            out.push_str(" AND table_schema = ");
            self.write_value_string(out, &table.schema);
        }
        out.push_str(" ORDER BY ordinal_position");
    }

    /// Reduces a native type name to the portable [`FieldKind`] set.
    fn normalize_type(&self, native: &str) -> FieldKind {
        let t = native.to_ascii_lowercase();
        if t.contains("bool") || t == "bit" {
            FieldKind::Boolean
        } else if t == "xid" || t == "rowversion" {
            FieldKind::Rowversion
        } else if !t.contains("interval")
            && ["int", "decimal", "numeric", "float", "double", "real", "money", "serial"]
                .iter()
                .any(|m| t.contains(m))
        {
            FieldKind::Numeric
        } else {
            FieldKind::Text
        }
    }

    // ---- clause builders ----

    fn write_where_field(
        &self,
        out: &mut String,
        entry: &WhereField,
        table: Option<&TableRef>,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        use crate::CompareOp::*;
        if entry.op.is_like() {
            let text = value.as_text().unwrap_or_default();
            let pattern = match entry.anchor {
                MatchAnchor::Contains => format!("%{}%", text),
                MatchAnchor::Prefix => format!("{}%", text),
                MatchAnchor::Suffix => format!("%{}", text),
                MatchAnchor::Exact => text,
            };
            let negated = entry.op.is_negated();
            if entry.op.is_case_insensitive() && !self.supports_ilike() {
                out.push_str("lower(");
                self.write_column(out, table, column);
                out.push(')');
                out.push_str(if negated { " NOT LIKE lower(" } else { " LIKE lower(" });
                self.write_value_string(out, &pattern);
                out.push(')');
            } else {
                self.write_column(out, table, column);
                out.push_str(match (entry.op.is_case_insensitive(), negated) {
                    (true, false) => " ILIKE ",
                    (true, true) => " NOT ILIKE ",
                    (false, false) => " LIKE ",
                    (false, true) => " NOT LIKE ",
                });
                self.write_value_string(out, &pattern);
            }
            return Ok(());
        }
        self.write_column(out, table, column);
        match entry.op {
            Equal if value.is_null() => {
                out.push_str(" IS NULL");
                return Ok(());
            }
            Equal => out.push_str(" = "),
            Greater => out.push_str(" > "),
            Less => out.push_str(" < "),
            _ => unreachable!("like operators are handled above"),
        }
        self.write_value(out, value);
        Ok(())
    }

    /// Renders the AND-joined predicates of a constraint. Returns whether
    /// anything was written; the `WHERE` keyword is the caller's business.
    fn write_where_clause(
        &self,
        out: &mut String,
        entity: &Entity,
        refs: &[&Entity],
        constraint: &Constraint,
        qualify: bool,
    ) -> Result<bool> {
        let mut wrote = false;
        for entry in &constraint.where_fields {
            let resolved =
                resolve_field(entity, refs, &constraint.joins, &entry.field, qualify)?;
            let Some(value) = entry.literal.clone().or(resolved.value) else {
                bail!(BuildError::UnknownWhereField(entry.field.clone()));
            };
            if wrote {
                out.push_str(" AND ");
            }
            self.write_where_field(out, entry, resolved.table.as_ref(), &resolved.column, &value)?;
            wrote = true;
        }
        Ok(wrote)
    }

    /// Key equality predicate, optionally extended with the rowversion
    /// comparison that implements optimistic concurrency. The rowversion
    /// term is emitted only when the entity declares the dialect's
    /// rowversion field and holds a value for it.
    fn write_key_predicate(
        &self,
        out: &mut String,
        entity: &Entity,
        include_rowversion: bool,
    ) -> Result<()> {
        let keys = entity.effective_key()?;
        separated_by(
            out,
            keys,
            |out, key| {
                self.write_identifier_quoted(out, key);
                match entity.get(key) {
                    Some(v) if !v.is_null() => {
                        out.push_str(" = ");
                        self.write_value(out, v);
                    }
                    _ => out.push_str(" IS NULL"),
                }
            },
            " AND ",
        );
        if include_rowversion
            && let Some(rowversion) = self.rowversion_field()
            && let Some(value) = entity.get(rowversion)
            && !value.is_null()
        {
            out.push_str(" AND ");
            self.write_identifier_quoted(out, rowversion);
            out.push_str(" = ");
            self.write_value(out, value);
        }
        Ok(())
    }

    fn write_join_clause(&self, out: &mut String, entity: &Entity, joins: &[Join]) {
        for join in joins {
            out.push_str(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            self.write_table_ref(out, &join.right);
            out.push_str(" ON ");
            separated_by(
                out,
                &join.on,
                |out, (left, right)| {
                    self.write_column(out, Some(&join.right), right);
                    out.push_str(" = ");
                    self.write_column(out, Some(entity.table()), left);
                },
                " AND ",
            );
        }
    }

    /// Order-by defaulting: explicit constraint order wins, else the key
    /// fields, else the id field. A multi-row read without a deterministic
    /// order is a latent bug, so one is emitted whenever the entity can
    /// provide it. Returns whether an order was written.
    fn write_order_by(
        &self,
        out: &mut String,
        entity: &Entity,
        refs: &[&Entity],
        constraint: Option<&Constraint>,
        qualify: bool,
    ) -> Result<bool> {
        if let Some(c) = constraint
            && !c.order_by.is_empty()
        {
            out.push_str(" ORDER BY ");
            for (i, (field, direction)) in c.order_by.iter().enumerate() {
                let resolved = resolve_field(entity, refs, &c.joins, field, qualify)?;
                if i > 0 {
                    out.push_str(", ");
                }
                self.write_column(out, resolved.table.as_ref(), &resolved.column);
                if *direction == OrderDirection::Desc {
                    out.push_str(" DESC");
                }
            }
            return Ok(true);
        }
        if let Ok(keys) = entity.effective_key() {
            out.push_str(" ORDER BY ");
            let table = qualify.then(|| entity.table().clone());
            separated_by(
                out,
                keys,
                |out, key| self.write_column(out, table.as_ref(), key),
                ", ",
            );
            return Ok(true);
        }
        Ok(false)
    }

    fn write_select(
        &self,
        out: &mut String,
        entity: &Entity,
        refs: &[&Entity],
        constraint: Option<&Constraint>,
    ) -> Result<()> {
        let joins: &[Join] = constraint.map(|c| c.joins.as_slice()).unwrap_or(&[]);
        let qualify = !joins.is_empty();
        let table = qualify.then(|| entity.table().clone());
        out.push_str("SELECT ");
        match constraint.filter(|c| !c.select_fields.is_empty()) {
            Some(c) => {
                for (i, field) in c.select_fields.iter().enumerate() {
                    let resolved = resolve_field(entity, refs, joins, field, qualify)
                        .map_err(|_| BuildError::UnknownField(field.clone()))?;
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_select_column(out, resolved.table.as_ref(), &resolved.column);
                }
            }
            None => {
                separated_by(
                    out,
                    entity.field_names(),
                    |out, name| self.write_select_column(out, table.as_ref(), name),
                    ", ",
                );
            }
        }
        for join in joins {
            for field in &join.pulled_fields {
                if let Some(reference) = refs.iter().find(|e| e.table().name == join.right.name)
                    && !reference.contains(field)
                {
                    bail!(BuildError::UnknownField(format!(
                        "{}.{}",
                        join.right.name, field
                    )));
                }
                out.push_str(", ");
                self.write_column(out, Some(&join.right), field);
                out.push_str(" AS ");
                self.write_identifier_quoted(out, &format!("{}.{}", join.right.name, field));
            }
        }
        out.push_str(" FROM ");
        self.write_table_ref(out, entity.table());
        self.write_join_clause(out, entity, joins);
        let mut predicate = String::new();
        if let Some(c) = constraint {
            self.write_where_clause(&mut predicate, entity, refs, c, qualify)?;
        }
        if !predicate.is_empty() {
            out.push_str(" WHERE ");
            out.push_str(&predicate);
        }
        let ordered = self.write_order_by(out, entity, refs, constraint, qualify)?;
        if let Some(c) = constraint
            && c.has_pagination()
        {
            // A row window over an unordered set reads back arbitrary rows,
            // and OFFSET/FETCH dialects reject it outright.
            if !ordered {
                bail!(BuildError::MissingKey(entity.table().full_name()));
            }
            let (limit, offset) = c.window();
            out.push(' ');
            self.write_pagination(out, limit, offset);
        }
        Ok(())
    }

    fn write_insert(&self, out: &mut String, entity: &Entity) -> Result<()> {
        let rowversion = self.rowversion_field();
        let columns: Vec<(&str, &Value)> = entity
            .fields()
            .filter(|(name, _)| Some(*name) != entity.id_field() && Some(*name) != rowversion)
            .collect();
        if columns.is_empty() {
            bail!(BuildError::NoFields(entity.table().full_name()));
        }
        out.push_str("INSERT INTO ");
        self.write_table_ref(out, entity.table());
        out.push_str(" (");
        separated_by(
            out,
            columns.iter(),
            |out, (name, _)| self.write_identifier_quoted(out, name),
            ", ",
        );
        out.push_str(") VALUES (");
        separated_by(
            out,
            columns.iter(),
            |out, (_, value)| self.write_value(out, value),
            ", ",
        );
        out.push(')');
        Ok(())
    }

    fn write_update(&self, out: &mut String, entity: &Entity) -> Result<()> {
        let rowversion = self.rowversion_field();
        let keys = entity.effective_key()?;
        let assignments: Vec<(&str, &Value)> = entity
            .fields()
            .filter(|(name, _)| {
                !keys.contains(name)
                    && Some(*name) != entity.id_field()
                    && Some(*name) != rowversion
            })
            .collect();
        if assignments.is_empty() {
            bail!(BuildError::NoFields(entity.table().full_name()));
        }
        out.push_str("UPDATE ");
        self.write_table_ref(out, entity.table());
        out.push_str(" SET ");
        separated_by(
            out,
            assignments.iter(),
            |out, (name, value)| {
                self.write_identifier_quoted(out, name);
                out.push_str(" = ");
                self.write_value(out, value);
            },
            ", ",
        );
        out.push_str(" WHERE ");
        self.write_key_predicate(out, entity, true)
    }

    fn write_delete(&self, out: &mut String, entity: &Entity) -> Result<()> {
        out.push_str("DELETE FROM ");
        self.write_table_ref(out, entity.table());
        out.push_str(" WHERE ");
        self.write_key_predicate(out, entity, true)
    }

    /// Bulk delete scoped by a constraint. An empty rendered WHERE clause is
    /// always refused; an unconditional delete never reaches the engine.
    fn write_delete_where(
        &self,
        out: &mut String,
        entity: &Entity,
        constraint: &Constraint,
    ) -> Result<()> {
        let mut predicate = String::new();
        self.write_where_clause(&mut predicate, entity, &[], constraint, false)?;
        if predicate.is_empty() {
            bail!(BuildError::EmptyWhereClause);
        }
        out.push_str("DELETE FROM ");
        self.write_table_ref(out, entity.table());
        out.push_str(" WHERE ");
        out.push_str(&predicate);
        Ok(())
    }
}

/// ANSI writer with no dialect overrides, used by tests and as a baseline.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericSqlWriter;

impl GenericSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for GenericSqlWriter {}
