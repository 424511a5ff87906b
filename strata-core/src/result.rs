use crate::{FieldKind, Value};
use std::sync::Arc;

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Clone, Debug)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Metadata about modify operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowsAffected {
    pub rows_affected: u64,
    /// Backend-specific last inserted id when the engine volunteers one.
    pub last_affected_id: Option<i64>,
}

/// Normalized per-column metadata: dialect type names are reduced to the
/// portable [`FieldKind`] set.
#[derive(Clone, Debug, Default)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: FieldKind,
    pub length: Option<u32>,
}

/// Buffered outcome of one statement: zero or more rows plus the affected
/// count. Buffering keeps `num_rows` consistent regardless of the native
/// cursor mode.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    labels: RowNames,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
    affected: RowsAffected,
}

impl ResultSet {
    pub fn from_rows(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let labels: RowNames = columns.iter().map(|c| c.name.clone()).collect();
        Self {
            labels,
            columns,
            rows,
            affected: RowsAffected::default(),
        }
    }

    pub fn from_affected(rows_affected: u64, last_affected_id: Option<i64>) -> Self {
        Self {
            affected: RowsAffected {
                rows_affected,
                last_affected_id,
            },
            ..Default::default()
        }
    }

    pub fn num_rows(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    pub fn list_fields(&self) -> &[String] {
        &self.labels
    }

    pub fn field_data(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected.rows_affected
    }

    pub fn last_affected_id(&self) -> Option<i64> {
        self.affected.last_affected_id
    }

    pub fn row(&self, index: usize) -> Option<RowLabeled> {
        self.rows.get(index).map(|values| RowLabeled {
            labels: self.labels.clone(),
            values: values.clone(),
        })
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let column = self.labels.iter().position(|v| v == name)?;
        self.rows.get(row)?.get(column)
    }

    /// First column of the first row, for single-value statements.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first()?.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowLabeled> + '_ {
        self.rows.iter().map(|values| RowLabeled {
            labels: self.labels.clone(),
            values: values.clone(),
        })
    }

    pub fn into_rows(self) -> Vec<RowLabeled> {
        let labels = self.labels;
        self.rows
            .into_iter()
            .map(|values| RowLabeled {
                labels: labels.clone(),
                values,
            })
            .collect()
    }

    /// Releases the row buffer. Idempotent; metadata stays readable.
    pub fn free(&mut self) {
        self.rows.clear();
        self.rows.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet::from_rows(
            vec![
                ColumnInfo {
                    name: "numero".into(),
                    kind: FieldKind::Numeric,
                    length: None,
                },
                ColumnInfo {
                    name: "descripcion".into(),
                    kind: FieldKind::Text,
                    length: Some(50),
                },
            ],
            vec![
                vec![Value::Int32(Some(100)), Value::Varchar(Some("A".into()))].into(),
                vec![Value::Int32(Some(101)), Value::Varchar(Some("B".into()))].into(),
            ],
        )
    }

    #[test]
    fn counts_and_metadata() {
        let rs = sample();
        assert_eq!(rs.num_rows(), 2);
        assert_eq!(rs.num_fields(), 2);
        assert_eq!(rs.list_fields(), &["numero", "descripcion"]);
        assert_eq!(rs.field_data()[1].length, Some(50));
        assert_eq!(
            rs.value(1, "descripcion"),
            Some(&Value::Varchar(Some("B".into())))
        );
        assert_eq!(rs.scalar(), Some(&Value::Int32(Some(100))));
    }

    #[test]
    fn empty_sets_keep_their_columns() {
        let mut rs = sample();
        rs.rows.clear();
        assert_eq!(rs.num_rows(), 0);
        assert_eq!(rs.list_fields(), &["numero", "descripcion"]);
        assert_eq!(rs.field_data()[0].kind, FieldKind::Numeric);
    }

    #[test]
    fn free_is_idempotent() {
        let mut rs = sample();
        rs.free();
        assert_eq!(rs.num_rows(), 0);
        rs.free();
        assert_eq!(rs.num_fields(), 2);
    }

    #[test]
    fn rows_carry_labels() {
        let rows = sample().into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get_column("numero"),
            Some(&Value::Int32(Some(100)))
        );
        let pairs: Vec<_> = rows[1].pairs().map(|(n, _)| n.to_owned()).collect();
        assert_eq!(pairs, vec!["numero", "descripcion"]);
    }
}
