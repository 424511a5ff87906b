use crate::{Join, Value};

/// Comparison family of a where entry. The LIKE variants combine with a
/// [`MatchAnchor`] to place wildcards; `ILike`/`NotILike` degrade to
/// `lower(x) LIKE lower(y)` on dialects without native case-insensitive
/// matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    Greater,
    Less,
    Like,
    ILike,
    NotLike,
    NotILike,
}

impl CompareOp {
    pub fn is_like(&self) -> bool {
        matches!(
            self,
            CompareOp::Like | CompareOp::ILike | CompareOp::NotLike | CompareOp::NotILike
        )
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, CompareOp::NotLike | CompareOp::NotILike)
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(self, CompareOp::ILike | CompareOp::NotILike)
    }
}

/// Wildcard placement for the LIKE family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchAnchor {
    /// `%value%`
    #[default]
    Contains,
    /// `value%`
    Prefix,
    /// `%value`
    Suffix,
    /// `value`
    Exact,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// One predicate of the WHERE clause. The comparison value comes from the
/// explicit literal when present, from the entity's current field value
/// otherwise.
#[derive(Clone, Debug)]
pub struct WhereField {
    pub field: String,
    pub op: CompareOp,
    pub anchor: MatchAnchor,
    pub literal: Option<Value>,
}

impl WhereField {
    pub fn new(field: &str, op: CompareOp) -> Self {
        Self {
            field: field.to_owned(),
            op,
            anchor: if op.is_like() {
                MatchAnchor::Contains
            } else {
                MatchAnchor::Exact
            },
            literal: None,
        }
    }

    pub fn equal(field: &str) -> Self {
        Self::new(field, CompareOp::Equal)
    }
}

/// Caller-supplied filtering, ordering, column selection, pagination and
/// joins for a query. Empty select list means every entity field; a
/// `(0, 0)` row window means no pagination.
#[derive(Clone, Debug, Default)]
pub struct Constraint {
    pub where_fields: Vec<WhereField>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub select_fields: Vec<String>,
    pub joins: Vec<Join>,
    /// First row of the window, 1-based, inclusive.
    pub start_row: u64,
    /// Last row of the window, inclusive. Zero disables pagination.
    pub end_row: u64,
}

impl Constraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a field, comparing against the entity's current value.
    pub fn filter(mut self, field: &str, op: CompareOp) -> Self {
        self.where_fields.push(WhereField::new(field, op));
        self
    }

    pub fn filter_anchored(mut self, field: &str, op: CompareOp, anchor: MatchAnchor) -> Self {
        let mut entry = WhereField::new(field, op);
        entry.anchor = anchor;
        self.where_fields.push(entry);
        self
    }

    /// Filter on a field against an explicit literal.
    pub fn filter_literal(mut self, field: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        let mut entry = WhereField::new(field, op);
        entry.literal = Some(value.into());
        self.where_fields.push(entry);
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by.push((field.to_owned(), OrderDirection::Asc));
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by.push((field.to_owned(), OrderDirection::Desc));
        self
    }

    pub fn select(mut self, field: &str) -> Self {
        self.select_fields.push(field.to_owned());
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Restricts the result to the 1-based inclusive row window
    /// `start..=end`.
    pub fn rows(mut self, start: u64, end: u64) -> Self {
        self.start_row = start;
        self.end_row = end;
        self
    }

    pub fn has_pagination(&self) -> bool {
        self.end_row > 0
    }

    /// Number of rows in the window and the number of rows to skip.
    pub fn window(&self) -> (u64, u64) {
        let offset = self.start_row.saturating_sub(1);
        let limit = self.end_row.saturating_sub(offset);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_filters_default_to_contains() {
        let c = Constraint::new()
            .filter("descripcion", CompareOp::ILike)
            .filter("numero", CompareOp::Equal);
        assert_eq!(c.where_fields[0].anchor, MatchAnchor::Contains);
        assert_eq!(c.where_fields[1].anchor, MatchAnchor::Exact);
    }

    #[test]
    fn window_is_one_based_inclusive() {
        assert_eq!(Constraint::new().rows(1, 10).window(), (10, 0));
        assert_eq!(Constraint::new().rows(11, 20).window(), (10, 10));
        assert!(!Constraint::new().has_pagination());
        assert!(Constraint::new().rows(1, 1).has_pagination());
    }
}
