use crate::TableRef;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// Pairs the primary entity with a secondary table through an equality
/// field mapping, pulling the named secondary fields into the result
/// (keyed `table.field`). Joins render in declaration order.
#[derive(Clone, Debug)]
pub struct Join {
    pub kind: JoinKind,
    pub right: TableRef,
    /// `(left_field, right_field)` equality pairs forming the ON clause.
    pub on: Vec<(String, String)>,
    pub pulled_fields: Vec<String>,
}

impl Join {
    pub fn inner(right: impl Into<TableRef>) -> Self {
        Self {
            kind: JoinKind::Inner,
            right: right.into(),
            on: Vec::new(),
            pulled_fields: Vec::new(),
        }
    }

    pub fn left(right: impl Into<TableRef>) -> Self {
        Self {
            kind: JoinKind::Left,
            ..Self::inner(right)
        }
    }

    pub fn on(mut self, left_field: &str, right_field: &str) -> Self {
        self.on.push((left_field.to_owned(), right_field.to_owned()));
        self
    }

    pub fn pull(mut self, field: &str) -> Self {
        self.pulled_fields.push(field.to_owned());
        self
    }
}
