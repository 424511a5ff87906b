use std::fmt;

/// Schema-qualified table name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: String::new(),
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

impl From<&str> for TableRef {
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((schema, name)) => TableRef::with_schema(schema, name),
            None => TableRef::new(value),
        }
    }
}

impl From<String> for TableRef {
    fn from(value: String) -> Self {
        value.as_str().into()
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
