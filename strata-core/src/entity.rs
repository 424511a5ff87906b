use crate::{BuildError, Result, RowLabeled, TableRef, Value, conform};
use anyhow::bail;

/// Runtime description of one table row: ordered field values plus the
/// metadata the clause builders need (key fields, id field, read-only
/// fields).
///
/// Field declaration order is the column order used for INSERT. Key fields
/// form the composite natural key; when empty, the id field stands in. The
/// accessor mutates the entity in place after add/update/read so the caller
/// observes server-assigned values (generated id, rowversion, defaults).
#[derive(Clone, Debug, Default)]
pub struct Entity {
    table: TableRef,
    fields: Vec<(String, Value)>,
    key_fields: Vec<String>,
    id_field: Option<String>,
    read_only: Vec<(String, Value)>,
}

impl Entity {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Declares a field with its type template (a `None`-carrying [`Value`]).
    pub fn field(mut self, name: &str, template: Value) -> Self {
        self.add_field(name, template);
        self
    }

    pub fn add_field(&mut self, name: &str, template: Value) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = template;
        } else {
            self.fields.push((name.to_owned(), template));
        }
    }

    /// Marks a declared field as part of the natural key.
    pub fn key(mut self, name: &str) -> Self {
        if !self.key_fields.iter().any(|k| k == name) {
            self.key_fields.push(name.to_owned());
        }
        self
    }

    /// Declares the surrogate id field: excluded from INSERT, populated from
    /// the engine's generated id after an add.
    pub fn id(mut self, name: &str) -> Self {
        self.id_field = Some(name.to_owned());
        self
    }

    /// Declares a computed/joined field: populated by reads, never written.
    pub fn read_only(mut self, name: &str, template: Value) -> Self {
        self.add_read_only(name, template);
        self
    }

    pub fn add_read_only(&mut self, name: &str, template: Value) {
        if let Some(slot) = self.read_only.iter_mut().find(|(n, _)| n == name) {
            slot.1 = template;
        } else {
            self.read_only.push((name.to_owned(), template));
        }
    }

    /// Checks the declaration invariants: key fields must exist, and an
    /// entity without key fields must declare an id field.
    pub fn validate(&self) -> Result<()> {
        for key in &self.key_fields {
            if !self.fields.iter().any(|(n, _)| n == key) {
                bail!(BuildError::UnknownField(key.clone()));
            }
        }
        if self.key_fields.is_empty() {
            match &self.id_field {
                Some(id) if self.fields.iter().any(|(n, _)| n == id) => {}
                _ => bail!(BuildError::MissingKey(self.table.full_name())),
            }
        }
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn read_only_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.read_only.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .chain(self.read_only.iter())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Assigns a value to a declared field, reshaped to the field's type
    /// template. Unknown fields are a contract violation.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let slot = self
            .fields
            .iter_mut()
            .chain(self.read_only.iter_mut())
            .find(|(n, _)| n == name);
        let Some((_, current)) = slot else {
            bail!(BuildError::UnknownField(name.to_owned()));
        };
        *current = conform(value.into(), &current.cleared());
        Ok(())
    }

    /// The fields a write is keyed on: the natural key when declared, the id
    /// field otherwise.
    pub fn effective_key(&self) -> Result<Vec<&str>> {
        if !self.key_fields.is_empty() {
            return Ok(self.key_fields.iter().map(String::as_str).collect());
        }
        match self.id_field.as_deref() {
            Some(id) if self.contains(id) => Ok(vec![id]),
            _ => bail!(BuildError::MissingKey(self.table.full_name())),
        }
    }

    /// Resets every field to its type template, keeping the declarations.
    pub fn clear_values(&mut self) {
        for (_, v) in self.fields.iter_mut().chain(self.read_only.iter_mut()) {
            *v = v.cleared();
        }
    }

    /// Copies a fetched row back onto the entity. Known columns keep their
    /// declared type; columns the entity does not declare (joined or
    /// computed) land in the read-only list.
    pub fn absorb_row(&mut self, row: &RowLabeled) {
        for (label, value) in row.pairs() {
            let slot = self
                .fields
                .iter_mut()
                .chain(self.read_only.iter_mut())
                .find(|(n, _)| n == label || n.eq_ignore_ascii_case(label));
            match slot {
                Some((_, current)) => *current = conform(value.clone(), &current.cleared()),
                None => self.read_only.push((label.to_owned(), value.clone())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Row, RowNames};

    fn invoice() -> Entity {
        Entity::new("invoice_header")
            .field("numero", Value::Int32(None))
            .field("descripcion", Value::Varchar(None))
            .key("numero")
    }

    #[test]
    fn validate_requires_key_or_id() {
        assert!(invoice().validate().is_ok());

        let no_key = Entity::new("t").field("a", Value::Int32(None));
        let err = no_key.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<BuildError>(),
            Some(&BuildError::MissingKey("t".into()))
        );

        let with_id = Entity::new("t").field("id", Value::Int64(None)).id("id");
        assert!(with_id.validate().is_ok());

        let phantom_key = Entity::new("t").field("a", Value::Int32(None)).key("b");
        assert!(phantom_key.validate().is_err());
    }

    #[test]
    fn set_conforms_to_template() {
        let mut e = invoice();
        e.set("numero", 100i64).unwrap();
        assert_eq!(e.get("numero"), Some(&Value::Int32(Some(100))));
        assert!(e.set("no_such", 1).is_err());
    }

    #[test]
    fn effective_key_falls_back_to_id() {
        let e = Entity::new("t").field("id", Value::Int64(None)).id("id");
        assert_eq!(e.effective_key().unwrap(), vec!["id"]);
        assert_eq!(invoice().effective_key().unwrap(), vec!["numero"]);
    }

    #[test]
    fn absorb_row_keeps_declared_types_and_collects_extras() {
        let mut e = invoice();
        let labels: RowNames = vec![
            "numero".to_string(),
            "descripcion".to_string(),
            "b_table.qty".to_string(),
        ]
        .into();
        let values: Row = vec![
            Value::Int64(Some(100)),
            Value::Varchar(Some("A".into())),
            Value::Int64(Some(3)),
        ]
        .into();
        e.absorb_row(&RowLabeled::new(labels, values));
        assert_eq!(e.get("numero"), Some(&Value::Int32(Some(100))));
        assert_eq!(e.get("descripcion"), Some(&Value::Varchar(Some("A".into()))));
        assert_eq!(e.get("b_table.qty"), Some(&Value::Int64(Some(3))));
    }
}
