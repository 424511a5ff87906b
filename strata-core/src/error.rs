use std::fmt;

/// Portable outcome of an accessor operation, independent of the engine.
///
/// Write operations return one of these; infrastructure failures (connection
/// loss, syntax errors) propagate as [`crate::Error`] instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    Ok,
    /// No key fields and no id field available for the operation.
    NotUniqueId,
    /// The statement would have no columns to write.
    NoFieldsToExecute,
    /// Refused bulk delete with an empty WHERE clause.
    DeleteNoWhereClause,
    RecordNotExist,
    RecordExist,
    /// Optimistic-concurrency conflict: the row changed under us.
    RecordModified,
    DuplicateKey,
    ForeignKeyError,
    /// A constraint referenced a field unknown to the entity.
    InvalidWhereField,
    /// Engine error that matched no classification predicate.
    OperationFail,
}

impl OpCode {
    /// Stable integer value consumed by controller layers.
    pub fn code(&self) -> i32 {
        match self {
            OpCode::Ok => 0,
            OpCode::NotUniqueId => -1,
            OpCode::NoFieldsToExecute => -2,
            OpCode::DeleteNoWhereClause => -3,
            OpCode::RecordNotExist => -4,
            OpCode::RecordExist => -5,
            OpCode::RecordModified => -6,
            OpCode::DuplicateKey => -7,
            OpCode::ForeignKeyError => -8,
            OpCode::InvalidWhereField => -9,
            OpCode::OperationFail => -10,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == OpCode::Ok
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Structured error reported by an engine for a failed statement.
///
/// Some engines only report a message; `code` is the SQLSTATE or vendor
/// error number when one exists. Drivers wrap this into [`crate::Error`] so
/// the accessor can recover it with `downcast_ref` and run the dialect
/// classification predicates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbError {
    pub code: Option<String>,
    pub message: String,
}

impl DbError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_is(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DbError {}

/// Contract violation raised by the clause builders.
///
/// These are programming errors on the caller's side, never retried; the
/// accessor maps them onto their [`OpCode`] counterparts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// A value was assigned to or selected from a field the entity does not declare.
    UnknownField(String),
    /// A where clause referenced a field absent from the entity and the joined entities.
    UnknownWhereField(String),
    /// A bulk delete rendered an empty WHERE clause.
    EmptyWhereClause,
    /// The entity has neither populated key fields nor an id field.
    MissingKey(String),
    /// The statement would carry no columns.
    NoFields(String),
}

impl BuildError {
    pub fn op_code(&self) -> OpCode {
        match self {
            BuildError::UnknownField(..) => OpCode::InvalidWhereField,
            BuildError::UnknownWhereField(..) => OpCode::InvalidWhereField,
            BuildError::EmptyWhereClause => OpCode::DeleteNoWhereClause,
            BuildError::MissingKey(..) => OpCode::NotUniqueId,
            BuildError::NoFields(..) => OpCode::NoFieldsToExecute,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnknownField(name) => write!(f, "Unknown field `{}`", name),
            BuildError::UnknownWhereField(name) => {
                write!(f, "Where clause references unknown field `{}`", name)
            }
            BuildError::EmptyWhereClause => {
                f.write_str("Refusing to run a delete with an empty where clause")
            }
            BuildError::MissingKey(table) => {
                write!(f, "Entity `{}` has no key fields and no id field", table)
            }
            BuildError::NoFields(table) => {
                write!(f, "Entity `{}` has no fields to execute", table)
            }
        }
    }
}

impl std::error::Error for BuildError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_codes_are_stable() {
        assert_eq!(OpCode::Ok.code(), 0);
        assert_eq!(OpCode::RecordModified.code(), -6);
        assert_eq!(OpCode::OperationFail.code(), -10);
        assert!(OpCode::Ok.is_ok());
        assert!(!OpCode::DuplicateKey.is_ok());
    }

    #[test]
    fn build_errors_map_to_codes() {
        assert_eq!(
            BuildError::EmptyWhereClause.op_code(),
            OpCode::DeleteNoWhereClause
        );
        assert_eq!(
            BuildError::UnknownWhereField("x".into()).op_code(),
            OpCode::InvalidWhereField
        );
        assert_eq!(
            BuildError::MissingKey("t".into()).op_code(),
            OpCode::NotUniqueId
        );
    }
}
