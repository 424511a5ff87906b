use crate::{ResultSet, Value};

/// Direction of a routine parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

/// Shape the caller expects back from a routine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultShape {
    /// A single row set, possibly empty.
    #[default]
    RowSet,
    /// The first column of the first row of the first set.
    Scalar,
    /// Every row set the routine produces.
    MultiRowSet,
}

#[derive(Clone, Debug)]
pub struct RoutineParam {
    /// Parameter name, used to label OUT values. Optional for engines that
    /// bind positionally.
    pub name: Option<String>,
    pub value: Value,
    pub mode: ParamMode,
    /// Native type name for dialects that must declare OUT variables.
    pub type_hint: Option<String>,
}

impl RoutineParam {
    pub fn input(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
            mode: ParamMode::In,
            type_hint: None,
        }
    }

    pub fn output(name: &str, template: Value) -> Self {
        Self {
            name: Some(name.to_owned()),
            value: template,
            mode: ParamMode::Out,
            type_hint: None,
        }
    }

    pub fn inout(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.to_owned()),
            value: value.into(),
            mode: ParamMode::InOut,
            type_hint: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn typed(mut self, type_hint: &str) -> Self {
        self.type_hint = Some(type_hint.to_owned());
        self
    }
}

/// A stored procedure or function invocation.
#[derive(Clone, Debug)]
pub struct RoutineCall {
    pub name: String,
    pub params: Vec<RoutineParam>,
    pub shape: ResultShape,
}

impl RoutineCall {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            params: Vec::new(),
            shape: ResultShape::default(),
        }
    }

    pub fn param(mut self, param: RoutineParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn input(self, value: impl Into<Value>) -> Self {
        self.param(RoutineParam::input(value))
    }

    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn has_output(&self) -> bool {
        self.params.iter().any(|p| p.mode != ParamMode::In)
    }
}

/// Everything a routine produced: its row sets plus the final values of the
/// OUT and INOUT parameters, labeled by parameter name.
#[derive(Clone, Debug, Default)]
pub struct RoutineResults {
    pub row_sets: Vec<ResultSet>,
    pub out_values: Vec<(String, Value)>,
}

impl RoutineResults {
    /// First column of the first row of the first set.
    pub fn scalar(&self) -> Option<&Value> {
        self.row_sets.first().and_then(|set| set.scalar())
    }

    pub fn out(&self, name: &str) -> Option<&Value> {
        self.out_values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_builder_tracks_output_params() {
        let call = RoutineCall::new("compute_totals")
            .input(42_i32)
            .param(RoutineParam::output("total", Value::Decimal(None)).typed("DECIMAL(18,4)"));
        assert_eq!(call.params.len(), 2);
        assert!(call.has_output());
        assert_eq!(call.params[1].name.as_deref(), Some("total"));
    }

    #[test]
    fn out_values_are_found_by_name() {
        let results = RoutineResults {
            row_sets: vec![],
            out_values: vec![("total".to_owned(), Value::from(10_i64))],
        };
        assert_eq!(results.out("total"), Some(&Value::Int64(Some(10))));
        assert_eq!(results.out("missing"), None);
    }

    #[test]
    fn results_clone_with_their_row_sets() {
        let results = RoutineResults {
            row_sets: vec![crate::ResultSet::from_affected(3, None)],
            out_values: vec![("total".to_owned(), Value::from(10_i64))],
        };
        let copy = results.clone();
        assert_eq!(copy.row_sets[0].affected_rows(), 3);
        assert_eq!(copy.out("total"), results.out("total"));
    }
}
