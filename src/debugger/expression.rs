//! Evaluation of debugger expressions.
//!
//! An expression is a dotted path rooted at one of `tuple`, `self`,
//! `port` or `state`. Numeric segments index into arrays, so
//! `self.counts.0` and `tuple.name` are both valid.

use serde_json::Value as Json;

use crate::errors::{WorkerError, WorkerResult};
use crate::model::messages::{EvaluatedValue, TypedValue};
use crate::model::tuple::Tuple;
use crate::model::{PortIdentity, WorkerState};

/// The live values an expression can see.
#[derive(Debug, Clone)]
pub struct ExpressionScope<'a> {
    pub tuple: Option<&'a Tuple>,
    pub port: Option<PortIdentity>,
    /// [`crate::operators::Operator::snapshot`] of the running operator.
    pub snapshot: Json,
    pub state: WorkerState,
}

impl ExpressionScope<'_> {
    fn root(&self, name: &str) -> WorkerResult<Json> {
        match name {
            "tuple" => Ok(self.tuple.map_or(Json::Null, Tuple::to_json)),
            "self" => Ok(self.snapshot.clone()),
            "port" => Ok(self.port.map_or(Json::Null, |port| Json::from(port.id))),
            "state" => Ok(Json::from(self.state.to_string())),
            other => Err(WorkerError::Expression(format!(
                "unknown name {other:?}, expected one of tuple, self, port, state"
            ))),
        }
    }
}

fn step<'j>(value: &'j Json, segment: &str, path: &str) -> WorkerResult<&'j Json> {
    let found = match value {
        Json::Object(fields) => fields.get(segment),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };
    found.ok_or_else(|| WorkerError::Expression(format!("{path} has no attribute {segment:?}")))
}

fn type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn typed(expression: String, value: &Json) -> TypedValue {
    let value_str = match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    let expandable = match value {
        Json::Array(items) => !items.is_empty(),
        Json::Object(fields) => !fields.is_empty(),
        _ => false,
    };
    TypedValue {
        value_ref: expression.clone(),
        expression,
        value_str,
        value_type: type_name(value).to_owned(),
        expandable,
    }
}

/// Evaluate `expression` and expand its attributes one level deep.
pub fn evaluate(expression: &str, scope: &ExpressionScope) -> WorkerResult<EvaluatedValue> {
    let expression = expression.trim();
    let mut segments = expression.split('.');
    let root = match segments.next() {
        Some(root) if !root.is_empty() => root,
        _ => return Err(WorkerError::Expression("empty expression".to_owned())),
    };
    let root = scope.root(root)?;

    let mut current = &root;
    let mut path = String::new();
    for segment in expression.split('.') {
        if !path.is_empty() {
            current = step(current, segment, &path)?;
            path.push('.');
        }
        path.push_str(segment);
    }

    let attributes = match current {
        Json::Object(fields) => fields
            .iter()
            .map(|(name, value)| typed(format!("{expression}.{name}"), value))
            .collect(),
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, value)| typed(format!("{expression}.{i}"), value))
            .collect(),
        _ => Vec::new(),
    };
    Ok(EvaluatedValue {
        value: typed(expression.to_owned(), current),
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(tuple: &Tuple) -> ExpressionScope {
        ExpressionScope {
            tuple: Some(tuple),
            port: Some(PortIdentity::new(1)),
            snapshot: serde_json::json!({"counts": [3, 4], "label": "x"}),
            state: WorkerState::Paused,
        }
    }

    #[test]
    fn tuple_fields_are_expanded() {
        let tuple = Tuple::new().with("name", "ada").with("age", 36);
        let found = evaluate("tuple", &scope(&tuple)).unwrap();
        assert_eq!(found.value.value_type, "object");
        assert!(found.value.expandable);
        let names: Vec<_> = found.attributes.iter().map(|a| a.expression.as_str()).collect();
        assert_eq!(names, ["tuple.age", "tuple.name"]);
        assert_eq!(found.attributes[1].value_str, "ada");
    }

    #[test]
    fn paths_walk_snapshot_and_arrays() {
        let tuple = Tuple::new();
        let found = evaluate("self.counts.1", &scope(&tuple)).unwrap();
        assert_eq!(found.value.value_str, "4");
        assert_eq!(found.value.value_type, "number");
        assert!(!found.value.expandable);
        assert!(found.attributes.is_empty());

        let found = evaluate("self.counts", &scope(&tuple)).unwrap();
        assert_eq!(found.attributes.len(), 2);
        assert_eq!(found.attributes[0].expression, "self.counts.0");
    }

    #[test]
    fn scalar_roots() {
        let tuple = Tuple::new();
        assert_eq!(evaluate("port", &scope(&tuple)).unwrap().value.value_str, "1");
        assert_eq!(evaluate("state", &scope(&tuple)).unwrap().value.value_str, "Paused");
    }

    #[test]
    fn bad_paths_are_errors() {
        let tuple = Tuple::new();
        assert!(matches!(
            evaluate("nothing", &scope(&tuple)),
            Err(WorkerError::Expression(_))
        ));
        assert!(evaluate("self.counts.9", &scope(&tuple)).is_err());
        assert!(evaluate("self.label.x", &scope(&tuple)).is_err());
        assert!(evaluate("", &scope(&tuple)).is_err());
    }
}
