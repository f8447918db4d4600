use anyhow::anyhow;
use serde::Deserialize;

use super::{emit, parse_config, Operator, OperatorContext, TupleStream};
use crate::model::tuple::Tuple;

#[derive(Debug, Deserialize)]
struct ProjectConfig {
    fields: Vec<String>,
}

/// Keeps the listed fields, in the listed order.
pub struct ProjectLogic {
    fields: Vec<String>,
}

impl ProjectLogic {
    pub(crate) fn builder(
    ) -> impl Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync {
        |config| {
            let config: ProjectConfig = parse_config(config)?;
            Ok(Box::new(Self {
                fields: config.fields,
            }))
        }
    }
}

impl Operator for ProjectLogic {
    fn process_tuple(
        &mut self,
        tuple: Tuple,
        _port: usize,
        _ctx: &mut OperatorContext,
    ) -> anyhow::Result<TupleStream> {
        let mut projected = Tuple::new();
        for field in &self.fields {
            let value = tuple
                .get(field)
                .ok_or_else(|| anyhow!("field {field:?} not found in {tuple}"))?;
            projected.set(field.clone(), value.clone());
        }
        Ok(emit([projected]))
    }
}

#[test]
fn project_reorders_and_drops() {
    let mut ctx = OperatorContext::new("w0");
    let mut project =
        ProjectLogic::builder()(&serde_json::json!({"fields": ["b", "a"]})).unwrap();
    let found = super::collect(project.process_tuple(
        Tuple::new().with("a", 1).with("b", 2).with("c", 3),
        0,
        &mut ctx,
    ));
    assert_eq!(found, vec![Tuple::new().with("b", 2).with("a", 1)]);
}

#[test]
fn project_missing_field_is_an_error() {
    let mut ctx = OperatorContext::new("w0");
    let mut project = ProjectLogic::builder()(&serde_json::json!({"fields": ["z"]})).unwrap();
    assert!(project
        .process_tuple(Tuple::new().with("a", 1), 0, &mut ctx)
        .is_err());
}
