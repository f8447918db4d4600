use serde::Deserialize;

use super::{emit, emit_nothing, parse_config, Operator, OperatorContext, TupleStream};
use crate::model::tuple::Tuple;

#[derive(Debug, Deserialize)]
struct FilterConfig {
    field: String,
    value: serde_json::Value,
    #[serde(default)]
    negate: bool,
}

/// Keeps tuples whose `field` equals `value`, or the others when
/// negated. Tuples without the field never match.
pub struct FilterLogic {
    config: FilterConfig,
}

impl FilterLogic {
    pub(crate) fn builder(
    ) -> impl Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync {
        |config| {
            Ok(Box::new(Self {
                config: parse_config(config)?,
            }))
        }
    }

    fn matches(&self, tuple: &Tuple) -> bool {
        tuple
            .get(&self.config.field)
            .map_or(false, |value| value.to_json() == self.config.value)
    }
}

impl Operator for FilterLogic {
    fn process_tuple(
        &mut self,
        tuple: Tuple,
        _port: usize,
        _ctx: &mut OperatorContext,
    ) -> anyhow::Result<TupleStream> {
        if self.matches(&tuple) != self.config.negate {
            Ok(emit([tuple]))
        } else {
            Ok(emit_nothing())
        }
    }
}

#[test]
fn filter_keeps_matching() {
    let mut ctx = OperatorContext::new("w0");
    let mut filter =
        FilterLogic::builder()(&serde_json::json!({"field": "k", "value": "a"})).unwrap();
    let a = Tuple::new().with("k", "a");
    let b = Tuple::new().with("k", "b");
    assert_eq!(super::collect(filter.process_tuple(a.clone(), 0, &mut ctx)), vec![a]);
    assert!(super::collect(filter.process_tuple(b, 0, &mut ctx)).is_empty());
}

#[test]
fn filter_negated() {
    let mut ctx = OperatorContext::new("w0");
    let mut filter =
        FilterLogic::builder()(&serde_json::json!({"field": "n", "value": 1, "negate": true}))
            .unwrap();
    let one = Tuple::new().with("n", 1);
    let two = Tuple::new().with("n", 2);
    assert!(super::collect(filter.process_tuple(one, 0, &mut ctx)).is_empty());
    assert_eq!(super::collect(filter.process_tuple(two.clone(), 0, &mut ctx)), vec![two]);
}
