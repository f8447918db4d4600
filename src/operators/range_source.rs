use anyhow::bail;
use serde::Deserialize;

use super::{parse_config, Operator, OperatorContext, TupleStream};
use crate::model::tuple::{Tuple, Value};

#[derive(Debug, Deserialize)]
struct RangeSourceConfig {
    start: i64,
    end: i64,
    #[serde(default = "default_field")]
    field: String,
}

fn default_field() -> String {
    "value".to_owned()
}

/// Source producing the integers `start..end`.
///
/// Sources have no real input; the range is emitted when the synthetic
/// input finishes. Tuples are built as they are pulled, so the range
/// may be arbitrarily large.
pub struct RangeSourceLogic {
    config: RangeSourceConfig,
}

impl RangeSourceLogic {
    pub(crate) fn builder(
    ) -> impl Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync {
        |config| {
            let config: RangeSourceConfig = parse_config(config)?;
            if config.end < config.start {
                bail!("range end {} is before start {}", config.end, config.start);
            }
            Ok(Box::new(Self { config }))
        }
    }
}

impl Operator for RangeSourceLogic {
    fn process_tuple(
        &mut self,
        _tuple: Tuple,
        _port: usize,
        _ctx: &mut OperatorContext,
    ) -> anyhow::Result<TupleStream> {
        bail!("range_source does not take input")
    }

    fn on_finish(&mut self, _port: usize, _ctx: &mut OperatorContext) -> anyhow::Result<TupleStream> {
        let field = self.config.field.clone();
        let tuples = (self.config.start..self.config.end)
            .map(move |i| -> anyhow::Result<Tuple> {
                Ok(Tuple::new().with(field.clone(), Value::Long(i)))
            });
        Ok(Box::new(tuples))
    }
}

#[test]
fn range_source_emits_range() {
    let mut ctx = OperatorContext::new("w0");
    let mut source =
        RangeSourceLogic::builder()(&serde_json::json!({"start": 2, "end": 5})).unwrap();
    let found: Vec<_> = super::collect(source.on_finish(0, &mut ctx))
        .into_iter()
        .map(|t| t.get("value").cloned())
        .collect();
    assert_eq!(
        found,
        vec![
            Some(Value::Long(2)),
            Some(Value::Long(3)),
            Some(Value::Long(4))
        ]
    );
}

#[test]
fn range_source_rejects_backwards_range() {
    assert!(RangeSourceLogic::builder()(&serde_json::json!({"start": 5, "end": 1})).is_err());
}

#[test]
fn range_source_is_lazy() {
    let mut ctx = OperatorContext::new("w0");
    let mut source =
        RangeSourceLogic::builder()(&serde_json::json!({"start": 0, "end": i64::MAX})).unwrap();
    let mut outputs = source.on_finish(0, &mut ctx).unwrap();
    let first = outputs.next().unwrap().unwrap();
    assert_eq!(first.get("value"), Some(&Value::Long(0)));
}
