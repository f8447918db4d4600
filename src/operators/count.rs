use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::{emit, emit_nothing, parse_config, Operator, OperatorContext, TupleStream};
use crate::model::tuple::{Tuple, Value};

#[derive(Debug, Deserialize)]
struct CountConfig {
    #[serde(default = "default_field")]
    field: String,
}

fn default_field() -> String {
    "count".to_owned()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CountState {
    counts: BTreeMap<usize, i64>,
}

/// Counts the tuples of each input port and emits one tuple with the
/// count once the port is finished.
pub struct CountLogic {
    field: String,
    state: CountState,
}

impl CountLogic {
    pub(crate) fn builder(
    ) -> impl Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync {
        |config| {
            let config: CountConfig = parse_config(config)?;
            Ok(Box::new(Self {
                field: config.field,
                state: CountState::default(),
            }))
        }
    }
}

impl Operator for CountLogic {
    fn process_tuple(
        &mut self,
        _tuple: Tuple,
        port: usize,
        _ctx: &mut OperatorContext,
    ) -> anyhow::Result<TupleStream> {
        *self.state.counts.entry(port).or_default() += 1;
        Ok(emit_nothing())
    }

    fn on_finish(&mut self, port: usize, _ctx: &mut OperatorContext) -> anyhow::Result<TupleStream> {
        let count = self.state.counts.get(&port).copied().unwrap_or(0);
        Ok(emit([Tuple::new().with(self.field.clone(), Value::Long(count))]))
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, snapshot: serde_json::Value) -> anyhow::Result<()> {
        if !snapshot.is_null() {
            self.state = serde_json::from_value(snapshot)?;
        }
        Ok(())
    }
}

#[test]
fn count_emits_on_finish() {
    let mut ctx = OperatorContext::new("w0");
    let mut count = CountLogic::builder()(&serde_json::Value::Null).unwrap();
    for i in 0..3 {
        let found = count.process_tuple(Tuple::new().with("i", i), 0, &mut ctx);
        assert!(super::collect(found).is_empty());
    }
    assert_eq!(
        super::collect(count.on_finish(0, &mut ctx)),
        vec![Tuple::new().with("count", Value::Long(3))]
    );
}

#[test]
fn count_survives_swap() {
    let mut ctx = OperatorContext::new("w0");
    let mut old = CountLogic::builder()(&serde_json::Value::Null).unwrap();
    old.process_tuple(Tuple::new(), 0, &mut ctx).unwrap();
    old.process_tuple(Tuple::new(), 0, &mut ctx).unwrap();

    let mut new = CountLogic::builder()(&serde_json::json!({"field": "n"})).unwrap();
    new.restore(old.snapshot()).unwrap();
    new.process_tuple(Tuple::new(), 0, &mut ctx).unwrap();
    assert_eq!(
        super::collect(new.on_finish(0, &mut ctx)),
        vec![Tuple::new().with("n", Value::Long(3))]
    );
}
