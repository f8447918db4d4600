use serde::Deserialize;

use super::{emit, parse_config, Operator, OperatorContext, TupleStream};
use crate::model::tuple::Tuple;

#[derive(Debug, Default, Deserialize)]
struct EchoConfig {
    /// Also print every tuple to the console.
    #[serde(default)]
    print: bool,
}

/// Emits every input tuple unchanged.
pub struct EchoLogic {
    print: bool,
}

impl EchoLogic {
    pub(crate) fn builder(
    ) -> impl Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync {
        |config| {
            let config: EchoConfig = parse_config(config)?;
            Ok(Box::new(Self {
                print: config.print,
            }))
        }
    }
}

impl Operator for EchoLogic {
    fn process_tuple(
        &mut self,
        tuple: Tuple,
        _port: usize,
        ctx: &mut OperatorContext,
    ) -> anyhow::Result<TupleStream> {
        if self.print {
            ctx.print(tuple.to_string());
        }
        Ok(emit([tuple]))
    }
}

#[test]
fn echo_prints_when_asked() {
    let mut ctx = OperatorContext::new("w0");
    let mut echo = EchoLogic::builder()(&serde_json::json!({"print": true})).unwrap();
    let tuple = Tuple::new().with("x", 1);
    let found = super::collect(echo.process_tuple(tuple.clone(), 0, &mut ctx));
    assert_eq!(found, vec![tuple]);
    assert_eq!(ctx.take_prints(), vec!["Tuple[x=1]".to_owned()]);
}
