//! User operator logic and the table of operators a worker can run.
//!
//! Operators are selected by name from an [`OperatorRegistry`] and
//! built from a JSON config. To write a new operator, create a new
//! [`Operator`] impl and register a builder for it. If the operator
//! has state it wants to keep across a logic swap, implement
//! [`Operator::snapshot`] and [`Operator::restore`].

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{WorkerError, WorkerResult};
use crate::model::tuple::Tuple;

pub(crate) mod count;
pub(crate) mod echo;
pub(crate) mod filter;
pub(crate) mod project;
pub(crate) mod range_source;

pub use count::CountLogic;
pub use echo::EchoLogic;
pub use filter::FilterLogic;
pub use project::ProjectLogic;
pub use range_source::RangeSourceLogic;

/// What an operator can reach while it runs.
#[derive(Debug, Default)]
pub struct OperatorContext {
    worker_id: String,
    prints: Vec<String>,
}

impl OperatorContext {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            prints: Vec::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Print to the user's console. Output is delivered to the
    /// controller in batches.
    pub fn print(&mut self, message: impl Into<String>) {
        self.prints.push(message.into());
    }

    pub(crate) fn take_prints(&mut self) -> Vec<String> {
        std::mem::take(&mut self.prints)
    }
}

/// Tuples produced for one input.
///
/// The worker pulls them one at a time and handles control in between,
/// so a stream may be long or computed lazily. Streams own what they
/// need; anything derived from operator state is captured when the
/// stream is created.
pub type TupleStream = Box<dyn Iterator<Item = anyhow::Result<Tuple>> + Send>;

/// Stream already built tuples.
pub fn emit<I>(tuples: I) -> TupleStream
where
    I: IntoIterator<Item = Tuple>,
    I::IntoIter: Send + 'static,
{
    Box::new(tuples.into_iter().map(Ok::<Tuple, anyhow::Error>))
}

pub fn emit_nothing() -> TupleStream {
    Box::new(std::iter::empty())
}

/// Impl this trait to create an operator.
///
/// Every call may fail with any error; the worker reports it to the
/// controller and pauses instead of crashing.
pub trait Operator: Send {
    /// Called once before any tuple is processed.
    fn open(&mut self, _ctx: &mut OperatorContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Process one tuple that arrived on input port `port`.
    fn process_tuple(
        &mut self,
        tuple: Tuple,
        port: usize,
        ctx: &mut OperatorContext,
    ) -> anyhow::Result<TupleStream>;

    /// Input port `port` will receive nothing more. Source operators
    /// produce all their output here.
    fn on_finish(&mut self, _port: usize, _ctx: &mut OperatorContext) -> anyhow::Result<TupleStream> {
        Ok(emit_nothing())
    }

    fn close(&mut self, _ctx: &mut OperatorContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// The operator's internal fields, for inspection and for carrying
    /// state into a replacement operator.
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Resume from a [`Operator::snapshot`] of a previous instance.
    fn restore(&mut self, _snapshot: serde_json::Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Build an operator from its JSON config.
pub type OperatorBuilder =
    Box<dyn Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync>;

/// Operators a worker knows how to run, by name.
#[derive(Default)]
pub struct OperatorRegistry {
    builders: BTreeMap<String, OperatorBuilder>,
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("OperatorRegistry")
            .field("operators", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every operator shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", EchoLogic::builder());
        registry.register("filter", FilterLogic::builder());
        registry.register("project", ProjectLogic::builder());
        registry.register("count", CountLogic::builder());
        registry.register("range_source", RangeSourceLogic::builder());
        registry
    }

    /// Add or replace the builder for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Operator>> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    pub fn build(&self, name: &str, config: &serde_json::Value) -> WorkerResult<Box<dyn Operator>> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| WorkerError::UnknownOperator(name.to_owned()))?;
        Ok(builder(config)?)
    }
}

/// Decode an operator config, treating a missing config as empty.
pub(crate) fn parse_config<T>(config: &serde_json::Value) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let config = if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    };
    Ok(serde_json::from_value(config)?)
}

/// Run a stream to its end.
#[cfg(test)]
pub(crate) fn collect(outputs: anyhow::Result<TupleStream>) -> Vec<Tuple> {
    outputs.and_then(|outputs| outputs.collect()).unwrap()
}

#[test]
fn registry_knows_builtins() {
    let registry = OperatorRegistry::with_builtins();
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        ["count", "echo", "filter", "project", "range_source"]
    );
    assert!(registry.build("echo", &serde_json::Value::Null).is_ok());
}

#[test]
fn registry_rejects_unknown_and_bad_configs() {
    let registry = OperatorRegistry::with_builtins();
    assert!(matches!(
        registry.build("nope", &serde_json::Value::Null),
        Err(WorkerError::UnknownOperator(_))
    ));
    assert!(matches!(
        registry.build("project", &serde_json::json!({"fields": 3})),
        Err(WorkerError::Operator(_))
    ));
}
