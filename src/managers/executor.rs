//! Owns the running operator.

use std::sync::Arc;

use crate::errors::{WorkerError, WorkerResult};
use crate::model::tuple::Schema;
use crate::operators::{Operator, OperatorContext, OperatorRegistry};

pub struct ExecutorManager {
    operator: Option<Box<dyn Operator>>,
    operator_name: Option<String>,
    is_source: bool,
    output_schema: Option<Arc<Schema>>,
    pub ctx: OperatorContext,
}

impl ExecutorManager {
    pub fn new(worker_id: &str) -> Self {
        Self {
            operator: None,
            operator_name: None,
            is_source: false,
            output_schema: None,
            ctx: OperatorContext::new(worker_id),
        }
    }

    /// Build and install an operator, replacing any previous one.
    pub fn initialize(
        &mut self,
        registry: &OperatorRegistry,
        name: &str,
        config: &serde_json::Value,
        is_source: bool,
    ) -> WorkerResult<()> {
        let operator = registry.build(name, config)?;
        tracing::info!("worker {} initialized operator {name}", self.ctx.worker_id());
        self.operator = Some(operator);
        self.operator_name = Some(name.to_owned());
        self.is_source = is_source;
        Ok(())
    }

    /// Swap in a new operator that resumes from the current one's
    /// snapshot.
    pub fn modify(
        &mut self,
        registry: &OperatorRegistry,
        name: &str,
        config: &serde_json::Value,
        is_source: bool,
    ) -> WorkerResult<()> {
        let snapshot = self.operator()?.snapshot();
        let mut operator = registry.build(name, config)?;
        operator.restore(snapshot)?;
        tracing::info!("worker {} swapped operator logic to {name}", self.ctx.worker_id());
        self.operator = Some(operator);
        self.operator_name = Some(name.to_owned());
        self.is_source = is_source;
        Ok(())
    }

    pub fn operator(&self) -> WorkerResult<&dyn Operator> {
        self.operator
            .as_deref()
            .ok_or(WorkerError::OperatorNotInitialized)
    }

    /// The operator together with the context it runs in.
    pub fn operator_mut(&mut self) -> WorkerResult<(&mut dyn Operator, &mut OperatorContext)> {
        match self.operator.as_deref_mut() {
            Some(operator) => Ok((operator, &mut self.ctx)),
            None => Err(WorkerError::OperatorNotInitialized),
        }
    }

    pub fn open(&mut self) -> WorkerResult<()> {
        let (operator, ctx) = self.operator_mut()?;
        operator.open(ctx)?;
        Ok(())
    }

    pub fn close(&mut self) -> WorkerResult<()> {
        let (operator, ctx) = self.operator_mut()?;
        operator.close(ctx)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.operator.is_some()
    }

    pub fn operator_name(&self) -> Option<&str> {
        self.operator_name.as_deref()
    }

    pub fn is_source(&self) -> bool {
        self.is_source
    }

    pub fn set_output_schema(&mut self, schema: Schema) {
        self.output_schema = Some(Arc::new(schema));
    }

    pub fn output_schema(&self) -> Option<&Arc<Schema>> {
        self.output_schema.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tuple::Tuple;

    #[test]
    fn uninitialized_operator_is_an_error() {
        let mut executor = ExecutorManager::new("w0");
        assert!(matches!(
            executor.open(),
            Err(WorkerError::OperatorNotInitialized)
        ));
        assert!(executor.operator().is_err());
    }

    #[test]
    fn modify_carries_state() {
        let registry = OperatorRegistry::with_builtins();
        let mut executor = ExecutorManager::new("w0");
        executor
            .initialize(&registry, "count", &serde_json::Value::Null, false)
            .unwrap();
        {
            let (operator, ctx) = executor.operator_mut().unwrap();
            operator.process_tuple(Tuple::new(), 0, ctx).unwrap();
        }
        executor
            .modify(&registry, "count", &serde_json::Value::Null, false)
            .unwrap();
        assert_eq!(
            executor.operator().unwrap().snapshot(),
            serde_json::json!({"counts": {"0": 1}})
        );
        assert_eq!(executor.operator_name(), Some("count"));
    }
}
