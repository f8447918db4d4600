//! Execution core of a dataflow worker.
//!
//! A worker runs one operator of a distributed dataflow. It takes
//! batches of tuples and control commands off an inbound queue, runs
//! the operator logic on every tuple, routes what it produces to
//! downstream workers and answers the controller.
//!
//! Start one with [`worker::Worker::spawn`] and talk to it through its
//! queues. Everything a worker does is driven by messages; there are
//! no other entry points.

pub mod config;
pub mod context;
pub mod debugger;
pub mod errors;
pub mod handlers;
pub mod inputs;
#[macro_use]
pub(crate) mod macros;
pub mod managers;
pub mod metrics;
pub mod model;
pub mod operators;
pub mod outputs;
pub mod partitioners;
pub mod queue;
pub mod rpc;
pub mod runnables;
pub mod tracing;
pub(crate) mod webserver;
pub mod worker;

pub use config::WorkerConfig;
pub use errors::{WorkerError, WorkerResult};
pub use operators::{Operator, OperatorContext, OperatorRegistry, TupleStream};
pub use worker::Worker;
