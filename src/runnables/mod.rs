//! The two cooperating threads of a worker.
//!
//! The [`MainLoop`] owns the worker and decides what happens next. The
//! [`DataProcessor`] runs operator logic on its own thread, one input
//! at a time. They take turns through a [`ContextSwitch`]; at no point
//! do both run.

mod context_switch;
mod data_processor;
mod main_loop;

pub use context_switch::{ContextSwitch, Turn};
pub use data_processor::DataProcessor;
pub use main_loop::MainLoop;
