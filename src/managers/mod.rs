//! Bookkeeping owned by the main loop.
//!
//! Everything here is plain single-threaded state except
//! [`TupleProcessingManager`] and [`ExecutorManager`], which are shared
//! with the data processor thread across the baton pass.

pub mod alignment;
pub mod console;
pub mod executor;
pub mod pause;
pub mod state;
pub mod statistics;
pub mod tuple_processing;

pub use alignment::AlignmentManager;
pub use console::ConsoleMessageManager;
pub use executor::ExecutorManager;
pub use pause::PauseManager;
pub use state::StateManager;
pub use statistics::StatisticsManager;
pub use tuple_processing::{ExceptionInfo, ProcessingInput, TupleProcessingManager};
