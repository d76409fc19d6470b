//! Example-driven acceptance harness
//!
//! Replaces the chat transport with an in-process [`EventBus`] and runs
//! literal example reports through the unmodified intake and
//! investigation pipeline.

pub mod bus;
pub mod report;
pub mod simulator;

pub use bus::{EventBus, SimEvent, SimEventKind, SimulatedReporter};
pub use report::{ExampleResult, SimulationReport};
pub use simulator::{
    list_examples, load_example, Example, HarnessError, SimulationRun, Simulator,
};
