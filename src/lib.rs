//! Reprodesk: automated triage of user-reported problems
//!
//! A report is analyzed by a language model, turned into a test plan,
//! reproduced in an isolated working directory under a hard deadline, and
//! either resolved or escalated to a maintainer. Every status change is
//! recorded as an audit entry in the store.

pub mod blob;
pub mod cli;
pub mod config;
pub mod exec;
pub mod harness;
pub mod intake;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod reporter;

pub use config::AppConfig;
pub use intake::{InboundReport, Intake, IntakeError, SessionTracker};
pub use pipeline::{InvestigationOutcome, Investigator, InvestigatorSettings, PipelineError};
pub use reporter::{MessageHandle, Reporter};
