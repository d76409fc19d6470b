//! Investigation pipeline
//!
//! Stages run in a fixed order: analysis, follow-up questions, test plan,
//! reproduction, report. Each stage owns its fallback so that only store,
//! filesystem and clone failures can end a run early.

pub mod analysis;
pub mod error;
pub mod followup;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod reproduction;

pub use analysis::{parse_analysis, AnalysisStage};
pub use error::{format_error, PipelineError};
pub use followup::{default_questions, parse_questions, render_questions, FollowUpStage};
pub use orchestrator::{InvestigationOutcome, Investigator, InvestigatorSettings};
pub use plan::{parse_plan, PlanStage};
pub use report::{archive_key, bundle_directory, terminal_status, ReportStage};
pub use reproduction::{
    classify_exit, parse_test_code, stub_test_code, Reproduction, ReproductionSettings,
    ReproductionStage, TestArtifacts, TestCode, TIMEOUT_NOTE,
};
