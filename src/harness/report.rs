//! Batch results and their markdown rendering

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::time::Duration;

use super::bus::SimEventKind;
use super::simulator::SimulationRun;

#[derive(Debug, Clone)]
pub enum ExampleResult {
    Completed(SimulationRun),
    Failed {
        example: String,
        elapsed: Duration,
        error: String,
    },
}

impl ExampleResult {
    pub fn example(&self) -> &str {
        match self {
            ExampleResult::Completed(run) => &run.example,
            ExampleResult::Failed { example, .. } => example,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            ExampleResult::Completed(run) => run.elapsed,
            ExampleResult::Failed { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExampleResult::Completed(_))
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ExampleResult>,
}

impl Default for SimulationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationReport {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ExampleResult) {
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.total() - self.successes()
    }

    pub fn total_elapsed(&self) -> Duration {
        self.results.iter().map(ExampleResult::elapsed).sum()
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Issue Investigation Simulation Report\n");
        let _ = writeln!(out, "Date: {}\n", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "- Total examples: {}", self.total());
        let _ = writeln!(out, "- Successful: {}", self.successes());
        let _ = writeln!(out, "- Failed: {}", self.failures());
        let _ = writeln!(
            out,
            "- Total time: {:.2}s\n",
            self.total_elapsed().as_secs_f64()
        );
        let _ = writeln!(out, "## Results\n");

        for result in &self.results {
            let _ = writeln!(out, "### {}\n", result.example());
            match result {
                ExampleResult::Completed(run) => render_run(&mut out, run),
                ExampleResult::Failed { elapsed, error, .. } => {
                    let _ = writeln!(out, "- Status: failed");
                    let _ = writeln!(out, "- Time: {:.2}s", elapsed.as_secs_f64());
                    let _ = writeln!(out, "- Error: {error}\n");
                }
            }
        }
        out
    }
}

fn render_run(out: &mut String, run: &SimulationRun) {
    let _ = writeln!(out, "- Status: success");
    let _ = writeln!(out, "- Issue: #{}", run.issue_id);
    let _ = writeln!(out, "- Time: {:.2}s", run.elapsed.as_secs_f64());
    let _ = writeln!(out, "- Final status: {}", run.final_status);
    if let Some(reproduced) = run.reproduced {
        let _ = writeln!(out, "- Reproduced: {reproduced}");
    }
    out.push('\n');

    if let Some(analysis) = &run.analysis {
        let json = serde_json::to_string_pretty(analysis)
            .unwrap_or_else(|e| format!("\"unserializable analysis: {e}\""));
        let _ = writeln!(out, "#### Analysis\n\n```json\n{json}\n```\n");
    }

    if !run.events.is_empty() {
        let _ = writeln!(out, "#### Messages\n");
        for (i, event) in run.events.iter().enumerate() {
            let kind = match event.kind {
                SimEventKind::Reply => "reply",
                SimEventKind::Edit => "edit",
            };
            let content = event.content.replace('\n', "\n   ");
            let _ = writeln!(out, "{}. [{kind} {}] {content}", i + 1, event.handle);
        }
        out.push('\n');
    }
}
