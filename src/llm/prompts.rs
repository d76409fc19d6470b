//! Prompt templates for every model-backed stage

use reprodesk_core::{AnalysisResult, IssueId, ReproductionOutcome, TestPlan};

pub const ANALYSIS_SYSTEM: &str = "\
You are an expert software engineer specialized in analyzing and debugging issues in open source projects.
Your task is to analyze the given problem description and extract key information to help with troubleshooting.

Your analysis should include:
1. Problem category
2. Project component(s) involved
3. Estimated complexity
4. Required tools for debugging
5. Potential solutions
6. Reproducibility steps (if applicable)

Respond in valid JSON format only, with the following structure:
{
  \"problemCategory\": \"bug\" | \"feature_request\" | \"implementation_question\" | \"installation\" | \"other\",
  \"projectComponent\": string,
  \"estimatedComplexity\": \"low\" | \"medium\" | \"high\",
  \"requiredTools\": string[],
  \"potentialSolutions\": string[],
  \"reproducibilitySteps\": string[] (optional),
  \"additionalContext\": object (optional)
}";

pub const FOLLOW_UP_SYSTEM: &str = "\
You are a technical support engineer who needs to gather more information to solve a problem.
Focus on questions that will help with reproducing the issue or clarifying ambiguous details.
Respond ONLY with a JSON array of strings containing follow-up questions.";

pub const PLAN_SYSTEM: &str = "\
You are an expert software tester who specializes in creating test plans for software issues. \
You respond only in valid JSON format.";

pub const TEST_CODE_SYSTEM: &str = "\
You are an expert programmer who writes clean, effective test code to reproduce software issues. \
You respond only in valid JSON format.";

pub const SUMMARY_SYSTEM: &str = "\
You are a technical writer specializing in test reports. Be clear, concise, and technical.";

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn analysis_prompt(report: &str) -> String {
    format!(
        "Please analyze the following request for help with a technical issue:\n\n\
         \"\"\"\n{report}\n\"\"\"\n\n\
         Provide a structured analysis to help understand what troubleshooting will be required."
    )
}

pub fn follow_up_prompt(report: &str, analysis: &AnalysisResult) -> String {
    format!(
        "Based on the user's question and our initial analysis, generate 2-3 specific follow-up questions \
         that will help us better understand and reproduce the issue. The questions should be clear, concise, \
         and directly related to identifying the root cause or getting more context.\n\n\
         Original question:\n\"\"\"\n{report}\n\"\"\"\n\n\
         Initial analysis:\n\"\"\"\n{}\n\"\"\"\n\n\
         Return ONLY an array of follow-up questions in valid JSON format, like this:\n\
         [\"question 1\", \"question 2\", \"question 3\"]",
        pretty(analysis)
    )
}

pub fn plan_prompt(report: &str, analysis: &AnalysisResult) -> String {
    format!(
        "I need to create a test plan to recreate and verify the following issue:\n\n\
         Issue Description:\n{report}\n\n\
         Analysis:\n{}\n\n\
         Based on this information, please create a detailed test plan that includes:\n\
         1. What test files need to be created\n\
         2. Required environment setup\n\
         3. Steps to reproduce the issue\n\
         4. How to verify if the issue is reproduced successfully\n\
         5. Any additional tools or libraries needed\n\n\
         Return the test plan in JSON format with the following structure:\n\
         {{\n\
           \"testFiles\": [{{\"name\": \"filename\", \"purpose\": \"what this file tests\"}}],\n\
           \"environmentSetup\": [\"step 1\", \"step 2\"],\n\
           \"reproductionSteps\": [\"step 1\", \"step 2\"],\n\
           \"verificationCriteria\": [\"criterion 1\", \"criterion 2\"],\n\
           \"requiredTools\": [\"tool1\", \"tool2\"],\n\
           \"testApproach\": \"description of overall approach\"\n\
         }}",
        pretty(analysis)
    )
}

pub fn test_code_prompt(
    report: &str,
    analysis: &AnalysisResult,
    plan: &TestPlan,
    main_file: &str,
    setup_file: &str,
) -> String {
    format!(
        "Create test files to reproduce this issue:\n\n\
         Issue Description:\n{report}\n\n\
         Analysis:\n{}\n\n\
         Test plan:\n{}\n\n\
         I need two files:\n\
         1. {main_file}: a main test that reproduces the issue. It must exit with code 0 \
         when the issue is reproduced and a nonzero code otherwise.\n\
         2. {setup_file}: any necessary utilities or helper functions.\n\n\
         The code should be complete, realistic, and focus on reproducing the specific issue.\n\n\
         Format your response as JSON with this structure:\n\
         {{\n\
           \"mainTest\": \"full code for the main test file\",\n\
           \"setup\": \"full code for the setup file\"\n\
         }}",
        pretty(analysis),
        pretty(plan)
    )
}

pub fn summary_prompt(report: &str, outcome: &ReproductionOutcome) -> String {
    let exit_code = outcome
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Create a clear summary of the test results for this issue:\n\n\
         Issue Description:\n{report}\n\n\
         Test Results:\n\
         - Reproduced: {}\n\
         - Exit Code: {exit_code}\n\
         - Execution Time: {}ms\n\
         - Output: {}\n\
         - Errors: {}\n\n\
         Provide a concise, technical summary that explains:\n\
         1. Whether the issue was reproduced\n\
         2. What was observed during testing\n\
         3. Potential causes of the issue (if reproduced)\n\
         4. Recommendations for fixing the issue (if applicable)\n\
         5. Next steps for the maintainers",
        outcome.reproduced, outcome.duration_ms, outcome.stdout, outcome.stderr
    )
}

/// Deterministic summary used when the model cannot produce one
pub fn fallback_summary(issue_id: IssueId, outcome: &ReproductionOutcome) -> String {
    let status = if outcome.reproduced {
        "Successfully reproduced"
    } else {
        "Could not reproduce"
    };
    let observations = if outcome.stdout.trim().is_empty() {
        "No output recorded"
    } else {
        outcome.stdout.trim_end()
    };
    let mut summary = format!(
        "## Test Summary for Issue #{issue_id}\n\n\
         **Reproduction Status**: {status}\n\n\
         **Execution Time**: {}ms\n\n\
         **Observations**:\n{observations}\n\n",
        outcome.duration_ms
    );
    if !outcome.stderr.trim().is_empty() {
        summary.push_str(&format!("**Errors**:\n{}\n\n", outcome.stderr.trim_end()));
    }
    let next = if outcome.reproduced {
        "A maintainer should review the test case and investigate the root cause."
    } else {
        "Additional information may be needed to reproduce this issue."
    };
    summary.push_str(&format!("**Next Steps**: {next}\n"));
    summary
}
