use serde::{Deserialize, Serialize};

use crate::{SubmissionStatus, Verdict};

/// One input/expected-output pair sent to the judge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInput {
    pub input: String,
    /// `None` for custom runs where only the program output is of interest.
    pub expected_output: Option<String>,
}

/// Everything the judge needs to execute a program.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language key as used by the API (e.g. "cpp", "python").
    pub language: String,
    pub source: String,
    /// Time limit in milliseconds
    pub time_limit_ms: i32,
    /// Memory limit in kilobytes
    pub memory_limit_kb: i32,
    pub cases: Vec<CaseInput>,
}

/// Result of one case execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub verdict: Verdict,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Wall time in milliseconds.
    pub time_used: Option<i32>,
    /// Peak memory in kilobytes.
    pub memory_used: Option<i32>,
}

/// Outcome of a whole execution request.
///
/// When `compile_error` is set no case was run and `cases` is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub compile_error: Option<String>,
    pub cases: Vec<CaseOutcome>,
}

impl ExecutionReport {
    pub fn compile_error(output: impl Into<String>) -> Self {
        Self {
            compile_error: Some(output.into()),
            cases: vec![],
        }
    }
}

/// Aggregated view of an [`ExecutionReport`], as stored on a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JudgeSummary {
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    pub passed: i32,
    pub total: i32,
    pub time_used: Option<i32>,
    pub memory_used: Option<i32>,
    pub compile_output: Option<String>,
}

/// Fold per-case outcomes into the submission-level result.
///
/// The overall verdict is the verdict of the first case that was not accepted,
/// so the order of `report.cases` must match the order of the test cases.
/// A `SystemError` on any case makes the whole submission a `SystemError`.
pub fn summarize(report: &ExecutionReport) -> JudgeSummary {
    if let Some(ref output) = report.compile_error {
        return JudgeSummary {
            status: SubmissionStatus::CompilationError,
            verdict: None,
            passed: 0,
            total: 0,
            time_used: None,
            memory_used: None,
            compile_output: Some(output.clone()),
        };
    }

    if report.cases.is_empty() {
        return JudgeSummary {
            status: SubmissionStatus::SystemError,
            verdict: None,
            passed: 0,
            total: 0,
            time_used: None,
            memory_used: None,
            compile_output: None,
        };
    }

    let passed = report
        .cases
        .iter()
        .filter(|c| c.verdict.is_accepted())
        .count() as i32;
    let verdict = report
        .cases
        .iter()
        .map(|c| c.verdict)
        .find(|v| !v.is_accepted())
        .unwrap_or(Verdict::Accepted);

    // An internal failure on any case says nothing about the program.
    let status = if report
        .cases
        .iter()
        .any(|c| c.verdict == Verdict::SystemError)
    {
        SubmissionStatus::SystemError
    } else {
        SubmissionStatus::Judged
    };

    JudgeSummary {
        status,
        verdict: Some(verdict),
        passed,
        total: report.cases.len() as i32,
        time_used: report.cases.iter().filter_map(|c| c.time_used).max(),
        memory_used: report.cases.iter().filter_map(|c| c.memory_used).max(),
        compile_output: None,
    }
}

/// Compare program output with the expected output, ignoring trailing
/// whitespace on each line and trailing blank lines.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    fn normalized(s: &str) -> Vec<&str> {
        let mut lines: Vec<&str> = s.lines().map(str::trim_end).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }
    normalized(actual) == normalized(expected)
}
