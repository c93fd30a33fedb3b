use arena_common::config::JudgeClientConfig;
use arena_common::{SubmissionStatus, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::shared::Pagination;
use crate::error::AppError;

/// Maximum size of a custom run input in bytes.
pub const MAX_CUSTOM_INPUT_SIZE: usize = 1_048_576;

/// Request body for creating a submission.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateSubmissionRequest {
    /// Language key (e.g., "cpp", "java", "python").
    #[schema(example = "cpp")]
    pub language: String,
    /// Source code.
    #[schema(example = "#include <iostream>\nint main() { return 0; }")]
    pub code: String,
}

/// Request body for running code without creating a submission.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RunRequest {
    #[schema(example = "python")]
    pub language: String,
    pub code: String,
    /// Run against this input instead of the sample test cases.
    pub custom_input: Option<String>,
}

/// Outcome of one case of a run.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RunCaseResult {
    pub input: String,
    /// Null for custom input.
    pub expected_output: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub verdict: Verdict,
    #[schema(example = 12)]
    pub time_used: Option<i32>,
    #[schema(example = 3100)]
    pub memory_used: Option<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RunResponse {
    /// Compiler output when the program did not compile. `cases` is then empty.
    pub compile_error: Option<String>,
    /// First non-accepted verdict, Accepted if all passed, null on compile error.
    pub verdict: Option<Verdict>,
    pub passed: i32,
    pub total: i32,
    pub cases: Vec<RunCaseResult>,
}

/// Query parameters for submission listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct SubmissionListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Filter by problem ID.
    pub problem_id: Option<i32>,
    /// Filter by user ID. Ignored without `submission:view_all` unless it is the caller.
    pub user_id: Option<i32>,
    /// Filter by contest ID.
    pub contest_id: Option<i32>,
    /// Filter by language.
    #[param(example = "cpp")]
    pub language: Option<String>,
    /// Filter by status.
    pub status: Option<SubmissionStatus>,
    /// Filter by verdict.
    pub verdict: Option<Verdict>,
    /// Sort direction on `created_at`: `asc` or `desc` (default).
    #[param(example = "desc")]
    pub sort_order: Option<String>,
}

/// Full submission details.
#[derive(Serialize, utoipa::ToSchema)]
pub struct SubmissionResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "cpp")]
    pub language: String,
    /// Source code. Only returned to the owner and to `submission:view_all` holders.
    pub code: Option<String>,
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    #[schema(example = 7)]
    pub passed_cases: i32,
    #[schema(example = 10)]
    pub total_cases: i32,
    /// Max over cases, milliseconds.
    pub time_used: Option<i32>,
    /// Max over cases, kilobytes.
    pub memory_used: Option<i32>,
    pub compile_output: Option<String>,
    /// Set when the judge could not finish the submission.
    pub error_message: Option<String>,
    pub user_id: i32,
    #[schema(example = "alice")]
    pub username: String,
    pub problem_id: i32,
    #[schema(example = "Two Sum")]
    pub problem_title: String,
    /// Contest ID if this is a contest submission, null otherwise.
    pub contest_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub judged_at: Option<DateTime<Utc>>,
    pub test_case_results: Vec<TestCaseResultResponse>,
}

/// Result for a single test case.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TestCaseResultResponse {
    pub test_case_id: i32,
    pub verdict: Verdict,
    pub time_used: Option<i32>,
    pub memory_used: Option<i32>,
    pub is_sample: bool,
    /// Program output, shown for sample cases or to `submission:view_all` holders.
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Submission summary for list views (code omitted).
#[derive(Serialize, utoipa::ToSchema)]
pub struct SubmissionListItem {
    pub id: i32,
    pub language: String,
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    pub passed_cases: i32,
    pub total_cases: i32,
    pub time_used: Option<i32>,
    pub memory_used: Option<i32>,
    pub user_id: i32,
    pub username: String,
    pub problem_id: i32,
    pub problem_title: String,
    pub contest_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Paginated list of submissions.
#[derive(Serialize, utoipa::ToSchema)]
pub struct SubmissionListResponse {
    pub data: Vec<SubmissionListItem>,
    pub pagination: Pagination,
}

fn validate_source(
    language: &str,
    code: &str,
    max_size: usize,
    judge: &JudgeClientConfig,
) -> Result<(), AppError> {
    let language = language.trim();
    if language.is_empty() {
        return Err(AppError::Validation("Language is required".into()));
    }
    if judge.language_id(language).is_none() {
        return Err(AppError::Validation(format!(
            "Unsupported language '{language}'. Supported: {}",
            judge.language_keys().join(", ")
        )));
    }
    if code.trim().is_empty() {
        return Err(AppError::Validation("Code must not be empty".into()));
    }
    if code.len() > max_size {
        return Err(AppError::Validation(format!(
            "Code size ({} bytes) exceeds maximum ({} bytes)",
            code.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate a submission creation request.
pub fn validate_create_submission(
    req: &CreateSubmissionRequest,
    max_size: usize,
    judge: &JudgeClientConfig,
) -> Result<(), AppError> {
    validate_source(&req.language, &req.code, max_size, judge)
}

pub fn validate_run(
    req: &RunRequest,
    max_size: usize,
    judge: &JudgeClientConfig,
) -> Result<(), AppError> {
    validate_source(&req.language, &req.code, max_size, judge)?;
    if let Some(ref input) = req.custom_input
        && input.len() > MAX_CUSTOM_INPUT_SIZE
    {
        return Err(AppError::Validation(format!(
            "Custom input exceeds {MAX_CUSTOM_INPUT_SIZE} bytes"
        )));
    }
    Ok(())
}
