use std::collections::{BTreeMap, BTreeSet};

use arena_common::Difficulty;
use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use super::shared::{Pagination, escape_like};
use super::shared::{
    double_option, validate_body, validate_optional_position, validate_reorder_ids,
    validate_title,
};

const MAX_TAGS: usize = 10;
const MAX_STARTER_CODE_BYTES: usize = 65_536;

fn default_time_limit() -> i32 {
    1000
}
fn default_memory_limit() -> i32 {
    262_144
}
fn default_true() -> bool {
    true
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateProblemRequest {
    #[schema(example = "Two Sum")]
    pub title: String,
    /// Markdown statement.
    pub description: String,
    pub difficulty: Difficulty,
    /// Case-insensitive, stored lower-cased. At most 10.
    #[serde(default)]
    #[schema(example = json!(["array", "hash-table"]))]
    pub tags: Vec<String>,
    /// Milliseconds, 1-15000. Default: 1000.
    #[serde(default = "default_time_limit")]
    pub time_limit: i32,
    /// Kilobytes, 2048-512000. Default: 262144.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: i32,
    /// Language key to starter code.
    #[serde(default)]
    #[schema(example = json!({"python": "def solve():\n    pass\n"}))]
    pub starter_code: BTreeMap<String, String>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub is_public: bool,
    /// Test cases created together with the problem, in order.
    #[serde(default)]
    pub test_cases: Vec<CreateTestCaseRequest>,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateProblemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    /// Replaces the whole tag set.
    pub tags: Option<Vec<String>>,
    pub time_limit: Option<i32>,
    pub memory_limit: Option<i32>,
    /// Replaces the whole starter code map.
    pub starter_code: Option<BTreeMap<String, String>>,
    pub is_public: Option<bool>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SampleTestCase {
    pub id: i32,
    pub input: String,
    pub expected_output: String,
    pub explanation: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProblemResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "Two Sum")]
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    #[schema(example = 1000)]
    pub time_limit: i32,
    #[schema(example = 262144)]
    pub memory_limit: i32,
    pub starter_code: BTreeMap<String, String>,
    pub is_public: bool,
    pub author_id: Option<i32>,
    /// Sample test cases ordered by position.
    pub samples: Vec<SampleTestCase>,
    pub has_solution_video: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromQueryResult)]
pub struct ProblemRow {
    pub id: i32,
    pub title: String,
    pub difficulty: Difficulty,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProblemListItem {
    pub id: i32,
    pub title: String,
    pub difficulty: Difficulty,
    pub is_public: bool,
    pub tags: Vec<String>,
    /// Whether the caller has an Accepted submission. Null for anonymous callers.
    pub solved: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProblemListResponse {
    pub data: Vec<ProblemListItem>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ProblemListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Case-insensitive title search.
    pub search: Option<String>,
    pub difficulty: Option<Difficulty>,
    /// Only problems carrying this tag.
    #[param(example = "dp")]
    pub tag: Option<String>,
    /// `created_at` (default), `title`, or `difficulty`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct TagCount {
    #[schema(example = "dp")]
    pub tag: String,
    /// Problems visible to the caller that carry the tag.
    #[schema(example = 14)]
    pub count: i64,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateTestCaseRequest {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_sample: bool,
    pub position: Option<i32>,
    /// Shown with sample cases.
    pub explanation: Option<String>,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateTestCaseRequest {
    pub input: Option<String>,
    pub expected_output: Option<String>,
    pub is_sample: Option<bool>,
    pub position: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub explanation: Option<Option<String>>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ReorderTestCasesRequest {
    /// Ordered list of test_case_ids. Positions assigned 0, 1, 2, ... by array index.
    pub test_case_ids: Vec<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TestCaseResponse {
    pub id: i32,
    pub input: String,
    pub expected_output: String,
    pub is_sample: bool,
    pub explanation: Option<String>,
    pub position: i32,
    pub problem_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct TestCaseListItem {
    pub id: i32,
    pub is_sample: bool,
    pub position: i32,
    pub input_preview: String,
    pub output_preview: String,
    pub problem_id: i32,
    pub created_at: DateTime<Utc>,
}

impl From<crate::entity::test_case::Model> for TestCaseResponse {
    fn from(m: crate::entity::test_case::Model) -> Self {
        Self {
            id: m.id,
            input: m.input,
            expected_output: m.expected_output,
            is_sample: m.is_sample,
            explanation: m.explanation,
            position: m.position,
            problem_id: m.problem_id,
            created_at: m.created_at,
        }
    }
}

impl From<crate::entity::test_case::Model> for SampleTestCase {
    fn from(m: crate::entity::test_case::Model) -> Self {
        Self {
            id: m.id,
            input: m.input,
            expected_output: m.expected_output,
            explanation: m.explanation,
        }
    }
}

pub const PREVIEW_LENGTH: usize = 100;

pub fn truncate_preview(s: &str) -> String {
    match s.char_indices().nth(PREVIEW_LENGTH) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}

/// Trim, lower-case and de-duplicate tags, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, AppError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || tag.chars().count() > 32 {
            return Err(AppError::Validation("Tags must be 1-32 characters".into()));
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "At most {MAX_TAGS} tags are allowed"
        )));
    }
    Ok(out)
}

/// Decode the stored starter code object, ignoring non-string values.
pub fn starter_code_from_json(value: &serde_json::Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn starter_code_to_json(code: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        code.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

fn validate_limits(time_limit: Option<i32>, memory_limit: Option<i32>) -> Result<(), AppError> {
    if let Some(tl) = time_limit
        && !(1..=15_000).contains(&tl)
    {
        return Err(AppError::Validation("Time limit must be 1-15000 ms".into()));
    }
    if let Some(ml) = memory_limit
        && !(2048..=512_000).contains(&ml)
    {
        return Err(AppError::Validation(
            "Memory limit must be 2048-512000 KB".into(),
        ));
    }
    Ok(())
}

fn validate_starter_code(code: &BTreeMap<String, String>) -> Result<(), AppError> {
    for (language, source) in code {
        if language.trim().is_empty() || language.len() > 32 {
            return Err(AppError::Validation(
                "Starter code language keys must be 1-32 characters".into(),
            ));
        }
        if source.len() > MAX_STARTER_CODE_BYTES {
            return Err(AppError::Validation(format!(
                "Starter code for '{language}' exceeds {MAX_STARTER_CODE_BYTES} bytes"
            )));
        }
    }
    Ok(())
}

pub fn validate_create_problem(req: &CreateProblemRequest) -> Result<(), AppError> {
    validate_title(&req.title)?;
    validate_body(&req.description, "Description", 1_000_000)?;
    validate_limits(Some(req.time_limit), Some(req.memory_limit))?;
    validate_starter_code(&req.starter_code)?;
    normalize_tags(&req.tags)?;
    for tc in &req.test_cases {
        validate_create_test_case(tc)?;
    }
    Ok(())
}

pub fn validate_update_problem(req: &UpdateProblemRequest) -> Result<(), AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }
    if let Some(ref description) = req.description {
        validate_body(description, "Description", 1_000_000)?;
    }
    validate_limits(req.time_limit, req.memory_limit)?;
    if let Some(ref code) = req.starter_code {
        validate_starter_code(code)?;
    }
    if let Some(ref tags) = req.tags {
        normalize_tags(tags)?;
    }
    Ok(())
}

fn validate_explanation(explanation: Option<&str>) -> Result<(), AppError> {
    if let Some(text) = explanation
        && text.chars().count() > 10_000
    {
        return Err(AppError::Validation(
            "Explanation must be at most 10000 characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_create_test_case(req: &CreateTestCaseRequest) -> Result<(), AppError> {
    validate_optional_position(req.position)?;
    validate_explanation(req.explanation.as_deref())
}

pub fn validate_update_test_case(req: &UpdateTestCaseRequest) -> Result<(), AppError> {
    validate_optional_position(req.position)?;
    if let Some(Some(ref explanation)) = req.explanation {
        validate_explanation(Some(explanation))?;
    }
    Ok(())
}

pub fn validate_reorder_test_cases(req: &ReorderTestCasesRequest) -> Result<(), AppError> {
    validate_reorder_ids(&req.test_case_ids, "test_case_id")
}
