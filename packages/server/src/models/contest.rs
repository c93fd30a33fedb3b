use arena_common::Difficulty;
use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use super::shared::{
    Pagination, validate_body, validate_optional_position, validate_reorder_ids, validate_title,
};
use crate::error::AppError;
use crate::utils::contest::ContestPhase;
use crate::utils::leaderboard::LeaderboardRow;

fn default_true() -> bool {
    true
}
fn default_penalty() -> i32 {
    20
}
fn default_points() -> i32 {
    1
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateContestRequest {
    #[schema(example = "Weekly Round 12")]
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    /// Must be after `start_time`.
    pub end_time: DateTime<Utc>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    #[schema(example = json!(["No sharing of solutions", "Any language allowed"]))]
    pub rules: Vec<String>,
    /// Minutes per rejected attempt on a solved problem. Default: 20.
    #[serde(default = "default_penalty")]
    pub penalty_minutes: i32,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateContestRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_public: Option<bool>,
    pub rules: Option<Vec<String>>,
    pub penalty_minutes: Option<i32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct AddContestProblemRequest {
    pub problem_id: i32,
    #[schema(example = "A")]
    pub label: String,
    pub position: Option<i32>,
    /// Default: 1.
    #[serde(default = "default_points")]
    pub points: i32,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateContestProblemRequest {
    pub label: Option<String>,
    pub position: Option<i32>,
    pub points: Option<i32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct AddParticipantRequest {
    pub user_id: i32,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ReorderContestProblemsRequest {
    /// Ordered list of problem_ids. Positions assigned 0, 1, 2… by array index.
    /// Must contain exactly the problem_ids currently in the contest.
    pub problem_ids: Vec<i32>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ContestListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Case-insensitive title search.
    pub search: Option<String>,
    /// Only contests in this phase.
    pub phase: Option<ContestPhase>,
    /// `start_time` (default), `created_at`, or `title`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestResponse {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_public: bool,
    pub rules: Vec<String>,
    pub penalty_minutes: i32,
    pub created_by: i32,
    pub phase: ContestPhase,
    pub problem_count: u64,
    pub participant_count: u64,
    /// Whether the caller is a participant. False for anonymous callers.
    pub is_registered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromQueryResult)]
pub struct ContestRow {
    pub id: i32,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestListItem {
    pub id: i32,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_public: bool,
    pub phase: ContestPhase,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestListResponse {
    pub data: Vec<ContestListItem>,
    pub pagination: Pagination,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestProblemResponse {
    pub contest_id: i32,
    pub problem_id: i32,
    #[schema(example = "A")]
    pub label: String,
    pub position: i32,
    pub points: i32,
    pub problem_title: String,
    pub difficulty: Option<Difficulty>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestParticipantResponse {
    pub contest_id: i32,
    pub user_id: i32,
    pub username: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LeaderboardProblem {
    pub problem_id: i32,
    pub label: String,
    pub points: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LeaderboardResponse {
    pub contest_id: i32,
    pub phase: ContestPhase,
    pub penalty_minutes: i32,
    /// Column order for the per-problem cells.
    pub problems: Vec<LeaderboardProblem>,
    pub rows: Vec<LeaderboardRow>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestProblemStats {
    pub problem_id: i32,
    pub label: String,
    /// Participants with at least one judged submission.
    pub attempted_users: u64,
    /// Participants with an Accepted submission.
    pub solved_users: u64,
    pub submissions: u64,
    pub accepted: u64,
    /// accepted / submissions, 0 when there are none.
    pub acceptance_rate: f64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContestStatsResponse {
    pub contest_id: i32,
    pub participants: u64,
    pub submissions: u64,
    pub accepted_submissions: u64,
    pub problems: Vec<ContestProblemStats>,
}

/// Decode the stored rules array, ignoring non-string entries.
pub fn rules_from_json(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn rules_to_json(rules: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        rules
            .iter()
            .map(|r| serde_json::Value::String(r.trim().to_string()))
            .collect(),
    )
}

fn validate_rules(rules: &[String]) -> Result<(), AppError> {
    if rules.len() > 50 {
        return Err(AppError::Validation("At most 50 rules are allowed".into()));
    }
    if rules
        .iter()
        .any(|r| r.trim().is_empty() || r.chars().count() > 500)
    {
        return Err(AppError::Validation("Rules must be 1-500 characters".into()));
    }
    Ok(())
}

fn validate_penalty(penalty: i32) -> Result<(), AppError> {
    if !(0..=1440).contains(&penalty) {
        return Err(AppError::Validation(
            "penalty_minutes must be 0-1440".into(),
        ));
    }
    Ok(())
}

fn validate_points(points: i32) -> Result<(), AppError> {
    if !(0..=10_000).contains(&points) {
        return Err(AppError::Validation("Points must be 0-10000".into()));
    }
    Ok(())
}

fn validate_label(label: &str) -> Result<(), AppError> {
    let label = label.trim();
    if label.is_empty() || label.chars().count() > 10 {
        return Err(AppError::Validation("Label must be 1-10 characters".into()));
    }
    Ok(())
}

pub fn validate_create_contest(req: &CreateContestRequest) -> Result<(), AppError> {
    validate_title(&req.title)?;
    validate_body(&req.description, "Description", 1_000_000)?;
    if req.end_time <= req.start_time {
        return Err(AppError::Validation(
            "end_time must be after start_time".into(),
        ));
    }
    validate_rules(&req.rules)?;
    validate_penalty(req.penalty_minutes)
}

pub fn validate_update_contest(req: &UpdateContestRequest) -> Result<(), AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }
    if let Some(ref description) = req.description {
        validate_body(description, "Description", 1_000_000)?;
    }
    if let (Some(start), Some(end)) = (req.start_time, req.end_time)
        && end <= start
    {
        return Err(AppError::Validation(
            "end_time must be after start_time".into(),
        ));
    }
    if let Some(ref rules) = req.rules {
        validate_rules(rules)?;
    }
    if let Some(penalty) = req.penalty_minutes {
        validate_penalty(penalty)?;
    }
    Ok(())
}

pub fn validate_add_contest_problem(req: &AddContestProblemRequest) -> Result<(), AppError> {
    validate_label(&req.label)?;
    validate_points(req.points)?;
    validate_optional_position(req.position)
}

pub fn validate_reorder_contest_problems(
    req: &ReorderContestProblemsRequest,
) -> Result<(), AppError> {
    validate_reorder_ids(&req.problem_ids, "problem_id")
}

pub fn validate_update_contest_problem(req: &UpdateContestProblemRequest) -> Result<(), AppError> {
    if let Some(ref label) = req.label {
        validate_label(label)?;
    }
    if let Some(points) = req.points {
        validate_points(points)?;
    }
    validate_optional_position(req.position)
}
