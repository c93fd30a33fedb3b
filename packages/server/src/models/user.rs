use arena_common::{SubmissionStatus, Verdict};
use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use super::auth::validate_password;
use super::shared::{Pagination, double_option};
use crate::error::AppError;

/// Public profile with practice statistics.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserProfileResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "alice_wonder")]
    pub username: String,
    #[schema(example = "Alice")]
    pub display_name: Option<String>,
    pub bio: Option<String>,
    #[schema(example = "contestant")]
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub stats: UserStats,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserStats {
    /// Distinct problems with an Accepted submission.
    #[schema(example = 12)]
    pub solved_total: u64,
    #[schema(example = 7)]
    pub solved_easy: u64,
    #[schema(example = 4)]
    pub solved_medium: u64,
    #[schema(example = 1)]
    pub solved_hard: u64,
    #[schema(example = 40)]
    pub total_submissions: u64,
    #[schema(example = 18)]
    pub accepted_submissions: u64,
    /// Accepted submissions / total submissions, 0 when there are none.
    #[schema(example = 0.45)]
    pub acceptance_rate: f64,
    /// The 10 most recent submissions, newest first.
    pub recent_submissions: Vec<RecentSubmission>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RecentSubmission {
    #[schema(example = 99)]
    pub id: i32,
    #[schema(example = 3)]
    pub problem_id: i32,
    #[schema(example = "Two Sum")]
    pub problem_title: String,
    #[schema(example = "cpp")]
    pub language: String,
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    pub created_at: DateTime<Utc>,
}

/// PATCH body for the caller's profile. `null` clears a field.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "Alice")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub bio: Option<Option<String>>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct DeleteAccountRequest {
    /// Current password, required to confirm the deletion.
    pub password: String,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct UserListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Case-insensitive username search.
    pub search: Option<String>,
    /// Filter by role name.
    #[param(example = "contestant")]
    pub role: Option<String>,
}

#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct UserListItem {
    pub id: i32,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserListItem>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateRoleRequest {
    /// One of `admin`, `problem_setter`, `contestant`.
    #[schema(example = "problem_setter")]
    pub role: String,
}

pub fn validate_update_profile(req: &UpdateProfileRequest) -> Result<(), AppError> {
    if let Some(Some(ref name)) = req.display_name {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > 64 {
            return Err(AppError::Validation(
                "Display name must be 1-64 characters".into(),
            ));
        }
    }
    if let Some(Some(ref bio)) = req.bio
        && bio.chars().count() > 2000
    {
        return Err(AppError::Validation(
            "Bio must be at most 2000 characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_change_password(req: &ChangePasswordRequest) -> Result<(), AppError> {
    if req.current_password.is_empty() {
        return Err(AppError::Validation(
            "Current password must not be empty".into(),
        ));
    }
    validate_password(&req.new_password)
}
