use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::shared::{Pagination, validate_body, validate_title};
use crate::error::AppError;

const MAX_CONTENT_BYTES: usize = 65_536;
const MAX_COMMENT_BYTES: usize = 8_192;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateDiscussionRequest {
    #[schema(example = "O(n) approach for Two Sum")]
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// Attach the thread to a problem. Omit for a general thread.
    pub problem_id: Option<i32>,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateDiscussionRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct DiscussionListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Only threads attached to this problem.
    pub problem_id: Option<i32>,
    /// Case-insensitive title search.
    pub search: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DiscussionResponse {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub problem_id: Option<i32>,
    pub user_id: i32,
    #[schema(example = "alice")]
    pub username: String,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DiscussionListItem {
    pub id: i32,
    pub title: String,
    pub problem_id: Option<i32>,
    pub user_id: i32,
    pub username: String,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DiscussionListResponse {
    pub data: Vec<DiscussionListItem>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateCommentRequest {
    pub content: String,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct CommentListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CommentResponse {
    pub id: i32,
    pub discussion_id: i32,
    pub user_id: i32,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CommentListResponse {
    pub data: Vec<CommentResponse>,
    pub pagination: Pagination,
}

pub fn validate_create_discussion(req: &CreateDiscussionRequest) -> Result<(), AppError> {
    validate_title(&req.title)?;
    validate_body(&req.content, "Content", MAX_CONTENT_BYTES)
}

pub fn validate_update_discussion(req: &UpdateDiscussionRequest) -> Result<(), AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }
    if let Some(ref content) = req.content {
        validate_body(content, "Content", MAX_CONTENT_BYTES)?;
    }
    Ok(())
}

pub fn validate_comment(content: &str) -> Result<(), AppError> {
    validate_body(content, "Comment", MAX_COMMENT_BYTES)
}
