use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::solution_video;
use crate::error::AppError;

/// Metadata of a video already uploaded to the media CDN.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct SolutionVideoRequest {
    #[schema(example = "https://cdn.example.com/videos/two-sum.mp4")]
    pub video_url: String,
    /// CDN asset identifier.
    #[schema(example = "editorials/two-sum")]
    pub public_id: String,
    pub thumbnail_url: Option<String>,
    #[schema(example = 540)]
    pub duration_seconds: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SolutionVideoResponse {
    pub id: i32,
    pub problem_id: i32,
    pub uploaded_by: i32,
    pub video_url: String,
    pub public_id: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: i32,
    pub created_at: DateTime<Utc>,
}

impl From<solution_video::Model> for SolutionVideoResponse {
    fn from(m: solution_video::Model) -> Self {
        Self {
            id: m.id,
            problem_id: m.problem_id,
            uploaded_by: m.uploaded_by,
            video_url: m.video_url,
            public_id: m.public_id,
            thumbnail_url: m.thumbnail_url,
            duration_seconds: m.duration_seconds,
            created_at: m.created_at,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    (url.starts_with("https://") || url.starts_with("http://"))
        && url.len() <= 2048
        && !url.contains(char::is_whitespace)
}

pub fn validate_solution_video(req: &SolutionVideoRequest) -> Result<(), AppError> {
    if !is_http_url(&req.video_url) {
        return Err(AppError::Validation(
            "video_url must be an http(s) URL".into(),
        ));
    }
    if let Some(ref thumb) = req.thumbnail_url
        && !is_http_url(thumb)
    {
        return Err(AppError::Validation(
            "thumbnail_url must be an http(s) URL".into(),
        ));
    }
    let public_id = req.public_id.trim();
    if public_id.is_empty() || public_id.len() > 256 {
        return Err(AppError::Validation(
            "public_id must be 1-256 characters".into(),
        ));
    }
    if !(1..=36_000).contains(&req.duration_seconds) {
        return Err(AppError::Validation(
            "duration_seconds must be 1-36000".into(),
        ));
    }
    Ok(())
}
