use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Metadata of an editorial video hosted on an external media CDN.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "solution_video")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub problem_id: i32,
    #[sea_orm(belongs_to, from = "problem_id", to = "id")]
    pub problem: HasOne<super::problem::Entity>,

    pub uploaded_by: i32,

    pub video_url: String,
    /// CDN asset identifier.
    pub public_id: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: i32,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
