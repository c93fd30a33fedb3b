use arena_common::Difficulty;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "problem")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String, // in Markdown
    pub difficulty: Difficulty,
    pub time_limit: i32,   // in milliseconds
    pub memory_limit: i32, // in kilobytes

    /// Object mapping language key to starter code.
    #[sea_orm(column_type = "JsonBinary")]
    pub starter_code: serde_json::Value,

    pub is_public: bool,

    /// NULL once the author's account is deleted.
    pub author_id: Option<i32>,

    #[sea_orm(has_many)]
    pub tags: HasMany<super::problem_tag::Entity>,

    #[sea_orm(has_many)]
    pub test_cases: HasMany<super::test_case::Entity>,

    #[sea_orm(has_many)]
    pub submissions: HasMany<super::submission::Entity>,

    #[sea_orm(has_many)]
    pub discussions: HasMany<super::discussion::Entity>,

    #[sea_orm(has_one)]
    pub solution_video: HasOne<super::solution_video::Entity>,

    #[sea_orm(has_many, via = "contest_problem")]
    pub contests: HasMany<super::contest::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
