use sea_orm::sea_query::{Index, IndexCreateStatement, OnConflict, PostgresQueryBuilder};
use sea_orm::*;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::entity::{
    contest_problem, discussion, discussion_comment, role, role_permission, submission, user,
};
use crate::utils::hash;

/// Default roles seeded on startup.
const DEFAULT_ROLES: &[&str] = &["admin", "problem_setter", "contestant"];

/// Default role-permission mappings seeded on startup.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    // Admin: all permissions
    ("admin", "submission:submit"),
    ("admin", "submission:view_all"),
    ("admin", "submission:rejudge"),
    ("admin", "problem:create"),
    ("admin", "problem:edit"),
    ("admin", "problem:delete"),
    ("admin", "contest:create"),
    ("admin", "contest:manage"),
    ("admin", "contest:delete"),
    ("admin", "discussion:post"),
    ("admin", "discussion:moderate"),
    ("admin", "assistant:chat"),
    ("admin", "user:manage"),
    // Problem setter
    ("problem_setter", "submission:submit"),
    ("problem_setter", "submission:view_all"),
    ("problem_setter", "submission:rejudge"),
    ("problem_setter", "problem:create"),
    ("problem_setter", "problem:edit"),
    ("problem_setter", "contest:create"),
    ("problem_setter", "contest:manage"),
    ("problem_setter", "discussion:post"),
    ("problem_setter", "discussion:moderate"),
    ("problem_setter", "assistant:chat"),
    // Contestant
    ("contestant", "submission:submit"),
    ("contestant", "discussion:post"),
    ("contestant", "assistant:chat"),
];

/// Seed the `role` and `role_permission` tables with defaults.
pub async fn seed_role_permissions(db: &DatabaseConnection) -> Result<(), DbErr> {
    let mut roles_inserted = 0u32;
    for &name in DEFAULT_ROLES {
        let model = role::ActiveModel {
            name: Set(name.to_string()),
        };

        let result = role::Entity::insert(model)
            .on_conflict(OnConflict::column(role::Column::Name).do_nothing().to_owned())
            .exec_without_returning(db)
            .await;

        match result {
            Ok(n) if n > 0 => roles_inserted += 1,
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if roles_inserted > 0 {
        info!("Seeded {} new roles", roles_inserted);
    }

    let mut perms_inserted = 0u32;
    for &(role, permission) in DEFAULT_MAPPINGS {
        let model = role_permission::ActiveModel {
            role: Set(role.to_string()),
            permission: Set(permission.to_string()),
        };

        let result = role_permission::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    role_permission::Column::Role,
                    role_permission::Column::Permission,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await;

        match result {
            Ok(n) if n > 0 => perms_inserted += 1,
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if perms_inserted > 0 {
        info!("Seeded {} new role-permission mappings", perms_inserted);
    }

    Ok(())
}

/// Whether `name` is one of the seeded roles.
pub fn is_known_role(name: &str) -> bool {
    DEFAULT_ROLES.contains(&name)
}

/// Create the configured administrator account if it does not exist yet.
pub async fn ensure_bootstrap_admin(db: &DatabaseConnection, auth: &AuthConfig) -> Result<(), DbErr> {
    let (Some(username), Some(password)) = (
        auth.bootstrap_admin_username.as_deref(),
        auth.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let hashed = hash::hash_password(password)
        .map_err(|e| DbErr::Custom(format!("Password hash error: {e}")))?;
    let now = chrono::Utc::now();
    user::ActiveModel {
        username: Set(username.to_string()),
        password: Set(hashed),
        role: Set(role::ADMIN_ROLE.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(username, "Created bootstrap admin account");
    Ok(())
}

async fn create_index(db: &DatabaseConnection, name: &str, stmt: &mut IndexCreateStatement) {
    let sql = stmt.if_not_exists().name(name).to_string(PostgresQueryBuilder);
    match db.execute_unprepared(&sql).await {
        Ok(_) => info!("Ensured index {} exists", name),
        Err(e) => warn!("Failed to create index {}: {}", name, e),
    }
}

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite non-unique indexes,
/// so we create them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Rate limiting: COUNT(*) WHERE user_id = ? AND created_at > ?
    create_index(
        db,
        "idx_submission_user_created",
        Index::create()
            .table(submission::Entity)
            .col(submission::Column::UserId)
            .col(submission::Column::CreatedAt),
    )
    .await;

    // Leaderboard and contest submission lists.
    create_index(
        db,
        "idx_submission_contest_created",
        Index::create()
            .table(submission::Entity)
            .col(submission::Column::ContestId)
            .col(submission::Column::CreatedAt),
    )
    .await;

    // Per-problem submission history of a user.
    create_index(
        db,
        "idx_submission_problem_user",
        Index::create()
            .table(submission::Entity)
            .col(submission::Column::ProblemId)
            .col(submission::Column::UserId),
    )
    .await;

    create_index(
        db,
        "idx_contest_problem_problem",
        Index::create()
            .table(contest_problem::Entity)
            .col(contest_problem::Column::ProblemId),
    )
    .await;

    create_index(
        db,
        "idx_discussion_problem_created",
        Index::create()
            .table(discussion::Entity)
            .col(discussion::Column::ProblemId)
            .col(discussion::Column::CreatedAt),
    )
    .await;

    create_index(
        db,
        "idx_comment_discussion_created",
        Index::create()
            .table(discussion_comment::Entity)
            .col(discussion_comment::Column::DiscussionId)
            .col(discussion_comment::Column::CreatedAt),
    )
    .await;

    Ok(())
}
