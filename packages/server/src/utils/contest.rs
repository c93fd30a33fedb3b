use chrono::{DateTime, Utc};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entity::{contest, contest_problem, contest_user, problem};
use crate::error::AppError;
use crate::extractors::auth::AuthUser;

/// Where a contest is in its lifecycle relative to a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContestPhase {
    Upcoming,
    Running,
    Ended,
}

impl ContestPhase {
    pub fn at(contest: &contest::Model, now: DateTime<Utc>) -> Self {
        Self::between(contest.start_time, contest.end_time, now)
    }

    /// The end instant still counts as running.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < start {
            Self::Upcoming
        } else if now <= end {
            Self::Running
        } else {
            Self::Ended
        }
    }
}

/// Verify the caller can see the given contest.
///
/// Returns 404 rather than 403 for private contests so their IDs cannot be enumerated.
pub async fn check_contest_access<C: ConnectionTrait>(
    db: &C,
    viewer: Option<&AuthUser>,
    contest: &contest::Model,
) -> Result<(), AppError> {
    if contest.is_public {
        return Ok(());
    }
    if let Some(auth_user) = viewer {
        if auth_user.has_permission("contest:manage") {
            return Ok(());
        }
        if is_participant(db, contest.id, auth_user.user_id).await? {
            return Ok(());
        }
    }
    Err(AppError::NotFound("Contest not found".into()))
}

/// Look up a contest by ID, returning 404 if not found.
pub async fn find_contest<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<contest::Model, AppError> {
    contest::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Contest not found".into()))
}

pub async fn find_contest_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<contest::Model, AppError> {
    contest::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Contest not found".into()))
}

/// Look up a contest-problem link, returning 404 if the problem is not in the contest.
pub async fn find_contest_problem<C: ConnectionTrait>(
    db: &C,
    contest_id: i32,
    problem_id: i32,
) -> Result<contest_problem::Model, AppError> {
    contest_problem::Entity::find_by_id((contest_id, problem_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Contest problem not found".into()))
}

pub async fn is_participant<C: ConnectionTrait>(
    db: &C,
    contest_id: i32,
    user_id: i32,
) -> Result<bool, AppError> {
    Ok(contest_user::Entity::find_by_id((contest_id, user_id))
        .one(db)
        .await?
        .is_some())
}

/// Check that a contest has started, returning 400 if not.
/// Users with `contest:manage` bypass the check.
pub fn require_contest_started(
    viewer: Option<&AuthUser>,
    contest: &contest::Model,
) -> Result<(), AppError> {
    if viewer.is_some_and(|u| u.has_permission("contest:manage")) {
        return Ok(());
    }
    if Utc::now() < contest.start_time {
        return Err(AppError::Validation("Contest has not started yet".into()));
    }
    Ok(())
}

/// Participants may act on contest problems only while the contest is running.
pub async fn require_running_participant<C: ConnectionTrait>(
    db: &C,
    auth_user: &AuthUser,
    contest: &contest::Model,
) -> Result<(), AppError> {
    if !is_participant(db, contest.id, auth_user.user_id).await? {
        if contest.is_public {
            return Err(AppError::Forbidden(
                "You must register for this contest first".into(),
            ));
        }
        return Err(AppError::NotFound("Contest not found".into()));
    }
    match ContestPhase::at(contest, Utc::now()) {
        ContestPhase::Upcoming => Err(AppError::Validation("Contest has not started yet".into())),
        ContestPhase::Ended => Err(AppError::Validation("Contest has ended".into())),
        ContestPhase::Running => Ok(()),
    }
}

/// Check if a user can access a problem through any started contest.
pub async fn can_access_problem_via_contest<C: ConnectionTrait>(
    db: &C,
    auth_user: &AuthUser,
    problem_id: i32,
) -> Result<bool, AppError> {
    let contest_ids: Vec<i32> = contest_problem::Entity::find()
        .filter(contest_problem::Column::ProblemId.eq(problem_id))
        .select_only()
        .column(contest_problem::Column::ContestId)
        .into_tuple()
        .all(db)
        .await?;

    if contest_ids.is_empty() {
        return Ok(false);
    }

    if auth_user.has_permission("contest:manage") {
        return Ok(true);
    }

    let now = Utc::now();

    let has_public = contest::Entity::find()
        .filter(contest::Column::Id.is_in(contest_ids.clone()))
        .filter(contest::Column::IsPublic.eq(true))
        .filter(contest::Column::StartTime.lte(now))
        .one(db)
        .await?
        .is_some();
    if has_public {
        return Ok(true);
    }

    let started_contest_ids: Vec<i32> = contest::Entity::find()
        .filter(contest::Column::Id.is_in(contest_ids))
        .filter(contest::Column::StartTime.lte(now))
        .select_only()
        .column(contest::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    if started_contest_ids.is_empty() {
        return Ok(false);
    }

    Ok(contest_user::Entity::find()
        .filter(contest_user::Column::ContestId.is_in(started_contest_ids))
        .filter(contest_user::Column::UserId.eq(auth_user.user_id))
        .one(db)
        .await?
        .is_some())
}

/// Load a problem the viewer is allowed to read.
///
/// Public problems are readable by anyone. Hidden problems are readable by problem
/// editors and through a started contest the viewer can access. Otherwise 404.
pub async fn find_readable_problem<C: ConnectionTrait>(
    db: &C,
    viewer: Option<&AuthUser>,
    problem_id: i32,
) -> Result<problem::Model, AppError> {
    let model = problem::Entity::find_by_id(problem_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".into()))?;

    if model.is_public {
        return Ok(model);
    }
    if let Some(auth_user) = viewer {
        if auth_user.has_any_permission(&["problem:create", "problem:edit"]) {
            return Ok(model);
        }
        if can_access_problem_via_contest(db, auth_user, problem_id).await? {
            return Ok(model);
        }
    }
    Err(AppError::NotFound("Problem not found".into()))
}

/// Whether the problem belongs to a contest that is currently running.
pub async fn in_running_contest<C: ConnectionTrait>(
    db: &C,
    problem_id: i32,
) -> Result<bool, AppError> {
    let now = Utc::now();
    let contest_ids: Vec<i32> = contest_problem::Entity::find()
        .filter(contest_problem::Column::ProblemId.eq(problem_id))
        .select_only()
        .column(contest_problem::Column::ContestId)
        .into_tuple()
        .all(db)
        .await?;
    if contest_ids.is_empty() {
        return Ok(false);
    }
    Ok(contest::Entity::find()
        .filter(contest::Column::Id.is_in(contest_ids))
        .filter(contest::Column::StartTime.lte(now))
        .filter(contest::Column::EndTime.gte(now))
        .one(db)
        .await?
        .is_some())
}
