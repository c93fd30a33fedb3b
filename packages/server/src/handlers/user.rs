use arena_common::{Difficulty, Verdict};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, Query as SeaQuery};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{
    contest_user, discussion, discussion_comment, problem, submission, test_case_result, user,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::shared::{Pagination, escape_like, page_bounds};
use crate::models::user::*;
use crate::seed::is_known_role;
use crate::state::AppState;
use crate::utils::hash;

const RECENT_SUBMISSIONS: u64 = 10;

async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn user_stats<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<UserStats, AppError> {
    let solved_ids: Vec<i32> = submission::Entity::find()
        .filter(submission::Column::UserId.eq(user_id))
        .filter(submission::Column::Verdict.eq(Verdict::Accepted))
        .select_only()
        .column(submission::Column::ProblemId)
        .distinct()
        .into_tuple()
        .all(db)
        .await?;

    let difficulties: Vec<Difficulty> = if solved_ids.is_empty() {
        vec![]
    } else {
        problem::Entity::find()
            .filter(problem::Column::Id.is_in(solved_ids))
            .select_only()
            .column(problem::Column::Difficulty)
            .into_tuple()
            .all(db)
            .await?
    };
    let solved_with = |d: Difficulty| difficulties.iter().filter(|&&x| x == d).count() as u64;

    let total_submissions = submission::Entity::find()
        .filter(submission::Column::UserId.eq(user_id))
        .count(db)
        .await?;
    let accepted_submissions = submission::Entity::find()
        .filter(submission::Column::UserId.eq(user_id))
        .filter(submission::Column::Verdict.eq(Verdict::Accepted))
        .count(db)
        .await?;
    let acceptance_rate = if total_submissions == 0 {
        0.0
    } else {
        accepted_submissions as f64 / total_submissions as f64
    };

    let recent = submission::Entity::find()
        .filter(submission::Column::UserId.eq(user_id))
        .find_also_related(problem::Entity)
        .order_by_desc(submission::Column::CreatedAt)
        .limit(RECENT_SUBMISSIONS)
        .all(db)
        .await?;

    let recent_submissions = recent
        .into_iter()
        .map(|(sub, prob)| RecentSubmission {
            id: sub.id,
            problem_id: sub.problem_id,
            problem_title: prob.map(|p| p.title).unwrap_or_default(),
            language: sub.language,
            status: sub.status,
            verdict: sub.verdict,
            created_at: sub.created_at,
        })
        .collect();

    Ok(UserStats {
        solved_total: difficulties.len() as u64,
        solved_easy: solved_with(Difficulty::Easy),
        solved_medium: solved_with(Difficulty::Medium),
        solved_hard: solved_with(Difficulty::Hard),
        total_submissions,
        accepted_submissions,
        acceptance_rate,
        recent_submissions,
    })
}

async fn build_profile<C: ConnectionTrait>(
    db: &C,
    user: user::Model,
) -> Result<UserProfileResponse, AppError> {
    let stats = user_stats(db, user.id).await?;
    Ok(UserProfileResponse {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        role: user.role,
        created_at: user.created_at,
        stats,
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Users",
    operation_id = "getUserProfile",
    summary = "Get a user's public profile",
    description = "Returns the profile with practice statistics: solved problems per difficulty, submission counts, acceptance rate and the 10 most recent submissions.",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserProfileResponse),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(id))]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<UserProfileResponse>, AppError> {
    let user = find_user(&state.db, id).await?;
    Ok(Json(build_profile(&state.db, user).await?))
}

#[utoipa::path(
    patch,
    path = "/me",
    tag = "Users",
    operation_id = "updateMyProfile",
    summary = "Update the caller's profile",
    description = "PATCH semantics: omitted fields are unchanged, `null` clears a field.",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserProfileResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserProfileResponse>, AppError> {
    validate_update_profile(&payload)?;

    let existing = find_user(&state.db, auth_user.user_id).await?;
    if payload == UpdateProfileRequest::default() {
        return Ok(Json(build_profile(&state.db, existing).await?));
    }

    let mut active: user::ActiveModel = existing.into();
    match payload.display_name {
        Some(Some(name)) => active.display_name = Set(Some(name.trim().to_string())),
        Some(None) => active.display_name = Set(None),
        None => {}
    }
    match payload.bio {
        Some(Some(bio)) => active.bio = Set(Some(bio)),
        Some(None) => active.bio = Set(None),
        None => {}
    }
    active.updated_at = Set(chrono::Utc::now());
    let model = active.update(&state.db).await?;

    Ok(Json(build_profile(&state.db, model).await?))
}

#[utoipa::path(
    put,
    path = "/me/password",
    tag = "Users",
    operation_id = "changeMyPassword",
    summary = "Change the caller's password",
    description = "Requires the current password. Existing tokens stay valid until they expire.",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Current password is wrong (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn change_password(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_change_password(&payload)?;

    let existing = find_user(&state.db, auth_user.user_id).await?;
    verify_current_password(&payload.current_password, &existing.password)?;

    let hashed = hash::hash_password(&payload.new_password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;
    let mut active: user::ActiveModel = existing.into();
    active.password = Set(hashed);
    active.updated_at = Set(chrono::Utc::now());
    active.update(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

fn verify_current_password(given: &str, stored: &str) -> Result<(), AppError> {
    let is_valid = hash::verify_password(given, stored)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;
    if !is_valid {
        return Err(AppError::Forbidden("Current password is incorrect".into()));
    }
    Ok(())
}

#[utoipa::path(
    delete,
    path = "/me",
    tag = "Users",
    operation_id = "deleteMyAccount",
    summary = "Delete the caller's account",
    description = "Deletes the account together with its submissions, discussions, comments and contest registrations. Problems authored by the user are kept without an author.",
    request_body = DeleteAccountRequest,
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Password is wrong (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn delete_account(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<DeleteAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;

    let existing = user::Entity::find_by_id(auth_user.user_id)
        .lock(sea_orm::sea_query::LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    verify_current_password(&payload.password, &existing.password)?;
    let user_id = existing.id;

    test_case_result::Entity::delete_many()
        .filter(
            test_case_result::Column::SubmissionId.in_subquery(
                SeaQuery::select()
                    .column(submission::Column::Id)
                    .from(submission::Entity)
                    .and_where(submission::Column::UserId.eq(user_id))
                    .to_owned(),
            ),
        )
        .exec(&txn)
        .await?;
    submission::Entity::delete_many()
        .filter(submission::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    // Comments on the user's threads go with the threads.
    discussion_comment::Entity::delete_many()
        .filter(
            Condition::any()
                .add(discussion_comment::Column::UserId.eq(user_id))
                .add(
                    discussion_comment::Column::DiscussionId.in_subquery(
                        SeaQuery::select()
                            .column(discussion::Column::Id)
                            .from(discussion::Entity)
                            .and_where(discussion::Column::UserId.eq(user_id))
                            .to_owned(),
                    ),
                ),
        )
        .exec(&txn)
        .await?;
    discussion::Entity::delete_many()
        .filter(discussion::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    contest_user::Entity::delete_many()
        .filter(contest_user::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    problem::Entity::update_many()
        .col_expr(problem::Column::AuthorId, Expr::value(Option::<i32>::None))
        .filter(problem::Column::AuthorId.eq(user_id))
        .exec(&txn)
        .await?;

    user::Entity::delete_by_id(user_id).exec(&txn).await?;
    txn.commit().await?;

    info!(user_id, "Account deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Users",
    operation_id = "listUsers",
    summary = "List users",
    description = "Paginated list of accounts, newest first. Requires `user:manage` permission.",
    params(UserListQuery),
    responses(
        (status = 200, description = "List of users", body = UserListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_users(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    auth_user.require_permission("user:manage")?;

    let (page, per_page) = page_bounds(query.page, query.per_page);

    let mut select = user::Entity::find();
    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(user::Column::Username)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }
    if let Some(ref role) = query.role {
        select = select.filter(user::Column::Role.eq(role.trim()));
    }

    let total = select.clone().count(&state.db).await?;

    let data = select
        .select_only()
        .column(user::Column::Id)
        .column(user::Column::Username)
        .column(user::Column::DisplayName)
        .column(user::Column::Role)
        .column(user::Column::CreatedAt)
        .order_by_desc(user::Column::CreatedAt)
        .order_by_desc(user::Column::Id)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .into_model::<UserListItem>()
        .all(&state.db)
        .await?;

    Ok(Json(UserListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
        },
    }))
}

#[utoipa::path(
    patch,
    path = "/{id}/role",
    tag = "Users",
    operation_id = "updateUserRole",
    summary = "Change a user's role",
    description = "Assigns one of the seeded roles. Takes effect at the user's next login. Requires `user:manage` permission.",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserListItem),
        (status = 400, description = "Unknown role (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id, role = %payload.role))]
pub async fn update_role(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateRoleRequest>,
) -> Result<Json<UserListItem>, AppError> {
    auth_user.require_permission("user:manage")?;

    let role = payload.role.trim();
    if !is_known_role(role) {
        return Err(AppError::Validation(format!("Unknown role '{role}'")));
    }

    let existing = find_user(&state.db, id).await?;
    let mut active: user::ActiveModel = existing.into();
    active.role = Set(role.to_string());
    active.updated_at = Set(chrono::Utc::now());
    let model = active.update(&state.db).await?;

    info!(user_id = model.id, role = %model.role, by = auth_user.user_id, "Role changed");

    Ok(Json(UserListItem {
        id: model.id,
        username: model.username,
        display_name: model.display_name,
        role: model.role,
        created_at: model.created_at,
    }))
}
