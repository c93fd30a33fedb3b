use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, Query as SeaQuery};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{discussion, discussion_comment, problem, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::discussion::*;
use crate::models::shared::{Pagination, escape_like, page_bounds};
use crate::state::AppState;
use crate::utils::contest::find_readable_problem;

/// Author of the thread or comment, or a moderator.
fn require_author_or_moderator(auth_user: &AuthUser, author_id: i32) -> Result<(), AppError> {
    if auth_user.user_id == author_id || auth_user.has_permission("discussion:moderate") {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

/// Load a discussion the viewer may read. Threads on unreadable problems are 404.
async fn find_readable_discussion<C: ConnectionTrait>(
    db: &C,
    viewer: Option<&AuthUser>,
    id: i32,
) -> Result<discussion::Model, AppError> {
    let model = discussion::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Discussion not found".into()))?;
    if let Some(problem_id) = model.problem_id {
        find_readable_problem(db, viewer, problem_id)
            .await
            .map_err(|_| AppError::NotFound("Discussion not found".into()))?;
    }
    Ok(model)
}

async fn comment_counts<C: ConnectionTrait>(
    db: &C,
    discussion_ids: Vec<i32>,
) -> Result<HashMap<i32, u64>, AppError> {
    if discussion_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i32, i64)> = discussion_comment::Entity::find()
        .filter(discussion_comment::Column::DiscussionId.is_in(discussion_ids))
        .select_only()
        .column(discussion_comment::Column::DiscussionId)
        .column_as(Expr::cust("COUNT(*)"), "count")
        .group_by(discussion_comment::Column::DiscussionId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, count)| (id, Ord::max(count, 0) as u64))
        .collect())
}

async fn build_discussion_response<C: ConnectionTrait>(
    db: &C,
    model: discussion::Model,
) -> Result<DiscussionResponse, AppError> {
    let username = user::Entity::find_by_id(model.user_id)
        .one(db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();
    let comment_count = discussion_comment::Entity::find()
        .filter(discussion_comment::Column::DiscussionId.eq(model.id))
        .count(db)
        .await?;

    Ok(DiscussionResponse {
        id: model.id,
        title: model.title,
        content: model.content,
        problem_id: model.problem_id,
        user_id: model.user_id,
        username,
        comment_count,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn comment_response(model: discussion_comment::Model, username: String) -> CommentResponse {
    CommentResponse {
        id: model.id,
        discussion_id: model.discussion_id,
        user_id: model.user_id,
        username,
        content: model.content,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Discussions",
    operation_id = "listDiscussions",
    summary = "List discussion threads",
    description = "Returns threads newest first. Threads on problems the caller cannot read are omitted. Filter by `problem_id` or search titles case-insensitively.",
    params(DiscussionListQuery),
    responses(
        (status = 200, description = "List of threads", body = DiscussionListResponse),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_discussions(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<DiscussionListQuery>,
) -> Result<Json<DiscussionListResponse>, AppError> {
    let (page, per_page) = page_bounds(query.page, query.per_page);

    let mut select = discussion::Entity::find();

    if let Some(problem_id) = query.problem_id {
        find_readable_problem(&state.db, auth_user.as_ref(), problem_id).await?;
        select = select.filter(discussion::Column::ProblemId.eq(problem_id));
    } else if !auth_user
        .as_ref()
        .is_some_and(|u| u.has_any_permission(&["problem:create", "problem:edit"]))
    {
        select = select.filter(
            Condition::any()
                .add(discussion::Column::ProblemId.is_null())
                .add(
                    discussion::Column::ProblemId.in_subquery(
                        SeaQuery::select()
                            .column(problem::Column::Id)
                            .from(problem::Entity)
                            .and_where(problem::Column::IsPublic.eq(true))
                            .to_owned(),
                    ),
                ),
        );
    }

    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(discussion::Column::Title)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;

    let rows = select
        .find_also_related(user::Entity)
        .order_by_desc(discussion::Column::CreatedAt)
        .order_by_desc(discussion::Column::Id)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let counts = comment_counts(&state.db, rows.iter().map(|(d, _)| d.id).collect()).await?;

    let data = rows
        .into_iter()
        .map(|(d, usr)| DiscussionListItem {
            comment_count: counts.get(&d.id).copied().unwrap_or(0),
            id: d.id,
            title: d.title,
            problem_id: d.problem_id,
            user_id: d.user_id,
            username: usr.map(|u| u.username).unwrap_or_default(),
            created_at: d.created_at,
        })
        .collect();

    Ok(Json(DiscussionListResponse {
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
    post,
    path = "/",
    tag = "Discussions",
    operation_id = "createDiscussion",
    summary = "Start a discussion thread",
    description = "Creates a thread, optionally attached to a problem the caller can read. Requires `discussion:post` permission.",
    request_body = CreateDiscussionRequest,
    responses(
        (status = 201, description = "Thread created", body = DiscussionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id = ?payload.problem_id))]
pub async fn create_discussion(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateDiscussionRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("discussion:post")?;
    validate_create_discussion(&payload)?;

    if let Some(problem_id) = payload.problem_id {
        find_readable_problem(&state.db, Some(&auth_user), problem_id).await?;
    }

    let now = Utc::now();
    let model = discussion::ActiveModel {
        title: Set(payload.title.trim().to_string()),
        content: Set(payload.content),
        problem_id: Set(payload.problem_id),
        user_id: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!(discussion_id = model.id, "Discussion created");

    Ok((
        StatusCode::CREATED,
        Json(build_discussion_response(&state.db, model).await?),
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Discussions",
    operation_id = "getDiscussion",
    summary = "Get a discussion thread",
    params(("id" = i32, Path, description = "Discussion ID")),
    responses(
        (status = 200, description = "Thread details", body = DiscussionResponse),
        (status = 404, description = "Discussion not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(discussion_id = %id))]
pub async fn get_discussion(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DiscussionResponse>, AppError> {
    let model = find_readable_discussion(&state.db, auth_user.as_ref(), id).await?;
    Ok(Json(build_discussion_response(&state.db, model).await?))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Discussions",
    operation_id = "updateDiscussion",
    summary = "Edit a discussion thread",
    description = "Only the author or a user with `discussion:moderate` permission may edit. An empty payload returns the thread unchanged.",
    params(("id" = i32, Path, description = "Discussion ID")),
    request_body = UpdateDiscussionRequest,
    responses(
        (status = 200, description = "Thread updated", body = DiscussionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Discussion not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(discussion_id = %id))]
pub async fn update_discussion(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateDiscussionRequest>,
) -> Result<Json<DiscussionResponse>, AppError> {
    validate_update_discussion(&payload)?;

    let existing = find_readable_discussion(&state.db, Some(&auth_user), id).await?;
    require_author_or_moderator(&auth_user, existing.user_id)?;

    if payload == UpdateDiscussionRequest::default() {
        return Ok(Json(build_discussion_response(&state.db, existing).await?));
    }

    let mut active: discussion::ActiveModel = existing.into();
    if let Some(ref title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(content) = payload.content {
        active.content = Set(content);
    }
    active.updated_at = Set(Utc::now());
    let model = active.update(&state.db).await?;

    Ok(Json(build_discussion_response(&state.db, model).await?))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Discussions",
    operation_id = "deleteDiscussion",
    summary = "Delete a discussion thread",
    description = "Deletes the thread and all its comments. Only the author or a user with `discussion:moderate` permission may delete.",
    params(("id" = i32, Path, description = "Discussion ID")),
    responses(
        (status = 204, description = "Thread deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Discussion not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(discussion_id = %id))]
pub async fn delete_discussion(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_readable_discussion(&state.db, Some(&auth_user), id).await?;
    require_author_or_moderator(&auth_user, existing.user_id)?;

    let txn = state.db.begin().await?;
    discussion_comment::Entity::delete_many()
        .filter(discussion_comment::Column::DiscussionId.eq(id))
        .exec(&txn)
        .await?;
    discussion::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    info!(discussion_id = id, by = auth_user.user_id, "Discussion deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/comments",
    tag = "Discussions",
    operation_id = "listComments",
    summary = "List comments of a thread",
    description = "Returns comments oldest first.",
    params(
        ("id" = i32, Path, description = "Discussion ID"),
        CommentListQuery,
    ),
    responses(
        (status = 200, description = "List of comments", body = CommentListResponse),
        (status = 404, description = "Discussion not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, query), fields(discussion_id = %id))]
pub async fn list_comments(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<CommentListResponse>, AppError> {
    find_readable_discussion(&state.db, auth_user.as_ref(), id).await?;
    let (page, per_page) = page_bounds(query.page, query.per_page);

    let select =
        discussion_comment::Entity::find().filter(discussion_comment::Column::DiscussionId.eq(id));
    let total = select.clone().count(&state.db).await?;

    let data = select
        .find_also_related(user::Entity)
        .order_by_asc(discussion_comment::Column::CreatedAt)
        .order_by_asc(discussion_comment::Column::Id)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|(c, usr)| comment_response(c, usr.map(|u| u.username).unwrap_or_default()))
        .collect();

    Ok(Json(CommentListResponse {
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
    post,
    path = "/{id}/comments",
    tag = "Discussions",
    operation_id = "createComment",
    summary = "Comment on a thread",
    description = "Requires `discussion:post` permission.",
    params(("id" = i32, Path, description = "Discussion ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Discussion not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(discussion_id = %id))]
pub async fn create_comment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("discussion:post")?;
    validate_comment(&payload.content)?;
    find_readable_discussion(&state.db, Some(&auth_user), id).await?;

    let now = Utc::now();
    let model = discussion_comment::ActiveModel {
        content: Set(payload.content),
        discussion_id: Set(id),
        user_id: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(comment_response(model, auth_user.username.clone())),
    ))
}

async fn find_comment<C: ConnectionTrait>(
    db: &C,
    discussion_id: i32,
    comment_id: i32,
) -> Result<discussion_comment::Model, AppError> {
    discussion_comment::Entity::find_by_id(comment_id)
        .filter(discussion_comment::Column::DiscussionId.eq(discussion_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".into()))
}

#[utoipa::path(
    patch,
    path = "/{id}/comments/{comment_id}",
    tag = "Discussions",
    operation_id = "updateComment",
    summary = "Edit a comment",
    description = "Only the author or a user with `discussion:moderate` permission may edit.",
    params(
        ("id" = i32, Path, description = "Discussion ID"),
        ("comment_id" = i32, Path, description = "Comment ID"),
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Comment updated", body = CommentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Comment not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(discussion_id = %id, comment_id = %comment_id))]
pub async fn update_comment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>, AppError> {
    validate_comment(&payload.content)?;
    find_readable_discussion(&state.db, Some(&auth_user), id).await?;
    let existing = find_comment(&state.db, id, comment_id).await?;
    require_author_or_moderator(&auth_user, existing.user_id)?;

    let mut active: discussion_comment::ActiveModel = existing.into();
    active.content = Set(payload.content);
    active.updated_at = Set(Utc::now());
    let model = active.update(&state.db).await?;

    let username = user::Entity::find_by_id(model.user_id)
        .one(&state.db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();
    Ok(Json(comment_response(model, username)))
}

#[utoipa::path(
    delete,
    path = "/{id}/comments/{comment_id}",
    tag = "Discussions",
    operation_id = "deleteComment",
    summary = "Delete a comment",
    description = "Only the author or a user with `discussion:moderate` permission may delete.",
    params(
        ("id" = i32, Path, description = "Discussion ID"),
        ("comment_id" = i32, Path, description = "Comment ID"),
    ),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Comment not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(discussion_id = %id, comment_id = %comment_id))]
pub async fn delete_comment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    find_readable_discussion(&state.db, Some(&auth_user), id).await?;
    let existing = find_comment(&state.db, id, comment_id).await?;
    require_author_or_moderator(&auth_user, existing.user_id)?;

    let active: discussion_comment::ActiveModel = existing.into();
    active.delete(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}
