use std::collections::{HashMap, HashSet};

use arena_common::{SubmissionStatus, Verdict};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, Query as SeaQuery};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{contest, contest_problem, contest_user, problem, submission, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::contest::*;
use crate::models::shared::{Pagination, escape_like, page_bounds, parse_sort_order};
use crate::state::AppState;
use crate::utils::contest::{
    ContestPhase, check_contest_access, find_contest, find_contest_for_update,
    find_contest_problem, is_participant, require_contest_started,
};
use crate::utils::leaderboard::{
    self, BoardParticipant, BoardProblem, BoardSubmission, LeaderboardInput,
};

#[utoipa::path(
    post,
    path = "/",
    tag = "Contests",
    operation_id = "createContest",
    summary = "Create a new contest",
    description = "Creates a new contest owned by the caller. Requires `contest:create` permission.",
    request_body = CreateContestRequest,
    responses(
        (status = 201, description = "Contest created", body = ContestResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(title = %payload.title))]
pub async fn create_contest(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateContestRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:create")?;
    validate_create_contest(&payload)?;

    let now = Utc::now();
    let new_contest = contest::ActiveModel {
        title: Set(payload.title.trim().to_string()),
        description: Set(payload.description),
        start_time: Set(payload.start_time),
        end_time: Set(payload.end_time),
        is_public: Set(payload.is_public),
        rules: Set(rules_to_json(&payload.rules)),
        penalty_minutes: Set(payload.penalty_minutes),
        created_by: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let model = new_contest.insert(&state.db).await?;
    info!(contest_id = model.id, "Contest created");

    let response = build_contest_response(&state.db, model, Some(&auth_user)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Contests",
    operation_id = "listContests",
    summary = "List contests with pagination and search",
    description = "Returns a paginated list of contests. Users with `contest:manage` see all contests; others see public contests and those they are registered for. Filter by `phase` (`upcoming`, `running`, `ended`). Sort by `start_time` (default), `created_at`, or `title`.",
    params(ContestListQuery),
    responses(
        (status = 200, description = "List of contests", body = ContestListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_contests(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ContestListQuery>,
) -> Result<Json<ContestListResponse>, AppError> {
    let (page, per_page) = page_bounds(query.page, query.per_page);
    let sort_order = parse_sort_order(query.sort_order.as_deref())?;
    let sort_column = match query.sort_by.as_deref().unwrap_or("start_time") {
        "start_time" => contest::Column::StartTime,
        "created_at" => contest::Column::CreatedAt,
        "title" => contest::Column::Title,
        _ => {
            return Err(AppError::Validation(
                "sort_by must be one of: start_time, created_at, title".into(),
            ));
        }
    };

    let mut select = contest::Entity::find();

    match auth_user {
        Some(ref u) if u.has_permission("contest:manage") => {}
        Some(ref u) => {
            select = select.filter(
                Condition::any()
                    .add(contest::Column::IsPublic.eq(true))
                    .add(
                        contest::Column::Id.in_subquery(
                            SeaQuery::select()
                                .column(contest_user::Column::ContestId)
                                .from(contest_user::Entity)
                                .and_where(contest_user::Column::UserId.eq(u.user_id))
                                .to_owned(),
                        ),
                    ),
            );
        }
        None => select = select.filter(contest::Column::IsPublic.eq(true)),
    }

    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(contest::Column::Title)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let now = Utc::now();
    select = match query.phase {
        Some(ContestPhase::Upcoming) => select.filter(contest::Column::StartTime.gt(now)),
        Some(ContestPhase::Running) => select
            .filter(contest::Column::StartTime.lte(now))
            .filter(contest::Column::EndTime.gte(now)),
        Some(ContestPhase::Ended) => select.filter(contest::Column::EndTime.lt(now)),
        None => select,
    };

    let total = select.clone().count(&state.db).await?;

    let rows = select
        .order_by(sort_column, sort_order)
        .order_by_asc(contest::Column::Id)
        .select_only()
        .column(contest::Column::Id)
        .column(contest::Column::Title)
        .column(contest::Column::StartTime)
        .column(contest::Column::EndTime)
        .column(contest::Column::IsPublic)
        .column(contest::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .into_model::<ContestRow>()
        .all(&state.db)
        .await?;

    let data = rows
        .into_iter()
        .map(|r| ContestListItem {
            phase: ContestPhase::between(r.start_time, r.end_time, now),
            id: r.id,
            title: r.title,
            start_time: r.start_time,
            end_time: r.end_time,
            is_public: r.is_public,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(ContestListResponse {
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
    get,
    path = "/{id}",
    tag = "Contests",
    operation_id = "getContest",
    summary = "Get a contest by ID",
    description = "Returns the contest with its phase, problem and participant counts and whether the caller is registered. Returns 404 (not 403) for inaccessible contests to prevent enumeration.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 200, description = "Contest details", body = ContestResponse),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %id))]
pub async fn get_contest(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ContestResponse>, AppError> {
    let model = find_contest(&state.db, id).await?;
    check_contest_access(&state.db, auth_user.as_ref(), &model).await?;
    Ok(Json(
        build_contest_response(&state.db, model, auth_user.as_ref()).await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Contests",
    operation_id = "updateContest",
    summary = "Update an existing contest",
    description = "Partially updates a contest using PATCH semantics. Requires `contest:manage` permission. An empty payload returns the current resource unchanged. end_time must stay after start_time even when only one of them is updated.",
    params(("id" = i32, Path, description = "Contest ID")),
    request_body = UpdateContestRequest,
    responses(
        (status = 200, description = "Contest updated", body = ContestResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %id))]
pub async fn update_contest(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateContestRequest>,
) -> Result<Json<ContestResponse>, AppError> {
    auth_user.require_permission("contest:manage")?;
    validate_update_contest(&payload)?;

    if payload == UpdateContestRequest::default() {
        let existing = find_contest(&state.db, id).await?;
        return Ok(Json(
            build_contest_response(&state.db, existing, Some(&auth_user)).await?,
        ));
    }

    let txn = state.db.begin().await?;
    let existing = find_contest_for_update(&txn, id).await?;

    let effective_start = payload.start_time.unwrap_or(existing.start_time);
    let effective_end = payload.end_time.unwrap_or(existing.end_time);
    if effective_end <= effective_start {
        return Err(AppError::Validation(
            "end_time must be after start_time".into(),
        ));
    }

    let mut active: contest::ActiveModel = existing.into();

    if let Some(ref title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(start_time) = payload.start_time {
        active.start_time = Set(start_time);
    }
    if let Some(end_time) = payload.end_time {
        active.end_time = Set(end_time);
    }
    if let Some(is_public) = payload.is_public {
        active.is_public = Set(is_public);
    }
    if let Some(ref rules) = payload.rules {
        active.rules = Set(rules_to_json(rules));
    }
    if let Some(penalty) = payload.penalty_minutes {
        active.penalty_minutes = Set(penalty);
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(
        build_contest_response(&state.db, model, Some(&auth_user)).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Contests",
    operation_id = "deleteContest",
    summary = "Delete a contest by ID",
    description = "Deletes a contest with its problem links and participant records. Contest submissions are kept as practice submissions. Requires `contest:delete` permission.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 204, description = "Contest deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %id))]
pub async fn delete_contest(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:delete")?;

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, id).await?;

    submission::Entity::update_many()
        .col_expr(submission::Column::ContestId, Expr::value(Option::<i32>::None))
        .filter(submission::Column::ContestId.eq(id))
        .exec(&txn)
        .await?;
    contest_problem::Entity::delete_many()
        .filter(contest_problem::Column::ContestId.eq(id))
        .exec(&txn)
        .await?;
    contest_user::Entity::delete_many()
        .filter(contest_user::Column::ContestId.eq(id))
        .exec(&txn)
        .await?;
    contest::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    info!(contest_id = id, by = auth_user.user_id, "Contest deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/problems",
    tag = "Contest Problems",
    operation_id = "addContestProblem",
    summary = "Add a problem to a contest",
    description = "Associates an existing problem with the contest under a label. Requires `contest:manage` permission. Labels are unique within the contest. Position is auto-assigned if omitted.",
    params(("id" = i32, Path, description = "Contest ID")),
    request_body = AddContestProblemRequest,
    responses(
        (status = 201, description = "Problem added to contest", body = ContestProblemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest or problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Problem or label already in contest (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %contest_id))]
pub async fn add_contest_problem(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
    AppJson(payload): AppJson<AddContestProblemRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:manage")?;
    validate_add_contest_problem(&payload)?;

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, contest_id).await?;

    let problem_model = problem::Entity::find_by_id(payload.problem_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".into()))?;

    if contest_problem::Entity::find_by_id((contest_id, payload.problem_id))
        .one(&txn)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Problem is already in this contest".into(),
        ));
    }

    let label = payload.label.trim().to_string();
    ensure_label_free(&txn, contest_id, &label).await?;

    let position = match payload.position {
        Some(p) => p,
        None => next_problem_position(&txn, contest_id).await?,
    };

    let model = contest_problem::ActiveModel {
        contest_id: Set(contest_id),
        problem_id: Set(payload.problem_id),
        label: Set(label),
        position: Set(position),
        points: Set(payload.points),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(contest_problem_response(model, Some(problem_model))),
    ))
}

#[utoipa::path(
    get,
    path = "/{id}/problems",
    tag = "Contest Problems",
    operation_id = "listContestProblems",
    summary = "List problems in a contest",
    description = "Returns the contest's problems ordered by position. Before the contest starts only users with `contest:manage` can see them.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 200, description = "List of contest problems", body = Vec<ContestProblemResponse>),
        (status = 400, description = "Contest has not started (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id))]
pub async fn list_contest_problems(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
) -> Result<Json<Vec<ContestProblemResponse>>, AppError> {
    let contest_model = find_contest(&state.db, contest_id).await?;
    check_contest_access(&state.db, auth_user.as_ref(), &contest_model).await?;
    require_contest_started(auth_user.as_ref(), &contest_model)?;

    let rows = contest_problem::Entity::find()
        .filter(contest_problem::Column::ContestId.eq(contest_id))
        .find_also_related(problem::Entity)
        .order_by_asc(contest_problem::Column::Position)
        .order_by_asc(contest_problem::Column::ProblemId)
        .all(&state.db)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(cp, prob)| contest_problem_response(cp, prob))
            .collect(),
    ))
}

#[utoipa::path(
    patch,
    path = "/{id}/problems/{problem_id}",
    tag = "Contest Problems",
    operation_id = "updateContestProblem",
    summary = "Update a contest problem's label, position or points",
    description = "Requires `contest:manage` permission. Returns 409 CONFLICT on duplicate labels.",
    params(
        ("id" = i32, Path, description = "Contest ID"),
        ("problem_id" = i32, Path, description = "Problem ID"),
    ),
    request_body = UpdateContestProblemRequest,
    responses(
        (status = 200, description = "Contest problem updated", body = ContestProblemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Duplicate label in contest (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %contest_id, problem_id = %problem_id))]
pub async fn update_contest_problem(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((contest_id, problem_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<UpdateContestProblemRequest>,
) -> Result<Json<ContestProblemResponse>, AppError> {
    auth_user.require_permission("contest:manage")?;
    validate_update_contest_problem(&payload)?;

    if payload == UpdateContestProblemRequest::default() {
        let cp = find_contest_problem(&state.db, contest_id, problem_id).await?;
        let prob = problem::Entity::find_by_id(problem_id).one(&state.db).await?;
        return Ok(Json(contest_problem_response(cp, prob)));
    }

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, contest_id).await?;
    let existing = find_contest_problem(&txn, contest_id, problem_id).await?;

    if let Some(ref new_label) = payload.label {
        let label = new_label.trim();
        if label != existing.label {
            ensure_label_free(&txn, contest_id, label).await?;
        }
    }

    let mut active: contest_problem::ActiveModel = existing.into();
    if let Some(ref label) = payload.label {
        active.label = Set(label.trim().to_string());
    }
    if let Some(position) = payload.position {
        active.position = Set(position);
    }
    if let Some(points) = payload.points {
        active.points = Set(points);
    }

    let model = active.update(&txn).await?;
    let prob = problem::Entity::find_by_id(model.problem_id).one(&txn).await?;
    txn.commit().await?;

    Ok(Json(contest_problem_response(model, prob)))
}

#[utoipa::path(
    delete,
    path = "/{id}/problems/{problem_id}",
    tag = "Contest Problems",
    operation_id = "removeContestProblem",
    summary = "Remove a problem from a contest",
    description = "Removes the association between a problem and the contest. The problem itself is not deleted. Requires `contest:manage` permission.",
    params(
        ("id" = i32, Path, description = "Contest ID"),
        ("problem_id" = i32, Path, description = "Problem ID"),
    ),
    responses(
        (status = 204, description = "Problem removed from contest"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id, problem_id = %problem_id))]
pub async fn remove_contest_problem(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((contest_id, problem_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:manage")?;

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, contest_id).await?;
    let cp = find_contest_problem(&txn, contest_id, problem_id).await?;
    let active: contest_problem::ActiveModel = cp.into();
    active.delete(&txn).await?;
    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/{id}/problems/reorder",
    tag = "Contest Problems",
    operation_id = "reorderContestProblems",
    summary = "Reorder problems in a contest",
    description = "Replaces the ordering of all problems in a contest. The ID array must contain exactly the problems currently in the contest. Positions are assigned by array index starting at 0. Requires `contest:manage` permission.",
    params(("id" = i32, Path, description = "Contest ID")),
    request_body = ReorderContestProblemsRequest,
    responses(
        (status = 204, description = "Contest problems reordered"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %contest_id))]
pub async fn reorder_contest_problems(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
    AppJson(payload): AppJson<ReorderContestProblemsRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:manage")?;
    validate_reorder_contest_problems(&payload)?;

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, contest_id).await?;

    let existing: HashSet<i32> = contest_problem::Entity::find()
        .filter(contest_problem::Column::ContestId.eq(contest_id))
        .select_only()
        .column(contest_problem::Column::ProblemId)
        .into_tuple::<i32>()
        .all(&txn)
        .await?
        .into_iter()
        .collect();

    let payload_set: HashSet<i32> = payload.problem_ids.iter().copied().collect();
    if existing != payload_set {
        return Err(AppError::Validation(
            "problem_ids must contain exactly the problems currently in the contest".into(),
        ));
    }

    for (i, &problem_id) in payload.problem_ids.iter().enumerate() {
        let position = i32::try_from(i)
            .map_err(|_| AppError::Validation("Too many problems to reorder".into()))?;
        contest_problem::Entity::update_many()
            .filter(contest_problem::Column::ContestId.eq(contest_id))
            .filter(contest_problem::Column::ProblemId.eq(problem_id))
            .col_expr(contest_problem::Column::Position, Expr::value(position))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/participants",
    tag = "Contest Participants",
    operation_id = "addParticipant",
    summary = "Add a participant to a contest",
    description = "Adds a user to the contest as a participant. Works for private contests too. Requires `contest:manage` permission.",
    params(("id" = i32, Path, description = "Contest ID")),
    request_body = AddParticipantRequest,
    responses(
        (status = 201, description = "Participant added", body = ContestParticipantResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest or user not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "User already a participant (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %contest_id))]
pub async fn add_participant(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
    AppJson(payload): AppJson<AddParticipantRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:manage")?;

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, contest_id).await?;

    let target_user = user::Entity::find_by_id(payload.user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let new_cu = contest_user::ActiveModel {
        contest_id: Set(contest_id),
        user_id: Set(payload.user_id),
        registered_at: Set(Utc::now()),
    };

    match new_cu.insert(&txn).await {
        Ok(model) => {
            txn.commit().await?;
            Ok((
                StatusCode::CREATED,
                Json(ContestParticipantResponse {
                    contest_id: model.contest_id,
                    user_id: model.user_id,
                    username: target_user.username,
                    registered_at: model.registered_at,
                }),
            ))
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(AppError::Conflict("Already a participant".into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/{id}/participants",
    tag = "Contest Participants",
    operation_id = "listParticipants",
    summary = "List participants of a contest",
    description = "Returns all participants in the contest, ordered by registration time.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 200, description = "List of participants", body = Vec<ContestParticipantResponse>),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id))]
pub async fn list_participants(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
) -> Result<Json<Vec<ContestParticipantResponse>>, AppError> {
    let contest_model = find_contest(&state.db, contest_id).await?;
    check_contest_access(&state.db, auth_user.as_ref(), &contest_model).await?;

    let rows = contest_user::Entity::find()
        .filter(contest_user::Column::ContestId.eq(contest_id))
        .find_also_related(user::Entity)
        .order_by_asc(contest_user::Column::RegisteredAt)
        .all(&state.db)
        .await?;

    let items = rows
        .into_iter()
        .map(|(cu, usr)| ContestParticipantResponse {
            contest_id: cu.contest_id,
            user_id: cu.user_id,
            username: usr.map(|u| u.username).unwrap_or_default(),
            registered_at: cu.registered_at,
        })
        .collect();

    Ok(Json(items))
}

#[utoipa::path(
    delete,
    path = "/{id}/participants/{user_id}",
    tag = "Contest Participants",
    operation_id = "removeParticipant",
    summary = "Remove a participant from a contest",
    description = "Removes a participant from the contest. Their submissions are kept. Requires `contest:manage` permission.",
    params(
        ("id" = i32, Path, description = "Contest ID"),
        ("user_id" = i32, Path, description = "User ID"),
    ),
    responses(
        (status = 204, description = "Participant removed"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Participant not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id, user_id = %user_id))]
pub async fn remove_participant(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((contest_id, user_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("contest:manage")?;

    let txn = state.db.begin().await?;
    find_contest_for_update(&txn, contest_id).await?;
    let cu = contest_user::Entity::find_by_id((contest_id, user_id))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Participant not found".into()))?;

    let active: contest_user::ActiveModel = cu.into();
    active.delete(&txn).await?;
    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/register",
    tag = "Contest Participants",
    operation_id = "registerForContest",
    summary = "Self-register for a public contest",
    description = "Registers the caller for a public contest. Allowed until the contest ends. Non-public contests return 404 to prevent enumeration.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 201, description = "Registered for contest"),
        (status = 400, description = "Contest has ended (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Already registered (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id))]
pub async fn register_for_contest(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let txn = state.db.begin().await?;
    let contest_model = find_contest_for_update(&txn, contest_id).await?;

    if !contest_model.is_public {
        return Err(AppError::NotFound("Contest not found".into()));
    }
    if ContestPhase::at(&contest_model, now) == ContestPhase::Ended {
        return Err(AppError::Validation("Contest has ended".into()));
    }

    let new_cu = contest_user::ActiveModel {
        contest_id: Set(contest_id),
        user_id: Set(auth_user.user_id),
        registered_at: Set(now),
    };

    match new_cu.insert(&txn).await {
        Ok(_) => {
            txn.commit().await?;
            info!(contest_id, user_id = auth_user.user_id, "Registered for contest");
            Ok(StatusCode::CREATED)
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(AppError::Conflict("Already registered".into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/{id}/register",
    tag = "Contest Participants",
    operation_id = "unregisterFromContest",
    summary = "Self-unregister from a contest",
    description = "Removes the caller's registration. Only allowed before the contest starts.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 204, description = "Unregistered from contest"),
        (status = 400, description = "Contest already started (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not registered or contest not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id))]
pub async fn unregister_from_contest(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;
    let contest_model = find_contest_for_update(&txn, contest_id).await?;
    let cu = contest_user::Entity::find_by_id((contest_id, auth_user.user_id))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Not registered for this contest".into()))?;

    if ContestPhase::at(&contest_model, Utc::now()) != ContestPhase::Upcoming {
        return Err(AppError::Validation(
            "Cannot unregister after the contest has started".into(),
        ));
    }

    let active: contest_user::ActiveModel = cu.into();
    active.delete(&txn).await?;
    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/leaderboard",
    tag = "Contests",
    operation_id = "getContestLeaderboard",
    summary = "Contest standings",
    description = "ICPC-style standings: score is the sum of points of solved problems, penalty is the solve minute plus `penalty_minutes` per rejected attempt on each solved problem. Ordered by score, then penalty, then username. Available once the contest has started.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 200, description = "Leaderboard", body = LeaderboardResponse),
        (status = 400, description = "Contest has not started (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id))]
pub async fn get_leaderboard(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let contest_model = find_contest(&state.db, contest_id).await?;
    check_contest_access(&state.db, auth_user.as_ref(), &contest_model).await?;
    require_contest_started(auth_user.as_ref(), &contest_model)?;

    let problems = board_problems(&state.db, contest_id).await?;

    let participants: Vec<BoardParticipant> = contest_user::Entity::find()
        .filter(contest_user::Column::ContestId.eq(contest_id))
        .find_also_related(user::Entity)
        .all(&state.db)
        .await?
        .into_iter()
        .filter_map(|(cu, usr)| {
            usr.map(|u| BoardParticipant {
                user_id: cu.user_id,
                username: u.username,
            })
        })
        .collect();

    let submissions: Vec<BoardSubmission> = submission::Entity::find()
        .filter(submission::Column::ContestId.eq(contest_id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|s| BoardSubmission {
            id: s.id,
            user_id: s.user_id,
            problem_id: s.problem_id,
            status: s.status,
            verdict: s.verdict,
            created_at: s.created_at,
        })
        .collect();

    let rows = leaderboard::compute(&LeaderboardInput {
        start_time: contest_model.start_time,
        end_time: contest_model.end_time,
        penalty_minutes: contest_model.penalty_minutes,
        problems: &problems,
        participants: &participants,
        submissions: &submissions,
    });

    Ok(Json(LeaderboardResponse {
        contest_id,
        phase: ContestPhase::at(&contest_model, Utc::now()),
        penalty_minutes: contest_model.penalty_minutes,
        problems: problems
            .into_iter()
            .map(|p| LeaderboardProblem {
                problem_id: p.problem_id,
                label: p.label,
                points: p.points,
            })
            .collect(),
        rows,
    }))
}

#[utoipa::path(
    get,
    path = "/{id}/stats",
    tag = "Contests",
    operation_id = "getContestStats",
    summary = "Contest statistics",
    description = "Participant and submission counts with per-problem attempt, solve and acceptance figures. Only submissions from participants count. Available once the contest has started.",
    params(("id" = i32, Path, description = "Contest ID")),
    responses(
        (status = 200, description = "Contest statistics", body = ContestStatsResponse),
        (status = 400, description = "Contest has not started (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(contest_id = %contest_id))]
pub async fn get_contest_stats(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
) -> Result<Json<ContestStatsResponse>, AppError> {
    let contest_model = find_contest(&state.db, contest_id).await?;
    check_contest_access(&state.db, auth_user.as_ref(), &contest_model).await?;
    require_contest_started(auth_user.as_ref(), &contest_model)?;

    let participant_ids: HashSet<i32> = contest_user::Entity::find()
        .filter(contest_user::Column::ContestId.eq(contest_id))
        .select_only()
        .column(contest_user::Column::UserId)
        .into_tuple::<i32>()
        .all(&state.db)
        .await?
        .into_iter()
        .collect();

    let rows: Vec<(i32, i32, SubmissionStatus, Option<Verdict>)> = submission::Entity::find()
        .filter(submission::Column::ContestId.eq(contest_id))
        .select_only()
        .column(submission::Column::UserId)
        .column(submission::Column::ProblemId)
        .column(submission::Column::Status)
        .column(submission::Column::Verdict)
        .into_tuple()
        .all(&state.db)
        .await?;

    let problems = board_problems(&state.db, contest_id).await?;
    let stats = tally_contest_stats(&problems, &participant_ids, &rows);

    Ok(Json(ContestStatsResponse {
        contest_id,
        participants: participant_ids.len() as u64,
        submissions: stats.iter().map(|p| p.submissions).sum(),
        accepted_submissions: stats.iter().map(|p| p.accepted).sum(),
        problems: stats,
    }))
}

/// Per-problem figures from `(user_id, problem_id, status, verdict)` rows.
fn tally_contest_stats(
    problems: &[BoardProblem],
    participants: &HashSet<i32>,
    rows: &[(i32, i32, SubmissionStatus, Option<Verdict>)],
) -> Vec<ContestProblemStats> {
    #[derive(Default)]
    struct Tally {
        attempted: HashSet<i32>,
        solved: HashSet<i32>,
        submissions: u64,
        accepted: u64,
    }

    let mut tallies: HashMap<i32, Tally> = HashMap::new();
    for &(user_id, problem_id, status, verdict) in rows {
        if !participants.contains(&user_id) {
            continue;
        }
        let tally = tallies.entry(problem_id).or_default();
        tally.submissions += 1;
        if matches!(
            status,
            SubmissionStatus::Judged | SubmissionStatus::CompilationError
        ) {
            tally.attempted.insert(user_id);
        }
        if verdict == Some(Verdict::Accepted) {
            tally.accepted += 1;
            tally.solved.insert(user_id);
        }
    }

    problems
        .iter()
        .map(|p| {
            let tally = tallies.remove(&p.problem_id).unwrap_or_default();
            let acceptance_rate = if tally.submissions == 0 {
                0.0
            } else {
                tally.accepted as f64 / tally.submissions as f64
            };
            ContestProblemStats {
                problem_id: p.problem_id,
                label: p.label.clone(),
                attempted_users: tally.attempted.len() as u64,
                solved_users: tally.solved.len() as u64,
                submissions: tally.submissions,
                accepted: tally.accepted,
                acceptance_rate,
            }
        })
        .collect()
}

async fn board_problems<C: ConnectionTrait>(
    db: &C,
    contest_id: i32,
) -> Result<Vec<BoardProblem>, AppError> {
    Ok(contest_problem::Entity::find()
        .filter(contest_problem::Column::ContestId.eq(contest_id))
        .order_by_asc(contest_problem::Column::Position)
        .order_by_asc(contest_problem::Column::ProblemId)
        .all(db)
        .await?
        .into_iter()
        .map(|cp| BoardProblem {
            problem_id: cp.problem_id,
            label: cp.label,
            points: cp.points,
        })
        .collect())
}

async fn build_contest_response<C: ConnectionTrait>(
    db: &C,
    model: contest::Model,
    viewer: Option<&AuthUser>,
) -> Result<ContestResponse, AppError> {
    let problem_count = contest_problem::Entity::find()
        .filter(contest_problem::Column::ContestId.eq(model.id))
        .count(db)
        .await?;
    let participant_count = contest_user::Entity::find()
        .filter(contest_user::Column::ContestId.eq(model.id))
        .count(db)
        .await?;
    let is_registered = match viewer {
        Some(u) => is_participant(db, model.id, u.user_id).await?,
        None => false,
    };

    Ok(ContestResponse {
        phase: ContestPhase::at(&model, Utc::now()),
        rules: rules_from_json(&model.rules),
        id: model.id,
        title: model.title,
        description: model.description,
        start_time: model.start_time,
        end_time: model.end_time,
        is_public: model.is_public,
        penalty_minutes: model.penalty_minutes,
        created_by: model.created_by,
        problem_count,
        participant_count,
        is_registered,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn contest_problem_response(
    cp: contest_problem::Model,
    prob: Option<problem::Model>,
) -> ContestProblemResponse {
    let (problem_title, difficulty) = match prob {
        Some(p) => (p.title, Some(p.difficulty)),
        None => (String::new(), None),
    };
    ContestProblemResponse {
        contest_id: cp.contest_id,
        problem_id: cp.problem_id,
        label: cp.label,
        position: cp.position,
        points: cp.points,
        problem_title,
        difficulty,
    }
}

async fn ensure_label_free<C: ConnectionTrait>(
    db: &C,
    contest_id: i32,
    label: &str,
) -> Result<(), AppError> {
    let taken = contest_problem::Entity::find()
        .filter(contest_problem::Column::ContestId.eq(contest_id))
        .filter(contest_problem::Column::Label.eq(label))
        .one(db)
        .await?
        .is_some();
    if taken {
        return Err(AppError::Conflict(format!(
            "Label '{label}' is already used in this contest"
        )));
    }
    Ok(())
}

async fn next_problem_position<C: ConnectionTrait>(
    db: &C,
    contest_id: i32,
) -> Result<i32, AppError> {
    let max_pos: Option<i32> = contest_problem::Entity::find()
        .filter(contest_problem::Column::ContestId.eq(contest_id))
        .select_only()
        .column_as(contest_problem::Column::Position.max(), "max_pos")
        .into_tuple::<Option<i32>>()
        .one(db)
        .await?
        .flatten();
    max_pos
        .unwrap_or(-1)
        .checked_add(1)
        .ok_or_else(|| AppError::Validation("Position overflow".into()))
}
