use std::collections::{HashMap, HashSet};

use axum::Json;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, LockType, Query as SeaQuery};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{
    contest_problem, discussion, problem, problem_tag, solution_video, submission, test_case,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::problem::*;
use crate::models::shared::{page_bounds, parse_sort_order};
use crate::models::video::{SolutionVideoRequest, SolutionVideoResponse, validate_solution_video};
use crate::state::AppState;
use crate::utils::contest::find_readable_problem;

const DIFFICULTY_RANK: &str =
    "CASE \"problem\".\"difficulty\" WHEN 'easy' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END";

fn is_problem_editor(viewer: Option<&AuthUser>) -> bool {
    viewer.is_some_and(|u| u.has_any_permission(&["problem:create", "problem:edit"]))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Problems",
    operation_id = "createProblem",
    summary = "Create a new problem",
    description = "Creates a problem, its tags and optionally its initial test cases in one transaction. Requires `problem:create` permission.",
    request_body = CreateProblemRequest,
    responses(
        (status = 201, description = "Problem created", body = ProblemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(title = %payload.title))]
pub async fn create_problem(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateProblemRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("problem:create")?;
    validate_create_problem(&payload)?;
    let tags = normalize_tags(&payload.tags)?;

    let txn = state.db.begin().await?;

    let now = chrono::Utc::now();
    let new_problem = problem::ActiveModel {
        title: Set(payload.title.trim().to_string()),
        description: Set(payload.description),
        difficulty: Set(payload.difficulty),
        time_limit: Set(payload.time_limit),
        memory_limit: Set(payload.memory_limit),
        starter_code: Set(starter_code_to_json(&payload.starter_code)),
        is_public: Set(payload.is_public),
        author_id: Set(Some(auth_user.user_id)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let model = new_problem.insert(&txn).await?;

    replace_tags(&txn, model.id, &tags).await?;

    for (i, tc) in payload.test_cases.into_iter().enumerate() {
        let position = match tc.position {
            Some(p) => p,
            None => i32::try_from(i)
                .map_err(|_| AppError::Validation("Too many test cases".into()))?,
        };
        test_case::ActiveModel {
            input: Set(tc.input),
            expected_output: Set(tc.expected_output),
            is_sample: Set(tc.is_sample),
            explanation: Set(tc.explanation.map(|e| e.trim().to_string())),
            position: Set(position),
            problem_id: Set(model.id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let response = build_problem_response(&txn, model).await?;
    txn.commit().await?;

    info!(problem_id = response.id, "Problem created");
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Problems",
    operation_id = "listProblems",
    summary = "List problems with pagination and search",
    description = "Returns a paginated list of problems. Anonymous callers and contestants only see public problems. Supports case-insensitive title search, `difficulty` and `tag` filters, and sorting by `created_at` (default, desc), `title` or `difficulty`. Authenticated callers get a `solved` flag per row.",
    params(ProblemListQuery),
    responses(
        (status = 200, description = "List of problems", body = ProblemListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Invalid token (TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_problems(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ProblemListQuery>,
) -> Result<Json<ProblemListResponse>, AppError> {
    let (page, per_page) = page_bounds(query.page, query.per_page);
    let sort_order = parse_sort_order(query.sort_order.as_deref())?;

    let mut select = problem::Entity::find();

    if !is_problem_editor(auth_user.as_ref()) {
        select = select.filter(problem::Column::IsPublic.eq(true));
    }
    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(problem::Column::Title)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }
    if let Some(difficulty) = query.difficulty {
        select = select.filter(problem::Column::Difficulty.eq(difficulty));
    }
    if let Some(ref tag) = query.tag {
        select = select.filter(
            problem::Column::Id.in_subquery(
                SeaQuery::select()
                    .column(problem_tag::Column::ProblemId)
                    .from(problem_tag::Entity)
                    .and_where(problem_tag::Column::Tag.eq(tag.trim().to_lowercase()))
                    .to_owned(),
            ),
        );
    }

    let total = select
        .clone()
        .paginate(&state.db, per_page)
        .num_items()
        .await?;

    select = match query.sort_by.as_deref().unwrap_or("created_at") {
        "created_at" => select.order_by(problem::Column::CreatedAt, sort_order),
        "title" => select.order_by(problem::Column::Title, sort_order),
        "difficulty" => select.order_by(Expr::cust(DIFFICULTY_RANK), sort_order),
        _ => {
            return Err(AppError::Validation(
                "sort_by must be one of: created_at, title, difficulty".into(),
            ));
        }
    };

    let rows = select
        .order_by_asc(problem::Column::Id)
        .select_only()
        .column(problem::Column::Id)
        .column(problem::Column::Title)
        .column(problem::Column::Difficulty)
        .column(problem::Column::IsPublic)
        .column(problem::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .into_model::<ProblemRow>()
        .all(&state.db)
        .await?;

    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    let mut tags = tags_by_problem(&state.db, &ids).await?;

    let solved: Option<HashSet<i32>> = match auth_user {
        Some(ref u) if !ids.is_empty() => Some(
            submission::Entity::find()
                .filter(submission::Column::UserId.eq(u.user_id))
                .filter(submission::Column::ProblemId.is_in(ids.clone()))
                .filter(submission::Column::Verdict.eq(arena_common::Verdict::Accepted))
                .select_only()
                .column(submission::Column::ProblemId)
                .distinct()
                .into_tuple::<i32>()
                .all(&state.db)
                .await?
                .into_iter()
                .collect(),
        ),
        Some(_) => Some(HashSet::new()),
        None => None,
    };

    let data = rows
        .into_iter()
        .map(|r| ProblemListItem {
            tags: tags.remove(&r.id).unwrap_or_default(),
            solved: solved.as_ref().map(|s| s.contains(&r.id)),
            id: r.id,
            title: r.title,
            difficulty: r.difficulty,
            is_public: r.is_public,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(ProblemListResponse {
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
    path = "/tags",
    tag = "Problems",
    operation_id = "listProblemTags",
    summary = "List tags with problem counts",
    description = "Returns every tag used by a problem visible to the caller, most used first.",
    responses(
        (status = 200, description = "Tags", body = Vec<TagCount>),
        (status = 401, description = "Invalid token (TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_tags(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TagCount>>, AppError> {
    let mut select = problem_tag::Entity::find();
    if !is_problem_editor(auth_user.as_ref()) {
        select = select.filter(
            problem_tag::Column::ProblemId.in_subquery(
                SeaQuery::select()
                    .column(problem::Column::Id)
                    .from(problem::Entity)
                    .and_where(problem::Column::IsPublic.eq(true))
                    .to_owned(),
            ),
        );
    }

    let tags = select
        .select_only()
        .column(problem_tag::Column::Tag)
        .column_as(Expr::cust("COUNT(*)"), "count")
        .group_by(problem_tag::Column::Tag)
        .order_by_desc(Expr::cust("count"))
        .order_by_asc(problem_tag::Column::Tag)
        .into_model::<TagCount>()
        .all(&state.db)
        .await?;

    Ok(Json(tags))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Problems",
    operation_id = "getProblem",
    summary = "Get a problem by ID",
    description = "Returns the problem statement with tags, sample test cases and starter code. Hidden problems are only visible to problem editors and to participants of a started contest containing them.",
    params(("id" = i32, Path, description = "Problem ID")),
    responses(
        (status = 200, description = "Problem details", body = ProblemResponse),
        (status = 401, description = "Invalid token (TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn get_problem(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProblemResponse>, AppError> {
    let model = find_readable_problem(&state.db, auth_user.as_ref(), id).await?;
    Ok(Json(build_problem_response(&state.db, model).await?))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Problems",
    operation_id = "updateProblem",
    summary = "Update an existing problem",
    description = "Partially updates a problem using PATCH semantics. `tags` and `starter_code` replace the stored values when present. Requires `problem:edit` permission. An empty payload returns the current resource unchanged.",
    params(("id" = i32, Path, description = "Problem ID")),
    request_body = UpdateProblemRequest,
    responses(
        (status = 200, description = "Problem updated", body = ProblemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn update_problem(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateProblemRequest>,
) -> Result<Json<ProblemResponse>, AppError> {
    auth_user.require_permission("problem:edit")?;
    validate_update_problem(&payload)?;

    if payload == UpdateProblemRequest::default() {
        let existing = find_problem(&state.db, id).await?;
        return Ok(Json(build_problem_response(&state.db, existing).await?));
    }

    let txn = state.db.begin().await?;

    let existing = find_problem_for_update(&txn, id).await?;
    let mut active: problem::ActiveModel = existing.into();

    if let Some(ref title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(difficulty) = payload.difficulty {
        active.difficulty = Set(difficulty);
    }
    if let Some(tl) = payload.time_limit {
        active.time_limit = Set(tl);
    }
    if let Some(ml) = payload.memory_limit {
        active.memory_limit = Set(ml);
    }
    if let Some(ref code) = payload.starter_code {
        active.starter_code = Set(starter_code_to_json(code));
    }
    if let Some(is_public) = payload.is_public {
        active.is_public = Set(is_public);
    }
    active.updated_at = Set(chrono::Utc::now());

    let model = active.update(&txn).await?;
    if let Some(ref tags) = payload.tags {
        replace_tags(&txn, id, &normalize_tags(tags)?).await?;
    }

    let response = build_problem_response(&txn, model).await?;
    txn.commit().await?;

    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Problems",
    operation_id = "deleteProblem",
    summary = "Delete a problem by ID",
    description = "Permanently deletes a problem with its tags, test cases and solution video. Discussions about it become general threads. Requires `problem:delete` permission. Returns 409 CONFLICT if the problem has submissions or is part of a contest.",
    params(("id" = i32, Path, description = "Problem ID")),
    responses(
        (status = 204, description = "Problem deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Cannot delete: has submissions or contest associations (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_problem(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("problem:delete")?;

    let txn = state.db.begin().await?;

    let _problem = find_problem_for_update(&txn, id).await?;

    let sub_count = submission::Entity::find()
        .filter(submission::Column::ProblemId.eq(id))
        .count(&txn)
        .await?;
    if sub_count > 0 {
        return Err(AppError::Conflict(
            "Cannot delete problem with existing submissions".into(),
        ));
    }

    let contest_count = contest_problem::Entity::find()
        .filter(contest_problem::Column::ProblemId.eq(id))
        .count(&txn)
        .await?;
    if contest_count > 0 {
        return Err(AppError::Conflict(
            "Cannot delete problem associated with a contest".into(),
        ));
    }

    // No submissions means no test case results either.
    test_case::Entity::delete_many()
        .filter(test_case::Column::ProblemId.eq(id))
        .exec(&txn)
        .await?;
    problem_tag::Entity::delete_many()
        .filter(problem_tag::Column::ProblemId.eq(id))
        .exec(&txn)
        .await?;
    solution_video::Entity::delete_many()
        .filter(solution_video::Column::ProblemId.eq(id))
        .exec(&txn)
        .await?;
    discussion::Entity::update_many()
        .col_expr(discussion::Column::ProblemId, Expr::value(Option::<i32>::None))
        .filter(discussion::Column::ProblemId.eq(id))
        .exec(&txn)
        .await?;
    problem::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Test Cases",
    operation_id = "createTestCase",
    summary = "Create a test case for a problem",
    description = "Creates a new test case under the specified problem. Requires `problem:edit` permission. Position is auto-assigned if omitted. Body limit: 32 MB.",
    params(("id" = i32, Path, description = "Problem ID")),
    request_body = CreateTestCaseRequest,
    responses(
        (status = 201, description = "Test case created", body = TestCaseResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id))]
pub async fn create_test_case(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
    AppJson(payload): AppJson<CreateTestCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("problem:edit")?;
    validate_create_test_case(&payload)?;

    let txn = state.db.begin().await?;
    find_problem_for_update(&txn, problem_id).await?;

    let position = match payload.position {
        Some(p) => p,
        None => next_position(&txn, problem_id).await?,
    };

    let new_tc = test_case::ActiveModel {
        input: Set(payload.input),
        expected_output: Set(payload.expected_output),
        explanation: Set(payload.explanation.map(|d| d.trim().to_string())),
        is_sample: Set(payload.is_sample),
        position: Set(position),
        problem_id: Set(problem_id),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let model = new_tc.insert(&txn).await?;
    txn.commit().await?;

    Ok((StatusCode::CREATED, Json(TestCaseResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Test Cases",
    operation_id = "listTestCases",
    summary = "List test cases for a problem",
    description = "Returns all test cases for a problem, ordered by position. Requires `problem:create` or `problem:edit` permission. Input and output are truncated to 100-character previews.",
    params(("id" = i32, Path, description = "Problem ID")),
    responses(
        (status = 200, description = "List of test cases", body = Vec<TestCaseListItem>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(problem_id))]
pub async fn list_test_cases(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
) -> Result<Json<Vec<TestCaseListItem>>, AppError> {
    auth_user.require_any_permission(&["problem:create", "problem:edit"])?;

    find_problem(&state.db, problem_id).await?;

    let preview_end_index = PREVIEW_LENGTH + 1;

    let rows = test_case::Entity::find()
        .filter(test_case::Column::ProblemId.eq(problem_id))
        .select_only()
        .column(test_case::Column::Id)
        .column(test_case::Column::IsSample)
        .column(test_case::Column::Position)
        .column_as(
            Expr::cust(format!("left(\"input\", {preview_end_index})")),
            "input_preview",
        )
        .column_as(
            Expr::cust(format!("left(\"expected_output\", {preview_end_index})")),
            "output_preview",
        )
        .column(test_case::Column::ProblemId)
        .column(test_case::Column::CreatedAt)
        .order_by_asc(test_case::Column::Position)
        .order_by_asc(test_case::Column::Id)
        .into_model::<TestCaseListItem>()
        .all(&state.db)
        .await?;

    let items = rows
        .into_iter()
        .map(|mut r| {
            r.input_preview = truncate_preview(&r.input_preview);
            r.output_preview = truncate_preview(&r.output_preview);
            r
        })
        .collect();

    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/{tc_id}",
    tag = "Test Cases",
    operation_id = "getTestCase",
    summary = "Get a test case by ID",
    description = "Returns the full test case. Requires `problem:create` or `problem:edit` permission. The test case must belong to the specified problem.",
    params(
        ("id" = i32, Path, description = "Problem ID"),
        ("tc_id" = i32, Path, description = "Test case ID"),
    ),
    responses(
        (status = 200, description = "Test case details", body = TestCaseResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Test case not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(problem_id, tc_id))]
pub async fn get_test_case(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((problem_id, tc_id)): Path<(i32, i32)>,
) -> Result<Json<TestCaseResponse>, AppError> {
    auth_user.require_any_permission(&["problem:create", "problem:edit"])?;

    let tc = find_test_case_for_problem(&state.db, problem_id, tc_id).await?;

    Ok(Json(tc.into()))
}

#[utoipa::path(
    patch,
    path = "/{tc_id}",
    tag = "Test Cases",
    operation_id = "updateTestCase",
    summary = "Update a test case",
    description = "Partially updates a test case. `explanation` can be cleared with null. Requires `problem:edit` permission. Body limit: 32 MB.",
    params(
        ("id" = i32, Path, description = "Problem ID"),
        ("tc_id" = i32, Path, description = "Test case ID"),
    ),
    request_body = UpdateTestCaseRequest,
    responses(
        (status = 200, description = "Test case updated", body = TestCaseResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Test case not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id, tc_id))]
pub async fn update_test_case(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((problem_id, tc_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<UpdateTestCaseRequest>,
) -> Result<Json<TestCaseResponse>, AppError> {
    auth_user.require_permission("problem:edit")?;
    validate_update_test_case(&payload)?;

    if payload == UpdateTestCaseRequest::default() {
        let existing = find_test_case_for_problem(&state.db, problem_id, tc_id).await?;
        return Ok(Json(existing.into()));
    }

    let txn = state.db.begin().await?;
    let existing = find_test_case_for_problem(&txn, problem_id, tc_id).await?;
    let mut active: test_case::ActiveModel = existing.into();

    if let Some(input) = payload.input {
        active.input = Set(input);
    }
    if let Some(expected_output) = payload.expected_output {
        active.expected_output = Set(expected_output);
    }
    if let Some(is_sample) = payload.is_sample {
        active.is_sample = Set(is_sample);
    }
    if let Some(position) = payload.position {
        active.position = Set(position);
    }
    match payload.explanation {
        Some(Some(text)) => active.explanation = Set(Some(text.trim().to_string())),
        Some(None) => active.explanation = Set(None),
        None => {}
    }

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{tc_id}",
    tag = "Test Cases",
    operation_id = "deleteTestCase",
    summary = "Delete a test case",
    description = "Permanently deletes a test case. Requires `problem:edit` permission. Returns 409 CONFLICT if the test case has judge results.",
    params(
        ("id" = i32, Path, description = "Problem ID"),
        ("tc_id" = i32, Path, description = "Test case ID"),
    ),
    responses(
        (status = 204, description = "Test case deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Test case not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Cannot delete: has judge results (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(problem_id, tc_id))]
pub async fn delete_test_case(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((problem_id, tc_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("problem:edit")?;

    let txn = state.db.begin().await?;
    find_problem_for_update(&txn, problem_id).await?;
    let tc = find_test_case_for_problem(&txn, problem_id, tc_id).await?;

    let result_count = crate::entity::test_case_result::Entity::find()
        .filter(crate::entity::test_case_result::Column::TestCaseId.eq(tc.id))
        .count(&txn)
        .await?;
    if result_count > 0 {
        return Err(AppError::Conflict(
            "Cannot delete test case with existing judge results".into(),
        ));
    }

    test_case::Entity::delete_by_id(tc.id).exec(&txn).await?;
    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/reorder",
    tag = "Test Cases",
    operation_id = "reorderTestCases",
    summary = "Reorder test cases for a problem",
    description = "Replaces the ordering of all test cases in a problem. Requires `problem:edit` permission. The ID array must contain exactly all test cases in the problem. Positions are assigned by array index starting at 0.",
    params(("id" = i32, Path, description = "Problem ID")),
    request_body = ReorderTestCasesRequest,
    responses(
        (status = 204, description = "Test cases reordered"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id))]
pub async fn reorder_test_cases(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
    AppJson(payload): AppJson<ReorderTestCasesRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("problem:edit")?;
    validate_reorder_test_cases(&payload)?;

    let txn = state.db.begin().await?;
    find_problem_for_update(&txn, problem_id).await?;

    let existing: HashSet<i32> = test_case::Entity::find()
        .filter(test_case::Column::ProblemId.eq(problem_id))
        .select_only()
        .column(test_case::Column::Id)
        .into_tuple::<i32>()
        .all(&txn)
        .await?
        .into_iter()
        .collect();
    let requested: HashSet<i32> = payload.test_case_ids.iter().copied().collect();
    if existing != requested {
        return Err(AppError::Validation(
            "test_case_ids must contain exactly the test cases currently in the problem".into(),
        ));
    }

    for (i, &tc_id) in payload.test_case_ids.iter().enumerate() {
        let position = i32::try_from(i)
            .map_err(|_| AppError::Validation("Too many test cases to reorder".into()))?;
        test_case::Entity::update_many()
            .filter(test_case::Column::Id.eq(tc_id))
            .col_expr(test_case::Column::Position, Expr::value(position))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/solution-video",
    tag = "Problems",
    operation_id = "getSolutionVideo",
    summary = "Get the editorial video of a problem",
    description = "Readable by everyone who can read the problem.",
    params(("id" = i32, Path, description = "Problem ID")),
    responses(
        (status = 200, description = "Video metadata", body = SolutionVideoResponse),
        (status = 404, description = "Problem or video not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(problem_id))]
pub async fn get_solution_video(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
) -> Result<Json<SolutionVideoResponse>, AppError> {
    find_readable_problem(&state.db, auth_user.as_ref(), problem_id).await?;

    let video = solution_video::Entity::find()
        .filter(solution_video::Column::ProblemId.eq(problem_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Solution video not found".into()))?;
    Ok(Json(video.into()))
}

#[utoipa::path(
    put,
    path = "/{id}/solution-video",
    tag = "Problems",
    operation_id = "putSolutionVideo",
    summary = "Attach or replace the editorial video",
    description = "Stores metadata of a video already uploaded to the media CDN. Replaces any previous video. Requires `problem:edit` permission.",
    params(("id" = i32, Path, description = "Problem ID")),
    request_body = SolutionVideoRequest,
    responses(
        (status = 200, description = "Video stored", body = SolutionVideoResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id))]
pub async fn put_solution_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
    AppJson(payload): AppJson<SolutionVideoRequest>,
) -> Result<Json<SolutionVideoResponse>, AppError> {
    auth_user.require_permission("problem:edit")?;
    validate_solution_video(&payload)?;

    let txn = state.db.begin().await?;
    find_problem_for_update(&txn, problem_id).await?;

    solution_video::Entity::delete_many()
        .filter(solution_video::Column::ProblemId.eq(problem_id))
        .exec(&txn)
        .await?;
    let model = solution_video::ActiveModel {
        problem_id: Set(problem_id),
        uploaded_by: Set(auth_user.user_id),
        video_url: Set(payload.video_url.trim().to_string()),
        public_id: Set(payload.public_id.trim().to_string()),
        thumbnail_url: Set(payload.thumbnail_url.map(|u| u.trim().to_string())),
        duration_seconds: Set(payload.duration_seconds),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}/solution-video",
    tag = "Problems",
    operation_id = "deleteSolutionVideo",
    summary = "Remove the editorial video",
    description = "Removes the stored metadata. The CDN asset itself is not touched. Requires `problem:edit` permission.",
    params(("id" = i32, Path, description = "Problem ID")),
    responses(
        (status = 204, description = "Video removed"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem or video not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(problem_id))]
pub async fn delete_solution_video(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("problem:edit")?;

    let result = solution_video::Entity::delete_many()
        .filter(solution_video::Column::ProblemId.eq(problem_id))
        .exec(&state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Solution video not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Body limit layer for problem and test case JSON routes (32MB).
pub fn test_case_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(32 * 1024 * 1024)
}

pub(crate) async fn find_problem<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<problem::Model, AppError> {
    problem::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".into()))
}

async fn find_problem_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<problem::Model, AppError> {
    problem::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".into()))
}

async fn find_test_case_for_problem<C: ConnectionTrait>(
    db: &C,
    problem_id: i32,
    tc_id: i32,
) -> Result<test_case::Model, AppError> {
    let tc = test_case::Entity::find_by_id(tc_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Test case not found".into()))?;

    if tc.problem_id != problem_id {
        return Err(AppError::NotFound("Test case not found".into()));
    }

    Ok(tc)
}

/// Compute the next position for a new test case in a problem.
async fn next_position<C: ConnectionTrait>(db: &C, problem_id: i32) -> Result<i32, AppError> {
    let max_pos: Option<i32> = test_case::Entity::find()
        .filter(test_case::Column::ProblemId.eq(problem_id))
        .select_only()
        .column_as(test_case::Column::Position.max(), "max_pos")
        .into_tuple::<Option<i32>>()
        .one(db)
        .await?
        .flatten();
    max_pos
        .unwrap_or(-1)
        .checked_add(1)
        .ok_or_else(|| AppError::Validation("Position overflow".into()))
}

async fn replace_tags(
    txn: &DatabaseTransaction,
    problem_id: i32,
    tags: &[String],
) -> Result<(), AppError> {
    problem_tag::Entity::delete_many()
        .filter(problem_tag::Column::ProblemId.eq(problem_id))
        .exec(txn)
        .await?;
    if tags.is_empty() {
        return Ok(());
    }
    problem_tag::Entity::insert_many(tags.iter().map(|tag| problem_tag::ActiveModel {
        problem_id: Set(problem_id),
        tag: Set(tag.clone()),
    }))
    .exec_without_returning(txn)
    .await?;
    Ok(())
}

async fn tags_by_problem<C: ConnectionTrait>(
    db: &C,
    problem_ids: &[i32],
) -> Result<HashMap<i32, Vec<String>>, AppError> {
    if problem_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i32, String)> = problem_tag::Entity::find()
        .filter(problem_tag::Column::ProblemId.is_in(problem_ids.to_vec()))
        .select_only()
        .column(problem_tag::Column::ProblemId)
        .column(problem_tag::Column::Tag)
        .order_by_asc(problem_tag::Column::Tag)
        .into_tuple()
        .all(db)
        .await?;

    let mut map: HashMap<i32, Vec<String>> = HashMap::new();
    for (problem_id, tag) in rows {
        map.entry(problem_id).or_default().push(tag);
    }
    Ok(map)
}

async fn build_problem_response<C: ConnectionTrait>(
    db: &C,
    model: problem::Model,
) -> Result<ProblemResponse, AppError> {
    let tags = tags_by_problem(db, &[model.id])
        .await?
        .remove(&model.id)
        .unwrap_or_default();

    let samples = test_case::Entity::find()
        .filter(test_case::Column::ProblemId.eq(model.id))
        .filter(test_case::Column::IsSample.eq(true))
        .order_by_asc(test_case::Column::Position)
        .order_by_asc(test_case::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(SampleTestCase::from)
        .collect();

    let has_solution_video = solution_video::Entity::find()
        .filter(solution_video::Column::ProblemId.eq(model.id))
        .count(db)
        .await?
        > 0;

    Ok(ProblemResponse {
        id: model.id,
        title: model.title,
        description: model.description,
        difficulty: model.difficulty,
        tags,
        time_limit: model.time_limit,
        memory_limit: model.memory_limit,
        starter_code: starter_code_from_json(&model.starter_code),
        is_public: model.is_public,
        author_id: model.author_id,
        samples,
        has_solution_video,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}
