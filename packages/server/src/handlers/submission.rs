use std::cmp;
use std::collections::HashMap;

use arena_common::judge::{CaseInput, ExecutionReport, ExecutionRequest, summarize};
use arena_common::SubmissionStatus;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{Duration, Utc};
use sea_orm::sea_query::LockType;
use sea_orm::*;
use tracing::{info, instrument, warn};

use crate::entity::{contest, problem, submission, test_case, test_case_result, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::shared::{Pagination, page_bounds, parse_sort_order};
use crate::models::submission::*;
use crate::state::AppState;
use crate::utils::contest::{
    ContestPhase, check_contest_access, find_contest, find_contest_problem, find_readable_problem,
    is_participant, require_running_participant,
};

/// Check submission rate limit for a user.
///
/// Run inside the transaction that inserts the submission, after locking the
/// user row, so concurrent submits by the same user are counted in turn.
async fn check_rate_limit<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    limit_per_minute: u32,
) -> Result<(), AppError> {
    if limit_per_minute == 0 {
        return Ok(()); // Rate limiting disabled
    }

    let one_minute_ago = Utc::now() - Duration::minutes(1);

    let count = submission::Entity::find()
        .filter(submission::Column::UserId.eq(user_id))
        .filter(submission::Column::CreatedAt.gt(one_minute_ago))
        .count(db)
        .await?;

    if count >= limit_per_minute as u64 {
        let oldest = submission::Entity::find()
            .filter(submission::Column::UserId.eq(user_id))
            .filter(submission::Column::CreatedAt.gt(one_minute_ago))
            .order_by_asc(submission::Column::CreatedAt)
            .one(db)
            .await?;

        let retry_after = oldest
            .map(|s| {
                let expires = s.created_at + Duration::minutes(1);
                cmp::max((expires - Utc::now()).num_seconds(), 1) as u64
            })
            .unwrap_or(60);

        return Err(AppError::RateLimited { retry_after });
    }

    Ok(())
}

async fn find_submission<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<submission::Model, AppError> {
    submission::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".into()))
}

async fn load_test_cases<C: ConnectionTrait>(
    db: &C,
    problem_id: i32,
    samples_only: bool,
) -> Result<Vec<test_case::Model>, AppError> {
    let mut select = test_case::Entity::find().filter(test_case::Column::ProblemId.eq(problem_id));
    if samples_only {
        select = select.filter(test_case::Column::IsSample.eq(true));
    }
    Ok(select
        .order_by_asc(test_case::Column::Position)
        .order_by_asc(test_case::Column::Id)
        .all(db)
        .await?)
}

fn execution_request(
    language: &str,
    code: &str,
    problem: &problem::Model,
    cases: Vec<CaseInput>,
) -> ExecutionRequest {
    ExecutionRequest {
        language: language.trim().to_string(),
        source: code.to_string(),
        time_limit_ms: problem.time_limit,
        memory_limit_kb: problem.memory_limit,
        cases,
    }
}

/// Run a program without persisting anything.
async fn execute_run(
    state: &AppState,
    auth_user: &AuthUser,
    problem: &problem::Model,
    payload: RunRequest,
) -> Result<RunResponse, AppError> {
    validate_run(
        &payload,
        state.config.submission.max_size,
        &state.config.judge,
    )?;
    state
        .run_limiter
        .check(auth_user.user_id, state.config.submission.run_rate_limit_per_minute)?;

    let cases: Vec<CaseInput> = match payload.custom_input {
        Some(input) => vec![CaseInput {
            input,
            expected_output: None,
        }],
        None => load_test_cases(&state.db, problem.id, true)
            .await?
            .into_iter()
            .map(|tc| CaseInput {
                input: tc.input,
                expected_output: Some(tc.expected_output),
            })
            .collect(),
    };
    if cases.is_empty() {
        return Err(AppError::Validation(
            "Problem has no sample test cases; provide custom_input".into(),
        ));
    }

    let request = execution_request(&payload.language, &payload.code, problem, cases.clone());
    let report = state.judge.execute(&request).await?;
    let summary = summarize(&report);

    let results = cases
        .into_iter()
        .zip(report.cases)
        .map(|(case, outcome)| RunCaseResult {
            input: case.input,
            expected_output: case.expected_output,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            verdict: outcome.verdict,
            time_used: outcome.time_used,
            memory_used: outcome.memory_used,
        })
        .collect();

    Ok(RunResponse {
        compile_error: report.compile_error,
        verdict: summary.verdict,
        passed: summary.passed,
        total: summary.total,
        cases: results,
    })
}

/// Execute `sub` against all test cases and persist the outcome.
///
/// A judge failure is recorded on the submission as `SystemError`; only database
/// errors are returned.
#[instrument(skip(state, sub, problem), fields(submission_id = sub.id))]
async fn judge_and_store(
    state: &AppState,
    sub: submission::Model,
    problem: &problem::Model,
) -> Result<submission::Model, AppError> {
    let cases = load_test_cases(&state.db, problem.id, false).await?;

    let mut active: submission::ActiveModel = sub.clone().into();
    active.status = Set(SubmissionStatus::Judging);
    active.total_cases = Set(cases.len() as i32);
    let sub = active.update(&state.db).await?;

    let request = execution_request(
        &sub.language,
        &sub.code,
        problem,
        cases
            .iter()
            .map(|tc| CaseInput {
                input: tc.input.clone(),
                expected_output: Some(tc.expected_output.clone()),
            })
            .collect(),
    );

    let outcome = match state.judge.execute(&request).await {
        Ok(report) if report.compile_error.is_none() && report.cases.len() != cases.len() => {
            Err(format!(
                "Judge returned {} results for {} test cases",
                report.cases.len(),
                cases.len()
            ))
        }
        Ok(report) => Ok(report),
        Err(e) => Err(e.to_string()),
    };

    let submission_id = sub.id;
    let txn = state.db.begin().await?;
    let mut active: submission::ActiveModel = sub.into();
    active.judged_at = Set(Some(Utc::now()));

    match outcome {
        Ok(report) => {
            store_case_results(&txn, submission_id, &cases, &report).await?;
            let summary = summarize(&report);
            active.status = Set(summary.status);
            active.verdict = Set(summary.verdict);
            active.passed_cases = Set(summary.passed);
            active.total_cases = Set(cases.len() as i32);
            active.time_used = Set(summary.time_used);
            active.memory_used = Set(summary.memory_used);
            active.compile_output = Set(summary.compile_output);
            active.error_message = Set((summary.status == SubmissionStatus::SystemError)
                .then(|| "The judge reported an internal error".to_string()));
        }
        Err(message) => {
            warn!(error = %message, "Judging failed");
            active.status = Set(SubmissionStatus::SystemError);
            active.verdict = Set(None);
            active.passed_cases = Set(0);
            active.error_message = Set(Some(message));
        }
    }

    let model = active.update(&txn).await?;
    txn.commit().await?;

    info!(status = %model.status, verdict = ?model.verdict, "Submission judged");
    Ok(model)
}

/// Judge on a detached task and wait for it.
///
/// The task keeps running when the request future is dropped, so a client that
/// disconnects mid-judging still leaves a finished row behind.
async fn spawn_judging(
    state: &AppState,
    sub: submission::Model,
    problem: problem::Model,
) -> Result<submission::Model, AppError> {
    let state = state.clone();
    tokio::spawn(async move { judge_and_store(&state, sub, &problem).await })
        .await
        .map_err(|e| AppError::Internal(format!("Judging task failed: {e}")))?
}

async fn store_case_results(
    txn: &DatabaseTransaction,
    submission_id: i32,
    cases: &[test_case::Model],
    report: &ExecutionReport,
) -> Result<(), AppError> {
    if report.cases.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    test_case_result::Entity::insert_many(cases.iter().zip(&report.cases).map(|(tc, outcome)| {
        test_case_result::ActiveModel {
            submission_id: Set(submission_id),
            test_case_id: Set(tc.id),
            verdict: Set(outcome.verdict),
            time_used: Set(outcome.time_used),
            memory_used: Set(outcome.memory_used),
            stdout: Set(outcome.stdout.clone()),
            stderr: Set(outcome.stderr.clone()),
            created_at: Set(now),
            ..Default::default()
        }
    }))
    .exec_without_returning(txn)
    .await?;
    Ok(())
}

/// Validate, persist as Pending and judge a new submission.
async fn submit(
    state: &AppState,
    auth_user: &AuthUser,
    problem: &problem::Model,
    contest_id: Option<i32>,
    payload: CreateSubmissionRequest,
) -> Result<SubmissionResponse, AppError> {
    validate_create_submission(
        &payload,
        state.config.submission.max_size,
        &state.config.judge,
    )?;
    if !state.judge.is_enabled() {
        return Err(AppError::JudgeUnavailable(
            "Code execution is currently disabled".into(),
        ));
    }
    let has_cases = test_case::Entity::find()
        .filter(test_case::Column::ProblemId.eq(problem.id))
        .count(&state.db)
        .await?
        > 0;
    if !has_cases {
        return Err(AppError::Validation("Problem has no test cases".into()));
    }

    let txn = state.db.begin().await?;
    user::Entity::find_by_id(auth_user.user_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    check_rate_limit(
        &txn,
        auth_user.user_id,
        state.config.submission.rate_limit_per_minute,
    )
    .await?;

    let new_submission = submission::ActiveModel {
        language: Set(payload.language.trim().to_string()),
        code: Set(payload.code),
        status: Set(SubmissionStatus::Pending),
        user_id: Set(auth_user.user_id),
        problem_id: Set(problem.id),
        contest_id: Set(contest_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let model = new_submission.insert(&txn).await?;
    txn.commit().await?;

    let judged = spawn_judging(state, model, problem.clone()).await?;

    let visibility = VisibilityContext {
        viewer_id: auth_user.user_id,
        has_view_all: auth_user.has_permission("submission:view_all"),
    };
    build_submission_response(&state.db, judged, &visibility).await
}

/// Build list items from submissions.
async fn build_submission_list_items<C: ConnectionTrait>(
    db: &C,
    submissions: Vec<(submission::Model, Option<user::Model>)>,
) -> Result<Vec<SubmissionListItem>, AppError> {
    if submissions.is_empty() {
        return Ok(vec![]);
    }

    let problem_ids: Vec<i32> = submissions.iter().map(|(s, _)| s.problem_id).collect();

    let titles: HashMap<i32, String> = problem::Entity::find()
        .filter(problem::Column::Id.is_in(problem_ids))
        .select_only()
        .column(problem::Column::Id)
        .column(problem::Column::Title)
        .into_tuple::<(i32, String)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let mut data = Vec::with_capacity(submissions.len());
    for (sub, user_opt) in submissions {
        let user_model = user_opt.ok_or_else(|| AppError::Internal("User not found".into()))?;
        let problem_title = titles
            .get(&sub.problem_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("Problem not found".into()))?;

        data.push(SubmissionListItem {
            id: sub.id,
            language: sub.language,
            status: sub.status,
            verdict: sub.verdict,
            passed_cases: sub.passed_cases,
            total_cases: sub.total_cases,
            time_used: sub.time_used,
            memory_used: sub.memory_used,
            user_id: sub.user_id,
            username: user_model.username,
            problem_id: sub.problem_id,
            problem_title,
            contest_id: sub.contest_id,
            created_at: sub.created_at,
        });
    }

    Ok(data)
}

/// Visibility context for determining what a viewer can see.
struct VisibilityContext {
    viewer_id: i32,
    has_view_all: bool,
}

/// Build full submission response with related data.
async fn build_submission_response<C: ConnectionTrait>(
    db: &C,
    sub: submission::Model,
    visibility: &VisibilityContext,
) -> Result<SubmissionResponse, AppError> {
    let user_model = user::Entity::find_by_id(sub.user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Submission user not found".into()))?;

    let problem_model = problem::Entity::find_by_id(sub.problem_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Submission problem not found".into()))?;

    let is_owner = visibility.viewer_id == sub.user_id;
    let has_view_all = visibility.has_view_all;

    let mut results = test_case_result::Entity::find()
        .filter(test_case_result::Column::SubmissionId.eq(sub.id))
        .find_also_related(test_case::Entity)
        .all(db)
        .await?;
    results.sort_by_key(|(r, tc)| (tc.as_ref().map(|t| t.position), r.test_case_id));

    let test_case_results = results
        .into_iter()
        .map(|(result, tc)| {
            let is_sample = tc.as_ref().is_some_and(|t| t.is_sample);
            let show_output = has_view_all || (is_owner && is_sample);
            TestCaseResultResponse {
                test_case_id: result.test_case_id,
                verdict: result.verdict,
                time_used: result.time_used,
                memory_used: result.memory_used,
                is_sample,
                stdout: if show_output { result.stdout } else { None },
                stderr: if show_output { result.stderr } else { None },
            }
        })
        .collect();

    let show_source_code = has_view_all || is_owner;

    Ok(SubmissionResponse {
        id: sub.id,
        language: sub.language,
        code: show_source_code.then_some(sub.code),
        status: sub.status,
        verdict: sub.verdict,
        passed_cases: sub.passed_cases,
        total_cases: sub.total_cases,
        time_used: sub.time_used,
        memory_used: sub.memory_used,
        compile_output: if show_source_code {
            sub.compile_output
        } else {
            None
        },
        error_message: sub.error_message,
        user_id: sub.user_id,
        username: user_model.username,
        problem_id: sub.problem_id,
        problem_title: problem_model.title,
        contest_id: sub.contest_id,
        created_at: sub.created_at,
        judged_at: sub.judged_at,
        test_case_results,
    })
}

/// Apply the common list filters, count, sort and paginate.
async fn paginate_submissions(
    db: &DatabaseConnection,
    mut base_select: Select<submission::Entity>,
    query: &SubmissionListQuery,
    allow_user_filter: bool,
) -> Result<SubmissionListResponse, AppError> {
    let (page, per_page) = page_bounds(query.page, query.per_page);
    let sort_order = parse_sort_order(query.sort_order.as_deref())?;

    if let Some(pid) = query.problem_id {
        base_select = base_select.filter(submission::Column::ProblemId.eq(pid));
    }
    if let Some(uid) = query.user_id
        && allow_user_filter
    {
        base_select = base_select.filter(submission::Column::UserId.eq(uid));
    }
    if let Some(cid) = query.contest_id {
        base_select = base_select.filter(submission::Column::ContestId.eq(cid));
    }
    if let Some(ref lang) = query.language {
        base_select = base_select.filter(submission::Column::Language.eq(lang.trim()));
    }
    if let Some(status) = query.status {
        base_select = base_select.filter(submission::Column::Status.eq(status));
    }
    if let Some(verdict) = query.verdict {
        base_select = base_select.filter(submission::Column::Verdict.eq(verdict));
    }

    let total = base_select.clone().count(db).await?;

    let submissions = base_select
        .find_also_related(user::Entity)
        .order_by(submission::Column::CreatedAt, sort_order.clone())
        .order_by(submission::Column::Id, sort_order)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(db)
        .await?;

    let data = build_submission_list_items(db, submissions).await?;

    Ok(SubmissionListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
        },
    })
}

#[utoipa::path(
    post,
    path = "/{id}/run",
    tag = "Submissions",
    operation_id = "runCode",
    summary = "Run code against the sample test cases",
    description = "Executes the program against the problem's sample test cases, or against `custom_input` when given. Nothing is persisted. Limited per user per minute. Requires `submission:submit` permission.",
    params(("id" = i32, Path, description = "Problem ID")),
    request_body = RunRequest,
    responses(
        (status = 200, description = "Run finished", body = RunResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded (RATE_LIMITED)", body = ErrorBody),
        (status = 503, description = "Judge unavailable (JUDGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id = %problem_id, language = %payload.language))]
pub async fn run_code(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
    AppJson(payload): AppJson<RunRequest>,
) -> Result<Json<RunResponse>, AppError> {
    auth_user.require_permission("submission:submit")?;
    let problem = find_readable_problem(&state.db, Some(&auth_user), problem_id).await?;
    Ok(Json(execute_run(&state, &auth_user, &problem, payload).await?))
}

#[utoipa::path(
    post,
    path = "/{id}/submissions",
    tag = "Submissions",
    operation_id = "createSubmission",
    summary = "Submit a solution to a problem",
    description = "Stores the submission and judges it against all test cases before responding. If the judge fails the submission is stored as `SystemError` with an `error_message`. Requires `submission:submit` permission.",
    params(("id" = i32, Path, description = "Problem ID")),
    request_body = CreateSubmissionRequest,
    responses(
        (status = 201, description = "Submission created and judged", body = SubmissionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded (RATE_LIMITED)", body = ErrorBody),
        (status = 503, description = "Judge disabled (JUDGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id = %problem_id, language = %payload.language))]
pub async fn create_submission(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
    AppJson(payload): AppJson<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("submission:submit")?;
    let problem = find_readable_problem(&state.db, Some(&auth_user), problem_id).await?;

    let response = submit(&state, &auth_user, &problem, None, payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/{id}/submissions",
    tag = "Submissions",
    operation_id = "listMyProblemSubmissions",
    summary = "List the caller's submissions for a problem",
    description = "Returns the caller's own submissions for the problem, newest first by default.",
    params(
        ("id" = i32, Path, description = "Problem ID"),
        SubmissionListQuery,
    ),
    responses(
        (status = 200, description = "List of submissions", body = SubmissionListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(problem_id = %problem_id))]
pub async fn list_problem_submissions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(problem_id): Path<i32>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<SubmissionListResponse>, AppError> {
    find_readable_problem(&state.db, Some(&auth_user), problem_id).await?;

    let base = submission::Entity::find()
        .filter(submission::Column::ProblemId.eq(problem_id))
        .filter(submission::Column::UserId.eq(auth_user.user_id));
    Ok(Json(
        paginate_submissions(&state.db, base, &query, false).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Submissions",
    operation_id = "listSubmissions",
    summary = "List submissions",
    description = "Returns a paginated list of submissions. Users see their own submissions; users with `submission:view_all` permission see all submissions.",
    params(SubmissionListQuery),
    responses(
        (status = 200, description = "List of submissions", body = SubmissionListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_submissions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<SubmissionListResponse>, AppError> {
    let can_view_all = auth_user.has_permission("submission:view_all");

    let mut base = submission::Entity::find();
    if !can_view_all {
        base = base.filter(submission::Column::UserId.eq(auth_user.user_id));
    }
    Ok(Json(
        paginate_submissions(&state.db, base, &query, can_view_all).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Submissions",
    operation_id = "getSubmission",
    summary = "Get submission details",
    description = "Owners and `submission:view_all` holders can always view a submission. Participants of a contest can view other participants' contest submissions once the contest has ended, without source code.",
    params(("id" = i32, Path, description = "Submission ID")),
    responses(
        (status = 200, description = "Submission details", body = SubmissionResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Submission not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(submission_id = %id))]
pub async fn get_submission(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SubmissionResponse>, AppError> {
    let sub = find_submission(&state.db, id).await?;

    let can_view_all = auth_user.has_permission("submission:view_all");
    if !can_view_all && sub.user_id != auth_user.user_id {
        let Some(contest_id) = sub.contest_id else {
            return Err(AppError::NotFound("Submission not found".into()));
        };
        let contest_model = find_contest(&state.db, contest_id).await?;
        let ended = ContestPhase::at(&contest_model, Utc::now()) == ContestPhase::Ended;
        if !ended || !is_participant(&state.db, contest_id, auth_user.user_id).await? {
            return Err(AppError::NotFound("Submission not found".into()));
        }
    }

    let visibility = VisibilityContext {
        viewer_id: auth_user.user_id,
        has_view_all: can_view_all,
    };
    Ok(Json(
        build_submission_response(&state.db, sub, &visibility).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/{id}/rejudge",
    tag = "Submissions",
    operation_id = "rejudgeSubmission",
    summary = "Rejudge a submission",
    description = "Discards the stored results and judges the submission again against the current test cases. Requires `submission:rejudge` permission.",
    params(("id" = i32, Path, description = "Submission ID")),
    responses(
        (status = 200, description = "Submission rejudged", body = SubmissionResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Submission not found (NOT_FOUND)", body = ErrorBody),
        (status = 503, description = "Judge disabled (JUDGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(submission_id = %id))]
pub async fn rejudge_submission(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SubmissionResponse>, AppError> {
    auth_user.require_permission("submission:rejudge")?;
    if !state.judge.is_enabled() {
        return Err(AppError::JudgeUnavailable(
            "Code execution is currently disabled".into(),
        ));
    }

    let txn = state.db.begin().await?;

    let sub = submission::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".into()))?;

    test_case_result::Entity::delete_many()
        .filter(test_case_result::Column::SubmissionId.eq(sub.id))
        .exec(&txn)
        .await?;

    let mut active: submission::ActiveModel = sub.into();
    active.status = Set(SubmissionStatus::Pending);
    active.verdict = Set(None);
    active.passed_cases = Set(0);
    active.compile_output = Set(None);
    active.error_message = Set(None);
    active.time_used = Set(None);
    active.memory_used = Set(None);
    active.judged_at = Set(None);
    let reset = active.update(&txn).await?;

    txn.commit().await?;

    let problem = crate::handlers::problem::find_problem(&state.db, reset.problem_id).await?;
    let judged = spawn_judging(&state, reset, problem).await?;

    info!(
        submission_id = judged.id,
        by = auth_user.user_id,
        "Submission rejudged"
    );

    let visibility = VisibilityContext {
        viewer_id: auth_user.user_id,
        has_view_all: true,
    };
    Ok(Json(
        build_submission_response(&state.db, judged, &visibility).await?,
    ))
}

/// Contest, problem and access checks shared by contest run and submit.
async fn contest_problem_for_participant(
    state: &AppState,
    auth_user: &AuthUser,
    contest_id: i32,
    problem_id: i32,
) -> Result<problem::Model, AppError> {
    let contest_model = find_contest(&state.db, contest_id).await?;
    check_contest_access(&state.db, Some(auth_user), &contest_model).await?;
    require_running_participant(&state.db, auth_user, &contest_model).await?;
    find_contest_problem(&state.db, contest_id, problem_id).await?;
    crate::handlers::problem::find_problem(&state.db, problem_id).await
}

#[utoipa::path(
    post,
    path = "/{id}/problems/{problem_id}/run",
    tag = "Submissions",
    operation_id = "runContestCode",
    summary = "Run code for a contest problem",
    description = "Like the practice run, for participants of a running contest.",
    params(
        ("id" = i32, Path, description = "Contest ID"),
        ("problem_id" = i32, Path, description = "Problem ID"),
    ),
    request_body = RunRequest,
    responses(
        (status = 200, description = "Run finished", body = RunResponse),
        (status = 400, description = "Contest not running or validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not registered (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest or problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded (RATE_LIMITED)", body = ErrorBody),
        (status = 503, description = "Judge unavailable (JUDGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %contest_id, problem_id = %problem_id))]
pub async fn run_contest_code(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((contest_id, problem_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<RunRequest>,
) -> Result<Json<RunResponse>, AppError> {
    auth_user.require_permission("submission:submit")?;
    let problem = contest_problem_for_participant(&state, &auth_user, contest_id, problem_id).await?;
    Ok(Json(execute_run(&state, &auth_user, &problem, payload).await?))
}

#[utoipa::path(
    post,
    path = "/{id}/problems/{problem_id}/submissions",
    tag = "Submissions",
    operation_id = "createContestSubmission",
    summary = "Submit a solution to a contest problem",
    description = "Creates and judges a contest submission. The caller must be a participant and the contest must be running. Requires `submission:submit` permission.",
    params(
        ("id" = i32, Path, description = "Contest ID"),
        ("problem_id" = i32, Path, description = "Problem ID"),
    ),
    request_body = CreateSubmissionRequest,
    responses(
        (status = 201, description = "Submission created and judged", body = SubmissionResponse),
        (status = 400, description = "Contest not running or validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not registered (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Contest or problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded (RATE_LIMITED)", body = ErrorBody),
        (status = 503, description = "Judge disabled (JUDGE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(contest_id = %contest_id, problem_id = %problem_id))]
pub async fn create_contest_submission(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((contest_id, problem_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("submission:submit")?;
    let problem = contest_problem_for_participant(&state, &auth_user, contest_id, problem_id).await?;

    let response = submit(&state, &auth_user, &problem, Some(contest_id), payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/{id}/submissions",
    tag = "Submissions",
    operation_id = "listContestSubmissions",
    summary = "List contest submissions",
    description = "Contest managers and `submission:view_all` holders see every submission. Participants see their own while the contest runs and everyone's after it ended.",
    params(
        ("id" = i32, Path, description = "Contest ID"),
        SubmissionListQuery,
    ),
    responses(
        (status = 200, description = "List of submissions", body = SubmissionListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Contest not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(contest_id = %contest_id))]
pub async fn list_contest_submissions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(contest_id): Path<i32>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<SubmissionListResponse>, AppError> {
    let contest_model: contest::Model = find_contest(&state.db, contest_id).await?;
    check_contest_access(&state.db, Some(&auth_user), &contest_model).await?;

    let ended = ContestPhase::at(&contest_model, Utc::now()) == ContestPhase::Ended;
    let can_see_all = auth_user.has_any_permission(&["submission:view_all", "contest:manage"])
        || (ended && is_participant(&state.db, contest_id, auth_user.user_id).await?);

    let mut base = submission::Entity::find().filter(submission::Column::ContestId.eq(contest_id));
    if !can_see_all {
        base = base.filter(submission::Column::UserId.eq(auth_user.user_id));
    }
    Ok(Json(
        paginate_submissions(&state.db, base, &query, can_see_all).await?,
    ))
}
