use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers::{assistant, auth, contest, discussion, problem, submission, user};
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .nest("/problems", problem_routes())
        .nest("/submissions", submission_routes())
        .nest("/contests", contest_routes())
        .nest("/discussions", discussion_routes())
        .nest("/assistant", assistant_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(auth::register))
        .routes(routes!(auth::login))
        .routes(routes!(auth::me))
}

fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(user::list_users))
        .routes(routes!(user::update_profile, user::delete_account))
        .routes(routes!(user::change_password))
        .routes(routes!(user::get_profile))
        .routes(routes!(user::update_role))
}

fn problem_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(problem::list_problems, problem::create_problem))
        .routes(routes!(problem::list_tags))
        .routes(routes!(
            problem::get_problem,
            problem::update_problem,
            problem::delete_problem
        ))
        .routes(routes!(
            problem::get_solution_video,
            problem::put_solution_video,
            problem::delete_solution_video
        ))
        .routes(routes!(submission::run_code))
        .routes(routes!(
            submission::list_problem_submissions,
            submission::create_submission
        ))
        .nest("/{id}/test-cases", test_case_routes())
}

fn test_case_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(problem::list_test_cases, problem::create_test_case))
        .routes(routes!(problem::reorder_test_cases))
        .routes(routes!(
            problem::get_test_case,
            problem::update_test_case,
            problem::delete_test_case
        ))
        .layer(problem::test_case_body_limit())
}

fn submission_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(submission::list_submissions))
        .routes(routes!(submission::get_submission))
        .routes(routes!(submission::rejudge_submission))
}

fn contest_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(contest::list_contests, contest::create_contest))
        .routes(routes!(
            contest::get_contest,
            contest::update_contest,
            contest::delete_contest
        ))
        .routes(routes!(
            contest::list_contest_problems,
            contest::add_contest_problem
        ))
        .routes(routes!(contest::reorder_contest_problems))
        .routes(routes!(
            contest::update_contest_problem,
            contest::remove_contest_problem
        ))
        .routes(routes!(
            contest::list_participants,
            contest::add_participant
        ))
        .routes(routes!(contest::remove_participant))
        .routes(routes!(
            contest::register_for_contest,
            contest::unregister_from_contest
        ))
        .routes(routes!(contest::get_leaderboard))
        .routes(routes!(contest::get_contest_stats))
        .routes(routes!(submission::run_contest_code))
        .routes(routes!(submission::create_contest_submission))
        .routes(routes!(submission::list_contest_submissions))
}

fn discussion_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            discussion::list_discussions,
            discussion::create_discussion
        ))
        .routes(routes!(
            discussion::get_discussion,
            discussion::update_discussion,
            discussion::delete_discussion
        ))
        .routes(routes!(discussion::list_comments, discussion::create_comment))
        .routes(routes!(
            discussion::update_comment,
            discussion::delete_comment
        ))
}

fn assistant_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(assistant::chat))
}
