use std::sync::Arc;

use arena_server::config::SubmissionConfig;
use arena_server::judge::DisabledJudge;
use serde_json::json;

use crate::common::{TestApp, TestOptions, routes, source};

fn submission_body(code: &str) -> serde_json::Value {
    json!({"language": "cpp", "code": code})
}

mod run {
    use super::*;

    #[tokio::test]
    async fn run_uses_sample_cases_and_persists_nothing() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let res = app
            .post_with_token(
                &routes::problem_run(problem_id),
                &submission_body(source::ECHO),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["verdict"], "Accepted");
        assert_eq!(res.body["passed"], 1);
        assert_eq!(res.body["total"], 1);
        assert_eq!(res.body["cases"][0]["stdout"], "1 2 3");
        assert_eq!(res.body["cases"][0]["expected_output"], "1 2 3");

        let list = app.get_with_token(routes::SUBMISSIONS, &token).await;
        assert_eq!(list.body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn custom_input_has_no_expected_output() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_problem(&admin, "No samples").await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let res = app
            .post_with_token(
                &routes::problem_run(problem_id),
                &json!({"language": "cpp", "code": source::ECHO, "custom_input": "42"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["cases"].as_array().unwrap().len(), 1);
        assert_eq!(res.body["cases"][0]["stdout"], "42");
        assert!(res.body["cases"][0]["expected_output"].is_null());
    }

    #[tokio::test]
    async fn run_without_samples_or_custom_input_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_problem(&admin, "No samples").await;

        let res = app
            .post_with_token(
                &routes::problem_run(problem_id),
                &submission_body(source::ECHO),
                &admin,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn compile_error_is_reported_without_cases() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;

        let res = app
            .post_with_token(
                &routes::problem_run(problem_id),
                &submission_body(source::BROKEN),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200);
        assert!(res.body["compile_error"].as_str().unwrap().contains("error"));
        assert!(res.body["cases"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn runs_are_rate_limited_per_user() {
        let app = TestApp::spawn_with(TestOptions {
            submission: SubmissionConfig {
                run_rate_limit_per_minute: 2,
                ..Default::default()
            },
            ..Default::default()
        })
        .await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let token = app.create_authenticated_user("alice", "password123").await;
        let path = routes::problem_run(problem_id);

        for _ in 0..2 {
            let res = app
                .post_with_token(&path, &submission_body(source::ECHO), &token)
                .await;
            assert_eq!(res.status, 200, "{}", res.text);
        }
        let res = app
            .post_with_token(&path, &submission_body(source::ECHO), &token)
            .await;

        assert_eq!(res.status, 429);
        assert_eq!(res.body["code"], "RATE_LIMITED");
        assert!(res.retry_after.is_some());

        let other = app
            .post_with_token(&path, &submission_body(source::ECHO), &admin)
            .await;
        assert_eq!(other.status, 200);
    }
}

mod submit {
    use super::*;

    #[tokio::test]
    async fn accepted_submission_is_judged_before_responding() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::ECHO),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["status"], "Judged");
        assert_eq!(res.body["verdict"], "Accepted");
        assert_eq!(res.body["passed_cases"], 2);
        assert_eq!(res.body["total_cases"], 2);
        assert_eq!(res.body["code"], source::ECHO);
        assert_eq!(res.body["problem_title"], "Echo");
        assert_eq!(res.body["username"], "alice");
        assert!(res.body["judged_at"].is_string());
        assert!(res.body["contest_id"].is_null());

        let results = res.body["test_case_results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["is_sample"], true);
        assert_eq!(results[0]["stdout"], "1 2 3");
        assert_eq!(results[1]["is_sample"], false);
        assert!(results[1]["stdout"].is_null());
    }

    #[tokio::test]
    async fn wrong_answer_reports_first_failing_verdict() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::WRONG),
                &admin,
            )
            .await;

        assert_eq!(res.status, 201);
        assert_eq!(res.body["status"], "Judged");
        assert_eq!(res.body["verdict"], "WrongAnswer");
        assert_eq!(res.body["passed_cases"], 0);
        assert_eq!(res.body["total_cases"], 2);
    }

    #[tokio::test]
    async fn compilation_error_is_stored_with_output() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::BROKEN),
                &admin,
            )
            .await;

        assert_eq!(res.status, 201);
        assert_eq!(res.body["status"], "CompilationError");
        assert!(res.body["verdict"].is_null());
        assert!(res.body["compile_output"].is_string());
        assert!(res.body["test_case_results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn judge_failure_is_stored_as_system_error() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::CRASH_JUDGE),
                &admin,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["status"], "SystemError");
        assert!(
            res.body["error_message"]
                .as_str()
                .unwrap()
                .contains("judge crashed")
        );
    }

    #[tokio::test]
    async fn invalid_submissions_are_rejected() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let path = routes::problem_submissions(problem_id);

        let bodies = [
            json!({"language": "brainfuck", "code": source::ECHO}),
            json!({"language": "", "code": source::ECHO}),
            json!({"language": "cpp", "code": "   "}),
            json!({"language": "cpp", "code": "x".repeat(70_000)}),
        ];
        for body in bodies {
            let res = app.post_with_token(&path, &body, &admin).await;
            assert_eq!(res.status, 400, "{}", res.text);
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn problem_without_test_cases_cannot_be_submitted_to() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_problem(&admin, "Empty").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::ECHO),
                &admin,
            )
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn hidden_problem_is_not_found_for_contestants() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app
            .create_problem_with(&admin, "Secret", "easy", false)
            .await;
        app.create_test_case(problem_id, &admin, true).await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::ECHO),
                &token,
            )
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn disabled_judge_refuses_before_storing() {
        let app = TestApp::spawn_with(TestOptions {
            judge: Arc::new(DisabledJudge),
            ..Default::default()
        })
        .await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::ECHO),
                &admin,
            )
            .await;
        assert_eq!(res.status, 503);
        assert_eq!(res.body["code"], "JUDGE_UNAVAILABLE");

        let run = app
            .post_with_token(
                &routes::problem_run(problem_id),
                &submission_body(source::ECHO),
                &admin,
            )
            .await;
        assert_eq!(run.status, 503);

        let list = app.get_with_token(routes::SUBMISSIONS, &admin).await;
        assert_eq!(list.body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn submissions_are_rate_limited_per_user() {
        let app = TestApp::spawn_with(TestOptions {
            submission: SubmissionConfig {
                rate_limit_per_minute: 2,
                ..Default::default()
            },
            ..Default::default()
        })
        .await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        app.create_submission(problem_id, &admin, source::ECHO).await;
        app.create_submission(problem_id, &admin, source::ECHO).await;

        let res = app
            .post_with_token(
                &routes::problem_submissions(problem_id),
                &submission_body(source::ECHO),
                &admin,
            )
            .await;

        assert_eq!(res.status, 429);
        assert_eq!(res.body["code"], "RATE_LIMITED");
        let retry_after: u64 = res.retry_after.unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry_after));
    }

    #[tokio::test]
    async fn concurrent_submissions_cannot_exceed_the_rate_limit() {
        let app = TestApp::spawn_with(TestOptions {
            submission: SubmissionConfig {
                rate_limit_per_minute: 2,
                ..Default::default()
            },
            ..Default::default()
        })
        .await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let path = routes::problem_submissions(problem_id);
        let body = submission_body(source::ECHO);

        let (a, b, c, d) = tokio::join!(
            app.post_with_token(&path, &body, &admin),
            app.post_with_token(&path, &body, &admin),
            app.post_with_token(&path, &body, &admin),
            app.post_with_token(&path, &body, &admin),
        );

        let statuses = [a.status, b.status, c.status, d.status];
        assert_eq!(statuses.iter().filter(|&&s| s == 201).count(), 2, "{statuses:?}");
        assert_eq!(statuses.iter().filter(|&&s| s == 429).count(), 2, "{statuses:?}");

        let list = app.get_with_token(routes::SUBMISSIONS, &admin).await;
        assert_eq!(list.body["pagination"]["total"], 2);
    }
}

mod visibility {
    use super::*;

    #[tokio::test]
    async fn other_users_submission_is_not_found() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let alice = app.create_authenticated_user("alice", "password123").await;
        let bob = app.create_authenticated_user("bob", "password123").await;
        let id = app.create_submission(problem_id, &alice, source::ECHO).await;

        let res = app.get_with_token(&routes::submission(id), &bob).await;
        assert_eq!(res.status, 404);

        let own = app.get_with_token(&routes::submission(id), &alice).await;
        assert_eq!(own.status, 200);
        assert_eq!(own.body["code"], source::ECHO);
    }

    #[tokio::test]
    async fn view_all_holder_sees_hidden_case_output() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let alice = app.create_authenticated_user("alice", "password123").await;
        let id = app.create_submission(problem_id, &alice, source::ECHO).await;

        let res = app.get_with_token(&routes::submission(id), &admin).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["code"], source::ECHO);
        let results = res.body["test_case_results"].as_array().unwrap();
        assert!(results.iter().all(|r| r["stdout"] == "1 2 3"));
    }

    #[tokio::test]
    async fn list_shows_own_submissions_unless_view_all() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let alice = app.create_authenticated_user("alice", "password123").await;
        let bob = app.create_authenticated_user("bob", "password123").await;
        app.create_submission(problem_id, &alice, source::ECHO).await;
        app.create_submission(problem_id, &bob, source::WRONG).await;
        let bob_id = app.user_id(&bob).await;

        let own = app.get_with_token(routes::SUBMISSIONS, &alice).await;
        assert_eq!(own.body["pagination"]["total"], 1);
        assert_eq!(own.body["data"][0]["username"], "alice");

        let sneaky = app
            .get_with_token(&format!("{}?user_id={bob_id}", routes::SUBMISSIONS), &alice)
            .await;
        assert_eq!(sneaky.body["pagination"]["total"], 1);
        assert_eq!(sneaky.body["data"][0]["username"], "alice");

        let all = app.get_with_token(routes::SUBMISSIONS, &admin).await;
        assert_eq!(all.body["pagination"]["total"], 2);

        let wrong = app
            .get_with_token(
                &format!("{}?verdict=WrongAnswer", routes::SUBMISSIONS),
                &admin,
            )
            .await;
        assert_eq!(wrong.body["pagination"]["total"], 1);
        assert_eq!(wrong.body["data"][0]["username"], "bob");
    }

    #[tokio::test]
    async fn problem_submission_list_is_own_only() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let alice = app.create_authenticated_user("alice", "password123").await;
        app.create_submission(problem_id, &alice, source::ECHO).await;
        app.create_submission(problem_id, &alice, source::WRONG).await;
        app.create_submission(problem_id, &admin, source::ECHO).await;

        let res = app
            .get_with_token(&routes::problem_submissions(problem_id), &alice)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 2);
        assert_eq!(res.body["data"][0]["verdict"], "WrongAnswer");
    }
}

mod rejudge {
    use super::*;

    #[tokio::test]
    async fn rejudge_uses_current_test_cases() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let alice = app.create_authenticated_user("alice", "password123").await;
        let id = app.create_submission(problem_id, &alice, source::ECHO).await;

        let extra = app
            .post_with_token(
                &routes::test_cases(problem_id),
                &json!({"input": "7", "expected_output": "8"}),
                &admin,
            )
            .await;
        assert_eq!(extra.status, 201);

        let res = app
            .post_with_token(&routes::submission_rejudge(id), &json!({}), &admin)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["verdict"], "WrongAnswer");
        assert_eq!(res.body["passed_cases"], 2);
        assert_eq!(res.body["total_cases"], 3);
        assert_eq!(res.body["test_case_results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn contestant_cannot_rejudge() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let alice = app.create_authenticated_user("alice", "password123").await;
        let id = app.create_submission(problem_id, &alice, source::ECHO).await;

        let res = app
            .post_with_token(&routes::submission_rejudge(id), &json!({}), &alice)
            .await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn unknown_submission_is_not_found() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;

        let res = app
            .post_with_token(&routes::submission_rejudge(99999), &json!({}), &admin)
            .await;

        assert_eq!(res.status, 404);
    }
}

mod interrupted {
    use arena_server::recovery::{INTERRUPTED_MESSAGE, fail_interrupted_submissions};

    use super::*;

    #[tokio::test]
    async fn unfinished_submissions_become_system_errors_at_startup() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let judging = app.create_submission(problem_id, &admin, source::ECHO).await;
        let pending = app.create_submission(problem_id, &admin, source::ECHO).await;
        let finished = app.create_submission(problem_id, &admin, source::ECHO).await;
        app.set_submission_status(judging, "Judging").await;
        app.set_submission_status(pending, "Pending").await;

        let swept = fail_interrupted_submissions(&app.db).await.unwrap();
        assert_eq!(swept, 2);

        for id in [judging, pending] {
            let res = app.get_with_token(&routes::submission(id), &admin).await;
            assert_eq!(res.body["status"], "SystemError");
            assert_eq!(res.body["error_message"], INTERRUPTED_MESSAGE);
        }
        let untouched = app.get_with_token(&routes::submission(finished), &admin).await;
        assert_eq!(untouched.body["status"], "Judged");
        assert_eq!(untouched.body["verdict"], "Accepted");

        let again = fail_interrupted_submissions(&app.db).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn swept_submission_can_be_rejudged() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let problem_id = app.create_judgeable_problem(&admin, "Echo").await;
        let id = app.create_submission(problem_id, &admin, source::ECHO).await;
        app.set_submission_status(id, "Judging").await;
        fail_interrupted_submissions(&app.db).await.unwrap();

        let res = app
            .post_with_token(&routes::submission_rejudge(id), &json!({}), &admin)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "Judged");
        assert_eq!(res.body["verdict"], "Accepted");
        assert!(res.body["error_message"].is_null());
    }
}
