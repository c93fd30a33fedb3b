use serde_json::json;

use crate::common::{TestApp, routes, source};

mod profile {
    use super::*;

    #[tokio::test]
    async fn profile_is_public_and_starts_with_empty_stats() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.user_id(&token).await;

        let res = app.get_without_token(&routes::user(id)).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["username"], "alice");
        assert_eq!(res.body["stats"]["solved_total"], 0);
        assert_eq!(res.body["stats"]["total_submissions"], 0);
        assert_eq!(res.body["stats"]["acceptance_rate"], 0.0);
        assert!(res.body.get("password").is_none());
    }

    #[tokio::test]
    async fn unknown_user_returns_404() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(&routes::user(99999)).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn stats_count_solved_problems_per_difficulty() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "securepass", "admin")
            .await;
        let easy = app.create_judgeable_problem(&admin, "Easy One").await;
        let hard = app.create_problem_with(&admin, "Hard One", "hard", true).await;
        app.create_test_case(hard, &admin, true).await;

        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.user_id(&token).await;
        app.create_submission(easy, &token, source::ECHO).await;
        app.create_submission(easy, &token, source::ECHO).await;
        app.create_submission(hard, &token, source::WRONG).await;
        app.create_submission(hard, &token, source::ECHO).await;

        let res = app.get_without_token(&routes::user(id)).await;
        let stats = &res.body["stats"];

        assert_eq!(stats["solved_total"], 2);
        assert_eq!(stats["solved_easy"], 1);
        assert_eq!(stats["solved_medium"], 0);
        assert_eq!(stats["solved_hard"], 1);
        assert_eq!(stats["total_submissions"], 4);
        assert_eq!(stats["accepted_submissions"], 3);
        assert_eq!(stats["acceptance_rate"], 0.75);
        let recent = stats["recent_submissions"].as_array().unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0]["problem_title"], "Hard One");
        assert_eq!(recent[0]["verdict"], "Accepted");
    }

    #[tokio::test]
    async fn update_profile_sets_and_clears_fields() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let set = app
            .patch_with_token(
                routes::MY_PROFILE,
                &json!({"display_name": "  Alice  ", "bio": "I like graphs"}),
                &token,
            )
            .await;
        assert_eq!(set.status, 200, "{}", set.text);
        assert_eq!(set.body["display_name"], "Alice");
        assert_eq!(set.body["bio"], "I like graphs");

        let clear = app
            .patch_with_token(routes::MY_PROFILE, &json!({"bio": null}), &token)
            .await;
        assert_eq!(clear.status, 200);
        assert_eq!(clear.body["display_name"], "Alice");
        assert!(clear.body["bio"].is_null());
    }

    #[tokio::test]
    async fn blank_display_name_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app
            .patch_with_token(routes::MY_PROFILE, &json!({"display_name": "   "}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod password {
    use super::*;

    #[tokio::test]
    async fn changed_password_is_required_for_next_login() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app
            .put_with_token(
                routes::MY_PASSWORD,
                &json!({"current_password": "securepass", "new_password": "evenmoresecure"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let old = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "alice", "password": "securepass"}),
            )
            .await;
        assert_eq!(old.status, 401);

        let new = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "alice", "password": "evenmoresecure"}),
            )
            .await;
        assert_eq!(new.status, 200);
    }

    #[tokio::test]
    async fn wrong_current_password_is_forbidden() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app
            .put_with_token(
                routes::MY_PASSWORD,
                &json!({"current_password": "notmypass", "new_password": "evenmoresecure"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn new_password_must_satisfy_length_policy() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app
            .put_with_token(
                routes::MY_PASSWORD,
                &json!({"current_password": "securepass", "new_password": "short"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod account_deletion {
    use super::*;

    #[tokio::test]
    async fn deleting_account_removes_submissions_and_keeps_authored_problems() {
        let app = TestApp::spawn().await;
        let setter = app
            .create_user_with_role("setter", "securepass", "problem_setter")
            .await;
        let problem_id = app.create_judgeable_problem(&setter, "Echo").await;
        app.create_submission(problem_id, &setter, source::ECHO).await;
        app.create_discussion(&setter, "Hint?", Some(problem_id)).await;

        let res = app
            .delete_with_body(
                routes::MY_PROFILE,
                &json!({"password": "securepass"}),
                &setter,
            )
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let admin = app
            .create_user_with_role("admin1", "securepass", "admin")
            .await;
        let problem = app.get_with_token(&routes::problem(problem_id), &admin).await;
        assert_eq!(problem.status, 200);
        assert!(problem.body["author_id"].is_null());

        let subs = app.get_with_token(routes::SUBMISSIONS, &admin).await;
        assert_eq!(subs.body["pagination"]["total"], 0);

        let threads = app.get_with_token(routes::DISCUSSIONS, &admin).await;
        assert_eq!(threads.body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn wrong_password_keeps_the_account() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app
            .delete_with_body(
                routes::MY_PROFILE,
                &json!({"password": "notmypass"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 403);

        let me = app.get_with_token(routes::ME, &token).await;
        assert_eq!(me.status, 200);
    }
}

mod administration {
    use super::*;

    #[tokio::test]
    async fn admin_can_list_and_filter_users() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "securepass", "admin")
            .await;
        app.create_authenticated_user("alice", "securepass").await;
        app.create_authenticated_user("bob", "securepass").await;

        let all = app.get_with_token(routes::USERS, &admin).await;
        assert_eq!(all.status, 200, "{}", all.text);
        assert_eq!(all.body["pagination"]["total"], 3);

        let search = app
            .get_with_token(&format!("{}?search=ALI", routes::USERS), &admin)
            .await;
        assert_eq!(search.body["pagination"]["total"], 1);
        assert_eq!(search.body["data"][0]["username"], "alice");

        let by_role = app
            .get_with_token(&format!("{}?role=admin", routes::USERS), &admin)
            .await;
        assert_eq!(by_role.body["pagination"]["total"], 1);
        assert_eq!(by_role.body["data"][0]["username"], "admin1");
    }

    #[tokio::test]
    async fn contestant_cannot_list_users_or_change_roles() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.user_id(&token).await;

        let list = app.get_with_token(routes::USERS, &token).await;
        assert_eq!(list.status, 403);
        assert_eq!(list.body["code"], "PERMISSION_DENIED");

        let promote = app
            .patch_with_token(&routes::user_role(id), &json!({"role": "admin"}), &token)
            .await;
        assert_eq!(promote.status, 403);
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "securepass", "admin")
            .await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.user_id(&token).await;

        let res = app
            .patch_with_token(&routes::user_role(id), &json!({"role": "overlord"}), &admin)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}
