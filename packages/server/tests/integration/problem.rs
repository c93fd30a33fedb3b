use serde_json::json;

use crate::common::{TestApp, routes, source};

fn valid_problem_body(title: &str) -> serde_json::Value {
    json!({
        "title": title,
        "description": "Read a line and print it back.",
        "difficulty": "medium",
        "tags": ["Strings", "implementation", "strings"],
        "time_limit": 2000,
        "memory_limit": 131072,
        "starter_code": {"cpp": "int main() {}", "python": "print(input())"},
        "is_public": true,
        "test_cases": [
            {"input": "hello", "expected_output": "hello", "is_sample": true, "explanation": "Echo."},
            {"input": "world", "expected_output": "world"},
        ],
    })
}

mod create {
    use super::*;

    #[tokio::test]
    async fn setter_creates_problem_with_tags_and_inline_test_cases() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("setter", "password123", "problem_setter")
            .await;

        let res = app
            .post_with_token(routes::PROBLEMS, &valid_problem_body("Echo"), &token)
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["title"], "Echo");
        assert_eq!(res.body["difficulty"], "medium");
        assert_eq!(res.body["tags"], json!(["implementation", "strings"]));
        assert_eq!(res.body["starter_code"]["python"], "print(input())");
        assert_eq!(res.body["author_id"], app.user_id(&token).await);
        assert_eq!(res.body["has_solution_video"], false);

        let samples = res.body["samples"].as_array().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0]["input"], "hello");
        assert_eq!(samples[0]["explanation"], "Echo.");

        let cases = app
            .get_with_token(&routes::test_cases(res.id()), &token)
            .await;
        assert_eq!(cases.body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn contestant_cannot_create_problems() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let res = app
            .post_with_token(routes::PROBLEMS, &valid_problem_body("Echo"), &token)
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn invalid_fields_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;

        let cases = [
            ("title", json!("")),
            ("time_limit", json!(0)),
            ("memory_limit", json!(2_000_000)),
            ("tags", json!([""])),
            ("difficulty", json!("impossible")),
        ];
        for (field, value) in cases {
            let mut body = valid_problem_body("Echo");
            body[field] = value;

            let res = app.post_with_token(routes::PROBLEMS, &body, &token).await;

            assert_eq!(res.status, 400, "field {field}: {}", res.text);
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }
    }
}

mod read {
    use super::*;

    #[tokio::test]
    async fn anonymous_list_shows_public_problems_only() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        app.create_problem(&admin, "Public").await;
        app.create_problem_with(&admin, "Hidden", "easy", false)
            .await;

        let anon = app.get_without_token(routes::PROBLEMS).await;
        assert_eq!(anon.status, 200);
        assert_eq!(anon.body["pagination"]["total"], 1);
        assert_eq!(anon.body["data"][0]["title"], "Public");
        assert!(anon.body["data"][0]["solved"].is_null());

        let editor = app.get_with_token(routes::PROBLEMS, &admin).await;
        assert_eq!(editor.body["pagination"]["total"], 2);
    }

    #[tokio::test]
    async fn hidden_problem_is_not_found_for_contestants() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let hidden = app
            .create_problem_with(&admin, "Hidden", "easy", false)
            .await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let res = app.get_with_token(&routes::problem(hidden), &token).await;
        assert_eq!(res.status, 404);

        let anon = app.get_without_token(&routes::problem(hidden)).await;
        assert_eq!(anon.status, 404);

        let editor = app.get_with_token(&routes::problem(hidden), &admin).await;
        assert_eq!(editor.status, 200);
    }

    #[tokio::test]
    async fn list_filters_by_search_difficulty_and_tag() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        app.create_problem_with(&admin, "Two Sum", "easy", true).await;
        app.create_problem_with(&admin, "Shortest Path", "hard", true)
            .await;
        let mut tagged = valid_problem_body("100% Legit");
        tagged["tags"] = json!(["graphs"]);
        let res = app.post_with_token(routes::PROBLEMS, &tagged, &admin).await;
        assert_eq!(res.status, 201, "{}", res.text);

        let search = app
            .get_without_token(&format!("{}?search=two", routes::PROBLEMS))
            .await;
        assert_eq!(search.body["pagination"]["total"], 1);
        assert_eq!(search.body["data"][0]["title"], "Two Sum");

        let percent = app
            .get_without_token(&format!("{}?search=100%25", routes::PROBLEMS))
            .await;
        assert_eq!(percent.body["pagination"]["total"], 1);

        let hard = app
            .get_without_token(&format!("{}?difficulty=hard", routes::PROBLEMS))
            .await;
        assert_eq!(hard.body["pagination"]["total"], 1);
        assert_eq!(hard.body["data"][0]["title"], "Shortest Path");

        let graphs = app
            .get_without_token(&format!("{}?tag=Graphs", routes::PROBLEMS))
            .await;
        assert_eq!(graphs.body["pagination"]["total"], 1);
        assert_eq!(graphs.body["data"][0]["title"], "100% Legit");
    }

    #[tokio::test]
    async fn list_sorts_by_difficulty_rank() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        app.create_problem_with(&admin, "H", "hard", true).await;
        app.create_problem_with(&admin, "E", "easy", true).await;
        app.create_problem_with(&admin, "M", "medium", true).await;

        let res = app
            .get_without_token(&format!(
                "{}?sort_by=difficulty&sort_order=asc",
                routes::PROBLEMS
            ))
            .await;

        let titles: Vec<&str> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, ["E", "M", "H"]);

        let bad = app
            .get_without_token(&format!("{}?sort_by=author", routes::PROBLEMS))
            .await;
        assert_eq!(bad.status, 400);
    }

    #[tokio::test]
    async fn solved_flag_reflects_accepted_submissions() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let solved = app.create_judgeable_problem(&admin, "Solved").await;
        let unsolved = app.create_judgeable_problem(&admin, "Unsolved").await;
        let token = app.create_authenticated_user("alice", "password123").await;
        app.create_submission(solved, &token, source::ECHO).await;
        app.create_submission(unsolved, &token, source::WRONG).await;

        let res = app.get_with_token(routes::PROBLEMS, &token).await;

        for item in res.body["data"].as_array().unwrap() {
            let expected = item["id"] == json!(solved);
            assert_eq!(item["solved"], expected, "problem {}", item["title"]);
        }
    }

    #[tokio::test]
    async fn tags_are_counted_over_visible_problems() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        app.create_problem(&admin, "One").await;
        app.create_problem(&admin, "Two").await;
        let mut hidden = valid_problem_body("Hidden");
        hidden["is_public"] = json!(false);
        hidden["tags"] = json!(["secret"]);
        app.post_with_token(routes::PROBLEMS, &hidden, &admin).await;

        let res = app.get_without_token(routes::PROBLEM_TAGS).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body, json!([{"tag": "implementation", "count": 2}]));
    }
}

mod update_and_delete {
    use super::*;

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "Old").await;

        let res = app
            .patch_with_token(
                &routes::problem(id),
                &json!({"title": "New", "tags": ["dp"]}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["title"], "New");
        assert_eq!(res.body["tags"], json!(["dp"]));
        assert_eq!(res.body["difficulty"], "easy");
        assert_eq!(res.body["time_limit"], 1000);
    }

    #[tokio::test]
    async fn empty_patch_returns_problem_unchanged() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "Same").await;
        let before = app.get_with_token(&routes::problem(id), &admin).await;

        let res = app
            .patch_with_token(&routes::problem(id), &json!({}), &admin)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["updated_at"], before.body["updated_at"]);
    }

    #[tokio::test]
    async fn delete_removes_problem_and_detaches_discussions() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_judgeable_problem(&admin, "Doomed").await;
        let thread = app.create_discussion(&admin, "About it", Some(id)).await;

        let res = app.delete_with_token(&routes::problem(id), &admin).await;
        assert_eq!(res.status, 204, "{}", res.text);

        let gone = app.get_with_token(&routes::problem(id), &admin).await;
        assert_eq!(gone.status, 404);

        let discussion = app.get_with_token(&routes::discussion(thread), &admin).await;
        assert_eq!(discussion.status, 200);
        assert!(discussion.body["problem_id"].is_null());
    }

    #[tokio::test]
    async fn problem_with_submissions_cannot_be_deleted() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_judgeable_problem(&admin, "Used").await;
        app.create_submission(id, &admin, source::ECHO).await;

        let res = app.delete_with_token(&routes::problem(id), &admin).await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn problem_in_a_contest_cannot_be_deleted() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "Linked").await;
        let contest = app.create_contest(&admin, "Cup", true, 60, 120).await;
        app.add_problem_to_contest(contest, id, "A", &admin).await;

        let res = app.delete_with_token(&routes::problem(id), &admin).await;

        assert_eq!(res.status, 409);
    }

    #[tokio::test]
    async fn setter_cannot_delete_problems() {
        let app = TestApp::spawn().await;
        let setter = app
            .create_user_with_role("setter", "password123", "problem_setter")
            .await;
        let id = app.create_problem(&setter, "Mine").await;

        let res = app.delete_with_token(&routes::problem(id), &setter).await;

        assert_eq!(res.status, 403);
    }
}

mod test_cases {
    use super::*;

    #[tokio::test]
    async fn positions_are_assigned_in_creation_order() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let first = app.create_test_case(id, &admin, true).await;
        let second = app.create_test_case(id, &admin, false).await;

        let res = app.get_with_token(&routes::test_cases(id), &admin).await;

        assert_eq!(res.status, 200);
        let list = res.body.as_array().unwrap();
        assert_eq!(list[0]["id"], first);
        assert_eq!(list[0]["position"], 0);
        assert_eq!(list[1]["id"], second);
        assert_eq!(list[1]["position"], 1);
    }

    #[tokio::test]
    async fn list_truncates_long_previews() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let long = "x".repeat(500);
        let created = app
            .post_with_token(
                &routes::test_cases(id),
                &json!({"input": long, "expected_output": long}),
                &admin,
            )
            .await;
        assert_eq!(created.status, 201);

        let list = app.get_with_token(&routes::test_cases(id), &admin).await;
        let preview = list.body[0]["input_preview"].as_str().unwrap();
        assert!(preview.len() < 500);
        assert!(preview.ends_with("..."));

        let full = app
            .get_with_token(&routes::test_case(id, created.id()), &admin)
            .await;
        assert_eq!(full.body["input"].as_str().unwrap().len(), 500);
    }

    #[tokio::test]
    async fn contestant_cannot_read_test_cases() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let tc = app.create_test_case(id, &admin, false).await;
        let token = app.create_authenticated_user("alice", "password123").await;

        let list = app.get_with_token(&routes::test_cases(id), &token).await;
        assert_eq!(list.status, 403);

        let one = app.get_with_token(&routes::test_case(id, tc), &token).await;
        assert_eq!(one.status, 403);
    }

    #[tokio::test]
    async fn test_case_of_another_problem_is_not_found() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let a = app.create_problem(&admin, "A").await;
        let b = app.create_problem(&admin, "B").await;
        let tc = app.create_test_case(a, &admin, false).await;

        let res = app.get_with_token(&routes::test_case(b, tc), &admin).await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn update_can_clear_explanation() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let created = app
            .post_with_token(
                &routes::test_cases(id),
                &json!({"input": "1", "expected_output": "1", "is_sample": true, "explanation": "why"}),
                &admin,
            )
            .await;

        let res = app
            .patch_with_token(
                &routes::test_case(id, created.id()),
                &json!({"explanation": null, "expected_output": "2"}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["explanation"].is_null());
        assert_eq!(res.body["expected_output"], "2");
        assert_eq!(res.body["input"], "1");
    }

    #[tokio::test]
    async fn judged_test_case_cannot_be_deleted() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let judged = app.create_test_case(id, &admin, true).await;
        app.create_submission(id, &admin, source::ECHO).await;
        let fresh = app.create_test_case(id, &admin, false).await;

        let res = app
            .delete_with_token(&routes::test_case(id, judged), &admin)
            .await;
        assert_eq!(res.status, 409);

        let res = app
            .delete_with_token(&routes::test_case(id, fresh), &admin)
            .await;
        assert_eq!(res.status, 204);
    }

    #[tokio::test]
    async fn reorder_requires_every_test_case_exactly_once() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let a = app.create_test_case(id, &admin, false).await;
        let b = app.create_test_case(id, &admin, false).await;

        let partial = app
            .put_with_token(
                &routes::test_cases_reorder(id),
                &json!({"test_case_ids": [a]}),
                &admin,
            )
            .await;
        assert_eq!(partial.status, 400);

        let res = app
            .put_with_token(
                &routes::test_cases_reorder(id),
                &json!({"test_case_ids": [b, a]}),
                &admin,
            )
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let list = app.get_with_token(&routes::test_cases(id), &admin).await;
        assert_eq!(list.body[0]["id"], b);
        assert_eq!(list.body[1]["id"], a);
    }
}

mod solution_video {
    use super::*;

    fn video_body() -> serde_json::Value {
        json!({
            "video_url": "https://cdn.example.com/videos/echo.mp4",
            "public_id": "editorials/echo",
            "duration_seconds": 300,
        })
    }

    #[tokio::test]
    async fn editor_stores_and_replaces_video() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;

        let first = app
            .put_with_token(&routes::solution_video(id), &video_body(), &admin)
            .await;
        assert_eq!(first.status, 200, "{}", first.text);

        let mut replacement = video_body();
        replacement["duration_seconds"] = json!(120);
        let second = app
            .put_with_token(&routes::solution_video(id), &replacement, &admin)
            .await;
        assert_eq!(second.status, 200);

        let res = app.get_without_token(&routes::solution_video(id)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["duration_seconds"], 120);

        let problem = app.get_without_token(&routes::problem(id)).await;
        assert_eq!(problem.body["has_solution_video"], true);
    }

    #[tokio::test]
    async fn non_http_url_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;
        let mut body = video_body();
        body["video_url"] = json!("javascript:alert(1)");

        let res = app
            .put_with_token(&routes::solution_video(id), &body, &admin)
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn deleting_missing_video_is_not_found() {
        let app = TestApp::spawn().await;
        let admin = app
            .create_user_with_role("admin1", "password123", "admin")
            .await;
        let id = app.create_problem(&admin, "P").await;

        let res = app
            .delete_with_token(&routes::solution_video(id), &admin)
            .await;
        assert_eq!(res.status, 404);

        app.put_with_token(&routes::solution_video(id), &video_body(), &admin)
            .await;
        let res = app
            .delete_with_token(&routes::solution_video(id), &admin)
            .await;
        assert_eq!(res.status, 204);

        let video = app.get_without_token(&routes::solution_video(id)).await;
        assert_eq!(video.status, 404);
    }
}
