// tests/exam_tests.rs

mod common;

use std::collections::HashMap;

use common::spawn_app;

#[tokio::test]
async fn create_exam_samples_quota_from_lesson() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    let problem_ids = common::seed_problems(&app.pool, lesson, 12).await;

    let response = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);

    let exam_id = response.json::<serde_json::Value>().await.unwrap()["id"]
        .as_i64()
        .unwrap();

    let exam: serde_json::Value = client
        .get(format!("{}/api/exams/{}", app.address, exam_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    // Lesson quota is 10: 10 distinct problems from the lesson's pool,
    // ordered 1..10, with the correct flags stripped from the choices.
    let problems = exam["problems"].as_array().unwrap();
    assert_eq!(problems.len(), 10);

    let mut seen = std::collections::HashSet::new();
    for (idx, problem) in problems.iter().enumerate() {
        assert_eq!(problem["order"].as_i64().unwrap(), idx as i64 + 1);
        let problem_id = problem["problem_id"].as_i64().unwrap();
        assert!(problem_ids.contains(&problem_id));
        assert!(seen.insert(problem_id), "problems must be distinct");

        let choices = problem["choices"].as_array().unwrap();
        assert_eq!(choices.len(), 4);
        for choice in choices {
            assert!(choice.get("is_correct").is_none());
        }
    }
}

#[tokio::test]
async fn create_exam_fails_atomically_when_pool_too_small() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 3).await;

    let response = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);

    // No partial exam row survives the failed creation.
    let exams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exams")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(exams, 0);
}

#[tokio::test]
async fn create_exam_unknown_scope_is_404() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let response = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": 424242 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn custom_exam_deduplicates_overlapping_scopes() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let (_, _, chapter, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 8).await;

    // The chapter subtree contains the lesson, so the combined pool is
    // still the same 8 problems.
    let response = client
        .post(format!("{}/api/exams/custom", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_ids": [chapter, lesson], "problem_count": 8 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);

    let exam_id = response.json::<serde_json::Value>().await.unwrap()["id"]
        .as_i64()
        .unwrap();

    let slots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exam_problems WHERE exam_id = ?")
        .bind(exam_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(slots, 8);

    // Asking for more than the deduplicated pool fails.
    let response = client
        .post(format!("{}/api/exams/custom", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_ids": [chapter, lesson], "problem_count": 9 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unpublished_problems_are_excluded() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 5).await;
    sqlx::query("UPDATE problems SET is_published = 0 WHERE scope_id = ?")
        .bind(lesson)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/exams/custom", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_ids": [lesson], "problem_count": 1 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

/// Full solve flow: 8 correct answers, 2 blanks, plus malformed entries that
/// must be silently ignored.
#[tokio::test]
async fn solve_flow_scores_and_refuses_regrade() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 12).await;

    let created: serde_json::Value = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    let exam_id = created["id"].as_i64().unwrap();

    // Opening the solve page creates the submission.
    let opened: serde_json::Value = client
        .get(format!("{}/api/exams/{}/solve", app.address, exam_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    assert_eq!(opened["submission"]["status"], "exited_unexpectedly");
    let submission_id = opened["submission"]["id"].as_i64().unwrap();

    let problems = opened["exam"]["problems"].as_array().unwrap();
    assert_eq!(problems.len(), 10);

    // Correct answers for slots 1..=8; slot 9 gets garbage, slot 10 gets a
    // choice belonging to a different problem. Both count as unanswered.
    let mut answers: HashMap<String, String> = HashMap::new();
    for problem in &problems[..8] {
        let order = problem["order"].as_i64().unwrap();
        let problem_id = problem["problem_id"].as_i64().unwrap();
        let choice = common::correct_choice(&app.pool, problem_id).await;
        answers.insert(format!("problem_{}", order), choice.to_string());
    }
    answers.insert("problem_9".to_string(), "not-a-number".to_string());
    let foreign_choice =
        common::wrong_choice(&app.pool, problems[0]["problem_id"].as_i64().unwrap()).await;
    answers.insert("problem_10".to_string(), foreign_choice.to_string());

    let result: serde_json::Value = client
        .post(format!("{}/api/exams/{}/solve", app.address, exam_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    assert_eq!(result["score"], 8);
    assert_eq!(result["total_problems"], 10);
    assert_eq!(result["wrong_answers"], 2);
    assert_eq!(result["percentage"], 80.0);

    // Only the accepted answers were persisted.
    let answer_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE submission_id = ?")
            .bind(submission_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(answer_rows, 8);

    // The result view recomputes the same numbers.
    let view: serde_json::Value = client
        .get(format!("{}/api/submissions/{}", app.address, submission_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    assert_eq!(view["status"], "completed");
    assert_eq!(view["score"], 8);
    assert_eq!(view["percentage"], 80.0);
    assert_eq!(view["wrong_answers"], 2);

    // Grading is one-way: a second submit is refused and the score stays.
    let regrade = client
        .post(format!("{}/api/exams/{}/solve", app.address, exam_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "answers": {} }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(regrade.status().as_u16(), 400);

    let score: Option<i64> = sqlx::query_scalar("SELECT score FROM submissions WHERE id = ?")
        .bind(submission_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(score, Some(8));
}

#[tokio::test]
async fn solve_page_reuses_the_single_submission() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 12).await;

    let created: serde_json::Value = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exam_id = created["id"].as_i64().unwrap();

    let mut submission_ids = Vec::new();
    for _ in 0..2 {
        let opened: serde_json::Value = client
            .get(format!("{}/api/exams/{}/solve", app.address, exam_id))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        submission_ids.push(opened["submission"]["id"].as_i64().unwrap());
    }

    assert_eq!(submission_ids[0], submission_ids[1]);
}

#[tokio::test]
async fn foreign_exam_and_result_are_forbidden() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = common::register_and_login(&app, &client).await;
    let (other_token, _) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 12).await;

    let created: serde_json::Value = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exam_id = created["id"].as_i64().unwrap();

    let opened: serde_json::Value = client
        .get(format!("{}/api/exams/{}/solve", app.address, exam_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let submission_id = opened["submission"]["id"].as_i64().unwrap();

    let exam_response = client
        .get(format!("{}/api/exams/{}", app.address, exam_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(exam_response.status().as_u16(), 403);

    let result_response = client
        .get(format!("{}/api/submissions/{}", app.address, submission_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(result_response.status().as_u16(), 403);
}

#[tokio::test]
async fn weekly_exam_limit_blocks_then_rolls_over() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, user_id) = common::register_and_login(&app, &client).await;

    let (_, _, _, lesson) = common::seed_curriculum(&app.pool).await;
    common::seed_problems(&app.pool, lesson, 12).await;

    // max_exams_per_week is 3 in the test config.
    for _ in 0..3 {
        let response = client
            .post(format!("{}/api/exams", app.address))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "scope_id": lesson }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
    }

    let blocked = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(blocked.status().as_u16(), 429);

    // The refused creation left no exam behind.
    let exams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exams WHERE created_by = ?")
        .bind(user_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(exams, 3);

    // Push the window and the existing exams into the past; the next
    // creation rolls the window over and succeeds.
    sqlx::query(
        "UPDATE exam_trackers SET week_start = '2020-01-01', next_week_start = '2020-01-08'
         WHERE user_id = ?",
    )
    .bind(user_id)
    .execute(&app.pool)
    .await
    .unwrap();
    sqlx::query("UPDATE exams SET created_at = '2020-01-02 00:00:00' WHERE created_by = ?")
        .bind(user_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let after_rollover = client
        .post(format!("{}/api/exams", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "scope_id": lesson }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(after_rollover.status().as_u16(), 201);

    let count: i64 = sqlx::query_scalar("SELECT exams_count FROM exam_trackers WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
