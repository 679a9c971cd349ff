// tests/common/mod.rs

use std::str::FromStr;

use physics_exams::{
    config::{Config, ExamQuotas},
    routes,
    state::AppState,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
}

/// Spawns the app on a random port against a fresh in-memory SQLite
/// database. The single-connection pool is shared with the test for seeding
/// and assertions.
pub async fn spawn_app() -> TestApp {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Invalid SQLite options")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .expect("Failed to open in-memory SQLite database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        max_exams_per_week: 3,
        quotas: ExamQuotas::default(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, pool }
}

/// Registers a fresh user and logs in. Returns (token, user_id).
pub async fn register_and_login(app: &TestApp, client: &reqwest::Client) -> (String, i64) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    let registered: serde_json::Value = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed")
        .json()
        .await
        .expect("Failed to parse register json");

    let user_id = registered["id"].as_i64().expect("User id not found");

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    let token = login["token"].as_str().expect("Token not found").to_string();

    (token, user_id)
}

/// Inserts one scope row directly. The level is derived from the parent the
/// same way the admin handler does it.
pub async fn insert_scope(
    pool: &SqlitePool,
    title: &str,
    parent_id: Option<i64>,
    order: i64,
    published: bool,
) -> i64 {
    let level: i64 = match parent_id {
        None => 0,
        Some(parent) => {
            let parent_level: i64 = sqlx::query_scalar("SELECT level FROM scopes WHERE id = ?")
                .bind(parent)
                .fetch_one(pool)
                .await
                .unwrap();
            parent_level + 1
        }
    };

    sqlx::query_scalar(
        "INSERT INTO scopes (title, parent_id, level, in_scope_order, is_published)
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(title)
    .bind(parent_id)
    .bind(level)
    .bind(order)
    .bind(published)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Inserts `count` published problems under a lesson, each with four
/// choices. The first choice of every problem is the correct one. Returns
/// the problem ids.
pub async fn seed_problems(pool: &SqlitePool, lesson_id: i64, count: i64) -> Vec<i64> {
    let mut problem_ids = Vec::new();

    for i in 0..count {
        let problem_id: i64 = sqlx::query_scalar(
            "INSERT INTO problems (scope_id, body, difficulty, is_published)
             VALUES (?, ?, 1, 1) RETURNING id",
        )
        .bind(lesson_id)
        .bind(format!("Problem {}", i))
        .fetch_one(pool)
        .await
        .unwrap();

        for (j, correct) in [(0, true), (1, false), (2, false), (3, false)] {
            sqlx::query("INSERT INTO choices (problem_id, body, is_correct) VALUES (?, ?, ?)")
                .bind(problem_id)
                .bind(format!("Choice {}", j))
                .bind(correct)
                .execute(pool)
                .await
                .unwrap();
        }

        problem_ids.push(problem_id);
    }

    problem_ids
}

/// Builds a full textbook > unit > chapter > lesson chain, all published.
/// Returns (textbook_id, unit_id, chapter_id, lesson_id).
pub async fn seed_curriculum(pool: &SqlitePool) -> (i64, i64, i64, i64) {
    let textbook = insert_scope(pool, "Physics I", None, 0, true).await;
    let unit = insert_scope(pool, "Mechanics", Some(textbook), 1, true).await;
    let chapter = insert_scope(pool, "Kinematics", Some(unit), 1, true).await;
    let lesson = insert_scope(pool, "Uniform motion", Some(chapter), 1, true).await;
    (textbook, unit, chapter, lesson)
}

/// The correct choice id of a problem, straight from the database.
pub async fn correct_choice(pool: &SqlitePool, problem_id: i64) -> i64 {
    sqlx::query_scalar("SELECT id FROM choices WHERE problem_id = ? AND is_correct = 1")
        .bind(problem_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A wrong choice id of a problem.
pub async fn wrong_choice(pool: &SqlitePool, problem_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT id FROM choices WHERE problem_id = ? AND is_correct = 0 ORDER BY id LIMIT 1",
    )
    .bind(problem_id)
    .fetch_one(pool)
    .await
    .unwrap()
}
