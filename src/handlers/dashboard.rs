// src/handlers/dashboard.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::exam::{STATUS_COMPLETED, SubmissionListItem},
    utils::jwt::Claims,
};

/// Aggregated landing-page stats: completed exam count, average score and
/// the three most recent submissions.
pub async fn dashboard(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let exams_completed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE user_id = ? AND status = ?")
            .bind(user_id)
            .bind(STATUS_COMPLETED)
            .fetch_one(&pool)
            .await?;

    let average_score: Option<f64> =
        sqlx::query_scalar("SELECT AVG(score) FROM submissions WHERE user_id = ? AND status = ?")
            .bind(user_id)
            .bind(STATUS_COMPLETED)
            .fetch_one(&pool)
            .await?;

    let recent_exams: Vec<SubmissionListItem> = sqlx::query_as(
        r#"
        SELECT s.id, s.exam_id, e.title AS exam_title, s.score, s.status, s.created_at
        FROM submissions s
        JOIN exams e ON e.id = s.exam_id
        WHERE s.user_id = ?
        ORDER BY s.created_at DESC, s.id DESC
        LIMIT 3
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "exams_completed": exams_completed,
        "average_score": average_score,
        "recent_exams": recent_exams,
    })))
}
