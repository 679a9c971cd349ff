// src/services/tracker.rs

use chrono::{Duration, NaiveDate};
use sqlx::SqliteConnection;

use crate::{error::AppError, models::tracker::ExamTracker};

/// A fresh window starting today.
pub fn rolled_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(7))
}

pub fn window_expired(next_week_start: NaiveDate, today: NaiveDate) -> bool {
    today > next_week_start
}

/// Creates the tracker row for a user if it does not exist yet.
/// Called from registration and again before counting, so the row always
/// exists for users seeded outside the register endpoint.
pub async fn ensure_tracker(
    conn: &mut SqliteConnection,
    user_id: i64,
    max_exams_per_week: i64,
) -> Result<(), AppError> {
    let (week_start, next_week_start) = rolled_window(chrono::Utc::now().date_naive());

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO exam_trackers (user_id, max_exams_per_week, week_start, next_week_start)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(max_exams_per_week)
    .bind(week_start)
    .bind(next_week_start)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Accounts for a freshly inserted exam inside the same transaction as the
/// insert. Rolls the window over when it has expired, recounts from actual
/// exam rows, and fails with 429 when the count exceeds the user's maximum,
/// rolling the whole creation back.
pub async fn record_exam_creation(
    conn: &mut SqliteConnection,
    user_id: i64,
    default_max: i64,
    today: NaiveDate,
) -> Result<(), AppError> {
    ensure_tracker(&mut *conn, user_id, default_max).await?;

    let tracker: ExamTracker = sqlx::query_as(
        r#"
        SELECT id, user_id, max_exams_per_week, week_start, next_week_start, exams_count, updated_at
        FROM exam_trackers
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let (week_start, next_week_start) = if window_expired(tracker.next_week_start, today) {
        rolled_window(today)
    } else {
        (tracker.week_start, tracker.next_week_start)
    };

    // Recount from actual exam rows; the new exam is already inserted.
    let exams_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exams WHERE created_by = ? AND DATE(created_at) >= ?",
    )
    .bind(user_id)
    .bind(week_start)
    .fetch_one(&mut *conn)
    .await?;

    if exams_count > tracker.max_exams_per_week {
        return Err(AppError::RateLimited(format!(
            "Weekly exam limit of {} reached, try again after {}",
            tracker.max_exams_per_week, next_week_start
        )));
    }

    sqlx::query(
        r#"
        UPDATE exam_trackers
        SET week_start = ?, next_week_start = ?, exams_count = ?, updated_at = CURRENT_TIMESTAMP
        WHERE user_id = ?
        "#,
    )
    .bind(week_start)
    .bind(next_week_start)
    .bind(exams_count)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
