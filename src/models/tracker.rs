// src/models/tracker.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'exam_trackers' table: one rolling 7-day exam-creation
/// window per user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamTracker {
    pub id: i64,
    pub user_id: i64,
    pub max_exams_per_week: i64,
    pub week_start: chrono::NaiveDate,
    pub next_week_start: chrono::NaiveDate,
    pub exams_count: i64,
    pub updated_at: Option<chrono::NaiveDateTime>,
}
