// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::problem::PublicChoice;

/// Submission status values. The row is created in 'exited_unexpectedly' on
/// the first visit to the solve page and flips to 'completed' exactly once,
/// when grading succeeds.
pub const STATUS_EXITED_UNEXPECTEDLY: &str = "exited_unexpectedly";
pub const STATUS_COMPLETED: &str = "completed";

/// Represents the 'exams' table: an immutable, ordered snapshot of sampled
/// problems created for one or more scopes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub created_by: i64,
    pub is_published: bool,
    pub created_at: Option<chrono::NaiveDateTime>,
}

/// Represents the 'submissions' table: one user's single attempt at an exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub exam_id: i64,
    pub user_id: i64,
    pub score: Option<i64>,
    pub status: String,
    pub created_at: Option<chrono::NaiveDateTime>,
}

/// DTO for creating an exam from a single scope (quota derived from level).
#[derive(Debug, Deserialize)]
pub struct CreateExamRequest {
    pub scope_id: i64,
}

/// DTO for creating an exam from several scopes with an explicit count.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomExamRequest {
    #[validate(length(min = 1, max = 20))]
    pub scope_ids: Vec<i64>,
    #[validate(range(min = 1, max = 200))]
    pub problem_count: i64,
}

/// One problem slot in the solve/view payload. The order number is the key
/// submitted answers are matched against.
#[derive(Debug, Serialize)]
pub struct ExamProblemView {
    pub order: i64,
    pub problem_id: i64,
    pub body: String,
    pub figure: Option<String>,
    pub difficulty: i64,
    pub choices: Vec<PublicChoice>,
}

/// Full exam payload with ordered problems and answer-stripped choices.
#[derive(Debug, Serialize)]
pub struct ExamDetailResponse {
    pub id: i64,
    pub title: String,
    pub created_by: i64,
    pub is_published: bool,
    pub created_at: Option<chrono::NaiveDateTime>,
    pub problems: Vec<ExamProblemView>,
}

/// DTO for submitting answers. Keys are "problem_{order}", values are choice
/// ids as strings; malformed entries are tolerated and skipped.
#[derive(Debug, Deserialize)]
pub struct SolveExamRequest {
    #[serde(default)]
    pub answers: std::collections::HashMap<String, String>,
}

/// Result view of a graded (or abandoned) submission. Percentage and wrong
/// answer count are computed on read, never stored.
#[derive(Debug, Serialize)]
pub struct SubmissionResultResponse {
    pub submission_id: i64,
    pub exam_id: i64,
    pub exam_title: String,
    pub status: String,
    pub score: Option<i64>,
    pub total_problems: i64,
    pub percentage: Option<f64>,
    pub wrong_answers: Option<i64>,
}

/// Row for listing a user's submissions with the exam title joined in.
#[derive(Debug, Serialize, FromRow)]
pub struct SubmissionListItem {
    pub id: i64,
    pub exam_id: i64,
    pub exam_title: String,
    pub score: Option<i64>,
    pub status: String,
    pub created_at: Option<chrono::NaiveDateTime>,
}
