// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        exam::{
            CreateCustomExamRequest, CreateExamRequest, Exam, ExamDetailResponse, ExamProblemView,
            STATUS_COMPLETED, STATUS_EXITED_UNEXPECTEDLY, SolveExamRequest, Submission,
            SubmissionListItem, SubmissionResultResponse,
        },
        problem::PublicChoice,
    },
    services::{generator, grader},
    utils::jwt::Claims,
};

async fn fetch_exam(pool: &SqlitePool, id: i64) -> Result<Exam, AppError> {
    sqlx::query_as("SELECT id, title, created_by, is_published, created_at FROM exams WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))
}

/// An exam is visible to its creator and, once published, to everyone.
fn check_exam_access(exam: &Exam, user_id: i64) -> Result<(), AppError> {
    if exam.created_by != user_id && !exam.is_published {
        return Err(AppError::Forbidden(
            "You do not have permission to view this exam".to_string(),
        ));
    }
    Ok(())
}

/// Row shape for the ordered problem list joined with problem bodies.
#[derive(sqlx::FromRow)]
struct ExamProblemRow {
    order: i64,
    problem_id: i64,
    body: String,
    figure: Option<String>,
    difficulty: i64,
}

/// Loads the exam's ordered problem snapshot with answer-stripped choices.
async fn fetch_exam_detail(pool: &SqlitePool, exam: &Exam) -> Result<ExamDetailResponse, AppError> {
    let rows: Vec<ExamProblemRow> = sqlx::query_as(
        r#"
        SELECT ep."order" AS "order", p.id AS problem_id, p.body, p.figure, p.difficulty
        FROM exam_problems ep
        JOIN problems p ON p.id = ep.problem_id
        WHERE ep.exam_id = ?
        ORDER BY ep."order"
        "#,
    )
    .bind(exam.id)
    .fetch_all(pool)
    .await?;

    let choices: Vec<PublicChoice> = sqlx::query_as(
        r#"
        SELECT c.id, c.problem_id, c.body, c.figure
        FROM choices c
        WHERE c.problem_id IN (SELECT problem_id FROM exam_problems WHERE exam_id = ?)
        ORDER BY c.id
        "#,
    )
    .bind(exam.id)
    .fetch_all(pool)
    .await?;

    let problems = rows
        .into_iter()
        .map(|row| {
            let problem_choices = choices
                .iter()
                .filter(|c| c.problem_id == row.problem_id)
                .map(|c| PublicChoice {
                    id: c.id,
                    problem_id: c.problem_id,
                    body: c.body.clone(),
                    figure: c.figure.clone(),
                })
                .collect();
            ExamProblemView {
                order: row.order,
                problem_id: row.problem_id,
                body: row.body,
                figure: row.figure,
                difficulty: row.difficulty,
                choices: problem_choices,
            }
        })
        .collect();

    Ok(ExamDetailResponse {
        id: exam.id,
        title: exam.title.clone(),
        created_by: exam.created_by,
        is_published: exam.is_published,
        created_at: exam.created_at,
        problems,
    })
}

/// Creates an exam from a single scope; the problem count comes from the
/// scope level's quota.
pub async fn create_exam(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam_id =
        generator::create_exam(&pool, &config, claims.user_id(), &[payload.scope_id], None).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": exam_id }))))
}

/// Creates an exam spanning several scopes with an explicit problem count.
pub async fn create_custom_exam(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCustomExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exam_id = generator::create_exam(
        &pool,
        &config,
        claims.user_id(),
        &payload.scope_ids,
        Some(payload.problem_count),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": exam_id }))))
}

/// Lists the user's exams, newest first.
pub async fn list_exams(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let exams: Vec<Exam> = sqlx::query_as(
        "SELECT id, title, created_by, is_published, created_at
         FROM exams WHERE created_by = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(exams))
}

/// Retrieves an exam with its ordered problems and choices.
pub async fn get_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, id).await?;
    check_exam_access(&exam, claims.user_id())?;

    let detail = fetch_exam_detail(&pool, &exam).await?;
    Ok(Json(detail))
}

/// Opens the solve page: creates the user's submission for this exam on
/// first visit (status 'exited_unexpectedly') and returns it together with
/// the exam payload. The unique (exam, user) index makes a concurrent first
/// visit fail safely into the same single row.
pub async fn start_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let exam = fetch_exam(&pool, id).await?;
    check_exam_access(&exam, user_id)?;

    sqlx::query("INSERT OR IGNORE INTO submissions (exam_id, user_id, status) VALUES (?, ?, ?)")
        .bind(exam.id)
        .bind(user_id)
        .bind(STATUS_EXITED_UNEXPECTEDLY)
        .execute(&pool)
        .await?;

    let submission: Submission = sqlx::query_as(
        "SELECT id, exam_id, user_id, score, status, created_at
         FROM submissions WHERE exam_id = ? AND user_id = ?",
    )
    .bind(exam.id)
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    let detail = fetch_exam_detail(&pool, &exam).await?;

    Ok(Json(json!({
        "submission": submission,
        "exam": detail,
    })))
}

/// Grades the user's submission for this exam.
///
/// Answers are keyed "problem_{order}"; malformed entries count as
/// unanswered. A submission that is already completed is refused.
pub async fn solve_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SolveExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let exam = fetch_exam(&pool, id).await?;
    check_exam_access(&exam, user_id)?;

    let submission: Option<Submission> = sqlx::query_as(
        "SELECT id, exam_id, user_id, score, status, created_at
         FROM submissions WHERE exam_id = ? AND user_id = ?",
    )
    .bind(exam.id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?;

    let submission = submission.ok_or_else(|| {
        AppError::BadRequest("Open the exam before submitting answers".to_string())
    })?;

    let outcome = grader::grade_submission(&pool, submission.id, &payload.answers).await?;

    Ok(Json(json!({
        "submission_id": submission.id,
        "exam_id": exam.id,
        "score": outcome.score,
        "total_problems": outcome.total_problems,
        "wrong_answers": outcome.wrong_answers,
        "percentage": outcome.percentage,
    })))
}

/// Lists the user's submissions, newest first.
pub async fn list_submissions(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let submissions: Vec<SubmissionListItem> = sqlx::query_as(
        r#"
        SELECT s.id, s.exam_id, e.title AS exam_title, s.score, s.status, s.created_at
        FROM submissions s
        JOIN exams e ON e.id = s.exam_id
        WHERE s.user_id = ?
        ORDER BY s.created_at DESC, s.id DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(submissions))
}

/// Shows one graded result. Percentage and wrong answer count are computed
/// here, never stored.
pub async fn get_result(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let submission: Submission = sqlx::query_as(
        "SELECT id, exam_id, user_id, score, status, created_at FROM submissions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    if submission.user_id != claims.user_id() {
        return Err(AppError::Forbidden(
            "You do not have permission to view this result".to_string(),
        ));
    }

    let exam = fetch_exam(&pool, submission.exam_id).await?;

    let total_problems: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM exam_problems WHERE exam_id = ?")
            .bind(exam.id)
            .fetch_one(&pool)
            .await?;

    let graded = submission.status == STATUS_COMPLETED;
    let percentage = match submission.score {
        Some(score) if graded && total_problems > 0 => {
            Some(score as f64 / total_problems as f64 * 100.0)
        }
        _ => None,
    };
    let wrong_answers = submission
        .score
        .filter(|_| graded)
        .map(|score| total_problems - score);

    Ok(Json(SubmissionResultResponse {
        submission_id: submission.id,
        exam_id: exam.id,
        exam_title: exam.title,
        status: submission.status,
        score: submission.score,
        total_problems,
        percentage,
        wrong_answers,
    }))
}
