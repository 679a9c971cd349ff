// src/services/grader.rs

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    models::exam::{STATUS_COMPLETED, Submission},
};

/// One slot of an exam's ordered problem list.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProblemSlot {
    pub order: i64,
    pub problem_id: i64,
}

/// Answer key row: which problem a choice belongs to and whether it is
/// correct.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChoiceKey {
    pub id: i64,
    pub problem_id: i64,
    pub is_correct: bool,
}

/// A submitted choice that survived validation and will be persisted.
#[derive(Debug, PartialEq, Eq)]
pub struct AcceptedAnswer {
    pub problem_id: i64,
    pub choice_id: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct GradeOutcome {
    pub score: i64,
    pub total_problems: i64,
    pub wrong_answers: i64,
    pub percentage: f64,
}

/// Matches submitted answers against the exam's ordered problem list.
///
/// Keys are "problem_{order}". Missing keys, non-numeric values, unknown
/// choice ids and choices belonging to a different problem than the slot are
/// all silently skipped: malformed client input counts as unanswered, it
/// never fails the request. Returns the accepted answers and the score (one
/// point per correct choice).
pub fn match_answers(
    slots: &[ProblemSlot],
    choices: &[ChoiceKey],
    submitted: &HashMap<String, String>,
) -> (Vec<AcceptedAnswer>, i64) {
    let by_id: HashMap<i64, &ChoiceKey> = choices.iter().map(|c| (c.id, c)).collect();

    let mut accepted = Vec::new();
    let mut score = 0;

    for slot in slots {
        let Some(raw) = submitted.get(&format!("problem_{}", slot.order)) else {
            continue;
        };
        let Ok(choice_id) = raw.trim().parse::<i64>() else {
            continue;
        };
        let Some(choice) = by_id.get(&choice_id) else {
            continue;
        };
        if choice.problem_id != slot.problem_id {
            continue;
        }

        accepted.push(AcceptedAnswer {
            problem_id: slot.problem_id,
            choice_id,
        });
        if choice.is_correct {
            score += 1;
        }
    }

    (accepted, score)
}

/// Grades a submission: records the accepted answers and sets the score and
/// completed status, all in one transaction.
///
/// A submission that is already completed refuses re-grading; the completed
/// transition is one-way and the score never changes afterwards.
pub async fn grade_submission(
    pool: &SqlitePool,
    submission_id: i64,
    submitted: &HashMap<String, String>,
) -> Result<GradeOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let submission: Submission = sqlx::query_as(
        "SELECT id, exam_id, user_id, score, status, created_at FROM submissions WHERE id = ?",
    )
    .bind(submission_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    if submission.status == STATUS_COMPLETED {
        return Err(AppError::BadRequest(
            "This exam attempt has already been graded".to_string(),
        ));
    }

    let slots: Vec<ProblemSlot> = sqlx::query_as(
        r#"SELECT "order", problem_id FROM exam_problems WHERE exam_id = ? ORDER BY "order""#,
    )
    .bind(submission.exam_id)
    .fetch_all(&mut *tx)
    .await?;

    let choices: Vec<ChoiceKey> = sqlx::query_as(
        r#"
        SELECT c.id, c.problem_id, c.is_correct
        FROM choices c
        WHERE c.problem_id IN (SELECT problem_id FROM exam_problems WHERE exam_id = ?)
        "#,
    )
    .bind(submission.exam_id)
    .fetch_all(&mut *tx)
    .await?;

    let (accepted, score) = match_answers(&slots, &choices, submitted);

    if !accepted.is_empty() {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO answers (submission_id, problem_id, choice_id) ",
        );
        qb.push_values(&accepted, |mut row, answer| {
            row.push_bind(submission_id)
                .push_bind(answer.problem_id)
                .push_bind(answer.choice_id);
        });
        qb.build().execute(&mut *tx).await?;
    }

    // Guarded update so a concurrent grade of the same submission fails
    // instead of double-writing.
    let updated = sqlx::query("UPDATE submissions SET score = ?, status = ? WHERE id = ? AND status <> ?")
        .bind(score)
        .bind(STATUS_COMPLETED)
        .bind(submission_id)
        .bind(STATUS_COMPLETED)
        .execute(&mut *tx)
        .await?;

    if updated.rows_affected() != 1 {
        return Err(AppError::Conflict(
            "This exam attempt was graded concurrently".to_string(),
        ));
    }

    tx.commit().await?;

    let total_problems = slots.len() as i64;
    let percentage = if total_problems > 0 {
        score as f64 / total_problems as f64 * 100.0
    } else {
        0.0
    };

    Ok(GradeOutcome {
        score,
        total_problems,
        wrong_answers: total_problems - score,
        percentage,
    })
}
