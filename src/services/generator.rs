// src/services/generator.rs

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    config::Config,
    error::AppError,
    models::scope::{Scope, ScopeLevel},
    services::tracker,
};

/// Creates a persisted exam from one or more scopes.
///
/// * Resolves all scopes (404 on any miss).
/// * Collects the transitive closure of published problems under them,
///   deduplicated across overlapping scopes.
/// * Samples `target` problems uniformly without replacement and stores them
///   with order numbers 1..N.
/// * Updates the creator's weekly tracker.
///
/// Everything runs in one transaction: on any failure (insufficient problems,
/// quota reached) no exam row survives.
pub async fn create_exam(
    pool: &SqlitePool,
    config: &Config,
    user_id: i64,
    scope_ids: &[i64],
    requested_count: Option<i64>,
) -> Result<i64, AppError> {
    let ids: Vec<i64> = scope_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if ids.is_empty() {
        return Err(AppError::BadRequest("No scopes selected".to_string()));
    }
    if ids.len() > 1 && requested_count.is_none() {
        return Err(AppError::BadRequest(
            "A problem count is required when combining scopes".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, title, caption, parent_id, level, in_scope_order, is_published
         FROM scopes WHERE id IN (",
    );
    let mut separated = qb.separated(",");
    for id in &ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let scopes: Vec<Scope> = qb.build_query_as().fetch_all(&mut *tx).await?;

    if scopes.len() != ids.len() {
        return Err(AppError::NotFound("Scope not found".to_string()));
    }

    let (target, title) = match requested_count {
        Some(count) => (count, format!("Custom exam over {} scopes", scopes.len())),
        None => {
            let scope = &scopes[0];
            let level = ScopeLevel::from_i64(scope.level).ok_or_else(|| {
                AppError::InternalServerError(format!("Scope {} has invalid level", scope.id))
            })?;
            (
                level.quota(&config.quotas),
                format!("Exam for {}: {}", level.label(), scope.title),
            )
        }
    };

    let pool_size = problem_pool_size(&mut tx, &ids).await?;
    if pool_size < target {
        return Err(AppError::BadRequest(format!(
            "Not enough published problems in the selected scopes: {} available, {} required",
            pool_size, target
        )));
    }

    let sampled = sample_problem_ids(&mut tx, &ids, target).await?;

    let exam_id: i64 =
        sqlx::query_scalar("INSERT INTO exams (title, created_by) VALUES (?, ?) RETURNING id")
            .bind(&title)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

    let mut scope_insert =
        QueryBuilder::<Sqlite>::new("INSERT INTO exam_scopes (exam_id, scope_id) ");
    scope_insert.push_values(&ids, |mut row, scope_id| {
        row.push_bind(exam_id).push_bind(scope_id);
    });
    scope_insert.build().execute(&mut *tx).await?;

    let mut problem_insert =
        QueryBuilder::<Sqlite>::new(r#"INSERT INTO exam_problems (exam_id, problem_id, "order") "#);
    problem_insert.push_values(sampled.iter().enumerate(), |mut row, (idx, problem_id)| {
        row.push_bind(exam_id)
            .push_bind(problem_id)
            .push_bind(idx as i64 + 1);
    });
    problem_insert.build().execute(&mut *tx).await?;

    tracker::record_exam_creation(
        &mut *tx,
        user_id,
        config.max_exams_per_week,
        Utc::now().date_naive(),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Created exam {} ({} problems) for user {}",
        exam_id,
        sampled.len(),
        user_id
    );

    Ok(exam_id)
}

/// Appends the recursive subtree CTE over the given root scope ids.
fn push_subtree_cte<'a>(qb: &mut QueryBuilder<'a, Sqlite>, ids: &'a [i64]) {
    qb.push("WITH RECURSIVE subtree(id) AS (SELECT id FROM scopes WHERE id IN (");
    let mut separated = qb.separated(",");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
    qb.push(" UNION SELECT s.id FROM scopes s JOIN subtree t ON s.parent_id = t.id) ");
}

async fn problem_pool_size(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    ids: &[i64],
) -> Result<i64, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("");
    push_subtree_cte(&mut qb, ids);
    qb.push(
        "SELECT COUNT(DISTINCT p.id) FROM problems p
         JOIN subtree t ON p.scope_id = t.id
         WHERE p.is_published = 1",
    );
    let count: i64 = qb.build_query_scalar().fetch_one(&mut **tx).await?;
    Ok(count)
}

async fn sample_problem_ids(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    ids: &[i64],
    target: i64,
) -> Result<Vec<i64>, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new("");
    push_subtree_cte(&mut qb, ids);
    qb.push(
        "SELECT id FROM (
             SELECT DISTINCT p.id AS id FROM problems p
             JOIN subtree t ON p.scope_id = t.id
             WHERE p.is_published = 1
         ) ORDER BY RANDOM() LIMIT ",
    );
    qb.push_bind(target);
    let sampled: Vec<i64> = qb.build_query_scalar().fetch_all(&mut **tx).await?;
    Ok(sampled)
}
