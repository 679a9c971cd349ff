// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        problem::{ChoicePayload, CreateProblemRequest, UpdateProblemRequest},
        scope::{CreateScopeRequest, Scope, ScopeLevel, UpdateScopeRequest},
    },
    utils::html::clean_html,
};

async fn fetch_scope(pool: &SqlitePool, id: i64) -> Result<Scope, AppError> {
    sqlx::query_as(
        "SELECT id, title, caption, parent_id, level, in_scope_order, is_published
         FROM scopes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Scope not found".to_string()))
}

/// Derives the level of a child under `parent_id`, walking nothing: level is
/// always parent level + 1, and lessons cannot have children.
async fn derive_level(pool: &SqlitePool, parent_id: Option<i64>) -> Result<i64, AppError> {
    let Some(parent_id) = parent_id else {
        return Ok(ScopeLevel::Textbook as i64);
    };

    let parent = fetch_scope(pool, parent_id).await?;
    let level = parent.level + 1;
    if ScopeLevel::from_i64(level).is_none() {
        return Err(AppError::BadRequest(
            "Lessons cannot have child scopes".to_string(),
        ));
    }
    Ok(level)
}

/// Upward walk from `parent_id` to reject circular parentage before an
/// update is written.
async fn check_no_cycle(
    conn: &mut sqlx::SqliteConnection,
    scope_id: i64,
    parent_id: i64,
) -> Result<(), AppError> {
    let mut current = Some(parent_id);
    while let Some(id) = current {
        if id == scope_id {
            return Err(AppError::BadRequest(
                "A scope can not be its own ancestor".to_string(),
            ));
        }
        current = sqlx::query_scalar("SELECT parent_id FROM scopes WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();
    }
    Ok(())
}

/// Recomputes levels for the subtree under `scope_id` after a re-parent.
/// Fails when any descendant would sink below lesson depth.
async fn relevel_subtree(
    conn: &mut sqlx::SqliteConnection,
    scope_id: i64,
    new_level: i64,
) -> Result<(), AppError> {
    let mut frontier = vec![(scope_id, new_level)];

    while let Some((id, level)) = frontier.pop() {
        if ScopeLevel::from_i64(level).is_none() {
            return Err(AppError::BadRequest(
                "Moving this scope would push a descendant below lesson depth".to_string(),
            ));
        }
        sqlx::query("UPDATE scopes SET level = ? WHERE id = ?")
            .bind(level)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        let children: Vec<i64> = sqlx::query_scalar("SELECT id FROM scopes WHERE parent_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
        frontier.extend(children.into_iter().map(|c| (c, level + 1)));
    }

    Ok(())
}

/// Creates a curriculum scope. The level is derived from the parent; sibling
/// (parent, order) and (parent, title) duplicates map to 409.
pub async fn create_scope(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateScopeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let level = derive_level(&pool, payload.parent_id).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO scopes (title, caption, parent_id, level, in_scope_order, is_published)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(payload.caption.as_deref().unwrap_or(""))
    .bind(payload.parent_id)
    .bind(level)
    .bind(payload.in_scope_order.unwrap_or(0))
    .bind(payload.is_published.unwrap_or(false))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("A sibling scope with the same title or order already exists".to_string())
        } else {
            tracing::error!("Failed to create scope: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Updates a scope. Re-parenting runs the cycle check and recomputes the
/// levels of the whole subtree.
pub async fn update_scope(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateScopeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let scope = fetch_scope(&pool, id).await?;

    // The re-parent, the subtree re-level and any field updates commit
    // together or not at all.
    let mut tx = pool.begin().await?;

    if let Some(new_parent) = payload.parent_id {
        if Some(new_parent) != scope.parent_id {
            check_no_cycle(&mut *tx, scope.id, new_parent).await?;

            let parent_level: Option<i64> =
                sqlx::query_scalar("SELECT level FROM scopes WHERE id = ?")
                    .bind(new_parent)
                    .fetch_optional(&mut *tx)
                    .await?;
            let parent_level =
                parent_level.ok_or_else(|| AppError::NotFound("Scope not found".to_string()))?;
            let new_level = parent_level + 1;
            if ScopeLevel::from_i64(new_level).is_none() {
                return Err(AppError::BadRequest(
                    "Lessons cannot have child scopes".to_string(),
                ));
            }

            sqlx::query("UPDATE scopes SET parent_id = ? WHERE id = ?")
                .bind(new_parent)
                .bind(scope.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        AppError::Conflict(
                            "A sibling scope with the same title or order already exists"
                                .to_string(),
                        )
                    } else {
                        AppError::from(e)
                    }
                })?;
            relevel_subtree(&mut *tx, scope.id, new_level).await?;
        }
    }

    if payload.title.is_some()
        || payload.caption.is_some()
        || payload.in_scope_order.is_some()
        || payload.is_published.is_some()
    {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE scopes SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = &payload.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title);
        }
        if let Some(caption) = &payload.caption {
            separated.push("caption = ");
            separated.push_bind_unseparated(caption);
        }
        if let Some(order) = payload.in_scope_order {
            separated.push("in_scope_order = ");
            separated.push_bind_unseparated(order);
        }
        if let Some(published) = payload.is_published {
            separated.push("is_published = ");
            separated.push_bind_unseparated(published);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        builder.build().execute(&mut *tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(
                    "A sibling scope with the same title or order already exists".to_string(),
                )
            } else {
                tracing::error!("Failed to update scope: {:?}", e);
                AppError::from(e)
            }
        })?;
    }

    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Deletes a scope and, through cascades, its subtree and problems.
pub async fn delete_scope(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM scopes WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete scope: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Scope not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn insert_choices(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    problem_id: i64,
    choices: &[ChoicePayload],
) -> Result<(), AppError> {
    let mut qb =
        QueryBuilder::<Sqlite>::new("INSERT INTO choices (problem_id, body, figure, is_correct) ");
    qb.push_values(choices, |mut row, choice| {
        row.push_bind(problem_id)
            .push_bind(choice.body.as_deref().map(clean_html))
            .push_bind(&choice.figure)
            .push_bind(choice.is_correct);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

/// Creates a problem with its choices in one transaction. Problems attach
/// only to lesson-level scopes; at least one choice must be correct.
pub async fn create_problem(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateProblemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let scope = fetch_scope(&pool, payload.scope_id).await?;
    if ScopeLevel::from_i64(scope.level) != Some(ScopeLevel::Lesson) {
        return Err(AppError::BadRequest(
            "Problems can only be attached to lessons".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO problems (scope_id, body, figure, difficulty, is_published)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.scope_id)
    .bind(clean_html(&payload.body))
    .bind(&payload.figure)
    .bind(payload.difficulty.unwrap_or(1))
    .bind(payload.is_published.unwrap_or(false))
    .fetch_one(&mut *tx)
    .await?;

    insert_choices(&mut tx, id, &payload.choices).await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Updates a problem. When `choices` is present the full choice set is
/// replaced; answers referencing old choices are only possible through
/// existing exams, which snapshot problems, so replacement is restricted to
/// problems not yet used in an exam.
pub async fn update_problem(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProblemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM problems WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Problem not found".to_string()));
    }

    let mut tx = pool.begin().await?;

    if payload.body.is_some()
        || payload.figure.is_some()
        || payload.difficulty.is_some()
        || payload.is_published.is_some()
    {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE problems SET ");
        let mut separated = builder.separated(", ");

        if let Some(body) = &payload.body {
            separated.push("body = ");
            separated.push_bind_unseparated(clean_html(body));
        }
        if let Some(figure) = &payload.figure {
            separated.push("figure = ");
            separated.push_bind_unseparated(figure);
        }
        if let Some(difficulty) = payload.difficulty {
            separated.push("difficulty = ");
            separated.push_bind_unseparated(difficulty);
        }
        if let Some(published) = payload.is_published {
            separated.push("is_published = ");
            separated.push_bind_unseparated(published);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.build().execute(&mut *tx).await?;
    }

    if let Some(choices) = &payload.choices {
        let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exam_problems WHERE problem_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if used > 0 {
            return Err(AppError::Conflict(
                "Choices of a problem already used in an exam can not be replaced".to_string(),
            ));
        }

        sqlx::query("DELETE FROM choices WHERE problem_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_choices(&mut tx, id, choices).await?;
    }

    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Deletes a problem and its choices.
pub async fn delete_problem(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM problems WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete problem: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Problem not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
