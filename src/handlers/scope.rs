// src/handlers/scope.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::scope::{FavoriteRequest, Scope, ScopeLevel, ScopeOption, ScopeWithFav},
    utils::jwt::Claims,
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

/// Published children of a parent (or the root textbooks when parent is
/// NULL), annotated with the user's favorite flag.
async fn fetch_children(
    pool: &SqlitePool,
    user_id: i64,
    parent_id: Option<i64>,
) -> Result<Vec<ScopeWithFav>, AppError> {
    let children: Vec<ScopeWithFav> = sqlx::query_as(
        r#"
        SELECT s.id, s.title, s.caption, s.level, s.in_scope_order,
               EXISTS(SELECT 1 FROM favorites f WHERE f.scope_id = s.id AND f.user_id = ?) AS is_fav
        FROM scopes s
        WHERE (? IS NULL AND s.parent_id IS NULL OR s.parent_id = ?)
          AND s.is_published = 1
        ORDER BY s.in_scope_order, s.id
        "#,
    )
    .bind(user_id)
    .bind(parent_id)
    .bind(parent_id)
    .fetch_all(pool)
    .await?;

    Ok(children)
}

/// Walks the parent chain upwards to build the breadcrumb trail, root first.
async fn fetch_breadcrumbs(pool: &SqlitePool, scope: &Scope) -> Result<Vec<Scope>, AppError> {
    let mut breadcrumbs = vec![scope.clone()];
    let mut parent_id = scope.parent_id;

    while let Some(id) = parent_id {
        let parent = fetch_scope(pool, id).await?;
        parent_id = parent.parent_id;
        breadcrumbs.insert(0, parent);
    }

    Ok(breadcrumbs)
}

/// Lists the published root textbooks for the curriculum browser.
pub async fn list_textbooks(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let textbooks = fetch_children(&pool, claims.user_id(), None).await?;

    Ok(Json(json!({
        "title": "Textbooks",
        "breadcrumbs": [],
        "scopes": textbooks,
    })))
}

/// Shows one scope with its breadcrumbs and published children.
pub async fn get_scope(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let scope = fetch_scope(&pool, id).await?;

    if !scope.is_published {
        return Err(AppError::NotFound("Scope not found".to_string()));
    }

    let breadcrumbs = fetch_breadcrumbs(&pool, &scope).await?;
    let children = fetch_children(&pool, claims.user_id(), Some(scope.id)).await?;

    let list_title = ScopeLevel::from_i64(scope.level + 1)
        .map(|l| format!("{}s", l.label()))
        .unwrap_or_else(|| "Problems".to_string());

    Ok(Json(json!({
        "title": scope.title,
        "list_title": list_title,
        "parent": scope,
        "breadcrumbs": breadcrumbs,
        "scopes": children,
    })))
}

/// Bare id/title list of a scope's published children, for cascading select
/// widgets on the custom exam form.
pub async fn list_children(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    // 404 for unknown parents, empty list for leaves
    fetch_scope(&pool, id).await?;

    let children: Vec<ScopeOption> = sqlx::query_as(
        "SELECT id, title FROM scopes WHERE parent_id = ? AND is_published = 1
         ORDER BY in_scope_order, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(children))
}

/// Adds or removes a published scope from the user's favorites.
pub async fn toggle_favorite(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<FavoriteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let scope = fetch_scope(&pool, payload.scope_id).await?;

    if !scope.is_published {
        return Err(AppError::BadRequest(
            "This scope is not accessible".to_string(),
        ));
    }

    let existing = sqlx::query("SELECT 1 FROM favorites WHERE user_id = ? AND scope_id = ?")
        .bind(user_id)
        .bind(scope.id)
        .fetch_optional(&pool)
        .await?;

    let message = if existing.is_some() {
        sqlx::query("DELETE FROM favorites WHERE user_id = ? AND scope_id = ?")
            .bind(user_id)
            .bind(scope.id)
            .execute(&pool)
            .await?;
        format!("{} removed from favorites successfully", scope.title)
    } else {
        sqlx::query("INSERT OR IGNORE INTO favorites (user_id, scope_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(scope.id)
            .execute(&pool)
            .await?;
        format!("{} added to favorites successfully", scope.title)
    };

    Ok(Json(json!({ "message": message })))
}

/// Lists the user's favorite scopes.
pub async fn list_favorites(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let favorites: Vec<Scope> = sqlx::query_as(
        r#"
        SELECT s.id, s.title, s.caption, s.parent_id, s.level, s.in_scope_order, s.is_published
        FROM scopes s
        JOIN favorites f ON f.scope_id = s.id
        WHERE f.user_id = ? AND s.is_published = 1
        ORDER BY s.level, s.in_scope_order, s.id
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(favorites))
}
