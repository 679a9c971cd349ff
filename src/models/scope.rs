// src/models/scope.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::config::ExamQuotas;

/// Depth of a node in the curriculum tree. Stored as an INTEGER column,
/// derived from the parent's level at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLevel {
    Textbook = 0,
    Unit = 1,
    Chapter = 2,
    Lesson = 3,
}

impl ScopeLevel {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Textbook),
            1 => Some(Self::Unit),
            2 => Some(Self::Chapter),
            3 => Some(Self::Lesson),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Textbook => "Textbook",
            Self::Unit => "Unit",
            Self::Chapter => "Chapter",
            Self::Lesson => "Lesson",
        }
    }

    /// Target problem count for a single-scope exam at this level.
    pub fn quota(&self, quotas: &ExamQuotas) -> i64 {
        match self {
            Self::Textbook => quotas.textbook,
            Self::Unit => quotas.unit,
            Self::Chapter => quotas.chapter,
            Self::Lesson => quotas.lesson,
        }
    }
}

/// Represents the 'scopes' table: one node of the curriculum tree.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scope {
    pub id: i64,
    pub title: String,
    pub caption: String,
    pub parent_id: Option<i64>,
    pub level: i64,
    pub in_scope_order: i64,
    pub is_published: bool,
}

/// A scope annotated with whether the current user has favorited it.
/// Used by the curriculum browser.
#[derive(Debug, Serialize, FromRow)]
pub struct ScopeWithFav {
    pub id: i64,
    pub title: String,
    pub caption: String,
    pub level: i64,
    pub in_scope_order: i64,
    pub is_fav: bool,
}

/// Bare id/title pair for cascading select widgets.
#[derive(Debug, Serialize, FromRow)]
pub struct ScopeOption {
    pub id: i64,
    pub title: String,
}

/// DTO for creating a scope. The level is derived from the parent, never
/// supplied by the client.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateScopeRequest {
    #[validate(length(min = 1, max = 256))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub caption: Option<String>,
    pub parent_id: Option<i64>,
    #[validate(range(min = 0))]
    pub in_scope_order: Option<i64>,
    pub is_published: Option<bool>,
}

/// DTO for updating a scope. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateScopeRequest {
    #[validate(length(min = 1, max = 256))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub caption: Option<String>,
    pub parent_id: Option<i64>,
    #[validate(range(min = 0))]
    pub in_scope_order: Option<i64>,
    pub is_published: Option<bool>,
}

/// DTO for toggling a favorite.
#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub scope_id: i64,
}
