// src/models/problem.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// DTO for sending a choice to a learner (excludes the correct flag).
#[derive(Debug, Serialize, FromRow)]
pub struct PublicChoice {
    pub id: i64,
    pub problem_id: i64,
    pub body: Option<String>,
    pub figure: Option<String>,
}

/// DTO for one choice inside a problem create/update payload.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ChoicePayload {
    #[validate(length(max = 256))]
    pub body: Option<String>,
    #[validate(length(max = 512))]
    pub figure: Option<String>,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for creating a new problem together with its choices.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProblemRequest {
    pub scope_id: i64,
    #[validate(length(min = 1, max = 4000))]
    pub body: String,
    #[validate(length(max = 512))]
    pub figure: Option<String>,
    #[validate(range(min = 1, max = 4))]
    pub difficulty: Option<i64>,
    pub is_published: Option<bool>,
    #[validate(custom(function = validate_choices))]
    pub choices: Vec<ChoicePayload>,
}

/// DTO for updating a problem. When `choices` is present the full choice set
/// is replaced.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProblemRequest {
    #[validate(length(min = 1, max = 4000))]
    pub body: Option<String>,
    #[validate(length(max = 512))]
    pub figure: Option<String>,
    #[validate(range(min = 1, max = 4))]
    pub difficulty: Option<i64>,
    pub is_published: Option<bool>,
    #[validate(custom(function = validate_choices))]
    pub choices: Option<Vec<ChoicePayload>>,
}

/// A problem needs at least two choices, at least one of them correct, and
/// every choice needs either a body or a figure.
pub fn validate_choices(choices: &[ChoicePayload]) -> Result<(), validator::ValidationError> {
    if choices.len() < 2 {
        return Err(validator::ValidationError::new("too_few_choices"));
    }
    if !choices.iter().any(|c| c.is_correct) {
        return Err(validator::ValidationError::new("no_correct_choice"));
    }
    for choice in choices {
        let has_body = choice.body.as_deref().is_some_and(|b| !b.is_empty());
        let has_figure = choice.figure.as_deref().is_some_and(|f| !f.is_empty());
        if !has_body && !has_figure {
            return Err(validator::ValidationError::new("empty_choice"));
        }
    }
    Ok(())
}
