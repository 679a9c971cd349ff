// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Target problem counts per scope level, injectable instead of scattered
/// literals.
#[derive(Debug, Clone)]
pub struct ExamQuotas {
    pub lesson: i64,
    pub chapter: i64,
    pub unit: i64,
    pub textbook: i64,
}

impl Default for ExamQuotas {
    fn default() -> Self {
        Self {
            lesson: 10,
            chapter: 25,
            unit: 40,
            textbook: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub max_exams_per_week: i64,
    pub quotas: ExamQuotas,
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let defaults = ExamQuotas::default();
        let quotas = ExamQuotas {
            lesson: env_i64("EXAM_QUOTA_LESSON", defaults.lesson),
            chapter: env_i64("EXAM_QUOTA_CHAPTER", defaults.chapter),
            unit: env_i64("EXAM_QUOTA_UNIT", defaults.unit),
            textbook: env_i64("EXAM_QUOTA_TEXTBOOK", defaults.textbook),
        };

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            max_exams_per_week: env_i64("MAX_EXAMS_PER_WEEK", 3),
            quotas,
        }
    }
}
