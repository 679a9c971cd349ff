// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, dashboard, exam, scope},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, scopes, exams, submissions, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let scope_routes = Router::new()
        .route("/", get(scope::list_textbooks))
        .route("/{id}", get(scope::get_scope))
        .route("/{id}/children", get(scope::list_children))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let favorite_routes = Router::new()
        .route("/", get(scope::list_favorites).post(scope::toggle_favorite))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let exam_routes = Router::new()
        .route("/", get(exam::list_exams).post(exam::create_exam))
        .route("/custom", post(exam::create_custom_exam))
        .route("/{id}", get(exam::get_exam))
        .route("/{id}/solve", get(exam::start_exam).post(exam::solve_exam))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let submission_routes = Router::new()
        .route("/", get(exam::list_submissions))
        .route("/{id}", get(exam::get_result))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let dashboard_routes = Router::new()
        .route("/", get(dashboard::dashboard))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/scopes", post(admin::create_scope))
        .route(
            "/scopes/{id}",
            put(admin::update_scope).delete(admin::delete_scope),
        )
        .route("/problems", post(admin::create_problem))
        .route(
            "/problems/{id}",
            delete(admin::delete_problem).put(admin::update_problem),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/scopes", scope_routes)
        .nest("/api/favorites", favorite_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/submissions", submission_routes)
        .nest("/api/dashboard", dashboard_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
