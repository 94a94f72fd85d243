//! HTTP layer - handlers and routing
//!
//! Plain HTML over HTTP. Every request passes through session resolution,
//! which attaches the current user, and through the error page renderer.

pub mod auth;
pub mod middleware;
pub mod slots;
pub mod staff;


use axum::{
    extract::rejection::FormRejection,
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::models::User;
use crate::services::Denied;

pub use middleware::{ApiError, AppState, CurrentUser};

/// 302 redirect
pub(crate) fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// The signed-in user, or 403 for anonymous requests
pub(crate) fn signed_in(current: &CurrentUser) -> Result<&User, ApiError> {
    current.user().ok_or_else(|| Denied::Anonymous.into())
}

/// Turn a form extractor rejection into a 400 page
pub(crate) fn form_input<T>(form: Result<axum::Form<T>, FormRejection>) -> Result<T, ApiError> {
    form.map(|axum::Form(inner)| inner).map_err(|rejection| {
        tracing::debug!("Rejected form: {}", rejection.body_text());
        ApiError::validation_error("The submitted form could not be read.")
    })
}

/// Parse a numeric id from a path segment or form field
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::validation_error(format!("invalid {} id: {}", what, raw)))
}

async fn not_found() -> ApiError {
    ApiError::not_found("There is nothing at this address.")
}

async fn method_not_allowed() -> ApiError {
    ApiError::new("METHOD_NOT_ALLOWED", "This page does not accept that kind of request.")
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(slots::index))
        .route("/booked/", get(slots::booked))
        .route("/login/", get(auth::login_page).post(auth::login))
        .route("/logout/", get(auth::logout).post(auth::logout))
        .route("/book/{slot_id}/", post(slots::book))
        .route("/unbook/{slot_id}/", post(slots::unbook))
        .route("/add-date/", get(staff::add_date_page).post(staff::add_date))
        .route("/add-user/", get(staff::add_user_page).post(staff::add_user))
        .route("/assigned/", get(staff::assigned))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        // Session resolution runs inside the error page renderer so its
        // failures are rendered too
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_session,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::render_error_pages,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
