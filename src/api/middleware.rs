//! API middleware
//!
//! Contains:
//! - Shared application state
//! - `ApiError`, the one error type every handler returns
//! - Session resolution (attaches the current user to each request)
//! - Error pages (turns every `ApiError` into a rendered status page)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::db::repositories::{SqlxSessionRepository, SqlxSlotRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    BookingError, BookingService, Denied, SessionError, SessionService, UserService,
    UserServiceError,
};
use crate::views::{ViewEngine, ViewError};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session_token";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub session_service: Arc<SessionService>,
    pub booking_service: Arc<BookingService>,
    pub views: Arc<ViewEngine>,
    /// Add `Secure` to the session cookie
    pub cookie_secure: bool,
}

impl AppState {
    /// Wire repositories and services on top of a connected pool.
    pub fn new(pool: DynDatabasePool, session: &SessionConfig) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let slot_repo = SqlxSlotRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool);
        let ttl = chrono::Duration::try_hours(session.ttl_hours)
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .ok_or_else(|| anyhow::anyhow!("Invalid session lifetime: {} hours", session.ttl_hours))?;

        Ok(Self {
            user_service: Arc::new(UserService::new(user_repo.clone())),
            session_service: Arc::new(SessionService::with_ttl(
                session_repo,
                user_repo.clone(),
                ttl,
            )),
            booking_service: Arc::new(BookingService::new(slot_repo, user_repo)),
            views: Arc::new(ViewEngine::new()?),
            cookie_secure: session.cookie_secure,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    /// Safe to show to the client
    pub message: String,
}

/// Marks a response whose body should be replaced by the error page
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the full cause chain and hide it from the client
    pub fn store_fault(err: &anyhow::Error) -> Self {
        tracing::error!("Store fault: {:#}", err);
        Self::internal_error("Something went wrong on our side. Please try again later.")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "METHOD_NOT_ALLOWED" => StatusCode::METHOD_NOT_ALLOWED,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, self.error.message.clone()).into_response();
        response.extensions_mut().insert(ErrorPage {
            message: self.error.message,
        });
        response
    }
}

impl From<Denied> for ApiError {
    fn from(denied: Denied) -> Self {
        ApiError::forbidden(denied.to_string())
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound(_)
            | BookingError::InvalidRange
            | BookingError::InvalidAssignee(_)
            | BookingError::InvalidTransition(_) => ApiError::validation_error(err.to_string()),
            BookingError::Conflict(_) => ApiError::conflict(
                "Someone else changed this date at the same time. Please try again.",
            ),
            BookingError::Forbidden(denied) => denied.into(),
            BookingError::Unauthenticated => ApiError::forbidden(Denied::Anonymous.to_string()),
            BookingError::StoreFault(e) => ApiError::store_fault(&e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) | UserServiceError::ValidationError(msg) => {
                ApiError::validation_error(msg)
            }
            UserServiceError::UserExists(username) => {
                ApiError::validation_error(format!("username {} is already taken", username))
            }
            UserServiceError::Forbidden(denied) => denied.into(),
            UserServiceError::InternalError(e) => ApiError::store_fault(&e),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::StoreFault(e) => ApiError::store_fault(&e),
        }
    }
}

impl From<ViewError> for ApiError {
    fn from(err: ViewError) -> Self {
        tracing::error!("View error: {}", err);
        ApiError::internal_error("The page could not be rendered.")
    }
}

// ============================================================================
// Current user
// ============================================================================

/// The user behind the request's session cookie, if any.
///
/// Set on every request by [`resolve_session`].
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<User>);

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Extract the session token from the `Cookie` header
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// Session resolution middleware
///
/// Resolves the session cookie and stores the result as [`CurrentUser`] in
/// both the request and the response, so the error page can greet the user
/// too. An unknown or expired token means anonymous; a store failure stops
/// the request with a 500.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(request.headers());
    let user = state
        .session_service
        .resolve_user(token.as_deref())
        .await?;

    let current = CurrentUser(user);
    request.extensions_mut().insert(current.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(current);
    Ok(response)
}

/// Error page middleware
///
/// Replaces the body of any response produced from an `ApiError` with the
/// rendered status page, keeping status and headers.
pub async fn render_error_pages(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };

    let status = response.status();
    let user = response
        .extensions()
        .get::<CurrentUser>()
        .and_then(|current| current.0.clone());

    let html = state.views.render_error(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error"),
        &page.message,
        user.as_ref(),
    );

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    let mut rendered = Html(html).into_response();
    *rendered.status_mut() = status;
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE {
            rendered.headers_mut().append(name.clone(), value.clone());
        }
    }
    rendered
}
