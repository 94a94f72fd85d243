//! Authentication endpoints
//!
//! - GET  /login/  - login form
//! - POST /login/  - check credentials, set the session cookie
//! - GET|POST /logout/ - end the session, clear the cookie

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::middleware::{session_token, ApiError, AppState, CurrentUser, SESSION_COOKIE};
use crate::api::{form_input, found};
use crate::services::UserServiceError;
use crate::views::pages;

/// Login form fields; both are required but checked by hand so a missing
/// field is a 400 rather than an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// GET /login/
pub async fn login_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    if current.user().is_some() {
        return Ok(found("/"));
    }

    let context = state.views.context(None);
    Ok(Html(state.views.render(pages::LOGIN, &context)?).into_response())
}

/// POST /login/
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let form = form_input(form)?;
    let (Some(username), Some(password)) = (form.username, form.password) else {
        return Err(ApiError::validation_error(
            "username and password are required",
        ));
    };

    let user = match state.user_service.authenticate(&username, &password).await {
        Ok(user) => user,
        Err(UserServiceError::AuthenticationError(message)) => {
            tracing::info!(username = %username, "Failed login");
            let mut context = state.views.context(None);
            context.insert("error", &message);
            context.insert("username", &username);
            let html = state.views.render(pages::LOGIN, &context)?;
            return Ok((StatusCode::BAD_REQUEST, Html(html)).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let session = state.session_service.issue(user.id).await?;
    tracing::info!(user_id = user.id, "User logged in");

    let cookie = session_cookie(
        &session.token,
        state.session_service.ttl().num_seconds(),
        session.expires_at,
        state.cookie_secure,
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

/// GET|POST /logout/
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let token = session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("You are not signed in"))?;

    state.session_service.terminate(&token).await?;
    tracing::info!("User logged out");

    let mut response = found("/");
    if let Ok(value) = clear_session_cookie().parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

fn session_cookie(token: &str, max_age: i64, expires_at: DateTime<Utc>, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}; Expires={}",
        SESSION_COOKIE,
        token,
        max_age,
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        SESSION_COOKIE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_cookie_attributes() {
        let expires = Utc.with_ymd_and_hms(2022, 7, 13, 23, 30, 0).unwrap();
        let cookie = session_cookie("abc", 43200, expires, false);

        assert!(cookie.starts_with("session_token=abc; Path=/; HttpOnly"));
        assert!(cookie.contains("Max-Age=43200"));
        assert!(cookie.contains("Expires=Wed, 13 Jul 2022 23:30:00 GMT"));
        assert!(!cookie.contains("Secure"));

        assert!(session_cookie("abc", 1, expires, true).ends_with("; Secure"));
    }

    #[test]
    fn test_clear_cookie_is_expired() {
        let cookie = clear_session_cookie();
        assert!(cookie.starts_with("session_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
