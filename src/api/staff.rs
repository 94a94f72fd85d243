//! Staff endpoints
//!
//! - GET|POST /add-date/  - create a slot (employees and administrators)
//! - GET|POST /add-user/  - create an account (administrators)
//! - GET      /assigned/  - slots assigned to employees

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::middleware::{ApiError, AppState, CurrentUser};
use crate::api::{form_input, found, parse_id, signed_in};
use crate::models::{Role, User};
use crate::services::policy::{self, Action};
use crate::services::{CreateUserInput, UserServiceError};
use crate::views::pages;

/// Accepted `datetime-local` layouts, minutes first
const DATETIME_LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Deserialize)]
pub struct AddDateForm {
    #[serde(rename = "start-time")]
    pub start_time: Option<String>,
    #[serde(rename = "end-time")]
    pub end_time: Option<String>,
    /// Assignee id; administrators must choose one
    pub employee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddUserForm {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Role name or legacy numeric code
    #[serde(alias = "type")]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
struct RoleOption {
    value: String,
    label: &'static str,
}

/// Parse an HTML `datetime-local` value as UTC
pub fn parse_datetime_local(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DATETIME_LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// The current user, if they may create slots for themselves
fn require_staff(current: &CurrentUser) -> Result<&User, ApiError> {
    policy::authorize(current.user(), &Action::ViewAssigned)?;
    signed_in(current)
}

// ============================================================================
// Add date
// ============================================================================

async fn add_date_context(state: &AppState, user: &User) -> Result<TeraContext, ApiError> {
    let mut context = state.views.context(Some(user));
    if user.is_admin() {
        let employees = state.booking_service.assignable_employees().await?;
        context.insert("employees", &employees);
    }
    Ok(context)
}

/// GET /add-date/
pub async fn add_date_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Html<String>, ApiError> {
    let user = require_staff(&current)?;
    let context = add_date_context(&state, user).await?;
    Ok(Html(state.views.render(pages::ADD_DATE, &context)?))
}

/// POST /add-date/
pub async fn add_date(
    State(state): State<AppState>,
    current: CurrentUser,
    form: Result<Form<AddDateForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let user = require_staff(&current)?;
    let form = form_input(form)?;

    let start_at = form
        .start_time
        .as_deref()
        .and_then(parse_datetime_local)
        .ok_or_else(|| ApiError::validation_error("start time is missing or malformed"))?;
    let end_at = form
        .end_time
        .as_deref()
        .and_then(parse_datetime_local)
        .ok_or_else(|| ApiError::validation_error("end time is missing or malformed"))?;

    let assignee = match form.employee.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => parse_id(id, "employee")?,
        _ if user.is_admin() => {
            return Err(ApiError::validation_error("select an employee"));
        }
        _ => user.id,
    };

    state
        .booking_service
        .create_slot(start_at, end_at, assignee, Some(user))
        .await?;
    Ok(found("/"))
}

// ============================================================================
// Add user
// ============================================================================

fn add_user_context(state: &AppState, user: &User) -> TeraContext {
    let roles: Vec<RoleOption> = Role::ALL
        .into_iter()
        .map(|role| RoleOption {
            value: role.to_string(),
            label: role.label(),
        })
        .collect();

    let mut context = state.views.context(Some(user));
    context.insert("roles", &roles);
    context
}

/// GET /add-user/
pub async fn add_user_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Html<String>, ApiError> {
    policy::authorize(current.user(), &Action::CreateUser)?;
    let user = signed_in(&current)?;

    let context = add_user_context(&state, user);
    Ok(Html(state.views.render(pages::ADD_USER, &context)?))
}

/// POST /add-user/
///
/// Success and rejected input both re-render the form, with 200 and 400.
pub async fn add_user(
    State(state): State<AppState>,
    current: CurrentUser,
    form: Result<Form<AddUserForm>, FormRejection>,
) -> Result<Response, ApiError> {
    policy::authorize(current.user(), &Action::CreateUser)?;
    let admin = signed_in(&current)?;
    let form = form_input(form)?;

    let mut context = add_user_context(&state, admin);

    let role = match form.role.as_deref().map(str::trim) {
        None | Some("") => Ok(Role::Customer),
        Some(raw) => raw.parse::<Role>().map_err(|_| format!("unknown role: {}", raw)),
    };

    let result = match role {
        Ok(role) => {
            let input = CreateUserInput::new(
                form.name.unwrap_or_default(),
                form.username.unwrap_or_default(),
                form.password.unwrap_or_default(),
                role,
            );
            state.user_service.create_user(input, Some(admin)).await
        }
        Err(reason) => Err(UserServiceError::ValidationError(reason)),
    };

    let status = match result {
        Ok(created) => {
            context.insert("created", &created);
            StatusCode::OK
        }
        Err(UserServiceError::ValidationError(reason)) => {
            context.insert("error", &reason);
            StatusCode::BAD_REQUEST
        }
        Err(UserServiceError::UserExists(username)) => {
            context.insert("error", &format!("username {} is already taken", username));
            StatusCode::BAD_REQUEST
        }
        Err(e) => return Err(e.into()),
    };

    let html = state.views.render(pages::ADD_USER, &context)?;
    Ok((status, Html(html)).into_response())
}

// ============================================================================
// Assigned
// ============================================================================

/// GET /assigned/
pub async fn assigned(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Html<String>, ApiError> {
    let groups = state.booking_service.assigned_slots(current.user()).await?;

    let mut context = state.views.context(current.user());
    context.insert("groups", &groups);
    Ok(Html(state.views.render(pages::ASSIGNED, &context)?))
}
