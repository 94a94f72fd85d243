//! Slot endpoints
//!
//! - GET  /                   - open slots
//! - GET  /booked/            - slots booked by the current user
//! - POST /book/{slot_id}/    - book an open slot
//! - POST /unbook/{slot_id}/  - release a booked slot

use axum::{
    extract::{Path, State},
    response::{Html, Response},
};

use crate::api::middleware::{ApiError, AppState, CurrentUser};
use crate::api::{found, parse_id, signed_in};
use crate::views::pages;

/// GET /
pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Html<String>, ApiError> {
    let slots = state.booking_service.open_slots().await?;

    let mut context = state.views.context(current.user());
    context.insert("slots", &slots);
    Ok(Html(state.views.render(pages::INDEX, &context)?))
}

/// GET /booked/
pub async fn booked(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Html<String>, ApiError> {
    let slots = state.booking_service.booked_slots(current.user()).await?;

    let mut context = state.views.context(current.user());
    context.insert("slots", &slots);
    Ok(Html(state.views.render(pages::BOOKED, &context)?))
}

/// POST /book/{slot_id}/
pub async fn book(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slot_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = signed_in(&current)?;
    let slot_id = parse_id(&slot_id, "slot")?;
    state.booking_service.book(slot_id, Some(user)).await?;
    Ok(found("/"))
}

/// POST /unbook/{slot_id}/
pub async fn unbook(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(slot_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = signed_in(&current)?;
    let slot_id = parse_id(&slot_id, "slot")?;
    state.booking_service.unbook(slot_id, Some(user)).await?;
    Ok(found("/booked/"))
}
