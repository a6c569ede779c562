// Routes module - organizes all HTTP route handlers

pub mod auth;
pub mod employees;
pub mod menus;
pub mod restaurants;
pub mod voting;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, Route};

use crate::auth::{default_message, AuthFailure};
use crate::error::{ApiError, ApiResult};
use crate::models::Message;

/// Longest value accepted for any text column.
pub const MAX_TEXT_LEN: usize = 30;

pub fn all() -> Vec<Route> {
    routes![
        auth::registration,
        auth::login,
        auth::refresh,
        auth::logout_access,
        auth::logout_refresh,
        employees::list_employees,
        employees::get_employee,
        employees::create_employee,
        employees::update_employee,
        employees::delete_employee,
        restaurants::list_restaurants,
        restaurants::get_restaurant,
        restaurants::create_restaurant,
        restaurants::update_restaurant,
        restaurants::delete_restaurant,
        restaurants::delete_restaurant_legacy,
        menus::client::list_menus,
        menus::client::get_menu,
        menus::client::menu_today,
        menus::admin::create_menu,
        menus::admin::update_menu,
        menus::admin::delete_menu,
        voting::client::cast_vote,
        voting::client::my_votes,
        voting::admin::list_votes,
        voting::admin::votes_by_menu,
        voting::admin::delete_vote,
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized, forbidden, not_found, unprocessable, default_catcher]
}

/// Trimmed, non-empty value of an optional text field.
pub fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn too_long(field: &str) -> ApiError {
    ApiError::validation(format!(
        "\"{}\" must be at most {} characters.",
        field, MAX_TEXT_LEN
    ))
}

/// Rejects values longer than the column allows.
pub fn checked(field: &str, value: Option<String>) -> ApiResult<Option<String>> {
    match text(value) {
        Some(v) if v.chars().count() > MAX_TEXT_LEN => Err(too_long(field)),
        other => Ok(other),
    }
}

/// Like `checked`, but the value is stored as sent. Used for login names.
pub fn verbatim(field: &str, value: Option<String>) -> ApiResult<Option<String>> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) if v.chars().count() > MAX_TEXT_LEN => Err(too_long(field)),
        other => Ok(other),
    }
}

fn guard_message(request: &Request<'_>, status: Status) -> Json<Message> {
    let cached = request.local_cache(AuthFailure::default);
    Json(Message::new(
        cached
            .0
            .clone()
            .unwrap_or_else(|| default_message(status).to_string()),
    ))
}

#[catch(401)]
pub fn unauthorized(request: &Request<'_>) -> Json<Message> {
    guard_message(request, Status::Unauthorized)
}

#[catch(403)]
pub fn forbidden(request: &Request<'_>) -> Json<Message> {
    guard_message(request, Status::Forbidden)
}

#[catch(404)]
pub fn not_found() -> Json<Message> {
    Json(Message::new("Resource not found."))
}

#[catch(422)]
pub fn unprocessable() -> Json<Message> {
    Json(Message::new("Malformed request."))
}

#[catch(default)]
pub fn default_catcher(status: Status, request: &Request<'_>) -> Json<Message> {
    let cached = request.local_cache(AuthFailure::default);
    Json(Message::new(cached.0.clone().unwrap_or_else(|| {
        status.reason().unwrap_or("Request failed.").to_string()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_trims_and_drops_blanks() {
        assert_eq!(text(Some("  soup ".into())), Some("soup".into()));
        assert_eq!(text(Some("   ".into())), None);
        assert_eq!(text(None), None);
    }

    #[test]
    fn checked_enforces_column_width() {
        assert!(checked("first", Some("a".repeat(30))).unwrap().is_some());
        let err = checked("first", Some("a".repeat(31))).unwrap_err();
        assert_eq!(err.to_string(), "\"first\" must be at most 30 characters.");
    }

    #[test]
    fn verbatim_keeps_surrounding_spaces() {
        assert_eq!(
            verbatim("username", Some(" test".into())).unwrap(),
            Some(" test".into())
        );
        assert_eq!(verbatim("username", Some("  ".into())).unwrap(), None);
        assert!(verbatim("username", Some(" ".repeat(2) + &"u".repeat(29))).is_err());
    }
}
