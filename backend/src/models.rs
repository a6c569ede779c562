use chrono::{NaiveDate, NaiveDateTime};
use rocket::serde::{Deserialize, Serialize};
use rocket_db_pools::diesel::prelude::*;

use crate::schema::{employees, menus, restaurants, revoked_tokens, votes};

/// Format used for menu dates on the wire, both in requests and responses.
pub const MENU_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub mod menu_date {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::MENU_DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(MENU_DATE_FORMAT))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = employees)]
pub struct Employee {
    pub id: i32,
    pub name: String,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = employees)]
pub struct NewEmployee {
    pub name: String,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_admin: bool,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = employees)]
pub struct EmployeeChanges {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[serde(crate = "rocket::serde")]
#[diesel(table_name = restaurants)]
pub struct Restaurant {
    pub id: i32,
    pub name: String,
    pub resp_username: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = restaurants)]
pub struct NewRestaurant {
    pub name: String,
    pub resp_username: String,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = restaurants)]
pub struct RestaurantChanges {
    pub name: Option<String>,
    pub resp_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[serde(crate = "rocket::serde")]
#[diesel(table_name = menus)]
pub struct Menu {
    pub id: i32,
    #[serde(with = "menu_date")]
    pub date: NaiveDateTime,
    pub number_votes: i32,
    pub first: String,
    pub second: String,
    pub drink: String,
    pub restaurant_id: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = menus)]
pub struct NewMenu {
    pub date: NaiveDateTime,
    pub number_votes: i32,
    pub first: String,
    pub second: String,
    pub drink: String,
    pub restaurant_id: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = menus)]
pub struct MenuChanges {
    pub date: Option<NaiveDateTime>,
    pub first: Option<String>,
    pub second: Option<String>,
    pub drink: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[serde(crate = "rocket::serde")]
#[diesel(table_name = votes)]
pub struct Vote {
    pub id: i32,
    pub employee_id: i32,
    pub menu_id: i32,
    #[serde(skip)]
    pub vote_day: NaiveDate,
    #[serde(skip)]
    pub cast_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = votes)]
pub struct NewVote {
    pub employee_id: i32,
    pub menu_id: i32,
    pub vote_day: NaiveDate,
    pub cast_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = revoked_tokens)]
pub struct NewRevokedToken {
    pub jti: String,
    pub blacklisted_on: NaiveDateTime,
}

// Request payloads. Presence of required fields is checked by the handlers.

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct EmployeeRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct RestaurantRequest {
    pub name: Option<String>,
    pub resp_username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct MenuRequest {
    pub restaurant_id: Option<i32>,
    pub resp_username: Option<String>,
    pub first: Option<String>,
    pub second: Option<String>,
    pub drink: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct CastVoteRequest {
    pub employee_id: Option<i32>,
    pub menu_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

// Responses

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct EmployeeResponse {
    pub id: i32,
    pub name: String,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<Employee> for EmployeeResponse {
    fn from(employee: Employee) -> Self {
        Self {
            id: employee.id,
            name: employee.name,
            username: employee.username,
            email: employee.email,
            is_admin: employee.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct EmployeeCreated {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct MenuCreated {
    pub id: i32,
    #[serde(with = "menu_date")]
    pub date: NaiveDateTime,
    pub restaurant_id: i32,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct VoteCreated {
    pub id: i32,
    pub employee_id: i32,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct TokenPair {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AccessToken {
    pub access_token: String,
}
