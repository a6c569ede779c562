// Sign-up, sign-in, token refresh and revocation

use chrono::NaiveDateTime;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::Connection;
use rocket_db_pools::diesel::prelude::*;
use tracing::info;

use crate::auth::password::verify_password;
use crate::auth::{AuthenticatedEmployee, Claims, RefreshGrant, TokenType};
use crate::db::LunchDB;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AccessToken, Employee, EmployeeRequest, LoginRequest, Message, NewRevokedToken, TokenPair,
};
use crate::routes::employees::{insert_employee, new_employee};
use crate::schema::{employees, revoked_tokens};
use crate::AppState;

const MISSING_CREDENTIALS: &str = "Please, provide \"username\" and \"password\" in body.";
const WRONG_CREDENTIALS: &str = "Wrong credentials";

fn credentials(request: Option<LoginRequest>) -> ApiResult<(String, String)> {
    match request {
        Some(LoginRequest {
            username: Some(username),
            password: Some(password),
        }) if !username.is_empty() && !password.is_empty() => Ok((username, password)),
        _ => Err(ApiError::validation(MISSING_CREDENTIALS)),
    }
}

async fn revoke(
    conn: &mut Connection<LunchDB>,
    claims: &Claims,
    now: NaiveDateTime,
) -> ApiResult<()> {
    diesel::insert_into(revoked_tokens::table)
        .values(&NewRevokedToken {
            jti: claims.jti.clone(),
            blacklisted_on: now,
        })
        .execute(conn)
        .await?;
    Ok(())
}

// Route to self-register as a regular employee
#[post("/auth/registration", data = "<employee_request>")]
pub async fn registration(
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
    employee_request: Option<Json<EmployeeRequest>>,
) -> ApiResult<(Status, Json<TokenPair>)> {
    let employee = new_employee(employee_request.map(Json::into_inner), false)?;
    let id = insert_employee(&mut db, &employee).await?;
    info!("Registered employee {} ({})", id, employee.username);

    let access_token = state
        .tokens
        .issue_for(id, &employee.username, false, TokenType::Access)?;
    let refresh_token = state
        .tokens
        .issue_for(id, &employee.username, false, TokenType::Refresh)?;

    Ok((
        Status::Created,
        Json(TokenPair {
            message: format!("User {} was created", employee.username),
            access_token,
            refresh_token,
        }),
    ))
}

// Route to exchange credentials for a token pair
#[post("/auth/login", data = "<login>")]
pub async fn login(
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
    login: Option<Json<LoginRequest>>,
) -> ApiResult<Json<TokenPair>> {
    let (username, password) = credentials(login.map(Json::into_inner))?;

    let employee = employees::table
        .filter(employees::username.eq(&username))
        .select(Employee::as_select())
        .first(&mut db)
        .await
        .optional()?
        .filter(|employee| verify_password(&password, &employee.hashed_password))
        .ok_or_else(|| ApiError::Unauthorized(WRONG_CREDENTIALS.into()))?;

    let (access_token, refresh_token) = state.tokens.issue_pair(&employee)?;
    info!("Employee {} logged in", employee.id);

    Ok(Json(TokenPair {
        message: format!("Logged in as {}", employee.username),
        access_token,
        refresh_token,
    }))
}

// Route to mint a new access token from a refresh token
#[post("/auth/token/refresh")]
pub async fn refresh(
    grant: RefreshGrant,
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
) -> ApiResult<Json<AccessToken>> {
    let id = grant
        .claims
        .employee_id()
        .ok_or_else(|| ApiError::Unauthorized("Signature verification failed".into()))?;

    // admin flag and username are taken from the store, not the old claims
    let employee = employees::table
        .find(id)
        .select(Employee::as_select())
        .first(&mut db)
        .await
        .optional()?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".into()))?;

    Ok(Json(AccessToken {
        access_token: state.tokens.issue(&employee, TokenType::Access)?,
    }))
}

// Route to revoke the presented access token
#[post("/auth/logout/access")]
pub async fn logout_access(
    employee: AuthenticatedEmployee,
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
) -> ApiResult<Json<Message>> {
    revoke(&mut db, &employee.claims, state.clock.now()).await?;
    Ok(Json(Message::new("Access token has been revoked")))
}

// Route to revoke the presented refresh token
#[post("/auth/logout/refresh")]
pub async fn logout_refresh(
    grant: RefreshGrant,
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
) -> ApiResult<Json<Message>> {
    revoke(&mut db, &grant.claims, state.clock.now()).await?;
    Ok(Json(Message::new("Refresh token has been revoked")))
}
