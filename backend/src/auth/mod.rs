// Bearer-token authentication: request guards for any signed-in employee,
// administrators, and refresh-token holders.

pub mod password;
pub mod token;

use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_db_pools::diesel::prelude::*;
use rocket_db_pools::Connection;

use crate::db::LunchDB;
use crate::error::{ApiError, ApiResult};
use crate::schema::{employees, revoked_tokens};
use crate::AppState;

pub use token::{Claims, TokenKeys, TokenType};

/// Message of the last guard failure, rendered by the JSON catchers.
#[derive(Debug, Default)]
pub struct AuthFailure(pub Option<String>);

/// Any employee holding a valid, unrevoked access token.
#[derive(Debug)]
pub struct AuthenticatedEmployee {
    pub id: i32,
    pub claims: Claims,
}

/// An authenticated employee whose admin flag is set in the store.
#[derive(Debug)]
pub struct AdminEmployee(pub AuthenticatedEmployee);

/// A valid, unrevoked refresh token.
#[derive(Debug)]
pub struct RefreshGrant {
    pub claims: Claims,
}

fn bearer_token<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn database(request: &Request<'_>) -> ApiResult<Connection<LunchDB>> {
    request
        .guard::<Connection<LunchDB>>()
        .await
        .succeeded()
        .ok_or(ApiError::Unavailable)
}

async fn authenticate(request: &Request<'_>, expected: TokenType) -> ApiResult<Claims> {
    let token = bearer_token(request)
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization Header".into()))?;

    let state = request
        .rocket()
        .state::<AppState>()
        .ok_or(ApiError::Unavailable)?;
    let claims = state.tokens.verify(token, expected)?;

    let mut db = database(request).await?;
    let revoked: i64 = revoked_tokens::table
        .filter(revoked_tokens::jti.eq(&claims.jti))
        .count()
        .get_result(&mut db)
        .await?;

    if revoked > 0 {
        return Err(ApiError::Unauthorized("Token has been revoked".into()));
    }

    Ok(claims)
}

fn fail<T>(request: &Request<'_>, err: ApiError) -> Outcome<T, ApiError> {
    let status = err.status();
    let message = err.public_message();
    request.local_cache(|| AuthFailure(Some(message)));
    Outcome::Error((status, err))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedEmployee {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let claims = match authenticate(request, TokenType::Access).await {
            Ok(claims) => claims,
            Err(err) => return fail(request, err),
        };

        match claims.employee_id() {
            Some(id) => Outcome::Success(AuthenticatedEmployee { id, claims }),
            None => fail(
                request,
                ApiError::Unauthorized("Signature verification failed".into()),
            ),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminEmployee {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let employee = try_outcome!(request.guard::<AuthenticatedEmployee>().await);

        let mut db = match database(request).await {
            Ok(db) => db,
            Err(err) => return fail(request, err),
        };

        let is_admin = employees::table
            .find(employee.id)
            .select(employees::is_admin)
            .first::<bool>(&mut db)
            .await
            .optional();

        match is_admin {
            Ok(Some(true)) => Outcome::Success(AdminEmployee(employee)),
            Ok(_) => fail(request, ApiError::Forbidden("Admins only!".into())),
            Err(err) => fail(request, err.into()),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RefreshGrant {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match authenticate(request, TokenType::Refresh).await {
            Ok(claims) => Outcome::Success(RefreshGrant { claims }),
            Err(err) => fail(request, err),
        }
    }
}

/// Message used when a guard failure carries no cached one.
pub fn default_message(status: Status) -> &'static str {
    match status.code {
        401 => "Missing Authorization Header",
        403 => "Admins only!",
        _ => "Request failed.",
    }
}
