use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::Employee;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub is_admin: bool,
    pub jti: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn employee_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

/// HS256 signing material plus the lifetimes of both token kinds.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        )
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue(&self, employee: &Employee, token_type: TokenType) -> ApiResult<String> {
        self.issue_for(
            employee.id,
            &employee.username,
            employee.is_admin,
            token_type,
        )
    }

    pub fn issue_for(
        &self,
        employee_id: i32,
        username: &str,
        is_admin: bool,
        token_type: TokenType,
    ) -> ApiResult<String> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: employee_id.to_string(),
            username: username.to_string(),
            is_admin,
            jti: Uuid::new_v4().to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Returns `(access, refresh)`.
    pub fn issue_pair(&self, employee: &Employee) -> ApiResult<(String, String)> {
        Ok((
            self.issue(employee, TokenType::Access)?,
            self.issue(employee, TokenType::Refresh)?,
        ))
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> ApiResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ApiError::Unauthorized("Token has expired".into()),
                _ => ApiError::Unauthorized("Signature verification failed".into()),
            })?
            .claims;

        if claims.token_type != expected {
            let message = match expected {
                TokenType::Access => "Only access tokens are allowed",
                TokenType::Refresh => "Only refresh tokens are allowed",
            };
            return Err(ApiError::Unauthorized(message.into()));
        }

        Ok(claims)
    }
}
