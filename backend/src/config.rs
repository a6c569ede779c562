use rocket::figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

const ENV_KEYS: [&str; 10] = [
    "DATABASE_URL",
    "JWT_SECRET_KEY",
    "ACCESS_TOKEN_TTL_SECS",
    "REFRESH_TOKEN_TTL_SECS",
    "PURGE_INTERVAL_HOURS",
    "RETENTION_DAYS",
    "ROCKET_PORT",
    "ADMIN_USERNAME",
    "ADMIN_PASSWORD",
    "ADMIN_EMAIL",
];

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(alias = "DATABASE_URL")]
    pub database_url: String,
    #[serde(alias = "JWT_SECRET_KEY", alias = "jwt_secret_key")]
    pub jwt_secret: String,
    #[serde(default = "default_access_ttl", alias = "ACCESS_TOKEN_TTL_SECS")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl", alias = "REFRESH_TOKEN_TTL_SECS")]
    pub refresh_token_ttl_secs: i64,
    #[serde(default = "default_purge_interval", alias = "PURGE_INTERVAL_HOURS")]
    pub purge_interval_hours: u64,
    #[serde(default = "default_retention_days", alias = "RETENTION_DAYS")]
    pub retention_days: i64,
    #[serde(default = "default_rocket_port", alias = "ROCKET_PORT")]
    pub rocket_port: u16,
    /// Bootstrap administrator created on first start when no employees exist.
    #[serde(default, alias = "ADMIN_USERNAME")]
    pub admin_username: Option<String>,
    #[serde(default, alias = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,
    #[serde(default, alias = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,
}

/// Ten years; longer lifetimes overflow the date arithmetic.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;
const MAX_RETENTION_DAYS: i64 = 10 * 365;
const MAX_PURGE_INTERVAL_HOURS: u64 = 365 * 24;

fn default_access_ttl() -> i64 {
    30_000
}

fn default_refresh_ttl() -> i64 {
    900_000
}

fn default_purge_interval() -> u64 {
    24
}

fn default_retention_days() -> i64 {
    7
}

fn default_rocket_port() -> u16 {
    8000
}

impl AppConfig {
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("Config.toml"))
            .merge(Toml::file("../Config.toml"))
            .merge(Env::raw().only(&ENV_KEYS))
    }

    pub fn load() -> Result<Self, rocket::figment::Error> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks for the numeric settings.
    pub fn validate(&self) -> Result<(), String> {
        let ttls = [
            ("ACCESS_TOKEN_TTL_SECS", self.access_token_ttl_secs),
            ("REFRESH_TOKEN_TTL_SECS", self.refresh_token_ttl_secs),
        ];
        for (key, value) in ttls {
            if !(1..=MAX_TTL_SECS).contains(&value) {
                return Err(format!("{} must be between 1 and {}", key, MAX_TTL_SECS));
            }
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(format!(
                "RETENTION_DAYS must be between 0 and {}",
                MAX_RETENTION_DAYS
            ));
        }
        if !(1..=MAX_PURGE_INTERVAL_HOURS).contains(&self.purge_interval_hours) {
            return Err(format!(
                "PURGE_INTERVAL_HOURS must be between 1 and {}",
                MAX_PURGE_INTERVAL_HOURS
            ));
        }
        Ok(())
    }
}
