// Main application entry point

#[macro_use]
extern crate rocket;

mod auth;
mod catalog;
mod config;
mod db;
mod error;
mod ledger;
mod maintenance;
mod models;
mod routes;
mod schema;
#[cfg(test)]
mod store_tests;

use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use rocket_db_pools::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::TokenKeys;
use config::AppConfig;
use db::LunchDB;
use maintenance::{Clock, SystemClock};

/// Shared state managed by Rocket.
pub struct AppState {
    pub config: AppConfig,
    pub tokens: TokenKeys,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: TokenKeys::from_config(&config),
            config,
            clock,
        }
    }
}

/// Routes, catchers, state and the pool; no startup fairings.
pub fn build(state: AppState) -> Rocket<Build> {
    let figment = rocket::config::Config::figment()
        .merge(("port", state.config.rocket_port))
        .merge((
            "databases.lunch_db",
            rocket_db_pools::Config {
                url: state.config.database_url.clone(),
                min_connections: None,
                max_connections: 1024,
                connect_timeout: 3,
                idle_timeout: None,
                extensions: None,
            },
        ));

    rocket::custom(figment)
        .manage(state)
        .attach(LunchDB::init())
        .mount("/", routes::all())
        .register("/", routes::catchers())
}

#[rocket::launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()
        .expect("Failed to load configuration (DATABASE_URL and JWT_SECRET_KEY must be set)");
    info!("Starting lunch backend on port {}", config.rocket_port);

    build(AppState::new(config, Arc::new(SystemClock)))
        .attach(AdHoc::on_ignite("Database Migrations", db::run_migrations))
        .attach(AdHoc::on_ignite("Admin Seeding", db::run_seeding))
        .attach(maintenance::stage())
}
