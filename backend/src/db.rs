// Database connection and initialization

use diesel::{Connection, QueryDsl, QueryResult};
use diesel_async::AsyncMysqlConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rocket::Rocket;
use rocket_db_pools::diesel::MysqlPool;
use rocket_db_pools::Database;
use tracing::{error, info, warn};

use crate::auth::password::hash_password;
use crate::models::NewEmployee;
use crate::AppState;

/// Database connection pool for the lunch service
#[derive(Database)]
#[database("lunch_db")]
pub struct LunchDB(pub MysqlPool);

// Embed migrations from the migrations directory
pub(crate) const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Narrows an auto-increment value to the INTEGER id columns.
fn row_id(id: u64) -> QueryResult<i32> {
    i32::try_from(id).map_err(|e| diesel::result::Error::DeserializationError(Box::new(e)))
}

/// Id generated by the most recent INSERT on this connection.
pub async fn last_insert_id(conn: &mut AsyncMysqlConnection) -> QueryResult<i32> {
    use diesel_async::RunQueryDsl;

    // LAST_INSERT_ID() is BIGINT UNSIGNED; ids are INTEGER columns.
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Unsigned<diesel::sql_types::BigInt>>(
        "LAST_INSERT_ID()",
    ))
    .get_result::<u64>(conn)
    .await
    .and_then(row_id)
}

fn database_url(rocket: &Rocket<rocket::Build>) -> Result<String, String> {
    rocket
        .state::<AppState>()
        .map(|state| state.config.database_url.clone())
        .ok_or_else(|| "Application state is not managed".to_string())
}

/// Run pending database migrations
pub async fn run_migrations(rocket: Rocket<rocket::Build>) -> Rocket<rocket::Build> {
    let database_url = match database_url(&rocket) {
        Ok(url) => url,
        Err(e) => {
            error!("{}", e);
            panic!("Database migration failed");
        }
    };

    // MigrationHarness requires a sync connection
    let result: Result<Vec<String>, String> = rocket::tokio::task::spawn_blocking(move || {
        let mut sync_conn = diesel::MysqlConnection::establish(&database_url)
            .map_err(|e| format!("Failed to establish connection: {}", e))?;

        let versions = sync_conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| format!("Failed to run migrations: {}", e))?
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<String>>();

        Ok(versions)
    })
    .await
    .unwrap_or_else(|e| Err(format!("Migration task panicked: {}", e)));

    match result {
        Ok(versions) => {
            if versions.is_empty() {
                info!("Database is up to date");
            } else {
                info!("Applied {} migration(s)", versions.len());
                for version in versions {
                    info!("  - {}", version);
                }
            }
        }
        Err(e) => {
            error!("{}", e);
            panic!("Database migration failed");
        }
    }

    rocket
}

/// Create the bootstrap administrator when the employees table is empty
pub async fn run_seeding(rocket: Rocket<rocket::Build>) -> Rocket<rocket::Build> {
    let Some(config) = rocket.state::<AppState>().map(|state| state.config.clone()) else {
        return rocket;
    };

    let (Some(username), Some(password)) = (config.admin_username, config.admin_password) else {
        info!("ADMIN_USERNAME/ADMIN_PASSWORD not set, skipping admin seeding");
        return rocket;
    };

    let result: Result<bool, String> = rocket::tokio::task::spawn_blocking(move || {
        use crate::schema::employees;
        use diesel::RunQueryDsl;

        let mut sync_conn = diesel::MysqlConnection::establish(&config.database_url)
            .map_err(|e| format!("Failed to establish connection: {}", e))?;

        let count: i64 = employees::table
            .count()
            .get_result(&mut sync_conn)
            .map_err(|e| format!("Failed to count employees: {}", e))?;

        if count > 0 {
            return Ok(false);
        }

        let admin = NewEmployee {
            name: username.clone(),
            username: username.clone(),
            email: config.admin_email.unwrap_or_default(),
            hashed_password: hash_password(&password)
                .map_err(|e| format!("Failed to hash admin password: {}", e))?,
            is_admin: true,
        };

        diesel::insert_into(employees::table)
            .values(&admin)
            .execute(&mut sync_conn)
            .map_err(|e| format!("Failed to seed admin: {}", e))?;

        Ok(true)
    })
    .await
    .unwrap_or_else(|e| Err(format!("Seeding task panicked: {}", e)));

    match result {
        Ok(true) => info!("Seeded bootstrap administrator"),
        Ok(false) => {}
        Err(e) => warn!("Seeding failed: {}", e),
    }

    rocket
}
