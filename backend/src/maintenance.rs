// Scheduled cleanup of stale menus and revoked tokens

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use diesel_async::{AsyncMysqlConnection, RunQueryDsl};
use rocket::fairing::AdHoc;
use rocket_db_pools::Database;
use tracing::{error, info};

use crate::db::LunchDB;
use crate::schema::{menus, revoked_tokens};
use crate::AppState;

/// Source of "now". Request handlers and the purge task read time through it.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

pub fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

/// Menus dated before this instant are purged.
pub fn retention_cutoff(now: NaiveDateTime, retention_days: i64) -> NaiveDateTime {
    start_of_day(now.date() - Duration::days(retention_days.max(0)))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub menus: usize,
    pub revoked_tokens: usize,
}

pub async fn purge_stale(
    conn: &mut AsyncMysqlConnection,
    now: NaiveDateTime,
    retention_days: i64,
    token_ttl: Duration,
) -> QueryResult<PurgeReport> {
    let menus = diesel::delete(menus::table.filter(menus::date.lt(retention_cutoff(now, retention_days))))
        .execute(conn)
        .await?;

    let revoked_tokens = diesel::delete(
        revoked_tokens::table.filter(revoked_tokens::blacklisted_on.lt(now - token_ttl)),
    )
    .execute(conn)
    .await?;

    Ok(PurgeReport {
        menus,
        revoked_tokens,
    })
}

/// Starts the purge loop at liftoff; it stops when the server shuts down.
pub fn stage() -> AdHoc {
    AdHoc::on_liftoff("Stale data purge", |rocket| {
        Box::pin(async move {
            let (Some(db), Some(state)) = (LunchDB::fetch(rocket), rocket.state::<AppState>()) else {
                error!("Purge task not started: database or state missing");
                return;
            };

            let pool = db.0.clone();
            let clock: Arc<dyn Clock> = state.clock.clone();
            let retention_days = state.config.retention_days;
            let token_ttl = state.tokens.refresh_ttl();
            let period = StdDuration::from_secs(state.config.purge_interval_hours.max(1) * 60 * 60);
            let shutdown = rocket.shutdown();

            tokio::spawn(async move {
                tokio::pin!(shutdown);
                let mut interval = tokio::time::interval(period);
                // first tick is immediate
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = interval.tick() => {}
                    }

                    let mut conn = match pool.get().await {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Purge skipped, no connection: {}", e);
                            continue;
                        }
                    };

                    match purge_stale(&mut conn, clock.now(), retention_days, token_ttl).await {
                        Ok(report) => info!(
                            "Purged {} menu(s) and {} revoked token(s)",
                            report.menus, report.revoked_tokens
                        ),
                        Err(e) => error!("Purge failed: {}", e),
                    }
                }

                info!("Purge task stopped");
            });
        })
    })
}

#[cfg(test)]
pub struct FixedClock(pub NaiveDateTime);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn cutoff_is_midnight_of_the_oldest_kept_day() {
        assert_eq!(
            retention_cutoff(at("2024-01-10 15:30:00"), 7),
            at("2024-01-03 00:00:00")
        );
    }

    #[test]
    fn zero_retention_keeps_only_today() {
        assert_eq!(
            retention_cutoff(at("2024-01-10 00:00:01"), 0),
            at("2024-01-10 00:00:00")
        );
        assert_eq!(
            retention_cutoff(at("2024-01-10 00:00:01"), -5),
            at("2024-01-10 00:00:00")
        );
    }

    #[test]
    fn fixed_clock_reports_its_day() {
        let clock = FixedClock(at("2024-03-01 23:59:59"));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
