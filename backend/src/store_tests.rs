// Queries, cascades and ledger transactions against a real MySQL database

use std::sync::{Mutex, MutexGuard, Once};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{AsyncConnection, AsyncMysqlConnection, RunQueryDsl};
use diesel_migrations::MigrationHarness;

use crate::catalog::{find_menus, menu_of_the_day, MenuFilter};
use crate::db::{last_insert_id, MIGRATIONS};
use crate::error::ApiError;
use crate::ledger::{self, Ballot, LedgerStore, ALREADY_VOTED, VOTE_NOT_FOUND};
use crate::maintenance::{purge_stale, start_of_day};
use crate::models::{NewEmployee, NewMenu, NewRestaurant, NewRevokedToken, NewVote};
use crate::schema::{employees, menus, restaurants, revoked_tokens, votes};

static SERIAL: Mutex<()> = Mutex::new(());
static MIGRATED: Once = Once::new();

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn noon(d: u32) -> NaiveDateTime {
    day(d).and_hms_opt(12, 0, 0).unwrap()
}

/// A connection inside a never-committed transaction over empty tables, or
/// `None` when `TEST_DATABASE_URL` is unset.
async fn connect() -> Option<(MutexGuard<'static, ()>, AsyncMysqlConnection)> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    MIGRATED.call_once(|| {
        let mut sync_conn = diesel::MysqlConnection::establish(&url).unwrap();
        sync_conn.run_pending_migrations(MIGRATIONS).unwrap();
    });

    let mut conn = AsyncMysqlConnection::establish(&url).await.unwrap();
    conn.begin_test_transaction().await.unwrap();

    diesel::delete(votes::table).execute(&mut conn).await.unwrap();
    diesel::delete(menus::table).execute(&mut conn).await.unwrap();
    diesel::delete(restaurants::table).execute(&mut conn).await.unwrap();
    diesel::delete(employees::table).execute(&mut conn).await.unwrap();
    diesel::delete(revoked_tokens::table).execute(&mut conn).await.unwrap();

    Some((guard, conn))
}

async fn employee(conn: &mut AsyncMysqlConnection, username: &str) -> i32 {
    diesel::insert_into(employees::table)
        .values(&NewEmployee {
            name: username.into(),
            username: username.into(),
            email: format!("{}@corp.io", username),
            hashed_password: "not-a-real-hash".into(),
            is_admin: false,
        })
        .execute(conn)
        .await
        .unwrap();
    last_insert_id(conn).await.unwrap()
}

async fn restaurant(conn: &mut AsyncMysqlConnection, name: &str) -> i32 {
    diesel::insert_into(restaurants::table)
        .values(&NewRestaurant {
            name: name.into(),
            resp_username: "bob".into(),
        })
        .execute(conn)
        .await
        .unwrap();
    last_insert_id(conn).await.unwrap()
}

async fn menu(
    conn: &mut AsyncMysqlConnection,
    restaurant_id: i32,
    date: NaiveDateTime,
    first: &str,
    number_votes: i32,
) -> i32 {
    diesel::insert_into(menus::table)
        .values(&NewMenu {
            date,
            number_votes,
            first: first.into(),
            second: "rice".into(),
            drink: "tea".into(),
            restaurant_id,
        })
        .execute(conn)
        .await
        .unwrap();
    last_insert_id(conn).await.unwrap()
}

async fn tally(conn: &mut AsyncMysqlConnection, menu_id: i32) -> i32 {
    menus::table
        .find(menu_id)
        .select(menus::number_votes)
        .first(conn)
        .await
        .unwrap()
}

async fn vote_count(conn: &mut AsyncMysqlConnection) -> i64 {
    votes::table.count().get_result(conn).await.unwrap()
}

fn ids(menus: &[crate::models::Menu]) -> Vec<i32> {
    menus.iter().map(|m| m.id).collect()
}

#[rocket::async_test]
async fn deleting_a_restaurant_removes_its_menus_and_votes() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let ann = employee(&mut conn, "ann").await;
    let place = restaurant(&mut conn, "Canteen").await;
    let lunch = menu(&mut conn, place, noon(1), "soup", 0).await;

    let ballot = Ballot { employee_id: ann, menu_id: lunch };
    ledger::cast_vote(&mut conn, ballot, noon(1)).await.unwrap();
    assert_eq!(vote_count(&mut conn).await, 1);

    diesel::delete(restaurants::table.find(place))
        .execute(&mut conn)
        .await
        .unwrap();

    let menus_left: i64 = menus::table.count().get_result(&mut conn).await.unwrap();
    assert_eq!(menus_left, 0);
    assert_eq!(vote_count(&mut conn).await, 0);
}

#[rocket::async_test]
async fn menu_filters_hit_the_right_rows() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let canteen = restaurant(&mut conn, "Canteen").await;
    let bistro = restaurant(&mut conn, "Bistro").await;

    let old_borsch = menu(&mut conn, canteen, noon(1), "borsch", 0).await;
    let today_soup = menu(&mut conn, canteen, noon(2), "borsch soup", 3).await;
    let next_borsch = menu(&mut conn, bistro, noon(3), "borsch", 5).await;
    let today = start_of_day(day(2));

    let found = find_menus(&mut conn, &MenuFilter::First("borsch".into()), today)
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![old_borsch, next_borsch]);

    let found = find_menus(&mut conn, &MenuFilter::Current, today).await.unwrap();
    assert_eq!(ids(&found), vec![today_soup, next_borsch]);

    let found = find_menus(&mut conn, &MenuFilter::Popular, today).await.unwrap();
    assert_eq!(ids(&found), vec![next_borsch, today_soup]);

    let found = find_menus(&mut conn, &MenuFilter::RestaurantName("Canteen".into()), today)
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![today_soup]);
}

#[rocket::async_test]
async fn menu_of_the_day_is_none_then_lowest_id_among_leaders() {
    let Some((_guard, mut conn)) = connect().await else { return };
    assert!(menu_of_the_day(&mut conn).await.unwrap().is_none());

    let place = restaurant(&mut conn, "Canteen").await;
    menu(&mut conn, place, noon(3), "stew", 1).await;
    let first_leader = menu(&mut conn, place, noon(1), "soup", 2).await;
    menu(&mut conn, place, noon(2), "salad", 2).await;

    let best = menu_of_the_day(&mut conn).await.unwrap().unwrap();
    assert_eq!(best.id, first_leader);
}

#[rocket::async_test]
async fn purge_drops_stale_menus_with_their_votes_and_old_revocations() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let ann = employee(&mut conn, "ann").await;
    let place = restaurant(&mut conn, "Canteen").await;
    let now = noon(20);

    let stale = menu(&mut conn, place, noon(2), "soup", 0).await;
    let fresh = menu(&mut conn, place, noon(15), "stew", 0).await;
    let ballot = Ballot { employee_id: ann, menu_id: stale };
    ledger::cast_vote(&mut conn, ballot, noon(2)).await.unwrap();

    for (jti, age) in [("old", Duration::days(30)), ("new", Duration::hours(1))] {
        diesel::insert_into(revoked_tokens::table)
            .values(&NewRevokedToken {
                jti: jti.into(),
                blacklisted_on: now - age,
            })
            .execute(&mut conn)
            .await
            .unwrap();
    }

    let report = purge_stale(&mut conn, now, 7, Duration::seconds(900_000))
        .await
        .unwrap();
    assert_eq!(report.menus, 1);
    assert_eq!(report.revoked_tokens, 1);

    let left: Vec<i32> = menus::table.select(menus::id).load(&mut conn).await.unwrap();
    assert_eq!(left, vec![fresh]);
    assert_eq!(vote_count(&mut conn).await, 0);
    let jtis: Vec<String> = revoked_tokens::table
        .select(revoked_tokens::jti)
        .load(&mut conn)
        .await
        .unwrap();
    assert_eq!(jtis, vec!["new".to_string()]);
}

#[rocket::async_test]
async fn duplicate_day_vote_rolls_back_without_touching_the_tally() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let ann = employee(&mut conn, "ann").await;
    let place = restaurant(&mut conn, "Canteen").await;
    let soup = menu(&mut conn, place, noon(1), "soup", 0).await;
    let stew = menu(&mut conn, place, noon(1), "stew", 0).await;

    let ballot = Ballot { employee_id: ann, menu_id: soup };
    ledger::cast_vote(&mut conn, ballot, noon(1)).await.unwrap();

    // same day bucket, written past the pre-check
    let racing = NewVote {
        employee_id: ann,
        menu_id: stew,
        vote_day: day(1),
        cast_at: noon(1) + Duration::minutes(1),
    };
    let err = conn.record_vote(racing).await.unwrap_err();
    assert!(matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    ));
    assert_eq!(tally(&mut conn, soup).await, 1);
    assert_eq!(tally(&mut conn, stew).await, 0);
    assert_eq!(vote_count(&mut conn).await, 1);

    let again = Ballot { employee_id: ann, menu_id: stew };
    let err = ledger::cast_vote(&mut conn, again, noon(1)).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(ref m) if m == ALREADY_VOTED));

    ledger::cast_vote(&mut conn, again, noon(2)).await.unwrap();
    assert_eq!(tally(&mut conn, stew).await, 1);
}

#[rocket::async_test]
async fn removing_a_vote_never_drives_the_tally_negative() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let ann = employee(&mut conn, "ann").await;
    let place = restaurant(&mut conn, "Canteen").await;
    let soup = menu(&mut conn, place, noon(1), "soup", 0).await;

    let ballot = Ballot { employee_id: ann, menu_id: soup };
    let vote = ledger::cast_vote(&mut conn, ballot, noon(1)).await.unwrap();
    diesel::update(menus::table.find(soup))
        .set(menus::number_votes.eq(0))
        .execute(&mut conn)
        .await
        .unwrap();

    ledger::delete_vote(&mut conn, vote.id).await.unwrap();
    assert_eq!(tally(&mut conn, soup).await, 0);
    assert_eq!(vote_count(&mut conn).await, 0);

    let err = ledger::delete_vote(&mut conn, vote.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref m) if m == VOTE_NOT_FOUND));
    assert_eq!(tally(&mut conn, soup).await, 0);
}

#[rocket::async_test]
async fn removing_an_employee_takes_back_every_vote_they_cast() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let ann = employee(&mut conn, "ann").await;
    let bob = employee(&mut conn, "bob").await;
    let place = restaurant(&mut conn, "Canteen").await;
    let soup = menu(&mut conn, place, noon(1), "soup", 0).await;
    let stew = menu(&mut conn, place, noon(1), "stew", 0).await;

    for (d, menu_id) in [(1, soup), (2, soup), (3, stew)] {
        let ballot = Ballot { employee_id: ann, menu_id };
        ledger::cast_vote(&mut conn, ballot, noon(d)).await.unwrap();
    }
    let ballot = Ballot { employee_id: bob, menu_id: soup };
    ledger::cast_vote(&mut conn, ballot, noon(1)).await.unwrap();
    assert_eq!(tally(&mut conn, soup).await, 3);

    assert!(conn.remove_employee(ann).await.unwrap());
    assert_eq!(tally(&mut conn, soup).await, 1);
    assert_eq!(tally(&mut conn, stew).await, 0);
    assert_eq!(vote_count(&mut conn).await, 1);

    assert!(!conn.remove_employee(ann).await.unwrap());
}

#[rocket::async_test]
async fn stored_admin_flag_decides_ballots_for_others() {
    let Some((_guard, mut conn)) = connect().await else { return };
    let ann = employee(&mut conn, "ann").await;
    let boss = employee(&mut conn, "boss").await;
    let ballot = Ballot { employee_id: ann, menu_id: 1 };

    let err = ledger::authorize_ballot(&mut conn, boss, &ballot).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    diesel::update(employees::table.find(boss))
        .set(employees::is_admin.eq(true))
        .execute(&mut conn)
        .await
        .unwrap();
    ledger::authorize_ballot(&mut conn, boss, &ballot).await.unwrap();
}
