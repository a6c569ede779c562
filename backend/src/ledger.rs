// Vote ledger: one vote per employee per day, tallies kept in step with votes

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncMysqlConnection, RunQueryDsl};

use crate::db::last_insert_id;
use crate::error::{ApiError, ApiResult};
use crate::models::{CastVoteRequest, NewVote, Vote};
use crate::schema::{employees, menus, votes};

pub const MISSING_REFERENCES: &str = "Please, specify \"menu_id\", \"employee_id\".";
pub const ALREADY_VOTED: &str = "An employee can vote only once a day.";
pub const UNKNOWN_REFERENCES: &str = "Such \"menu_id\" or(and) \"employee_id\" does not exist.";
pub const VOTE_NOT_FOUND: &str = "Vote not found.";
pub const OWN_VOTES_ONLY: &str = "You can only vote for yourself.";

/// Offset/limit window over votes ordered by ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 1000;

    pub fn new(offset: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            offset: offset.unwrap_or(0).max(0),
            limit: limit.unwrap_or(default_limit).clamp(0, Self::MAX_LIMIT),
        }
    }
}

/// A validated request to vote for a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ballot {
    pub employee_id: i32,
    pub menu_id: i32,
}

impl Ballot {
    pub fn from_request(request: Option<&CastVoteRequest>) -> ApiResult<Self> {
        match request {
            Some(CastVoteRequest {
                employee_id: Some(employee_id),
                menu_id: Some(menu_id),
            }) if *employee_id > 0 && *menu_id > 0 => Ok(Ballot {
                employee_id: *employee_id,
                menu_id: *menu_id,
            }),
            _ => Err(ApiError::validation(MISSING_REFERENCES)),
        }
    }
}

/// Persistence operations the ledger needs. The write operations are atomic.
///
/// `(employee_id, vote_day)` is a unique index, so a duplicate that races
/// past the pre-check fails at insert time.
#[async_trait]
pub trait LedgerStore: Send {
    async fn employee_exists(&mut self, employee_id: i32) -> QueryResult<bool>;

    async fn menu_exists(&mut self, menu_id: i32) -> QueryResult<bool>;

    /// Current admin flag in the store; `false` for an unknown employee.
    async fn is_admin(&mut self, employee_id: i32) -> QueryResult<bool>;

    async fn vote_on_day(&mut self, employee_id: i32, day: NaiveDate)
        -> QueryResult<Option<Vote>>;

    /// Inserts the vote and increments its menu's tally.
    async fn record_vote(&mut self, vote: NewVote) -> QueryResult<Vote>;

    /// Deletes the vote and decrements its menu's tally.
    async fn remove_vote(&mut self, vote_id: i32) -> QueryResult<Option<Vote>>;

    /// Deletes the employee, their votes, and the tally those votes added.
    async fn remove_employee(&mut self, employee_id: i32) -> QueryResult<bool>;

    async fn votes_for_employee(&mut self, employee_id: i32, page: Page)
        -> QueryResult<Vec<Vote>>;

    async fn votes_for_menu(&mut self, menu_id: i32, page: Page) -> QueryResult<Vec<Vote>>;

    async fn all_votes(&mut self) -> QueryResult<Vec<Vote>>;
}

/// Non-administrators may only vote on their own behalf. The admin flag is
/// read from the store so a demotion takes effect before the token expires.
pub async fn authorize_ballot<S>(store: &mut S, voter_id: i32, ballot: &Ballot) -> ApiResult<()>
where
    S: LedgerStore + ?Sized,
{
    if voter_id == ballot.employee_id || store.is_admin(voter_id).await? {
        Ok(())
    } else {
        Err(ApiError::Forbidden(OWN_VOTES_ONLY.into()))
    }
}

pub async fn cast_vote<S>(store: &mut S, ballot: Ballot, now: NaiveDateTime) -> ApiResult<Vote>
where
    S: LedgerStore + ?Sized,
{
    let today = now.date();

    if store
        .vote_on_day(ballot.employee_id, today)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(ALREADY_VOTED.into()));
    }

    if !store.employee_exists(ballot.employee_id).await?
        || !store.menu_exists(ballot.menu_id).await?
    {
        return Err(ApiError::not_found(UNKNOWN_REFERENCES));
    }

    let new_vote = NewVote {
        employee_id: ballot.employee_id,
        menu_id: ballot.menu_id,
        vote_day: today,
        cast_at: now,
    };

    match store.record_vote(new_vote).await {
        Ok(vote) => Ok(vote),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(ApiError::Conflict(ALREADY_VOTED.into()))
        }
        Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _))
        | Err(DieselError::NotFound) => Err(ApiError::not_found(UNKNOWN_REFERENCES)),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_vote<S>(store: &mut S, vote_id: i32) -> ApiResult<Vote>
where
    S: LedgerStore + ?Sized,
{
    store
        .remove_vote(vote_id)
        .await?
        .ok_or_else(|| ApiError::not_found(VOTE_NOT_FOUND))
}

/// Number of votes per menu, for undoing the tally of a set of votes.
pub fn tally_by_menu(menu_ids: &[i32]) -> BTreeMap<i32, i32> {
    let mut tally = BTreeMap::new();
    for menu_id in menu_ids {
        *tally.entry(*menu_id).or_insert(0) += 1;
    }
    tally
}

#[async_trait]
impl LedgerStore for AsyncMysqlConnection {
    async fn employee_exists(&mut self, employee_id: i32) -> QueryResult<bool> {
        diesel::select(diesel::dsl::exists(employees::table.find(employee_id)))
            .get_result(self)
            .await
    }

    async fn menu_exists(&mut self, menu_id: i32) -> QueryResult<bool> {
        diesel::select(diesel::dsl::exists(menus::table.find(menu_id)))
            .get_result(self)
            .await
    }

    async fn is_admin(&mut self, employee_id: i32) -> QueryResult<bool> {
        employees::table
            .find(employee_id)
            .select(employees::is_admin)
            .first::<bool>(self)
            .await
            .optional()
            .map(|flag| flag.unwrap_or(false))
    }

    async fn vote_on_day(
        &mut self,
        employee_id: i32,
        day: NaiveDate,
    ) -> QueryResult<Option<Vote>> {
        votes::table
            .filter(votes::employee_id.eq(employee_id))
            .filter(votes::vote_day.eq(day))
            .select(Vote::as_select())
            .first(self)
            .await
            .optional()
    }

    async fn record_vote(&mut self, vote: NewVote) -> QueryResult<Vote> {
        self.transaction::<_, DieselError, _>(|conn| {
            async move {
                diesel::insert_into(votes::table)
                    .values(&vote)
                    .execute(conn)
                    .await?;
                let vote_id = last_insert_id(conn).await?;

                let bumped = diesel::update(menus::table.find(vote.menu_id))
                    .set(menus::number_votes.eq(menus::number_votes + 1))
                    .execute(conn)
                    .await?;
                if bumped == 0 {
                    return Err(DieselError::NotFound);
                }

                votes::table
                    .find(vote_id)
                    .select(Vote::as_select())
                    .first(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
    }

    async fn remove_vote(&mut self, vote_id: i32) -> QueryResult<Option<Vote>> {
        self.transaction::<_, DieselError, _>(|conn| {
            async move {
                let Some(vote) = votes::table
                    .find(vote_id)
                    .select(Vote::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                else {
                    return Ok(None);
                };

                let deleted = diesel::delete(votes::table.find(vote_id))
                    .execute(conn)
                    .await?;
                // a concurrent delete got there first and already took the tally
                if deleted != 1 {
                    return Ok(None);
                }

                diesel::update(
                    menus::table
                        .find(vote.menu_id)
                        .filter(menus::number_votes.gt(0)),
                )
                .set(menus::number_votes.eq(menus::number_votes - 1))
                .execute(conn)
                .await?;

                Ok(Some(vote))
            }
            .scope_boxed()
        })
        .await
    }

    async fn remove_employee(&mut self, employee_id: i32) -> QueryResult<bool> {
        self.transaction::<_, DieselError, _>(|conn| {
            async move {
                // the parent row lock blocks new votes (their FK check needs it)
                let exists = employees::table
                    .find(employee_id)
                    .select(employees::id)
                    .for_update()
                    .first::<i32>(conn)
                    .await
                    .optional()?;
                if exists.is_none() {
                    return Ok(false);
                }

                let menu_ids: Vec<i32> = votes::table
                    .filter(votes::employee_id.eq(employee_id))
                    .select(votes::menu_id)
                    .for_update()
                    .load(conn)
                    .await?;

                for (menu_id, count) in tally_by_menu(&menu_ids) {
                    diesel::update(menus::table.find(menu_id))
                        .set(menus::number_votes.eq(menus::number_votes - count))
                        .execute(conn)
                        .await?;
                }

                // votes go with the employee via ON DELETE CASCADE
                let deleted = diesel::delete(employees::table.find(employee_id))
                    .execute(conn)
                    .await?;

                Ok(deleted > 0)
            }
            .scope_boxed()
        })
        .await
    }

    async fn votes_for_employee(
        &mut self,
        employee_id: i32,
        page: Page,
    ) -> QueryResult<Vec<Vote>> {
        votes::table
            .filter(votes::employee_id.eq(employee_id))
            .order(votes::id.asc())
            .offset(page.offset)
            .limit(page.limit)
            .select(Vote::as_select())
            .load(self)
            .await
    }

    async fn votes_for_menu(&mut self, menu_id: i32, page: Page) -> QueryResult<Vec<Vote>> {
        votes::table
            .filter(votes::menu_id.eq(menu_id))
            .order(votes::id.asc())
            .offset(page.offset)
            .limit(page.limit)
            .select(Vote::as_select())
            .load(self)
            .await
    }

    async fn all_votes(&mut self) -> QueryResult<Vec<Vote>> {
        votes::table
            .order(votes::id.asc())
            .select(Vote::as_select())
            .load(self)
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryLedger;
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn ballot(employee_id: i32, menu_id: i32) -> Ballot {
        Ballot {
            employee_id,
            menu_id,
        }
    }

    #[rocket::async_test]
    async fn first_vote_of_the_day_is_recorded_and_counted() {
        let mut store = MemoryLedger::with(&[1], &[1]);

        let vote = cast_vote(&mut store, ballot(1, 1), at("2024-01-01 12:00:00"))
            .await
            .unwrap();

        assert_eq!(vote.id, 1);
        assert_eq!(vote.employee_id, 1);
        assert_eq!(vote.menu_id, 1);
        assert_eq!(vote.vote_day, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(store.votes.len(), 1);
        assert_eq!(store.tally(1), 1);
    }

    #[rocket::async_test]
    async fn second_vote_on_the_same_day_is_rejected_without_side_effects() {
        let mut store = MemoryLedger::with(&[1], &[1, 2]);
        cast_vote(&mut store, ballot(1, 1), at("2024-01-01 09:00:00"))
            .await
            .unwrap();

        let err = cast_vote(&mut store, ballot(1, 2), at("2024-01-01 18:00:00"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(ref m) if m == ALREADY_VOTED));
        assert_eq!(store.votes.len(), 1);
        assert_eq!(store.tally(1), 1);
        assert_eq!(store.tally(2), 0);
    }

    #[rocket::async_test]
    async fn a_new_day_opens_a_new_bucket() {
        let mut store = MemoryLedger::with(&[1], &[1]);
        cast_vote(&mut store, ballot(1, 1), at("2024-01-01 23:59:59"))
            .await
            .unwrap();

        cast_vote(&mut store, ballot(1, 1), at("2024-01-02 00:00:00"))
            .await
            .unwrap();

        assert_eq!(store.votes.len(), 2);
        assert_eq!(store.tally(1), 2);
    }

    #[rocket::async_test]
    async fn unknown_menu_or_employee_is_rejected_without_side_effects() {
        let mut store = MemoryLedger::with(&[1], &[1]);

        for b in [ballot(1, 99), ballot(99, 1)] {
            let err = cast_vote(&mut store, b, at("2024-01-01 12:00:00"))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::NotFound(ref m) if m == UNKNOWN_REFERENCES));
        }

        assert!(store.votes.is_empty());
        assert_eq!(store.tally(1), 0);
    }

    #[rocket::async_test]
    async fn racing_duplicate_is_caught_by_the_day_index() {
        let mut store = MemoryLedger::with(&[1], &[1]);
        cast_vote(&mut store, ballot(1, 1), at("2024-01-01 12:00:00"))
            .await
            .unwrap();
        store.stale_reads = true;

        let err = cast_vote(&mut store, ballot(1, 1), at("2024-01-01 12:00:01"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.tally(1), 1);
    }

    #[rocket::async_test]
    async fn deleting_a_vote_gives_the_tally_back() {
        let mut store = MemoryLedger::with(&[1, 2], &[1]);
        let vote = cast_vote(&mut store, ballot(1, 1), at("2024-01-01 12:00:00"))
            .await
            .unwrap();
        cast_vote(&mut store, ballot(2, 1), at("2024-01-01 12:00:00"))
            .await
            .unwrap();

        let deleted = delete_vote(&mut store, vote.id).await.unwrap();

        assert_eq!(deleted.id, vote.id);
        assert_eq!(store.tally(1), 1);
        let err = delete_vote(&mut store, vote.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[rocket::async_test]
    async fn deleting_an_employee_removes_their_votes_from_every_tally() {
        let mut store = MemoryLedger::with(&[1, 2], &[1, 2]);
        cast_vote(&mut store, ballot(1, 1), at("2024-01-01 12:00:00"))
            .await
            .unwrap();
        cast_vote(&mut store, ballot(1, 2), at("2024-01-02 12:00:00"))
            .await
            .unwrap();
        cast_vote(&mut store, ballot(2, 1), at("2024-01-02 12:00:00"))
            .await
            .unwrap();

        assert!(store.remove_employee(1).await.unwrap());

        assert_eq!(store.tally(1), 1);
        assert_eq!(store.tally(2), 0);
        assert_eq!(store.all_votes().await.unwrap().len(), 1);
        assert!(!store.remove_employee(1).await.unwrap());
    }

    #[rocket::async_test]
    async fn employees_vote_only_for_themselves() {
        let mut store = MemoryLedger::with(&[3, 4], &[1]);

        assert!(authorize_ballot(&mut store, 3, &ballot(3, 1)).await.is_ok());
        let err = authorize_ballot(&mut store, 3, &ballot(4, 1)).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(ref m) if m == OWN_VOTES_ONLY));
    }

    #[rocket::async_test]
    async fn voting_for_others_follows_the_stored_admin_flag() {
        let mut store = MemoryLedger::with(&[1, 4], &[1]);
        store.admins.push(1);
        assert!(authorize_ballot(&mut store, 1, &ballot(4, 1)).await.is_ok());

        // demoted while still holding a token that says admin
        store.admins.clear();
        let err = authorize_ballot(&mut store, 1, &ballot(4, 1)).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[rocket::async_test]
    async fn lunch_scenario_from_menu_to_rejected_duplicate() {
        let mut store = MemoryLedger::with(&[1], &[1]);
        let noon = at("2024-01-01 12:00:00");

        let vote = cast_vote(&mut store, ballot(1, 1), noon).await.unwrap();
        assert_eq!((vote.id, vote.employee_id), (1, 1));
        assert_eq!(store.tally(1), 1);

        assert!(cast_vote(&mut store, ballot(1, 1), noon).await.is_err());
        assert_eq!(store.tally(1), 1);
    }

    #[rocket::async_test]
    async fn employee_history_is_paged_by_ascending_id() {
        let mut store = MemoryLedger::with(&[1, 2], &[1]);
        for day in 1..=5 {
            let now = at(&format!("2024-01-0{} 12:00:00", day));
            cast_vote(&mut store, ballot(1, 1), now).await.unwrap();
            cast_vote(&mut store, ballot(2, 1), now).await.unwrap();
        }

        let page = store
            .votes_for_employee(1, Page::new(Some(1), Some(2), 10))
            .await
            .unwrap();
        let ids: Vec<i32> = page.iter().map(|vote| vote.id).collect();
        assert_eq!(ids, vec![3, 5]);

        let empty = store
            .votes_for_employee(3, Page::new(None, None, 10))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn ballot_requires_both_positive_references() {
        let ok = CastVoteRequest {
            employee_id: Some(1),
            menu_id: Some(2),
        };
        assert_eq!(Ballot::from_request(Some(&ok)).unwrap(), ballot(1, 2));

        let missing = CastVoteRequest {
            employee_id: Some(1),
            menu_id: None,
        };
        let zero = CastVoteRequest {
            employee_id: Some(0),
            menu_id: Some(2),
        };
        for request in [Some(&missing), Some(&zero), None] {
            let err = Ballot::from_request(request).unwrap_err();
            assert!(matches!(err, ApiError::Validation(ref m) if m == MISSING_REFERENCES));
        }
    }

    #[test]
    fn page_is_clamped() {
        assert_eq!(
            Page::new(Some(-3), Some(5000), 10),
            Page {
                offset: 0,
                limit: Page::MAX_LIMIT
            }
        );
        assert_eq!(
            Page::new(None, None, 75),
            Page {
                offset: 0,
                limit: 75
            }
        );
    }

    #[test]
    fn tally_by_menu_counts_repeats() {
        let tally = tally_by_menu(&[3, 1, 3, 3]);
        assert_eq!(tally.get(&3), Some(&3));
        assert_eq!(tally.get(&1), Some(&1));
        assert_eq!(tally.len(), 2);
    }
}
