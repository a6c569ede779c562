use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::Connection;
use tracing::info;

use crate::auth::AuthenticatedEmployee;
use crate::db::LunchDB;
use crate::error::ApiResult;
use crate::ledger::{self, Ballot, LedgerStore, Page};
use crate::models::{CastVoteRequest, Vote, VoteCreated};
use crate::AppState;

const MY_VOTES_LIMIT: i64 = 10;

// Route to cast today's vote
#[post("/votes", data = "<vote_request>")]
pub async fn cast_vote(
    voter: AuthenticatedEmployee,
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
    vote_request: Option<Json<CastVoteRequest>>,
) -> ApiResult<(Status, Json<VoteCreated>)> {
    let ballot = Ballot::from_request(vote_request.as_deref())?;
    ledger::authorize_ballot(&mut **db, voter.id, &ballot).await?;

    let vote = ledger::cast_vote(&mut **db, ballot, state.clock.now()).await?;
    info!(
        "Employee {} voted for menu {} (vote {})",
        vote.employee_id, vote.menu_id, vote.id
    );

    Ok((
        Status::Created,
        Json(VoteCreated {
            id: vote.id,
            employee_id: vote.employee_id,
        }),
    ))
}

// Route to page through the caller's own votes
#[get("/myvotes?<offset>&<limit>")]
pub async fn my_votes(
    voter: AuthenticatedEmployee,
    mut db: Connection<LunchDB>,
    offset: Option<i64>,
    limit: Option<i64>,
) -> ApiResult<Json<Vec<Vote>>> {
    let page = Page::new(offset, limit, MY_VOTES_LIMIT);
    let votes = LedgerStore::votes_for_employee(&mut **db, voter.id, page).await?;

    Ok(Json(votes))
}
