use rocket::serde::json::Json;
use rocket_db_pools::Connection;
use tracing::info;

use crate::auth::AdminEmployee;
use crate::db::LunchDB;
use crate::error::{ApiError, ApiResult};
use crate::ledger::{self, LedgerStore, Page};
use crate::models::{Message, Vote};

const VOTES_BY_MENU_LIMIT: i64 = 75;

// Route to list every vote in the ledger
#[get("/votes")]
pub async fn list_votes(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
) -> ApiResult<Json<Vec<Vote>>> {
    Ok(Json(LedgerStore::all_votes(&mut **db).await?))
}

// Route to page through the votes cast for one menu
#[get("/votes/<menu_id>?<offset>&<limit>")]
pub async fn votes_by_menu(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    menu_id: i32,
    offset: Option<i64>,
    limit: Option<i64>,
) -> ApiResult<Json<Vec<Vote>>> {
    let page = Page::new(offset, limit, VOTES_BY_MENU_LIMIT);
    let votes = LedgerStore::votes_for_menu(&mut **db, menu_id, page).await?;

    if votes.is_empty() {
        return Err(ApiError::not_found("Votes not found."));
    }

    Ok(Json(votes))
}

// Route to withdraw a vote, giving the menu its tally back
#[delete("/votes/<id>")]
pub async fn delete_vote(
    admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Message>> {
    let vote = ledger::delete_vote(&mut **db, id).await?;
    info!(
        "Admin {} deleted vote {} for menu {}",
        admin.0.id, vote.id, vote.menu_id
    );

    Ok(Json(Message::new("Vote was successfully deleted")))
}
