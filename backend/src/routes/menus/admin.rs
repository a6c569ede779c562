use chrono::NaiveDateTime;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::Connection;
use rocket_db_pools::diesel::prelude::*;
use tracing::info;

use crate::auth::AdminEmployee;
use crate::db::{last_insert_id, LunchDB};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    MenuChanges, MenuCreated, MenuRequest, Message, NewMenu, MENU_DATE_FORMAT,
};
use crate::routes::menus::MENU_NOT_FOUND;
use crate::routes::restaurants::find_restaurant;
use crate::routes::checked;
use crate::schema::menus;
use crate::AppState;

const MISSING_FIELDS: &str =
    "Please, specify \"restaurant_id\", \"resp_username\", \"first\", \"second\", \"drink\".";
const NOT_RESPONSIBLE: &str = "Such \"username\" is not responsible for selected restaurant.";

fn parse_date(raw: Option<&str>) -> ApiResult<Option<NaiveDateTime>> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(None),
        Some(d) => NaiveDateTime::parse_from_str(d, MENU_DATE_FORMAT)
            .map(Some)
            .map_err(|_| {
                ApiError::validation("Invalid \"date\", expected format YYYY-MM-DD HH:MM:SS.")
            }),
    }
}

struct MenuDraft {
    restaurant_id: i32,
    resp_username: String,
    first: String,
    second: String,
    drink: String,
    date: Option<NaiveDateTime>,
}

fn menu_draft(request: Option<MenuRequest>) -> ApiResult<MenuDraft> {
    let request = request.ok_or_else(|| ApiError::validation(MISSING_FIELDS))?;
    let date = parse_date(request.date.as_deref())?;

    match (
        request.restaurant_id,
        checked("resp_username", request.resp_username)?,
        checked("first", request.first)?,
        checked("second", request.second)?,
        checked("drink", request.drink)?,
    ) {
        (Some(restaurant_id), Some(resp_username), Some(first), Some(second), Some(drink)) => {
            Ok(MenuDraft {
                restaurant_id,
                resp_username,
                first,
                second,
                drink,
                date,
            })
        }
        _ => Err(ApiError::validation(MISSING_FIELDS)),
    }
}

// Route to publish a menu for a restaurant
#[post("/menus", data = "<menu_request>")]
pub async fn create_menu(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
    menu_request: Option<Json<MenuRequest>>,
) -> ApiResult<(Status, Json<MenuCreated>)> {
    let draft = menu_draft(menu_request.map(Json::into_inner))?;

    let restaurant = find_restaurant(&mut db, draft.restaurant_id).await?;
    if restaurant.resp_username != draft.resp_username {
        return Err(ApiError::validation(NOT_RESPONSIBLE));
    }

    let new_menu = NewMenu {
        date: draft.date.unwrap_or_else(|| state.clock.now()),
        number_votes: 0,
        first: draft.first,
        second: draft.second,
        drink: draft.drink,
        restaurant_id: restaurant.id,
    };

    diesel::insert_into(menus::table)
        .values(&new_menu)
        .execute(&mut db)
        .await?;
    let id = last_insert_id(&mut db).await?;
    info!("Published menu {} for restaurant {}", id, restaurant.id);

    Ok((
        Status::Created,
        Json(MenuCreated {
            id,
            date: new_menu.date,
            restaurant_id: new_menu.restaurant_id,
        }),
    ))
}

// Route to change the dishes or date of a menu
#[patch("/menus/<id>", data = "<menu_request>")]
pub async fn update_menu(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
    menu_request: Option<Json<MenuRequest>>,
) -> ApiResult<Json<Message>> {
    let exists: bool = diesel::select(diesel::dsl::exists(menus::table.find(id)))
        .get_result(&mut db)
        .await?;
    if !exists {
        return Err(ApiError::not_found(MENU_NOT_FOUND));
    }

    if let Some(Json(request)) = menu_request {
        let changes = MenuChanges {
            date: parse_date(request.date.as_deref())?,
            first: checked("first", request.first)?,
            second: checked("second", request.second)?,
            drink: checked("drink", request.drink)?,
        };

        let any = changes.date.is_some()
            || changes.first.is_some()
            || changes.second.is_some()
            || changes.drink.is_some();
        if any {
            diesel::update(menus::table.find(id))
                .set(&changes)
                .execute(&mut db)
                .await?;
        }
    }

    Ok(Json(Message::new("Updated")))
}

// Route to delete a menu and the votes cast for it
#[delete("/menus/<id>")]
pub async fn delete_menu(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Message>> {
    let deleted = diesel::delete(menus::table.find(id))
        .execute(&mut db)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found(MENU_NOT_FOUND));
    }

    info!("Deleted menu {}", id);
    Ok(Json(Message::new("Menu was successfully deleted")))
}
