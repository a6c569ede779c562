use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::Connection;
use rocket_db_pools::diesel::prelude::*;

use crate::auth::AuthenticatedEmployee;
use crate::catalog::{self, MenuQuery};
use crate::db::LunchDB;
use crate::error::{ApiError, ApiResult};
use crate::maintenance::start_of_day;
use crate::models::Menu;
use crate::routes::menus::MENU_NOT_FOUND;
use crate::schema::menus;
use crate::AppState;

// Route to list menus, filtered by the query string
#[get("/menus?<query..>")]
pub async fn list_menus(
    _employee: AuthenticatedEmployee,
    mut db: Connection<LunchDB>,
    state: &State<AppState>,
    query: MenuQuery,
) -> ApiResult<Json<Vec<Menu>>> {
    let day_start = start_of_day(state.clock.today());
    let found = catalog::find_menus(&mut db, &query.filter(), day_start).await?;

    Ok(Json(found))
}

// Route to get one menu
#[get("/menus/<id>")]
pub async fn get_menu(
    _employee: AuthenticatedEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Menu>> {
    let menu = menus::table
        .find(id)
        .select(Menu::as_select())
        .first(&mut db)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found(MENU_NOT_FOUND))?;

    Ok(Json(menu))
}

// Route to get the most voted menu, or null when there is none
#[get("/menu_today")]
pub async fn menu_today(
    _employee: AuthenticatedEmployee,
    mut db: Connection<LunchDB>,
) -> ApiResult<Json<Option<Menu>>> {
    Ok(Json(catalog::menu_of_the_day(&mut db).await?))
}
