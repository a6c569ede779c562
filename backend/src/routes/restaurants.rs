use diesel_async::AsyncMysqlConnection;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket_db_pools::Connection;
use rocket_db_pools::diesel::prelude::*;
use tracing::info;

use crate::auth::AdminEmployee;
use crate::db::{last_insert_id, LunchDB};
use crate::error::{ApiError, ApiResult};
use crate::models::{Message, NewRestaurant, Restaurant, RestaurantChanges, RestaurantRequest};
use crate::routes::checked;
use crate::schema::restaurants;

pub const RESTAURANT_NOT_FOUND: &str = "Restaurant not found.";

pub async fn find_restaurant(conn: &mut AsyncMysqlConnection, id: i32) -> ApiResult<Restaurant> {
    restaurants::table
        .find(id)
        .select(Restaurant::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found(RESTAURANT_NOT_FOUND))
}

fn new_restaurant(request: Option<RestaurantRequest>) -> ApiResult<NewRestaurant> {
    let missing = || ApiError::validation("Please, specify \"name\", \"resp_username\".");
    let request = request.ok_or_else(missing)?;

    match (
        checked("name", request.name)?,
        checked("resp_username", request.resp_username)?,
    ) {
        (Some(name), Some(resp_username)) => Ok(NewRestaurant {
            name,
            resp_username,
        }),
        _ => Err(missing()),
    }
}

// Route to list all restaurants
#[get("/restaurants")]
pub async fn list_restaurants(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
) -> ApiResult<Json<Vec<Restaurant>>> {
    let all = restaurants::table
        .order(restaurants::id.asc())
        .select(Restaurant::as_select())
        .load(&mut db)
        .await?;

    Ok(Json(all))
}

// Route to get one restaurant
#[get("/restaurants/<id>")]
pub async fn get_restaurant(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Restaurant>> {
    Ok(Json(find_restaurant(&mut db, id).await?))
}

// Route to create a restaurant
#[post("/restaurants", data = "<restaurant_request>")]
pub async fn create_restaurant(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    restaurant_request: Option<Json<RestaurantRequest>>,
) -> ApiResult<(Status, Json<Restaurant>)> {
    let restaurant = new_restaurant(restaurant_request.map(Json::into_inner))?;

    diesel::insert_into(restaurants::table)
        .values(&restaurant)
        .execute(&mut db)
        .await?;
    let id = last_insert_id(&mut db).await?;
    info!("Created restaurant {} ({})", id, restaurant.name);

    Ok((
        Status::Created,
        Json(Restaurant {
            id,
            name: restaurant.name,
            resp_username: restaurant.resp_username,
        }),
    ))
}

// Route to rename a restaurant or change who is responsible for it
#[patch("/restaurants/<id>", data = "<restaurant_request>")]
pub async fn update_restaurant(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
    restaurant_request: Option<Json<RestaurantRequest>>,
) -> ApiResult<Json<Message>> {
    find_restaurant(&mut db, id).await?;

    if let Some(Json(request)) = restaurant_request {
        let changes = RestaurantChanges {
            name: checked("name", request.name)?,
            resp_username: checked("resp_username", request.resp_username)?,
        };

        if changes.name.is_some() || changes.resp_username.is_some() {
            diesel::update(restaurants::table.find(id))
                .set(&changes)
                .execute(&mut db)
                .await?;
        }
    }

    Ok(Json(Message::new("Updated")))
}

async fn remove_restaurant(db: &mut AsyncMysqlConnection, id: i32) -> ApiResult<Json<Message>> {
    // menus and their votes cascade
    let deleted = diesel::delete(restaurants::table.find(id))
        .execute(db)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found(RESTAURANT_NOT_FOUND));
    }

    info!("Deleted restaurant {}", id);
    Ok(Json(Message::new("Restaurant was successfully deleted")))
}

// Route to delete a restaurant with its menus
#[delete("/restaurants/<id>")]
pub async fn delete_restaurant(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Message>> {
    remove_restaurant(&mut db, id).await
}

// Singular path kept for older clients
#[delete("/restaurant/<id>")]
pub async fn delete_restaurant_legacy(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Message>> {
    remove_restaurant(&mut db, id).await
}
