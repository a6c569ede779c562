// Menu lookups and the menu of the day

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_async::{AsyncMysqlConnection, RunQueryDsl};

use crate::models::Menu;
use crate::schema::{menus, restaurants};

/// The single filter applied to a menu listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuFilter {
    /// Menus dated today or later, by id.
    Current,
    Drink(String),
    RestaurantName(String),
    First(String),
    Second(String),
    /// Menus dated today or later, most voted first.
    Popular,
}

/// Raw query-string parameters of `GET /menus`.
#[derive(Debug, Default, FromForm)]
pub struct MenuQuery {
    pub drink: Option<String>,
    pub restaurant_name: Option<String>,
    pub first: Option<String>,
    pub second: Option<String>,
    pub sort: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl MenuQuery {
    /// Filters are considered in the order drink, restaurant_name, first,
    /// second, sort; the last one present is the one applied.
    pub fn filter(&self) -> MenuFilter {
        let mut filter = MenuFilter::Current;
        if let Some(drink) = present(&self.drink) {
            filter = MenuFilter::Drink(drink);
        }
        if let Some(name) = present(&self.restaurant_name) {
            filter = MenuFilter::RestaurantName(name);
        }
        if let Some(first) = present(&self.first) {
            filter = MenuFilter::First(first);
        }
        if let Some(second) = present(&self.second) {
            filter = MenuFilter::Second(second);
        }
        if matches!(self.sort.as_deref(), Some("True") | Some("1")) {
            filter = MenuFilter::Popular;
        }
        filter
    }
}

/// Runs `filter`. `day_start` is midnight of the current day.
pub async fn find_menus(
    conn: &mut AsyncMysqlConnection,
    filter: &MenuFilter,
    day_start: NaiveDateTime,
) -> QueryResult<Vec<Menu>> {
    match filter {
        MenuFilter::Current => {
            menus::table
                .filter(menus::date.ge(day_start))
                .order(menus::id.asc())
                .select(Menu::as_select())
                .load(conn)
                .await
        }
        MenuFilter::Popular => {
            menus::table
                .filter(menus::date.ge(day_start))
                .order((menus::number_votes.desc(), menus::id.asc()))
                .select(Menu::as_select())
                .load(conn)
                .await
        }
        MenuFilter::RestaurantName(name) => {
            menus::table
                .inner_join(restaurants::table)
                .filter(restaurants::name.eq(name))
                .filter(menus::date.ge(day_start))
                .order(menus::id.asc())
                .select(Menu::as_select())
                .load(conn)
                .await
        }
        MenuFilter::Drink(drink) => {
            menus::table
                .filter(menus::drink.eq(drink))
                .order(menus::id.asc())
                .select(Menu::as_select())
                .load(conn)
                .await
        }
        MenuFilter::First(first) => {
            menus::table
                .filter(menus::first.eq(first))
                .order(menus::id.asc())
                .select(Menu::as_select())
                .load(conn)
                .await
        }
        MenuFilter::Second(second) => {
            menus::table
                .filter(menus::second.eq(second))
                .order(menus::id.asc())
                .select(Menu::as_select())
                .load(conn)
                .await
        }
    }
}

/// Highest tally across all menus, whatever their date; ties go to the lowest id.
pub async fn menu_of_the_day(conn: &mut AsyncMysqlConnection) -> QueryResult<Option<Menu>> {
    menus::table
        .order((menus::number_votes.desc(), menus::id.asc()))
        .select(Menu::as_select())
        .first(conn)
        .await
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> MenuQuery {
        let mut query = MenuQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "drink" => query.drink = value,
                "restaurant_name" => query.restaurant_name = value,
                "first" => query.first = value,
                "second" => query.second = value,
                "sort" => query.sort = value,
                other => panic!("unexpected key {other}"),
            }
        }
        query
    }

    #[test]
    fn no_filter_means_current_menus() {
        assert_eq!(query(&[]).filter(), MenuFilter::Current);
        assert_eq!(query(&[("first", "")]).filter(), MenuFilter::Current);
    }

    #[test]
    fn single_filter_is_applied() {
        assert_eq!(
            query(&[("first", "borsch")]).filter(),
            MenuFilter::First("borsch".into())
        );
        assert_eq!(
            query(&[("restaurant_name", "A")]).filter(),
            MenuFilter::RestaurantName("A".into())
        );
    }

    #[test]
    fn later_filter_wins() {
        let q = query(&[("drink", "tea"), ("first", "soup"), ("restaurant_name", "A")]);
        assert_eq!(q.filter(), MenuFilter::First("soup".into()));

        let q = query(&[("first", "soup"), ("second", "rice")]);
        assert_eq!(q.filter(), MenuFilter::Second("rice".into()));
    }

    #[test]
    fn sort_overrides_everything() {
        let q = query(&[("second", "rice"), ("sort", "True")]);
        assert_eq!(q.filter(), MenuFilter::Popular);
        assert_eq!(query(&[("sort", "1")]).filter(), MenuFilter::Popular);
    }

    #[test]
    fn other_sort_values_are_ignored() {
        assert_eq!(query(&[("sort", "true")]).filter(), MenuFilter::Current);
        assert_eq!(
            query(&[("drink", "tea"), ("sort", "0")]).filter(),
            MenuFilter::Drink("tea".into())
        );
    }
}
