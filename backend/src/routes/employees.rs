use diesel::result::{DatabaseErrorKind, Error};
use diesel_async::AsyncMysqlConnection;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket_db_pools::Connection;
use rocket_db_pools::diesel::prelude::*;
use tracing::info;

use crate::auth::password::hash_password;
use crate::auth::AdminEmployee;
use crate::db::{last_insert_id, LunchDB};
use crate::error::{ApiError, ApiResult};
use crate::ledger::LedgerStore;
use crate::models::{
    Employee, EmployeeChanges, EmployeeCreated, EmployeeRequest, EmployeeResponse, Message,
    NewEmployee,
};
use crate::routes::{checked, verbatim};
use crate::schema::employees;

pub const EMPLOYEE_NOT_FOUND: &str = "Employee not found.";
const MISSING_FIELDS: &str = "Please, specify \"name\", \"username\", \"email\", \"password\".";

fn already_exists(username: &str) -> ApiError {
    ApiError::validation(format!("User {} already exists", username))
}

/// Builds a new employee from a request; every field except the admin flag is required.
pub fn new_employee(request: Option<EmployeeRequest>, is_admin: bool) -> ApiResult<NewEmployee> {
    let request = request.ok_or_else(|| ApiError::validation(MISSING_FIELDS))?;

    let name = checked("name", request.name)?;
    let username = verbatim("username", request.username)?;
    let email = checked("email", request.email)?;
    let password = request.password.filter(|p| !p.is_empty());

    match (name, username, email, password) {
        (Some(name), Some(username), Some(email), Some(password)) => Ok(NewEmployee {
            name,
            username,
            email,
            hashed_password: hash_password(&password)?,
            is_admin,
        }),
        _ => Err(ApiError::validation(MISSING_FIELDS)),
    }
}

/// Inserts `employee`, rejecting a taken username. Returns the new id.
pub async fn insert_employee(
    conn: &mut AsyncMysqlConnection,
    employee: &NewEmployee,
) -> ApiResult<i32> {
    let taken: i64 = employees::table
        .filter(employees::username.eq(&employee.username))
        .count()
        .get_result(conn)
        .await?;
    if taken > 0 {
        return Err(already_exists(&employee.username));
    }

    match diesel::insert_into(employees::table)
        .values(employee)
        .execute(conn)
        .await
    {
        Ok(_) => {}
        Err(Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(already_exists(&employee.username));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(last_insert_id(conn).await?)
}

async fn find_employee(conn: &mut AsyncMysqlConnection, id: i32) -> ApiResult<Employee> {
    employees::table
        .find(id)
        .select(Employee::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found(EMPLOYEE_NOT_FOUND))
}

// Route to list all employees
#[get("/employees")]
pub async fn list_employees(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
) -> ApiResult<Json<Vec<EmployeeResponse>>> {
    let all = employees::table
        .order(employees::id.asc())
        .select(Employee::as_select())
        .load(&mut db)
        .await?;

    Ok(Json(all.into_iter().map(EmployeeResponse::from).collect()))
}

// Route to get one employee
#[get("/employees/<id>")]
pub async fn get_employee(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<EmployeeResponse>> {
    let employee = find_employee(&mut db, id).await?;
    Ok(Json(employee.into()))
}

// Route to create an employee, optionally an administrator
#[post("/employees", data = "<employee_request>")]
pub async fn create_employee(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    employee_request: Option<Json<EmployeeRequest>>,
) -> ApiResult<(Status, Json<EmployeeCreated>)> {
    let request = employee_request.map(Json::into_inner);
    let is_admin = request.as_ref().and_then(|r| r.is_admin).unwrap_or(false);
    let employee = new_employee(request, is_admin)?;

    let id = insert_employee(&mut db, &employee).await?;
    info!("Created employee {} ({})", id, employee.username);

    Ok((
        Status::Created,
        Json(EmployeeCreated {
            id,
            name: employee.name,
        }),
    ))
}

// Route to update an employee; absent fields are left as they are
#[patch("/employees/<id>", data = "<employee_request>")]
pub async fn update_employee(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
    employee_request: Option<Json<EmployeeRequest>>,
) -> ApiResult<Json<Message>> {
    find_employee(&mut db, id).await?;

    let Some(Json(request)) = employee_request else {
        return Ok(Json(Message::new("Updated")));
    };

    let changes = EmployeeChanges {
        name: checked("name", request.name)?,
        username: verbatim("username", request.username)?,
        email: checked("email", request.email)?,
        hashed_password: match request.password.filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_password(&password)?),
            None => None,
        },
        is_admin: request.is_admin,
    };

    let unchanged = changes.name.is_none()
        && changes.username.is_none()
        && changes.email.is_none()
        && changes.hashed_password.is_none()
        && changes.is_admin.is_none();
    if unchanged {
        return Ok(Json(Message::new("Updated")));
    }

    let username = changes.username.clone();
    match diesel::update(employees::table.find(id))
        .set(&changes)
        .execute(&mut db)
        .await
    {
        Ok(_) => Ok(Json(Message::new("Updated"))),
        Err(Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(already_exists(username.as_deref().unwrap_or_default()))
        }
        Err(e) => Err(e.into()),
    }
}

// Route to delete an employee together with their votes
#[delete("/employees/<id>")]
pub async fn delete_employee(
    _admin: AdminEmployee,
    mut db: Connection<LunchDB>,
    id: i32,
) -> ApiResult<Json<Message>> {
    if !LedgerStore::remove_employee(&mut **db, id).await? {
        return Err(ApiError::not_found(EMPLOYEE_NOT_FOUND));
    }

    info!("Deleted employee {}", id);
    Ok(Json(Message::new("Deleted")))
}
