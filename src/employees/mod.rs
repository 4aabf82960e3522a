use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::middleware::Principal;
use crate::core::shared::enums::{ActivityStatus, Role};
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, Employee, EmployeeChanges, NewEmployee};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_lens, is_blank, non_blank};
use crate::core::storage::StoreError;
use crate::security::password::hash_blocking;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployeeRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: ActivityStatus,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmployeeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub role: Option<Role>,
    pub status: Option<ActivityStatus>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeName {
    pub id: i64,
    pub name: String,
}

/// Column limits shared by create and update.
fn check_lengths(
    name: Option<&str>,
    email: Option<&str>,
    phone_number: Option<&str>,
    address: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> CrmResult<()> {
    ensure_max_lens(&[
        ("name", name.map(str::trim), limits::NAME),
        ("email", email.map(str::trim), limits::EMAIL),
        ("phoneNumber", phone_number.map(str::trim), limits::PHONE),
        ("address", address.map(str::trim), limits::ADDRESS),
        ("city", city.map(str::trim), limits::CITY),
        ("state", state.map(str::trim), limits::STATE),
    ])
}

fn ensure_staff_role(role: Role) -> CrmResult<()> {
    if role.is_staff() {
        Ok(())
    } else {
        Err(CrmError::validation("Employee role must be EMPLOYEE or ADMIN"))
    }
}

fn employee_not_found(id: i64) -> CrmError {
    CrmError::NotFound(StoreError::employee_not_found(id).to_string())
}

async fn hash_optional(state: &AppState, password: Option<String>) -> CrmResult<Option<String>> {
    match password.filter(|p| !is_blank(p)) {
        Some(p) => hash_blocking(state.passwords.clone(), p)
            .await
            .map(Some)
            .map_err(|e| CrmError::internal(e.to_string())),
        None => Ok(None),
    }
}

pub async fn list_employees(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<Vec<Employee>>> {
    principal.require_staff()?;
    Ok(Json(state.store.list_employees().await?))
}

pub async fn list_employee_names(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<Vec<EmployeeName>>> {
    principal.require_staff()?;
    let names = state
        .store
        .list_employees()
        .await?
        .into_iter()
        .filter(|e| e.status == ActivityStatus::Active)
        .map(|e| EmployeeName {
            id: e.id,
            name: e.name,
        })
        .collect();
    Ok(Json(names))
}

pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Employee>> {
    principal.require_staff()?;
    state
        .store
        .find_employee(id)
        .await?
        .map(Json)
        .ok_or_else(|| employee_not_found(id))
}

pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateEmployeeRequest>,
) -> CrmResult<(StatusCode, Json<Employee>)> {
    principal.require_admin()?;
    if is_blank(&req.name) || is_blank(&req.email) {
        return Err(CrmError::validation("Name and email are required"));
    }
    ensure_staff_role(req.role)?;
    check_lengths(
        Some(&req.name),
        Some(&req.email),
        req.phone_number.as_deref(),
        req.address.as_deref(),
        req.city.as_deref(),
        req.state.as_deref(),
    )?;

    let password_hash = hash_optional(&state, req.password).await?;
    let now = Utc::now();
    let new = NewEmployee {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        phone_number: non_blank(req.phone_number),
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        role: req.role,
        status: req.status,
        has_password: password_hash.is_some(),
        password_hash,
        created_at: now,
        updated_at: now,
    };

    let employee = state.store.create_employee(new).await?;
    info!("Admin {} created employee {}", principal.user_id, employee.id);
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEmployeeRequest>,
) -> CrmResult<Json<Employee>> {
    principal.require_admin()?;
    if let Some(role) = req.role {
        ensure_staff_role(role)?;
    }
    if req.name.as_deref().is_some_and(is_blank) || req.email.as_deref().is_some_and(is_blank) {
        return Err(CrmError::validation("Name and email cannot be blank"));
    }
    check_lengths(
        req.name.as_deref(),
        req.email.as_deref(),
        req.phone_number.as_deref(),
        req.address.as_deref(),
        req.city.as_deref(),
        req.state.as_deref(),
    )?;

    let password_hash = hash_optional(&state, req.password).await?;
    let changes = EmployeeChanges {
        name: req.name.map(|v| v.trim().to_string()),
        email: req.email.map(|v| v.trim().to_string()),
        phone_number: non_blank(req.phone_number),
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        role: req.role,
        status: req.status,
        has_password: password_hash.as_ref().map(|_| true),
        password_hash,
        updated_at: Some(Utc::now()),
    };

    state
        .store
        .update_employee(id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| employee_not_found(id))
}

pub async fn delete_employee(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_admin()?;
    if principal.user_id == id {
        return Err(CrmError::validation("Admins cannot delete their own account"));
    }
    if state.store.delete_employee(id).await? {
        info!("Admin {} deleted employee {id}", principal.user_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(employee_not_found(id))
    }
}

pub fn configure_employees_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/employees", get(list_employees).post(create_employee))
        .route("/api/employees/names", get(list_employee_names))
        .route(
            "/api/employees/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_lengths() {
        let long_city = "c".repeat(101);
        assert!(check_lengths(Some("Eve"), Some("eve@x.io"), None, None, Some("Lisbon"), None).is_ok());
        assert!(check_lengths(None, None, None, None, None, None).is_ok());

        let err = check_lengths(Some("Eve"), None, None, None, Some(&long_city), None)
            .expect_err("city");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "city must be at most 100 characters");
    }
}
