use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::core::middleware::Principal;
use crate::core::shared::enums::{ActivityStatus, CustomerType};
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, Customer, CustomerChanges, NewCustomer};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_lens, is_blank, non_blank};
use crate::email::{dispatch, Notification};
use crate::security::password::hash_blocking;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<i32>,
    pub country: Option<String>,
    pub website: Option<String>,
    #[serde(default, rename = "type")]
    pub customer_type: CustomerType,
    #[serde(default)]
    pub status: ActivityStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<i32>,
    pub country: Option<String>,
    pub website: Option<String>,
    #[serde(rename = "type")]
    pub customer_type: Option<CustomerType>,
    pub status: Option<ActivityStatus>,
}

/// Column limits for the text fields both customer payloads carry.
#[allow(clippy::too_many_arguments)]
fn check_lengths(
    name: Option<&str>,
    email: Option<&str>,
    phone_number: Option<&str>,
    address: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    country: Option<&str>,
    website: Option<&str>,
) -> CrmResult<()> {
    ensure_max_lens(&[
        ("name", name.map(str::trim), limits::NAME),
        ("email", email.map(str::trim), limits::EMAIL),
        ("phoneNumber", phone_number.map(str::trim), limits::PHONE),
        ("address", address.map(str::trim), limits::ADDRESS),
        ("city", city.map(str::trim), limits::CITY),
        ("state", state.map(str::trim), limits::STATE),
        ("country", country.map(str::trim), limits::COUNTRY),
        ("website", website.map(str::trim), limits::WEBSITE),
    ])
}

impl CreateCustomerRequest {
    fn check_lengths(&self) -> CrmResult<()> {
        check_lengths(
            Some(&self.name),
            Some(&self.email),
            self.phone_number.as_deref(),
            self.address.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.country.as_deref(),
            self.website.as_deref(),
        )
    }
}

impl UpdateCustomerRequest {
    fn check_lengths(&self) -> CrmResult<()> {
        check_lengths(
            self.name.as_deref(),
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.address.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.country.as_deref(),
            self.website.as_deref(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub send_email: bool,
}

fn customer_not_found(id: i64) -> CrmError {
    CrmError::not_found(format!("Customer not found with id: {id}"))
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<Vec<Customer>>> {
    principal.require_staff()?;
    Ok(Json(state.store.list_customers().await?))
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Customer>> {
    principal.require_customer_access(id)?;
    state
        .store
        .find_customer(id)
        .await?
        .map(Json)
        .ok_or_else(|| customer_not_found(id))
}

/// Staff-created customers have no password until they register or staff
/// set one.
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateCustomerRequest>,
) -> CrmResult<(StatusCode, Json<Customer>)> {
    principal.require_staff()?;
    if is_blank(&req.name) || is_blank(&req.email) {
        return Err(CrmError::validation("Name and email are required"));
    }
    req.check_lengths()?;

    let now = Utc::now();
    let new = NewCustomer {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        phone_number: non_blank(req.phone_number),
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        zip_code: req.zip_code,
        country: non_blank(req.country),
        website: non_blank(req.website),
        customer_type: req.customer_type,
        status: req.status,
        password_hash: None,
        has_password: false,
        created_at: now,
        updated_at: now,
    };

    let customer = state.store.create_customer(new).await?;
    info!("Customer {} created by {}", customer.id, principal.identity);
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCustomerRequest>,
) -> CrmResult<Json<Customer>> {
    principal.require_staff()?;
    if req.name.as_deref().is_some_and(is_blank) || req.email.as_deref().is_some_and(is_blank) {
        return Err(CrmError::validation("Name and email cannot be blank"));
    }
    req.check_lengths()?;

    let changes = CustomerChanges {
        name: req.name.map(|v| v.trim().to_string()),
        email: req.email.map(|v| v.trim().to_string()),
        phone_number: non_blank(req.phone_number),
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        zip_code: req.zip_code,
        country: non_blank(req.country),
        website: non_blank(req.website),
        customer_type: req.customer_type,
        status: req.status,
        updated_at: Some(Utc::now()),
        ..CustomerChanges::default()
    };

    state
        .store
        .update_customer(id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| customer_not_found(id))
}

pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_staff()?;
    if state.store.delete_customer(id).await? {
        info!("Customer {id} deleted by {}", principal.identity);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(customer_not_found(id))
    }
}

/// `PUT /api/customers/{id}/password`
pub async fn set_customer_password(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<SetPasswordRequest>,
) -> CrmResult<Json<Customer>> {
    principal.require_staff()?;
    if is_blank(&req.password) {
        return Err(CrmError::validation("Password is required"));
    }

    let existing = state
        .store
        .find_customer(id)
        .await?
        .ok_or_else(|| customer_not_found(id))?;
    let updated = existing.has_password;

    let password_hash = hash_blocking(state.passwords.clone(), req.password)
        .await
        .map_err(|e| CrmError::internal(e.to_string()))?;
    let changes = CustomerChanges {
        password_hash: Some(password_hash),
        has_password: Some(true),
        updated_at: Some(Utc::now()),
        ..CustomerChanges::default()
    };
    let customer = state
        .store
        .update_customer(id, changes)
        .await?
        .ok_or_else(|| customer_not_found(id))?;

    info!(
        "Password {} for customer {id} by {}",
        if updated { "updated" } else { "set" },
        principal.identity
    );
    if req.send_email {
        dispatch(
            state.notifier.clone(),
            Notification::PasswordSet {
                to: customer.email.clone(),
                name: customer.name.clone(),
                updated,
            },
        );
    }

    Ok(Json(customer))
}

pub fn configure_customers_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/customers", get(list_customers).post(create_customer))
        .route(
            "/api/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/api/customers/:id/password", put(set_customer_password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_lengths() {
        let req: CreateCustomerRequest = serde_json::from_value(serde_json::json!({
            "name": "Acme",
            "email": "ops@acme.io",
            "website": format!("https://{}.io", "w".repeat(250))
        }))
        .expect("deserialize");
        let err = req.check_lengths().expect_err("website");
        assert_eq!(err.to_string(), "website must be at most 255 characters");
    }

    #[test]
    fn test_update_request_checks_only_present_fields() {
        let ok = UpdateCustomerRequest {
            city: Some("Porto".to_string()),
            ..UpdateCustomerRequest::default()
        };
        assert!(ok.check_lengths().is_ok());

        let too_long = UpdateCustomerRequest {
            country: Some("c".repeat(101)),
            ..UpdateCustomerRequest::default()
        };
        assert_eq!(too_long.check_lengths().expect_err("country").status_code(), StatusCode::BAD_REQUEST);
    }
}
