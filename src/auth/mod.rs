//! Customer self-registration, the two login flows and password reset by
//! emailed link.
//!
//! Everything under `/api/auth/` bypasses the auth gate.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::shared::enums::{ActivityStatus, CustomerType, Role};
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, CustomerChanges, EmployeeChanges, NewCustomer};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_len, is_blank, non_blank};
use crate::core::storage::StoreError;
use crate::email::{dispatch, Notification};
use crate::security::jwt::RESET_TOKEN_MINUTES;
use crate::security::password::{hash_blocking, matches_blocking};

pub const REGISTRATION_SUCCESS: &str = "Registration successful";
pub const ALREADY_REGISTERED: &str =
    "Email already registered with password. Please use login instead.";
pub const MISSING_FIELDS: &str = "Missing required fields";
pub const RESET_REQUESTED: &str =
    "If an account exists for that email, a password reset link has been sent.";
pub const RESET_DONE: &str = "Password has been reset";
pub const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCustomerRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "phone")]
    pub phone_number: Option<String>,
}

impl RegisterCustomerRequest {
    fn is_complete(&self) -> bool {
        !(is_blank(&self.first_name)
            || is_blank(&self.last_name)
            || is_blank(&self.email)
            || is_blank(&self.password))
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    fn check_lengths(&self) -> CrmResult<()> {
        ensure_max_len("name", Some(&self.full_name()), limits::NAME)?;
        ensure_max_len("email", Some(self.email.trim()), limits::EMAIL)?;
        ensure_max_len("phoneNumber", self.phone_number.as_deref().map(str::trim), limits::PHONE)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
    /// `CUSTOMER` when absent; `EMPLOYEE` and `ADMIN` both mean staff.
    pub account_type: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub token: Option<String>,
}

impl LoginResponse {
    fn failed() -> Self {
        Self {
            success: false,
            id: None,
            name: None,
            email: None,
            role: None,
            token: None,
        }
    }

    fn reject(status: StatusCode) -> Response {
        (status, Json(Self::failed())).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/auth/register/customer`
///
/// A customer record created by staff has no password yet; registering with
/// its email claims it. A record that already has a password is rejected.
pub async fn register_customer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterCustomerRequest>,
) -> CrmResult<Json<serde_json::Value>> {
    if !req.is_complete() {
        return Err(CrmError::validation(MISSING_FIELDS));
    }
    req.check_lengths()?;

    let email = req.email.trim().to_string();
    let name = req.full_name();
    let phone = non_blank(req.phone_number.clone());
    let existing = state.store.find_customer_by_email(&email).await?;
    if existing.as_ref().is_some_and(|c| c.has_password) {
        return Err(CrmError::Conflict(ALREADY_REGISTERED.to_string()));
    }

    let password_hash = hash_blocking(state.passwords.clone(), req.password.clone())
        .await
        .map_err(|e| CrmError::internal(e.to_string()))?;

    let customer = match existing {
        Some(existing) => {
            let changes = CustomerChanges {
                name: Some(name),
                phone_number: phone,
                password_hash: Some(password_hash),
                has_password: Some(true),
                ..CustomerChanges::default()
            };
            // A concurrent registration may have claimed the record since
            // the lookup; the store only claims a password-less customer.
            state
                .store
                .claim_customer(existing.id, changes)
                .await
                .map_err(|e| match e {
                    StoreError::Conflict(_) => CrmError::Conflict(ALREADY_REGISTERED.to_string()),
                    other => other.into(),
                })?
        }
        None => {
            let now = Utc::now();
            let new = NewCustomer {
                name,
                email,
                phone_number: phone,
                address: None,
                city: None,
                state: None,
                zip_code: None,
                country: None,
                website: None,
                customer_type: CustomerType::default(),
                status: ActivityStatus::Active,
                password_hash: Some(password_hash),
                has_password: true,
                created_at: now,
                updated_at: now,
            };
            state.store.create_customer(new).await.map_err(|e| match e {
                // Lost a race with a concurrent registration for the same email.
                StoreError::Conflict(_) => CrmError::Conflict(ALREADY_REGISTERED.to_string()),
                other => other.into(),
            })?
        }
    };

    info!("Customer {} registered", customer.id);
    dispatch(
        state.notifier.clone(),
        Notification::RegistrationConfirmation {
            to: customer.email.clone(),
            name: customer.name.clone(),
        },
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "message": REGISTRATION_SUCCESS
    })))
}

/// `POST /api/auth/login/employee`
///
/// Every failure is a 401 so the response does not reveal which emails
/// belong to staff.
pub async fn employee_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> CrmResult<Response> {
    let Some(employee) = state.store.find_employee_by_email(req.email.trim()).await? else {
        return Ok(LoginResponse::reject(StatusCode::UNAUTHORIZED));
    };
    let Some(hash) = employee.usable_password_hash().map(str::to_string) else {
        return Ok(LoginResponse::reject(StatusCode::UNAUTHORIZED));
    };
    if employee.status != ActivityStatus::Active {
        warn!("Login attempt for inactive employee {}", employee.id);
        return Ok(LoginResponse::reject(StatusCode::UNAUTHORIZED));
    }
    if !matches_blocking(state.passwords.clone(), req.password, hash).await {
        return Ok(LoginResponse::reject(StatusCode::UNAUTHORIZED));
    }

    let token = state
        .tokens
        .issue(&employee.email, employee.role, employee.id)
        .map_err(|e| CrmError::internal(e.to_string()))?;

    info!("Employee {} logged in as {}", employee.id, employee.role);
    Ok(Json(LoginResponse {
        success: true,
        id: Some(employee.id),
        name: Some(employee.name),
        email: Some(employee.email),
        role: Some(employee.role),
        token: Some(token),
    })
    .into_response())
}

/// `POST /api/auth/login/customer`
///
/// 404 for an unknown email, 403 when no password has been set yet, 401 for
/// a wrong password.
pub async fn customer_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> CrmResult<Response> {
    let Some(customer) = state.store.find_customer_by_email(req.email.trim()).await? else {
        return Ok(LoginResponse::reject(StatusCode::NOT_FOUND));
    };
    let Some(hash) = customer.usable_password_hash().map(str::to_string) else {
        return Ok(LoginResponse::reject(StatusCode::FORBIDDEN));
    };
    if !matches_blocking(state.passwords.clone(), req.password, hash).await {
        return Ok(LoginResponse::reject(StatusCode::UNAUTHORIZED));
    }

    let token = state
        .tokens
        .issue(&customer.email, Role::Customer, customer.id)
        .map_err(|e| CrmError::internal(e.to_string()))?;

    info!("Customer {} logged in", customer.id);
    Ok(Json(LoginResponse {
        success: true,
        id: Some(customer.id),
        name: Some(customer.name),
        email: Some(customer.email),
        role: Some(Role::Customer),
        token: Some(token),
    })
    .into_response())
}

fn reset_requested() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": RESET_REQUESTED
    }))
}

/// `POST /api/auth/forgot-password`
///
/// Always answers 200 with the same message so the endpoint cannot be used
/// to discover accounts. Inactive staff get no link.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> CrmResult<Json<serde_json::Value>> {
    let email = req.email.trim();
    if is_blank(email) {
        return Err(CrmError::validation("Email is required"));
    }

    let account = match req.account_type.unwrap_or(Role::Customer) {
        Role::Customer => state
            .store
            .find_customer_by_email(email)
            .await?
            .map(|c| (Role::Customer, c.id, c.name, c.email, c.updated_at)),
        Role::Employee | Role::Admin => state
            .store
            .find_employee_by_email(email)
            .await?
            .filter(|e| e.status == ActivityStatus::Active)
            .map(|e| (Role::Employee, e.id, e.name, e.email, e.updated_at)),
    };
    let Some((account, id, name, to, updated_at)) = account else {
        debug!("Password reset requested for unknown account");
        return Ok(reset_requested());
    };

    let token = state
        .tokens
        .issue_reset(&to, account, id, updated_at.timestamp_micros())
        .map_err(|e| CrmError::internal(e.to_string()))?;
    info!("Password reset link issued for {account} {id}");
    dispatch(
        state.notifier.clone(),
        Notification::PasswordResetLink {
            to,
            name,
            token,
            valid_minutes: RESET_TOKEN_MINUTES,
        },
    );
    Ok(reset_requested())
}

/// `POST /api/auth/reset-password`
///
/// The link is bound to the account's `updated_at`, so it stops working
/// after one successful reset or any other change to the account.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> CrmResult<Json<serde_json::Value>> {
    if is_blank(&req.token) || is_blank(&req.password) {
        return Err(CrmError::validation(MISSING_FIELDS));
    }
    let invalid = || CrmError::validation(INVALID_RESET_TOKEN);
    let claims = state
        .tokens
        .verify_reset(req.token.trim())
        .ok_or_else(invalid)?;

    let (email, name, version, updated) = match claims.account {
        Role::Customer => {
            let c = state
                .store
                .find_customer(claims.user_id)
                .await?
                .ok_or_else(invalid)?;
            (c.email, c.name, c.updated_at.timestamp_micros(), c.has_password)
        }
        Role::Employee | Role::Admin => {
            let e = state
                .store
                .find_employee(claims.user_id)
                .await?
                .ok_or_else(invalid)?;
            (e.email, e.name, e.updated_at.timestamp_micros(), e.has_password)
        }
    };
    if version != claims.ver || !email.eq_ignore_ascii_case(&claims.sub) {
        return Err(invalid());
    }

    let password_hash = hash_blocking(state.passwords.clone(), req.password)
        .await
        .map_err(|e| CrmError::internal(e.to_string()))?;
    let now = Utc::now();
    let changed = match claims.account {
        Role::Customer => state
            .store
            .update_customer(
                claims.user_id,
                CustomerChanges {
                    password_hash: Some(password_hash),
                    has_password: Some(true),
                    updated_at: Some(now),
                    ..CustomerChanges::default()
                },
            )
            .await?
            .is_some(),
        Role::Employee | Role::Admin => state
            .store
            .update_employee(
                claims.user_id,
                EmployeeChanges {
                    password_hash: Some(password_hash),
                    has_password: Some(true),
                    updated_at: Some(now),
                    ..EmployeeChanges::default()
                },
            )
            .await?
            .is_some(),
    };
    if !changed {
        return Err(invalid());
    }

    info!("Password reset for {} {}", claims.account, claims.user_id);
    dispatch(
        state.notifier.clone(),
        Notification::PasswordSet {
            to: email,
            name,
            updated,
        },
    );
    Ok(Json(serde_json::json!({
        "success": true,
        "message": RESET_DONE
    })))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register/customer", post(register_customer))
        .route("/api/auth/login/employee", post(employee_login))
        .route("/api/auth/login/customer", post(customer_login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_completeness() {
        let req: RegisterCustomerRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Ana",
            "lastName": "  ",
            "email": "a@x.com",
            "password": "p1"
        }))
        .expect("deserialize");
        assert!(!req.is_complete());

        let req: RegisterCustomerRequest = serde_json::from_value(serde_json::json!({
            "firstName": " Ana ",
            "lastName": "Lima",
            "email": "a@x.com",
            "password": "p1",
            "phone": "555"
        }))
        .expect("deserialize");
        assert!(req.is_complete());
        assert_eq!(req.full_name(), "Ana Lima");
        assert_eq!(req.phone_number.as_deref(), Some("555"));
    }

    #[test]
    fn test_registration_length_limits() {
        let req: RegisterCustomerRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Ana",
            "lastName": "Lima",
            "email": format!("{}@x.com", "a".repeat(260)),
            "password": "p1"
        }))
        .expect("deserialize");
        let err = req.check_lengths().expect_err("email too long");
        assert!(err.to_string().starts_with("email must be at most"));

        let req: RegisterCustomerRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Ana",
            "lastName": "Lima",
            "email": "a@x.com",
            "password": "p1",
            "phone": "9".repeat(51)
        }))
        .expect("deserialize");
        assert!(req.check_lengths().is_err());
    }

    #[test]
    fn test_forgot_password_defaults_to_customer() {
        let req: ForgotPasswordRequest =
            serde_json::from_value(serde_json::json!({ "email": "a@x.com" })).expect("deserialize");
        assert_eq!(req.account_type.unwrap_or(Role::Customer), Role::Customer);

        let req: ForgotPasswordRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "accountType": "EMPLOYEE"
        }))
        .expect("deserialize");
        assert_eq!(req.account_type, Some(Role::Employee));
    }

    #[test]
    fn test_failed_login_body() {
        let body = serde_json::to_value(LoginResponse::failed()).expect("serialize");
        assert_eq!(body["success"], false);
        assert!(body["token"].is_null());
        assert!(body["id"].is_null());
    }
}
