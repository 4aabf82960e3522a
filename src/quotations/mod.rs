//! Quotations offered to customers.
//!
//! Staff draft and send them; the customer (or staff on their behalf)
//! accepts or rejects a sent quotation before `validUntil`. Drafts are never
//! shown to customers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::middleware::Principal;
use crate::core::shared::enums::QuotationStage;
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, NewQuotation, Quotation, QuotationChanges};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_lens, is_blank, non_blank, round_money};
use crate::core::storage::{SalesStore, StoreError};
use crate::email::{dispatch, Notification};

/// Validity granted when a new quotation does not name one.
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<BigDecimal>,
    pub valid_until: Option<NaiveDate>,
    pub employee_id: Option<i64>,
}

impl QuotationRequest {
    fn validate(&self) -> CrmResult<()> {
        if self.title.as_deref().is_some_and(is_blank) {
            return Err(CrmError::validation("Quotation title cannot be blank"));
        }
        if self
            .amount
            .as_ref()
            .is_some_and(|a| round_money(a) <= BigDecimal::from(0))
        {
            return Err(CrmError::validation("amount must be greater than zero"));
        }
        ensure_max_lens(&[
            ("title", self.title.as_deref().map(str::trim), limits::TITLE),
            (
                "description",
                self.description.as_deref().map(str::trim),
                limits::LONG_TEXT,
            ),
        ])
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationListQuery {
    pub stage: Option<QuotationStage>,
}

fn quotation_not_found(id: i64) -> CrmError {
    CrmError::NotFound(StoreError::quotation_not_found(id).to_string())
}

/// Loads a quotation the caller may see. Customers only see their own,
/// and never a draft.
async fn visible_quotation(
    state: &AppState,
    principal: &Principal,
    id: i64,
) -> CrmResult<Quotation> {
    let quotation = state
        .store
        .find_quotation(id)
        .await?
        .ok_or_else(|| quotation_not_found(id))?;
    principal.require_customer_access(quotation.customer_id)?;
    if !principal.is_staff() && !quotation.stage.is_visible_to_customer() {
        return Err(quotation_not_found(id));
    }
    Ok(quotation)
}

pub async fn list_quotations(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<QuotationListQuery>,
) -> CrmResult<Json<Vec<Quotation>>> {
    principal.require_staff()?;
    Ok(Json(state.store.list_quotations(query.stage).await?))
}

pub async fn list_customer_quotations(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(customer_id): Path<i64>,
) -> CrmResult<Json<Vec<Quotation>>> {
    principal.require_customer_access(customer_id)?;
    let mut quotations = state.store.list_quotations_by_customer(customer_id).await?;
    if !principal.is_staff() {
        quotations.retain(|q| q.stage.is_visible_to_customer());
    }
    Ok(Json(quotations))
}

pub async fn get_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Quotation>> {
    Ok(Json(visible_quotation(&state, &principal, id).await?))
}

/// `POST /api/quotations/customer/{id}`, always created as a draft.
pub async fn create_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(customer_id): Path<i64>,
    Json(req): Json<QuotationRequest>,
) -> CrmResult<(StatusCode, Json<Quotation>)> {
    principal.require_staff()?;
    let (Some(title), Some(amount)) = (non_blank(req.title.clone()), req.amount.as_ref()) else {
        return Err(CrmError::validation("title and amount are required"));
    };
    req.validate()?;

    let now = Utc::now();
    let today = now.date_naive();
    let valid_until = req
        .valid_until
        .unwrap_or(today + Duration::days(DEFAULT_VALIDITY_DAYS));
    if valid_until < today {
        return Err(CrmError::validation("validUntil cannot be in the past"));
    }

    let quotation = state
        .store
        .create_quotation(NewQuotation {
            title,
            description: non_blank(req.description),
            amount: round_money(amount),
            valid_until,
            stage: QuotationStage::Draft,
            customer_id,
            employee_id: Some(req.employee_id.unwrap_or(principal.user_id)),
            created_at: now,
            updated_at: now,
        })
        .await?;
    info!(
        "Quotation {} drafted for customer {customer_id} by {}",
        quotation.id, principal.identity
    );
    Ok((StatusCode::CREATED, Json(quotation)))
}

pub async fn update_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<QuotationRequest>,
) -> CrmResult<Json<Quotation>> {
    principal.require_staff()?;
    req.validate()?;
    if req
        .valid_until
        .is_some_and(|d| d < Utc::now().date_naive())
    {
        return Err(CrmError::validation("validUntil cannot be in the past"));
    }

    let changes = QuotationChanges {
        title: req.title.map(|t| t.trim().to_string()),
        description: non_blank(req.description),
        amount: req.amount.as_ref().map(round_money),
        valid_until: req.valid_until,
        employee_id: req.employee_id,
        updated_at: Some(Utc::now()),
    };
    state
        .store
        .update_quotation(id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| quotation_not_found(id))
}

pub async fn delete_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_staff()?;
    if state.store.delete_quotation(id).await? {
        info!("Quotation {id} deleted by {}", principal.identity);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(quotation_not_found(id))
    }
}

/// `POST /api/quotations/{id}/send`: moves a draft to `SENT` and emails
/// the customer.
pub async fn send_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Quotation>> {
    principal.require_staff()?;
    let now = Utc::now();
    let current = state
        .store
        .find_quotation(id)
        .await?
        .ok_or_else(|| quotation_not_found(id))?;
    if current.is_expired_on(now.date_naive()) {
        return Err(CrmError::validation(format!(
            "Quotation {id} is past its validity date and cannot be sent"
        )));
    }

    let quotation = state
        .store
        .set_quotation_stage(id, QuotationStage::Sent, now)
        .await?
        .ok_or_else(|| quotation_not_found(id))?;
    info!("Quotation {id} sent by {}", principal.identity);

    match state.store.find_customer(quotation.customer_id).await? {
        Some(customer) => dispatch(
            state.notifier.clone(),
            Notification::QuotationSent {
                to: customer.email,
                name: customer.name,
                title: quotation.title.clone(),
                description: quotation.description.clone(),
                amount: quotation.amount.to_string(),
                valid_until: quotation.valid_until,
            },
        ),
        None => warn!("Quotation {id} sent but customer {} is gone", quotation.customer_id),
    }
    Ok(Json(quotation))
}

/// Accept or reject on the customer's behalf. A sent quotation past its
/// validity date is moved to `EXPIRED` instead and the response is a 400.
async fn respond(
    state: &AppState,
    principal: &Principal,
    id: i64,
    answer: QuotationStage,
) -> CrmResult<Quotation> {
    let quotation = visible_quotation(state, principal, id).await?;
    let now = Utc::now();
    if quotation.stage == QuotationStage::Sent && quotation.is_expired_on(now.date_naive()) {
        state
            .store
            .set_quotation_stage(id, QuotationStage::Expired, now)
            .await?;
        info!("Quotation {id} expired on {}", quotation.valid_until);
        return Err(CrmError::validation(format!(
            "Quotation {id} expired on {}",
            quotation.valid_until
        )));
    }

    let quotation = state
        .store
        .set_quotation_stage(id, answer, now)
        .await?
        .ok_or_else(|| quotation_not_found(id))?;
    info!("Quotation {id} marked {answer} by {}", principal.identity);
    Ok(quotation)
}

pub async fn accept_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Quotation>> {
    Ok(Json(
        respond(&state, &principal, id, QuotationStage::Accepted).await?,
    ))
}

pub async fn reject_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Quotation>> {
    Ok(Json(
        respond(&state, &principal, id, QuotationStage::Rejected).await?,
    ))
}

pub fn configure_quotations_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/quotations", get(list_quotations))
        .route(
            "/api/quotations/customer/:id",
            get(list_customer_quotations).post(create_quotation),
        )
        .route(
            "/api/quotations/:id",
            get(get_quotation)
                .put(update_quotation)
                .delete(delete_quotation),
        )
        .route("/api/quotations/:id/send", post(send_quotation))
        .route("/api/quotations/:id/accept", post(accept_quotation))
        .route("/api/quotations/:id/reject", post(reject_quotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_quotation_request_validation() {
        let zero = QuotationRequest {
            amount: Some(BigDecimal::from_str("0.001").expect("decimal")),
            ..QuotationRequest::default()
        };
        assert!(zero.validate().is_err());

        let long_title = QuotationRequest {
            title: Some("q".repeat(256)),
            ..QuotationRequest::default()
        };
        assert_eq!(
            long_title.validate().expect_err("title").to_string(),
            "title must be at most 255 characters"
        );

        let fine = QuotationRequest {
            title: Some("Support plan".to_string()),
            amount: Some(BigDecimal::from_str("1200").expect("decimal")),
            ..QuotationRequest::default()
        };
        assert!(fine.validate().is_ok());
    }
}
