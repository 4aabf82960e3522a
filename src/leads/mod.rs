//! Sales leads: prospects that have not become customers yet.
//!
//! Deletion is soft; a deleted lead drops out of every list except
//! `/api/leads/deleted` and can be restored. Conversion creates (or links)
//! a customer and is the only way a lead becomes `CONVERTED`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::middleware::Principal;
use crate::core::shared::enums::{ActivityStatus, CustomerType, LeadSource, LeadStatus};
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{
    limits, Customer, Lead, LeadChanges, LeadFilter, NewCustomer, NewLead,
};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_lens, is_blank, non_blank, round_money};
use crate::core::storage::{SalesStore, StoreError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub source: Option<LeadSource>,
    pub status: Option<LeadStatus>,
    pub requirement: Option<String>,
    pub comment: Option<String>,
    pub expected_revenue: Option<BigDecimal>,
    pub conversion_probability: Option<i16>,
    pub employee_id: Option<i64>,
}

impl LeadRequest {
    /// Shared by create and update; absent fields are not checked.
    fn validate(&self) -> CrmResult<()> {
        if self.name.as_deref().is_some_and(is_blank) {
            return Err(CrmError::validation("Lead name cannot be blank"));
        }
        if self.status == Some(LeadStatus::Converted) {
            return Err(CrmError::validation(
                "Leads become CONVERTED only through conversion",
            ));
        }
        if self
            .expected_revenue
            .as_ref()
            .is_some_and(|r| r < &BigDecimal::from(0))
        {
            return Err(CrmError::validation("expectedRevenue cannot be negative"));
        }
        if self
            .conversion_probability
            .is_some_and(|p| !(0..=100).contains(&p))
        {
            return Err(CrmError::validation(
                "conversionProbability must be between 0 and 100",
            ));
        }
        fn trimmed(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim)
        }
        ensure_max_lens(&[
            ("name", trimmed(&self.name), limits::NAME),
            ("email", trimmed(&self.email), limits::EMAIL),
            ("phoneNumber", trimmed(&self.phone_number), limits::PHONE),
            ("company", trimmed(&self.company), limits::COMPANY),
            ("address", trimmed(&self.address), limits::ADDRESS),
            ("city", trimmed(&self.city), limits::CITY),
            ("state", trimmed(&self.state), limits::STATE),
            ("zipCode", trimmed(&self.zip_code), limits::ZIP_CODE),
            ("country", trimmed(&self.country), limits::COUNTRY),
            ("website", trimmed(&self.website), limits::WEBSITE),
            ("requirement", trimmed(&self.requirement), limits::LONG_TEXT),
            ("comment", trimmed(&self.comment), limits::LONG_TEXT),
        ])
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListQuery {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub employee_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub total: i64,
    pub by_status: Vec<NamedCount>,
    pub by_source: Vec<NamedCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: &'static str,
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversionResult {
    pub lead: Lead,
    pub customer: Customer,
}

fn lead_not_found(id: i64) -> CrmError {
    CrmError::NotFound(StoreError::lead_not_found(id).to_string())
}

/// Counts live leads per status and source, zero rows included.
pub fn lead_stats(leads: &[Lead]) -> LeadStats {
    let count = |pred: &dyn Fn(&Lead) -> bool| leads.iter().filter(|l| pred(l)).count() as i64;
    LeadStats {
        total: leads.len() as i64,
        by_status: LeadStatus::ALL
            .iter()
            .map(|s| NamedCount {
                name: s.as_str(),
                value: count(&|l| l.status == *s),
            })
            .collect(),
        by_source: LeadSource::ALL
            .iter()
            .map(|s| NamedCount {
                name: s.as_str(),
                value: count(&|l| l.source == *s),
            })
            .collect(),
    }
}

/// Customer record built from a lead. The lead's zip code is free text and
/// is dropped when it is not numeric.
fn customer_from_lead(lead: &Lead, email: String) -> NewCustomer {
    let now = Utc::now();
    NewCustomer {
        name: lead
            .company
            .clone()
            .filter(|c| !is_blank(c))
            .unwrap_or_else(|| lead.name.clone()),
        email,
        phone_number: lead.phone_number.clone(),
        address: lead.address.clone(),
        city: lead.city.clone(),
        state: lead.state.clone(),
        zip_code: lead.zip_code.as_deref().and_then(|z| z.trim().parse().ok()),
        country: lead.country.clone(),
        website: lead.website.clone(),
        customer_type: if lead.company.as_deref().is_some_and(|c| !is_blank(c)) {
            CustomerType::Business
        } else {
            CustomerType::default()
        },
        status: ActivityStatus::Active,
        password_hash: None,
        has_password: false,
        created_at: now,
        updated_at: now,
    }
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<LeadListQuery>,
) -> CrmResult<Json<Vec<Lead>>> {
    principal.require_staff()?;
    let filter = LeadFilter {
        status: query.status,
        source: query.source,
        employee_id: query.employee_id,
        deleted: false,
    };
    Ok(Json(state.store.list_leads(&filter).await?))
}

pub async fn list_deleted_leads(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<Vec<Lead>>> {
    principal.require_staff()?;
    let filter = LeadFilter {
        deleted: true,
        ..LeadFilter::default()
    };
    Ok(Json(state.store.list_leads(&filter).await?))
}

pub async fn get_lead_stats(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<LeadStats>> {
    principal.require_staff()?;
    let leads = state.store.list_leads(&LeadFilter::default()).await?;
    Ok(Json(lead_stats(&leads)))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Lead>> {
    principal.require_staff()?;
    state
        .store
        .find_lead(id)
        .await?
        .map(Json)
        .ok_or_else(|| lead_not_found(id))
}

/// New leads are assigned to their creator unless an employee is named.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<LeadRequest>,
) -> CrmResult<(StatusCode, Json<Lead>)> {
    principal.require_staff()?;
    if req.name.as_deref().map_or(true, is_blank) {
        return Err(CrmError::validation("Lead name is required"));
    }
    req.validate()?;

    let now = Utc::now();
    let new = NewLead {
        name: req.name.unwrap_or_default().trim().to_string(),
        email: non_blank(req.email),
        phone_number: non_blank(req.phone_number),
        company: non_blank(req.company),
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        zip_code: non_blank(req.zip_code),
        country: non_blank(req.country),
        website: non_blank(req.website),
        source: req.source.unwrap_or_default(),
        status: req.status.unwrap_or_default(),
        requirement: non_blank(req.requirement),
        comment: non_blank(req.comment),
        expected_revenue: req.expected_revenue.as_ref().map(round_money),
        conversion_probability: req.conversion_probability,
        employee_id: Some(req.employee_id.unwrap_or(principal.user_id)),
        created_at: now,
        updated_at: now,
    };

    let lead = state.store.create_lead(new).await?;
    info!("Lead {} created by {}", lead.id, principal.identity);
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<LeadRequest>,
) -> CrmResult<Json<Lead>> {
    principal.require_staff()?;
    req.validate()?;

    let changes = LeadChanges {
        name: req.name.map(|v| v.trim().to_string()),
        email: non_blank(req.email),
        phone_number: non_blank(req.phone_number),
        company: non_blank(req.company),
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        zip_code: non_blank(req.zip_code),
        country: non_blank(req.country),
        website: non_blank(req.website),
        source: req.source,
        status: req.status,
        requirement: non_blank(req.requirement),
        comment: non_blank(req.comment),
        expected_revenue: req.expected_revenue.as_ref().map(round_money),
        conversion_probability: req.conversion_probability,
        employee_id: req.employee_id,
        updated_at: Some(Utc::now()),
    };

    state
        .store
        .update_lead(id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| lead_not_found(id))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_staff()?;
    if state.store.delete_lead(id, Utc::now()).await? {
        info!("Lead {id} deleted by {}", principal.identity);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(lead_not_found(id))
    }
}

pub async fn restore_lead(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Lead>> {
    principal.require_staff()?;
    let lead = state
        .store
        .restore_lead(id)
        .await?
        .ok_or_else(|| lead_not_found(id))?;
    info!("Lead {id} restored by {}", principal.identity);
    Ok(Json(lead))
}

/// `POST /api/leads/{id}/convert`
pub async fn convert_lead(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<ConversionResult>> {
    principal.require_staff()?;
    let lead = state
        .store
        .find_lead(id)
        .await?
        .filter(|l| !l.is_deleted())
        .ok_or_else(|| lead_not_found(id))?;
    let email = lead
        .email
        .clone()
        .filter(|e| !is_blank(e))
        .ok_or_else(|| CrmError::validation("A lead needs an email address to be converted"))?;

    let (lead, customer) = state
        .store
        .convert_lead(id, customer_from_lead(&lead, email))
        .await?;
    info!(
        "Lead {id} converted to customer {} by {}",
        customer.id, principal.identity
    );
    Ok(Json(ConversionResult { lead, customer }))
}

pub fn configure_leads_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leads", get(list_leads).post(create_lead))
        .route("/api/leads/deleted", get(list_deleted_leads))
        .route("/api/leads/stats", get(get_lead_stats))
        .route(
            "/api/leads/:id",
            get(get_lead).put(update_lead).delete(delete_lead),
        )
        .route("/api/leads/:id/restore", put(restore_lead))
        .route("/api/leads/:id/convert", post(convert_lead))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn lead(company: Option<&str>, zip: Option<&str>) -> Lead {
        let now = Utc::now();
        Lead {
            id: 1,
            name: "Rita Prospect".to_string(),
            email: Some("rita@prospect.io".to_string()),
            phone_number: None,
            company: company.map(str::to_string),
            address: None,
            city: Some("Braga".to_string()),
            state: None,
            zip_code: zip.map(str::to_string),
            country: None,
            website: None,
            source: LeadSource::Referral,
            status: LeadStatus::Qualified,
            requirement: None,
            comment: None,
            expected_revenue: None,
            conversion_probability: None,
            employee_id: None,
            customer_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_customer_from_lead() {
        let business = customer_from_lead(&lead(Some("Prospect Ltd"), Some("4700")), "r@p.io".into());
        assert_eq!(business.name, "Prospect Ltd");
        assert_eq!(business.customer_type, CustomerType::Business);
        assert_eq!(business.zip_code, Some(4700));
        assert!(!business.has_password);

        let person = customer_from_lead(&lead(None, Some("4700-123")), "r@p.io".into());
        assert_eq!(person.name, "Rita Prospect");
        assert_eq!(person.zip_code, None);
        assert_eq!(person.city.as_deref(), Some("Braga"));
    }

    #[test]
    fn test_lead_request_validation() {
        let converted = LeadRequest {
            status: Some(LeadStatus::Converted),
            ..LeadRequest::default()
        };
        assert!(converted.validate().is_err());

        let probability = LeadRequest {
            conversion_probability: Some(101),
            ..LeadRequest::default()
        };
        assert!(probability.validate().is_err());

        let negative = LeadRequest {
            expected_revenue: Some(BigDecimal::from_str("-1").expect("decimal")),
            ..LeadRequest::default()
        };
        assert!(negative.validate().is_err());

        let zip = LeadRequest {
            zip_code: Some("9".repeat(21)),
            ..LeadRequest::default()
        };
        let err = zip.validate().expect_err("zip");
        assert_eq!(err.to_string(), "zipCode must be at most 20 characters");

        let fine = LeadRequest {
            name: Some("Rita".to_string()),
            conversion_probability: Some(100),
            ..LeadRequest::default()
        };
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_lead_stats_lists_every_bucket() {
        let mut other = lead(None, None);
        other.status = LeadStatus::New;
        let stats = lead_stats(&[lead(None, None), other]);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.len(), LeadStatus::ALL.len());
        assert_eq!(stats.by_source.len(), LeadSource::ALL.len());
        let referral = stats
            .by_source
            .iter()
            .find(|c| c.name == "REFERRAL")
            .expect("referral bucket");
        assert_eq!(referral.value, 2);
        assert!(stats.by_status.iter().any(|c| c.name == "LOST" && c.value == 0));
    }
}
