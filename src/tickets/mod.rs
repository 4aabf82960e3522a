pub mod resolution;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::core::middleware::Principal;
use crate::core::shared::enums::{Role, TicketPriority, TicketStatus};
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, NewTicket, Ticket, TicketFilter};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_len, is_blank, non_blank};
use crate::core::storage::StoreError;

pub use resolution::configure_resolution_routes;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub customer_id: Option<i64>,
    pub employee_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub customer_id: Option<i64>,
    pub employee_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub employee_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

fn ticket_not_found(id: i64) -> CrmError {
    CrmError::NotFound(StoreError::ticket_not_found(id).to_string())
}

/// Staff see every ticket; a customer only tickets filed for them.
fn ensure_can_view(principal: &Principal, ticket: &Ticket) -> CrmResult<()> {
    match ticket.customer_id {
        _ if principal.is_staff() => Ok(()),
        Some(owner) => principal.require_customer_access(owner),
        None => principal.require_staff(),
    }
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateTicketRequest>,
) -> CrmResult<(StatusCode, Json<Ticket>)> {
    if is_blank(&req.title) {
        return Err(CrmError::validation("Title is required"));
    }
    ensure_max_len("title", Some(req.title.trim()), limits::TITLE)?;
    let status = match req.status {
        None => TicketStatus::Open,
        Some(s @ (TicketStatus::New | TicketStatus::Open)) => s,
        Some(other) => {
            return Err(CrmError::validation(format!(
                "New tickets cannot start as {other}"
            )))
        }
    };

    let (customer_id, employee_id) = if principal.role == Role::Customer {
        (Some(principal.user_id), None)
    } else {
        (req.customer_id, req.employee_id)
    };

    let now = Utc::now();
    let new = NewTicket {
        title: req.title.trim().to_string(),
        description: non_blank(req.description),
        status,
        priority: req.priority.unwrap_or_default(),
        customer_id,
        employee_id,
        created_at: now,
        updated_at: now,
    };

    let ticket = state.store.create_ticket(new).await?;
    info!("Ticket {} opened by {}", ticket.id, principal.identity);
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<TicketListQuery>,
) -> CrmResult<Json<Vec<Ticket>>> {
    let filter = if principal.is_staff() {
        TicketFilter {
            status: query.status,
            customer_id: query.customer_id,
            employee_id: query.employee_id,
        }
    } else {
        TicketFilter {
            status: query.status,
            customer_id: Some(principal.user_id),
            employee_id: None,
        }
    };
    Ok(Json(state.store.list_tickets(&filter).await?))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Ticket>> {
    let ticket = state
        .store
        .find_ticket(id)
        .await?
        .ok_or_else(|| ticket_not_found(id))?;
    ensure_can_view(&principal, &ticket)?;
    Ok(Json(ticket))
}

/// `RESOLVED` is rejected here; it is only reachable by recording a
/// resolution.
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<StatusUpdateRequest>,
) -> CrmResult<Json<Ticket>> {
    principal.require_staff()?;
    if req.status == TicketStatus::Resolved {
        return Err(CrmError::validation(
            "Tickets are resolved by recording a resolution",
        ));
    }

    let ticket = state
        .store
        .update_ticket_status(id, req.status)
        .await?
        .ok_or_else(|| ticket_not_found(id))?;
    info!("Ticket {id} moved to {} by {}", ticket.status, principal.identity);
    Ok(Json(ticket))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<AssignRequest>,
) -> CrmResult<Json<Ticket>> {
    principal.require_staff()?;
    let ticket = state
        .store
        .assign_ticket(id, req.employee_id)
        .await?
        .ok_or_else(|| ticket_not_found(id))?;
    info!("Ticket {id} assigned to employee {}", req.employee_id);
    Ok(Json(ticket))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_admin()?;
    if state.store.delete_ticket(id).await? {
        info!("Ticket {id} deleted by {}", principal.identity);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ticket_not_found(id))
    }
}

pub async fn get_ticket_stats(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<TicketStats>> {
    principal.require_staff()?;
    let counts = state.store.count_tickets_by_status().await?;
    let total = counts.iter().map(|c| c.count).sum();
    let by_status = counts
        .into_iter()
        .map(|c| (c.status.to_string(), c.count))
        .collect();
    Ok(Json(TicketStats { total, by_status }))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/stats", get(get_ticket_stats))
        .route("/api/tickets/:id", get(get_ticket).delete(delete_ticket))
        .route("/api/tickets/:id/status", put(change_status))
        .route("/api/tickets/:id/assign", put(assign_ticket))
}
