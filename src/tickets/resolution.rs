//! Closing a ticket out with a resolution record.
//!
//! A resolution is written once and never updated. Recording it and moving
//! the ticket to `RESOLVED` happen in a single store operation, so either
//! both are visible or neither is.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::core::middleware::Principal;
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, NewResolvedTicket, ResolvedTicket};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_len, format_resolved_at, is_blank, non_blank};
use crate::core::storage::{CrmStore, StoreError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResolutionRequest {
    pub original_ticket_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    pub ticket_description: Option<String>,
    #[serde(default)]
    pub resolve_description: String,
    pub employee_id: Option<i64>,
    pub admin_id: Option<i64>,
}

/// Read model returned by every resolution endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTicketView {
    pub id: i64,
    pub title: String,
    pub ticket_description: Option<String>,
    pub resolve_description: String,
    pub original_ticket_id: i64,
    pub employee_id: Option<i64>,
    pub employee_name: Option<String>,
    pub admin_id: Option<i64>,
    pub admin_name: Option<String>,
    pub resolved_at: String,
}

impl ResolvedTicketView {
    fn from_record(record: ResolvedTicket, names: &HashMap<i64, String>) -> Self {
        let name_of = |id: Option<i64>| id.and_then(|id| names.get(&id).cloned());
        Self {
            employee_name: name_of(record.employee_id),
            admin_name: name_of(record.admin_id),
            resolved_at: format_resolved_at(&record.resolved_at),
            id: record.id,
            title: record.title,
            ticket_description: record.ticket_description,
            resolve_description: record.resolve_description,
            original_ticket_id: record.original_ticket_id,
            employee_id: record.employee_id,
            admin_id: record.admin_id,
        }
    }
}

/// Projects records into views, resolving employee and admin names with a
/// single lookup.
async fn project(store: &dyn CrmStore, records: Vec<ResolvedTicket>) -> CrmResult<Vec<ResolvedTicketView>> {
    let mut ids: Vec<i64> = records
        .iter()
        .flat_map(|r| [r.employee_id, r.admin_id])
        .flatten()
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let names: HashMap<i64, String> = store
        .find_employees(&ids)
        .await?
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect();

    Ok(records
        .into_iter()
        .map(|r| ResolvedTicketView::from_record(r, &names))
        .collect())
}

async fn project_one(store: &dyn CrmStore, record: ResolvedTicket) -> CrmResult<ResolvedTicketView> {
    project(store, vec![record])
        .await?
        .pop()
        .ok_or_else(|| CrmError::internal("Projection dropped a resolution record"))
}

/// Validates the request and records the resolution.
///
/// When no ticket description is supplied the ticket's own description is
/// snapshotted, and must fit the same limit as a supplied one.
pub async fn resolve_ticket(
    store: &dyn CrmStore,
    req: CreateResolutionRequest,
) -> CrmResult<ResolvedTicketView> {
    let ticket_id = req
        .original_ticket_id
        .ok_or_else(|| CrmError::validation("originalTicketId is required"))?;
    if is_blank(&req.title) {
        return Err(CrmError::validation("title is required"));
    }
    if is_blank(&req.resolve_description) {
        return Err(CrmError::validation("resolveDescription is required"));
    }
    ensure_max_len("title", Some(req.title.trim()), limits::TITLE)?;
    ensure_max_len(
        "resolveDescription",
        Some(req.resolve_description.trim()),
        limits::RESOLVE_DESCRIPTION,
    )?;

    let ticket_description = match non_blank(req.ticket_description) {
        Some(d) => Some(d),
        None => store
            .find_ticket(ticket_id)
            .await?
            .ok_or_else(|| CrmError::NotFound(StoreError::ticket_not_found(ticket_id).to_string()))?
            .description,
    };
    ensure_max_len(
        "ticketDescription",
        ticket_description.as_deref(),
        limits::RESOLUTION_TICKET_DESCRIPTION,
    )?;

    let record = store
        .resolve_ticket(NewResolvedTicket {
            title: req.title.trim().to_string(),
            ticket_description,
            resolve_description: req.resolve_description.trim().to_string(),
            original_ticket_id: ticket_id,
            employee_id: req.employee_id,
            admin_id: req.admin_id,
            resolved_at: Utc::now(),
        })
        .await?;

    info!(
        "Ticket {ticket_id} resolved (resolution {}, employee {:?}, admin {:?})",
        record.id, record.employee_id, record.admin_id
    );
    project_one(store, record).await
}

fn resolution_not_found(id: i64) -> CrmError {
    CrmError::not_found(format!("Resolved ticket not found with id: {id}"))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_resolution(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateResolutionRequest>,
) -> CrmResult<(StatusCode, Json<ResolvedTicketView>)> {
    principal.require_staff()?;
    let view = resolve_ticket(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_resolutions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<Vec<ResolvedTicketView>>> {
    principal.require_staff()?;
    let records = state.store.list_resolutions().await?;
    Ok(Json(project(state.store.as_ref(), records).await?))
}

pub async fn list_by_employee(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(employee_id): Path<i64>,
) -> CrmResult<Json<Vec<ResolvedTicketView>>> {
    principal.require_staff()?;
    let records = state.store.list_resolutions_by_employee(employee_id).await?;
    Ok(Json(project(state.store.as_ref(), records).await?))
}

pub async fn list_by_admin(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(admin_id): Path<i64>,
) -> CrmResult<Json<Vec<ResolvedTicketView>>> {
    principal.require_staff()?;
    let records = state.store.list_resolutions_by_admin(admin_id).await?;
    Ok(Json(project(state.store.as_ref(), records).await?))
}

pub async fn get_resolution(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<ResolvedTicketView>> {
    principal.require_staff()?;
    let record = state
        .store
        .find_resolution(id)
        .await?
        .ok_or_else(|| resolution_not_found(id))?;
    Ok(Json(project_one(state.store.as_ref(), record).await?))
}

pub async fn get_by_original_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(ticket_id): Path<i64>,
) -> CrmResult<Json<ResolvedTicketView>> {
    principal.require_staff()?;
    let record = state
        .store
        .find_resolution_by_ticket(ticket_id)
        .await?
        .ok_or_else(|| {
            CrmError::not_found(format!("No resolution recorded for ticket {ticket_id}"))
        })?;
    Ok(Json(project_one(state.store.as_ref(), record).await?))
}

pub fn configure_resolution_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/resolved-tickets",
            get(list_resolutions).post(create_resolution),
        )
        .route("/api/resolved-tickets/employee/:id", get(list_by_employee))
        .route("/api/resolved-tickets/admin/:id", get(list_by_admin))
        .route("/api/resolved-tickets/:id", get(get_resolution))
        .route(
            "/api/resolved-tickets/original-ticket/:ticket_id",
            get(get_by_original_ticket),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::{ActivityStatus, Role, TicketPriority, TicketStatus};
    use crate::core::shared::models::{NewEmployee, NewTicket};
    use crate::core::storage::MemoryStore;

    async fn seed(store: &MemoryStore) -> (i64, i64, i64) {
        let now = Utc::now();
        let mut ids = Vec::new();
        for (name, role) in [("Eve Employee", Role::Employee), ("Ada Admin", Role::Admin)] {
            let e = store
                .create_employee(NewEmployee {
                    name: name.to_string(),
                    email: format!("{}@x.io", name.split(' ').next().unwrap_or("x")),
                    phone_number: None,
                    address: None,
                    city: None,
                    state: None,
                    role,
                    status: ActivityStatus::Active,
                    password_hash: None,
                    has_password: false,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("employee");
            ids.push(e.id);
        }
        let t = store
            .create_ticket(NewTicket {
                title: "VPN down".to_string(),
                description: Some("Cannot reach VPN".to_string()),
                status: TicketStatus::Open,
                priority: TicketPriority::Urgent,
                customer_id: None,
                employee_id: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("ticket");
        (t.id, ids[0], ids[1])
    }

    fn request(ticket_id: i64, employee_id: i64, admin_id: i64) -> CreateResolutionRequest {
        CreateResolutionRequest {
            original_ticket_id: Some(ticket_id),
            title: "VPN restored".to_string(),
            ticket_description: None,
            resolve_description: "Restarted the concentrator".to_string(),
            employee_id: Some(employee_id),
            admin_id: Some(admin_id),
        }
    }

    #[tokio::test]
    async fn test_resolution_projection() {
        let store = MemoryStore::new();
        let (ticket_id, employee_id, admin_id) = seed(&store).await;

        let view = resolve_ticket(&store, request(ticket_id, employee_id, admin_id))
            .await
            .expect("resolve");

        assert_eq!(view.original_ticket_id, ticket_id);
        assert_eq!(view.employee_name.as_deref(), Some("Eve Employee"));
        assert_eq!(view.admin_name.as_deref(), Some("Ada Admin"));
        assert_eq!(view.ticket_description.as_deref(), Some("Cannot reach VPN"));
        assert_eq!(view.resolved_at.len(), "05/03/24 14:30".len());

        let by_ticket = store
            .find_resolution_by_ticket(ticket_id)
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(by_ticket.id, view.id);
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let store = MemoryStore::new();
        let (ticket_id, employee_id, admin_id) = seed(&store).await;

        let mut req = request(ticket_id, employee_id, admin_id);
        req.resolve_description = "   ".to_string();
        let err = resolve_ticket(&store, req).await.expect_err("blank");
        assert!(matches!(err, CrmError::Validation(_)));

        let mut req = request(ticket_id, employee_id, admin_id);
        req.original_ticket_id = None;
        let err = resolve_ticket(&store, req).await.expect_err("missing id");
        assert!(matches!(err, CrmError::Validation(_)));

        assert!(store.list_resolutions().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_missing_ticket_is_not_found() {
        let store = MemoryStore::new();
        let (_, employee_id, admin_id) = seed(&store).await;

        let err = resolve_ticket(&store, request(4242, employee_id, admin_id))
            .await
            .expect_err("missing");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_employee_is_not_found() {
        let store = MemoryStore::new();
        let (ticket_id, _, admin_id) = seed(&store).await;

        let err = resolve_ticket(&store, request(ticket_id, 999, admin_id))
            .await
            .expect_err("missing employee");
        assert!(matches!(err, CrmError::NotFound(ref m) if m.contains("999")));

        let ticket = store.find_ticket(ticket_id).await.expect("find").expect("exists");
        assert_eq!(ticket.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn test_overlong_fields_rejected_before_writing() {
        let store = MemoryStore::new();
        let (ticket_id, employee_id, admin_id) = seed(&store).await;

        let mut req = request(ticket_id, employee_id, admin_id);
        req.title = "t".repeat(256);
        let err = resolve_ticket(&store, req).await.expect_err("title");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let mut req = request(ticket_id, employee_id, admin_id);
        req.resolve_description = "r".repeat(2001);
        let err = resolve_ticket(&store, req).await.expect_err("resolve description");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let mut req = request(ticket_id, employee_id, admin_id);
        req.ticket_description = Some("d".repeat(1001));
        let err = resolve_ticket(&store, req).await.expect_err("ticket description");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let ticket = store.find_ticket(ticket_id).await.expect("find").expect("exists");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(store.list_resolutions().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_overlong_ticket_snapshot_rejected() {
        let store = MemoryStore::new();
        let (_, employee_id, admin_id) = seed(&store).await;
        let now = Utc::now();
        let long = store
            .create_ticket(NewTicket {
                title: "Long report".to_string(),
                description: Some("x".repeat(1500)),
                status: TicketStatus::Open,
                priority: TicketPriority::Low,
                customer_id: None,
                employee_id: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("ticket");

        let err = resolve_ticket(&store, request(long.id, employee_id, admin_id))
            .await
            .expect_err("snapshot too long");
        assert!(matches!(err, CrmError::Validation(ref m) if m.starts_with("ticketDescription")));

        let mut req = request(long.id, employee_id, admin_id);
        req.ticket_description = Some("Summarised report".to_string());
        let view = resolve_ticket(&store, req).await.expect("explicit description fits");
        assert_eq!(view.ticket_description.as_deref(), Some("Summarised report"));
    }

    #[tokio::test]
    async fn test_resolving_twice_conflicts() {
        let store = MemoryStore::new();
        let (ticket_id, employee_id, admin_id) = seed(&store).await;

        resolve_ticket(&store, request(ticket_id, employee_id, admin_id))
            .await
            .expect("first");
        let err = resolve_ticket(&store, request(ticket_id, employee_id, admin_id))
            .await
            .expect_err("second");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
