//! Invoices and their line items.
//!
//! Totals are always computed here from the items; the client never sends
//! them. An invoice is raised either directly for a customer or from an
//! accepted quotation, which can be invoiced once.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::middleware::Principal;
use crate::core::shared::enums::{InvoiceStatus, QuotationStage};
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, Invoice, InvoiceLine, InvoiceWithItems, NewInvoice};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_len, ensure_max_lens, is_blank, non_blank, round_money};
use crate::core::storage::{SalesStore, StoreError};
use crate::email::{dispatch, Notification};

/// Payment term applied when no due date is given.
pub const DEFAULT_PAYMENT_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemRequest {
    #[serde(default)]
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub title: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub discount: Option<BigDecimal>,
    pub tax_rate: Option<BigDecimal>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<InvoiceItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceNumberResponse {
    pub invoice_number: String,
}

/// Computed money fields of an invoice, all at two decimal places.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub lines: Vec<InvoiceLine>,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total: BigDecimal,
}

/// `subtotal - discount` is taxed at `tax_rate` percent.
pub fn compute_totals(
    items: &[InvoiceItemRequest],
    discount: Option<&BigDecimal>,
    tax_rate: Option<&BigDecimal>,
) -> CrmResult<InvoiceTotals> {
    let zero = BigDecimal::from(0);
    if items.is_empty() {
        return Err(CrmError::validation("An invoice needs at least one item"));
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if is_blank(&item.description) {
            return Err(CrmError::validation("Item description is required"));
        }
        ensure_max_len(
            "item description",
            Some(item.description.trim()),
            limits::ITEM_DESCRIPTION,
        )?;
        if item.quantity < 1 {
            return Err(CrmError::validation("Item quantity must be at least 1"));
        }
        let unit_price = round_money(&item.unit_price);
        if unit_price < zero {
            return Err(CrmError::validation("Item price cannot be negative"));
        }
        let amount = round_money(&(&unit_price * &BigDecimal::from(item.quantity)));
        lines.push(InvoiceLine {
            description: item.description.trim().to_string(),
            quantity: item.quantity,
            unit_price,
            amount,
        });
    }

    let subtotal = round_money(&lines.iter().fold(zero.clone(), |acc, l| acc + &l.amount));
    let discount = round_money(discount.unwrap_or(&zero));
    if discount < zero || discount > subtotal {
        return Err(CrmError::validation(
            "discount must be between zero and the subtotal",
        ));
    }
    let tax_rate = round_money(tax_rate.unwrap_or(&zero));
    if tax_rate < zero || tax_rate > BigDecimal::from(100) {
        return Err(CrmError::validation("taxRate must be between 0 and 100"));
    }

    let taxable = &subtotal - &discount;
    let tax_amount = round_money(&(&taxable * &tax_rate / BigDecimal::from(100)));
    let total = round_money(&(&taxable + &tax_amount));
    Ok(InvoiceTotals {
        lines,
        subtotal,
        discount,
        tax_rate,
        tax_amount,
        total,
    })
}

/// `INV-YYYYMMDD-XXXXXXXX`, the suffix taken from a random UUID.
pub fn generate_invoice_number(date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("INV-{}-{suffix}", date.format("%Y%m%d"))
}

fn invoice_not_found(id: i64) -> CrmError {
    CrmError::not_found(format!("Invoice not found with id: {id}"))
}

/// Validates the header fields and builds the insert. Shared by direct and
/// quotation-backed invoices.
fn build_invoice(
    req: &InvoiceRequest,
    title: String,
    customer_id: i64,
    quotation_id: Option<i64>,
    items: &[InvoiceItemRequest],
) -> CrmResult<(NewInvoice, Vec<InvoiceLine>)> {
    ensure_max_lens(&[
        ("title", Some(title.trim()), limits::TITLE),
        (
            "invoiceNumber",
            req.invoice_number.as_deref().map(str::trim),
            limits::INVOICE_NUMBER,
        ),
        ("notes", req.notes.as_deref().map(str::trim), limits::LONG_TEXT),
    ])?;

    let now = Utc::now();
    let invoice_date = req.invoice_date.unwrap_or_else(|| now.date_naive());
    let due_date = req
        .due_date
        .unwrap_or(invoice_date + Duration::days(DEFAULT_PAYMENT_DAYS));
    if due_date < invoice_date {
        return Err(CrmError::validation(
            "dueDate cannot be before the invoice date",
        ));
    }

    let totals = compute_totals(items, req.discount.as_ref(), req.tax_rate.as_ref())?;
    let invoice = NewInvoice {
        invoice_number: non_blank(req.invoice_number.clone())
            .unwrap_or_else(|| generate_invoice_number(invoice_date)),
        title: title.trim().to_string(),
        customer_id,
        quotation_id,
        status: InvoiceStatus::Pending,
        subtotal: totals.subtotal,
        discount: totals.discount,
        tax_rate: totals.tax_rate,
        tax_amount: totals.tax_amount,
        total: totals.total,
        invoice_date,
        due_date,
        notes: non_blank(req.notes.clone()),
        created_at: now,
        updated_at: now,
    };
    Ok((invoice, totals.lines))
}

pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<InvoiceListQuery>,
) -> CrmResult<Json<Vec<Invoice>>> {
    principal.require_staff()?;
    Ok(Json(state.store.list_invoices(query.status).await?))
}

pub async fn list_customer_invoices(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(customer_id): Path<i64>,
) -> CrmResult<Json<Vec<Invoice>>> {
    principal.require_customer_access(customer_id)?;
    Ok(Json(state.store.list_invoices_by_customer(customer_id).await?))
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<InvoiceWithItems>> {
    let invoice = state
        .store
        .find_invoice(id)
        .await?
        .ok_or_else(|| invoice_not_found(id))?;
    principal.require_customer_access(invoice.invoice.customer_id)?;
    Ok(Json(invoice))
}

pub async fn next_invoice_number(principal: Principal) -> CrmResult<Json<InvoiceNumberResponse>> {
    principal.require_staff()?;
    Ok(Json(InvoiceNumberResponse {
        invoice_number: generate_invoice_number(Utc::now().date_naive()),
    }))
}

/// `POST /api/invoices/customer/{id}`
pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(customer_id): Path<i64>,
    Json(req): Json<InvoiceRequest>,
) -> CrmResult<(StatusCode, Json<InvoiceWithItems>)> {
    principal.require_staff()?;
    let title = non_blank(req.title.clone())
        .ok_or_else(|| CrmError::validation("Invoice title is required"))?;
    let (invoice, lines) = build_invoice(&req, title, customer_id, None, &req.items)?;

    let created = state.store.create_invoice(invoice, lines).await?;
    info!(
        "Invoice {} ({}) raised for customer {customer_id} by {}",
        created.invoice.id, created.invoice.invoice_number, principal.identity
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// `POST /api/invoices/from-quotation/{id}`
///
/// Bills the quotation amount as a single item. Items in the body are
/// ignored; the other header fields apply as for a direct invoice.
pub async fn create_from_quotation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(quotation_id): Path<i64>,
    Json(req): Json<InvoiceRequest>,
) -> CrmResult<(StatusCode, Json<InvoiceWithItems>)> {
    principal.require_staff()?;
    let quotation = state
        .store
        .find_quotation(quotation_id)
        .await?
        .ok_or_else(|| CrmError::NotFound(StoreError::quotation_not_found(quotation_id).to_string()))?;
    if quotation.stage != QuotationStage::Accepted {
        return Err(CrmError::validation(format!(
            "Only accepted quotations can be invoiced; quotation {quotation_id} is {}",
            quotation.stage
        )));
    }

    let item = InvoiceItemRequest {
        description: quotation.title.clone(),
        quantity: 1,
        unit_price: quotation.amount.clone(),
    };
    let title = non_blank(req.title.clone()).unwrap_or_else(|| quotation.title.clone());
    let (invoice, lines) = build_invoice(
        &req,
        title,
        quotation.customer_id,
        Some(quotation_id),
        std::slice::from_ref(&item),
    )?;

    let created = state.store.create_invoice(invoice, lines).await?;
    info!(
        "Invoice {} raised from quotation {quotation_id} by {}",
        created.invoice.id, principal.identity
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_invoice_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<InvoiceStatusRequest>,
) -> CrmResult<Json<Invoice>> {
    principal.require_staff()?;
    let invoice = state
        .store
        .set_invoice_status(id, req.status, Utc::now())
        .await?
        .ok_or_else(|| invoice_not_found(id))?;
    info!("Invoice {id} marked {} by {}", invoice.status, principal.identity);
    Ok(Json(invoice))
}

/// `POST /api/invoices/{id}/send`: marks a pending invoice `SENT` and
/// emails the customer.
pub async fn send_invoice(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Invoice>> {
    principal.require_staff()?;
    let invoice = state
        .store
        .set_invoice_status(id, InvoiceStatus::Sent, Utc::now())
        .await?
        .ok_or_else(|| invoice_not_found(id))?;
    info!("Invoice {id} sent by {}", principal.identity);

    match state.store.find_customer(invoice.customer_id).await? {
        Some(customer) => dispatch(
            state.notifier.clone(),
            Notification::InvoiceGenerated {
                to: customer.email,
                name: customer.name,
                invoice_number: invoice.invoice_number.clone(),
                total: invoice.total.to_string(),
                due_date: invoice.due_date,
            },
        ),
        None => warn!("Invoice {id} sent but customer {} is gone", invoice.customer_id),
    }
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_admin()?;
    if state.store.delete_invoice(id).await? {
        info!("Invoice {id} deleted by {}", principal.identity);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(invoice_not_found(id))
    }
}

pub fn configure_invoices_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/invoices", get(list_invoices))
        .route(
            "/api/invoices/generate-invoice-number",
            get(next_invoice_number),
        )
        .route(
            "/api/invoices/customer/:id",
            get(list_customer_invoices).post(create_invoice),
        )
        .route(
            "/api/invoices/from-quotation/:id",
            post(create_from_quotation),
        )
        .route("/api/invoices/:id", get(get_invoice).delete(delete_invoice))
        .route("/api/invoices/:id/status", put(update_invoice_status))
        .route("/api/invoices/:id/send", post(send_invoice))
}
