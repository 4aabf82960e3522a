//! Staff dashboard: pipeline and revenue aggregates in one response.

use axum::{extract::State, routing::get, Json, Router};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::core::middleware::Principal;
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::round_money;
use crate::core::storage::{MonthWindow, SalesStore, SalesSummary, StatusCount};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_customers: i64,
    pub total_leads: i64,
    pub total_quotations: i64,
    pub total_tickets: i64,
    pub paid_invoices: i64,
    pub total_sales: BigDecimal,
    pub average_order_value: BigDecimal,
    pub customer_growth: BigDecimal,
    pub sales_growth: BigDecimal,
    pub leads_by_source: Vec<Bucket>,
    pub leads_by_status: Vec<Bucket>,
    pub quotations_by_stage: Vec<Bucket>,
    pub tickets_by_status: Vec<Bucket>,
}

/// Start of the month containing `now` and of the month before it, in UTC.
pub fn month_window(now: DateTime<Utc>) -> Option<MonthWindow> {
    let today = now.date_naive();
    let (prev_year, prev_month) = match today.month() {
        1 => (today.year() - 1, 12),
        m => (today.year(), m - 1),
    };
    let start_of = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    Some(MonthWindow {
        month_start: start_of(today.with_day(1)?)?,
        prev_month_start: start_of(NaiveDate::from_ymd_opt(prev_year, prev_month, 1)?)?,
    })
}

/// Month-over-month change in percent. Growth from nothing counts as 100.
pub fn growth_percent(this_month: &BigDecimal, last_month: &BigDecimal) -> BigDecimal {
    let zero = BigDecimal::from(0);
    if *last_month == zero {
        return if *this_month > zero {
            BigDecimal::from(100)
        } else {
            round_money(&zero)
        };
    }
    round_money(&((this_month - last_month) * BigDecimal::from(100) / last_month.clone()))
}

fn total<T>(counts: &[(T, i64)]) -> i64 {
    counts.iter().map(|(_, n)| n).sum()
}

fn buckets<T: ToString>(counts: &[(T, i64)]) -> Vec<Bucket> {
    counts
        .iter()
        .map(|(name, value)| Bucket {
            name: name.to_string(),
            value: *value,
        })
        .collect()
}

pub fn build_dashboard(summary: &SalesSummary, tickets: &[StatusCount]) -> DashboardData {
    let average_order_value = if summary.paid_invoices > 0 {
        round_money(&(summary.revenue_total.clone() / BigDecimal::from(summary.paid_invoices)))
    } else {
        round_money(&BigDecimal::from(0))
    };
    let ticket_counts: Vec<_> = tickets.iter().map(|c| (c.status, c.count)).collect();

    DashboardData {
        total_customers: summary.customers_total,
        total_leads: total(&summary.leads_by_status),
        total_quotations: total(&summary.quotations_by_stage),
        total_tickets: total(&ticket_counts),
        paid_invoices: summary.paid_invoices,
        total_sales: round_money(&summary.revenue_total),
        average_order_value,
        customer_growth: growth_percent(
            &BigDecimal::from(summary.customers_this_month),
            &BigDecimal::from(summary.customers_last_month),
        ),
        sales_growth: growth_percent(&summary.revenue_this_month, &summary.revenue_last_month),
        leads_by_source: buckets(&summary.leads_by_source),
        leads_by_status: buckets(&summary.leads_by_status),
        quotations_by_stage: buckets(&summary.quotations_by_stage),
        tickets_by_status: buckets(&ticket_counts),
    }
}

/// `GET /api/dashboard`
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> CrmResult<Json<DashboardData>> {
    principal.require_staff()?;
    let window = month_window(Utc::now())
        .ok_or_else(|| CrmError::internal("Could not compute the reporting month"))?;
    let summary = state.store.sales_summary(window).await?;
    let tickets = state.store.count_tickets_by_status().await?;
    Ok(Json(build_dashboard(&summary, &tickets)))
}

pub fn configure_dashboard_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/dashboard", get(get_dashboard))
}
