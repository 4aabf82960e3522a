use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{
    ActivityStatus, CustomerType, InvoiceStatus, LeadSource, LeadStatus, QuotationStage, Role,
    TicketPriority, TicketStatus,
};
use super::schema::{
    categories, customers, employees, invoice_items, invoices, leads, quotations,
    resolved_tickets, tickets,
};

/// Column widths from the migrations, in characters. Input longer than
/// these is rejected before it reaches the database.
pub mod limits {
    pub const NAME: usize = 255;
    pub const EMAIL: usize = 255;
    pub const PHONE: usize = 50;
    pub const ADDRESS: usize = 255;
    pub const CITY: usize = 100;
    pub const STATE: usize = 100;
    pub const COUNTRY: usize = 100;
    pub const WEBSITE: usize = 255;
    pub const COMPANY: usize = 255;
    pub const ZIP_CODE: usize = 20;
    pub const TITLE: usize = 255;
    pub const RESOLUTION_TICKET_DESCRIPTION: usize = 1000;
    pub const RESOLVE_DESCRIPTION: usize = 2000;
    pub const LONG_TEXT: usize = 2000;
    pub const ITEM_DESCRIPTION: usize = 500;
    pub const INVOICE_NUMBER: usize = 50;
}

// ============================================================================
// Identities
// ============================================================================

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = employees)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub role: Role,
    pub status: ActivityStatus,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    /// The stored hash, only when the record claims to have a password.
    pub fn usable_password_hash(&self) -> Option<&str> {
        if self.has_password {
            self.password_hash.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = employees)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub role: Role,
    pub status: ActivityStatus,
    pub password_hash: Option<String>,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = employees)]
pub struct EmployeeChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub role: Option<Role>,
    pub status: Option<ActivityStatus>,
    pub password_hash: Option<String>,
    pub has_password: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = customers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<i32>,
    pub country: Option<String>,
    pub website: Option<String>,
    #[serde(rename = "type")]
    pub customer_type: CustomerType,
    pub status: ActivityStatus,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn usable_password_hash(&self) -> Option<&str> {
        if self.has_password {
            self.password_hash.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = customers)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<i32>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub customer_type: CustomerType,
    pub status: ActivityStatus,
    pub password_hash: Option<String>,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = customers)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<i32>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub status: Option<ActivityStatus>,
    pub password_hash: Option<String>,
    pub has_password: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub customer_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub customer_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Closure record for a ticket. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = resolved_tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTicket {
    pub id: i64,
    pub title: String,
    pub ticket_description: Option<String>,
    pub resolve_description: String,
    pub original_ticket_id: i64,
    pub employee_id: Option<i64>,
    pub admin_id: Option<i64>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = resolved_tickets)]
pub struct NewResolvedTicket {
    pub title: String,
    pub ticket_description: Option<String>,
    pub resolve_description: String,
    pub original_ticket_id: i64,
    pub employee_id: Option<i64>,
    pub admin_id: Option<i64>,
    pub resolved_at: DateTime<Utc>,
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = categories)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = categories)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Sales
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = leads)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub requirement: Option<String>,
    pub comment: Option<String>,
    pub expected_revenue: Option<BigDecimal>,
    pub conversion_probability: Option<i16>,
    pub employee_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = leads)]
pub struct NewLead {
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub requirement: Option<String>,
    pub comment: Option<String>,
    pub expected_revenue: Option<BigDecimal>,
    pub conversion_probability: Option<i16>,
    pub employee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = leads)]
pub struct LeadChanges {
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
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = quotations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub valid_until: NaiveDate,
    pub stage: QuotationStage,
    pub customer_id: i64,
    pub employee_id: Option<i64>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.valid_until < today
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = quotations)]
pub struct NewQuotation {
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub valid_until: NaiveDate,
    pub stage: QuotationStage,
    pub customer_id: i64,
    pub employee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content edits. Stage moves go through the store's transition operation.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = quotations)]
pub struct QuotationChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<BigDecimal>,
    pub valid_until: Option<NaiveDate>,
    pub employee_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = invoices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub title: String,
    pub customer_id: i64,
    pub quotation_id: Option<i64>,
    pub status: InvoiceStatus,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total: BigDecimal,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invoices)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub title: String,
    pub customer_id: i64,
    pub quotation_id: Option<i64>,
    pub status: InvoiceStatus,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total: BigDecimal,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = invoice_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: i64,
    #[serde(skip_serializing)]
    pub invoice_id: i64,
    pub position: i32,
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

/// Line item before it is attached to an invoice; the store fills in
/// `invoice_id` and `position`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invoice_items)]
pub struct NewInvoiceItem {
    pub invoice_id: i64,
    pub position: i32,
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

impl NewInvoiceItem {
    pub fn from_line(invoice_id: i64, position: i32, line: InvoiceLine) -> Self {
        Self {
            invoice_id,
            position,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
            amount: line.amount,
        }
    }
}

/// Invoice with its line items in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

// ============================================================================
// Query helpers
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub customer_id: Option<i64>,
    pub employee_id: Option<i64>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.status.map_or(true, |s| ticket.status == s)
            && self.customer_id.map_or(true, |c| ticket.customer_id == Some(c))
            && self.employee_id.map_or(true, |e| ticket.employee_id == Some(e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub employee_id: Option<i64>,
    /// `false` lists live leads, `true` only soft-deleted ones.
    pub deleted: bool,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        lead.is_deleted() == self.deleted
            && self.status.map_or(true, |s| lead.status == s)
            && self.source.map_or(true, |s| lead.source == s)
            && self.employee_id.map_or(true, |e| lead.employee_id == Some(e))
    }
}
