//! Persistence for identities, tickets, resolutions, categories and the
//! sales pipeline.
//!
//! Two backends implement [`CrmStore`]: [`PgStore`] talks to PostgreSQL
//! through diesel, [`MemoryStore`] keeps everything behind one mutex and is
//! used by tests and the `--memory` development mode. Sales operations live
//! on the [`SalesStore`] supertrait.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::shared::enums::{
    InvoiceStatus, LeadSource, LeadStatus, QuotationStage, TicketStatus,
};
use crate::core::shared::models::{
    Category, CategoryChanges, Customer, CustomerChanges, Employee, EmployeeChanges, Invoice,
    InvoiceLine, InvoiceWithItems, Lead, LeadChanges, LeadFilter, NewCategory, NewCustomer,
    NewEmployee, NewInvoice, NewLead, NewQuotation, NewResolvedTicket, NewTicket, Quotation,
    QuotationChanges, ResolvedTicket, Ticket, TicketFilter,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Ticket {0} has already been resolved")]
    AlreadyResolved(i64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl StoreError {
    pub fn ticket_not_found(id: i64) -> Self {
        Self::NotFound(format!("Ticket not found with id: {id}"))
    }

    pub fn employee_not_found(id: i64) -> Self {
        Self::NotFound(format!("Employee not found with id: {id}"))
    }

    pub fn admin_not_found(id: i64) -> Self {
        Self::NotFound(format!("Admin not found with id: {id}"))
    }

    pub fn customer_not_found(id: i64) -> Self {
        Self::NotFound(format!("Customer not found with id: {id}"))
    }

    pub fn invalid_transition(id: i64, from: TicketStatus, to: TicketStatus) -> Self {
        Self::Conflict(format!("Ticket {id} cannot move from {from} to {to}"))
    }

    pub fn employee_has_resolutions(id: i64) -> Self {
        Self::Conflict(format!(
            "Employee {id} is referenced by resolution records and cannot be deleted"
        ))
    }

    pub fn customer_has_billing(id: i64) -> Self {
        Self::Conflict(format!(
            "Customer {id} has quotations or invoices and cannot be deleted"
        ))
    }

    pub fn already_registered(id: i64) -> Self {
        Self::Conflict(format!("Customer {id} already has a password"))
    }

    pub fn lead_not_found(id: i64) -> Self {
        Self::NotFound(format!("Lead not found with id: {id}"))
    }

    pub fn quotation_not_found(id: i64) -> Self {
        Self::NotFound(format!("Quotation not found with id: {id}"))
    }

    pub fn quotation_transition(id: i64, from: QuotationStage, to: QuotationStage) -> Self {
        Self::Conflict(format!("Quotation {id} cannot move from {from} to {to}"))
    }

    pub fn invoice_transition(id: i64, from: InvoiceStatus, to: InvoiceStatus) -> Self {
        Self::Conflict(format!("Invoice {id} cannot move from {from} to {to}"))
    }
}

/// Number of tickets currently in a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub status: TicketStatus,
    pub count: i64,
}

/// Dashboard aggregates. Every enum variant is present in the breakdowns,
/// zero counts included; soft-deleted leads are not counted.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesSummary {
    pub customers_total: i64,
    pub customers_this_month: i64,
    pub customers_last_month: i64,
    pub leads_by_status: Vec<(LeadStatus, i64)>,
    pub leads_by_source: Vec<(LeadSource, i64)>,
    pub quotations_by_stage: Vec<(QuotationStage, i64)>,
    pub paid_invoices: i64,
    pub revenue_total: BigDecimal,
    pub revenue_this_month: BigDecimal,
    pub revenue_last_month: BigDecimal,
}

/// Month boundaries used by [`SalesStore::sales_summary`]. "This month"
/// is `[month_start, now)`, "last month" is `[prev_month_start, month_start)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    pub month_start: DateTime<Utc>,
    pub prev_month_start: DateTime<Utc>,
}

#[async_trait]
pub trait SalesStore: Send + Sync {
    // Leads
    /// Fails with `NotFound` when the assigned employee does not exist.
    async fn create_lead(&self, lead: NewLead) -> Result<Lead>;
    /// Newest first.
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;
    /// Returns soft-deleted leads too; callers check `deleted_at`.
    async fn find_lead(&self, id: i64) -> Result<Option<Lead>>;
    /// Only live leads can be edited; a deleted one reads as absent.
    async fn update_lead(&self, id: i64, changes: LeadChanges) -> Result<Option<Lead>>;
    /// Soft delete. `false` when the lead is absent or already deleted.
    async fn delete_lead(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;
    async fn restore_lead(&self, id: i64) -> Result<Option<Lead>>;
    /// Marks the lead `CONVERTED` and links it to a customer as one unit.
    ///
    /// An existing customer with the same email (ignoring case) is linked
    /// instead of creating a duplicate. Fails with `Conflict` when the lead
    /// was already converted.
    async fn convert_lead(&self, id: i64, customer: NewCustomer) -> Result<(Lead, Customer)>;

    // Quotations
    /// Fails with `NotFound` when the customer does not exist.
    async fn create_quotation(&self, quotation: NewQuotation) -> Result<Quotation>;
    async fn list_quotations(&self, stage: Option<QuotationStage>) -> Result<Vec<Quotation>>;
    async fn list_quotations_by_customer(&self, customer_id: i64) -> Result<Vec<Quotation>>;
    async fn find_quotation(&self, id: i64) -> Result<Option<Quotation>>;
    /// Content edits, allowed on drafts only (`Conflict` otherwise).
    async fn update_quotation(
        &self,
        id: i64,
        changes: QuotationChanges,
    ) -> Result<Option<Quotation>>;
    /// Checks the move against the stage rules under the same lock or
    /// transaction as the write. `SENT` stamps `sent_at`, every customer
    /// response stamps `responded_at`.
    async fn set_quotation_stage(
        &self,
        id: i64,
        stage: QuotationStage,
        at: DateTime<Utc>,
    ) -> Result<Option<Quotation>>;
    /// `Conflict` once an invoice has been raised from the quotation.
    async fn delete_quotation(&self, id: i64) -> Result<bool>;

    // Invoices
    /// Writes the invoice and its items as one unit. A quotation-backed
    /// invoice requires an `ACCEPTED` quotation of the same customer that
    /// has not been invoiced yet.
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        lines: Vec<InvoiceLine>,
    ) -> Result<InvoiceWithItems>;
    async fn list_invoices(&self, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>>;
    async fn list_invoices_by_customer(&self, customer_id: i64) -> Result<Vec<Invoice>>;
    async fn find_invoice(&self, id: i64) -> Result<Option<InvoiceWithItems>>;
    /// `PAID` stamps `paid_at`, `SENT` stamps `sent_at`.
    async fn set_invoice_status(
        &self,
        id: i64,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Invoice>>;
    /// Only pending or cancelled invoices can be removed.
    async fn delete_invoice(&self, id: i64) -> Result<bool>;

    async fn sales_summary(&self, window: MonthWindow) -> Result<SalesSummary>;
}

#[async_trait]
pub trait CrmStore: SalesStore + Send + Sync {
    // Employees
    async fn create_employee(&self, employee: NewEmployee) -> Result<Employee>;
    async fn list_employees(&self) -> Result<Vec<Employee>>;
    async fn find_employee(&self, id: i64) -> Result<Option<Employee>>;
    async fn find_employee_by_email(&self, email: &str) -> Result<Option<Employee>>;
    async fn find_employees(&self, ids: &[i64]) -> Result<Vec<Employee>>;
    async fn update_employee(&self, id: i64, changes: EmployeeChanges)
        -> Result<Option<Employee>>;
    /// Fails with `Conflict` while a resolution names the employee as
    /// resolver or admin; resolution records are never rewritten.
    async fn delete_employee(&self, id: i64) -> Result<bool>;

    // Customers
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer>;
    async fn list_customers(&self) -> Result<Vec<Customer>>;
    async fn find_customer(&self, id: i64) -> Result<Option<Customer>>;
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>>;
    async fn update_customer(&self, id: i64, changes: CustomerChanges)
        -> Result<Option<Customer>>;
    /// Sets a password on a customer that has none, checked under the same
    /// lock or statement as the write. Fails with `NotFound` for an unknown
    /// id and `Conflict` when a password is already set.
    async fn claim_customer(&self, id: i64, changes: CustomerChanges) -> Result<Customer>;
    /// Fails with `Conflict` while quotations or invoices reference the
    /// customer.
    async fn delete_customer(&self, id: i64) -> Result<bool>;

    // Tickets
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket>;
    /// Newest first.
    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>>;
    async fn find_ticket(&self, id: i64) -> Result<Option<Ticket>>;
    /// Applies a plain status change. The transition is checked against the
    /// current status under the same lock or transaction as the write;
    /// a disallowed move fails with `Conflict`.
    async fn update_ticket_status(&self, id: i64, status: TicketStatus)
        -> Result<Option<Ticket>>;
    async fn assign_ticket(&self, id: i64, employee_id: i64) -> Result<Option<Ticket>>;
    async fn delete_ticket(&self, id: i64) -> Result<bool>;
    async fn count_tickets_by_status(&self) -> Result<Vec<StatusCount>>;

    // Resolutions
    /// Records the resolution and flips the ticket to `RESOLVED` as one unit.
    ///
    /// Fails with `NotFound` when the ticket, employee or admin does not
    /// exist and with `AlreadyResolved` when the ticket is no longer
    /// resolvable. The admin is any existing employee; the role is not
    /// checked. Nothing is written on failure.
    async fn resolve_ticket(&self, resolution: NewResolvedTicket) -> Result<ResolvedTicket>;
    /// All list queries are ordered newest first.
    async fn list_resolutions(&self) -> Result<Vec<ResolvedTicket>>;
    async fn list_resolutions_by_employee(&self, employee_id: i64)
        -> Result<Vec<ResolvedTicket>>;
    async fn list_resolutions_by_admin(&self, admin_id: i64) -> Result<Vec<ResolvedTicket>>;
    async fn find_resolution(&self, id: i64) -> Result<Option<ResolvedTicket>>;
    async fn find_resolution_by_ticket(&self, ticket_id: i64) -> Result<Option<ResolvedTicket>>;

    // Categories
    async fn create_category(&self, category: NewCategory) -> Result<Category>;
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn find_category(&self, id: i64) -> Result<Option<Category>>;
    async fn search_categories(&self, name: &str) -> Result<Vec<Category>>;
    async fn update_category(&self, id: i64, changes: CategoryChanges)
        -> Result<Option<Category>>;
    async fn delete_category(&self, id: i64) -> Result<bool>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> bool;
}
