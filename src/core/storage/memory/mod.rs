mod sales;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as TokioMutex;

use super::{CrmStore, Result, StatusCount, StoreError};
use crate::core::shared::enums::TicketStatus;
use crate::core::shared::models::{
    Category, CategoryChanges, Customer, CustomerChanges, Employee, EmployeeChanges, Invoice,
    InvoiceItem, Lead, NewCategory, NewCustomer, NewEmployee, NewResolvedTicket, NewTicket,
    Quotation, ResolvedTicket, Ticket, TicketFilter,
};

#[derive(Default)]
struct Tables {
    employees: BTreeMap<i64, Employee>,
    customers: BTreeMap<i64, Customer>,
    tickets: BTreeMap<i64, Ticket>,
    resolutions: BTreeMap<i64, ResolvedTicket>,
    categories: BTreeMap<i64, Category>,
    leads: BTreeMap<i64, Lead>,
    quotations: BTreeMap<i64, Quotation>,
    invoices: BTreeMap<i64, Invoice>,
    invoice_items: BTreeMap<i64, InvoiceItem>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn employee_email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.employees
            .values()
            .any(|e| Some(e.id) != except && e.email.eq_ignore_ascii_case(email))
    }

    fn customer_email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.customers
            .values()
            .any(|c| Some(c.id) != except && c.email.eq_ignore_ascii_case(email))
    }

    fn category_name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.categories
            .values()
            .any(|c| Some(c.id) != except && c.name == name)
    }

    fn employee_in_resolutions(&self, id: i64) -> bool {
        self.resolutions
            .values()
            .any(|r| r.employee_id == Some(id) || r.admin_id == Some(id))
    }

    fn customer_has_billing(&self, id: i64) -> bool {
        self.quotations.values().any(|q| q.customer_id == id)
            || self.invoices.values().any(|i| i.customer_id == id)
    }
}

/// Applies a customer changeset field by field, as the SQL `UPDATE` would.
fn apply_customer_changes(customer: &mut Customer, changes: CustomerChanges) {
    if let Some(v) = changes.name {
        customer.name = v;
    }
    if let Some(v) = changes.email {
        customer.email = v;
    }
    if let Some(v) = changes.phone_number {
        customer.phone_number = Some(v);
    }
    if let Some(v) = changes.address {
        customer.address = Some(v);
    }
    if let Some(v) = changes.city {
        customer.city = Some(v);
    }
    if let Some(v) = changes.state {
        customer.state = Some(v);
    }
    if let Some(v) = changes.zip_code {
        customer.zip_code = Some(v);
    }
    if let Some(v) = changes.country {
        customer.country = Some(v);
    }
    if let Some(v) = changes.website {
        customer.website = Some(v);
    }
    if let Some(v) = changes.customer_type {
        customer.customer_type = v;
    }
    if let Some(v) = changes.status {
        customer.status = v;
    }
    if let Some(v) = changes.password_hash {
        customer.password_hash = Some(v);
    }
    if let Some(v) = changes.has_password {
        customer.has_password = v;
    }
    customer.updated_at = changes.updated_at.unwrap_or_else(Utc::now);
}

/// Process-local store. All tables sit behind a single lock so that
/// multi-table operations such as resolving a ticket are atomic.
#[derive(Default)]
pub struct MemoryStore {
    data: TokioMutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn create_employee(&self, new: NewEmployee) -> Result<Employee> {
        let mut data = self.data.lock().await;
        if data.employee_email_taken(&new.email, None) {
            return Err(StoreError::Conflict(format!(
                "Email already registered: {}",
                new.email
            )));
        }
        let id = data.next_id();
        let employee = Employee {
            id,
            name: new.name,
            email: new.email,
            phone_number: new.phone_number,
            address: new.address,
            city: new.city,
            state: new.state,
            role: new.role,
            status: new.status,
            password_hash: new.password_hash,
            has_password: new.has_password,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        data.employees.insert(id, employee.clone());
        Ok(employee)
    }

    async fn list_employees(&self) -> Result<Vec<Employee>> {
        let data = self.data.lock().await;
        Ok(data.employees.values().cloned().collect())
    }

    async fn find_employee(&self, id: i64) -> Result<Option<Employee>> {
        let data = self.data.lock().await;
        Ok(data.employees.get(&id).cloned())
    }

    async fn find_employee_by_email(&self, email: &str) -> Result<Option<Employee>> {
        let data = self.data.lock().await;
        Ok(data
            .employees
            .values()
            .find(|e| e.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_employees(&self, ids: &[i64]) -> Result<Vec<Employee>> {
        let data = self.data.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.employees.get(id).cloned())
            .collect())
    }

    async fn update_employee(
        &self,
        id: i64,
        changes: EmployeeChanges,
    ) -> Result<Option<Employee>> {
        let mut data = self.data.lock().await;
        if let Some(email) = &changes.email {
            if data.employee_email_taken(email, Some(id)) {
                return Err(StoreError::Conflict(format!(
                    "Email already registered: {email}"
                )));
            }
        }
        let Some(employee) = data.employees.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = changes.name {
            employee.name = v;
        }
        if let Some(v) = changes.email {
            employee.email = v;
        }
        if let Some(v) = changes.phone_number {
            employee.phone_number = Some(v);
        }
        if let Some(v) = changes.address {
            employee.address = Some(v);
        }
        if let Some(v) = changes.city {
            employee.city = Some(v);
        }
        if let Some(v) = changes.state {
            employee.state = Some(v);
        }
        if let Some(v) = changes.role {
            employee.role = v;
        }
        if let Some(v) = changes.status {
            employee.status = v;
        }
        if let Some(v) = changes.password_hash {
            employee.password_hash = Some(v);
        }
        if let Some(v) = changes.has_password {
            employee.has_password = v;
        }
        employee.updated_at = changes.updated_at.unwrap_or_else(Utc::now);
        Ok(Some(employee.clone()))
    }

    async fn delete_employee(&self, id: i64) -> Result<bool> {
        let mut data = self.data.lock().await;
        if !data.employees.contains_key(&id) {
            return Ok(false);
        }
        if data.employee_in_resolutions(id) {
            return Err(StoreError::employee_has_resolutions(id));
        }
        data.employees.remove(&id);
        for ticket in data.tickets.values_mut() {
            if ticket.employee_id == Some(id) {
                ticket.employee_id = None;
            }
        }
        for lead in data.leads.values_mut() {
            if lead.employee_id == Some(id) {
                lead.employee_id = None;
            }
        }
        for quotation in data.quotations.values_mut() {
            if quotation.employee_id == Some(id) {
                quotation.employee_id = None;
            }
        }
        Ok(true)
    }

    async fn create_customer(&self, new: NewCustomer) -> Result<Customer> {
        let mut data = self.data.lock().await;
        if data.customer_email_taken(&new.email, None) {
            return Err(StoreError::Conflict(format!(
                "Email already registered: {}",
                new.email
            )));
        }
        let id = data.next_id();
        let customer = Customer {
            id,
            name: new.name,
            email: new.email,
            phone_number: new.phone_number,
            address: new.address,
            city: new.city,
            state: new.state,
            zip_code: new.zip_code,
            country: new.country,
            website: new.website,
            customer_type: new.customer_type,
            status: new.status,
            password_hash: new.password_hash,
            has_password: new.has_password,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        data.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let data = self.data.lock().await;
        Ok(data.customers.values().cloned().collect())
    }

    async fn find_customer(&self, id: i64) -> Result<Option<Customer>> {
        let data = self.data.lock().await;
        Ok(data.customers.get(&id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let data = self.data.lock().await;
        Ok(data
            .customers
            .values()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_customer(
        &self,
        id: i64,
        changes: CustomerChanges,
    ) -> Result<Option<Customer>> {
        let mut data = self.data.lock().await;
        if let Some(email) = &changes.email {
            if data.customer_email_taken(email, Some(id)) {
                return Err(StoreError::Conflict(format!(
                    "Email already registered: {email}"
                )));
            }
        }
        let Some(customer) = data.customers.get_mut(&id) else {
            return Ok(None);
        };
        apply_customer_changes(customer, changes);
        Ok(Some(customer.clone()))
    }

    async fn claim_customer(&self, id: i64, changes: CustomerChanges) -> Result<Customer> {
        let mut data = self.data.lock().await;
        let customer = data
            .customers
            .get_mut(&id)
            .ok_or_else(|| StoreError::customer_not_found(id))?;
        if customer.has_password {
            return Err(StoreError::already_registered(id));
        }
        apply_customer_changes(customer, changes);
        Ok(customer.clone())
    }

    async fn delete_customer(&self, id: i64) -> Result<bool> {
        let mut data = self.data.lock().await;
        if !data.customers.contains_key(&id) {
            return Ok(false);
        }
        if data.customer_has_billing(id) {
            return Err(StoreError::customer_has_billing(id));
        }
        data.customers.remove(&id);
        for ticket in data.tickets.values_mut() {
            if ticket.customer_id == Some(id) {
                ticket.customer_id = None;
            }
        }
        for lead in data.leads.values_mut() {
            if lead.customer_id == Some(id) {
                lead.customer_id = None;
            }
        }
        Ok(true)
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let mut data = self.data.lock().await;
        if let Some(customer_id) = new.customer_id {
            if !data.customers.contains_key(&customer_id) {
                return Err(StoreError::customer_not_found(customer_id));
            }
        }
        if let Some(employee_id) = new.employee_id {
            if !data.employees.contains_key(&employee_id) {
                return Err(StoreError::employee_not_found(employee_id));
            }
        }
        let id = data.next_id();
        let ticket = Ticket {
            id,
            title: new.title,
            description: new.description,
            status: new.status,
            priority: new.priority,
            customer_id: new.customer_id,
            employee_id: new.employee_id,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        data.tickets.insert(id, ticket.clone());
        Ok(ticket)
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let data = self.data.lock().await;
        let rows = data
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        Ok(newest_first(rows, |t: &Ticket| (t.created_at, t.id)))
    }

    async fn find_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let data = self.data.lock().await;
        Ok(data.tickets.get(&id).cloned())
    }

    async fn update_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
    ) -> Result<Option<Ticket>> {
        let mut data = self.data.lock().await;
        let Some(ticket) = data.tickets.get_mut(&id) else {
            return Ok(None);
        };
        if ticket.status != status && !ticket.status.can_transition_to(status) {
            return Err(StoreError::invalid_transition(id, ticket.status, status));
        }
        ticket.status = status;
        ticket.updated_at = Utc::now();
        Ok(Some(ticket.clone()))
    }

    async fn assign_ticket(&self, id: i64, employee_id: i64) -> Result<Option<Ticket>> {
        let mut data = self.data.lock().await;
        if !data.employees.contains_key(&employee_id) {
            return Err(StoreError::employee_not_found(employee_id));
        }
        Ok(data.tickets.get_mut(&id).map(|ticket| {
            ticket.employee_id = Some(employee_id);
            ticket.updated_at = Utc::now();
            ticket.clone()
        }))
    }

    async fn delete_ticket(&self, id: i64) -> Result<bool> {
        let mut data = self.data.lock().await;
        if data
            .resolutions
            .values()
            .any(|r| r.original_ticket_id == id)
        {
            return Err(StoreError::Conflict(format!(
                "Ticket {id} has a resolution record and cannot be deleted"
            )));
        }
        Ok(data.tickets.remove(&id).is_some())
    }

    async fn count_tickets_by_status(&self) -> Result<Vec<StatusCount>> {
        let data = self.data.lock().await;
        Ok(TicketStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: data.tickets.values().filter(|t| t.status == status).count() as i64,
            })
            .collect())
    }

    async fn resolve_ticket(&self, new: NewResolvedTicket) -> Result<ResolvedTicket> {
        let mut data = self.data.lock().await;

        let ticket_id = new.original_ticket_id;
        let ticket_status = data
            .tickets
            .get(&ticket_id)
            .map(|t| t.status)
            .ok_or_else(|| StoreError::ticket_not_found(ticket_id))?;

        if let Some(employee_id) = new.employee_id {
            if !data.employees.contains_key(&employee_id) {
                return Err(StoreError::employee_not_found(employee_id));
            }
        }
        if let Some(admin_id) = new.admin_id {
            if !data.employees.contains_key(&admin_id) {
                return Err(StoreError::admin_not_found(admin_id));
            }
        }

        if !ticket_status.is_resolvable()
            || data
                .resolutions
                .values()
                .any(|r| r.original_ticket_id == ticket_id)
        {
            return Err(StoreError::AlreadyResolved(ticket_id));
        }

        let id = data.next_id();
        let resolution = ResolvedTicket {
            id,
            title: new.title,
            ticket_description: new.ticket_description,
            resolve_description: new.resolve_description,
            original_ticket_id: ticket_id,
            employee_id: new.employee_id,
            admin_id: new.admin_id,
            resolved_at: new.resolved_at,
        };
        data.resolutions.insert(id, resolution.clone());
        if let Some(ticket) = data.tickets.get_mut(&ticket_id) {
            ticket.status = TicketStatus::Resolved;
            ticket.updated_at = new.resolved_at;
        }
        Ok(resolution)
    }

    async fn list_resolutions(&self) -> Result<Vec<ResolvedTicket>> {
        let data = self.data.lock().await;
        let rows = data.resolutions.values().cloned().collect();
        Ok(newest_first(rows, |r: &ResolvedTicket| (r.resolved_at, r.id)))
    }

    async fn list_resolutions_by_employee(
        &self,
        employee_id: i64,
    ) -> Result<Vec<ResolvedTicket>> {
        let data = self.data.lock().await;
        let rows = data
            .resolutions
            .values()
            .filter(|r| r.employee_id == Some(employee_id))
            .cloned()
            .collect();
        Ok(newest_first(rows, |r: &ResolvedTicket| (r.resolved_at, r.id)))
    }

    async fn list_resolutions_by_admin(&self, admin_id: i64) -> Result<Vec<ResolvedTicket>> {
        let data = self.data.lock().await;
        let rows = data
            .resolutions
            .values()
            .filter(|r| r.admin_id == Some(admin_id))
            .cloned()
            .collect();
        Ok(newest_first(rows, |r: &ResolvedTicket| (r.resolved_at, r.id)))
    }

    async fn find_resolution(&self, id: i64) -> Result<Option<ResolvedTicket>> {
        let data = self.data.lock().await;
        Ok(data.resolutions.get(&id).cloned())
    }

    async fn find_resolution_by_ticket(&self, ticket_id: i64) -> Result<Option<ResolvedTicket>> {
        let data = self.data.lock().await;
        Ok(data
            .resolutions
            .values()
            .find(|r| r.original_ticket_id == ticket_id)
            .cloned())
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category> {
        let mut data = self.data.lock().await;
        if data.category_name_taken(&new.name, None) {
            return Err(StoreError::Conflict(format!(
                "Category already exists: {}",
                new.name
            )));
        }
        let id = data.next_id();
        let category = Category {
            id,
            name: new.name,
            description: new.description,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        data.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let data = self.data.lock().await;
        let mut rows: Vec<Category> = data.categories.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find_category(&self, id: i64) -> Result<Option<Category>> {
        let data = self.data.lock().await;
        Ok(data.categories.get(&id).cloned())
    }

    async fn search_categories(&self, name: &str) -> Result<Vec<Category>> {
        let needle = name.to_lowercase();
        let data = self.data.lock().await;
        let mut rows: Vec<Category> = data
            .categories
            .values()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn update_category(
        &self,
        id: i64,
        changes: CategoryChanges,
    ) -> Result<Option<Category>> {
        let mut data = self.data.lock().await;
        if let Some(name) = &changes.name {
            if data.category_name_taken(name, Some(id)) {
                return Err(StoreError::Conflict(format!(
                    "Category already exists: {name}"
                )));
            }
        }
        let Some(category) = data.categories.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = changes.name {
            category.name = v;
        }
        if let Some(v) = changes.description {
            category.description = Some(v);
        }
        category.updated_at = changes.updated_at.unwrap_or_else(Utc::now);
        Ok(Some(category.clone()))
    }

    async fn delete_category(&self, id: i64) -> Result<bool> {
        let mut data = self.data.lock().await;
        Ok(data.categories.remove(&id).is_some())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::{ActivityStatus, Role, TicketPriority};

    pub(super) fn employee(email: &str, role: Role) -> NewEmployee {
        let now = Utc::now();
        NewEmployee {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
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
        }
    }

    fn ticket(title: &str) -> NewTicket {
        let now = Utc::now();
        NewTicket {
            title: title.to_string(),
            description: Some("printer on fire".to_string()),
            status: TicketStatus::Open,
            priority: TicketPriority::High,
            customer_id: None,
            employee_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn resolution(ticket_id: i64, employee_id: i64, admin_id: i64) -> NewResolvedTicket {
        NewResolvedTicket {
            title: "Printer fixed".to_string(),
            ticket_description: None,
            resolve_description: "Replaced fuser".to_string(),
            original_ticket_id: ticket_id,
            employee_id: Some(employee_id),
            admin_id: Some(admin_id),
            resolved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_resolve_flips_ticket_status() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let admin = store
            .create_employee(employee("a@x.io", Role::Admin))
            .await
            .expect("admin");
        let t = store.create_ticket(ticket("Printer")).await.expect("ticket");

        let rt = store
            .resolve_ticket(resolution(t.id, emp.id, admin.id))
            .await
            .expect("resolve");
        assert_eq!(rt.original_ticket_id, t.id);

        let t = store.find_ticket(t.id).await.expect("find").expect("exists");
        assert_eq!(t.status, TicketStatus::Resolved);
    }

    #[tokio::test]
    async fn test_resolve_missing_ticket_writes_nothing() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let admin = store
            .create_employee(employee("a@x.io", Role::Admin))
            .await
            .expect("admin");

        let err = store
            .resolve_ticket(resolution(9999, emp.id, admin.id))
            .await
            .expect_err("missing ticket");
        assert_eq!(err, StoreError::ticket_not_found(9999));
        assert!(store.list_resolutions().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_resolve_missing_admin_leaves_ticket_untouched() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let t = store.create_ticket(ticket("Printer")).await.expect("ticket");

        let err = store
            .resolve_ticket(resolution(t.id, emp.id, 4242))
            .await
            .expect_err("missing admin");
        assert!(matches!(err, StoreError::NotFound(_)));

        let t = store.find_ticket(t.id).await.expect("find").expect("exists");
        assert_eq!(t.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn test_second_resolution_is_rejected() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let admin = store
            .create_employee(employee("a@x.io", Role::Admin))
            .await
            .expect("admin");
        let t = store.create_ticket(ticket("Printer")).await.expect("ticket");

        store
            .resolve_ticket(resolution(t.id, emp.id, admin.id))
            .await
            .expect("first");
        let err = store
            .resolve_ticket(resolution(t.id, emp.id, admin.id))
            .await
            .expect_err("second");
        assert_eq!(err, StoreError::AlreadyResolved(t.id));
        assert_eq!(store.list_resolutions().await.expect("list").len(), 1);
    }

    pub(super) fn customer(email: &str) -> NewCustomer {
        let now = Utc::now();
        NewCustomer {
            name: "Ana".to_string(),
            email: email.to_string(),
            phone_number: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            country: None,
            website: None,
            customer_type: Default::default(),
            status: ActivityStatus::Active,
            password_hash: None,
            has_password: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_any_employee_may_sign_off_as_admin() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let t = store.create_ticket(ticket("Printer")).await.expect("ticket");

        let rt = store
            .resolve_ticket(resolution(t.id, emp.id, emp.id))
            .await
            .expect("resolve with a non-admin sign-off");
        assert_eq!(rt.admin_id, Some(emp.id));
        let t = store.find_ticket(t.id).await.expect("find").expect("exists");
        assert_eq!(t.status, TicketStatus::Resolved);
    }

    #[tokio::test]
    async fn test_employee_on_resolution_cannot_be_deleted() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let admin = store
            .create_employee(employee("a@x.io", Role::Admin))
            .await
            .expect("admin");
        let t = store.create_ticket(ticket("Printer")).await.expect("ticket");
        let rt = store
            .resolve_ticket(resolution(t.id, emp.id, admin.id))
            .await
            .expect("resolve");

        for id in [emp.id, admin.id] {
            let err = store.delete_employee(id).await.expect_err("referenced");
            assert_eq!(err, StoreError::employee_has_resolutions(id));
        }
        let kept = store
            .find_resolution(rt.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(kept, rt);
        assert!(store.find_employee(emp.id).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn test_delete_employee_unassigns_tickets() {
        let store = MemoryStore::new();
        let emp = store
            .create_employee(employee("e@x.io", Role::Employee))
            .await
            .expect("employee");
        let t = store.create_ticket(ticket("Printer")).await.expect("ticket");
        store.assign_ticket(t.id, emp.id).await.expect("assign");

        assert!(store.delete_employee(emp.id).await.expect("delete"));
        let t = store.find_ticket(t.id).await.expect("find").expect("exists");
        assert_eq!(t.employee_id, None);
        assert!(!store.delete_employee(emp.id).await.expect("second delete"));
    }

    #[tokio::test]
    async fn test_claim_customer_only_once() {
        let store = MemoryStore::new();
        let c = store.create_customer(customer("ana@x.io")).await.expect("customer");
        let claim = |hash: &str| CustomerChanges {
            password_hash: Some(hash.to_string()),
            has_password: Some(true),
            ..CustomerChanges::default()
        };

        let claimed = store.claim_customer(c.id, claim("h1")).await.expect("claim");
        assert!(claimed.has_password);

        let err = store
            .claim_customer(c.id, claim("h2"))
            .await
            .expect_err("second claim");
        assert_eq!(err, StoreError::already_registered(c.id));
        let c = store.find_customer(c.id).await.expect("find").expect("exists");
        assert_eq!(c.password_hash.as_deref(), Some("h1"));

        let err = store.claim_customer(999, claim("h3")).await.expect_err("unknown");
        assert_eq!(err, StoreError::customer_not_found(999));
    }

    #[tokio::test]
    async fn test_duplicate_customer_email() {
        let store = MemoryStore::new();
        let new = customer("ana@x.io");
        store.create_customer(new.clone()).await.expect("first");
        let err = store
            .create_customer(NewCustomer {
                email: "ANA@x.io".to_string(),
                ..new
            })
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_category_search_is_case_insensitive() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for name in ["Hardware", "Software", "Billing"] {
            store
                .create_category(NewCategory {
                    name: name.to_string(),
                    description: None,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("category");
        }
        let found = store.search_categories("WARE").await.expect("search");
        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Hardware", "Software"]);
    }
}
