mod sales;

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::error;

use super::{CrmStore, Result, StatusCount, StoreError};
use crate::core::shared::enums::TicketStatus;
use crate::core::shared::models::{
    Category, CategoryChanges, Customer, CustomerChanges, Employee, EmployeeChanges, NewCategory,
    NewCustomer, NewEmployee, NewResolvedTicket, NewTicket, ResolvedTicket, Ticket, TicketFilter,
};
use crate::core::shared::schema::{
    categories, customers, employees, invoices, quotations, resolved_tickets, tickets,
};
use crate::core::shared::utils::DbPool;

diesel::define_sql_function!(fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text);

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            DieselError::NotFound => Self::NotFound("Record not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside `LIKE`.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// PostgreSQL backend. Diesel is synchronous, so every call checks a
/// connection out of the r2d2 pool inside `spawn_blocking`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                error!("DB connection error: {e}");
                StoreError::Pool(e.to_string())
            })?;
            work(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Blocking task failed: {e}")))?
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn create_employee(&self, new: NewEmployee) -> Result<Employee> {
        self.run(move |conn| {
            diesel::insert_into(employees::table)
                .values(&new)
                .returning(Employee::as_returning())
                .get_result(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_employees(&self) -> Result<Vec<Employee>> {
        self.run(|conn| {
            employees::table
                .order(employees::id.asc())
                .select(Employee::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_employee(&self, id: i64) -> Result<Option<Employee>> {
        self.run(move |conn| {
            employees::table
                .find(id)
                .select(Employee::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_employee_by_email(&self, email: &str) -> Result<Option<Employee>> {
        let email = email.to_lowercase();
        self.run(move |conn| {
            employees::table
                .filter(lower(employees::email).eq(email))
                .select(Employee::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_employees(&self, ids: &[i64]) -> Result<Vec<Employee>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.run(move |conn| {
            employees::table
                .filter(employees::id.eq_any(ids))
                .select(Employee::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn update_employee(
        &self,
        id: i64,
        mut changes: EmployeeChanges,
    ) -> Result<Option<Employee>> {
        changes.updated_at.get_or_insert_with(Utc::now);
        self.run(move |conn| {
            diesel::update(employees::table.find(id))
                .set(&changes)
                .returning(Employee::as_returning())
                .get_result(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn delete_employee(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let referenced: Option<i64> = resolved_tickets::table
                    .filter(
                        resolved_tickets::employee_id
                            .eq(id)
                            .or(resolved_tickets::admin_id.eq(id)),
                    )
                    .select(resolved_tickets::id)
                    .first(conn)
                    .optional()?;
                if referenced.is_some() {
                    return Err(StoreError::employee_has_resolutions(id));
                }
                // The ON DELETE RESTRICT keys still catch a resolution that
                // lands between the check and the delete.
                let affected = diesel::delete(employees::table.find(id))
                    .execute(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                            StoreError::employee_has_resolutions(id)
                        }
                        other => StoreError::from(other),
                    })?;
                Ok(affected > 0)
            })
        })
        .await
    }

    async fn create_customer(&self, new: NewCustomer) -> Result<Customer> {
        self.run(move |conn| {
            diesel::insert_into(customers::table)
                .values(&new)
                .returning(Customer::as_returning())
                .get_result(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.run(|conn| {
            customers::table
                .order(customers::id.asc())
                .select(Customer::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_customer(&self, id: i64) -> Result<Option<Customer>> {
        self.run(move |conn| {
            customers::table
                .find(id)
                .select(Customer::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let email = email.to_lowercase();
        self.run(move |conn| {
            customers::table
                .filter(lower(customers::email).eq(email))
                .select(Customer::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn update_customer(
        &self,
        id: i64,
        mut changes: CustomerChanges,
    ) -> Result<Option<Customer>> {
        changes.updated_at.get_or_insert_with(Utc::now);
        self.run(move |conn| {
            diesel::update(customers::table.find(id))
                .set(&changes)
                .returning(Customer::as_returning())
                .get_result(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn claim_customer(&self, id: i64, mut changes: CustomerChanges) -> Result<Customer> {
        changes.updated_at.get_or_insert_with(Utc::now);
        self.run(move |conn| {
            // The password-less condition is part of the UPDATE itself, so
            // of two concurrent claims exactly one matches the row.
            let claimed = diesel::update(
                customers::table
                    .find(id)
                    .filter(customers::has_password.eq(false)),
            )
            .set(&changes)
            .returning(Customer::as_returning())
            .get_result(conn)
            .optional()?;
            if let Some(customer) = claimed {
                return Ok(customer);
            }
            let exists: Option<i64> = customers::table
                .find(id)
                .select(customers::id)
                .first(conn)
                .optional()?;
            match exists {
                Some(_) => Err(StoreError::already_registered(id)),
                None => Err(StoreError::customer_not_found(id)),
            }
        })
        .await
    }

    async fn delete_customer(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let quoted: Option<i64> = quotations::table
                    .filter(quotations::customer_id.eq(id))
                    .select(quotations::id)
                    .first(conn)
                    .optional()?;
                let invoiced: Option<i64> = invoices::table
                    .filter(invoices::customer_id.eq(id))
                    .select(invoices::id)
                    .first(conn)
                    .optional()?;
                if quoted.is_some() || invoiced.is_some() {
                    return Err(StoreError::customer_has_billing(id));
                }
                let affected = diesel::delete(customers::table.find(id))
                    .execute(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                            StoreError::customer_has_billing(id)
                        }
                        other => StoreError::from(other),
                    })?;
                Ok(affected > 0)
            })
        })
        .await
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                if let Some(customer_id) = new.customer_id {
                    let exists: Option<i64> = customers::table
                        .find(customer_id)
                        .select(customers::id)
                        .first(conn)
                        .optional()?;
                    if exists.is_none() {
                        return Err(StoreError::customer_not_found(customer_id));
                    }
                }
                if let Some(employee_id) = new.employee_id {
                    let exists: Option<i64> = employees::table
                        .find(employee_id)
                        .select(employees::id)
                        .first(conn)
                        .optional()?;
                    if exists.is_none() {
                        return Err(StoreError::employee_not_found(employee_id));
                    }
                }
                diesel::insert_into(tickets::table)
                    .values(&new)
                    .returning(Ticket::as_returning())
                    .get_result(conn)
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut query = tickets::table.select(Ticket::as_select()).into_boxed();
            if let Some(status) = filter.status {
                query = query.filter(tickets::status.eq(status));
            }
            if let Some(customer_id) = filter.customer_id {
                query = query.filter(tickets::customer_id.eq(customer_id));
            }
            if let Some(employee_id) = filter.employee_id {
                query = query.filter(tickets::employee_id.eq(employee_id));
            }
            query
                .order((tickets::created_at.desc(), tickets::id.desc()))
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        self.run(move |conn| {
            tickets::table
                .find(id)
                .select(Ticket::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn update_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
    ) -> Result<Option<Ticket>> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let current: Option<TicketStatus> = tickets::table
                    .find(id)
                    .select(tickets::status)
                    .for_update()
                    .first(conn)
                    .optional()?;
                let Some(current) = current else {
                    return Ok(None);
                };
                if current != status && !current.can_transition_to(status) {
                    return Err(StoreError::invalid_transition(id, current, status));
                }
                diesel::update(tickets::table.find(id))
                    .set((tickets::status.eq(status), tickets::updated_at.eq(Utc::now())))
                    .returning(Ticket::as_returning())
                    .get_result(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn assign_ticket(&self, id: i64, employee_id: i64) -> Result<Option<Ticket>> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let exists: Option<i64> = employees::table
                    .find(employee_id)
                    .select(employees::id)
                    .first(conn)
                    .optional()?;
                if exists.is_none() {
                    return Err(StoreError::employee_not_found(employee_id));
                }
                diesel::update(tickets::table.find(id))
                    .set((
                        tickets::employee_id.eq(Some(employee_id)),
                        tickets::updated_at.eq(Utc::now()),
                    ))
                    .returning(Ticket::as_returning())
                    .get_result(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn delete_ticket(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let resolved: Option<i64> = resolved_tickets::table
                    .filter(resolved_tickets::original_ticket_id.eq(id))
                    .select(resolved_tickets::id)
                    .first(conn)
                    .optional()?;
                if resolved.is_some() {
                    return Err(StoreError::Conflict(format!(
                        "Ticket {id} has a resolution record and cannot be deleted"
                    )));
                }
                let affected = diesel::delete(tickets::table.find(id)).execute(conn)?;
                Ok(affected > 0)
            })
        })
        .await
    }

    async fn count_tickets_by_status(&self) -> Result<Vec<StatusCount>> {
        let rows: Vec<(TicketStatus, i64)> = self
            .run(|conn| {
                tickets::table
                    .group_by(tickets::status)
                    .select((tickets::status, count_star()))
                    .load(conn)
                    .map_err(StoreError::from)
            })
            .await?;

        Ok(TicketStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: rows
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map_or(0, |(_, c)| *c),
            })
            .collect())
    }

    async fn resolve_ticket(&self, new: NewResolvedTicket) -> Result<ResolvedTicket> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let ticket_id = new.original_ticket_id;

                // Row lock serialises concurrent resolutions of the same ticket.
                let status: TicketStatus = tickets::table
                    .find(ticket_id)
                    .select(tickets::status)
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::ticket_not_found(ticket_id))?;

                if let Some(employee_id) = new.employee_id {
                    let exists: Option<i64> = employees::table
                        .find(employee_id)
                        .select(employees::id)
                        .first(conn)
                        .optional()?;
                    if exists.is_none() {
                        return Err(StoreError::employee_not_found(employee_id));
                    }
                }
                if let Some(admin_id) = new.admin_id {
                    let exists: Option<i64> = employees::table
                        .find(admin_id)
                        .select(employees::id)
                        .first(conn)
                        .optional()?;
                    if exists.is_none() {
                        return Err(StoreError::admin_not_found(admin_id));
                    }
                }

                let existing: Option<i64> = resolved_tickets::table
                    .filter(resolved_tickets::original_ticket_id.eq(ticket_id))
                    .select(resolved_tickets::id)
                    .first(conn)
                    .optional()?;
                if existing.is_some() || !status.is_resolvable() {
                    return Err(StoreError::AlreadyResolved(ticket_id));
                }

                let resolution = diesel::insert_into(resolved_tickets::table)
                    .values(&new)
                    .returning(ResolvedTicket::as_returning())
                    .get_result(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            StoreError::AlreadyResolved(ticket_id)
                        }
                        other => StoreError::from(other),
                    })?;

                diesel::update(tickets::table.find(ticket_id))
                    .set((
                        tickets::status.eq(TicketStatus::Resolved),
                        tickets::updated_at.eq(new.resolved_at),
                    ))
                    .execute(conn)?;

                Ok(resolution)
            })
        })
        .await
    }

    async fn list_resolutions(&self) -> Result<Vec<ResolvedTicket>> {
        self.run(|conn| {
            resolved_tickets::table
                .order((resolved_tickets::resolved_at.desc(), resolved_tickets::id.desc()))
                .select(ResolvedTicket::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_resolutions_by_employee(
        &self,
        employee_id: i64,
    ) -> Result<Vec<ResolvedTicket>> {
        self.run(move |conn| {
            resolved_tickets::table
                .filter(resolved_tickets::employee_id.eq(employee_id))
                .order((resolved_tickets::resolved_at.desc(), resolved_tickets::id.desc()))
                .select(ResolvedTicket::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_resolutions_by_admin(&self, admin_id: i64) -> Result<Vec<ResolvedTicket>> {
        self.run(move |conn| {
            resolved_tickets::table
                .filter(resolved_tickets::admin_id.eq(admin_id))
                .order((resolved_tickets::resolved_at.desc(), resolved_tickets::id.desc()))
                .select(ResolvedTicket::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_resolution(&self, id: i64) -> Result<Option<ResolvedTicket>> {
        self.run(move |conn| {
            resolved_tickets::table
                .find(id)
                .select(ResolvedTicket::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_resolution_by_ticket(&self, ticket_id: i64) -> Result<Option<ResolvedTicket>> {
        self.run(move |conn| {
            resolved_tickets::table
                .filter(resolved_tickets::original_ticket_id.eq(ticket_id))
                .select(ResolvedTicket::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category> {
        self.run(move |conn| {
            diesel::insert_into(categories::table)
                .values(&new)
                .returning(Category::as_returning())
                .get_result(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.run(|conn| {
            categories::table
                .order(categories::name.asc())
                .select(Category::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_category(&self, id: i64) -> Result<Option<Category>> {
        self.run(move |conn| {
            categories::table
                .find(id)
                .select(Category::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn search_categories(&self, name: &str) -> Result<Vec<Category>> {
        let pattern = like_pattern(name);
        self.run(move |conn| {
            categories::table
                .filter(categories::name.ilike(pattern))
                .order(categories::name.asc())
                .select(Category::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn update_category(
        &self,
        id: i64,
        mut changes: CategoryChanges,
    ) -> Result<Option<Category>> {
        changes.updated_at.get_or_insert_with(Utc::now);
        self.run(move |conn| {
            diesel::update(categories::table.find(id))
                .set(&changes)
                .returning(Category::as_returning())
                .get_result(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn delete_category(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            let affected = diesel::delete(categories::table.find(id)).execute(conn)?;
            Ok(affected > 0)
        })
        .await
    }

    async fn ping(&self) -> bool {
        self.run(|conn| {
            diesel::sql_query("SELECT 1")
                .execute(conn)
                .map_err(StoreError::from)
        })
        .await
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ware"), "%ware%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        struct Info;
        impl diesel::result::DatabaseErrorInformation for Info {
            fn message(&self) -> &str {
                "duplicate key value violates unique constraint \"customers_email_key\""
            }
            fn details(&self) -> Option<&str> {
                None
            }
            fn hint(&self) -> Option<&str> {
                None
            }
            fn table_name(&self) -> Option<&str> {
                Some("customers")
            }
            fn column_name(&self) -> Option<&str> {
                None
            }
            fn constraint_name(&self) -> Option<&str> {
                Some("customers_email_key")
            }
            fn statement_position(&self) -> Option<i32> {
                None
            }
        }

        let err = StoreError::from(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(Info),
        ));
        assert!(matches!(err, StoreError::Conflict(ref m) if m.contains("customers_email_key")));
    }
}
