use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, sum};
use diesel::prelude::*;

use super::{lower, PgStore};
use crate::core::shared::enums::{InvoiceStatus, LeadSource, LeadStatus, QuotationStage};
use crate::core::shared::models::{
    Customer, Invoice, InvoiceItem, InvoiceLine, InvoiceWithItems, Lead, LeadChanges, LeadFilter,
    NewCustomer, NewInvoice, NewInvoiceItem, NewLead, NewQuotation, Quotation, QuotationChanges,
};
use crate::core::shared::schema::{
    customers, employees, invoice_items, invoices, leads, quotations,
};
use crate::core::storage::{MonthWindow, Result, SalesStore, SalesSummary, StoreError};

fn ensure_employee(conn: &mut PgConnection, employee_id: Option<i64>) -> Result<()> {
    let Some(employee_id) = employee_id else {
        return Ok(());
    };
    let exists: Option<i64> = employees::table
        .find(employee_id)
        .select(employees::id)
        .first(conn)
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::employee_not_found(employee_id)),
    }
}

fn ensure_customer(conn: &mut PgConnection, customer_id: i64) -> Result<()> {
    let exists: Option<i64> = customers::table
        .find(customer_id)
        .select(customers::id)
        .first(conn)
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::customer_not_found(customer_id)),
    }
}

/// Expands grouped counts to every variant, zeros included.
fn fill_counts<E: Copy + PartialEq>(all: &[E], rows: &[(E, i64)]) -> Vec<(E, i64)> {
    all.iter()
        .map(|&e| {
            let count = rows.iter().find(|(k, _)| *k == e).map_or(0, |(_, c)| *c);
            (e, count)
        })
        .collect()
}

fn load_items(conn: &mut PgConnection, invoice_id: i64) -> Result<Vec<InvoiceItem>> {
    invoice_items::table
        .filter(invoice_items::invoice_id.eq(invoice_id))
        .order(invoice_items::position.asc())
        .select(InvoiceItem::as_select())
        .load(conn)
        .map_err(StoreError::from)
}

#[async_trait]
impl SalesStore for PgStore {
    async fn create_lead(&self, new: NewLead) -> Result<Lead> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                ensure_employee(conn, new.employee_id)?;
                diesel::insert_into(leads::table)
                    .values(&new)
                    .returning(Lead::as_returning())
                    .get_result(conn)
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut query = leads::table.select(Lead::as_select()).into_boxed();
            query = if filter.deleted {
                query.filter(leads::deleted_at.is_not_null())
            } else {
                query.filter(leads::deleted_at.is_null())
            };
            if let Some(status) = filter.status {
                query = query.filter(leads::status.eq(status));
            }
            if let Some(source) = filter.source {
                query = query.filter(leads::source.eq(source));
            }
            if let Some(employee_id) = filter.employee_id {
                query = query.filter(leads::employee_id.eq(employee_id));
            }
            query
                .order((leads::created_at.desc(), leads::id.desc()))
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_lead(&self, id: i64) -> Result<Option<Lead>> {
        self.run(move |conn| {
            leads::table
                .find(id)
                .select(Lead::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn update_lead(&self, id: i64, mut changes: LeadChanges) -> Result<Option<Lead>> {
        changes.updated_at.get_or_insert_with(Utc::now);
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                ensure_employee(conn, changes.employee_id)?;
                diesel::update(leads::table.find(id).filter(leads::deleted_at.is_null()))
                    .set(&changes)
                    .returning(Lead::as_returning())
                    .get_result(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn delete_lead(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.run(move |conn| {
            let affected =
                diesel::update(leads::table.find(id).filter(leads::deleted_at.is_null()))
                    .set((leads::deleted_at.eq(Some(at)), leads::updated_at.eq(at)))
                    .execute(conn)?;
            Ok(affected > 0)
        })
        .await
    }

    async fn restore_lead(&self, id: i64) -> Result<Option<Lead>> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let restored = diesel::update(
                    leads::table
                        .find(id)
                        .filter(leads::deleted_at.is_not_null()),
                )
                .set((
                    leads::deleted_at.eq(None::<DateTime<Utc>>),
                    leads::updated_at.eq(Utc::now()),
                ))
                .returning(Lead::as_returning())
                .get_result(conn)
                .optional()?;
                match restored {
                    Some(lead) => Ok(Some(lead)),
                    None => leads::table
                        .find(id)
                        .select(Lead::as_select())
                        .first(conn)
                        .optional()
                        .map_err(StoreError::from),
                }
            })
        })
        .await
    }

    async fn convert_lead(&self, id: i64, new: NewCustomer) -> Result<(Lead, Customer)> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let status: LeadStatus = leads::table
                    .find(id)
                    .filter(leads::deleted_at.is_null())
                    .select(leads::status)
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| StoreError::lead_not_found(id))?;
                if status == LeadStatus::Converted {
                    return Err(StoreError::Conflict(format!(
                        "Lead {id} has already been converted"
                    )));
                }

                let existing: Option<Customer> = customers::table
                    .filter(lower(customers::email).eq(new.email.to_lowercase()))
                    .select(Customer::as_select())
                    .first(conn)
                    .optional()?;
                let customer = match existing {
                    Some(customer) => customer,
                    None => diesel::insert_into(customers::table)
                        .values(&new)
                        .returning(Customer::as_returning())
                        .get_result(conn)?,
                };

                let lead = diesel::update(leads::table.find(id))
                    .set((
                        leads::status.eq(LeadStatus::Converted),
                        leads::customer_id.eq(Some(customer.id)),
                        leads::updated_at.eq(Utc::now()),
                    ))
                    .returning(Lead::as_returning())
                    .get_result(conn)?;
                Ok((lead, customer))
            })
        })
        .await
    }

    async fn create_quotation(&self, new: NewQuotation) -> Result<Quotation> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                ensure_customer(conn, new.customer_id)?;
                ensure_employee(conn, new.employee_id)?;
                diesel::insert_into(quotations::table)
                    .values(&new)
                    .returning(Quotation::as_returning())
                    .get_result(conn)
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn list_quotations(&self, stage: Option<QuotationStage>) -> Result<Vec<Quotation>> {
        self.run(move |conn| {
            let mut query = quotations::table.select(Quotation::as_select()).into_boxed();
            if let Some(stage) = stage {
                query = query.filter(quotations::stage.eq(stage));
            }
            query
                .order((quotations::created_at.desc(), quotations::id.desc()))
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_quotations_by_customer(&self, customer_id: i64) -> Result<Vec<Quotation>> {
        self.run(move |conn| {
            quotations::table
                .filter(quotations::customer_id.eq(customer_id))
                .order((quotations::created_at.desc(), quotations::id.desc()))
                .select(Quotation::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_quotation(&self, id: i64) -> Result<Option<Quotation>> {
        self.run(move |conn| {
            quotations::table
                .find(id)
                .select(Quotation::as_select())
                .first(conn)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn update_quotation(
        &self,
        id: i64,
        mut changes: QuotationChanges,
    ) -> Result<Option<Quotation>> {
        changes.updated_at.get_or_insert_with(Utc::now);
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let stage: Option<QuotationStage> = quotations::table
                    .find(id)
                    .select(quotations::stage)
                    .for_update()
                    .first(conn)
                    .optional()?;
                let Some(stage) = stage else {
                    return Ok(None);
                };
                if stage != QuotationStage::Draft {
                    return Err(StoreError::Conflict(format!(
                        "Quotation {id} is {stage} and can no longer be edited"
                    )));
                }
                ensure_employee(conn, changes.employee_id)?;
                diesel::update(quotations::table.find(id))
                    .set(&changes)
                    .returning(Quotation::as_returning())
                    .get_result(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
        })
        .await
    }

    async fn set_quotation_stage(
        &self,
        id: i64,
        stage: QuotationStage,
        at: DateTime<Utc>,
    ) -> Result<Option<Quotation>> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let current: Option<QuotationStage> = quotations::table
                    .find(id)
                    .select(quotations::stage)
                    .for_update()
                    .first(conn)
                    .optional()?;
                let Some(current) = current else {
                    return Ok(None);
                };
                if !current.can_transition_to(stage) {
                    return Err(StoreError::quotation_transition(id, current, stage));
                }
                let target = diesel::update(quotations::table.find(id));
                let updated = if stage == QuotationStage::Sent {
                    target
                        .set((
                            quotations::stage.eq(stage),
                            quotations::sent_at.eq(Some(at)),
                            quotations::updated_at.eq(at),
                        ))
                        .returning(Quotation::as_returning())
                        .get_result(conn)?
                } else {
                    target
                        .set((
                            quotations::stage.eq(stage),
                            quotations::responded_at.eq(Some(at)),
                            quotations::updated_at.eq(at),
                        ))
                        .returning(Quotation::as_returning())
                        .get_result(conn)?
                };
                Ok(Some(updated))
            })
        })
        .await
    }

    async fn delete_quotation(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let invoiced: Option<i64> = invoices::table
                    .filter(invoices::quotation_id.eq(id))
                    .select(invoices::id)
                    .first(conn)
                    .optional()?;
                if invoiced.is_some() {
                    return Err(StoreError::Conflict(format!(
                        "Quotation {id} has been invoiced and cannot be deleted"
                    )));
                }
                let affected = diesel::delete(quotations::table.find(id)).execute(conn)?;
                Ok(affected > 0)
            })
        })
        .await
    }

    async fn create_invoice(
        &self,
        new: NewInvoice,
        lines: Vec<InvoiceLine>,
    ) -> Result<InvoiceWithItems> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                ensure_customer(conn, new.customer_id)?;
                if let Some(quotation_id) = new.quotation_id {
                    let (stage, owner): (QuotationStage, i64) = quotations::table
                        .find(quotation_id)
                        .select((quotations::stage, quotations::customer_id))
                        .for_update()
                        .first(conn)
                        .optional()?
                        .ok_or_else(|| StoreError::quotation_not_found(quotation_id))?;
                    if stage != QuotationStage::Accepted || owner != new.customer_id {
                        return Err(StoreError::Conflict(format!(
                            "Quotation {quotation_id} is not an accepted quotation of customer {}",
                            new.customer_id
                        )));
                    }
                    let invoiced: Option<i64> = invoices::table
                        .filter(invoices::quotation_id.eq(quotation_id))
                        .select(invoices::id)
                        .first(conn)
                        .optional()?;
                    if invoiced.is_some() {
                        return Err(StoreError::Conflict(format!(
                            "Quotation {quotation_id} has already been invoiced"
                        )));
                    }
                }

                let invoice = diesel::insert_into(invoices::table)
                    .values(&new)
                    .returning(Invoice::as_returning())
                    .get_result(conn)?;

                let rows: Vec<NewInvoiceItem> = (1..)
                    .zip(lines)
                    .map(|(position, line)| NewInvoiceItem::from_line(invoice.id, position, line))
                    .collect();
                let items = if rows.is_empty() {
                    Vec::new()
                } else {
                    diesel::insert_into(invoice_items::table)
                        .values(&rows)
                        .returning(InvoiceItem::as_returning())
                        .get_results(conn)?
                };
                Ok(InvoiceWithItems { invoice, items })
            })
        })
        .await
    }

    async fn list_invoices(&self, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>> {
        self.run(move |conn| {
            let mut query = invoices::table.select(Invoice::as_select()).into_boxed();
            if let Some(status) = status {
                query = query.filter(invoices::status.eq(status));
            }
            query
                .order((invoices::created_at.desc(), invoices::id.desc()))
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_invoices_by_customer(&self, customer_id: i64) -> Result<Vec<Invoice>> {
        self.run(move |conn| {
            invoices::table
                .filter(invoices::customer_id.eq(customer_id))
                .order((invoices::created_at.desc(), invoices::id.desc()))
                .select(Invoice::as_select())
                .load(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_invoice(&self, id: i64) -> Result<Option<InvoiceWithItems>> {
        self.run(move |conn| {
            let invoice: Option<Invoice> = invoices::table
                .find(id)
                .select(Invoice::as_select())
                .first(conn)
                .optional()?;
            match invoice {
                Some(invoice) => {
                    let items = load_items(conn, invoice.id)?;
                    Ok(Some(InvoiceWithItems { invoice, items }))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn set_invoice_status(
        &self,
        id: i64,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Invoice>> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let current: Option<InvoiceStatus> = invoices::table
                    .find(id)
                    .select(invoices::status)
                    .for_update()
                    .first(conn)
                    .optional()?;
                let Some(current) = current else {
                    return Ok(None);
                };
                if !current.can_transition_to(status) {
                    return Err(StoreError::invoice_transition(id, current, status));
                }
                let target = diesel::update(invoices::table.find(id));
                let updated = match status {
                    InvoiceStatus::Sent => target
                        .set((
                            invoices::status.eq(status),
                            invoices::sent_at.eq(Some(at)),
                            invoices::updated_at.eq(at),
                        ))
                        .returning(Invoice::as_returning())
                        .get_result(conn)?,
                    InvoiceStatus::Paid => target
                        .set((
                            invoices::status.eq(status),
                            invoices::paid_at.eq(Some(at)),
                            invoices::updated_at.eq(at),
                        ))
                        .returning(Invoice::as_returning())
                        .get_result(conn)?,
                    InvoiceStatus::Pending | InvoiceStatus::Cancelled => target
                        .set((invoices::status.eq(status), invoices::updated_at.eq(at)))
                        .returning(Invoice::as_returning())
                        .get_result(conn)?,
                };
                Ok(Some(updated))
            })
        })
        .await
    }

    async fn delete_invoice(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let status: Option<InvoiceStatus> = invoices::table
                    .find(id)
                    .select(invoices::status)
                    .for_update()
                    .first(conn)
                    .optional()?;
                let Some(status) = status else {
                    return Ok(false);
                };
                if !status.is_deletable() {
                    return Err(StoreError::Conflict(format!(
                        "Invoice {id} is {status} and cannot be deleted"
                    )));
                }
                let affected = diesel::delete(invoices::table.find(id)).execute(conn)?;
                Ok(affected > 0)
            })
        })
        .await
    }

    async fn sales_summary(&self, window: MonthWindow) -> Result<SalesSummary> {
        self.run(move |conn| {
            let MonthWindow {
                month_start,
                prev_month_start,
            } = window;

            let customers_total: i64 = customers::table.count().get_result(conn)?;
            let customers_this_month: i64 = customers::table
                .filter(customers::created_at.ge(month_start))
                .count()
                .get_result(conn)?;
            let customers_last_month: i64 = customers::table
                .filter(customers::created_at.ge(prev_month_start))
                .filter(customers::created_at.lt(month_start))
                .count()
                .get_result(conn)?;

            let by_status: Vec<(LeadStatus, i64)> = leads::table
                .filter(leads::deleted_at.is_null())
                .group_by(leads::status)
                .select((leads::status, count_star()))
                .load(conn)?;
            let by_source: Vec<(LeadSource, i64)> = leads::table
                .filter(leads::deleted_at.is_null())
                .group_by(leads::source)
                .select((leads::source, count_star()))
                .load(conn)?;
            let by_stage: Vec<(QuotationStage, i64)> = quotations::table
                .group_by(quotations::stage)
                .select((quotations::stage, count_star()))
                .load(conn)?;

            let paid_invoices: i64 = invoices::table
                .filter(invoices::status.eq(InvoiceStatus::Paid))
                .count()
                .get_result(conn)?;
            let revenue_total: Option<BigDecimal> = invoices::table
                .filter(invoices::status.eq(InvoiceStatus::Paid))
                .select(sum(invoices::total))
                .first(conn)?;
            let revenue_this_month: Option<BigDecimal> = invoices::table
                .filter(invoices::status.eq(InvoiceStatus::Paid))
                .filter(invoices::paid_at.ge(month_start))
                .select(sum(invoices::total))
                .first(conn)?;
            let revenue_last_month: Option<BigDecimal> = invoices::table
                .filter(invoices::status.eq(InvoiceStatus::Paid))
                .filter(invoices::paid_at.ge(prev_month_start))
                .filter(invoices::paid_at.lt(month_start))
                .select(sum(invoices::total))
                .first(conn)?;

            let zero = BigDecimal::from(0);
            Ok(SalesSummary {
                customers_total,
                customers_this_month,
                customers_last_month,
                leads_by_status: fill_counts(&LeadStatus::ALL, &by_status),
                leads_by_source: fill_counts(&LeadSource::ALL, &by_source),
                quotations_by_stage: fill_counts(&QuotationStage::ALL, &by_stage),
                paid_invoices,
                revenue_total: revenue_total.unwrap_or_else(|| zero.clone()),
                revenue_this_month: revenue_this_month.unwrap_or_else(|| zero.clone()),
                revenue_last_month: revenue_last_month.unwrap_or(zero),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_counts_includes_missing_variants() {
        let counts = fill_counts(
            &QuotationStage::ALL,
            &[(QuotationStage::Sent, 3), (QuotationStage::Accepted, 1)],
        );
        assert_eq!(counts.len(), QuotationStage::ALL.len());
        assert_eq!(counts[0], (QuotationStage::Draft, 0));
        assert_eq!(counts[1], (QuotationStage::Sent, 3));
        assert_eq!(counts[2], (QuotationStage::Accepted, 1));
    }
}
