use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use super::{newest_first, MemoryStore, Tables};
use crate::core::shared::enums::{
    InvoiceStatus, LeadSource, LeadStatus, QuotationStage,
};
use crate::core::shared::models::{
    Customer, Invoice, InvoiceItem, InvoiceLine, InvoiceWithItems, Lead, LeadChanges, LeadFilter,
    NewCustomer, NewInvoice, NewLead, NewQuotation, Quotation, QuotationChanges,
};
use crate::core::storage::{MonthWindow, Result, SalesStore, SalesSummary, StoreError};

impl Tables {
    fn items_of(&self, invoice_id: i64) -> Vec<InvoiceItem> {
        let mut items: Vec<InvoiceItem> = self
            .invoice_items
            .values()
            .filter(|i| i.invoice_id == invoice_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        items
    }

    fn with_items(&self, invoice: &Invoice) -> InvoiceWithItems {
        InvoiceWithItems {
            invoice: invoice.clone(),
            items: self.items_of(invoice.id),
        }
    }
}

fn in_window(ts: DateTime<Utc>, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> bool {
    ts >= from && to.map_or(true, |to| ts < to)
}

#[async_trait]
impl SalesStore for MemoryStore {
    async fn create_lead(&self, new: NewLead) -> Result<Lead> {
        let mut data = self.data.lock().await;
        if let Some(employee_id) = new.employee_id {
            if !data.employees.contains_key(&employee_id) {
                return Err(StoreError::employee_not_found(employee_id));
            }
        }
        let id = data.next_id();
        let lead = Lead {
            id,
            name: new.name,
            email: new.email,
            phone_number: new.phone_number,
            company: new.company,
            address: new.address,
            city: new.city,
            state: new.state,
            zip_code: new.zip_code,
            country: new.country,
            website: new.website,
            source: new.source,
            status: new.status,
            requirement: new.requirement,
            comment: new.comment,
            expected_revenue: new.expected_revenue,
            conversion_probability: new.conversion_probability,
            employee_id: new.employee_id,
            customer_id: None,
            created_at: new.created_at,
            updated_at: new.updated_at,
            deleted_at: None,
        };
        data.leads.insert(id, lead.clone());
        Ok(lead)
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let data = self.data.lock().await;
        let rows = data
            .leads
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        Ok(newest_first(rows, |l: &Lead| (l.created_at, l.id)))
    }

    async fn find_lead(&self, id: i64) -> Result<Option<Lead>> {
        let data = self.data.lock().await;
        Ok(data.leads.get(&id).cloned())
    }

    async fn update_lead(&self, id: i64, changes: LeadChanges) -> Result<Option<Lead>> {
        let mut data = self.data.lock().await;
        if let Some(employee_id) = changes.employee_id {
            if !data.employees.contains_key(&employee_id) {
                return Err(StoreError::employee_not_found(employee_id));
            }
        }
        let Some(lead) = data.leads.get_mut(&id).filter(|l| !l.is_deleted()) else {
            return Ok(None);
        };
        if let Some(v) = changes.name {
            lead.name = v;
        }
        if let Some(v) = changes.email {
            lead.email = Some(v);
        }
        if let Some(v) = changes.phone_number {
            lead.phone_number = Some(v);
        }
        if let Some(v) = changes.company {
            lead.company = Some(v);
        }
        if let Some(v) = changes.address {
            lead.address = Some(v);
        }
        if let Some(v) = changes.city {
            lead.city = Some(v);
        }
        if let Some(v) = changes.state {
            lead.state = Some(v);
        }
        if let Some(v) = changes.zip_code {
            lead.zip_code = Some(v);
        }
        if let Some(v) = changes.country {
            lead.country = Some(v);
        }
        if let Some(v) = changes.website {
            lead.website = Some(v);
        }
        if let Some(v) = changes.source {
            lead.source = v;
        }
        if let Some(v) = changes.status {
            lead.status = v;
        }
        if let Some(v) = changes.requirement {
            lead.requirement = Some(v);
        }
        if let Some(v) = changes.comment {
            lead.comment = Some(v);
        }
        if let Some(v) = changes.expected_revenue {
            lead.expected_revenue = Some(v);
        }
        if let Some(v) = changes.conversion_probability {
            lead.conversion_probability = Some(v);
        }
        if let Some(v) = changes.employee_id {
            lead.employee_id = Some(v);
        }
        lead.updated_at = changes.updated_at.unwrap_or_else(Utc::now);
        Ok(Some(lead.clone()))
    }

    async fn delete_lead(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let mut data = self.data.lock().await;
        match data.leads.get_mut(&id) {
            Some(lead) if !lead.is_deleted() => {
                lead.deleted_at = Some(at);
                lead.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_lead(&self, id: i64) -> Result<Option<Lead>> {
        let mut data = self.data.lock().await;
        Ok(data.leads.get_mut(&id).map(|lead| {
            if lead.deleted_at.take().is_some() {
                lead.updated_at = Utc::now();
            }
            lead.clone()
        }))
    }

    async fn convert_lead(&self, id: i64, new: NewCustomer) -> Result<(Lead, Customer)> {
        let mut data = self.data.lock().await;
        let status = data
            .leads
            .get(&id)
            .filter(|l| !l.is_deleted())
            .map(|l| l.status)
            .ok_or_else(|| StoreError::lead_not_found(id))?;
        if status == LeadStatus::Converted {
            return Err(StoreError::Conflict(format!(
                "Lead {id} has already been converted"
            )));
        }

        let existing = data
            .customers
            .values()
            .find(|c| c.email.eq_ignore_ascii_case(&new.email))
            .cloned();
        let customer = match existing {
            Some(customer) => customer,
            None => {
                let customer_id = data.next_id();
                let customer = Customer {
                    id: customer_id,
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
                data.customers.insert(customer_id, customer.clone());
                customer
            }
        };

        let lead = data
            .leads
            .get_mut(&id)
            .ok_or_else(|| StoreError::lead_not_found(id))?;
        lead.status = LeadStatus::Converted;
        lead.customer_id = Some(customer.id);
        lead.updated_at = Utc::now();
        Ok((lead.clone(), customer))
    }

    async fn create_quotation(&self, new: NewQuotation) -> Result<Quotation> {
        let mut data = self.data.lock().await;
        if !data.customers.contains_key(&new.customer_id) {
            return Err(StoreError::customer_not_found(new.customer_id));
        }
        if let Some(employee_id) = new.employee_id {
            if !data.employees.contains_key(&employee_id) {
                return Err(StoreError::employee_not_found(employee_id));
            }
        }
        let id = data.next_id();
        let quotation = Quotation {
            id,
            title: new.title,
            description: new.description,
            amount: new.amount,
            valid_until: new.valid_until,
            stage: new.stage,
            customer_id: new.customer_id,
            employee_id: new.employee_id,
            sent_at: None,
            responded_at: None,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        data.quotations.insert(id, quotation.clone());
        Ok(quotation)
    }

    async fn list_quotations(&self, stage: Option<QuotationStage>) -> Result<Vec<Quotation>> {
        let data = self.data.lock().await;
        let rows = data
            .quotations
            .values()
            .filter(|q| stage.map_or(true, |s| q.stage == s))
            .cloned()
            .collect();
        Ok(newest_first(rows, |q: &Quotation| (q.created_at, q.id)))
    }

    async fn list_quotations_by_customer(&self, customer_id: i64) -> Result<Vec<Quotation>> {
        let data = self.data.lock().await;
        let rows = data
            .quotations
            .values()
            .filter(|q| q.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |q: &Quotation| (q.created_at, q.id)))
    }

    async fn find_quotation(&self, id: i64) -> Result<Option<Quotation>> {
        let data = self.data.lock().await;
        Ok(data.quotations.get(&id).cloned())
    }

    async fn update_quotation(
        &self,
        id: i64,
        changes: QuotationChanges,
    ) -> Result<Option<Quotation>> {
        let mut data = self.data.lock().await;
        if let Some(employee_id) = changes.employee_id {
            if !data.employees.contains_key(&employee_id) {
                return Err(StoreError::employee_not_found(employee_id));
            }
        }
        let Some(quotation) = data.quotations.get_mut(&id) else {
            return Ok(None);
        };
        if quotation.stage != QuotationStage::Draft {
            return Err(StoreError::Conflict(format!(
                "Quotation {id} is {} and can no longer be edited",
                quotation.stage
            )));
        }
        if let Some(v) = changes.title {
            quotation.title = v;
        }
        if let Some(v) = changes.description {
            quotation.description = Some(v);
        }
        if let Some(v) = changes.amount {
            quotation.amount = v;
        }
        if let Some(v) = changes.valid_until {
            quotation.valid_until = v;
        }
        if let Some(v) = changes.employee_id {
            quotation.employee_id = Some(v);
        }
        quotation.updated_at = changes.updated_at.unwrap_or_else(Utc::now);
        Ok(Some(quotation.clone()))
    }

    async fn set_quotation_stage(
        &self,
        id: i64,
        stage: QuotationStage,
        at: DateTime<Utc>,
    ) -> Result<Option<Quotation>> {
        let mut data = self.data.lock().await;
        let Some(quotation) = data.quotations.get_mut(&id) else {
            return Ok(None);
        };
        if !quotation.stage.can_transition_to(stage) {
            return Err(StoreError::quotation_transition(id, quotation.stage, stage));
        }
        quotation.stage = stage;
        if stage == QuotationStage::Sent {
            quotation.sent_at = Some(at);
        } else {
            quotation.responded_at = Some(at);
        }
        quotation.updated_at = at;
        Ok(Some(quotation.clone()))
    }

    async fn delete_quotation(&self, id: i64) -> Result<bool> {
        let mut data = self.data.lock().await;
        if data.invoices.values().any(|i| i.quotation_id == Some(id)) {
            return Err(StoreError::Conflict(format!(
                "Quotation {id} has been invoiced and cannot be deleted"
            )));
        }
        Ok(data.quotations.remove(&id).is_some())
    }

    async fn create_invoice(
        &self,
        new: NewInvoice,
        lines: Vec<InvoiceLine>,
    ) -> Result<InvoiceWithItems> {
        let mut data = self.data.lock().await;
        if !data.customers.contains_key(&new.customer_id) {
            return Err(StoreError::customer_not_found(new.customer_id));
        }
        if let Some(quotation_id) = new.quotation_id {
            let quotation = data
                .quotations
                .get(&quotation_id)
                .ok_or_else(|| StoreError::quotation_not_found(quotation_id))?;
            if quotation.stage != QuotationStage::Accepted
                || quotation.customer_id != new.customer_id
            {
                return Err(StoreError::Conflict(format!(
                    "Quotation {quotation_id} is not an accepted quotation of customer {}",
                    new.customer_id
                )));
            }
            if data
                .invoices
                .values()
                .any(|i| i.quotation_id == Some(quotation_id))
            {
                return Err(StoreError::Conflict(format!(
                    "Quotation {quotation_id} has already been invoiced"
                )));
            }
        }
        if data
            .invoices
            .values()
            .any(|i| i.invoice_number == new.invoice_number)
        {
            return Err(StoreError::Conflict(format!(
                "Invoice number already exists: {}",
                new.invoice_number
            )));
        }

        let id = data.next_id();
        let invoice = Invoice {
            id,
            invoice_number: new.invoice_number,
            title: new.title,
            customer_id: new.customer_id,
            quotation_id: new.quotation_id,
            status: new.status,
            subtotal: new.subtotal,
            discount: new.discount,
            tax_rate: new.tax_rate,
            tax_amount: new.tax_amount,
            total: new.total,
            invoice_date: new.invoice_date,
            due_date: new.due_date,
            notes: new.notes,
            sent_at: None,
            paid_at: None,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        data.invoices.insert(id, invoice);
        for (position, line) in (1..).zip(lines) {
            let item_id = data.next_id();
            data.invoice_items.insert(
                item_id,
                InvoiceItem {
                    id: item_id,
                    invoice_id: id,
                    position,
                    description: line.description,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    amount: line.amount,
                },
            );
        }
        let invoice = data
            .invoices
            .get(&id)
            .ok_or_else(|| StoreError::Database(format!("Invoice {id} vanished")))?;
        Ok(data.with_items(invoice))
    }

    async fn list_invoices(&self, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>> {
        let data = self.data.lock().await;
        let rows = data
            .invoices
            .values()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        Ok(newest_first(rows, |i: &Invoice| (i.created_at, i.id)))
    }

    async fn list_invoices_by_customer(&self, customer_id: i64) -> Result<Vec<Invoice>> {
        let data = self.data.lock().await;
        let rows = data
            .invoices
            .values()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |i: &Invoice| (i.created_at, i.id)))
    }

    async fn find_invoice(&self, id: i64) -> Result<Option<InvoiceWithItems>> {
        let data = self.data.lock().await;
        Ok(data.invoices.get(&id).map(|i| data.with_items(i)))
    }

    async fn set_invoice_status(
        &self,
        id: i64,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Invoice>> {
        let mut data = self.data.lock().await;
        let Some(invoice) = data.invoices.get_mut(&id) else {
            return Ok(None);
        };
        if !invoice.status.can_transition_to(status) {
            return Err(StoreError::invoice_transition(id, invoice.status, status));
        }
        invoice.status = status;
        match status {
            InvoiceStatus::Sent => invoice.sent_at = Some(at),
            InvoiceStatus::Paid => invoice.paid_at = Some(at),
            InvoiceStatus::Pending | InvoiceStatus::Cancelled => {}
        }
        invoice.updated_at = at;
        Ok(Some(invoice.clone()))
    }

    async fn delete_invoice(&self, id: i64) -> Result<bool> {
        let mut data = self.data.lock().await;
        let Some(status) = data.invoices.get(&id).map(|i| i.status) else {
            return Ok(false);
        };
        if !status.is_deletable() {
            return Err(StoreError::Conflict(format!(
                "Invoice {id} is {status} and cannot be deleted"
            )));
        }
        data.invoices.remove(&id);
        data.invoice_items.retain(|_, item| item.invoice_id != id);
        Ok(true)
    }

    async fn sales_summary(&self, window: MonthWindow) -> Result<SalesSummary> {
        let data = self.data.lock().await;
        let MonthWindow {
            month_start,
            prev_month_start,
        } = window;

        let live_leads: Vec<&Lead> = data.leads.values().filter(|l| !l.is_deleted()).collect();
        let paid: Vec<&Invoice> = data
            .invoices
            .values()
            .filter(|i| i.status == InvoiceStatus::Paid)
            .collect();
        let revenue = |from: DateTime<Utc>, to: Option<DateTime<Utc>>| {
            paid.iter()
                .filter(|i| i.paid_at.is_some_and(|at| in_window(at, from, to)))
                .fold(BigDecimal::from(0), |acc, i| acc + &i.total)
        };

        Ok(SalesSummary {
            customers_total: data.customers.len() as i64,
            customers_this_month: data
                .customers
                .values()
                .filter(|c| in_window(c.created_at, month_start, None))
                .count() as i64,
            customers_last_month: data
                .customers
                .values()
                .filter(|c| in_window(c.created_at, prev_month_start, Some(month_start)))
                .count() as i64,
            leads_by_status: LeadStatus::ALL
                .iter()
                .map(|&s| (s, live_leads.iter().filter(|l| l.status == s).count() as i64))
                .collect(),
            leads_by_source: LeadSource::ALL
                .iter()
                .map(|&s| (s, live_leads.iter().filter(|l| l.source == s).count() as i64))
                .collect(),
            quotations_by_stage: QuotationStage::ALL
                .iter()
                .map(|&s| {
                    let count = data.quotations.values().filter(|q| q.stage == s).count();
                    (s, count as i64)
                })
                .collect(),
            paid_invoices: paid.len() as i64,
            revenue_total: paid
                .iter()
                .fold(BigDecimal::from(0), |acc, i| acc + &i.total),
            revenue_this_month: revenue(month_start, None),
            revenue_last_month: revenue(prev_month_start, Some(month_start)),
        })
    }
}
