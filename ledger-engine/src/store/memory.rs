//! In-process record store.
//!
//! A single async mutex guards the whole state, so at most one transaction is
//! open at a time (single-writer discipline). Each transaction works on a copy
//! that replaces the shared state on commit; dropping the transaction discards it.

use super::{LedgerStore, StoreTx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    DocumentType, Invoice, InvoiceFilter, InvoiceState, Organization, Payment, Quote, QuoteStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    organizations: HashMap<Uuid, Organization>,
    sequences: HashMap<(Uuid, DocumentType), i64>,
    quotes: HashMap<Uuid, Quote>,
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Payment>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `PersistenceFailure`, as a crashed write would.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_next_commit: Arc::clone(&self.fail_next_commit),
        }))
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryTx {
    fn require_org(&self, org_id: Uuid) -> LedgerResult<()> {
        if self.working.organizations.contains_key(&org_id) {
            Ok(())
        } else {
            Err(LedgerError::OrganizationNotFound(org_id))
        }
    }

    fn invoice_mut(&mut self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<&mut Invoice> {
        self.working
            .invoices
            .get_mut(&invoice_id)
            .filter(|inv| inv.org_id == org_id)
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_organization(&mut self, org: &Organization) -> LedgerResult<()> {
        if self.working.organizations.contains_key(&org.org_id) {
            return Err(LedgerError::WriteConflict(format!(
                "organization {} already exists",
                org.org_id
            )));
        }
        self.working.organizations.insert(org.org_id, org.clone());
        Ok(())
    }

    async fn get_organization(&mut self, org_id: Uuid) -> LedgerResult<Option<Organization>> {
        Ok(self.working.organizations.get(&org_id).cloned())
    }

    async fn lock_sequence(
        &mut self,
        org_id: Uuid,
        document_type: DocumentType,
    ) -> LedgerResult<i64> {
        self.require_org(org_id)?;
        Ok(*self
            .working
            .sequences
            .entry((org_id, document_type))
            .or_insert(0))
    }

    async fn advance_sequence(
        &mut self,
        org_id: Uuid,
        document_type: DocumentType,
        expected: i64,
    ) -> LedgerResult<i64> {
        let current = self
            .working
            .sequences
            .get_mut(&(org_id, document_type))
            .ok_or(LedgerError::NumberingConflict {
                org_id,
                document_type,
            })?;
        if *current != expected {
            return Err(LedgerError::NumberingConflict {
                org_id,
                document_type,
            });
        }
        *current = expected + 1;
        Ok(*current)
    }

    async fn insert_quote(&mut self, quote: &Quote) -> LedgerResult<()> {
        self.require_org(quote.org_id)?;
        let duplicate_number = self
            .working
            .quotes
            .values()
            .any(|q| q.org_id == quote.org_id && q.number == quote.number);
        if duplicate_number {
            return Err(LedgerError::NumberingConflict {
                org_id: quote.org_id,
                document_type: DocumentType::Quote,
            });
        }
        self.working.quotes.insert(quote.quote_id, quote.clone());
        Ok(())
    }

    async fn lock_quote(&mut self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Option<Quote>> {
        Ok(self
            .working
            .quotes
            .get(&quote_id)
            .filter(|q| q.org_id == org_id)
            .cloned())
    }

    async fn update_quote_status(
        &mut self,
        org_id: Uuid,
        quote_id: Uuid,
        status: QuoteStatus,
    ) -> LedgerResult<()> {
        let quote = self
            .working
            .quotes
            .get_mut(&quote_id)
            .filter(|q| q.org_id == org_id)
            .ok_or(LedgerError::QuoteNotFound(quote_id))?;
        quote.status = status;
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        self.require_org(invoice.org_id)?;
        for existing in self.working.invoices.values() {
            if existing.org_id == invoice.org_id && existing.number == invoice.number {
                return Err(LedgerError::NumberingConflict {
                    org_id: invoice.org_id,
                    document_type: DocumentType::Invoice,
                });
            }
            if invoice.quote_id.is_some() && existing.quote_id == invoice.quote_id {
                return Err(LedgerError::WriteConflict(format!(
                    "an invoice already references quote {}",
                    invoice.quote_id.unwrap_or_default()
                )));
            }
        }
        self.working
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn lock_invoice(
        &mut self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> LedgerResult<Option<Invoice>> {
        Ok(self
            .working
            .invoices
            .get(&invoice_id)
            .filter(|inv| inv.org_id == org_id)
            .cloned())
    }

    async fn find_invoice_by_quote(
        &mut self,
        org_id: Uuid,
        quote_id: Uuid,
    ) -> LedgerResult<Option<Invoice>> {
        Ok(self
            .working
            .invoices
            .values()
            .find(|inv| inv.org_id == org_id && inv.quote_id == Some(quote_id))
            .cloned())
    }

    async fn update_invoice_state(
        &mut self,
        org_id: Uuid,
        invoice_id: Uuid,
        state: &InvoiceState,
    ) -> LedgerResult<()> {
        let invoice = self.invoice_mut(org_id, invoice_id)?;
        invoice.status = state.status;
        invoice.amount_paid = state.amount_paid;
        invoice.paid_utc = state.paid_utc;
        invoice.issue_date = state.issue_date;
        Ok(())
    }

    async fn list_invoices(
        &mut self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> LedgerResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .working
            .invoices
            .values()
            .filter(|inv| inv.org_id == org_id && filter.matches(inv))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            a.created_utc
                .cmp(&b.created_utc)
                .then_with(|| a.invoice_id.cmp(&b.invoice_id))
        });
        Ok(invoices)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()> {
        self.invoice_mut(payment.org_id, payment.invoice_id)?;
        self.working
            .payments
            .insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn get_payment(
        &mut self,
        org_id: Uuid,
        payment_id: Uuid,
    ) -> LedgerResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .get(&payment_id)
            .filter(|p| p.org_id == org_id)
            .cloned())
    }

    async fn delete_payment(&mut self, org_id: Uuid, payment_id: Uuid) -> LedgerResult<bool> {
        let owned = self
            .working
            .payments
            .get(&payment_id)
            .is_some_and(|p| p.org_id == org_id);
        if owned {
            self.working.payments.remove(&payment_id);
        }
        Ok(owned)
    }

    async fn list_payments(&mut self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<Vec<Payment>> {
        Ok(sorted_payments(
            self.working
                .payments
                .values()
                .filter(|p| p.org_id == org_id && p.invoice_id == invoice_id),
        ))
    }

    async fn list_payments_between(
        &mut self,
        org_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<Payment>> {
        Ok(sorted_payments(self.working.payments.values().filter(|p| {
            p.org_id == org_id && p.paid_utc >= from && p.paid_utc < to
        })))
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTx {
            mut guard,
            working,
            fail_next_commit,
        } = *self;
        if fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::PersistenceFailure(
                "injected commit failure".to_string(),
            ));
        }
        *guard = working;
        Ok(())
    }
}

fn sorted_payments<'a>(payments: impl Iterator<Item = &'a Payment>) -> Vec<Payment> {
    let mut payments: Vec<Payment> = payments.cloned().collect();
    payments.sort_by(|a, b| {
        a.paid_utc
            .cmp(&b.paid_utc)
            .then_with(|| a.payment_id.cmp(&b.payment_id))
    });
    payments
}
