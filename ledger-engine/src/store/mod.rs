//! Record store interface.
//!
//! Every engine operation runs inside one [`StoreTx`]. A transaction either
//! commits all of its writes or none of them: dropping it without calling
//! [`StoreTx::commit`] discards everything. Methods named `lock_*` take the
//! row-level lock that serializes concurrent writers on that record for the
//! rest of the transaction.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::LedgerResult;
use crate::models::{
    DocumentType, Invoice, InvoiceFilter, InvoiceState, Organization, Payment, Quote, QuoteStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> LedgerResult<Box<dyn StoreTx>>;

    /// Cheap liveness probe used by `/health` and `/ready`.
    async fn health_check(&self) -> LedgerResult<()>;
}

#[async_trait]
pub trait StoreTx: Send {
    // Organizations

    async fn insert_organization(&mut self, org: &Organization) -> LedgerResult<()>;

    async fn get_organization(&mut self, org_id: Uuid) -> LedgerResult<Option<Organization>>;

    // Document number sequences

    /// Lock the `(org, document type)` counter, creating it at zero, and return its last value.
    async fn lock_sequence(&mut self, org_id: Uuid, document_type: DocumentType)
        -> LedgerResult<i64>;

    /// Compare-and-swap the counter from `expected` to `expected + 1`.
    ///
    /// Fails with `NumberingConflict` when the stored value is not `expected`.
    async fn advance_sequence(
        &mut self,
        org_id: Uuid,
        document_type: DocumentType,
        expected: i64,
    ) -> LedgerResult<i64>;

    // Quotes

    /// Write the header and every line item.
    async fn insert_quote(&mut self, quote: &Quote) -> LedgerResult<()>;

    async fn lock_quote(&mut self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Option<Quote>>;

    async fn update_quote_status(
        &mut self,
        org_id: Uuid,
        quote_id: Uuid,
        status: QuoteStatus,
    ) -> LedgerResult<()>;

    // Invoices

    /// Write the header and every line item.
    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()>;

    async fn lock_invoice(&mut self, org_id: Uuid, invoice_id: Uuid)
        -> LedgerResult<Option<Invoice>>;

    async fn find_invoice_by_quote(
        &mut self,
        org_id: Uuid,
        quote_id: Uuid,
    ) -> LedgerResult<Option<Invoice>>;

    async fn update_invoice_state(
        &mut self,
        org_id: Uuid,
        invoice_id: Uuid,
        state: &InvoiceState,
    ) -> LedgerResult<()>;

    async fn list_invoices(
        &mut self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> LedgerResult<Vec<Invoice>>;

    // Payments

    async fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()>;

    async fn get_payment(&mut self, org_id: Uuid, payment_id: Uuid)
        -> LedgerResult<Option<Payment>>;

    /// Returns `false` when the payment no longer exists.
    async fn delete_payment(&mut self, org_id: Uuid, payment_id: Uuid) -> LedgerResult<bool>;

    /// Payments of one invoice, oldest first.
    async fn list_payments(&mut self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<Vec<Payment>>;

    /// Payments of the organization with `from <= paid_utc < to`.
    async fn list_payments_between(
        &mut self,
        org_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<Payment>>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
