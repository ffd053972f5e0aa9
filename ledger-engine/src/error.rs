//! Typed failures of the ledger engine.

use crate::models::{DocumentType, InvoiceStatus, QuoteStatus};
use chrono::NaiveDate;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Organization {0} not found")]
    OrganizationNotFound(Uuid),

    #[error("Quote {0} not found")]
    QuoteNotFound(Uuid),

    #[error("Quote {quote_id} is {status}; {reason}")]
    InvalidQuoteStatus {
        quote_id: Uuid,
        status: QuoteStatus,
        reason: &'static str,
    },

    #[error("Invoice {0} not found")]
    InvoiceNotFound(Uuid),

    #[error("Invoice {invoice_id} is {status}; {reason}")]
    InvalidInvoiceStatus {
        invoice_id: Uuid,
        status: InvoiceStatus,
        reason: &'static str,
    },

    #[error("Payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid line item at position {position}: {reason}")]
    InvalidLineItem { position: usize, reason: String },

    #[error("Invalid payment terms: {0} days")]
    InvalidPaymentTerms(i32),

    #[error("Invalid tax id {0:?}: expected exactly 9 digits")]
    InvalidTaxId(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Numbering conflict on the {document_type} sequence of organization {org_id}")]
    NumberingConflict {
        org_id: Uuid,
        document_type: DocumentType,
    },

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl LedgerError {
    /// Conflicts are safe to retry as a whole; nothing from the failed attempt survives.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::NumberingConflict { .. } | LedgerError::WriteConflict(_)
        )
    }

    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::OrganizationNotFound(_) => "organization_not_found",
            LedgerError::QuoteNotFound(_) => "quote_not_found",
            LedgerError::InvalidQuoteStatus { .. } => "invalid_quote_status",
            LedgerError::InvoiceNotFound(_) => "invoice_not_found",
            LedgerError::InvalidInvoiceStatus { .. } => "invalid_invoice_status",
            LedgerError::PaymentNotFound(_) => "payment_not_found",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InvalidLineItem { .. } => "invalid_line_item",
            LedgerError::InvalidPaymentTerms(_) => "invalid_payment_terms",
            LedgerError::InvalidTaxId(_) => "invalid_tax_id",
            LedgerError::InvalidDateRange { .. } => "invalid_date_range",
            LedgerError::NumberingConflict { .. } => "numbering_conflict",
            LedgerError::WriteConflict(_) => "write_conflict",
            LedgerError::PersistenceFailure(_) => "persistence_failure",
            LedgerError::Store(_) => "store",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidLineItem { .. }
            | LedgerError::InvalidPaymentTerms(_)
            | LedgerError::InvalidTaxId(_)
            | LedgerError::InvalidDateRange { .. } => {
                AppError::UnprocessableEntity(anyhow::anyhow!(message))
            }
            LedgerError::OrganizationNotFound(_)
            | LedgerError::QuoteNotFound(_)
            | LedgerError::InvoiceNotFound(_)
            | LedgerError::PaymentNotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            LedgerError::InvalidQuoteStatus { .. }
            | LedgerError::InvalidInvoiceStatus { .. }
            | LedgerError::NumberingConflict { .. }
            | LedgerError::WriteConflict(_) => AppError::Conflict(anyhow::anyhow!(message)),
            LedgerError::PersistenceFailure(_) => AppError::InternalError(anyhow::anyhow!(message)),
            LedgerError::Store(e) => AppError::DatabaseError(e),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
