//! Quote to invoice conversion.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{DocumentNumber, DocumentType, Invoice, InvoiceStatus};
use crate::services::documents::{due_date, record_status};
use crate::services::engine::{observe, LedgerEngine};
use crate::services::line_items::clone_lines;
use crate::services::metrics::CONVERSIONS_TOTAL;
use crate::services::numbering::record_issued;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// A new invoice was written.
    Created,
    /// The quote had been converted before; nothing was written.
    AlreadyConverted,
}

impl ConversionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionOutcome::Created => "created",
            ConversionOutcome::AlreadyConverted => "already_converted",
        }
    }
}

/// Result of a conversion request: always names the quote's invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub quote_id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_number: DocumentNumber,
    pub due_date: NaiveDate,
    pub outcome: ConversionOutcome,
}

impl Conversion {
    fn from_invoice(quote_id: Uuid, invoice: &Invoice, outcome: ConversionOutcome) -> Self {
        Self {
            quote_id,
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.number.clone(),
            due_date: invoice.due_date,
            outcome,
        }
    }

    pub fn is_new(&self) -> bool {
        self.outcome == ConversionOutcome::Created
    }
}

impl LedgerEngine {
    /// Turn an accepted or signed quote into a draft invoice.
    ///
    /// Idempotent per quote: a second call returns the invoice created by the
    /// first with outcome `AlreadyConverted`. The quote row stays locked for the
    /// whole transaction, so concurrent conversions of one quote serialize and
    /// the later one observes the earlier one's invoice.
    ///
    /// `payment_terms_days` overrides the organization's terms for this invoice.
    #[instrument(skip(self), fields(org_id = %org_id, quote_id = %quote_id))]
    pub async fn convert_quote_to_invoice(
        &self,
        org_id: Uuid,
        quote_id: Uuid,
        payment_terms_days: Option<i32>,
    ) -> LedgerResult<Conversion> {
        let result = observe("convert_quote_to_invoice", async {
            let mut tx = self.store.begin().await?;

            let quote = tx
                .lock_quote(org_id, quote_id)
                .await?
                .ok_or(LedgerError::QuoteNotFound(quote_id))?;

            if let Some(existing) = tx.find_invoice_by_quote(org_id, quote_id).await? {
                info!(
                    invoice_id = %existing.invoice_id,
                    number = %existing.number,
                    "Quote already converted"
                );
                return Ok(Conversion::from_invoice(
                    quote_id,
                    &existing,
                    ConversionOutcome::AlreadyConverted,
                ));
            }

            if !quote.status.is_convertible() {
                warn!(status = %quote.status, "Quote is not convertible");
                return Err(LedgerError::InvalidQuoteStatus {
                    quote_id,
                    status: quote.status,
                    reason: "only accepted or signed quotes can be converted",
                });
            }

            let org = Self::require_organization(tx.as_mut(), org_id).await?;
            let terms = self.payment_terms(&org, payment_terms_days);
            let created_utc = Utc::now();
            let due_date = due_date(created_utc.date_naive(), terms)?;

            let number = self
                .numbering
                .issue_in(tx.as_mut(), org_id, DocumentType::Invoice)
                .await?;

            // Totals are carried over verbatim: the invoice must match what the client agreed to.
            let invoice = Invoice {
                invoice_id: Uuid::new_v4(),
                org_id,
                client_ref: quote.client_ref.clone(),
                quote_id: Some(quote_id),
                number,
                status: InvoiceStatus::Draft,
                currency: quote.currency.clone(),
                issue_date: None,
                due_date,
                totals: quote.totals,
                amount_paid: Decimal::ZERO,
                paid_utc: None,
                created_utc,
                lines: clone_lines(&quote.lines),
            };
            tx.insert_invoice(&invoice).await?;

            let written = tx
                .lock_invoice(org_id, invoice.invoice_id)
                .await?
                .ok_or_else(|| {
                    LedgerError::PersistenceFailure(format!(
                        "invoice {} missing after write",
                        invoice.invoice_id
                    ))
                })?;
            if written.lines.len() != quote.lines.len() {
                error!(
                    invoice_id = %invoice.invoice_id,
                    expected = quote.lines.len(),
                    written = written.lines.len(),
                    "Line items lost during conversion"
                );
                return Err(LedgerError::PersistenceFailure(format!(
                    "invoice {} has {} of {} line items",
                    invoice.invoice_id,
                    written.lines.len(),
                    quote.lines.len()
                )));
            }

            tx.commit().await?;

            record_issued(DocumentType::Invoice);
            record_status(invoice.status);
            info!(
                invoice_id = %invoice.invoice_id,
                number = %invoice.number,
                terms_days = terms,
                due_date = %invoice.due_date,
                lines = invoice.lines.len(),
                "Quote converted to invoice"
            );
            Ok(Conversion::from_invoice(
                quote_id,
                &invoice,
                ConversionOutcome::Created,
            ))
        })
        .await;

        let label = match &result {
            Ok(conversion) => conversion.outcome.as_str(),
            Err(_) => "failed",
        };
        CONVERSIONS_TOTAL.with_label_values(&[label]).inc();
        result
    }
}
