//! Organizations, quotes and invoices: creation and lifecycle transitions.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    CreateInvoice, CreateOrganization, CreateQuote, DocumentType, Invoice, InvoiceBalance,
    InvoiceFilter, InvoiceState, InvoiceStatus, Organization, Quote, QuoteAction, QuoteStatus,
    Totals,
};
use crate::services::engine::{observe, LedgerEngine};
use crate::services::line_items::{build_lines, compute_totals};
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::numbering::record_issued;
use crate::store::StoreTx;
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub(crate) fn record_status(status: InvoiceStatus) {
    INVOICES_TOTAL.with_label_values(&[status.as_str()]).inc();
}

/// Due date for a document created on `created_on` with `terms_days` of credit.
pub(crate) fn due_date(created_on: NaiveDate, terms_days: i32) -> LedgerResult<NaiveDate> {
    let days = u64::try_from(terms_days).map_err(|_| LedgerError::InvalidPaymentTerms(terms_days))?;
    created_on
        .checked_add_days(Days::new(days))
        .ok_or(LedgerError::InvalidPaymentTerms(terms_days))
}

impl LedgerEngine {
    /// Load an organization inside `tx`, failing when it does not exist.
    pub(crate) async fn require_organization(
        tx: &mut dyn StoreTx,
        org_id: Uuid,
    ) -> LedgerResult<Organization> {
        tx.get_organization(org_id)
            .await?
            .ok_or(LedgerError::OrganizationNotFound(org_id))
    }

    /// Explicit override, then the organization default, then the engine default.
    pub(crate) fn payment_terms(&self, org: &Organization, explicit: Option<i32>) -> i32 {
        explicit
            .or(org.payment_terms_days)
            .unwrap_or(self.config.default_payment_terms_days)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_organization(&self, input: CreateOrganization) -> LedgerResult<Organization> {
        observe("create_organization", async {
            if let Some(days) = input.payment_terms_days.filter(|d| *d < 0) {
                return Err(LedgerError::InvalidPaymentTerms(days));
            }

            let org = Organization {
                org_id: Uuid::new_v4(),
                name: input.name.trim().to_string(),
                payment_terms_days: input.payment_terms_days,
                created_utc: Utc::now(),
            };

            let mut tx = self.store.begin().await?;
            tx.insert_organization(&org).await?;
            tx.commit().await?;

            info!(org_id = %org.org_id, "Organization created");
            Ok(org)
        })
        .await
    }

    pub async fn get_organization(&self, org_id: Uuid) -> LedgerResult<Organization> {
        let mut tx = self.store.begin().await?;
        Self::require_organization(tx.as_mut(), org_id).await
    }

    // -------------------------------------------------------------------------
    // Quotes
    // -------------------------------------------------------------------------

    /// Number, total and persist a new draft quote with its lines.
    #[instrument(skip(self, input), fields(org_id = %org_id))]
    pub async fn create_quote(&self, org_id: Uuid, input: CreateQuote) -> LedgerResult<Quote> {
        observe("create_quote", async {
            let lines = build_lines(&input.lines)?;
            let totals = compute_totals(&lines)?;

            let mut tx = self.store.begin().await?;
            Self::require_organization(tx.as_mut(), org_id).await?;
            let number = self
                .numbering
                .issue_in(tx.as_mut(), org_id, DocumentType::Quote)
                .await?;

            let quote = Quote {
                quote_id: Uuid::new_v4(),
                org_id,
                client_ref: input.client_ref,
                number,
                status: QuoteStatus::Draft,
                currency: input
                    .currency
                    .unwrap_or_else(|| self.config.default_currency.clone()),
                totals,
                valid_until: input.valid_until,
                created_utc: Utc::now(),
                lines,
            };
            tx.insert_quote(&quote).await?;
            tx.commit().await?;

            record_issued(DocumentType::Quote);
            info!(
                quote_id = %quote.quote_id,
                number = %quote.number,
                total_ttc = %quote.totals.total_ttc,
                "Quote created"
            );
            Ok(quote)
        })
        .await
    }

    pub async fn get_quote(&self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Quote> {
        let mut tx = self.store.begin().await?;
        tx.lock_quote(org_id, quote_id)
            .await?
            .ok_or(LedgerError::QuoteNotFound(quote_id))
    }

    /// Apply a lifecycle action. Converted quotes are frozen.
    #[instrument(skip(self), fields(org_id = %org_id, quote_id = %quote_id, action = %action))]
    pub async fn transition_quote(
        &self,
        org_id: Uuid,
        quote_id: Uuid,
        action: QuoteAction,
    ) -> LedgerResult<Quote> {
        observe("transition_quote", async {
            let mut tx = self.store.begin().await?;
            let mut quote = tx
                .lock_quote(org_id, quote_id)
                .await?
                .ok_or(LedgerError::QuoteNotFound(quote_id))?;

            if tx.find_invoice_by_quote(org_id, quote_id).await?.is_some() {
                return Err(LedgerError::InvalidQuoteStatus {
                    quote_id,
                    status: quote.status,
                    reason: "quote has already been converted",
                });
            }

            let next = action.apply(quote.status).ok_or_else(|| {
                warn!(status = %quote.status, "Rejected quote transition");
                LedgerError::InvalidQuoteStatus {
                    quote_id,
                    status: quote.status,
                    reason: "transition not allowed from this status",
                }
            })?;

            tx.update_quote_status(org_id, quote_id, next).await?;
            tx.commit().await?;

            info!(from = %quote.status, to = %next, "Quote status changed");
            quote.status = next;
            Ok(quote)
        })
        .await
    }

    pub async fn send_quote(&self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Quote> {
        self.transition_quote(org_id, quote_id, QuoteAction::Send).await
    }

    pub async fn accept_quote(&self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Quote> {
        self.transition_quote(org_id, quote_id, QuoteAction::Accept)
            .await
    }

    pub async fn sign_quote(&self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Quote> {
        self.transition_quote(org_id, quote_id, QuoteAction::Sign).await
    }

    pub async fn reject_quote(&self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Quote> {
        self.transition_quote(org_id, quote_id, QuoteAction::Reject)
            .await
    }

    pub async fn expire_quote(&self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Quote> {
        self.transition_quote(org_id, quote_id, QuoteAction::Expire)
            .await
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    /// Create a draft invoice directly, without a quote.
    #[instrument(skip(self, input), fields(org_id = %org_id))]
    pub async fn create_invoice(&self, org_id: Uuid, input: CreateInvoice) -> LedgerResult<Invoice> {
        observe("create_invoice", async {
            let lines = build_lines(&input.lines)?;
            let totals = compute_totals(&lines)?;
            let created_utc = Utc::now();

            let mut tx = self.store.begin().await?;
            let org = Self::require_organization(tx.as_mut(), org_id).await?;
            let terms = self.payment_terms(&org, input.payment_terms_days);
            let due_date = due_date(created_utc.date_naive(), terms)?;

            let number = self
                .numbering
                .issue_in(tx.as_mut(), org_id, DocumentType::Invoice)
                .await?;

            let invoice = Invoice {
                invoice_id: Uuid::new_v4(),
                org_id,
                client_ref: input.client_ref,
                quote_id: None,
                number,
                status: InvoiceStatus::Draft,
                currency: input
                    .currency
                    .unwrap_or_else(|| self.config.default_currency.clone()),
                issue_date: None,
                due_date,
                totals,
                amount_paid: Decimal::ZERO,
                paid_utc: None,
                created_utc,
                lines,
            };
            tx.insert_invoice(&invoice).await?;
            tx.commit().await?;

            record_issued(DocumentType::Invoice);
            record_status(invoice.status);
            info!(
                invoice_id = %invoice.invoice_id,
                number = %invoice.number,
                due_date = %invoice.due_date,
                "Invoice created"
            );
            Ok(invoice)
        })
        .await
    }

    pub async fn get_invoice(&self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<Invoice> {
        let mut tx = self.store.begin().await?;
        tx.lock_invoice(org_id, invoice_id)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))
    }

    pub async fn list_invoices(
        &self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> LedgerResult<Vec<Invoice>> {
        let mut tx = self.store.begin().await?;
        tx.list_invoices(org_id, filter).await
    }

    /// Issue a draft invoice: `draft → sent`, stamping the issue date (today by default).
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn send_invoice(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        issue_date: Option<NaiveDate>,
    ) -> LedgerResult<Invoice> {
        observe("send_invoice", async {
            let mut tx = self.store.begin().await?;
            let mut invoice = tx
                .lock_invoice(org_id, invoice_id)
                .await?
                .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

            if invoice.status != InvoiceStatus::Draft {
                return Err(LedgerError::InvalidInvoiceStatus {
                    invoice_id,
                    status: invoice.status,
                    reason: "only draft invoices can be sent",
                });
            }

            let base = InvoiceState {
                status: InvoiceStatus::Sent,
                issue_date: Some(issue_date.unwrap_or_else(Self::today)),
                ..invoice.state()
            };
            let payments = tx.list_payments(org_id, invoice_id).await?;
            let state = InvoiceState::derive(&base, invoice.totals.total_ttc, &payments);
            tx.update_invoice_state(org_id, invoice_id, &state).await?;
            tx.commit().await?;

            record_status(state.status);
            info!(number = %invoice.number, status = %state.status, "Invoice sent");
            apply_state(&mut invoice, &state);
            Ok(invoice)
        })
        .await
    }

    /// Cancel an invoice that carries no payments.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn cancel_invoice(&self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<Invoice> {
        observe("cancel_invoice", async {
            let mut tx = self.store.begin().await?;
            let mut invoice = tx
                .lock_invoice(org_id, invoice_id)
                .await?
                .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

            if matches!(invoice.status, InvoiceStatus::Cancelled | InvoiceStatus::Paid) {
                return Err(LedgerError::InvalidInvoiceStatus {
                    invoice_id,
                    status: invoice.status,
                    reason: "invoice can no longer be cancelled",
                });
            }
            if !tx.list_payments(org_id, invoice_id).await?.is_empty() {
                return Err(LedgerError::InvalidInvoiceStatus {
                    invoice_id,
                    status: invoice.status,
                    reason: "reverse its payments before cancelling",
                });
            }

            let state = InvoiceState {
                status: InvoiceStatus::Cancelled,
                ..invoice.state()
            };
            tx.update_invoice_state(org_id, invoice_id, &state).await?;
            tx.commit().await?;

            record_status(state.status);
            info!(number = %invoice.number, "Invoice cancelled");
            apply_state(&mut invoice, &state);
            Ok(invoice)
        })
        .await
    }

    /// Flag every open invoice due before `as_of` as overdue. Returns the flagged invoices.
    #[instrument(skip(self), fields(org_id = %org_id, as_of = %as_of))]
    pub async fn mark_overdue(&self, org_id: Uuid, as_of: NaiveDate) -> LedgerResult<Vec<Invoice>> {
        observe("mark_overdue", async {
            let mut tx = self.store.begin().await?;
            Self::require_organization(tx.as_mut(), org_id).await?;

            let filter = InvoiceFilter {
                statuses: Some(vec![InvoiceStatus::Sent, InvoiceStatus::PartiallyPaid]),
                due_before: Some(as_of),
                ..Default::default()
            };
            let candidates = tx.list_invoices(org_id, &filter).await?;

            let mut flagged = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                // Re-read under lock; the listing is not locked.
                let Some(mut invoice) = tx.lock_invoice(org_id, candidate.invoice_id).await? else {
                    continue;
                };
                if !filter.matches(&invoice) {
                    continue;
                }
                let state = InvoiceState {
                    status: InvoiceStatus::Overdue,
                    ..invoice.state()
                };
                tx.update_invoice_state(org_id, invoice.invoice_id, &state)
                    .await?;
                apply_state(&mut invoice, &state);
                flagged.push(invoice);
            }
            tx.commit().await?;

            for _ in &flagged {
                record_status(InvoiceStatus::Overdue);
            }
            info!(count = flagged.len(), "Overdue invoices flagged");
            Ok(flagged)
        })
        .await
    }

    /// Recompute the cached payment state of an invoice from its payments and
    /// repair it when it has drifted.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn reconcile_invoice_status(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> LedgerResult<InvoiceBalance> {
        observe("reconcile_invoice_status", async {
            let mut tx = self.store.begin().await?;
            let invoice = tx
                .lock_invoice(org_id, invoice_id)
                .await?
                .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

            let cached = invoice.state();
            let payments = tx.list_payments(org_id, invoice_id).await?;
            let derived = InvoiceState::derive(&cached, invoice.totals.total_ttc, &payments);

            if !cached.drifted_from(&derived) {
                return Ok(InvoiceBalance::new(&invoice, &cached));
            }

            warn!(
                cached_status = %cached.status,
                cached_paid = %cached.amount_paid,
                derived_status = %derived.status,
                derived_paid = %derived.amount_paid,
                "Invoice payment state drifted; repairing"
            );
            tx.update_invoice_state(org_id, invoice_id, &derived).await?;
            tx.commit().await?;

            record_status(derived.status);
            Ok(InvoiceBalance::new(&invoice, &derived))
        })
        .await
    }

    /// Invoice headers with no line items but non-zero totals.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_orphaned_invoices(&self, org_id: Uuid) -> LedgerResult<Vec<Invoice>> {
        let mut tx = self.store.begin().await?;
        Self::require_organization(tx.as_mut(), org_id).await?;

        let orphans: Vec<Invoice> = tx
            .list_invoices(org_id, &InvoiceFilter::default())
            .await?
            .into_iter()
            .filter(is_orphaned)
            .collect();

        for orphan in &orphans {
            warn!(
                invoice_id = %orphan.invoice_id,
                number = %orphan.number,
                "Invoice header has no line items"
            );
        }
        Ok(orphans)
    }
}

pub(crate) fn is_orphaned(invoice: &Invoice) -> bool {
    invoice.lines.is_empty() && invoice.totals != Totals::ZERO
}

pub(crate) fn apply_state(invoice: &mut Invoice, state: &InvoiceState) {
    invoice.status = state.status;
    invoice.amount_paid = state.amount_paid;
    invoice.paid_utc = state.paid_utc;
    invoice.issue_date = state.issue_date;
}
