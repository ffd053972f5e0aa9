//! Payment ledger.
//!
//! The invoice row is locked before the payment set is read, so the remaining
//! balance is always computed from persisted payments that no concurrent
//! writer can change until this transaction ends. The cached invoice state is
//! rewritten in the same transaction as the payment insert or delete.

use crate::config::DraftPaymentPolicy;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Invoice, InvoiceBalance, InvoiceState, InvoiceStatus, Payment, RecordPayment};
use crate::services::documents::record_status;
use crate::services::engine::{observe, LedgerEngine};
use crate::services::metrics::{PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A recorded payment and the invoice balance after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub balance: InvoiceBalance,
}

/// Amounts must be positive and expressed in whole cents.
pub fn validate_amount(amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(LedgerError::InvalidAmount(format!(
            "{} has more than two decimal places",
            amount
        )));
    }
    Ok(())
}

impl LedgerEngine {
    /// Base state a payment settles against, applying the draft payment policy.
    fn payable_base(&self, invoice: &Invoice, paid_on: NaiveDate) -> LedgerResult<InvoiceState> {
        let invalid = |reason: &'static str| LedgerError::InvalidInvoiceStatus {
            invoice_id: invoice.invoice_id,
            status: invoice.status,
            reason,
        };

        match invoice.status {
            InvoiceStatus::Cancelled => Err(invalid("cancelled invoices cannot be paid")),
            InvoiceStatus::Draft => match self.config.draft_payment_policy {
                DraftPaymentPolicy::Reject => {
                    Err(invalid("send the invoice before recording payments"))
                }
                DraftPaymentPolicy::Promote => {
                    info!(
                        invoice_id = %invoice.invoice_id,
                        "Promoting draft invoice to sent on first payment"
                    );
                    Ok(InvoiceState {
                        status: InvoiceStatus::Sent,
                        issue_date: invoice.issue_date.or(Some(paid_on)),
                        ..invoice.state()
                    })
                }
            },
            _ => Ok(invoice.state()),
        }
    }

    /// Record a payment against an invoice and recompute its payment state.
    #[instrument(
        skip(self, input),
        fields(org_id = %org_id, invoice_id = %input.invoice_id, amount = %input.amount, method = %input.method)
    )]
    pub async fn record_payment(
        &self,
        org_id: Uuid,
        input: RecordPayment,
    ) -> LedgerResult<PaymentReceipt> {
        observe("record_payment", async {
            validate_amount(input.amount)?;

            let mut tx = self.store.begin().await?;
            let invoice = tx
                .lock_invoice(org_id, input.invoice_id)
                .await?
                .ok_or(LedgerError::InvoiceNotFound(input.invoice_id))?;

            let base = self.payable_base(&invoice, input.paid_utc.date_naive())?;

            let mut payments = tx.list_payments(org_id, invoice.invoice_id).await?;
            let paid_total: Decimal = payments.iter().map(|p| p.amount).sum();
            let remaining = invoice.totals.total_ttc - paid_total;
            if input.amount > remaining {
                warn!(remaining = %remaining, "Payment exceeds remaining balance");
                return Err(LedgerError::InvalidAmount(format!(
                    "{} exceeds the remaining balance of {} on {}",
                    input.amount, remaining, invoice.number
                )));
            }

            let payment = Payment {
                payment_id: Uuid::new_v4(),
                org_id,
                invoice_id: invoice.invoice_id,
                amount: input.amount,
                method: input.method,
                paid_utc: input.paid_utc,
                note: input.note,
                created_utc: Utc::now(),
            };
            tx.insert_payment(&payment).await?;
            payments.push(payment.clone());

            let state = InvoiceState::derive(&base, invoice.totals.total_ttc, &payments);
            tx.update_invoice_state(org_id, invoice.invoice_id, &state)
                .await?;
            tx.commit().await?;

            PAYMENTS_TOTAL
                .with_label_values(&["recorded", payment.method.as_str()])
                .inc();
            PAYMENT_AMOUNT_TOTAL
                .with_label_values(&[invoice.currency.as_str()])
                .inc_by(payment.amount.to_f64().unwrap_or_default());
            if state.status != invoice.status {
                record_status(state.status);
            }
            info!(
                payment_id = %payment.payment_id,
                number = %invoice.number,
                paid_total = %state.amount_paid,
                status = %state.status,
                "Payment recorded"
            );

            Ok(PaymentReceipt {
                balance: InvoiceBalance::new(&invoice, &state),
                payment,
            })
        })
        .await
    }

    /// Delete a payment and recompute its invoice's payment state.
    #[instrument(skip(self), fields(org_id = %org_id, payment_id = %payment_id))]
    pub async fn reverse_payment(
        &self,
        org_id: Uuid,
        payment_id: Uuid,
    ) -> LedgerResult<InvoiceBalance> {
        observe("reverse_payment", async {
            let mut tx = self.store.begin().await?;
            let payment = tx
                .get_payment(org_id, payment_id)
                .await?
                .ok_or(LedgerError::PaymentNotFound(payment_id))?;

            let invoice = tx
                .lock_invoice(org_id, payment.invoice_id)
                .await?
                .ok_or(LedgerError::InvoiceNotFound(payment.invoice_id))?;

            // A concurrent reversal may have won the race for the invoice lock.
            if !tx.delete_payment(org_id, payment_id).await? {
                return Err(LedgerError::PaymentNotFound(payment_id));
            }

            let payments = tx.list_payments(org_id, invoice.invoice_id).await?;
            let state = InvoiceState::derive(&invoice.state(), invoice.totals.total_ttc, &payments);
            tx.update_invoice_state(org_id, invoice.invoice_id, &state)
                .await?;
            tx.commit().await?;

            PAYMENTS_TOTAL
                .with_label_values(&["reversed", payment.method.as_str()])
                .inc();
            if state.status != invoice.status {
                record_status(state.status);
            }
            info!(
                number = %invoice.number,
                amount = %payment.amount,
                paid_total = %state.amount_paid,
                status = %state.status,
                "Payment reversed"
            );

            Ok(InvoiceBalance::new(&invoice, &state))
        })
        .await
    }

    /// Balance of an invoice, computed from its persisted payments.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn invoice_balance(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> LedgerResult<InvoiceBalance> {
        let mut tx = self.store.begin().await?;
        let invoice = tx
            .lock_invoice(org_id, invoice_id)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;
        let payments = tx.list_payments(org_id, invoice_id).await?;

        let derived = InvoiceState::derive(&invoice.state(), invoice.totals.total_ttc, &payments);
        let cached = invoice.state();
        if cached.drifted_from(&derived) {
            warn!(
                cached_status = %cached.status,
                derived_status = %derived.status,
                "Cached invoice state disagrees with payments"
            );
            return Ok(InvoiceBalance::new(&invoice, &derived));
        }
        Ok(InvoiceBalance::new(&invoice, &cached))
    }

    /// Payments of one invoice, oldest first.
    pub async fn list_payments(&self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<Vec<Payment>> {
        let mut tx = self.store.begin().await?;
        tx.lock_invoice(org_id, invoice_id)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;
        tx.list_payments(org_id, invoice_id).await
    }
}
