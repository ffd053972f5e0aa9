//! Invoice model for ledger-engine.

use super::{DocumentNumber, LineItem, NewLineItem, Payment, Totals};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Sent, partially paid or overdue: money is still expected.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }

    /// Recompute the status from the settled amount.
    ///
    /// This is the only place payment-driven status is decided. `Cancelled` is
    /// terminal, an unpaid `Draft` stays a draft (even at a zero total) and
    /// `Overdue` is kept until the invoice is settled in full. A `Paid` invoice
    /// that drops below its total is demoted to `Sent`; any other open invoice
    /// with money on it is partially paid.
    pub fn settle(self, paid_total: Decimal, total_ttc: Decimal) -> InvoiceStatus {
        match self {
            InvoiceStatus::Cancelled => InvoiceStatus::Cancelled,
            InvoiceStatus::Draft if paid_total.is_zero() => InvoiceStatus::Draft,
            _ if paid_total >= total_ttc => InvoiceStatus::Paid,
            InvoiceStatus::Overdue => InvoiceStatus::Overdue,
            // Past-due is not re-derived here; `mark_overdue` restores it.
            InvoiceStatus::Paid => InvoiceStatus::Sent,
            _ if paid_total.is_zero() => InvoiceStatus::Sent,
            _ => InvoiceStatus::PartiallyPaid,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

/// Invoice header with its ordered line items.
///
/// `totals` is fixed at creation; `amount_paid`, `status` and `paid_utc` are a
/// cache of [`InvoiceState::derive`] over the invoice's payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub client_ref: String,
    pub quote_id: Option<Uuid>,
    pub number: DocumentNumber,
    pub status: InvoiceStatus,
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    #[serde(flatten)]
    pub totals: Totals,
    pub amount_paid: Decimal,
    pub paid_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub lines: Vec<LineItem>,
}

impl Invoice {
    /// Accounting date: the issue date, or the creation date for never-sent invoices.
    pub fn effective_date(&self) -> NaiveDate {
        self.issue_date.unwrap_or_else(|| self.created_utc.date_naive())
    }

    pub fn state(&self) -> InvoiceState {
        InvoiceState {
            status: self.status,
            amount_paid: self.amount_paid,
            paid_utc: self.paid_utc,
            issue_date: self.issue_date,
        }
    }
}

/// The mutable part of an invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceState {
    pub status: InvoiceStatus,
    pub amount_paid: Decimal,
    pub paid_utc: Option<DateTime<Utc>>,
    pub issue_date: Option<NaiveDate>,
}

impl InvoiceState {
    /// Derive the cached state purely from `payments` and the invoice's fixed total.
    ///
    /// `base` carries the non-payment part of the status (draft, overdue, cancelled)
    /// and the issue date. The paid timestamp is the latest payment date when the
    /// invoice is settled and cleared otherwise.
    pub fn derive(base: &InvoiceState, total_ttc: Decimal, payments: &[Payment]) -> InvoiceState {
        let amount_paid: Decimal = payments.iter().map(|p| p.amount).sum();
        let status = base.status.settle(amount_paid, total_ttc);
        let paid_utc = if status == InvoiceStatus::Paid {
            payments.iter().map(|p| p.paid_utc).max()
        } else {
            None
        };

        InvoiceState {
            status,
            amount_paid,
            paid_utc,
            issue_date: base.issue_date,
        }
    }

    /// Whether this cached state disagrees with one derived from the payments.
    ///
    /// `Sent` and `PartiallyPaid` both describe an open, not fully paid invoice
    /// and are not treated as drift from each other while money is on it.
    pub fn drifted_from(&self, derived: &InvoiceState) -> bool {
        let paid = |s: InvoiceStatus| s == InvoiceStatus::Paid;
        self.amount_paid != derived.amount_paid
            || self.paid_utc != derived.paid_utc
            || paid(self.status) != paid(derived.status)
            || (self.status == InvoiceStatus::PartiallyPaid && derived.amount_paid.is_zero())
    }
}

/// Balance view returned to callers after every payment operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceBalance {
    pub invoice_id: Uuid,
    pub number: DocumentNumber,
    pub status: InvoiceStatus,
    pub total_ttc: Decimal,
    pub paid_total: Decimal,
    pub remaining: Decimal,
    pub paid_utc: Option<DateTime<Utc>>,
}

impl InvoiceBalance {
    pub fn new(invoice: &Invoice, state: &InvoiceState) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            number: invoice.number.clone(),
            status: state.status,
            total_ttc: invoice.totals.total_ttc,
            paid_total: state.amount_paid,
            remaining: invoice.totals.total_ttc - state.amount_paid,
            paid_utc: state.paid_utc,
        }
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub statuses: Option<Vec<InvoiceStatus>>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub due_before: Option<NaiveDate>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&invoice.status) {
                return false;
            }
        }
        let effective = invoice.effective_date();
        if self.effective_from.is_some_and(|from| effective < from) {
            return false;
        }
        if self.effective_to.is_some_and(|to| effective > to) {
            return false;
        }
        if self.due_before.is_some_and(|date| invoice.due_date >= date) {
            return false;
        }
        true
    }
}

/// Input for creating an invoice directly (without a quote).
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub client_ref: String,
    pub currency: Option<String>,
    pub payment_terms_days: Option<i32>,
    pub lines: Vec<NewLineItem>,
}
