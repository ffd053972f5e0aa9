//! Accounting entries derived at export time. Never persisted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// What produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Revenue for one invoice line.
    Sale,
    /// VAT collected on an invoice.
    Tax,
    /// A payment settling the client receivable.
    Settlement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountingEntry {
    /// 1-based position in the export.
    pub sequence: u32,
    pub kind: EntryKind,
    pub invoice_id: Uuid,
    pub journal_code: String,
    pub entry_date: NaiveDate,
    pub account: String,
    pub counter_account: String,
    pub piece_ref: String,
    pub label: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub currency: String,
}

/// A rendered ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDocument {
    pub filename: String,
    pub content: String,
    pub entries: Vec<AccountingEntry>,
}

impl ExportDocument {
    pub fn as_bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }
}
