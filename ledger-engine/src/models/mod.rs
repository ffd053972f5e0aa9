//! Domain models for ledger-engine.

mod document;
mod export;
mod invoice;
mod line_item;
mod organization;
mod payment;
mod quote;

pub use document::{DocumentNumber, DocumentType};
pub use export::{AccountingEntry, EntryKind, ExportDocument};
pub use invoice::{
    CreateInvoice, Invoice, InvoiceBalance, InvoiceFilter, InvoiceState, InvoiceStatus,
};
pub use line_item::{LineItem, NewLineItem, Totals};
pub use organization::{CreateOrganization, Organization};
pub use payment::{Payment, PaymentMethod, RecordPayment};
pub use quote::{CreateQuote, Quote, QuoteAction, QuoteStatus};
