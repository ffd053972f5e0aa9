//! Services module for ledger-engine.

pub mod conversion;
pub mod documents;
pub mod engine;
pub mod export;
pub mod line_items;
pub mod metrics;
pub mod numbering;
pub mod payments;

pub use conversion::{Conversion, ConversionOutcome};
pub use engine::LedgerEngine;
pub use export::{build_entries, export_filename, normalize_tax_id, render};
pub use line_items::{clone_lines, compute_totals};
pub use metrics::{get_metrics, init_metrics};
pub use numbering::NumberingAuthority;
pub use payments::PaymentReceipt;
