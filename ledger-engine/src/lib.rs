//! Ledger engine: gapless document numbering, quote to invoice conversion,
//! a payment ledger that keeps invoice status consistent with its payments,
//! and a deterministic regulatory ledger export.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use services::LedgerEngine;
