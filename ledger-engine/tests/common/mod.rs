//! Common test utilities for ledger-engine integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use ledger_engine::config::{EngineConfig, ExportConfig, LedgerConfig};
use ledger_engine::models::{
    CreateOrganization, CreateQuote, NewLineItem, Organization, PaymentMethod, Quote,
    RecordPayment,
};
use ledger_engine::startup::Application;
use ledger_engine::store::{LedgerStore, MemoryStore};
use ledger_engine::LedgerEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,ledger_engine=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Engine over a fresh in-memory store, plus the store for fault injection.
pub fn memory_engine() -> (LedgerEngine, MemoryStore) {
    memory_engine_with(EngineConfig::default())
}

pub fn memory_engine_with(config: EngineConfig) -> (LedgerEngine, MemoryStore) {
    init_tracing();
    let store = MemoryStore::new();
    let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let engine = LedgerEngine::new(shared, config, ExportConfig::default());
    (engine, store)
}

pub async fn create_org(engine: &LedgerEngine) -> Organization {
    engine
        .create_organization(CreateOrganization {
            name: "Atelier Dupont".to_string(),
            payment_terms_days: None,
        })
        .await
        .expect("Failed to create organization")
}

pub fn line(description: &str, quantity: Decimal, unit_price_ht: Decimal) -> NewLineItem {
    NewLineItem {
        description: description.to_string(),
        quantity,
        unit_price_ht,
        vat_rate: dec!(0.20),
        unit: None,
    }
}

/// A quote for 1000.00 HT at 20% VAT, moved through `sent` to `accepted`.
pub async fn accepted_quote(engine: &LedgerEngine, org_id: Uuid) -> Quote {
    let quote = engine
        .create_quote(
            org_id,
            CreateQuote {
                client_ref: "CLIENT-42".to_string(),
                currency: None,
                valid_until: None,
                lines: vec![
                    line("Website redesign", dec!(1), dec!(800.00)),
                    line("Hosting setup", dec!(2), dec!(100.00)),
                ],
            },
        )
        .await
        .expect("Failed to create quote");
    engine
        .send_quote(org_id, quote.quote_id)
        .await
        .expect("Failed to send quote");
    engine
        .accept_quote(org_id, quote.quote_id)
        .await
        .expect("Failed to accept quote")
}

pub fn at(date: NaiveDate, hour: u32) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).expect("valid time"))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn payment(invoice_id: Uuid, amount: Decimal, paid_on: NaiveDate) -> RecordPayment {
    RecordPayment {
        invoice_id,
        amount,
        method: PaymentMethod::BankTransfer,
        paid_utc: at(paid_on, 10),
        note: None,
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

/// Spawn the HTTP application on a random port over the in-memory store.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let app = Application::build(LedgerConfig::in_memory())
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", app.http_port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}
