//! PostgreSQL store tests.
//!
//! Require a running database: set `TEST_DATABASE_URL` and run with
//! `--ignored`.

mod common;

use common::{accepted_quote, create_org, date, init_tracing, payment};
use futures::future::join_all;
use ledger_engine::config::{EngineConfig, ExportConfig};
use ledger_engine::error::LedgerError;
use ledger_engine::models::InvoiceStatus;
use ledger_engine::store::{LedgerStore, PgStore};
use ledger_engine::LedgerEngine;
use rust_decimal_macros::dec;
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;

async fn pg_engine() -> LedgerEngine {
    init_tracing();
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL store tests");
    let store = PgStore::connect(&url, 10, 1)
        .await
        .expect("Failed to connect to test database");
    store
        .run_migrations()
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn LedgerStore> = Arc::new(store);
    LedgerEngine::new(store, EngineConfig::default(), ExportConfig::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
#[serial]
async fn concurrent_conversions_of_distinct_quotes_are_gapless() {
    let engine = pg_engine().await;
    let org = create_org(&engine).await;

    let mut quote_ids = Vec::new();
    for _ in 0..10 {
        quote_ids.push(accepted_quote(&engine, org.org_id).await.quote_id);
    }

    let tasks = quote_ids.into_iter().map(|quote_id| {
        let engine = engine.clone();
        let org_id = org.org_id;
        tokio::spawn(async move {
            loop {
                match engine.convert_quote_to_invoice(org_id, quote_id, None).await {
                    Err(e) if e.is_retryable() => continue,
                    other => break other,
                }
            }
        })
    });

    let numbers: HashSet<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().invoice_number.to_string())
        .collect();

    let expected: HashSet<String> = (1..=10).map(|n| format!("INV-{n:05}")).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
#[serial]
async fn concurrent_conversions_of_one_quote_create_one_invoice() {
    let engine = pg_engine().await;
    let org = create_org(&engine).await;
    let quote = accepted_quote(&engine, org.org_id).await;

    let tasks = (0..6).map(|_| {
        let engine = engine.clone();
        let (org_id, quote_id) = (org.org_id, quote.quote_id);
        tokio::spawn(async move { engine.convert_quote_to_invoice(org_id, quote_id, None).await })
    });

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    let invoice_ids: HashSet<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|c| c.invoice_id)
        .collect();
    let created = results
        .iter()
        .filter(|r| r.as_ref().is_ok_and(|c| c.is_new()))
        .count();

    assert_eq!(created, 1);
    assert_eq!(invoice_ids.len(), 1);
    assert!(results
        .iter()
        .all(|r| r.is_ok() || matches!(r, Err(LedgerError::WriteConflict(_)))));
}

#[tokio::test]
#[ignore]
#[serial]
async fn payments_round_trip_through_postgres() {
    let engine = pg_engine().await;
    let org = create_org(&engine).await;
    let quote = accepted_quote(&engine, org.org_id).await;
    let conversion = engine
        .convert_quote_to_invoice(org.org_id, quote.quote_id, None)
        .await
        .unwrap();
    engine
        .send_invoice(org.org_id, conversion.invoice_id, Some(date(2025, 1, 10)))
        .await
        .unwrap();

    engine
        .record_payment(
            org.org_id,
            payment(conversion.invoice_id, dec!(500.00), date(2025, 1, 12)),
        )
        .await
        .unwrap();
    let second = engine
        .record_payment(
            org.org_id,
            payment(conversion.invoice_id, dec!(700.00), date(2025, 1, 15)),
        )
        .await
        .unwrap();
    assert_eq!(second.balance.status, InvoiceStatus::Paid);

    let balance = engine
        .reverse_payment(org.org_id, second.payment.payment_id)
        .await
        .unwrap();
    assert_eq!(balance.status, InvoiceStatus::Sent);
    assert_eq!(balance.paid_total, dec!(500.00));

    let invoice = engine
        .get_invoice(org.org_id, conversion.invoice_id)
        .await
        .unwrap();
    assert_eq!(invoice.lines.len(), 2);
    assert_eq!(invoice.amount_paid, dec!(500.00));
    assert_eq!(invoice.paid_utc, None);

    let export = engine
        .generate_ledger_export(org.org_id, date(2025, 1, 1), date(2025, 1, 31), "123456789")
        .await
        .unwrap();
    assert_eq!(export.entries.len(), 4);
}
