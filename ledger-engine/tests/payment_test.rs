//! Integration tests for the payment ledger.

mod common;

use common::{create_org, date, line, memory_engine, memory_engine_with, payment};
use ledger_engine::config::{DraftPaymentPolicy, EngineConfig};
use ledger_engine::error::LedgerError;
use ledger_engine::models::{CreateInvoice, Invoice, InvoiceState, InvoiceStatus};
use ledger_engine::store::LedgerStore;
use ledger_engine::LedgerEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// A draft invoice for 1200.00 TTC.
async fn draft_invoice(engine: &LedgerEngine, org_id: Uuid) -> Invoice {
    engine
        .create_invoice(
            org_id,
            CreateInvoice {
                client_ref: "CLIENT-42".to_string(),
                currency: None,
                payment_terms_days: None,
                lines: vec![
                    line("Website redesign", dec!(1), dec!(800.00)),
                    line("Hosting setup", dec!(2), dec!(100.00)),
                ],
            },
        )
        .await
        .unwrap()
}

async fn sent_invoice(engine: &LedgerEngine, org_id: Uuid) -> Invoice {
    let invoice = draft_invoice(engine, org_id).await;
    engine
        .send_invoice(org_id, invoice.invoice_id, Some(date(2025, 1, 10)))
        .await
        .unwrap()
}

#[tokio::test]
async fn partial_full_and_reversed_payments_drive_status() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;
    assert_eq!(invoice.status, InvoiceStatus::Sent);
    assert_eq!(invoice.totals.total_ttc, dec!(1200.00));

    let first = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(500.00), date(2025, 1, 12)),
        )
        .await
        .unwrap();
    assert_eq!(first.balance.status, InvoiceStatus::PartiallyPaid);
    assert_eq!(first.balance.paid_total, dec!(500.00));
    assert_eq!(first.balance.remaining, dec!(700.00));
    assert_eq!(first.balance.paid_utc, None);

    let second = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(700.00), date(2025, 1, 15)),
        )
        .await
        .unwrap();
    assert_eq!(second.balance.status, InvoiceStatus::Paid);
    assert_eq!(second.balance.remaining, Decimal::ZERO);
    assert_eq!(second.balance.paid_utc, Some(second.payment.paid_utc));

    let stored = engine
        .get_invoice(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert_eq!(stored.amount_paid, dec!(1200.00));
    assert_eq!(stored.paid_utc, Some(second.payment.paid_utc));

    let reversed = engine
        .reverse_payment(org.org_id, second.payment.payment_id)
        .await
        .unwrap();
    assert_eq!(reversed.status, InvoiceStatus::Sent);
    assert_eq!(reversed.paid_total, dec!(500.00));
    assert_eq!(reversed.paid_utc, None);

    let stored = engine
        .get_invoice(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(stored.status, InvoiceStatus::Sent);
    assert_eq!(stored.amount_paid, dec!(500.00));
    assert_eq!(stored.paid_utc, None);

    let payments = engine
        .list_payments(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].payment_id, first.payment.payment_id);
}

#[tokio::test]
async fn overpayment_is_rejected_and_nothing_is_persisted() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;

    engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(1000.00), date(2025, 1, 12)),
        )
        .await
        .unwrap();

    let result = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(200.01), date(2025, 1, 13)),
        )
        .await;
    assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));

    let balance = engine
        .invoice_balance(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(balance.paid_total, dec!(1000.00));
    assert_eq!(balance.status, InvoiceStatus::PartiallyPaid);
    assert_eq!(
        engine
            .list_payments(org.org_id, invoice.invoice_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn rejects_invalid_amounts() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;

    for amount in [dec!(0), dec!(-10.00), dec!(10.001)] {
        let result = engine
            .record_payment(
                org.org_id,
                payment(invoice.invoice_id, amount, date(2025, 1, 12)),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_never_exceed_the_total() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let engine = engine.clone();
            let org_id = org.org_id;
            let record = payment(invoice.invoice_id, dec!(400.00), date(2025, 1, 12));
            tokio::spawn(async move { engine.record_payment(org_id, record).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(LedgerError::InvalidAmount(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 3);

    let balance = engine
        .invoice_balance(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(balance.paid_total, dec!(1200.00));
    assert_eq!(balance.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn draft_invoice_is_promoted_on_first_payment() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = draft_invoice(&engine, org.org_id).await;

    let receipt = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(100.00), date(2025, 2, 3)),
        )
        .await
        .unwrap();
    assert_eq!(receipt.balance.status, InvoiceStatus::PartiallyPaid);

    let stored = engine
        .get_invoice(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(stored.issue_date, Some(date(2025, 2, 3)));
}

#[tokio::test]
async fn draft_invoice_rejects_payments_under_reject_policy() {
    let (engine, _store) = memory_engine_with(EngineConfig {
        draft_payment_policy: DraftPaymentPolicy::Reject,
        ..EngineConfig::default()
    });
    let org = create_org(&engine).await;
    let invoice = draft_invoice(&engine, org.org_id).await;

    let result = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(100.00), date(2025, 2, 3)),
        )
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InvalidInvoiceStatus {
            status: InvoiceStatus::Draft,
            ..
        })
    ));
}

#[tokio::test]
async fn cancelled_invoice_cannot_be_paid() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;
    engine
        .cancel_invoice(org.org_id, invoice.invoice_id)
        .await
        .unwrap();

    let result = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(100.00), date(2025, 2, 3)),
        )
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InvalidInvoiceStatus {
            status: InvoiceStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn reversing_an_unknown_payment_fails() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let missing = Uuid::new_v4();

    let result = engine.reverse_payment(org.org_id, missing).await;
    assert!(matches!(result, Err(LedgerError::PaymentNotFound(id)) if id == missing));
}

#[tokio::test]
async fn overdue_invoice_stays_overdue_until_settled() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;

    let flagged = engine
        .mark_overdue(org.org_id, invoice.due_date + chrono::Days::new(1))
        .await
        .unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].status, InvoiceStatus::Overdue);

    let partial = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(200.00), date(2025, 3, 1)),
        )
        .await
        .unwrap();
    assert_eq!(partial.balance.status, InvoiceStatus::Overdue);

    let full = engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(1000.00), date(2025, 3, 2)),
        )
        .await
        .unwrap();
    assert_eq!(full.balance.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn reconcile_repairs_drifted_cache() {
    let (engine, store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;
    engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(500.00), date(2025, 1, 12)),
        )
        .await
        .unwrap();

    // Corrupt the cached amount behind the engine's back.
    let mut tx = store.begin().await.unwrap();
    tx.update_invoice_state(
        org.org_id,
        invoice.invoice_id,
        &InvoiceState {
            status: InvoiceStatus::PartiallyPaid,
            amount_paid: dec!(200.00),
            paid_utc: None,
            issue_date: invoice.issue_date,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let balance = engine
        .invoice_balance(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(balance.paid_total, dec!(500.00));

    let repaired = engine
        .reconcile_invoice_status(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(repaired.paid_total, dec!(500.00));
    assert_eq!(repaired.status, InvoiceStatus::PartiallyPaid);

    let stored = engine
        .get_invoice(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(stored.amount_paid, dec!(500.00));
}

#[tokio::test]
async fn zero_total_draft_stays_draft_through_balance_and_reconcile() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = engine
        .create_invoice(
            org.org_id,
            CreateInvoice {
                client_ref: "CLIENT-42".to_string(),
                currency: None,
                payment_terms_days: None,
                lines: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.totals.total_ttc, Decimal::ZERO);

    let balance = engine
        .invoice_balance(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(balance.status, InvoiceStatus::Draft);

    let reconciled = engine
        .reconcile_invoice_status(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(reconciled.status, InvoiceStatus::Draft);

    let stored = engine
        .get_invoice(org.org_id, invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(stored.status, InvoiceStatus::Draft);
    assert_eq!(stored.issue_date, None);

    let sent = engine
        .send_invoice(org.org_id, invoice.invoice_id, Some(date(2025, 1, 10)))
        .await
        .unwrap();
    assert_eq!(sent.issue_date, Some(date(2025, 1, 10)));
}

#[tokio::test]
async fn cancel_requires_no_payments() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = sent_invoice(&engine, org.org_id).await;
    engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(100.00), date(2025, 1, 12)),
        )
        .await
        .unwrap();

    let result = engine.cancel_invoice(org.org_id, invoice.invoice_id).await;
    assert!(matches!(result, Err(LedgerError::InvalidInvoiceStatus { .. })));
}
