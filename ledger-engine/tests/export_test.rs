//! Integration tests for the ledger export.

mod common;

use common::{at, create_org, date, line, memory_engine, payment};
use ledger_engine::error::LedgerError;
use ledger_engine::models::{CreateInvoice, EntryKind, Invoice, RecordPayment};
use ledger_engine::LedgerEngine;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn issued_invoice(
    engine: &LedgerEngine,
    org_id: Uuid,
    description: &str,
    issue_date: chrono::NaiveDate,
) -> Invoice {
    let invoice = engine
        .create_invoice(
            org_id,
            CreateInvoice {
                client_ref: "CLIENT-42".to_string(),
                currency: None,
                payment_terms_days: None,
                lines: vec![line(description, dec!(10), dec!(100.00))],
            },
        )
        .await
        .unwrap();
    engine
        .send_invoice(org_id, invoice.invoice_id, Some(issue_date))
        .await
        .unwrap()
}

#[tokio::test]
async fn renders_sale_tax_and_settlement_rows() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    let invoice = issued_invoice(&engine, org.org_id, "Consulting services", date(2025, 1, 10)).await;
    engine
        .record_payment(
            org.org_id,
            payment(invoice.invoice_id, dec!(1200.00), date(2025, 1, 15)),
        )
        .await
        .unwrap();

    let export = engine
        .generate_ledger_export(org.org_id, date(2025, 1, 1), date(2025, 1, 31), "123 456 789")
        .await
        .unwrap();

    assert_eq!(export.filename, "123456789FEC20250131.txt");
    assert_eq!(
        export.content,
        "JournalCode|EntryDate|AccountNumber|CounterAccount|PieceRef|Label|Debit|Credit|Currency\n\
         VT|20250110|706000|411000|INV-00001|Consulting services|0,00|1000,00|EUR\n\
         VT|20250110|445710|411000|INV-00001|VAT INV-00001|0,00|200,00|EUR\n\
         BQ|20250115|512000|411000|INV-00001|Payment INV-00001 (bank_transfer)|1200,00|0,00|EUR\n"
    );

    let kinds: Vec<EntryKind> = export.entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EntryKind::Sale, EntryKind::Tax, EntryKind::Settlement]
    );
    let sequences: Vec<u32> = export.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
async fn export_is_deterministic() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;
    for day in [3, 9, 21] {
        let invoice = issued_invoice(&engine, org.org_id, "Retainer", date(2025, 1, day)).await;
        engine
            .record_payment(
                org.org_id,
                payment(invoice.invoice_id, dec!(600.00), date(2025, 1, day + 2)),
            )
            .await
            .unwrap();
    }

    let first = engine
        .generate_ledger_export(org.org_id, date(2025, 1, 1), date(2025, 1, 31), "123456789")
        .await
        .unwrap();
    let second = engine
        .generate_ledger_export(org.org_id, date(2025, 1, 1), date(2025, 1, 31), "123456789")
        .await
        .unwrap();

    assert_eq!(first.content, second.content);
    assert_eq!(first.entries.len(), 9);

    let refs: Vec<&str> = first
        .entries
        .iter()
        .map(|e| e.piece_ref.as_str())
        .collect();
    let mut sorted = refs.clone();
    sorted.sort_unstable();
    assert_eq!(refs, sorted);
}

#[tokio::test]
async fn excludes_drafts_cancelled_and_out_of_range_documents() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;

    // Issued in December, paid in January: neither row belongs to January.
    let december = issued_invoice(&engine, org.org_id, "December work", date(2024, 12, 20)).await;
    engine
        .record_payment(
            org.org_id,
            payment(december.invoice_id, dec!(1200.00), date(2025, 1, 5)),
        )
        .await
        .unwrap();

    let cancelled = issued_invoice(&engine, org.org_id, "Cancelled work", date(2025, 1, 8)).await;
    engine
        .cancel_invoice(org.org_id, cancelled.invoice_id)
        .await
        .unwrap();

    engine
        .create_invoice(
            org.org_id,
            CreateInvoice {
                client_ref: "CLIENT-9".to_string(),
                currency: None,
                payment_terms_days: None,
                lines: vec![line("Draft work", dec!(1), dec!(10.00))],
            },
        )
        .await
        .unwrap();

    let kept = issued_invoice(&engine, org.org_id, "January work", date(2025, 1, 31)).await;
    engine
        .record_payment(
            org.org_id,
            RecordPayment {
                paid_utc: at(date(2025, 1, 31), 23),
                ..payment(kept.invoice_id, dec!(100.00), date(2025, 1, 31))
            },
        )
        .await
        .unwrap();

    let export = engine
        .generate_ledger_export(org.org_id, date(2025, 1, 1), date(2025, 1, 31), "123456789")
        .await
        .unwrap();

    assert!(export
        .entries
        .iter()
        .all(|e| e.invoice_id == kept.invoice_id));
    assert_eq!(export.entries.len(), 3);
    assert_eq!(export.entries[2].kind, EntryKind::Settlement);
    assert_eq!(export.entries[2].debit, dec!(100.00));
}

#[tokio::test]
async fn empty_range_yields_only_the_header() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;

    let export = engine
        .generate_ledger_export(org.org_id, date(2025, 6, 1), date(2025, 6, 30), "987654321")
        .await
        .unwrap();
    assert!(export.entries.is_empty());
    assert_eq!(
        export.content,
        "JournalCode|EntryDate|AccountNumber|CounterAccount|PieceRef|Label|Debit|Credit|Currency\n"
    );
}

#[tokio::test]
async fn rejects_invalid_tax_ids() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;

    for tax_id in ["12345678", "1234567890", "12345678A", ""] {
        let result = engine
            .generate_ledger_export(org.org_id, date(2025, 1, 1), date(2025, 1, 31), tax_id)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidTaxId(_))), "{tax_id:?}");
    }
}

#[tokio::test]
async fn rejects_inverted_date_ranges() {
    let (engine, _store) = memory_engine();
    let org = create_org(&engine).await;

    let result = engine
        .generate_ledger_export(org.org_id, date(2025, 2, 1), date(2025, 1, 1), "123456789")
        .await;
    assert!(matches!(result, Err(LedgerError::InvalidDateRange { .. })));
}
