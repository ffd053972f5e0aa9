//! Regulatory ledger export.
//!
//! Entries are a pure function of the invoices and payments in range, so the
//! rendered file is byte-identical for unchanged records and an unchanged range.
//!
//! File layout: a header row, then one row per entry with nine pipe-separated
//! columns (journal code, entry date `YYYYMMDD`, account, counter-account,
//! piece reference, label, debit, credit, currency). Amounts carry two
//! decimals with a comma separator. Rows end with `\n`.
//!
//! Sales rows carry the receivable side in the counter-account column: each
//! revenue and tax row credits its account against the receivable account, so
//! the receivable debit of an invoice is the sum of those credits and has no
//! row of its own. Settlement rows debit the bank against the same receivable.

use crate::config::ExportConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AccountingEntry, EntryKind, ExportDocument, Invoice, InvoiceFilter, InvoiceStatus, Payment,
};
use crate::services::documents::is_orphaned;
use crate::services::engine::{observe, LedgerEngine};
use crate::services::line_items::round_money;
use crate::services::metrics::EXPORTS_TOTAL;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{error, info, instrument};
use uuid::Uuid;

pub const HEADER: &str =
    "JournalCode|EntryDate|AccountNumber|CounterAccount|PieceRef|Label|Debit|Credit|Currency";

const TAX_ID_DIGITS: usize = 9;

/// Strip whitespace and require exactly nine ASCII digits.
pub fn normalize_tax_id(raw: &str) -> LedgerResult<String> {
    let tax_id: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if tax_id.len() != TAX_ID_DIGITS || !tax_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(LedgerError::InvalidTaxId(raw.to_string()));
    }
    Ok(tax_id)
}

/// `<taxId><tag><YYYYMMDD of end>.txt`
pub fn export_filename(tax_id: &str, tag: &str, end: NaiveDate) -> String {
    format!("{}{}{}.txt", tax_id, tag, end.format("%Y%m%d"))
}

/// `1234.5` → `1234,50`
pub fn format_amount(amount: Decimal) -> String {
    round_money(amount).to_string().replace('.', ",")
}

/// Labels must not break the row structure.
fn sanitize_label(label: &str) -> String {
    label.replace(['|', '\r', '\n'], " ")
}

/// Revenue per line, rounded to cents; the last line absorbs the rounding
/// residual so the rows add up to the invoice's `total_ht`.
fn line_revenue(invoice: &Invoice) -> LedgerResult<Vec<Decimal>> {
    let overflow = || {
        LedgerError::PersistenceFailure(format!(
            "invoice {} has a line amount outside the decimal range",
            invoice.number
        ))
    };

    let mut amounts = invoice
        .lines
        .iter()
        .map(|line| line.total_ht().map(round_money).ok_or_else(overflow))
        .collect::<LedgerResult<Vec<Decimal>>>()?;

    if let Some((last, rest)) = amounts.split_last_mut() {
        let allocated = rest
            .iter()
            .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(*amount))
            .ok_or_else(overflow)?;
        *last = round_money(
            invoice
                .totals
                .total_ht
                .checked_sub(allocated)
                .ok_or_else(overflow)?,
        );
    }
    Ok(amounts)
}

/// Derive the entries for `invoices` and the in-range `payments` that settle them.
///
/// Invoices are emitted in ascending number order: sale rows (one per line),
/// then the tax row, then settlements in ascending `paid_utc` order.
pub fn build_entries(
    config: &ExportConfig,
    invoices: &[Invoice],
    payments: &[Payment],
) -> LedgerResult<Vec<AccountingEntry>> {
    let mut ordered: Vec<&Invoice> = invoices.iter().collect();
    ordered.sort_by(|a, b| {
        a.number
            .cmp(&b.number)
            .then_with(|| a.invoice_id.cmp(&b.invoice_id))
    });

    let mut settlements: HashMap<Uuid, Vec<&Payment>> = HashMap::new();
    for payment in payments {
        settlements.entry(payment.invoice_id).or_default().push(payment);
    }
    for group in settlements.values_mut() {
        group.sort_by(|a, b| {
            a.paid_utc
                .cmp(&b.paid_utc)
                .then_with(|| a.payment_id.cmp(&b.payment_id))
        });
    }

    let mut entries = Vec::new();
    let push = |entries: &mut Vec<AccountingEntry>, entry: AccountingEntry| {
        let sequence = entries.len() as u32 + 1;
        entries.push(AccountingEntry { sequence, ..entry });
    };

    for invoice in ordered {
        if is_orphaned(invoice) {
            error!(
                invoice_id = %invoice.invoice_id,
                number = %invoice.number,
                "Invoice has totals but no line items"
            );
            return Err(LedgerError::PersistenceFailure(format!(
                "invoice {} has no line items",
                invoice.number
            )));
        }

        let entry_date = invoice.effective_date();
        let piece_ref = invoice.number.to_string();

        for (line, credit) in invoice.lines.iter().zip(line_revenue(invoice)?) {
            push(
                &mut entries,
                AccountingEntry {
                    sequence: 0,
                    kind: EntryKind::Sale,
                    invoice_id: invoice.invoice_id,
                    journal_code: config.sales_journal.clone(),
                    entry_date,
                    account: config.revenue_account.clone(),
                    counter_account: config.receivable_account.clone(),
                    piece_ref: piece_ref.clone(),
                    label: sanitize_label(&line.description),
                    debit: Decimal::ZERO,
                    credit,
                    currency: invoice.currency.clone(),
                },
            );
        }

        if !invoice.totals.total_vat.is_zero() {
            push(
                &mut entries,
                AccountingEntry {
                    sequence: 0,
                    kind: EntryKind::Tax,
                    invoice_id: invoice.invoice_id,
                    journal_code: config.sales_journal.clone(),
                    entry_date,
                    account: config.vat_account.clone(),
                    counter_account: config.receivable_account.clone(),
                    piece_ref: piece_ref.clone(),
                    label: sanitize_label(&format!("VAT {}", invoice.number)),
                    debit: Decimal::ZERO,
                    credit: round_money(invoice.totals.total_vat),
                    currency: invoice.currency.clone(),
                },
            );
        }

        for payment in settlements.remove(&invoice.invoice_id).unwrap_or_default() {
            push(
                &mut entries,
                AccountingEntry {
                    sequence: 0,
                    kind: EntryKind::Settlement,
                    invoice_id: invoice.invoice_id,
                    journal_code: config.bank_journal.clone(),
                    entry_date: payment.paid_utc.date_naive(),
                    account: config.bank_account.clone(),
                    counter_account: config.receivable_account.clone(),
                    piece_ref: piece_ref.clone(),
                    label: sanitize_label(&format!(
                        "Payment {} ({})",
                        invoice.number, payment.method
                    )),
                    debit: round_money(payment.amount),
                    credit: Decimal::ZERO,
                    currency: invoice.currency.clone(),
                },
            );
        }
    }

    Ok(entries)
}

/// Serialize entries, header first.
pub fn render(entries: &[AccountingEntry]) -> String {
    let mut content = String::with_capacity(64 * (entries.len() + 1));
    content.push_str(HEADER);
    content.push('\n');

    for entry in entries {
        let row = [
            entry.journal_code.clone(),
            entry.entry_date.format("%Y%m%d").to_string(),
            entry.account.clone(),
            entry.counter_account.clone(),
            entry.piece_ref.clone(),
            entry.label.clone(),
            format_amount(entry.debit),
            format_amount(entry.credit),
            entry.currency.clone(),
        ];
        content.push_str(&row.join("|"));
        content.push('\n');
    }
    content
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl LedgerEngine {
    /// Build the ledger file of an organization for `[start, end]`.
    ///
    /// Invoices are selected by effective date (issue date, else creation
    /// date); drafts and cancelled invoices are left out. Payments are
    /// included when their `paid_utc` falls on a day inside the range.
    #[instrument(skip(self, tax_id), fields(org_id = %org_id, start = %start, end = %end))]
    pub async fn generate_ledger_export(
        &self,
        org_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        tax_id: &str,
    ) -> LedgerResult<ExportDocument> {
        let result = observe("generate_ledger_export", async {
            let tax_id = normalize_tax_id(tax_id)?;
            if start > end {
                return Err(LedgerError::InvalidDateRange { start, end });
            }

            let mut tx = self.store.begin().await?;
            Self::require_organization(tx.as_mut(), org_id).await?;

            let filter = InvoiceFilter {
                statuses: Some(vec![
                    InvoiceStatus::Sent,
                    InvoiceStatus::PartiallyPaid,
                    InvoiceStatus::Paid,
                    InvoiceStatus::Overdue,
                ]),
                effective_from: Some(start),
                effective_to: Some(end),
                due_before: None,
            };
            let invoices = tx.list_invoices(org_id, &filter).await?;

            let until = end
                .checked_add_days(Days::new(1))
                .map(start_of_day)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let payments = tx
                .list_payments_between(org_id, start_of_day(start), until)
                .await?;

            let entries = build_entries(&self.export, &invoices, &payments)?;
            let document = ExportDocument {
                filename: export_filename(&tax_id, &self.export.export_tag, end),
                content: render(&entries),
                entries,
            };

            info!(
                filename = %document.filename,
                invoices = invoices.len(),
                entries = document.entries.len(),
                "Ledger export generated"
            );
            Ok(document)
        })
        .await;

        let label = if result.is_ok() { "generated" } else { "failed" };
        EXPORTS_TOTAL.with_label_values(&[label]).inc();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentNumber, LineItem, PaymentMethod, Totals};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn line(description: &str, quantity: Decimal, unit_price_ht: Decimal) -> LineItem {
        LineItem {
            line_item_id: Uuid::new_v4(),
            position: 1,
            description: description.to_string(),
            quantity,
            unit_price_ht,
            vat_rate: dec!(0.20),
            unit: None,
        }
    }

    fn invoice(counter: i64, lines: Vec<LineItem>, totals: Totals) -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            client_ref: "ACME".to_string(),
            quote_id: None,
            number: DocumentNumber::new("INV-", counter, 5),
            status: InvoiceStatus::Sent,
            currency: "EUR".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            due_date: NaiveDate::from_ymd_opt(2025, 2, 9).unwrap(),
            totals,
            amount_paid: Decimal::ZERO,
            paid_utc: None,
            created_utc: Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
            lines,
        }
    }

    fn payment(invoice: &Invoice, amount: Decimal, day: u32) -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            org_id: invoice.org_id,
            invoice_id: invoice.invoice_id,
            amount,
            method: PaymentMethod::BankTransfer,
            paid_utc: Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap(),
            note: None,
            created_utc: Utc::now(),
        }
    }

    fn totals(ht: Decimal, vat: Decimal) -> Totals {
        Totals {
            total_ht: ht,
            total_vat: vat,
            total_ttc: ht + vat,
        }
    }

    #[test]
    fn normalizes_tax_ids() {
        assert_eq!(normalize_tax_id("123 456 789").unwrap(), "123456789");
        assert!(matches!(
            normalize_tax_id("12345678"),
            Err(LedgerError::InvalidTaxId(_))
        ));
        assert!(matches!(
            normalize_tax_id("12345678A"),
            Err(LedgerError::InvalidTaxId(_))
        ));
        assert!(normalize_tax_id("1234567890").is_err());
    }

    #[test]
    fn formats_amounts_with_comma_and_two_decimals() {
        assert_eq!(format_amount(dec!(1000)), "1000,00");
        assert_eq!(format_amount(dec!(0)), "0,00");
        assert_eq!(format_amount(dec!(12.5)), "12,50");
        assert_eq!(format_amount(dec!(0.005)), "0,01");
    }

    #[test]
    fn builds_the_filename_from_the_end_date() {
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(
            export_filename("123456789", "FEC", end),
            "123456789FEC20250131.txt"
        );
    }

    #[test]
    fn last_line_absorbs_the_rounding_residual() {
        // Exact HT: 3 × 0.333 = 0.999 → total 1.00; rounded lines 0.33 + 0.33 + 0.34.
        let lines = vec![
            line("A", dec!(1), dec!(0.333)),
            line("B", dec!(1), dec!(0.333)),
            line("C", dec!(1), dec!(0.333)),
        ];
        let inv = invoice(1, lines, totals(dec!(1.00), dec!(0.20)));

        let entries = build_entries(&ExportConfig::default(), &[inv], &[]).unwrap();
        let credits: Vec<Decimal> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Sale)
            .map(|e| e.credit)
            .collect();
        assert_eq!(credits, vec![dec!(0.33), dec!(0.33), dec!(0.34)]);
        assert_eq!(credits.iter().copied().sum::<Decimal>(), dec!(1.00));
    }

    #[test]
    fn orders_by_invoice_number_then_payment_date() {
        let second = invoice(
            2,
            vec![line("Design", dec!(1), dec!(100))],
            totals(dec!(100), dec!(20)),
        );
        let tenth = invoice(
            10,
            vec![line("Build", dec!(1), dec!(50))],
            totals(dec!(50), dec!(10)),
        );
        let payments = vec![
            payment(&second, dec!(70), 20),
            payment(&second, dec!(50), 12),
            payment(&tenth, dec!(60), 5),
        ];

        let entries = build_entries(
            &ExportConfig::default(),
            &[tenth.clone(), second.clone()],
            &payments,
        )
        .unwrap();

        let summary: Vec<(String, EntryKind, Decimal, Decimal)> = entries
            .iter()
            .map(|e| (e.piece_ref.clone(), e.kind, e.debit, e.credit))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("INV-00002".to_string(), EntryKind::Sale, dec!(0), dec!(100)),
                ("INV-00002".to_string(), EntryKind::Tax, dec!(0), dec!(20)),
                ("INV-00002".to_string(), EntryKind::Settlement, dec!(50), dec!(0)),
                ("INV-00002".to_string(), EntryKind::Settlement, dec!(70), dec!(0)),
                ("INV-00010".to_string(), EntryKind::Sale, dec!(0), dec!(50)),
                ("INV-00010".to_string(), EntryKind::Tax, dec!(0), dec!(10)),
                ("INV-00010".to_string(), EntryKind::Settlement, dec!(60), dec!(0)),
            ]
        );
        let sequences: Vec<u32> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=7).collect::<Vec<u32>>());
    }

    #[test]
    fn omits_the_tax_row_for_zero_vat() {
        let mut zero_rated = line("Export sale", dec!(2), dec!(40));
        zero_rated.vat_rate = Decimal::ZERO;
        let inv = invoice(1, vec![zero_rated], totals(dec!(80), dec!(0)));

        let entries = build_entries(&ExportConfig::default(), &[inv], &[]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Sale);
    }

    #[test]
    fn refuses_invoices_without_lines() {
        let orphan = invoice(3, Vec::new(), totals(dec!(100), dec!(20)));
        let err = build_entries(&ExportConfig::default(), &[orphan], &[]).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
    }

    #[test]
    fn renders_rows_without_delimiters_in_labels() {
        let inv = invoice(
            1,
            vec![line("Setup | config\r\nday one", dec!(1), dec!(100))],
            totals(dec!(100), dec!(20)),
        );
        let entries = build_entries(&ExportConfig::default(), &[inv], &[]).unwrap();
        let content = render(&entries);

        let rows: Vec<&str> = content.lines().collect();
        assert_eq!(rows[0], HEADER);
        assert_eq!(
            rows[1],
            "VT|20250110|706000|411000|INV-00001|Setup   config  day one|0,00|100,00|EUR"
        );
        assert!(rows.iter().all(|row| row.split('|').count() == 9));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn sales_rows_credit_against_the_receivable_for_the_full_total() {
        let inv = invoice(
            1,
            vec![line("Consulting services", dec!(10), dec!(100))],
            totals(dec!(1000.00), dec!(200.00)),
        );
        let config = ExportConfig::default();
        let entries = build_entries(&config, &[inv], &[]).unwrap();

        let sales: Vec<&AccountingEntry> = entries
            .iter()
            .filter(|e| e.journal_code == config.sales_journal)
            .collect();
        assert!(sales
            .iter()
            .all(|e| e.counter_account == config.receivable_account && e.debit.is_zero()));
        let receivable: Decimal = sales.iter().map(|e| e.credit).sum();
        assert_eq!(receivable, dec!(1200.00));
    }

    #[test]
    fn out_of_range_stored_line_is_an_error() {
        let mut unbounded = line("Unbounded", Decimal::MAX, dec!(2));
        unbounded.vat_rate = Decimal::ZERO;
        let inv = invoice(4, vec![unbounded], totals(dec!(100), dec!(0)));

        let err = build_entries(&ExportConfig::default(), &[inv], &[]).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
    }
}
