//! PostgreSQL record store.
//!
//! Transactions run at READ COMMITTED; writers serialize on the rows they
//! `SELECT ... FOR UPDATE` (sequence counters, quotes, invoices).

use super::{LedgerStore, StoreTx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    DocumentNumber, DocumentType, Invoice, InvoiceFilter, InvoiceState, LineItem, Organization,
    Payment, Quote, QuoteStatus, Totals,
};
use crate::services::metrics::STORE_OPERATION_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use prometheus::HistogramTimer;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = r#"invoice_id, org_id, client_ref, quote_id, invoice_number, status,
    currency, issue_date, due_date, total_ht, total_vat, total_ttc, amount_paid, paid_utc, created_utc"#;

const QUOTE_COLUMNS: &str = r#"quote_id, org_id, client_ref, quote_number, status, currency,
    total_ht, total_vat, total_ttc, valid_until, created_utc"#;

const PAYMENT_COLUMNS: &str =
    "payment_id, org_id, invoice_id, amount, method, paid_utc, note, created_utc";

const LINE_ITEM_COLUMNS: &str =
    "line_item_id, quote_id, invoice_id, position, description, quantity, unit_price_ht, vat_rate, unit";

/// Connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new connection pool.
    #[instrument(skip(database_url), fields(service = "ledger-engine"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> LedgerResult<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::Store(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> LedgerResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Store(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> LedgerResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn timer(operation: &str) -> HistogramTimer {
    STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .start_timer()
}

/// Serialization failures and deadlocks are conflicts the caller may retry.
fn db_error(context: &str, e: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &e {
        if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
            return LedgerError::WriteConflict(format!("{}: {}", context, db_err));
        }
    }
    LedgerError::Store(anyhow::anyhow!("{}: {}", context, e))
}

fn unique_violation(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or_default())
        }
        _ => None,
    }
}

fn corrupt(what: &str, err: String) -> LedgerError {
    LedgerError::Store(anyhow::anyhow!("Corrupt {} row: {}", what, err))
}

#[derive(FromRow)]
struct OrganizationRow {
    org_id: Uuid,
    name: String,
    payment_terms_days: Option<i32>,
    created_utc: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            org_id: row.org_id,
            name: row.name,
            payment_terms_days: row.payment_terms_days,
            created_utc: row.created_utc,
        }
    }
}

#[derive(FromRow)]
struct QuoteRow {
    quote_id: Uuid,
    org_id: Uuid,
    client_ref: String,
    quote_number: String,
    status: String,
    currency: String,
    total_ht: Decimal,
    total_vat: Decimal,
    total_ttc: Decimal,
    valid_until: Option<NaiveDate>,
    created_utc: DateTime<Utc>,
}

impl QuoteRow {
    fn into_quote(self, lines: Vec<LineItem>) -> LedgerResult<Quote> {
        Ok(Quote {
            quote_id: self.quote_id,
            org_id: self.org_id,
            client_ref: self.client_ref,
            number: DocumentNumber::from(self.quote_number),
            status: self.status.parse().map_err(|e| corrupt("quote", e))?,
            currency: self.currency,
            totals: Totals {
                total_ht: self.total_ht,
                total_vat: self.total_vat,
                total_ttc: self.total_ttc,
            },
            valid_until: self.valid_until,
            created_utc: self.created_utc,
            lines,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    org_id: Uuid,
    client_ref: String,
    quote_id: Option<Uuid>,
    invoice_number: String,
    status: String,
    currency: String,
    issue_date: Option<NaiveDate>,
    due_date: NaiveDate,
    total_ht: Decimal,
    total_vat: Decimal,
    total_ttc: Decimal,
    amount_paid: Decimal,
    paid_utc: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, lines: Vec<LineItem>) -> LedgerResult<Invoice> {
        Ok(Invoice {
            invoice_id: self.invoice_id,
            org_id: self.org_id,
            client_ref: self.client_ref,
            quote_id: self.quote_id,
            number: DocumentNumber::from(self.invoice_number),
            status: self.status.parse().map_err(|e| corrupt("invoice", e))?,
            currency: self.currency,
            issue_date: self.issue_date,
            due_date: self.due_date,
            totals: Totals {
                total_ht: self.total_ht,
                total_vat: self.total_vat,
                total_ttc: self.total_ttc,
            },
            amount_paid: self.amount_paid,
            paid_utc: self.paid_utc,
            created_utc: self.created_utc,
            lines,
        })
    }
}

#[derive(FromRow)]
struct LineItemRow {
    line_item_id: Uuid,
    quote_id: Option<Uuid>,
    invoice_id: Option<Uuid>,
    position: i32,
    description: String,
    quantity: Decimal,
    unit_price_ht: Decimal,
    vat_rate: Decimal,
    unit: Option<String>,
}

impl LineItemRow {
    fn owner(&self) -> Option<Uuid> {
        self.invoice_id.or(self.quote_id)
    }

    fn into_line(self) -> LineItem {
        LineItem {
            line_item_id: self.line_item_id,
            position: self.position,
            description: self.description,
            quantity: self.quantity,
            unit_price_ht: self.unit_price_ht,
            vat_rate: self.vat_rate,
            unit: self.unit,
        }
    }
}

#[derive(FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    org_id: Uuid,
    invoice_id: Uuid,
    amount: Decimal,
    method: String,
    paid_utc: DateTime<Utc>,
    note: Option<String>,
    created_utc: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            payment_id: row.payment_id,
            org_id: row.org_id,
            invoice_id: row.invoice_id,
            amount: row.amount,
            method: row.method.parse().map_err(|e| corrupt("payment", e))?,
            paid_utc: row.paid_utc,
            note: row.note,
            created_utc: row.created_utc,
        })
    }
}

impl PgTx {
    /// Line items of the given documents, grouped by owner and ordered by position.
    async fn load_lines(
        &mut self,
        owner_column: &str,
        owners: &[Uuid],
    ) -> LedgerResult<HashMap<Uuid, Vec<LineItem>>> {
        if owners.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE {owner_column} = ANY($1) ORDER BY position"
        ))
        .bind(owners)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load line items", e))?;

        let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for row in rows {
            if let Some(owner) = row.owner() {
                grouped.entry(owner).or_default().push(row.into_line());
            }
        }
        Ok(grouped)
    }

    async fn insert_lines(
        &mut self,
        org_id: Uuid,
        quote_id: Option<Uuid>,
        invoice_id: Option<Uuid>,
        lines: &[LineItem],
    ) -> LedgerResult<()> {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO line_items (
                    line_item_id, org_id, quote_id, invoice_id, position, description,
                    quantity, unit_price_ht, vat_rate, unit
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(line.line_item_id)
            .bind(org_id)
            .bind(quote_id)
            .bind(invoice_id)
            .bind(line.position)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price_ht)
            .bind(line.vat_rate)
            .bind(&line.unit)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                LedgerError::PersistenceFailure(format!(
                    "Failed to write line item {}: {}",
                    line.line_item_id, e
                ))
            })?;
        }
        Ok(())
    }

    async fn invoices_with_lines(&mut self, rows: Vec<InvoiceRow>) -> LedgerResult<Vec<Invoice>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.invoice_id).collect();
        let mut lines = self.load_lines("invoice_id", &ids).await?;
        rows.into_iter()
            .map(|row| {
                let invoice_lines = lines.remove(&row.invoice_id).unwrap_or_default();
                row.into_invoice(invoice_lines)
            })
            .collect()
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_organization(&mut self, org: &Organization) -> LedgerResult<()> {
        let _timer = timer("insert_organization");
        sqlx::query(
            r#"
            INSERT INTO organizations (org_id, name, payment_terms_days, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(org.org_id)
        .bind(&org.name)
        .bind(org.payment_terms_days)
        .bind(org.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => LedgerError::WriteConflict(format!(
                "organization {} already exists",
                org.org_id
            )),
            None => db_error("Failed to create organization", e),
        })?;
        Ok(())
    }

    async fn get_organization(&mut self, org_id: Uuid) -> LedgerResult<Option<Organization>> {
        let _timer = timer("get_organization");
        let row = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT org_id, name, payment_terms_days, created_utc
            FROM organizations
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to get organization", e))?;
        Ok(row.map(Organization::from))
    }

    async fn lock_sequence(
        &mut self,
        org_id: Uuid,
        document_type: DocumentType,
    ) -> LedgerResult<i64> {
        let _timer = timer("lock_sequence");
        let conflict = |e: sqlx::Error| match db_error("Failed to lock sequence", e) {
            LedgerError::WriteConflict(_) => LedgerError::NumberingConflict {
                org_id,
                document_type,
            },
            other => other,
        };

        sqlx::query(
            r#"
            INSERT INTO document_sequences (org_id, document_type, last_value)
            VALUES ($1, $2, 0)
            ON CONFLICT (org_id, document_type) DO NOTHING
            "#,
        )
        .bind(org_id)
        .bind(document_type.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(conflict)?;

        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT last_value FROM document_sequences
            WHERE org_id = $1 AND document_type = $2
            FOR UPDATE
            "#,
        )
        .bind(org_id)
        .bind(document_type.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(conflict)
    }

    async fn advance_sequence(
        &mut self,
        org_id: Uuid,
        document_type: DocumentType,
        expected: i64,
    ) -> LedgerResult<i64> {
        let _timer = timer("advance_sequence");
        let next = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE document_sequences
            SET last_value = last_value + 1, updated_utc = NOW()
            WHERE org_id = $1 AND document_type = $2 AND last_value = $3
            RETURNING last_value
            "#,
        )
        .bind(org_id)
        .bind(document_type.as_str())
        .bind(expected)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| match db_error("Failed to advance sequence", e) {
            LedgerError::WriteConflict(_) => LedgerError::NumberingConflict {
                org_id,
                document_type,
            },
            other => other,
        })?;

        next.ok_or(LedgerError::NumberingConflict {
            org_id,
            document_type,
        })
    }

    async fn insert_quote(&mut self, quote: &Quote) -> LedgerResult<()> {
        let _timer = timer("insert_quote");
        sqlx::query(
            r#"
            INSERT INTO quotes (
                quote_id, org_id, client_ref, quote_number, status, currency,
                total_ht, total_vat, total_ttc, valid_until, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(quote.quote_id)
        .bind(quote.org_id)
        .bind(&quote.client_ref)
        .bind(quote.number.as_str())
        .bind(quote.status.as_str())
        .bind(&quote.currency)
        .bind(quote.totals.total_ht)
        .bind(quote.totals.total_vat)
        .bind(quote.totals.total_ttc)
        .bind(quote.valid_until)
        .bind(quote.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => LedgerError::NumberingConflict {
                org_id: quote.org_id,
                document_type: DocumentType::Quote,
            },
            None => db_error("Failed to create quote", e),
        })?;

        self.insert_lines(quote.org_id, Some(quote.quote_id), None, &quote.lines)
            .await
    }

    async fn lock_quote(&mut self, org_id: Uuid, quote_id: Uuid) -> LedgerResult<Option<Quote>> {
        let _timer = timer("lock_quote");
        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE org_id = $1 AND quote_id = $2 FOR UPDATE"
        ))
        .bind(org_id)
        .bind(quote_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to lock quote", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.load_lines("quote_id", &[quote_id]).await?;
        row.into_quote(lines.remove(&quote_id).unwrap_or_default())
            .map(Some)
    }

    async fn update_quote_status(
        &mut self,
        org_id: Uuid,
        quote_id: Uuid,
        status: QuoteStatus,
    ) -> LedgerResult<()> {
        let _timer = timer("update_quote_status");
        let result = sqlx::query("UPDATE quotes SET status = $3 WHERE org_id = $1 AND quote_id = $2")
            .bind(org_id)
            .bind(quote_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to update quote status", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::QuoteNotFound(quote_id));
        }
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        let _timer = timer("insert_invoice");
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, org_id, client_ref, quote_id, invoice_number, status, currency,
                issue_date, due_date, total_ht, total_vat, total_ttc, amount_paid, paid_utc, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.org_id)
        .bind(&invoice.client_ref)
        .bind(invoice.quote_id)
        .bind(invoice.number.as_str())
        .bind(invoice.status.as_str())
        .bind(&invoice.currency)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.totals.total_ht)
        .bind(invoice.totals.total_vat)
        .bind(invoice.totals.total_ttc)
        .bind(invoice.amount_paid)
        .bind(invoice.paid_utc)
        .bind(invoice.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("invoices_quote_id_key") => LedgerError::WriteConflict(format!(
                "an invoice already references quote {}",
                invoice.quote_id.unwrap_or_default()
            )),
            Some(_) => LedgerError::NumberingConflict {
                org_id: invoice.org_id,
                document_type: DocumentType::Invoice,
            },
            None => db_error("Failed to create invoice", e),
        })?;

        self.insert_lines(invoice.org_id, None, Some(invoice.invoice_id), &invoice.lines)
            .await
    }

    async fn lock_invoice(
        &mut self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> LedgerResult<Option<Invoice>> {
        let _timer = timer("lock_invoice");
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE org_id = $1 AND invoice_id = $2 FOR UPDATE"
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to lock invoice", e))?;

        match row {
            Some(row) => Ok(self.invoices_with_lines(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_invoice_by_quote(
        &mut self,
        org_id: Uuid,
        quote_id: Uuid,
    ) -> LedgerResult<Option<Invoice>> {
        let _timer = timer("find_invoice_by_quote");
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE org_id = $1 AND quote_id = $2"
        ))
        .bind(org_id)
        .bind(quote_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to look up invoice by quote", e))?;

        match row {
            Some(row) => Ok(self.invoices_with_lines(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_invoice_state(
        &mut self,
        org_id: Uuid,
        invoice_id: Uuid,
        state: &InvoiceState,
    ) -> LedgerResult<()> {
        let _timer = timer("update_invoice_state");
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3, amount_paid = $4, paid_utc = $5, issue_date = $6
            WHERE org_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(org_id)
        .bind(invoice_id)
        .bind(state.status.as_str())
        .bind(state.amount_paid)
        .bind(state.paid_utc)
        .bind(state.issue_date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update invoice state", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::InvoiceNotFound(invoice_id));
        }
        Ok(())
    }

    async fn list_invoices(
        &mut self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> LedgerResult<Vec<Invoice>> {
        let _timer = timer("list_invoices");
        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|s| s.iter().map(|status| status.as_str().to_string()).collect());

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1
              AND ($2::text[] IS NULL OR status = ANY($2))
              AND ($3::date IS NULL OR COALESCE(issue_date, (created_utc AT TIME ZONE 'UTC')::date) >= $3)
              AND ($4::date IS NULL OR COALESCE(issue_date, (created_utc AT TIME ZONE 'UTC')::date) <= $4)
              AND ($5::date IS NULL OR due_date < $5)
            ORDER BY created_utc, invoice_id
            "#
        ))
        .bind(org_id)
        .bind(statuses)
        .bind(filter.effective_from)
        .bind(filter.effective_to)
        .bind(filter.due_before)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to list invoices", e))?;

        self.invoices_with_lines(rows).await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> LedgerResult<()> {
        let _timer = timer("insert_payment");
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, org_id, invoice_id, amount, method, paid_utc, note, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.org_id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(payment.paid_utc)
        .bind(&payment.note)
        .bind(payment.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to record payment", e))?;
        Ok(())
    }

    async fn get_payment(
        &mut self,
        org_id: Uuid,
        payment_id: Uuid,
    ) -> LedgerResult<Option<Payment>> {
        let _timer = timer("get_payment");
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE org_id = $1 AND payment_id = $2"
        ))
        .bind(org_id)
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to get payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn delete_payment(&mut self, org_id: Uuid, payment_id: Uuid) -> LedgerResult<bool> {
        let _timer = timer("delete_payment");
        let result = sqlx::query("DELETE FROM payments WHERE org_id = $1 AND payment_id = $2")
            .bind(org_id)
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to delete payment", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_payments(&mut self, org_id: Uuid, invoice_id: Uuid) -> LedgerResult<Vec<Payment>> {
        let _timer = timer("list_payments");
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE org_id = $1 AND invoice_id = $2
            ORDER BY paid_utc, payment_id
            "#
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to list payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn list_payments_between(
        &mut self,
        org_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<Payment>> {
        let _timer = timer("list_payments_between");
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE org_id = $1 AND paid_utc >= $2 AND paid_utc < $3
            ORDER BY paid_utc, payment_id
            "#
        ))
        .bind(org_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to list payments in period", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await.map_err(|e| match db_error("Failed to commit", e) {
            LedgerError::Store(err) => LedgerError::PersistenceFailure(err.to_string()),
            other => other,
        })
    }
}
