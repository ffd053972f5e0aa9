//! Numbering authority.
//!
//! Numbers are issued inside the transaction that writes the numbered
//! document: the sequence row is locked, advanced with a compare-and-swap and
//! released only when that transaction commits or rolls back. A failed write
//! therefore never consumes a number, and concurrent issuers for the same
//! `(organization, document type)` queue on the lock.

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{DocumentNumber, DocumentType};
use crate::services::metrics::NUMBERS_ISSUED_TOTAL;
use crate::store::{LedgerStore, StoreTx};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct NumberingAuthority {
    store: Arc<dyn LedgerStore>,
    quote_prefix: String,
    invoice_prefix: String,
    width: usize,
}

impl NumberingAuthority {
    pub fn new(store: Arc<dyn LedgerStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            quote_prefix: config.quote_number_prefix.clone(),
            invoice_prefix: config.invoice_number_prefix.clone(),
            width: config.number_pad_width,
        }
    }

    pub fn prefix(&self, document_type: DocumentType) -> &str {
        match document_type {
            DocumentType::Quote => &self.quote_prefix,
            DocumentType::Invoice => &self.invoice_prefix,
        }
    }

    /// Issue and commit the next number for `(org_id, document_type)`.
    ///
    /// Used when the caller reserves a number outside any document write.
    /// Document creation paths issue through [`Self::issue_in`] instead.
    #[instrument(skip(self), fields(org_id = %org_id, document_type = %document_type))]
    pub async fn next_number(
        &self,
        org_id: Uuid,
        document_type: DocumentType,
    ) -> LedgerResult<DocumentNumber> {
        let mut tx = self.store.begin().await?;
        if tx.get_organization(org_id).await?.is_none() {
            return Err(LedgerError::OrganizationNotFound(org_id));
        }

        let number = self.issue_in(tx.as_mut(), org_id, document_type).await?;
        tx.commit().await?;

        record_issued(document_type);
        info!(number = %number, "Document number issued");
        Ok(number)
    }

    /// Issue the next number within an open transaction.
    ///
    /// The number only becomes durable when `tx` commits.
    pub(crate) async fn issue_in(
        &self,
        tx: &mut dyn StoreTx,
        org_id: Uuid,
        document_type: DocumentType,
    ) -> LedgerResult<DocumentNumber> {
        let last = tx.lock_sequence(org_id, document_type).await?;
        let next = tx.advance_sequence(org_id, document_type, last).await?;
        let number = DocumentNumber::new(self.prefix(document_type), next, self.width);
        debug!(org_id = %org_id, number = %number, "Reserved document number");
        Ok(number)
    }
}

/// Count a number once the transaction that issued it has committed.
pub(crate) fn record_issued(document_type: DocumentType) {
    NUMBERS_ISSUED_TOTAL
        .with_label_values(&[document_type.as_str()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organization;
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn setup() -> (MemoryStore, NumberingAuthority, Uuid) {
        let store = MemoryStore::new();
        let org_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        tx.insert_organization(&Organization {
            org_id,
            name: "Atelier".to_string(),
            payment_terms_days: None,
            created_utc: Utc::now(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let authority = NumberingAuthority::new(Arc::new(store.clone()), &EngineConfig::default());
        (store, authority, org_id)
    }

    #[tokio::test]
    async fn issues_consecutive_numbers_per_document_type() {
        let (_store, authority, org_id) = setup().await;

        let q1 = authority.next_number(org_id, DocumentType::Quote).await.unwrap();
        let i1 = authority.next_number(org_id, DocumentType::Invoice).await.unwrap();
        let q2 = authority.next_number(org_id, DocumentType::Quote).await.unwrap();

        assert_eq!(q1.as_str(), "Q-00001");
        assert_eq!(q2.as_str(), "Q-00002");
        assert_eq!(i1.as_str(), "INV-00001");
    }

    #[tokio::test]
    async fn rolled_back_issuance_leaves_no_gap() {
        let (store, authority, org_id) = setup().await;

        let mut tx = store.begin().await.unwrap();
        let reserved = authority
            .issue_in(tx.as_mut(), org_id, DocumentType::Invoice)
            .await
            .unwrap();
        assert_eq!(reserved.as_str(), "INV-00001");
        drop(tx);

        let issued = authority
            .next_number(org_id, DocumentType::Invoice)
            .await
            .unwrap();
        assert_eq!(issued.as_str(), "INV-00001");
    }

    #[tokio::test]
    async fn failed_commit_releases_the_number() {
        let (store, authority, org_id) = setup().await;

        store.fail_next_commit();
        let err = authority
            .next_number(org_id, DocumentType::Quote)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));

        let issued = authority.next_number(org_id, DocumentType::Quote).await.unwrap();
        assert_eq!(issued.as_str(), "Q-00001");
    }

    #[tokio::test]
    async fn unknown_organization_is_rejected() {
        let (_store, authority, _org_id) = setup().await;
        let err = authority
            .next_number(Uuid::new_v4(), DocumentType::Quote)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::OrganizationNotFound(_)));
    }
}
