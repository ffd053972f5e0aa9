//! The engine facade shared by every entry point.

use crate::config::{EngineConfig, ExportConfig};
use crate::error::LedgerResult;
use crate::services::metrics::{record_error, OPERATION_DURATION};
use crate::services::numbering::NumberingAuthority;
use crate::store::LedgerStore;
use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;

/// Financial document and ledger engine.
///
/// Every public operation takes the organization id explicitly and runs as one
/// store transaction. Cloning is cheap; clones share the store.
#[derive(Clone)]
pub struct LedgerEngine {
    pub(crate) store: Arc<dyn LedgerStore>,
    pub(crate) numbering: NumberingAuthority,
    pub(crate) config: EngineConfig,
    pub(crate) export: ExportConfig,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig, export: ExportConfig) -> Self {
        let numbering = NumberingAuthority::new(Arc::clone(&store), &config);
        Self {
            store,
            numbering,
            config,
            export,
        }
    }

    pub fn numbering(&self) -> &NumberingAuthority {
        &self.numbering
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn health_check(&self) -> LedgerResult<()> {
        self.store.health_check().await
    }

    pub(crate) fn today() -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Time an operation and count its failure, if any.
pub(crate) async fn observe<T, F>(operation: &'static str, work: F) -> LedgerResult<T>
where
    F: Future<Output = LedgerResult<T>>,
{
    let timer = OPERATION_DURATION
        .with_label_values(&[operation])
        .start_timer();
    let result = work.await;
    timer.observe_duration();

    if let Err(e) = &result {
        record_error(operation, e);
    }
    result
}
