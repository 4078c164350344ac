use crate::schema::{CandidateTransaction, ImportResult};
use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence layer that accepts one normalized transaction at a time.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn create_transaction(&self, transaction: &CandidateTransaction) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistFailure {
    pub index: usize,
    pub description: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistReport {
    pub saved: usize,
    pub failures: Vec<PersistFailure>,
}

impl PersistReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Hand every transaction to the sink in order. A rejected record is
/// recorded in the report and does not stop the remaining ones.
pub async fn persist_transactions<K: TransactionSink + ?Sized>(
    result: &ImportResult,
    sink: &K,
) -> PersistReport {
    let mut report = PersistReport::default();

    for (index, transaction) in result.transactions.iter().enumerate() {
        match sink.create_transaction(transaction).await {
            Ok(()) => report.saved += 1,
            Err(e) => {
                warn!(
                    "Failed to save transaction #{} ({}): {}",
                    index, transaction.description, e
                );
                report.failures.push(PersistFailure {
                    index,
                    description: transaction.description.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Saved {}/{} transaction(s)",
        report.saved,
        result.transactions.len()
    );
    report
}
