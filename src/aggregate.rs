use crate::normalizer::NormalizedBatch;
use crate::repair::RepairStrategy;
use crate::schema::{CandidateTransaction, ImportResult, StatementMetadata};
use chrono::NaiveDate;
use log::debug;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    /// The structuring call returned schema-valid output.
    Structured,
    /// Transactions came out of the repair engine.
    Repaired(RepairStrategy),
    /// Repair ran but found nothing.
    RecoveredEmpty,
    /// Retries were exhausted without usable output.
    Failed { reason: String },
}

/// Everything one chunk contributed to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub index: usize,
    pub status: ChunkStatus,
    pub transactions: Vec<CandidateTransaction>,
    pub metadata: StatementMetadata,
    /// Raw records offered to the normalizer.
    pub candidates: usize,
    pub dropped: usize,
    pub assumed_direction: usize,
    pub notes: Vec<String>,
}

impl ChunkResult {
    pub fn from_batch(
        index: usize,
        status: ChunkStatus,
        batch: NormalizedBatch,
        metadata: StatementMetadata,
    ) -> Self {
        Self {
            index,
            status,
            transactions: batch.transactions,
            metadata,
            candidates: batch.candidates,
            dropped: batch.dropped,
            assumed_direction: batch.assumed_direction,
            notes: Vec::new(),
        }
    }

    pub fn failed(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            status: ChunkStatus::Failed {
                reason: reason.into(),
            },
            transactions: Vec::new(),
            metadata: StatementMetadata::default(),
            candidates: 0,
            dropped: 0,
            assumed_direction: 0,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

type DedupKey = (NaiveDate, i64, String);

fn dedup_key(txn: &CandidateTransaction) -> DedupKey {
    (txn.date, txn.amount_minor(), txn.description.clone())
}

/// Merge chunk results into the final import result.
///
/// Results are taken in chunk-index order regardless of the order they
/// arrive in, so first-wins metadata is anchored to the document and not to
/// completion order.
pub fn aggregate(mut chunk_results: Vec<ChunkResult>) -> ImportResult {
    chunk_results.sort_by_key(|c| c.index);
    let chunk_count = chunk_results.len();

    let mut metadata = StatementMetadata::default();
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut transactions = Vec::new();
    let mut duplicates = 0usize;
    let mut candidates = 0usize;
    let mut dropped = 0usize;
    let mut assumed = 0usize;
    let mut chunk_notes = Vec::new();
    let mut failed = 0usize;

    for chunk in &chunk_results {
        metadata.merge_first_wins(&chunk.metadata);
        candidates += chunk.candidates;
        dropped += chunk.dropped;
        assumed += chunk.assumed_direction;

        for txn in &chunk.transactions {
            if seen.insert(dedup_key(txn)) {
                transactions.push(txn.clone());
            } else {
                duplicates += 1;
            }
        }

        let label = if chunk_count > 1 {
            format!("Part {}: ", chunk.index + 1)
        } else {
            String::new()
        };
        if let ChunkStatus::Failed { reason } = &chunk.status {
            failed += 1;
            chunk_notes.push(format!("{}could not be processed: {}.", label, reason));
        }
        for note in &chunk.notes {
            chunk_notes.push(format!("{}{}", label, note));
        }
    }

    debug!(
        "Aggregated {} chunk(s): {} kept, {} duplicate(s), {} dropped",
        chunk_count,
        transactions.len(),
        duplicates,
        dropped
    );

    let mut notes = Vec::new();
    if transactions.is_empty() {
        notes.push("No transactions were recovered from this statement.".to_string());
    } else if chunk_count > 1 {
        notes.push(format!(
            "Recovered {} transaction(s) from {} chunks.",
            transactions.len(),
            chunk_count
        ));
    } else {
        notes.push(format!("Recovered {} transaction(s).", transactions.len()));
    }
    if duplicates > 0 {
        notes.push(format!("Removed {} duplicate transaction(s).", duplicates));
    }
    if dropped > 0 {
        notes.push(format!(
            "Filtered from {} to {} records; {} were missing a date, amount, description or direction.",
            candidates,
            candidates - dropped,
            dropped
        ));
    }
    if assumed > 0 {
        notes.push(format!(
            "{} transaction(s) had no recognizable credit/debit type and were given a default direction; please review them.",
            assumed
        ));
    }
    notes.extend(chunk_notes);
    if failed > 0 && failed == chunk_count {
        notes.push(
            "The statement service is unavailable right now. Please try again in a few minutes, and contact support if the problem persists."
                .to_string(),
        );
    } else if transactions.is_empty() {
        notes.push(
            "Please check that the file is a text-based bank statement and try again, or contact support."
                .to_string(),
        );
    } else if failed > 0 {
        notes.push(
            "Some parts of the statement were skipped; re-import the file later to pick up the missing transactions."
                .to_string(),
        );
    }

    ImportResult {
        transactions,
        metadata,
        parsing_notes: notes.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Direction;

    fn txn(day: u32, amount: f64, description: &str) -> CandidateTransaction {
        CandidateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            description: description.to_string(),
            amount,
            direction: Direction::Debit,
            payee: None,
            category: "Other".to_string(),
            confidence: 0.7,
        }
    }

    fn chunk(index: usize, transactions: Vec<CandidateTransaction>, bank: Option<&str>) -> ChunkResult {
        ChunkResult {
            index,
            status: ChunkStatus::Structured,
            candidates: transactions.len(),
            transactions,
            metadata: StatementMetadata {
                bank_name: bank.map(str::to_string),
                ..Default::default()
            },
            dropped: 0,
            assumed_direction: 0,
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_duplicates_across_chunks_are_removed() {
        let result = aggregate(vec![
            chunk(0, vec![txn(1, 100.0, "Uber"), txn(2, 50.0, "Ola")], None),
            chunk(1, vec![txn(1, 100.0, "Uber"), txn(3, 75.0, "Metro")], None),
        ]);
        assert_eq!(result.transactions.len(), 3);
        let descriptions: Vec<&str> = result.transactions.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Uber", "Ola", "Metro"]);
        assert!(result.parsing_notes.contains("Removed 1 duplicate"));
        assert!(result.parsing_notes.contains("from 2 chunks"));
    }

    #[test]
    fn test_same_day_same_amount_different_description_kept() {
        let result = aggregate(vec![chunk(
            0,
            vec![txn(1, 100.0, "Uber"), txn(1, 100.0, "Uber Eats")],
            None,
        )]);
        assert_eq!(result.transactions.len(), 2);
    }

    #[test]
    fn test_metadata_first_wins_by_chunk_index() {
        let result = aggregate(vec![
            chunk(1, vec![], Some("ICICI")),
            chunk(0, vec![txn(1, 1.0, "x")], None),
            chunk(2, vec![], Some("HDFC")),
        ]);
        assert_eq!(result.metadata.bank_name.as_deref(), Some("ICICI"));

        let result = aggregate(vec![chunk(0, vec![], Some("HDFC")), chunk(1, vec![], None)]);
        assert_eq!(result.metadata.bank_name.as_deref(), Some("HDFC"));
    }

    #[test]
    fn test_failed_chunk_does_not_abort_siblings() {
        let result = aggregate(vec![
            chunk(0, vec![txn(1, 10.0, "A")], None),
            ChunkResult::failed(1, "the structuring service was unavailable"),
        ]);
        assert_eq!(result.transactions.len(), 1);
        assert!(result.parsing_notes.contains("Part 2: could not be processed"));
        assert!(result.parsing_notes.contains("re-import"));
    }

    #[test]
    fn test_all_failed_reports_service_unavailable() {
        let result = aggregate(vec![ChunkResult::failed(0, "timeout")]);
        assert!(result.transactions.is_empty());
        assert!(result.parsing_notes.contains("No transactions were recovered"));
        assert!(result.parsing_notes.contains("try again"));
    }

    #[test]
    fn test_filtered_counts_reported() {
        let mut c = chunk(0, vec![txn(1, 10.0, "A")], None);
        c.candidates = 3;
        c.dropped = 2;
        c.assumed_direction = 1;
        let result = aggregate(vec![c]);
        assert!(result.parsing_notes.contains("Filtered from 3 to 1 records"));
        assert!(result.parsing_notes.contains("1 transaction(s) had no recognizable"));
    }
}
