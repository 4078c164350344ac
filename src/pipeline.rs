//! End-to-end statement import: normalize, gate, chunk, structure, repair,
//! normalize records and aggregate.

use crate::aggregate::{aggregate, ChunkResult, ChunkStatus};
use crate::chunker::{chunk_document, Chunk};
use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::normalizer::{normalize_batch, Provenance};
use crate::repair::repair_response;
use crate::schema::{ImportResult, RawDocument, StructuredStatement};
use crate::structuring::{StructuringClient, StructuringHints, StructuringOutcome, StructuringService};
use crate::text::{looks_like_statement, normalize_text};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

const EMPTY_DOCUMENT_NOTE: &str = "The document contains no text. If this is a scanned statement, \
     download a text-based PDF from your bank's website and try again.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportEvent {
    Starting { bytes: usize },
    Normalized { bytes: usize },
    Rejected { reason: String },
    Chunked { chunks: usize },
    ChunkStarted { index: usize, total: usize },
    Retry { attempt: u32, error: String },
    Repairing { index: usize },
    ChunkFinished { index: usize, transactions: usize },
    Completed { transactions: usize },
}

pub(crate) async fn send_event(sender: &Option<Sender<ImportEvent>>, event: ImportEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event).await;
    }
}

/// What the PDF text extractor handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfExtraction {
    Text(String),
    PasswordRequired,
    Failed(String),
}

pub struct StatementImporter<S> {
    client: StructuringClient<S>,
    config: ImportConfig,
}

impl<S: StructuringService> StatementImporter<S> {
    pub fn new(service: S, config: ImportConfig) -> Self {
        Self {
            client: StructuringClient::new(service, &config),
            config,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.client = self.client.with_cancellation(token);
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        self.client.service()
    }

    pub async fn import_extraction(
        &self,
        extraction: PdfExtraction,
        hints: &StructuringHints,
        progress: Option<Sender<ImportEvent>>,
    ) -> Result<ImportResult> {
        match extraction {
            PdfExtraction::Text(text) => self.import_text(&text, hints, progress).await,
            PdfExtraction::PasswordRequired => Err(ImportError::PasswordRequired),
            PdfExtraction::Failed(reason) => Err(ImportError::ExtractionFailed(reason)),
        }
    }

    pub async fn import_text(
        &self,
        text: &str,
        hints: &StructuringHints,
        progress: Option<Sender<ImportEvent>>,
    ) -> Result<ImportResult> {
        self.config.validate()?;

        let document = RawDocument::new(text);
        send_event(
            &progress,
            ImportEvent::Starting {
                bytes: document.byte_len(),
            },
        )
        .await;

        if document.is_blank() {
            info!("Empty document, nothing to import");
            let result = ImportResult::empty(EMPTY_DOCUMENT_NOTE);
            send_event(&progress, ImportEvent::Completed { transactions: 0 }).await;
            return Ok(result);
        }

        let normalized = normalize_text(&document.content);
        debug!(
            "Normalized {} bytes down to {} bytes",
            document.byte_len(),
            normalized.len()
        );
        send_event(
            &progress,
            ImportEvent::Normalized {
                bytes: normalized.len(),
            },
        )
        .await;

        let check = looks_like_statement(&normalized, self.config.min_statement_length);
        if !check.valid {
            warn!("Rejected document: {}", check.reason);
            send_event(
                &progress,
                ImportEvent::Rejected {
                    reason: check.reason.clone(),
                },
            )
            .await;
            return Err(ImportError::NotAStatement {
                reason: check.reason,
            });
        }

        let chunks = if normalized.len() > self.config.max_chunk_size {
            chunk_document(&normalized, self.config.max_chunk_size)
        } else {
            vec![Chunk {
                index: 0,
                text: normalized,
            }]
        };
        info!("Importing statement in {} chunk(s)", chunks.len());
        send_event(
            &progress,
            ImportEvent::Chunked {
                chunks: chunks.len(),
            },
        )
        .await;

        let mut chunk_results = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            send_event(
                &progress,
                ImportEvent::ChunkStarted {
                    index: chunk.index,
                    total: chunks.len(),
                },
            )
            .await;

            let result = self.process_chunk(chunk, hints, &progress).await;
            debug!(
                "Chunk {} finished as {:?} with {} transaction(s)",
                chunk.index,
                result.status,
                result.transactions.len()
            );
            send_event(
                &progress,
                ImportEvent::ChunkFinished {
                    index: chunk.index,
                    transactions: result.transactions.len(),
                },
            )
            .await;
            chunk_results.push(result);
        }

        let result = aggregate(chunk_results);
        info!(
            "Import finished with {} transaction(s)",
            result.transactions.len()
        );
        send_event(
            &progress,
            ImportEvent::Completed {
                transactions: result.transactions.len(),
            },
        )
        .await;
        Ok(result)
    }

    async fn process_chunk(
        &self,
        chunk: &Chunk,
        hints: &StructuringHints,
        progress: &Option<Sender<ImportEvent>>,
    ) -> ChunkResult {
        match self
            .client
            .structure_with_progress(&chunk.text, hints, progress)
            .await
        {
            StructuringOutcome::Validated(statement) => self.from_statement(chunk.index, statement),
            StructuringOutcome::SchemaError { raw_text, message } => {
                warn!(
                    "Chunk {} response failed validation ({}); attempting repair",
                    chunk.index, message
                );
                send_event(progress, ImportEvent::Repairing { index: chunk.index }).await;
                self.from_repair(chunk.index, &raw_text)
            }
            StructuringOutcome::TransientError { cause, attempts } => {
                warn!(
                    "Chunk {} skipped after {} attempt(s): {}",
                    chunk.index, attempts, cause
                );
                ChunkResult::failed(
                    chunk.index,
                    format!(
                        "service unavailable after {} attempt(s) ({}), please retry later",
                        attempts, cause
                    ),
                )
            }
        }
    }

    fn from_statement(&self, index: usize, statement: StructuredStatement) -> ChunkResult {
        let batch = normalize_batch(&statement.transactions, Provenance::Structured, &self.config);
        let mut metadata = statement.metadata();
        let service_notes = statement
            .parsing_notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let mut result = match (statement.is_short(), statement.raw_text.as_deref()) {
            (true, Some(raw)) => {
                debug!(
                    "Chunk {} declared {:?} transactions but carried {}; trying repair",
                    index,
                    statement.transaction_count,
                    statement.transactions.len()
                );
                let repaired = repair_response(raw);
                let repaired_batch =
                    normalize_batch(&repaired.transactions, Provenance::Repaired, &self.config);
                match repaired.strategy {
                    Some(strategy) if repaired_batch.transactions.len() > batch.transactions.len() => {
                        metadata.merge_first_wins(&repaired.metadata);
                        ChunkResult::from_batch(index, ChunkStatus::Repaired(strategy), repaired_batch, metadata)
                            .with_note(format!("{}.", repaired.note))
                    }
                    _ => ChunkResult::from_batch(index, ChunkStatus::Structured, batch, metadata),
                }
            }
            _ => ChunkResult::from_batch(index, ChunkStatus::Structured, batch, metadata),
        };

        if let Some(notes) = service_notes {
            result.notes.push(notes);
        }
        result
    }

    fn from_repair(&self, index: usize, raw_text: &str) -> ChunkResult {
        let repaired = repair_response(raw_text);
        match repaired.strategy {
            Some(strategy) => {
                let batch =
                    normalize_batch(&repaired.transactions, Provenance::Repaired, &self.config);
                ChunkResult::from_batch(index, ChunkStatus::Repaired(strategy), batch, repaired.metadata)
                    .with_note(format!("{}; please review them.", repaired.note))
            }
            None => ChunkResult::from_batch(
                index,
                ChunkStatus::RecoveredEmpty,
                Default::default(),
                repaired.metadata,
            )
            .with_note(format!(
                "{}. Try uploading the statement again, or split it into smaller date ranges.",
                repaired.note
            )),
        }
    }
}
