//! # Statement Import Core
//!
//! Turns the raw text of a bank statement PDF into normalized, deduplicated
//! transactions, and keeps going when the structuring service misbehaves.
//!
//! ## Core Concepts
//!
//! - **Normalization**: extracted text is cleaned (boilerplate, page numbers,
//!   rupee variants, date separators) and gated by a cheap "is this a
//!   statement?" check before any external call is made
//! - **Chunking**: long statements are split on line boundaries so each
//!   structuring call stays under the model's output limits
//! - **Structuring**: an external [`StructuringService`] turns text into
//!   [`StructuredStatement`]s, wrapped in bounded retry with exponential backoff
//! - **Repair**: truncated or malformed responses are salvaged by a sequence of
//!   recovery strategies instead of being thrown away
//! - **Aggregation**: per-chunk results are merged, deduplicated on
//!   (date, amount, description) and summarized in user-facing parsing notes
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_import_core::*;
//!
//! let importer = StatementImporter::new(my_service, ImportConfig::default());
//! let result = importer
//!     .import_text(&pdf_text, &StructuringHints::default(), None)
//!     .await?;
//!
//! for txn in &result.transactions {
//!     println!("{} {} {} {}", txn.date, txn.direction, txn.amount, txn.description);
//! }
//! println!("{}", result.parsing_notes);
//! ```

pub mod aggregate;
pub mod categorize;
pub mod chunker;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod repair;
pub mod schema;
pub mod sink;
pub mod structuring;
pub mod text;

#[cfg(feature = "gemini")]
pub mod llm;

pub use aggregate::{aggregate, ChunkResult, ChunkStatus};
pub use categorize::{categorize, infer_payee, DEFAULT_CATEGORY};
pub use chunker::{chunk_document, Chunk};
pub use config::{ImportConfig, UnknownDirectionPolicy};
pub use error::{ImportError, Result};
pub use normalizer::{normalize_batch, normalize_transaction, NormalizedBatch, Provenance};
pub use pipeline::{ImportEvent, PdfExtraction, StatementImporter};
pub use repair::{repair_response, RepairOutcome, RepairStrategy};
pub use schema::*;
pub use sink::{persist_transactions, PersistFailure, PersistReport, SinkError, TransactionSink};
pub use structuring::{
    backoff_delay, StructuringClient, StructuringError, StructuringHints, StructuringOutcome,
    StructuringService,
};
pub use text::{looks_like_statement, normalize_currency, normalize_text, StatementCheck};

pub use tokio_util::sync::CancellationToken;
