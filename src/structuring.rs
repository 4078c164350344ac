//! Retry envelope around the external structuring service.
//!
//! The service itself is a black box. This module only owns the bounded
//! retry with exponential backoff and the tagged outcome handed to the
//! pipeline, so the repair engine never has to guess what it received.

use crate::config::ImportConfig;
use crate::pipeline::{send_event, ImportEvent};
use crate::schema::StructuredStatement;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Optional hints forwarded to the structuring service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuringHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_transactions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuringError {
    /// The service produced output that failed schema validation. The raw
    /// attempted output is kept for the repair engine.
    #[error("Structured output failed schema validation: {message}")]
    Schema { raw_text: String, message: String },

    /// Network failure, timeout, rate limit or any other failure without usable output.
    #[error("Structuring service unavailable: {0}")]
    Transient(String),
}

#[async_trait]
pub trait StructuringService: Send + Sync {
    async fn structure(
        &self,
        text: &str,
        hints: &StructuringHints,
    ) -> Result<StructuredStatement, StructuringError>;
}

#[async_trait]
impl<T: StructuringService + ?Sized> StructuringService for Arc<T> {
    async fn structure(
        &self,
        text: &str,
        hints: &StructuringHints,
    ) -> Result<StructuredStatement, StructuringError> {
        (**self).structure(text, hints).await
    }
}

#[async_trait]
impl<T: StructuringService + ?Sized> StructuringService for Box<T> {
    async fn structure(
        &self,
        text: &str,
        hints: &StructuringHints,
    ) -> Result<StructuredStatement, StructuringError> {
        (**self).structure(text, hints).await
    }
}

/// Result of a structuring call after retries are exhausted.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuringOutcome {
    Validated(StructuredStatement),
    SchemaError { raw_text: String, message: String },
    TransientError { cause: String, attempts: u32 },
}

impl StructuringOutcome {
    fn from_error(err: StructuringError, attempts: u32) -> Self {
        match err {
            StructuringError::Schema { raw_text, message } => {
                StructuringOutcome::SchemaError { raw_text, message }
            }
            StructuringError::Transient(cause) => StructuringOutcome::TransientError { cause, attempts },
        }
    }
}

/// Wait before retrying after failed attempt `attempt` (1-based):
/// `base * 2^attempt`, capped at 30 seconds.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

pub struct StructuringClient<S> {
    service: S,
    max_attempts: u32,
    backoff_base: Duration,
    cancel: Option<CancellationToken>,
}

impl<S: StructuringService> StructuringClient<S> {
    pub fn new(service: S, config: &ImportConfig) -> Self {
        Self {
            service,
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            cancel: None,
        }
    }

    /// Cancelling the token aborts any pending backoff wait.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn structure(&self, text: &str, hints: &StructuringHints) -> StructuringOutcome {
        self.structure_with_progress(text, hints, &None).await
    }

    pub(crate) async fn structure_with_progress(
        &self,
        text: &str,
        hints: &StructuringHints,
        progress: &Option<Sender<ImportEvent>>,
    ) -> StructuringOutcome {
        let mut attempt = 1;

        loop {
            if self.is_cancelled() {
                return cancelled(attempt - 1);
            }

            debug!(
                "Structuring attempt {}/{} ({} bytes)",
                attempt,
                self.max_attempts,
                text.len()
            );

            let err = match self.service.structure(text, hints).await {
                Ok(statement) => return StructuringOutcome::Validated(statement),
                Err(err) => err,
            };

            if attempt >= self.max_attempts {
                warn!("Structuring failed after {} attempt(s): {}", attempt, err);
                return StructuringOutcome::from_error(err, attempt);
            }

            let delay = backoff_delay(self.backoff_base, attempt);
            warn!(
                "Structuring attempt {} failed ({}); retrying in {:?}",
                attempt, err, delay
            );
            send_event(
                progress,
                ImportEvent::Retry {
                    attempt,
                    error: err.to_string(),
                },
            )
            .await;

            if !self.wait(delay).await {
                return cancelled(attempt);
            }
            attempt += 1;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Returns false when the wait was cut short by cancellation.
    async fn wait(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => false,
                _ = sleep(delay) => true,
            },
            None => {
                sleep(delay).await;
                true
            }
        }
    }
}

fn cancelled(attempts: u32) -> StructuringOutcome {
    StructuringOutcome::TransientError {
        cause: "import was cancelled".to_string(),
        attempts,
    }
}
