//! Batched fan-out of one message to many chats.
//!
//! Recipients are split into batches of `batch_size`. Inside a batch every send is
//! started concurrently; all but the first wait `delay` before calling the transport,
//! which keeps bursts under Telegram's rate limit. Batch N+1 starts only after every
//! send of batch N has settled. There are no per-item retries here; see
//! [`retry_failed`] for the explicit second pass.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::database::models::{NewDelivery, User};
use crate::services::transport::{classify_error, ErrorKind, TransportError};
use crate::utils::logging::log_delivery_failure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub user_id: i64,
    pub chat_id: i64,
    pub name: String,
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            chat_id: user.chat_id,
            name: user.label(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastJob {
    pub job_id: String,
    pub message: String,
    pub recipients: Vec<Recipient>,
}

impl BroadcastJob {
    pub fn new(message: impl Into<String>, recipients: Vec<Recipient>) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            message: message.into(),
            recipients,
        }
    }
}

/// Running tally handed to the progress callback after every single outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastProgress {
    pub job_id: String,
    pub processed: usize,
    pub total: usize,
    pub delivered: usize,
    pub failed: usize,
    pub blocked: usize,
    pub batch: usize,
    pub batch_count: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&BroadcastProgress) + Send + Sync>;

#[derive(Clone)]
pub struct BroadcastOptions {
    pub batch_size: usize,
    pub delay: Duration,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            batch_size: 30,
            delay: Duration::from_millis(100),
            on_progress: None,
        }
    }
}

impl BroadcastOptions {
    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            delay: config.message_delay(),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    /// A failure caused by the user blocking the bot. Counted as failed too.
    Blocked,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientOutcome {
    pub recipient: Recipient,
    pub status: DeliveryStatus,
    pub kind: Option<ErrorKind>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryError {
    pub recipient: Recipient,
    pub kind: ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastReport {
    pub job_id: String,
    pub total: usize,
    pub delivered: usize,
    /// Every failed send, blocked ones included.
    pub failed: usize,
    pub blocked: usize,
    pub batches: usize,
    pub errors: Vec<DeliveryError>,
    /// Per-recipient outcomes in completion order.
    pub outcomes: Vec<RecipientOutcome>,
}

impl BroadcastReport {
    fn empty(job_id: &str, total: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            total,
            ..Self::default()
        }
    }

    fn record(&mut self, recipient: Recipient, result: Result<(), TransportError>) {
        match result {
            Ok(()) => {
                self.delivered += 1;
                self.outcomes.push(RecipientOutcome {
                    recipient,
                    status: DeliveryStatus::Delivered,
                    kind: None,
                    error: None,
                });
            }
            Err(err) => {
                let kind = classify_error(&err);
                log_delivery_failure(&self.job_id, recipient.chat_id, kind.as_str(), &err.message);

                self.failed += 1;
                let status = if kind == ErrorKind::Blocked {
                    self.blocked += 1;
                    DeliveryStatus::Blocked
                } else {
                    DeliveryStatus::Failed
                };

                self.errors.push(DeliveryError {
                    recipient: recipient.clone(),
                    kind,
                    error: err.message.clone(),
                });
                self.outcomes.push(RecipientOutcome {
                    recipient,
                    status,
                    kind: Some(kind),
                    error: Some(err.message),
                });
            }
        }
    }

    fn progress(&self, batch: usize, batch_count: usize) -> BroadcastProgress {
        BroadcastProgress {
            job_id: self.job_id.clone(),
            processed: self.outcomes.len(),
            total: self.total,
            delivered: self.delivered,
            failed: self.failed,
            blocked: self.blocked,
            batch,
            batch_count,
        }
    }

    /// Recipients the message reached.
    pub fn reached(&self) -> Vec<Recipient> {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Delivered)
            .map(|o| o.recipient.clone())
            .collect()
    }

    /// Failed recipients worth another attempt; blocked chats are left alone.
    pub fn retryable(&self) -> Vec<Recipient> {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Failed)
            .map(|o| o.recipient.clone())
            .collect()
    }

    pub fn to_delivery_rows(&self) -> Vec<NewDelivery> {
        self.outcomes
            .iter()
            .map(|o| NewDelivery {
                user_id: o.recipient.user_id,
                chat_id: o.recipient.chat_id,
                status: o.status.as_str(),
                error_text: o.error.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("broadcast message is empty")]
    EmptyMessage,
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

fn notify_progress(callback: Option<&ProgressCallback>, progress: &BroadcastProgress) {
    if let Some(callback) = callback {
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
            warn!("Progress callback panicked during {}; continuing", progress.job_id);
        }
    }
}

/// Sends `job.message` to every recipient of `job` through `send`.
///
/// Individual send failures are tallied, never returned as `Err`; only an invalid job
/// fails the whole call.
pub async fn broadcast<F, Fut>(
    send: F,
    job: &BroadcastJob,
    options: &BroadcastOptions,
) -> Result<BroadcastReport, BroadcastError>
where
    F: Fn(Recipient, String) -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    if job.message.trim().is_empty() {
        return Err(BroadcastError::EmptyMessage);
    }
    if options.batch_size == 0 {
        return Err(BroadcastError::InvalidBatchSize);
    }

    let total = job.recipients.len();
    let batch_count = total.div_ceil(options.batch_size);
    let mut report = BroadcastReport::empty(&job.job_id, total);
    let send = &send;
    let delay = options.delay;

    for (batch_index, chunk) in job.recipients.chunks(options.batch_size).enumerate() {
        debug!(
            "Broadcast {} batch {}/{} ({} recipients)",
            job.job_id,
            batch_index + 1,
            batch_count,
            chunk.len()
        );

        let mut in_flight: FuturesUnordered<_> = chunk
            .iter()
            .enumerate()
            .map(|(position, recipient)| {
                let recipient = recipient.clone();
                let message = job.message.clone();
                async move {
                    if position > 0 && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let result = send(recipient.clone(), message).await;
                    (recipient, result)
                }
            })
            .collect();

        while let Some((recipient, result)) = in_flight.next().await {
            report.record(recipient, result);
            notify_progress(
                options.on_progress.as_ref(),
                &report.progress(batch_index + 1, batch_count),
            );
        }

        report.batches += 1;
    }

    Ok(report)
}

/// Second pass over a finished broadcast: resends to recipients that failed for a
/// reason other than being blocked, one at a time with `delay` between sends.
pub async fn retry_failed<F, Fut>(
    send: F,
    previous: &BroadcastReport,
    message: &str,
    delay: Duration,
) -> BroadcastReport
where
    F: Fn(Recipient, String) -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    retry_recipients(send, &previous.job_id, message, previous.retryable(), delay).await
}

pub async fn retry_recipients<F, Fut>(
    send: F,
    job_id: &str,
    message: &str,
    recipients: Vec<Recipient>,
    delay: Duration,
) -> BroadcastReport
where
    F: Fn(Recipient, String) -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    let mut report = BroadcastReport::empty(job_id, recipients.len());

    for (index, recipient) in recipients.into_iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = send(recipient.clone(), message.to_string()).await;
        report.record(recipient, result);
    }

    report.batches = usize::from(report.total > 0);
    report
}
