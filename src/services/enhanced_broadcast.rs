//! Admin broadcasts: the plain fan-out and the enhanced multi-step variant.
//!
//! The enhanced flow runs in fixed phases: merge config, validate the bot
//! credential, select eligible guests, send the primary message through the
//! broadcast engine, run the follow-up sequence for every guest it reached (in
//! batches), aggregate statistics and write the logs. A phase failure ends the
//! broadcast with `success: false` and whatever statistics were gathered so far;
//! nothing here returns `Err` to the caller.
//!
//! Summary, delivery and step rows are written as independent statements and any
//! failure to write them is logged and ignored. They are a diagnostic trail, not
//! the record of what was delivered.

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{BroadcastConfig, BroadcastConfigOverrides};
use crate::database::connection::DatabaseManager;
use crate::database::models::{
    BroadcastDelivery, BroadcastLog, NewBroadcastLog, SequenceStepLog, User,
};
use crate::services::broadcast::{
    broadcast, retry_recipients, BroadcastJob, BroadcastOptions, BroadcastProgress,
    BroadcastReport, ProgressCallback, Recipient,
};
use crate::services::content::EventContentProvider;
use crate::services::delivery_tracker::{DeliveryGuard, DeliveryTracker};
use crate::services::eligibility::{load_eligible_users, percentage};
use crate::services::sequence::{SequenceOptions, SequenceOrchestrator, SequenceRun};
use crate::services::transport::{BotIdentity, MessageTransport, OutboundMessage, TransportError};
use crate::utils::logging::{log_broadcast_done, log_broadcast_start, log_database_error};

pub const NO_ELIGIBLE_RECIPIENTS: &str = "No eligible recipients for enhanced broadcast";
pub const NO_RECIPIENTS: &str = "No recipients found for broadcast";

type SendFn = Arc<dyn Fn(Recipient, String) -> BoxFuture<'static, Result<(), TransportError>> + Send + Sync>;

#[derive(Clone)]
pub struct BroadcastRequest {
    pub message: String,
    /// Telegram id of the admin who triggered the broadcast.
    pub sent_by: i64,
    pub overrides: BroadcastConfigOverrides,
    pub on_progress: Option<ProgressCallback>,
}

impl BroadcastRequest {
    pub fn new(message: impl Into<String>, sent_by: i64) -> Self {
        Self {
            message: message.into(),
            sent_by,
            overrides: BroadcastConfigOverrides::default(),
            on_progress: None,
        }
    }

    pub fn with_overrides(mut self, overrides: BroadcastConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnhancedStats {
    pub total: usize,
    pub eligible_for_enhanced: usize,
    pub standard_delivered: usize,
    pub standard_failed: usize,
    pub standard_blocked: usize,
    pub enhanced_sequence_completed: usize,
    pub useful_info_delivered: usize,
    pub event_details_delivered: usize,
    pub menu_trigger_delivered: usize,
    pub sequence_failures: usize,
    /// `enhanced_sequence_completed / eligible_for_enhanced * 100`.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancedBroadcastResult {
    pub success: bool,
    pub message_id: String,
    pub error: Option<String>,
    pub enhanced_stats: EnhancedStats,
    pub bot_info: Option<BotIdentity>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub config: BroadcastConfig,
    pub sequence_runs: Vec<SequenceRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BroadcastStats {
    pub total: usize,
    pub delivered: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl From<&BroadcastReport> for BroadcastStats {
    fn from(report: &BroadcastReport) -> Self {
        Self {
            total: report.total,
            delivered: report.delivered,
            failed: report.failed,
            blocked: report.blocked,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardBroadcastResult {
    pub success: bool,
    pub message_id: String,
    pub error: Option<String>,
    pub stats: BroadcastStats,
    pub bot_info: Option<BotIdentity>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryResult {
    pub success: bool,
    pub broadcast_id: String,
    pub error: Option<String>,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub blocked: usize,
    /// Recipients left out because they had blocked the bot.
    pub skipped_blocked: usize,
}

impl RetryResult {
    fn failure(broadcast_id: &str, error: impl Into<String>) -> Self {
        Self {
            broadcast_id: broadcast_id.to_string(),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Bookkeeping shared by the phases of one enhanced broadcast.
struct EnhancedRun {
    broadcast_id: String,
    config: BroadcastConfig,
    start_time: DateTime<Utc>,
    clock: Instant,
    stats: EnhancedStats,
    bot_info: Option<BotIdentity>,
}

impl EnhancedRun {
    fn finish(self, error: Option<String>, sequence_runs: Vec<SequenceRun>) -> EnhancedBroadcastResult {
        if let Some(e) = &error {
            warn!("Enhanced broadcast {} failed: {}", self.broadcast_id, e);
        }
        EnhancedBroadcastResult {
            success: error.is_none(),
            message_id: self.broadcast_id,
            error,
            enhanced_stats: self.stats,
            bot_info: self.bot_info,
            start_time: self.start_time,
            end_time: Utc::now(),
            duration_ms: self.clock.elapsed().as_millis() as u64,
            config: self.config,
            sequence_runs,
        }
    }
}

#[derive(Clone)]
pub struct BroadcastCoordinator {
    db: DatabaseManager,
    transport: Arc<dyn MessageTransport>,
    content: Arc<dyn EventContentProvider>,
    config: BroadcastConfig,
    tracker: DeliveryTracker,
}

impl BroadcastCoordinator {
    pub fn new(
        db: DatabaseManager,
        transport: Arc<dyn MessageTransport>,
        content: Arc<dyn EventContentProvider>,
        config: BroadcastConfig,
        tracker: DeliveryTracker,
    ) -> Self {
        Self {
            db,
            transport,
            content,
            config,
            tracker,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    fn sender(&self) -> SendFn {
        let transport = self.transport.clone();
        Arc::new(move |recipient: Recipient, message: String| {
            let transport = transport.clone();
            async move {
                transport
                    .send_message(OutboundMessage::plain(recipient.chat_id, message))
                    .await
                    .map(|_| ())
            }
            .boxed()
        })
    }

    fn broadcast_options(config: &BroadcastConfig, request: &BroadcastRequest, broadcast_id: &str) -> BroadcastOptions {
        let callback = request.on_progress.clone().unwrap_or_else(|| {
            let step = config.batch_size.max(1);
            let id = broadcast_id.to_string();
            Arc::new(move |p: &BroadcastProgress| {
                if p.processed == p.total || p.processed % step == 0 {
                    info!(
                        "Broadcast {} progress: {}/{} (delivered {}, failed {}, blocked {})",
                        id, p.processed, p.total, p.delivered, p.failed, p.blocked
                    );
                }
            })
        });
        BroadcastOptions::from_config(config).with_progress(callback)
    }

    fn begin(&self, key: String) -> Option<DeliveryGuard> {
        let guard = self.tracker.try_begin(key.clone());
        if guard.is_none() {
            warn!("Refusing to start {}: already in progress", key);
        }
        guard
    }

    /// Primary message to every eligible guest, then the follow-up sequence to each
    /// guest the primary message reached.
    pub async fn enhanced_broadcast(&self, request: BroadcastRequest) -> EnhancedBroadcastResult {
        let config = BroadcastConfig::merge(&self.config, &request.overrides);
        if let Err(e) = config.validate() {
            warn!("{}; continuing with merged values", e);
        }

        let mut run = EnhancedRun {
            broadcast_id: Uuid::new_v4().to_string(),
            config,
            start_time: Utc::now(),
            clock: Instant::now(),
            stats: EnhancedStats::default(),
            bot_info: None,
        };

        let _guard = match self.begin(format!("enhanced:{}", request.message.trim())) {
            Some(guard) => guard,
            None => {
                return run.finish(
                    Some("An identical broadcast is already in progress".to_string()),
                    Vec::new(),
                )
            }
        };

        // Credential
        match self.transport.get_me().await {
            Ok(identity) => run.bot_info = Some(identity),
            Err(e) => return run.finish(Some(format!("Bot credential check failed: {e}")), Vec::new()),
        }

        // Audience
        let eligible = match load_eligible_users(&self.db.pool, run.config.min_eligibility_score).await {
            Ok(eligible) => eligible,
            Err(e) => {
                log_database_error("select", "users", &e.to_string());
                return run.finish(Some(format!("Failed to load eligible users: {e}")), Vec::new());
            }
        };
        run.stats.total = eligible.total_count;
        run.stats.eligible_for_enhanced = eligible.eligible_count;

        if eligible.users.is_empty() {
            self.log_summary(&enhanced_summary(&run, &request)).await;
            return run.finish(Some(NO_ELIGIBLE_RECIPIENTS.to_string()), Vec::new());
        }

        // Primary message
        let job = BroadcastJob {
            job_id: run.broadcast_id.clone(),
            message: request.message.clone(),
            recipients: eligible.users.iter().map(Recipient::from).collect(),
        };
        log_broadcast_start(&job.job_id, "enhanced", job.recipients.len());

        let options = Self::broadcast_options(&run.config, &request, &run.broadcast_id);
        let report = match broadcast(self.sender().as_ref(), &job, &options).await {
            Ok(report) => report,
            Err(e) => return run.finish(Some(format!("Primary broadcast failed: {e}")), Vec::new()),
        };
        run.stats.standard_delivered = report.delivered;
        run.stats.standard_failed = report.failed;
        run.stats.standard_blocked = report.blocked;
        self.record_deliveries(&report).await;

        // Follow-up sequences
        let reached = report.reached();
        let orchestrator = SequenceOrchestrator::new(
            self.transport.clone(),
            self.content.clone(),
            SequenceOptions::from_config(&run.config),
        );
        let runs = self.run_sequences(&orchestrator, &reached, &run.config).await;

        aggregate(&mut run.stats, &runs, reached.len());
        log_broadcast_done(&run.broadcast_id, report.delivered, report.failed, report.blocked);
        info!(
            "Enhanced broadcast {}: {}/{} sequences completed ({:.1}%)",
            run.broadcast_id,
            run.stats.enhanced_sequence_completed,
            run.stats.eligible_for_enhanced,
            run.stats.completion_rate
        );

        self.log_summary(&enhanced_summary(&run, &request)).await;
        self.log_sequence_runs(&run.broadcast_id, &runs).await;

        run.finish(None, runs)
    }

    async fn run_sequences(
        &self,
        orchestrator: &SequenceOrchestrator,
        reached: &[Recipient],
        config: &BroadcastConfig,
    ) -> Vec<SequenceRun> {
        let mut runs = Vec::with_capacity(reached.len());
        let batch_size = config.max_users_per_batch.max(1);
        let delay = config.batch_processing_delay();

        for (index, batch) in reached.chunks(batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|recipient| {
                    let orchestrator = orchestrator.clone();
                    tokio::spawn(async move { orchestrator.run(&recipient).await })
                })
                .collect();

            // A panicking sequence only loses its own run
            for (recipient, joined) in batch.iter().zip(join_all(handles).await) {
                match joined {
                    Ok(run) => runs.push(run),
                    Err(e) => warn!(
                        "Sequence task for chat {} did not finish: {}",
                        recipient.chat_id, e
                    ),
                }
            }
        }

        runs
    }

    /// Primary message to every registered user, without follow-up.
    pub async fn standard_broadcast(&self, request: BroadcastRequest) -> StandardBroadcastResult {
        let config = BroadcastConfig::merge(&self.config, &request.overrides);
        if let Err(e) = config.validate() {
            warn!("{}; continuing with merged values", e);
        }

        let broadcast_id = Uuid::new_v4().to_string();
        let start_time = Utc::now();
        let clock = Instant::now();
        let mut stats = BroadcastStats::default();
        let mut bot_info = None;

        let finish = |error: Option<String>, stats: BroadcastStats, bot_info: Option<BotIdentity>| {
            if let Some(e) = &error {
                warn!("Broadcast {} failed: {}", broadcast_id, e);
            }
            StandardBroadcastResult {
                success: error.is_none(),
                message_id: broadcast_id.clone(),
                error,
                stats,
                bot_info,
                start_time,
                end_time: Utc::now(),
                duration_ms: clock.elapsed().as_millis() as u64,
            }
        };

        let _guard = match self.begin(format!("standard:{}", request.message.trim())) {
            Some(guard) => guard,
            None => {
                return finish(
                    Some("An identical broadcast is already in progress".to_string()),
                    stats,
                    bot_info,
                )
            }
        };

        match self.transport.get_me().await {
            Ok(identity) => bot_info = Some(identity),
            Err(e) => return finish(Some(format!("Bot credential check failed: {e}")), stats, bot_info),
        }

        let users = match User::find_all(&self.db.pool).await {
            Ok(users) => users,
            Err(e) => {
                log_database_error("select", "users", &e.to_string());
                return finish(Some(format!("Failed to load recipients: {e}")), stats, bot_info);
            }
        };
        stats.total = users.len();

        if users.is_empty() {
            self.log_summary(&standard_summary(&broadcast_id, &request, &stats)).await;
            return finish(Some(NO_RECIPIENTS.to_string()), stats, bot_info);
        }

        let job = BroadcastJob {
            job_id: broadcast_id.clone(),
            message: request.message.clone(),
            recipients: users.iter().map(Recipient::from).collect(),
        };
        log_broadcast_start(&job.job_id, "standard", job.recipients.len());

        let options = Self::broadcast_options(&config, &request, &broadcast_id);
        let report = match broadcast(self.sender().as_ref(), &job, &options).await {
            Ok(report) => report,
            Err(e) => return finish(Some(format!("Broadcast failed: {e}")), stats, bot_info),
        };
        stats = BroadcastStats::from(&report);
        log_broadcast_done(&broadcast_id, report.delivered, report.failed, report.blocked);

        self.record_deliveries(&report).await;
        self.log_summary(&standard_summary(&broadcast_id, &request, &stats)).await;

        finish(None, stats, bot_info)
    }

    /// Resends the message of an earlier broadcast to recipients whose delivery
    /// failed, skipping those who blocked the bot.
    pub async fn retry_failed_deliveries(&self, broadcast_id: &str) -> RetryResult {
        let _guard = match self.begin(format!("retry:{broadcast_id}")) {
            Some(guard) => guard,
            None => return RetryResult::failure(broadcast_id, "A retry for this broadcast is already running"),
        };

        let log = match BroadcastLog::find_by_broadcast_id(&self.db.pool, broadcast_id).await {
            Ok(Some(log)) => log,
            Ok(None) => return RetryResult::failure(broadcast_id, format!("Unknown broadcast {broadcast_id}")),
            Err(e) => {
                log_database_error("select", "broadcast_logs", &e.to_string());
                return RetryResult::failure(broadcast_id, format!("Failed to load broadcast: {e}"));
            }
        };

        let deliveries = match BroadcastDelivery::find_by_broadcast(&self.db.pool, broadcast_id).await {
            Ok(rows) => rows,
            Err(e) => {
                log_database_error("select", "broadcast_deliveries", &e.to_string());
                return RetryResult::failure(broadcast_id, format!("Failed to load deliveries: {e}"));
            }
        };

        let skipped_blocked = deliveries.iter().filter(|d| d.status == "blocked").count();
        let recipients: Vec<Recipient> = deliveries
            .iter()
            .filter(|d| d.status == "failed")
            .map(|d| Recipient {
                user_id: d.user_id,
                chat_id: d.chat_id,
                name: format!("chat {}", d.chat_id),
            })
            .collect();

        info!(
            "Retrying broadcast {}: {} failed deliveries, {} blocked skipped",
            broadcast_id,
            recipients.len(),
            skipped_blocked
        );

        let report = retry_recipients(
            self.sender().as_ref(),
            broadcast_id,
            &log.message_text,
            recipients,
            self.config.retry_delay(),
        )
        .await;

        self.record_deliveries(&report).await;
        if report.total > 0 {
            if let Err(e) = BroadcastLog::apply_retry(
                &self.db.pool,
                broadcast_id,
                report.delivered as i64,
                report.blocked as i64,
            )
            .await
            {
                log_database_error("update", "broadcast_logs", &e.to_string());
            }
        }

        RetryResult {
            success: true,
            broadcast_id: broadcast_id.to_string(),
            error: None,
            attempted: report.total,
            delivered: report.delivered,
            failed: report.failed,
            blocked: report.blocked,
            skipped_blocked,
        }
    }

    async fn record_deliveries(&self, report: &BroadcastReport) {
        if report.outcomes.is_empty() {
            return;
        }
        if let Err(e) =
            BroadcastDelivery::record_all(&self.db.pool, &report.job_id, &report.to_delivery_rows()).await
        {
            log_database_error("insert", "broadcast_deliveries", &e.to_string());
        }
    }

    async fn log_summary(&self, record: &NewBroadcastLog) {
        if let Err(e) = BroadcastLog::create(&self.db.pool, record).await {
            log_database_error("insert", "broadcast_logs", &e.to_string());
        }
    }

    async fn log_sequence_runs(&self, broadcast_id: &str, runs: &[SequenceRun]) {
        for run in runs {
            for (step, record) in run.attempted_steps() {
                let (status, error) = if record.success {
                    ("delivered", None)
                } else {
                    (
                        "failed",
                        run.error_for(step).or(run.critical_error.as_deref()),
                    )
                };

                if let Err(e) = SequenceStepLog::create(
                    &self.db.pool,
                    run.user_id,
                    broadcast_id,
                    step.as_str(),
                    status,
                    &run.sequence_id,
                    run.completion_rate,
                    error,
                )
                .await
                {
                    log_database_error("insert", "sequence_step_logs", &e.to_string());
                }
            }
        }
    }
}

fn aggregate(stats: &mut EnhancedStats, runs: &[SequenceRun], reached: usize) {
    stats.enhanced_sequence_completed = runs.iter().filter(|r| r.success).count();
    stats.useful_info_delivered = runs.iter().filter(|r| r.steps.useful_info.success).count();
    stats.event_details_delivered = runs.iter().filter(|r| r.steps.event_details.success).count();
    stats.menu_trigger_delivered = runs.iter().filter(|r| r.steps.menu_trigger.success).count();
    // Runs that never finished count as failures too
    stats.sequence_failures = reached.saturating_sub(stats.enhanced_sequence_completed);
    stats.completion_rate = percentage(stats.enhanced_sequence_completed, stats.eligible_for_enhanced);
}

fn enhanced_summary(run: &EnhancedRun, request: &BroadcastRequest) -> NewBroadcastLog {
    NewBroadcastLog {
        broadcast_id: run.broadcast_id.clone(),
        message_text: request.message.clone(),
        sent_by: request.sent_by,
        total_users: run.stats.total as i64,
        delivered_count: run.stats.standard_delivered as i64,
        failed_count: run.stats.standard_failed as i64,
        blocked_count: run.stats.standard_blocked as i64,
        enhanced_mode: true,
        sequence_completion_rate: run.stats.completion_rate,
        eligible_users_count: run.stats.eligible_for_enhanced as i64,
        useful_info_delivered: run.stats.useful_info_delivered as i64,
        event_details_delivered: run.stats.event_details_delivered as i64,
        menu_trigger_delivered: run.stats.menu_trigger_delivered as i64,
        sequence_failures: run.stats.sequence_failures as i64,
    }
}

fn standard_summary(broadcast_id: &str, request: &BroadcastRequest, stats: &BroadcastStats) -> NewBroadcastLog {
    NewBroadcastLog {
        broadcast_id: broadcast_id.to_string(),
        message_text: request.message.clone(),
        sent_by: request.sent_by,
        total_users: stats.total as i64,
        delivered_count: stats.delivered as i64,
        failed_count: stats.failed as i64,
        blocked_count: stats.blocked as i64,
        enhanced_mode: false,
        ..NewBroadcastLog::default()
    }
}
