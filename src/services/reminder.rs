use chrono::{DateTime, Utc};
use futures::future::FutureExt;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{BroadcastConfig, EventConfig};
use crate::database::{connection::DatabaseManager, models::*};
use crate::services::broadcast::{broadcast, BroadcastJob, BroadcastOptions, Recipient};
use crate::services::delivery_tracker::DeliveryTracker;
use crate::services::transport::{MessageTransport, OutboundMessage};
use crate::utils::datetime::{days_until, format_datetime};
use crate::utils::logging::{log_database_error, log_system_event};
use crate::utils::markdown::{bold, escape_markdown};

/// Days before the event on which guests are reminded.
pub const REMINDER_DAYS: [i64; 3] = [30, 7, 1];

/// Guests who receive reminders: everyone who has not declined.
const REMINDED_STATUSES: [AttendanceStatus; 2] = [AttendanceStatus::Attending, AttendanceStatus::Maybe];

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReminder {
    pub days_before: i64,
    pub recipients: usize,
    pub delivered: usize,
}

/// Everything a reminder check needs, cloned into the scheduled job.
#[derive(Clone)]
struct ReminderRunner {
    db: DatabaseManager,
    transport: Arc<dyn MessageTransport>,
    event: EventConfig,
    broadcast: BroadcastConfig,
    tracker: DeliveryTracker,
}

pub struct ReminderService {
    runner: ReminderRunner,
    scheduler: JobScheduler,
}

impl ReminderService {
    pub async fn new(
        db: DatabaseManager,
        transport: Arc<dyn MessageTransport>,
        event: EventConfig,
        broadcast: BroadcastConfig,
        tracker: DeliveryTracker,
    ) -> Result<Self, BoxError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            runner: ReminderRunner {
                db,
                transport,
                event,
                broadcast,
                tracker,
            },
            scheduler,
        })
    }

    pub async fn start(&mut self) -> Result<(), BoxError> {
        // Run reminder checks twice daily at 9 AM and 6 PM UTC
        let runner = self.runner.clone();

        let reminder_job = Job::new_async("0 0 9,18 * * *", move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                if let Err(e) = runner.check(Utc::now()).await {
                    tracing::error!("Failed to send reminders: {}", e);
                }
            })
        })?;

        self.scheduler.add(reminder_job).await?;
        self.scheduler.start().await?;

        log_system_event(
            "Reminder service started",
            Some("checking twice daily at 9 AM and 6 PM UTC"),
        );
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), BoxError> {
        self.scheduler.shutdown().await?;
        log_system_event("Reminder service stopped", None);
        Ok(())
    }

    pub async fn check_reminders_now(&self) -> Result<Vec<SentReminder>, BoxError> {
        self.runner.check(Utc::now()).await
    }

    /// Runs the check as if the current time were `now`.
    pub async fn check_reminders_at(&self, now: DateTime<Utc>) -> Result<Vec<SentReminder>, BoxError> {
        self.runner.check(now).await
    }
}

impl ReminderRunner {
    async fn check(&self, now: DateTime<Utc>) -> Result<Vec<SentReminder>, BoxError> {
        let Some(event_date) = self.event.date else {
            tracing::debug!("No event date configured, skipping reminder check");
            return Ok(Vec::new());
        };

        let days_left = days_until(now, event_date);
        let mut sent = Vec::new();

        for days_before in REMINDER_DAYS.into_iter().filter(|d| *d == days_left) {
            let Some(_guard) = self.tracker.try_begin(format!("reminder:{days_before}")) else {
                tracing::debug!("{}-day reminder already running", days_before);
                continue;
            };

            // Only checked while holding the guard
            if Reminder::exists(&self.db.pool, days_before).await? {
                continue;
            }

            let users = User::find_by_attendance(&self.db.pool, &REMINDED_STATUSES).await?;
            if users.is_empty() {
                tracing::info!("No guests to remind {} days before the event", days_before);
                continue;
            }

            let job = BroadcastJob::new(
                render_reminder(days_before, &self.event, &event_date),
                users.iter().map(Recipient::from).collect(),
            );
            let transport = self.transport.clone();
            let send = move |recipient: Recipient, text: String| {
                let transport = transport.clone();
                async move {
                    transport
                        .send_message(OutboundMessage::markdown(recipient.chat_id, text))
                        .await
                        .map(|_| ())
                }
                .boxed()
            };

            let report = broadcast(send, &job, &BroadcastOptions::from_config(&self.broadcast)).await?;

            if let Err(e) = Reminder::create(&self.db.pool, days_before, report.delivered as i64).await {
                log_database_error("insert", "reminders", &e.to_string());
                return Err(e.into());
            }

            tracing::info!(
                "Sent {}-day reminder to {}/{} guests",
                days_before,
                report.delivered,
                report.total
            );
            sent.push(SentReminder {
                days_before,
                recipients: report.total,
                delivered: report.delivered,
            });
        }

        Ok(sent)
    }
}

pub fn render_reminder(days_before: i64, event: &EventConfig, event_date: &DateTime<Utc>) -> String {
    let heading = match days_before {
        1 => "Tomorrow is the day!".to_string(),
        7 => "One week to go".to_string(),
        d => format!("{d} days to go"),
    };

    format!(
        "📅 {}\n\n💍 {}\n🕰️ {}\n📍 {}\n",
        bold(&escape_markdown(&heading)),
        bold(&escape_markdown(&event.title)),
        escape_markdown(&format_datetime(event_date)),
        escape_markdown(&event.venue),
    )
}
