//! Per-guest follow-up sequence sent after the primary broadcast message.
//!
//! Steps run strictly in order: admin message, useful info, event details, menu.
//! Each enabled step is attempted and recorded on its own. A step whose content
//! cannot be produced, or which exceeds the step timeout, is recorded as failed and
//! the sequence moves on. A transport error while sending aborts the rest of the
//! sequence for that guest and is reported as the run's critical error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::services::broadcast::Recipient;
use crate::services::content::{
    render_event_details, render_menu, render_useful_info, EventContentProvider,
};
use crate::services::eligibility::percentage;
use crate::services::transport::{MessageTransport, OutboundMessage, TransportError};
use crate::utils::logging::log_sequence_step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStep {
    AdminMessage,
    UsefulInfo,
    EventDetails,
    MenuTrigger,
}

impl SequenceStep {
    pub const ALL: [SequenceStep; 4] = [
        SequenceStep::AdminMessage,
        SequenceStep::UsefulInfo,
        SequenceStep::EventDetails,
        SequenceStep::MenuTrigger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceStep::AdminMessage => "admin_message",
            SequenceStep::UsefulInfo => "useful_info",
            SequenceStep::EventDetails => "event_details",
            SequenceStep::MenuTrigger => "menu_trigger",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub attempted: bool,
    pub success: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SequenceSteps {
    pub admin_message: StepRecord,
    pub useful_info: StepRecord,
    pub event_details: StepRecord,
    pub menu_trigger: StepRecord,
}

impl SequenceSteps {
    pub fn get(&self, step: SequenceStep) -> &StepRecord {
        match step {
            SequenceStep::AdminMessage => &self.admin_message,
            SequenceStep::UsefulInfo => &self.useful_info,
            SequenceStep::EventDetails => &self.event_details,
            SequenceStep::MenuTrigger => &self.menu_trigger,
        }
    }

    fn get_mut(&mut self, step: SequenceStep) -> &mut StepRecord {
        match step {
            SequenceStep::AdminMessage => &mut self.admin_message,
            SequenceStep::UsefulInfo => &mut self.useful_info,
            SequenceStep::EventDetails => &mut self.event_details,
            SequenceStep::MenuTrigger => &mut self.menu_trigger,
        }
    }
}

/// Where a recorded error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Step(SequenceStep),
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepError {
    pub stage: FailedStage,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceOptions {
    pub admin_message: bool,
    pub useful_info: bool,
    pub event_details: bool,
    pub menu_trigger: bool,
    pub sequence_delay: Duration,
    pub step_timeout: Option<Duration>,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            admin_message: true,
            useful_info: true,
            event_details: true,
            menu_trigger: true,
            sequence_delay: Duration::from_millis(2000),
            step_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SequenceOptions {
    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self {
            admin_message: true,
            useful_info: config.send_useful_info,
            event_details: config.send_event_details,
            menu_trigger: config.send_menu_trigger,
            sequence_delay: config.sequence_delay(),
            step_timeout: Some(config.sequence_timeout()),
        }
    }

    pub fn is_enabled(&self, step: SequenceStep) -> bool {
        match step {
            SequenceStep::AdminMessage => self.admin_message,
            SequenceStep::UsefulInfo => self.useful_info,
            SequenceStep::EventDetails => self.event_details,
            SequenceStep::MenuTrigger => self.menu_trigger,
        }
    }

    pub fn enabled_steps(&self) -> Vec<SequenceStep> {
        SequenceStep::ALL
            .into_iter()
            .filter(|step| self.is_enabled(*step))
            .collect()
    }
}

/// Record of one guest's sequence. Final once returned by [`SequenceOrchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct SequenceRun {
    pub sequence_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub steps: SequenceSteps,
    pub errors: Vec<StepError>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub completion_rate: f64,
    pub success: bool,
    pub critical_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SequenceRun {
    fn start(recipient: &Recipient, total_steps: usize) -> Self {
        let now = Utc::now();
        Self {
            sequence_id: format!("seq-{}", Uuid::new_v4()),
            user_id: recipient.user_id,
            chat_id: recipient.chat_id,
            steps: SequenceSteps::default(),
            errors: Vec::new(),
            completed_steps: 0,
            total_steps,
            completion_rate: 0.0,
            success: false,
            critical_error: None,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self) -> Self {
        self.completion_rate = percentage(self.completed_steps, self.total_steps);
        self.success = self.critical_error.is_none() && self.completed_steps > 0;
        self.finished_at = Utc::now();
        self
    }

    /// Steps that were attempted, in execution order.
    pub fn attempted_steps(&self) -> impl Iterator<Item = (SequenceStep, &StepRecord)> + '_ {
        SequenceStep::ALL
            .into_iter()
            .map(move |step| (step, self.steps.get(step)))
            .filter(|(_, record)| record.attempted)
    }

    pub fn error_for(&self, step: SequenceStep) -> Option<&str> {
        self.errors
            .iter()
            .rev()
            .find(|e| e.stage == FailedStage::Step(step))
            .map(|e| e.error.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunValidation {
    pub valid: bool,
    pub completion_rate: f64,
    pub reason: Option<String>,
}

/// A run is valid when the admin message counted and at least half the steps landed.
pub fn validate_run(run: &SequenceRun) -> RunValidation {
    if !run.steps.admin_message.success {
        return RunValidation {
            valid: false,
            completion_rate: run.completion_rate,
            reason: Some("primary admin message was not delivered".to_string()),
        };
    }

    if run.completion_rate < 50.0 {
        return RunValidation {
            valid: false,
            completion_rate: run.completion_rate,
            reason: Some(format!(
                "completion rate {:.1}% is below 50%",
                run.completion_rate
            )),
        };
    }

    RunValidation {
        valid: true,
        completion_rate: run.completion_rate,
        reason: None,
    }
}

enum StepOutcome {
    Delivered,
    Failed(String),
}

#[derive(Clone)]
pub struct SequenceOrchestrator {
    transport: Arc<dyn MessageTransport>,
    content: Arc<dyn EventContentProvider>,
    options: SequenceOptions,
}

impl SequenceOrchestrator {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        content: Arc<dyn EventContentProvider>,
        options: SequenceOptions,
    ) -> Self {
        Self {
            transport,
            content,
            options,
        }
    }

    pub fn options(&self) -> &SequenceOptions {
        &self.options
    }

    pub async fn run(&self, recipient: &Recipient) -> SequenceRun {
        let enabled = self.options.enabled_steps();
        let mut run = SequenceRun::start(recipient, enabled.len());

        for (index, step) in enabled.into_iter().enumerate() {
            if index > 0 && !self.options.sequence_delay.is_zero() {
                tokio::time::sleep(self.options.sequence_delay).await;
            }

            let started = Utc::now();
            {
                let record = run.steps.get_mut(step);
                record.attempted = true;
                record.timestamp = Some(started);
            }

            match self.execute_with_timeout(step, recipient).await {
                Ok(StepOutcome::Delivered) => {
                    run.steps.get_mut(step).success = true;
                    run.completed_steps += 1;
                    log_sequence_step(&run.sequence_id, step.as_str(), true);
                }
                Ok(StepOutcome::Failed(error)) => {
                    log_sequence_step(&run.sequence_id, step.as_str(), false);
                    run.errors.push(StepError {
                        stage: FailedStage::Step(step),
                        error,
                        timestamp: Utc::now(),
                    });
                }
                Err(err) => {
                    warn!(
                        "Sequence {} for chat {} aborted at {}: {}",
                        run.sequence_id,
                        recipient.chat_id,
                        step.as_str(),
                        err
                    );
                    let message = format!("{} failed: {}", step.as_str(), err);
                    run.errors.push(StepError {
                        stage: FailedStage::Critical,
                        error: message.clone(),
                        timestamp: Utc::now(),
                    });
                    run.critical_error = Some(message);
                    break;
                }
            }
        }

        run.finish()
    }

    async fn execute_with_timeout(
        &self,
        step: SequenceStep,
        recipient: &Recipient,
    ) -> Result<StepOutcome, TransportError> {
        match self.options.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.execute(step, recipient)).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(StepOutcome::Failed(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => self.execute(step, recipient).await,
        }
    }

    async fn execute(
        &self,
        step: SequenceStep,
        recipient: &Recipient,
    ) -> Result<StepOutcome, TransportError> {
        match step {
            // Already delivered by the broadcast engine
            SequenceStep::AdminMessage => Ok(StepOutcome::Delivered),
            SequenceStep::UsefulInfo => match self.content.useful_info().await {
                Ok(items) => {
                    self.transport
                        .send_message(OutboundMessage::markdown(
                            recipient.chat_id,
                            render_useful_info(&items),
                        ))
                        .await?;
                    Ok(StepOutcome::Delivered)
                }
                Err(e) => Ok(StepOutcome::Failed(e.to_string())),
            },
            SequenceStep::EventDetails => match self.content.event_details().await {
                Ok(details) => {
                    self.transport
                        .send_message(OutboundMessage::markdown(
                            recipient.chat_id,
                            render_event_details(&details),
                        ))
                        .await?;
                    Ok(StepOutcome::Delivered)
                }
                Err(e) => Ok(StepOutcome::Failed(e.to_string())),
            },
            SequenceStep::MenuTrigger => {
                self.transport.send_message(render_menu(recipient.chat_id)).await?;
                Ok(StepOutcome::Delivered)
            }
        }
    }
}
