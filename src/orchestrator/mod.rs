pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capture::types::ScreenCapture;
use crate::config::{ConfidenceTable, GatewayConfig, Outcome};
use crate::errors::{PilotError, PilotResult};
use crate::gateway::route::{GatewayReply, GatewayRequest};
use crate::plan_parser::{self, PlanParser};
use crate::timeline::Timeline;
use crate::types::{ActionStep, InferenceResponse, Mode, Submission};

use self::transport::GatewayTransport;

const DEFAULT_FAILURE_MESSAGE: &str = "Analysis failed";

/// Submission lifecycle. `Failed` is transient: every submission ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Submitting,
    Failed,
}

/// Result of an accepted submission.
#[derive(Debug)]
pub struct SubmissionTicket {
    pub epoch: u64,
    pub response: InferenceResponse,
    reveal: Option<JoinHandle<usize>>,
}

impl SubmissionTicket {
    /// Waits for the staggered step reveal to finish and returns how many
    /// step entries it recorded. Zero for analyze/execute.
    pub async fn steps_revealed(self) -> usize {
        let Some(handle) = self.reveal else {
            return 0;
        };
        match handle.await {
            Ok(revealed) => revealed,
            Err(e) => {
                tracing::error!(epoch = self.epoch, error = %e, "step reveal task failed");
                0
            }
        }
    }
}

/// Client side of a submission: validation, one-in-flight guard, dispatch,
/// and mapping of the reply onto timeline entries.
pub struct Orchestrator {
    transport: Arc<dyn GatewayTransport>,
    timeline: Timeline,
    state: watch::Sender<SubmissionState>,
    /// Bumped by every dispatched submission. A step reveal stops as soon as
    /// it no longer matches.
    epoch: Arc<AtomicU64>,
    request_timeout: Duration,
    step_stagger: Duration,
    confidence: ConfidenceTable,
    parser: PlanParser,
}

/// Restores `Idle` however `submit` exits, including cancellation.
struct IdleOnDrop<'a>(&'a watch::Sender<SubmissionState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SubmissionState::Idle);
    }
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn GatewayTransport>, timeline: Timeline, config: &GatewayConfig) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            transport,
            timeline,
            state,
            epoch: Arc::new(AtomicU64::new(0)),
            request_timeout: config.request_timeout(),
            step_stagger: config.step_stagger(),
            confidence: ConfidenceTable::default(),
            parser: PlanParser::default(),
        }
    }

    /// Confidence values used when a plan reply has to be repaired locally.
    pub fn with_confidence(mut self, table: ConfidenceTable) -> Self {
        self.parser = PlanParser::from_table(&table);
        self.confidence = table;
        self
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn state(&self) -> SubmissionState {
        *self.state.borrow()
    }

    /// Watch this to enable or disable a submit control.
    pub fn watch_state(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Invalidates any step reveal still pending.
    pub fn cancel_pending(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "pending step reveals cancelled");
    }

    /// Validates and sends one submission, recording the outcome in the
    /// timeline. Rejected with `Busy` while another one is in flight.
    pub async fn submit(
        &self,
        mode: Mode,
        instruction: &str,
        image: Option<Arc<ScreenCapture>>,
    ) -> PilotResult<SubmissionTicket> {
        if self.state() != SubmissionState::Idle {
            tracing::warn!(mode = %mode, "submission rejected: another one is in flight");
            return Err(PilotError::Busy);
        }

        let submission = match Submission::new(mode, instruction, image) {
            Ok(s) => s,
            Err(e) => {
                tracing::info!(mode = %mode, "submission failed validation");
                self.timeline.error(e.user_message());
                return Err(e);
            }
        };

        let acquired = self.state.send_if_modified(|state| {
            if *state == SubmissionState::Idle {
                *state = SubmissionState::Submitting;
                true
            } else {
                false
            }
        });
        if !acquired {
            tracing::warn!(mode = %mode, "submission rejected: another one is in flight");
            return Err(PilotError::Busy);
        }
        let _idle = IdleOnDrop(&self.state);

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(mode = %mode, epoch, "submitting");

        match self.dispatch(&submission).await {
            Ok(response) => {
                let reveal = self.record_response(epoch, &response);
                Ok(SubmissionTicket {
                    epoch,
                    response,
                    reveal,
                })
            }
            Err(e) => {
                tracing::warn!(mode = %mode, epoch, error = %e, "submission failed");
                self.state.send_replace(SubmissionState::Failed);
                self.timeline.error(e.user_message());
                Err(e)
            }
        }
    }

    async fn dispatch(&self, submission: &Submission) -> PilotResult<InferenceResponse> {
        let request = GatewayRequest {
            prompt: submission.instruction().to_string(),
            screenshot: submission.image().data_url(),
            action: submission.mode().as_str().to_string(),
        };

        let reply = tokio::time::timeout(self.request_timeout, self.transport.send(&request))
            .await
            .map_err(|_| {
                PilotError::Network(format!(
                    "request timed out after {}s",
                    self.request_timeout.as_secs_f64()
                ))
            })??;

        interpret_reply(reply, &self.parser, &self.confidence)
    }

    /// One success entry, then for plans the staggered step entries.
    fn record_response(&self, epoch: u64, response: &InferenceResponse) -> Option<JoinHandle<usize>> {
        self.timeline
            .success(response.summary_text(), response.confidence());
        match response {
            InferenceResponse::Plan { actions, .. } if !actions.is_empty() => {
                Some(self.spawn_reveal(epoch, actions.clone()))
            }
            _ => None,
        }
    }

    fn spawn_reveal(&self, epoch: u64, steps: Vec<ActionStep>) -> JoinHandle<usize> {
        let timeline = self.timeline.clone();
        let current = self.epoch.clone();
        let stagger = self.step_stagger;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            let mut revealed = 0;
            for (index, step) in steps.iter().enumerate() {
                let due = u32::try_from(index)
                    .ok()
                    .and_then(|i| stagger.checked_mul(i))
                    .and_then(|offset| start.checked_add(offset));
                let Some(due) = due else {
                    tracing::warn!(epoch, index, "step delay out of range; stopping reveal");
                    break;
                };
                tokio::time::sleep_until(due).await;
                if current.load(Ordering::SeqCst) != epoch {
                    tracing::debug!(
                        epoch,
                        dropped = steps.len() - index,
                        "newer submission started; dropping stale steps"
                    );
                    break;
                }
                timeline.step(step.timeline_line(index), step.confidence);
                revealed += 1;
            }
            revealed
        })
    }
}

/// Maps a gateway reply to a response or to the error shown to the user.
/// Plan replies go through the lenient step mapping, so a remote gateway that
/// forwards raw model output degrades instead of failing.
fn interpret_reply(
    reply: GatewayReply,
    parser: &PlanParser,
    table: &ConfidenceTable,
) -> PilotResult<InferenceResponse> {
    if !reply.is_success() {
        let message = reply.body["error"]
            .as_str()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE)
            .to_string();
        return Err(PilotError::Service {
            status: reply.status,
            message,
        });
    }
    if reply.body["type"] == "plan" {
        return Ok(decode_plan(&reply.body, parser, table));
    }
    serde_json::from_value(reply.body)
        .map_err(|e| PilotError::Network(format!("unreadable gateway reply: {e}")))
}

fn decode_plan(body: &serde_json::Value, parser: &PlanParser, table: &ConfidenceTable) -> InferenceResponse {
    let plan = parser.parse_value(&body["actions"]);
    let confidence = if plan.degraded {
        tracing::warn!("gateway plan had no usable action list");
        table.get(Mode::Plan, Outcome::Fallback)
    } else {
        plan_parser::unit_interval(&body["confidence"])
            .unwrap_or_else(|| table.get(Mode::Plan, Outcome::Success))
    };
    let timestamp = body["timestamp"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    InferenceResponse::Plan {
        actions: plan.steps,
        confidence,
        timestamp,
    }
}
