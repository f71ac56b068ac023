//! # Fallback handling
//!
//! Once a task has no retries left (or failed with a kind that is never
//! retried) the [`FallbackHandler`] decides what becomes of it.
//!
//! | strategy             | outcome                                              |
//! |----------------------|------------------------------------------------------|
//! | `Skip`               | skipped, recorded as a failed slot; batch goes on    |
//! | `AlternativeTask`    | run the caller's alternative; its failure is a skip  |
//! | `HumanIntervention`  | park in WAITING_FOR_HUMAN until resolved externally  |
//! | `Fail`               | plain failure                                        |

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::executor::{AttemptError, TaskBody, TaskExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    Skip,
    AlternativeTask,
    #[default]
    HumanIntervention,
    Fail,
}

impl FallbackStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackStrategy::Skip => "skip",
            FallbackStrategy::AlternativeTask => "alternative_task",
            FallbackStrategy::HumanIntervention => "human_intervention",
            FallbackStrategy::Fail => "fail",
        }
    }
}

impl FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "skip" => Ok(FallbackStrategy::Skip),
            "alternative" | "alternative_task" => Ok(FallbackStrategy::AlternativeTask),
            "human" | "human_intervention" | "ask_human" => {
                Ok(FallbackStrategy::HumanIntervention)
            }
            "fail" => Ok(FallbackStrategy::Fail),
            other => Err(format!("unknown fallback strategy '{other}'")),
        }
    }
}

/// Disposition of a task after its fallback ran.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    Skipped,
    Failed,
    /// The alternative succeeded and stands in for the original result.
    Recovered(serde_json::Value),
    AwaitHuman,
    Cancelled,
}

pub struct FallbackRequest<'a> {
    pub task_name: &'a str,
    pub alternative: Option<&'a TaskBody>,
    pub timeout_ms: u64,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct FallbackHandler {
    executor: TaskExecutor,
    human_approval_needed: bool,
}

impl FallbackHandler {
    pub fn new(human_approval_needed: bool) -> Self {
        Self {
            executor: TaskExecutor::new(),
            human_approval_needed,
        }
    }

    pub async fn handle(
        &self,
        strategy: FallbackStrategy,
        request: FallbackRequest<'_>,
    ) -> FallbackOutcome {
        match strategy {
            FallbackStrategy::Skip => FallbackOutcome::Skipped,
            FallbackStrategy::Fail => FallbackOutcome::Failed,
            FallbackStrategy::HumanIntervention => {
                if self.human_approval_needed {
                    FallbackOutcome::AwaitHuman
                } else {
                    tracing::info!(
                        task = request.task_name,
                        "human approval disabled, failing instead of waiting"
                    );
                    FallbackOutcome::Failed
                }
            }
            FallbackStrategy::AlternativeTask => self.run_alternative(request).await,
        }
    }

    async fn run_alternative(&self, request: FallbackRequest<'_>) -> FallbackOutcome {
        let Some(alternative) = request.alternative else {
            tracing::warn!(
                task = request.task_name,
                "alternative fallback configured without an alternative, skipping"
            );
            return FallbackOutcome::Skipped;
        };

        tracing::info!(task = request.task_name, "running alternative task");
        match self
            .executor
            .run(request.task_name, alternative, request.timeout_ms, request.cancel)
            .await
        {
            Ok(value) => FallbackOutcome::Recovered(value),
            Err(AttemptError::Cancelled) => FallbackOutcome::Cancelled,
            Err(AttemptError::Failed(err)) | Err(AttemptError::TimedOut(err)) => {
                log_alternative_failure(request.task_name, &err);
                FallbackOutcome::Skipped
            }
        }
    }
}

fn log_alternative_failure(task_name: &str, err: &TaskError) {
    tracing::warn!(task = task_name, error = %err, "alternative task failed, skipping");
}
