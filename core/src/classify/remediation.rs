use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ErrorKind, TaskError};

/// What a remediation handler knows about the failure it is asked to fix.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationContext {
    pub task_id: String,
    pub task_name: String,
    pub kind: ErrorKind,
    pub retry_count: u32,
}

/// Recovery hook attached to an [`ErrorPattern`](super::ErrorPattern).
///
/// Returning `Ok(value)` resolves the failed task with `value`; returning an
/// error hands the failure back to the retry/fallback pipeline unchanged.
#[async_trait]
pub trait Remediation: Send + Sync {
    async fn remediate(
        &self,
        error: &TaskError,
        context: &RemediationContext,
    ) -> Result<serde_json::Value, TaskError>;
}

#[async_trait]
impl<F, Fut> Remediation for F
where
    F: Fn(TaskError, RemediationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send + 'static,
{
    async fn remediate(
        &self,
        error: &TaskError,
        context: &RemediationContext,
    ) -> Result<serde_json::Value, TaskError> {
        (self)(error.clone(), context.clone()).await
    }
}
