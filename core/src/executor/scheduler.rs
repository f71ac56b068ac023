use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::error::{ErrorKind, ExecutorError};

use super::types::TaskResult;

/// Split `len` tasks into consecutive index ranges of at most `max_concurrent`.
pub(crate) fn chunk_ranges(
    len: usize,
    max_concurrent: Option<usize>,
) -> Vec<std::ops::Range<usize>> {
    let size = max_concurrent.filter(|n| *n > 0).unwrap_or(len).max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Execute one chunk concurrently.
///
/// Every task is spawned up front, so siblings keep running when fail-fast
/// returns early. Each result lands in `slots[i]` for input position `i`,
/// whatever the completion order.
///
/// With `fail_fast`, the first hard failure (or orchestration error) observed
/// is returned and the slots of unfinished tasks stay empty. Without it,
/// orchestration errors leave an empty slot and are only logged.
pub(crate) async fn run_chunk<F, Fut>(
    ids: &[String],
    slots: &mut [Option<TaskResult>],
    fail_fast: bool,
    executor_fn: F,
) -> Result<(), ExecutorError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<TaskResult, ExecutorError>> + Send + 'static,
{
    let mut futs: FuturesUnordered<_> = ids
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            let handle = tokio::spawn(executor_fn(id.clone()));
            async move { (idx, handle.await) }
        })
        .collect();

    while let Some((idx, joined)) = futs.next().await {
        let outcome = joined
            .map_err(|e| ExecutorError::Join(e.to_string()))
            .and_then(|res| res);

        match outcome {
            Ok(result) if fail_fast && result.is_hard_failure() => {
                let (kind, message) = result
                    .error
                    .as_ref()
                    .map(|e| (e.kind, e.message.clone()))
                    .unwrap_or((ErrorKind::Unknown, "task failed".to_string()));
                return Err(ExecutorError::TaskFailed {
                    task_id: result.task_id,
                    kind,
                    message,
                });
            }
            Ok(result) => slots[idx] = Some(result),
            Err(err) if fail_fast => return Err(err),
            Err(err) => {
                tracing::warn!(task_id = %ids[idx], error = %err, "task produced no result");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges() {
        assert_eq!(chunk_ranges(5, Some(2)), vec![0..2, 2..4, 4..5]);
        assert_eq!(chunk_ranges(3, None), vec![0..3]);
        assert_eq!(chunk_ranges(3, Some(10)), vec![0..3]);
        assert!(chunk_ranges(0, Some(2)).is_empty());
    }
}
