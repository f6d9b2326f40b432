//! Fan-out of independent I/O tasks with an explicit join barrier.
//!
//! A [`TaskGroup`] owns a batch of spawned tasks. Results are drained one at
//! a time by the single owner, in completion order, so any aggregation done
//! by the caller is single-writer and needs no lock.
//!
//! There is no cancellation: once spawned, every task runs to completion.
//! When the owner stops early (first error, or the group is dropped) the
//! remaining tasks are detached rather than aborted.

use crate::error::{MateError, Result};
use std::future::Future;
use tokio::task::JoinSet;

pub struct TaskGroup<T: 'static> {
    label: &'static str,
    set: JoinSet<Result<T>>,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            set: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.set.spawn(task);
    }

    /// Next finished task, in completion order. `None` once drained.
    pub async fn next(&mut self) -> Option<Result<T>> {
        let joined = self.set.join_next().await?;
        Some(match joined {
            Ok(result) => result,
            Err(e) => Err(MateError::TaskFailed(format!("{}: {e}", self.label))),
        })
    }

    /// Wait for every task. The first observed error is returned; tasks
    /// still in flight keep running.
    pub async fn join_all(mut self) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.set.len());
        while let Some(result) = self.next().await {
            match result {
                Ok(value) => results.push(value),
                Err(e) => {
                    tracing::warn!(group = self.label, error = %e, "fan-out task failed");
                    return Err(e);
                }
            }
        }
        Ok(results)
    }
}

impl<T: 'static> Drop for TaskGroup<T> {
    fn drop(&mut self) {
        self.set.detach_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_all_collects_every_result() {
        let mut group = TaskGroup::new("test");
        for i in 0..8u32 {
            group.spawn(async move { Ok(i * 2) });
        }
        let mut results = group.join_all().await.unwrap();
        results.sort();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[tokio::test]
    async fn test_next_yields_completion_order() {
        let mut group = TaskGroup::new("test");
        group.spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok("slow")
        });
        group.spawn(async { Ok("fast") });

        assert_eq!(group.next().await.unwrap().unwrap(), "fast");
        assert_eq!(group.next().await.unwrap().unwrap(), "slow");
        assert!(group.next().await.is_none());
    }

    #[tokio::test]
    async fn test_first_error_aborts_join_but_siblings_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new("test");
        group.spawn(async { Err(MateError::Transport("boom".into())) });
        for _ in 0..3 {
            let finished = finished.clone();
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let err = group.join_all().await.unwrap_err();
        assert!(matches!(err, MateError::Transport(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_task_is_task_failed() {
        let mut group: TaskGroup<()> = TaskGroup::new("panics");
        group.spawn(async { panic!("task exploded") });
        let err = group.join_all().await.unwrap_err();
        assert!(matches!(err, MateError::TaskFailed(msg) if msg.starts_with("panics")));
    }
}
