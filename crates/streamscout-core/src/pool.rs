use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::capture::CaptureSet;

/// Terminal result of one scan task. A failed task reports an empty set;
/// failure never crosses the task boundary.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub site: String,
    pub captures: CaptureSet,
}

impl TaskReport {
    pub fn empty(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            captures: CaptureSet::new(),
        }
    }
}

/// Bounded-concurrency executor for one round of scan tasks.
///
/// Tasks run in parallel under a semaphore cap, unordered relative to
/// each other. `run_round` is a full barrier: it returns only after every
/// submitted task reaches a terminal state. There is no per-task timeout
/// and no cancellation; a hung task delays the whole round.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    cap: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            cap: max_workers,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Run one round: spawn every task, await them all.
    ///
    /// A panicking task is contained — logged and replaced by an empty
    /// report for its site — so one crashed visit cannot abort the round.
    pub async fn run_round<F>(&self, tasks: Vec<(String, F)>) -> Vec<TaskReport>
    where
        F: Future<Output = TaskReport> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(tasks.len());
        for (site, task) in tasks {
            let permits = Arc::clone(&self.permits);
            let slot_site = site.clone();
            let handle = tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return TaskReport::empty(slot_site),
                };
                task.await
            });
            handles.push((site, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (site, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(%site, error = %e, "Scan task panicked; counting as empty result");
                    reports.push(TaskReport::empty(site));
                }
            }
        }
        reports
    }
}
