use std::sync::Arc;

use async_trait::async_trait;

use crate::capture::{CaptureSet, JobCaptures};
use crate::config::ScannerConfig;
use crate::error::AppError;
use crate::executor::JobScanner;
use crate::job::ScanJob;
use crate::pool::WorkerPool;
use crate::profile::{ProfileRegistry, ScanMode};
use crate::session::SessionFactory;
use crate::task::ScanTask;

/// Round-based scan orchestrator.
///
/// Sites and rounds run strictly sequentially; the tasks inside a round
/// run concurrently under the worker pool's cap. The per-site capture set
/// is only touched here, at round barriers, so worker tasks never share
/// mutable state.
pub struct ScanService {
    factory: Arc<dyn SessionFactory>,
    profiles: ProfileRegistry,
    config: Arc<ScannerConfig>,
}

impl ScanService {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        profiles: ProfileRegistry,
        config: ScannerConfig,
    ) -> Self {
        Self {
            factory,
            profiles,
            config: Arc::new(config),
        }
    }

    async fn scan_site(
        &self,
        job: &ScanJob,
        site: &str,
        captures: &mut JobCaptures,
    ) -> Result<(), AppError> {
        let profile = self.profiles.lookup(site);

        // A single-session profile substitutes in-session refresh
        // sub-rounds for repeated visits.
        let rounds = match profile.mode() {
            ScanMode::SingleSession { .. } => 1,
            ScanMode::FreshVisits => job.visits_per_site,
        };

        tracing::info!(
            %site,
            profile = profile.name(),
            rounds,
            workers = job.max_workers,
            "Scanning site"
        );

        let pool = WorkerPool::new(job.max_workers);
        for round in 1..=rounds {
            tracing::info!(%site, round, rounds, "Launching round");

            let tasks: Vec<_> = (0..job.max_workers)
                .map(|_| {
                    let task = ScanTask::new(
                        site,
                        Arc::clone(&profile),
                        Arc::clone(&self.factory),
                        Arc::clone(&self.config),
                    );
                    (site.to_string(), task.run())
                })
                .collect();

            // Full barrier: every task of this round terminates before the
            // merge, so round k+1 never overlaps round k.
            let reports = pool.run_round(tasks).await;

            let mut round_set = CaptureSet::new();
            for report in &reports {
                round_set.merge(&report.captures);
            }
            captures.merge_site(site, &round_set);

            tracing::info!(
                %site,
                round,
                new_this_round = round_set.len(),
                total = captures.site(site).map_or(0, CaptureSet::len),
                "Round finished"
            );

            if round < rounds {
                tokio::time::sleep(self.config.round_pause).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobScanner for ScanService {
    async fn scan_job(&self, job: &ScanJob, captures: &mut JobCaptures) -> Result<(), AppError> {
        for site in &job.sites {
            self.scan_site(job, site, captures).await?;
        }
        Ok(())
    }
}
