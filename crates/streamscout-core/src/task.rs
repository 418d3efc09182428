use std::sync::Arc;

use crate::capture::{CaptureSet, is_manifest_url};
use crate::config::ScannerConfig;
use crate::error::AppError;
use crate::pool::TaskReport;
use crate::profile::{ScanMode, SiteProfile, run_activation};
use crate::session::{BrowserSession, SessionFactory};

/// One browser-session-driven visit to a site.
///
/// The task owns its session exclusively. Activation steps are
/// best-effort; session faults (open, navigate, event polling) are caught
/// at the task boundary and turn into an empty report. The session is
/// closed exactly once on every exit path.
pub struct ScanTask {
    site: String,
    profile: Arc<dyn SiteProfile>,
    factory: Arc<dyn SessionFactory>,
    config: Arc<ScannerConfig>,
}

impl ScanTask {
    pub fn new(
        site: impl Into<String>,
        profile: Arc<dyn SiteProfile>,
        factory: Arc<dyn SessionFactory>,
        config: Arc<ScannerConfig>,
    ) -> Self {
        Self {
            site: site.into(),
            profile,
            factory,
            config,
        }
    }

    /// Run the visit to a terminal state. Never fails: any fault is
    /// logged and yields an empty report.
    pub async fn run(self) -> TaskReport {
        let mut session = match self.factory.open(&self.config.filter_pattern).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(site = %self.site, error = %e, "Could not open session");
                return TaskReport::empty(self.site);
            }
        };

        let mut captures = CaptureSet::new();
        let outcome = self.drive(session.as_mut(), &mut captures).await;

        if let Err(e) = session.close().await {
            tracing::warn!(site = %self.site, error = %e, "Session close failed");
        }

        match outcome {
            Ok(()) => {
                tracing::debug!(site = %self.site, found = captures.len(), "Visit finished");
                TaskReport {
                    site: self.site,
                    captures,
                }
            }
            Err(e) => {
                tracing::warn!(site = %self.site, error = %e, "Visit failed; reporting empty result");
                TaskReport::empty(self.site)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        captures: &mut CaptureSet,
    ) -> Result<(), AppError> {
        session.navigate(&self.site).await?;

        run_activation(self.profile.as_ref(), session).await;
        self.capture_window(session, captures).await?;

        if let ScanMode::SingleSession { refresh_rounds } = self.profile.mode() {
            for round in 1..=refresh_rounds {
                tracing::debug!(site = %self.site, round, refresh_rounds, "Refresh sub-round");
                // Refresh targets move to new content at a stable page URL;
                // stale buffered events would be misattributed.
                session.clear_events().await?;
                let refreshed = self.profile.refresh(session).await;
                if refreshed.is_failed() {
                    tracing::debug!(site = %self.site, round, "Refresh step failed, continuing");
                }
                run_activation(self.profile.as_ref(), session).await;
                tokio::time::sleep(self.config.refresh_delay).await;
                self.collect(session, captures).await?;
            }
        }

        // Final sweep for events that arrived after the last poll.
        self.collect(session, captures).await?;
        Ok(())
    }

    /// Poll network events over a fixed number of short rounds.
    async fn capture_window(
        &self,
        session: &mut dyn BrowserSession,
        captures: &mut CaptureSet,
    ) -> Result<(), AppError> {
        for _ in 0..self.config.capture_rounds {
            tokio::time::sleep(self.config.capture_wait).await;
            self.collect(session, captures).await?;
        }
        Ok(())
    }

    async fn collect(
        &self,
        session: &mut dyn BrowserSession,
        captures: &mut CaptureSet,
    ) -> Result<(), AppError> {
        for url in session.events().await? {
            if is_manifest_url(&url) {
                captures.insert(url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockProfile, MockSessionFactory, fast_config};

    fn task_for(factory: &Arc<MockSessionFactory>, profile: MockProfile) -> ScanTask {
        let factory_dyn: Arc<dyn SessionFactory> = factory.clone();
        ScanTask::new(
            "https://plain-site.test",
            Arc::new(profile),
            factory_dyn,
            Arc::new(fast_config()),
        )
    }

    #[tokio::test]
    async fn test_visit_collects_only_manifest_urls() {
        let factory = Arc::new(MockSessionFactory::scripted(vec![vec![
            "https://cdn.test/live/index.m3u8".into(),
            "https://cdn.test/live/index.m3u8?token=2".into(),
            "https://cdn.test/ad-beacon.gif".into(),
        ]]));

        let report = task_for(&factory, MockProfile::fresh()).run().await;
        assert_eq!(report.captures.len(), 1);
        assert!(report.captures.contains("https://cdn.test/live/index.m3u8"));
        assert_eq!(factory.opened(), 1);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_navigate_failure_yields_empty_and_closes_once() {
        let factory = Arc::new(MockSessionFactory::scripted(vec![]).failing_navigate());

        let report = task_for(&factory, MockProfile::fresh()).run().await;
        assert!(report.captures.is_empty());
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_event_poll_failure_yields_empty_and_closes_once() {
        let factory = Arc::new(MockSessionFactory::scripted(vec![]).failing_events());

        let report = task_for(&factory, MockProfile::fresh()).run().await;
        assert!(report.captures.is_empty());
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_yields_empty_without_session() {
        let factory = Arc::new(MockSessionFactory::failing_open());

        let report = task_for(&factory, MockProfile::fresh()).run().await;
        assert!(report.captures.is_empty());
        assert_eq!(factory.opened(), 0);
        assert_eq!(factory.closed(), 0);
    }

    #[tokio::test]
    async fn test_single_session_profile_runs_refresh_sub_rounds() {
        // One batch per capture poll; refresh sub-rounds surface new URLs.
        let factory = Arc::new(MockSessionFactory::scripted(vec![
            vec!["https://cdn.test/ch1.m3u8".into()],
            vec!["https://cdn.test/ch2.m3u8".into()],
            vec!["https://cdn.test/ch3.m3u8".into()],
        ]));
        let profile = MockProfile::single_session(3);
        let calls = profile.call_log();

        let report = task_for(&factory, profile).run().await;
        assert_eq!(report.captures.len(), 3);

        let refreshes = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == "refresh")
            .count();
        assert_eq!(refreshes, 3);
        // The pending-event buffer is cleared before every refresh.
        assert_eq!(factory.cleared(), 3);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_failing_activation_steps_do_not_abort_visit() {
        let factory = Arc::new(MockSessionFactory::scripted(vec![vec![
            "https://cdn.test/live.m3u8".into(),
        ]]));

        let report = task_for(&factory, MockProfile::failing_all("no play button"))
            .run()
            .await;
        assert_eq!(report.captures.len(), 1);
        assert_eq!(factory.closed(), 1);
    }
}
