use std::sync::Arc;

use async_trait::async_trait;

use crate::session::BrowserSession;

/// How a site's visits are structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Independent fresh sessions; the orchestrator runs
    /// `visits_per_site` rounds.
    FreshVisits,
    /// One extended session per pool slot; a single round whose tasks run
    /// `refresh_rounds` in-session sub-rounds instead of repeated visits.
    SingleSession { refresh_rounds: u32 },
}

impl ScanMode {
    pub fn is_single_session(&self) -> bool {
        matches!(self, ScanMode::SingleSession { .. })
    }
}

/// Outcome of one best-effort interaction step. Steps report failure
/// instead of returning `Err`, so a broken overlay or missing button
/// never aborts the visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Completed,
    /// Nothing to do for this site (e.g. no refresh control declared).
    Skipped,
    Failed(String),
}

impl StepResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        StepResult::Failed(reason.into())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepResult::Failed(_))
    }
}

/// Pluggable per-site interaction strategy.
///
/// All steps are best-effort: they must not return errors across this
/// boundary. New site behavior is added as a new profile, never as a new
/// orchestrator branch.
#[async_trait]
pub trait SiteProfile: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> ScanMode;

    /// Wake the player surface (click iframes, page body, video elements).
    async fn activate(&self, session: &mut dyn BrowserSession) -> StepResult;

    /// Press play controls, traversing nested frames and shadow roots.
    async fn attempt_start(&self, session: &mut dyn BrowserSession) -> StepResult;

    /// Dismiss ad overlays and countdown skip buttons.
    async fn dismiss_ads(&self, session: &mut dyn BrowserSession) -> StepResult;

    /// Advance to the next item at a stable page URL (single-session
    /// profiles only).
    async fn refresh(&self, session: &mut dyn BrowserSession) -> StepResult {
        let _ = session;
        StepResult::Skipped
    }
}

/// Per-step record from an activation pass.
pub type StepOutcome = (&'static str, StepResult);

/// Run the full activation sequence, continuing past failed steps.
///
/// Failures are recorded and logged, never propagated; the returned
/// outcomes keep the failure information visible to callers and tests.
pub async fn run_activation(
    profile: &dyn SiteProfile,
    session: &mut dyn BrowserSession,
) -> Vec<StepOutcome> {
    let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(3);
    outcomes.push(("activate", profile.activate(session).await));
    outcomes.push(("attempt_start", profile.attempt_start(session).await));
    outcomes.push(("dismiss_ads", profile.dismiss_ads(session).await));

    for (step, result) in &outcomes {
        if let StepResult::Failed(reason) = result {
            tracing::debug!(profile = profile.name(), step, %reason, "Activation step failed");
        }
    }
    outcomes
}

/// Profile that interacts with nothing: passive network capture only.
/// Used as the registry fallback for sites with no declared strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveProfile;

#[async_trait]
impl SiteProfile for PassiveProfile {
    fn name(&self) -> &str {
        "passive"
    }

    fn mode(&self) -> ScanMode {
        ScanMode::FreshVisits
    }

    async fn activate(&self, _session: &mut dyn BrowserSession) -> StepResult {
        StepResult::Skipped
    }

    async fn attempt_start(&self, _session: &mut dyn BrowserSession) -> StepResult {
        StepResult::Skipped
    }

    async fn dismiss_ads(&self, _session: &mut dyn BrowserSession) -> StepResult {
        StepResult::Skipped
    }
}

/// Looks up the interaction strategy for a site by host-substring match,
/// falling back to a default profile.
#[derive(Clone)]
pub struct ProfileRegistry {
    matchers: Vec<(String, Arc<dyn SiteProfile>)>,
    default: Arc<dyn SiteProfile>,
}

impl std::fmt::Debug for ProfileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileRegistry")
            .field(
                "matchers",
                &self
                    .matchers
                    .iter()
                    .map(|(m, p)| (m.as_str(), p.name()))
                    .collect::<Vec<_>>(),
            )
            .field("default", &self.default.name())
            .finish()
    }
}

impl ProfileRegistry {
    pub fn new(default: Arc<dyn SiteProfile>) -> Self {
        Self {
            matchers: Vec::new(),
            default,
        }
    }

    /// Registry whose default does nothing beyond passive capture.
    pub fn passive() -> Self {
        Self::new(Arc::new(PassiveProfile))
    }

    /// Register a profile for every site whose URL contains `matcher`
    /// (case-insensitive). First registered match wins.
    pub fn register(mut self, matcher: impl Into<String>, profile: Arc<dyn SiteProfile>) -> Self {
        self.matchers.push((matcher.into().to_lowercase(), profile));
        self
    }

    pub fn lookup(&self, site: &str) -> Arc<dyn SiteProfile> {
        let site = site.to_lowercase();
        self.matchers
            .iter()
            .find(|(matcher, _)| site.contains(matcher))
            .map(|(_, profile)| Arc::clone(profile))
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}
