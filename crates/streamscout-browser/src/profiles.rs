//! Selector-driven site profiles.
//!
//! Site interaction strategies are declared in a JSON file instead of
//! hardcoded per host: each definition names the hosts it applies to and
//! the CSS selectors for the player, start buttons, ad overlays, and the
//! refresh control. The definitions compile into [`ScriptedProfile`]s that
//! drive the page through injected scripts, clicking through same-origin
//! iframes and open shadow roots.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use streamscout_core::error::AppError;
use streamscout_core::profile::{ProfileRegistry, ScanMode, SiteProfile, StepResult};
use streamscout_core::session::BrowserSession;

/// Top-level shape of the profile definitions file.
#[derive(Debug, Deserialize)]
pub struct ProfilesFile {
    pub profiles: Vec<ProfileDef>,
}

/// One declared site strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDef {
    pub name: String,
    /// Host substrings this profile applies to (case-insensitive).
    pub matches: Vec<String>,
    /// When set, the site runs one extended session with this many
    /// in-session refresh rounds instead of repeated fresh visits.
    #[serde(default)]
    pub refresh_rounds: Option<u32>,
    /// Selectors clicked to wake the player surface.
    #[serde(default)]
    pub activate_selectors: Vec<String>,
    /// Selectors clicked to press play.
    #[serde(default)]
    pub start_selectors: Vec<String>,
    /// Selectors removed to dismiss ad overlays.
    #[serde(default)]
    pub ad_selectors: Vec<String>,
    /// Selector clicked to advance to the next item. When absent, a
    /// single-session profile falls back to reloading the page.
    #[serde(default)]
    pub refresh_selector: Option<String>,
}

/// Load the registry from a definitions file; `None` yields a registry
/// whose every site is scanned passively.
pub fn load_registry(path: Option<&Path>) -> Result<ProfileRegistry, AppError> {
    let Some(path) = path else {
        return Ok(ProfileRegistry::passive());
    };
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Cannot read profiles file {}: {e}", path.display())))?;
    let file: ProfilesFile = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("Invalid profiles file {}: {e}", path.display())))?;

    let mut registry = ProfileRegistry::passive();
    for def in file.profiles {
        tracing::info!(profile = %def.name, matches = ?def.matches, "Registered site profile");
        let profile: Arc<dyn SiteProfile> = Arc::new(ScriptedProfile::from_def(def.clone()));
        for matcher in def.matches {
            registry = registry.register(matcher, Arc::clone(&profile));
        }
    }
    Ok(registry)
}

/// Profile that drives the page via injected click/remove scripts built
/// from declared selectors.
pub struct ScriptedProfile {
    def: ProfileDef,
}

impl ScriptedProfile {
    pub fn from_def(def: ProfileDef) -> Self {
        Self { def }
    }

    async fn click_step(
        &self,
        session: &mut dyn BrowserSession,
        selectors: &[String],
    ) -> StepResult {
        if selectors.is_empty() {
            return StepResult::Skipped;
        }
        match session.evaluate(&click_script(selectors)).await {
            Ok(()) => StepResult::Completed,
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

#[async_trait]
impl SiteProfile for ScriptedProfile {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn mode(&self) -> ScanMode {
        match self.def.refresh_rounds {
            Some(refresh_rounds) => ScanMode::SingleSession { refresh_rounds },
            None => ScanMode::FreshVisits,
        }
    }

    async fn activate(&self, session: &mut dyn BrowserSession) -> StepResult {
        self.click_step(session, &self.def.activate_selectors).await
    }

    async fn attempt_start(&self, session: &mut dyn BrowserSession) -> StepResult {
        self.click_step(session, &self.def.start_selectors).await
    }

    async fn dismiss_ads(&self, session: &mut dyn BrowserSession) -> StepResult {
        if self.def.ad_selectors.is_empty() {
            return StepResult::Skipped;
        }
        match session.evaluate(&remove_script(&self.def.ad_selectors)).await {
            Ok(()) => StepResult::Completed,
            Err(e) => StepResult::failed(e.to_string()),
        }
    }

    async fn refresh(&self, session: &mut dyn BrowserSession) -> StepResult {
        if !self.mode().is_single_session() {
            return StepResult::Skipped;
        }
        let script = match &self.def.refresh_selector {
            Some(selector) => click_script(std::slice::from_ref(selector)),
            None => "location.reload();".to_string(),
        };
        match session.evaluate(&script).await {
            Ok(()) => StepResult::Completed,
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

/// Walker shared by the generated scripts: collects the main document plus
/// every reachable same-origin iframe document and open shadow root.
const DOC_WALKER_JS: &str = r#"
const roots = [document];
const queue = [document];
while (queue.length) {
    const doc = queue.shift();
    for (const frame of doc.querySelectorAll('iframe')) {
        try {
            const inner = frame.contentDocument;
            if (inner) { roots.push(inner); queue.push(inner); }
        } catch (e) { /* cross-origin */ }
    }
    for (const el of doc.querySelectorAll('*')) {
        if (el.shadowRoot) { roots.push(el.shadowRoot); }
    }
}
"#;

fn click_script(selectors: &[String]) -> String {
    format!(
        "(() => {{{DOC_WALKER_JS}\nconst selectors = {};\nfor (const root of roots) {{\n    for (const sel of selectors) {{\n        for (const el of root.querySelectorAll(sel)) {{\n            try {{ el.click(); }} catch (e) {{}}\n        }}\n    }}\n}}}})();",
        json_array(selectors)
    )
}

fn remove_script(selectors: &[String]) -> String {
    format!(
        "(() => {{{DOC_WALKER_JS}\nconst selectors = {};\nfor (const root of roots) {{\n    for (const sel of selectors) {{\n        for (const el of root.querySelectorAll(sel)) {{\n            try {{ el.remove(); }} catch (e) {{}}\n        }}\n    }}\n}}}})();",
        json_array(selectors)
    )
}

/// Selectors embedded as a JSON literal so quoting is always valid JS.
fn json_array(selectors: &[String]) -> String {
    serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use streamscout_core::testutil::MockSession;

    use super::*;

    fn sample_def() -> ProfileDef {
        ProfileDef {
            name: "sportsline".into(),
            matches: vec!["sportsline".into()],
            refresh_rounds: Some(4),
            activate_selectors: vec!["#player".into()],
            start_selectors: vec![".vjs-big-play-button".into()],
            ad_selectors: vec![".ad-overlay".into(), "#skip".into()],
            refresh_selector: Some("#next-match".into()),
        }
    }

    #[test]
    fn test_mode_follows_refresh_rounds() {
        let single = ScriptedProfile::from_def(sample_def());
        assert_eq!(single.mode(), ScanMode::SingleSession { refresh_rounds: 4 });

        let mut def = sample_def();
        def.refresh_rounds = None;
        let fresh = ScriptedProfile::from_def(def);
        assert_eq!(fresh.mode(), ScanMode::FreshVisits);
    }

    #[tokio::test]
    async fn test_steps_inject_selector_scripts() {
        let profile = ScriptedProfile::from_def(sample_def());
        let mut session = MockSession::scripted(vec![]);

        assert_eq!(profile.activate(&mut session).await, StepResult::Completed);
        assert_eq!(profile.attempt_start(&mut session).await, StepResult::Completed);
        assert_eq!(profile.dismiss_ads(&mut session).await, StepResult::Completed);
        assert_eq!(profile.refresh(&mut session).await, StepResult::Completed);

        let scripts = session.evaluated();
        assert_eq!(scripts.len(), 4);
        assert!(scripts[0].contains("#player"));
        assert!(scripts[1].contains(".vjs-big-play-button"));
        assert!(scripts[2].contains("remove()"));
        assert!(scripts[3].contains("#next-match"));
    }

    #[tokio::test]
    async fn test_undeclared_steps_are_skipped() {
        let def = ProfileDef {
            name: "bare".into(),
            matches: vec!["bare".into()],
            refresh_rounds: None,
            activate_selectors: vec![],
            start_selectors: vec![],
            ad_selectors: vec![],
            refresh_selector: None,
        };
        let profile = ScriptedProfile::from_def(def);
        let mut session = MockSession::scripted(vec![]);

        assert_eq!(profile.activate(&mut session).await, StepResult::Skipped);
        assert_eq!(profile.attempt_start(&mut session).await, StepResult::Skipped);
        assert_eq!(profile.dismiss_ads(&mut session).await, StepResult::Skipped);
        // Fresh-visit profiles never refresh.
        assert_eq!(profile.refresh(&mut session).await, StepResult::Skipped);
        assert!(session.evaluated().is_empty());
    }

    #[tokio::test]
    async fn test_single_session_refresh_falls_back_to_reload() {
        let mut def = sample_def();
        def.refresh_selector = None;
        let profile = ScriptedProfile::from_def(def);
        let mut session = MockSession::scripted(vec![]);

        assert_eq!(profile.refresh(&mut session).await, StepResult::Completed);
        assert!(session.evaluated()[0].contains("location.reload()"));
    }

    #[test]
    fn test_load_registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"profiles": [{{"name": "sportsline", "matches": ["sportsline", "sports-line"], "refresh_rounds": 6}}]}}"#
        )
        .unwrap();

        let registry = load_registry(Some(file.path())).unwrap();
        assert!(
            registry
                .lookup("https://www.sportsline.example/live/5")
                .mode()
                .is_single_session()
        );
        assert!(
            registry
                .lookup("https://sports-line.example/")
                .mode()
                .is_single_session()
        );
        // Unmatched hosts fall back to passive capture.
        assert_eq!(
            registry.lookup("https://other.example/").mode(),
            ScanMode::FreshVisits
        );
    }

    #[test]
    fn test_load_registry_without_file_is_passive() {
        let registry = load_registry(None).unwrap();
        assert_eq!(
            registry.lookup("https://anything.example/").mode(),
            ScanMode::FreshVisits
        );
    }

    #[test]
    fn test_load_registry_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_registry(Some(file.path())).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_click_script_quotes_selectors() {
        let script = click_script(&[r#"button[title="play"]"#.to_string()]);
        assert!(script.contains(r#"button[title=\"play\"]"#));
    }
}
