use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventResponseReceived};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use streamscout_core::error::AppError;
use streamscout_core::session::{BrowserSession, SessionFactory};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);

/// Opens isolated Chromium tabs over the Chrome DevTools Protocol.
///
/// A single Chromium process is shared across all clones of this struct;
/// each [`SessionFactory::open`] call opens a fresh tab with its own
/// network-event listener, and the tab is closed when the session is.
#[derive(Clone)]
pub struct ChromiumFactory {
    browser: Arc<Browser>,
}

impl ChromiumFactory {
    /// Launches the shared Chromium process.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH` (or the
    /// default locations checked by `chromiumoxide`).
    pub async fn launch(headless: bool) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags (--headless, --disable-gpu, …).  We try to
        // locate the *real* binary buried inside the snap, falling back
        // to any other Chrome/Chromium the user may have installed.
        // This does NOT force any particular installation method.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        let config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .arg("--autoplay-policy=no-user-gesture-required")
            .arg("--mute-audio")
            .build()
            .map_err(|e| AppError::Config(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Session(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
        })
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via **snap**, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
    /// We look for the real binary inside the snap first, then fall back to
    /// well-known system paths.  If nothing is found we return `None` and let
    /// `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            // Snap (Ubuntu default)
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            // Flatpak
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            // Common apt / manual installs
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        // Also honour an explicit override via env var.
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn open(&self, filter_pattern: &str) -> Result<Box<dyn BrowserSession>, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::Session(format!("Failed to open tab: {e}")))?;

        page.execute(EnableParams::default())
            .await
            .map_err(|e| AppError::Session(format!("Failed to enable network events: {e}")))?;

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| AppError::Session(format!("Failed to attach network listener: {e}")))?;

        let buffer: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let pattern = filter_pattern.to_lowercase();

        // Buffer matching response URLs until the session drains them.
        let listener = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let url = event.response.url.clone();
                if streamscout_core::normalize_manifest_key(&url).ends_with(&pattern) {
                    tracing::debug!(%url, "Captured matching network response");
                    if let Ok(mut urls) = sink.lock() {
                        urls.push(url);
                    }
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            page,
            buffer,
            listener,
        }))
    }
}

/// One Chromium tab with a network-capture buffer attached.
pub struct ChromiumSession {
    page: Page,
    buffer: Arc<Mutex<Vec<String>>>,
    listener: tokio::task::JoinHandle<()>,
}

impl ChromiumSession {
    fn drain_buffer(&self) -> Vec<String> {
        match self.buffer.lock() {
            Ok(mut urls) => std::mem::take(&mut *urls),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), AppError> {
        let result = tokio::time::timeout(NAVIGATION_TIMEOUT, async {
            self.page
                .goto(url)
                .await
                .map_err(|e| AppError::Session(format!("Failed to navigate to {url}: {e}")))?;
            // A present <body> is the minimal signal that the page rendered.
            self.page
                .find_element("body")
                .await
                .map_err(|e| AppError::Session(format!("Page did not render body: {e}")))?;
            Ok::<(), AppError>(())
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(NAVIGATION_TIMEOUT.as_secs())),
        }
    }

    async fn events(&mut self) -> Result<Vec<String>, AppError> {
        Ok(self.drain_buffer())
    }

    async fn clear_events(&mut self) -> Result<(), AppError> {
        self.drain_buffer();
        Ok(())
    }

    async fn evaluate(&mut self, js: &str) -> Result<(), AppError> {
        self.page
            .evaluate(js)
            .await
            .map(|_| ())
            .map_err(|e| AppError::Session(format!("Script evaluation failed: {e}")))
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.listener.abort();
        // Close the tab to free browser resources.
        let _ = self.page.close().await;
        Ok(())
    }
}
