//! Chromium-based renderer using chromiumoxide.
//!
//! Every session is its own browser process with a throwaway profile
//! directory, so cookies and storage never leak between tasks.

use super::{
    stealth, ElementRef, Locator, NavigationResult, RenderContext, SessionLauncher, ValueSource,
};
use crate::config::BrowserSettings;
use crate::types::AuthCredential;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Page-global array holding every node handed out as an [`ElementRef`].
const REFS: &str = "(window.__profileExtractRefs = window.__profileExtractRefs || [])";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. CHROMIUM_PATH env
    if let Ok(p) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.cache/profile-extract/chromium/
    if let Some(cache) = dirs::cache_dir() {
        let root = cache.join("profile-extract/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless (or headful) Chromium per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn RenderContext>> {
        let chrome_path = settings
            .chrome_path
            .clone()
            .or_else(find_chromium)
            .context("Chromium not found. Set CHROMIUM_PATH or install Google Chrome.")?;

        let profile_dir =
            std::env::temp_dir().join(format!("profile-extract-{}", uuid::Uuid::new_v4()));

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&profile_dir)
            .disable_default_args()
            .window_size(settings.window_width, settings.window_height);
        for arg in stealth::launch_args(settings) {
            builder = builder.arg(arg);
        }
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("chromium handler event error: {e}");
                }
            }
        });

        let page = match prepare_page(&browser, settings).await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                handler.abort();
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(e);
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler,
            profile_dir,
        }))
    }
}

async fn prepare_page(browser: &Browser, settings: &BrowserSettings) -> Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("failed to create new page")?;
    page.set_user_agent(SetUserAgentOverrideParams::new(settings.user_agent.clone()))
        .await
        .context("failed to override user agent")?;
    page.evaluate_on_new_document(stealth::MASK_AUTOMATION_SCRIPT)
        .await
        .context("failed to register automation mask")?;
    Ok(page)
}

/// A single browser process and its page.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl ChromiumSession {
    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        // `null` and `undefined` arrive without a value.
        let value = result.value().cloned().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).context("failed to convert JS result")
    }
}

fn scope_expr(scope: Option<ElementRef>) -> String {
    match scope {
        Some(ElementRef(index)) => format!("{REFS}[{index}]"),
        None => "document".to_string(),
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl RenderContext for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout:?}"),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn page_text(&self) -> Result<String> {
        let text: Option<String> = self
            .eval("document.body ? document.body.innerText : ''")
            .await?;
        Ok(text.unwrap_or_default())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.eval(script).await
    }

    async fn set_cookie(&self, credential: &AuthCredential) -> Result<()> {
        let mut builder = CookieParam::builder()
            .name(credential.cookie_name.clone())
            .value(credential.token.clone())
            .domain(credential.cookie_domain.clone())
            .path(credential.path.clone())
            .secure(credential.secure)
            .http_only(credential.http_only);
        match credential.expires_at() {
            Some(expires) => builder = builder.expires(TimeSinceEpoch::new(expires)),
            None => tracing::warn!(
                "cookie expiry {:?} is not a timestamp, installing a session cookie",
                credential.expiry
            ),
        }
        let cookie = builder
            .build()
            .map_err(|e| anyhow!("invalid cookie parameters: {e}"))?;
        self.page
            .set_cookie(cookie)
            .await
            .context("failed to set cookie")?;
        Ok(())
    }

    async fn find_all(
        &self,
        scope: Option<ElementRef>,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>> {
        let (kind, expr) = match locator {
            Locator::XPath(expr) => ("xpath", expr),
            Locator::Css(expr) => ("css", expr),
        };
        let script = format!(
            r#"(() => {{
  const refs = {REFS};
  const scope = {scope};
  if (!scope) return [];
  const expr = {expr};
  let nodes = [];
  if ({kind} === 'xpath') {{
    const snap = document.evaluate(expr, scope, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    for (let i = 0; i < snap.snapshotLength; i++) nodes.push(snap.snapshotItem(i));
  }} else {{
    nodes = Array.from(scope.querySelectorAll(expr));
  }}
  return nodes.map((node) => refs.push(node) - 1);
}})()"#,
            scope = scope_expr(scope),
            expr = js_string(expr),
            kind = js_string(kind),
        );
        let indices: Vec<u64> = self
            .eval(&script)
            .await
            .with_context(|| format!("lookup failed for {locator}"))?;
        Ok(indices.into_iter().map(ElementRef).collect())
    }

    async fn read(&self, element: ElementRef, source: &ValueSource) -> Result<Option<String>> {
        let attribute = match source {
            ValueSource::Text => "null".to_string(),
            ValueSource::Attribute(name) => js_string(name),
        };
        let script = format!(
            r#"(() => {{
  const el = {node};
  if (!el) return null;
  const name = {attribute};
  const value = name === null ? (el.innerText ?? el.textContent) : (el[name] ?? el.getAttribute(name));
  return value == null ? null : String(value);
}})()"#,
            node = scope_expr(Some(element)),
        );
        self.eval(&script).await
    }

    async fn scroll_into_view(&self, element: ElementRef) -> Result<bool> {
        let script = format!(
            r#"(() => {{
  const el = {node};
  if (!el) return false;
  const style = window.getComputedStyle(el);
  const visible = el.getClientRects().length > 0 && style.visibility !== 'hidden' && style.display !== 'none';
  if (!visible || el.disabled) return false;
  el.scrollIntoView(true);
  return true;
}})()"#,
            node = scope_expr(Some(element)),
        );
        self.eval(&script).await
    }

    async fn click(&self, element: ElementRef) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {node}; if (el) el.click(); return null; }})()",
            node = scope_expr(Some(element)),
        );
        let _: serde_json::Value = self.eval(&script).await?;
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64> {
        let height: f64 = self.eval("document.body.scrollHeight").await?;
        Ok(height.max(0.0) as u64)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        let _: serde_json::Value = self
            .eval("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler,
            profile_dir,
        } = *self;

        let _ = page.close().await;
        let closed = browser.close().await.map(|_| ());
        let _ = browser.wait().await;
        handler.abort();
        let _ = tokio::fs::remove_dir_all(&profile_dir).await;

        closed.context("failed to close browser")
    }
}
