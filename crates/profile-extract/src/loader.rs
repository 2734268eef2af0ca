//! Navigation and progressive content loading.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::LoaderSettings;
use crate::renderer::{Locator, NavigationResult, RenderContext};

/// How a progressive scroll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    /// Scrolls performed.
    pub iterations: u32,
    /// Whether the height stopped changing before the attempt limit.
    pub converged: bool,
}

/// Result of one expand pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandOutcome {
    pub found: usize,
    pub clicked: usize,
}

/// Drives a page from navigation to fully loaded content.
#[derive(Debug, Clone)]
pub struct PageLoader {
    settings: LoaderSettings,
}

impl PageLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub async fn navigate(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
    ) -> Result<NavigationResult> {
        let nav = ctx
            .navigate(url, self.settings.navigation_timeout)
            .await
            .with_context(|| format!("navigating to {url}"))?;
        tracing::debug!(final_url = %nav.final_url, load_time_ms = nav.load_time_ms, "navigated");
        Ok(nav)
    }

    /// Fixed wait for initial client-side rendering.
    pub async fn stabilize(&self) {
        tokio::time::sleep(self.settings.settle_delay).await;
    }

    /// Scroll to the bottom until the document height stops changing or
    /// `max_attempts` scrolls have been made.
    pub async fn progressive_scroll(
        &self,
        ctx: &dyn RenderContext,
        pause: Duration,
        max_attempts: u32,
    ) -> Result<ScrollOutcome> {
        let mut last = ctx.scroll_height().await.context("reading document height")?;
        for attempt in 1..=max_attempts {
            ctx.scroll_to_bottom().await.context("scrolling to bottom")?;
            tokio::time::sleep(pause).await;
            let height = ctx.scroll_height().await.context("reading document height")?;
            if height == last {
                tracing::debug!(attempt, height, "scroll converged");
                return Ok(ScrollOutcome {
                    iterations: attempt,
                    converged: true,
                });
            }
            last = height;
        }
        tracing::debug!(max_attempts, "scroll attempt limit reached");
        Ok(ScrollOutcome {
            iterations: max_attempts,
            converged: false,
        })
    }

    /// Click every visible, enabled control matched by `expander`.
    ///
    /// Controls are discovered once; anything revealed by a click is left
    /// alone. Individual click failures are skipped.
    pub async fn expand_truncated_content(
        &self,
        ctx: &dyn RenderContext,
        expander: &Locator,
    ) -> ExpandOutcome {
        let controls = match ctx.find_all(None, expander).await {
            Ok(controls) => controls,
            Err(e) => {
                tracing::warn!("expander lookup failed: {e:#}");
                return ExpandOutcome::default();
            }
        };

        let mut outcome = ExpandOutcome {
            found: controls.len(),
            clicked: 0,
        };
        for control in controls {
            match ctx.scroll_into_view(control).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::debug!("could not scroll to control: {e:#}");
                    continue;
                }
            }
            tokio::time::sleep(self.settings.expand_pre_click).await;
            if let Err(e) = ctx.click(control).await {
                tracing::debug!("click failed: {e:#}");
                continue;
            }
            outcome.clicked += 1;
            tokio::time::sleep(self.settings.expand_post_click).await;
        }
        tracing::debug!(found = outcome.found, clicked = outcome.clicked, "expanded content");
        outcome
    }

    /// Scroll, expand, then settle once more.
    pub async fn load_content(&self, ctx: &dyn RenderContext, expander: &Locator) -> Result<()> {
        self.progressive_scroll(
            ctx,
            self.settings.scroll_pause,
            self.settings.scroll_max_attempts,
        )
        .await?;
        self.expand_truncated_content(ctx, expander).await;
        tokio::time::sleep(self.settings.post_expand_settle).await;
        Ok(())
    }
}
