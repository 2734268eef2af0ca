//! Rendering sessions and their creation.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{BrowserSettings, SessionSettings};
use crate::error::ExtractError;
use crate::renderer::{RenderContext, SessionLauncher};
use crate::types::AuthCredential;

/// One live rendering engine, owned by exactly one task.
///
/// Dropping a session without calling [`Session::close`] leaks the browser
/// until its handler notices; callers must close it on every path.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    context: Box<dyn RenderContext>,
}

impl Session {
    pub fn new(context: Box<dyn RenderContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn context(&self) -> &dyn RenderContext {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> &mut dyn RenderContext {
        self.context.as_mut()
    }

    /// Close the session and release the browser.
    pub async fn close(self) -> Result<()> {
        tracing::debug!(session = %self.id, "closing session");
        self.context.close().await
    }
}

/// Creates sessions with a bounded retry loop.
#[derive(Clone)]
pub struct SessionFactory {
    launcher: Arc<dyn SessionLauncher>,
    browser: BrowserSettings,
    retry: SessionSettings,
}

impl SessionFactory {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        browser: BrowserSettings,
        retry: SessionSettings,
    ) -> Self {
        Self {
            launcher,
            browser,
            retry,
        }
    }

    /// Launch a session, retrying with a fixed delay between attempts.
    pub async fn create_session(&self) -> Result<Session, ExtractError> {
        let attempts = self.retry.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.launcher.launch(&self.browser).await {
                Ok(context) => {
                    let session = Session::new(context);
                    tracing::debug!(session = %session.id(), attempt, "session created");
                    return Ok(session);
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, "session creation failed: {e:#}");
                    last_error = format!("{e:#}");
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.retry_delay).await;
                    }
                }
            }
        }

        Err(ExtractError::SessionCreation {
            attempts,
            last_error,
        })
    }

    /// Visit `site_root` and set the session cookie.
    ///
    /// Never fails: a missing cookie surfaces later as a login wall. Returns
    /// whether the cookie was set.
    pub async fn inject_auth(
        &self,
        session: &mut Session,
        credential: &AuthCredential,
        site_root: &str,
        timeout: std::time::Duration,
    ) -> bool {
        if let Err(e) = session.context_mut().navigate(site_root, timeout).await {
            tracing::warn!("could not open {site_root} before setting cookie: {e:#}");
        }
        match session.context().set_cookie(credential).await {
            Ok(()) => {
                tracing::debug!(cookie = %credential.cookie_name, "session cookie set");
                true
            }
            Err(e) => {
                tracing::warn!("failed to set session cookie, continuing unauthenticated: {e:#}");
                false
            }
        }
    }
}
