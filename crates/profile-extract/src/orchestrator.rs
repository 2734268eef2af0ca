//! End-to-end extraction tasks.
//!
//! One task walks `Init → SlotAcquired → SessionReady → Authenticated →
//! Navigated → GuardEvaluated → ContentLoaded → FieldsExtracted → Released`.
//! Whatever happens in between (guard walls, missing fields, render errors,
//! deadline expiry, panics), the session is closed exactly once and then the
//! gate slot is returned.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tracing::Instrument;

use crate::config::ExtractorConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::gate::ConcurrencyGate;
use crate::guard::GuardDetector;
use crate::loader::PageLoader;
use crate::renderer::{RenderContext, SessionLauncher};
use crate::section::SectionParser;
use crate::session::{Session, SessionFactory};
use crate::types::{
    AuthCredential, ExtractionResult, GuardState, OrganizationRecord, ProfileRecord, SectionBag,
    TargetKind, TargetRef,
};

/// Progress markers of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStage {
    Init,
    SlotAcquired,
    SessionReady,
    Authenticated,
    Navigated,
    GuardEvaluated,
    ContentLoaded,
    FieldsExtracted,
    Released,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStage::Init => "init",
            TaskStage::SlotAcquired => "slot_acquired",
            TaskStage::SessionReady => "session_ready",
            TaskStage::Authenticated => "authenticated",
            TaskStage::Navigated => "navigated",
            TaskStage::GuardEvaluated => "guard_evaluated",
            TaskStage::ContentLoaded => "content_loaded",
            TaskStage::FieldsExtracted => "fields_extracted",
            TaskStage::Released => "released",
        };
        f.write_str(name)
    }
}

/// Last stage a task reached; readable after the task future is gone.
struct StageTracker(Mutex<TaskStage>);

impl StageTracker {
    fn new(stage: TaskStage) -> Self {
        Self(Mutex::new(stage))
    }

    fn advance(&self, stage: TaskStage) {
        tracing::debug!(%stage, "stage reached");
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }

    fn get(&self) -> TaskStage {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

const ABOUT: &str = "About";
const EXPERIENCE: &str = "Experience";
const EDUCATION: &str = "Education";

/// Runs extraction tasks under a shared concurrency gate.
pub struct ExtractionOrchestrator {
    config: ExtractorConfig,
    credential: AuthCredential,
    gate: ConcurrencyGate,
    factory: SessionFactory,
    loader: PageLoader,
    guard: GuardDetector,
}

impl ExtractionOrchestrator {
    pub fn new(
        config: ExtractorConfig,
        credential: AuthCredential,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Self {
        let gate = ConcurrencyGate::new(config.concurrency_limit);
        let factory = SessionFactory::new(launcher, config.browser.clone(), config.session.clone());
        let loader = PageLoader::new(config.loader.clone());
        let guard = GuardDetector::new(config.catalog.guard.clone());
        Self {
            config,
            credential,
            gate,
            factory,
            loader,
            guard,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Run one task. Never panics and never returns early without
    /// releasing what it acquired.
    pub async fn extract(&self, target: &TargetRef) -> ExtractionResult {
        let span = tracing::info_span!("extract", kind = %target.kind, id = %target.id);
        async move {
            tracing::info!("extraction started");
            let started = tokio::time::Instant::now();

            let permit = self.gate.acquire().await;
            let stage = StageTracker::new(TaskStage::Init);
            stage.advance(TaskStage::SlotAcquired);
            let attempt = AssertUnwindSafe(self.run_with_session(target, &stage)).catch_unwind();
            let result = match attempt.await {
                Ok(result) => result,
                Err(payload) => ExtractError::Panicked {
                    stage: stage.get(),
                    message: panic_message(payload.as_ref()),
                }
                .into(),
            };
            self.gate.release(permit);
            tracing::debug!(stage = %TaskStage::Released, "stage reached");

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                ExtractionResult::Failure { kind, message } => {
                    tracing::error!(?kind, elapsed_ms, "extraction failed: {message}");
                }
                _ => tracing::info!(elapsed_ms, "extraction finished"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run every target concurrently; results keep the input order.
    pub async fn extract_many(&self, targets: &[TargetRef]) -> Vec<ExtractionResult> {
        futures::future::join_all(targets.iter().map(|target| self.extract(target))).await
    }

    /// Everything between slot acquisition and release. A panic while
    /// launching unwinds to [`Self::extract`]. Panics while the session is
    /// open are caught here so the session still gets closed, and a panic
    /// during close only costs the session.
    async fn run_with_session(
        &self,
        target: &TargetRef,
        stage: &StageTracker,
    ) -> ExtractionResult {
        let mut session = match self.factory.create_session().await {
            Ok(session) => session,
            Err(e) => return e.into(),
        };
        tracing::debug!(session = %session.id(), "session created");
        stage.advance(TaskStage::SessionReady);

        let deadline = self.config.task_deadline;
        let task = AssertUnwindSafe(self.run(&mut session, target, stage)).catch_unwind();
        let result = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(record))) => record,
            Ok(Ok(Err(e))) => e.into(),
            Ok(Err(payload)) => ExtractError::Panicked {
                stage: stage.get(),
                message: panic_message(payload.as_ref()),
            }
            .into(),
            Err(_) => ExtractError::Timeout {
                stage: stage.get(),
                after: deadline,
            }
            .into(),
        };

        match AssertUnwindSafe(session.close()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to close session cleanly: {e:#}"),
            Err(payload) => {
                tracing::warn!("session close panicked: {}", panic_message(payload.as_ref()))
            }
        }
        result
    }

    async fn run(
        &self,
        session: &mut Session,
        target: &TargetRef,
        stage: &StageTracker,
    ) -> ExtractResult<ExtractionResult> {
        let catalog = &self.config.catalog;

        self.factory
            .inject_auth(
                session,
                &self.credential,
                &catalog.site_root(),
                self.loader.settings().navigation_timeout,
            )
            .await;
        stage.advance(TaskStage::Authenticated);

        let url = target.url(&catalog.site);
        self.loader.navigate(session.context_mut(), &url).await?;
        self.loader.stabilize().await;
        stage.advance(TaskStage::Navigated);

        let state = self.guard.classify(session.context()).await;
        stage.advance(TaskStage::GuardEvaluated);
        if state != GuardState::Accessible {
            return Err(ExtractError::Guard(state));
        }

        let ctx = session.context();
        self.loader.load_content(ctx, &catalog.expander).await?;
        stage.advance(TaskStage::ContentLoaded);

        let record = match target.kind {
            TargetKind::Person => {
                ExtractionResult::Profile(self.extract_profile(ctx, &target.id).await?)
            }
            TargetKind::Organization => {
                ExtractionResult::Organization(self.extract_organization(ctx, &target.id).await?)
            }
        };
        stage.advance(TaskStage::FieldsExtracted);
        Ok(record)
    }

    async fn extract_profile(
        &self,
        ctx: &dyn RenderContext,
        id: &str,
    ) -> ExtractResult<ProfileRecord> {
        let person = &self.config.catalog.person;
        let name = person
            .name
            .extract(ctx, None)
            .await
            .ok_or(ExtractError::MissingField {
                field: "name",
                hint: None,
            })?;
        let avatar_url = person.avatar.extract(ctx, None).await;
        let headline = person.headline.extract(ctx, None).await;

        let sections = SectionParser::new(&self.config.catalog.sections);
        let about = sections
            .extract_section(ctx, ABOUT)
            .await
            .and_then(|bag| bag.titles.into_iter().next());
        let experience = sections
            .extract_section(ctx, EXPERIENCE)
            .await
            .unwrap_or_default();
        let education = sections
            .extract_section(ctx, EDUCATION)
            .await
            .unwrap_or_default();
        log_section(EXPERIENCE, &experience);
        log_section(EDUCATION, &education);

        Ok(ProfileRecord {
            id: id.to_string(),
            name,
            avatar_url,
            headline,
            about,
            education,
            experience,
        })
    }

    async fn extract_organization(
        &self,
        ctx: &dyn RenderContext,
        id: &str,
    ) -> ExtractResult<OrganizationRecord> {
        let organization = &self.config.catalog.organization;
        let name = organization
            .name
            .extract(ctx, None)
            .await
            .ok_or(ExtractError::MissingField {
                field: "organization name",
                hint: Some("the session token may be missing or expired"),
            })?;
        let industry = organization.industry.extract(ctx, None).await;

        if let Some(expander) = &organization.about_expander {
            self.expand_once(ctx, expander).await;
        }
        let about = organization.about.extract(ctx, None).await;

        Ok(OrganizationRecord {
            id: id.to_string(),
            name,
            industry,
            about,
        })
    }

    /// Click the first visible match of `expander`, if any.
    async fn expand_once(&self, ctx: &dyn RenderContext, expander: &crate::renderer::Locator) {
        let controls = ctx.find_all(None, expander).await.unwrap_or_default();
        for control in controls {
            if matches!(ctx.scroll_into_view(control).await, Ok(true)) {
                if let Err(e) = ctx.click(control).await {
                    tracing::debug!("about expander click failed: {e:#}");
                }
                return;
            }
        }
    }
}

fn log_section(name: &str, bag: &SectionBag) {
    tracing::debug!(
        section = name,
        titles = bag.titles.len(),
        subtitles = bag.subtitles.len(),
        date_ranges = bag.date_ranges.len(),
        "section extracted"
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
