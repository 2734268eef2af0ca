//! End-to-end extraction tests against the scripted renderer.
//!
//! Covers the happy paths for both record kinds, every failure kind, the
//! release invariant and the concurrency bound.

use std::sync::Arc;
use std::time::Duration;

use profile_extract::renderer::scripted::{NodeSpec, ScriptedLauncher, ScriptedPage};
use profile_extract::*;

// ─────────────────────── helpers ───────────────────────

const JANE: &str = "https://www.linkedin.com/in/jane-doe/";
const ACME: &str = "https://www.linkedin.com/company/acme/";

fn credential() -> AuthCredential {
    AuthCredential::session_cookie("test-token", "1767225600")
}

/// Expression of strategy `rank` in a chain.
fn expr(chain: &SelectorChain, rank: usize) -> String {
    chain.strategies[rank].locator.expression().to_string()
}

fn orchestrator(
    config: ExtractorConfig,
    launcher: &Arc<ScriptedLauncher>,
) -> ExtractionOrchestrator {
    ExtractionOrchestrator::new(config, credential(), launcher.clone())
}

/// Page with a name matched by the first name strategy.
fn named_profile(catalog: &SelectorCatalog) -> ScriptedPage {
    let page = ScriptedPage::new();
    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.person.name, 0)]).text("Jane Doe"),
    );
    page
}

fn item_chains(catalog: &SelectorCatalog, section: &str) -> (String, String, String) {
    match &catalog.sections.section(section).unwrap().layout {
        profile_extract::selectors::catalog::SectionLayout::Items {
            title,
            subtitle,
            date_range,
        } => (expr(title, 0), expr(subtitle, 0), expr(date_range, 0)),
        _ => panic!("{section} is not an item section"),
    }
}

/// Add an Experience section; each item lists which fields it carries.
fn add_experience(
    page: &ScriptedPage,
    catalog: &SelectorCatalog,
    items: &[(Option<&str>, Option<&str>, Option<&str>)],
) {
    let container = catalog.sections.containers_for("Experience")[1].expression().to_string();
    let item_expr = catalog.sections.item.expression().to_string();
    let (title, subtitle, date) = item_chains(catalog, "Experience");

    let section = page.add_node(None, NodeSpec::new(&[&container]));
    for (t, s, d) in items {
        let item = page.add_node(Some(section), NodeSpec::new(&[&item_expr]));
        if let Some(t) = t {
            page.add_node(Some(item), NodeSpec::new(&[&title]).text(*t));
        }
        if let Some(s) = s {
            page.add_node(Some(item), NodeSpec::new(&[&subtitle]).text(*s));
        }
        if let Some(d) = d {
            page.add_node(Some(item), NodeSpec::new(&[&date]).text(*d));
        }
    }
}

fn assert_released(orch: &ExtractionOrchestrator, launcher: &ScriptedLauncher) {
    let stats = launcher.stats();
    assert_eq!(stats.live(), 0, "session left open");
    assert_eq!(stats.closed(), stats.launched(), "session closed more or less than once");
    assert_eq!(orch.gate().available(), orch.gate().capacity(), "gate slot not returned");
}

fn failure(result: &ExtractionResult) -> (FailureKind, String) {
    match result {
        ExtractionResult::Failure { kind, message } => (*kind, message.clone()),
        other => panic!("expected a failure, got {other:?}"),
    }
}

// ─────────────────────── person profiles ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_01_name_from_first_strategy_short_circuits() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)));
    let name_chain = config.catalog.person.name.clone();
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let profile = result.as_profile().expect("profile record");
    assert_eq!(profile.name, "Jane Doe");
    assert_eq!(profile.id, "jane-doe");

    let page = &launcher.pages()[0];
    assert_eq!(page.lookups_for(&expr(&name_chain, 0)), 1);
    for rank in 1..5 {
        assert_eq!(page.lookups_for(&expr(&name_chain, rank)), 0, "strategy {rank} ran");
    }
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_02_full_profile() {
    let config = ExtractorConfig::default();
    let catalog = config.catalog.clone();
    let page = named_profile(&catalog);

    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.person.avatar, 0)])
            .attr("src", "https://media.example/logo.png"),
    );
    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.person.avatar, 1)])
            .attr("src", "https://media.example/profile-displayphoto.jpg"),
    );
    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.person.headline, 0)]).text("Staff Engineer at Acme"),
    );
    let about = page.add_node(None, NodeSpec::new(&["//div[@id='about']/ancestor::section"]));
    let bio = "Building reliable data infrastructure for a decade, mostly in Rust and Go.";
    page.add_node(Some(about), NodeSpec::new(&[".//span[@aria-hidden='true']"]).text(bio));
    add_experience(
        &page,
        &catalog,
        &[(Some("Staff Engineer"), Some("Acme"), Some("2021 - Present"))],
    );
    let more = page.add_node(None, NodeSpec::new(&[catalog.expander.expression()]));

    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);
    let result = orch.extract(&TargetRef::person("jane-doe")).await;

    let profile = result.as_profile().expect("profile record");
    assert_eq!(
        profile.avatar_url.as_deref(),
        Some("https://media.example/profile-displayphoto.jpg")
    );
    assert_eq!(profile.headline.as_deref(), Some("Staff Engineer at Acme"));
    assert_eq!(profile.about.as_deref(), Some(bio));
    assert_eq!(profile.experience.titles, vec!["Staff Engineer"]);
    assert!(profile.education.is_empty());

    let live = &launcher.pages()[0];
    assert_eq!(live.clicks(more), 1);
    assert_eq!(live.navigations(), vec!["https://www.linkedin.com", JANE]);
    assert_eq!(live.cookies().len(), 1);
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_03_optional_fields_absent() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let profile = result.as_profile().expect("profile record");
    assert_eq!(profile.avatar_url, None);
    assert_eq!(profile.headline, None);
    assert_eq!(profile.about, None);
    assert!(profile.experience.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_04_headline_from_script_fallback() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    page.set_script_result(serde_json::json!("Software Engineer @ Acme"));
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let profile = result.as_profile().expect("profile record");
    assert_eq!(profile.headline.as_deref(), Some("Software Engineer @ Acme"));
    // The avatar fallback rejects a value without "profile" in it.
    assert_eq!(profile.avatar_url, None);
}

#[tokio::test(start_paused = true)]
async fn test_05_missing_name_is_extraction_failure() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedPage::new()));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::Extraction);
    assert_eq!(message, "could not locate name");
    assert_released(&orch, &launcher);
}

// ─────────────────────── sections ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_06_aligned_section() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    add_experience(
        &page,
        &config.catalog,
        &[
            (Some("Engineer"), Some("Acme"), Some("2019 - 2021")),
            (Some("Senior Engineer"), Some("Globex"), Some("2021 - 2023")),
            (Some("Staff Engineer"), Some("Initech"), Some("2023 - Present")),
        ],
    );
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let experience = &result.as_profile().expect("profile record").experience;
    assert_eq!(experience.titles.len(), 3);
    assert_eq!(experience.subtitles.len(), 3);
    assert_eq!(experience.date_ranges.len(), 3);
    assert_eq!(experience.subtitles, vec!["Acme", "Globex", "Initech"]);
}

#[tokio::test(start_paused = true)]
async fn test_07_item_without_subtitle_or_date() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    add_experience(
        &page,
        &config.catalog,
        &[
            (Some("Founder"), None, None),
            (Some("Engineer"), Some("Acme"), Some("2019 - 2021")),
        ],
    );
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let experience = &result.as_profile().expect("profile record").experience;
    assert_eq!(experience.titles, vec!["Founder", "Engineer"]);
    assert_eq!(experience.subtitles, vec!["Acme"]);
    assert_eq!(experience.date_ranges, vec!["2019 - 2021"]);
    assert_eq!(experience.titles.len(), experience.subtitles.len() + 1);
}

// ─────────────────────── guard walls ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_08_login_wall_blocks_extraction() {
    let config = ExtractorConfig::default();
    let catalog = config.catalog.clone();
    let page = named_profile(&catalog);
    page.add_node(None, NodeSpec::new(&[".sign-in-prompt"]));
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, _) = failure(&result);
    assert_eq!(kind, FailureKind::GuardBlocked(GuardState::LoginRequired));

    let live = &launcher.pages()[0];
    let markers: Vec<String> = catalog
        .guard
        .login_markers
        .iter()
        .map(|m| m.expression().to_string())
        .collect();
    for looked_up in live.looked_up() {
        assert!(markers.contains(&looked_up), "{looked_up} evaluated after the guard");
    }
    assert_eq!(live.script_calls(), 0);
    assert_eq!(live.scrolls(), 0);
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_09_not_found_redirect() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    page.redirect(JANE, "https://www.linkedin.com/404/");
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::GuardBlocked(GuardState::NotFound));
    assert_eq!(message, "page is not accessible: not found");
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_10_unavailable_organization() {
    let config = ExtractorConfig::default();
    let page = ScriptedPage::new();
    page.redirect(ACME, "https://www.linkedin.com/company/unavailable/");
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::organization("acme")).await;
    let (kind, _) = failure(&result);
    assert_eq!(kind, FailureKind::GuardBlocked(GuardState::Unavailable));
}

#[tokio::test(start_paused = true)]
async fn test_11_slug_resembling_guard_path_is_accessible() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("loginov-ivan")).await;
    let profile = result.as_profile().expect("profile extracted");
    assert_eq!(profile.id, "loginov-ivan");
    assert_eq!(profile.name, "Jane Doe");
    assert_eq!(
        launcher.pages()[0].navigations().last().map(String::as_str),
        Some("https://www.linkedin.com/in/loginov-ivan/")
    );
}

// ─────────────────────── organizations ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_12_organization_record() {
    let config = ExtractorConfig::default();
    let catalog = config.catalog.clone();
    let page = ScriptedPage::new();
    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.organization.name, 1)]).text("Acme Corp"),
    );
    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.organization.industry, 0)]).text("Software Development"),
    );
    page.add_node(
        None,
        NodeSpec::new(&[&expr(&catalog.organization.about, 1)]).text("Acme builds anvils."),
    );
    let expander = catalog
        .organization
        .about_expander
        .as_ref()
        .map(|l| l.expression().to_string())
        .unwrap();
    let see_more = page.add_node(None, NodeSpec::new(&[&expander]));

    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);
    let result = orch.extract(&TargetRef::organization("acme")).await;

    let org = result.as_organization().expect("organization record");
    assert_eq!(org.id, "acme");
    assert_eq!(org.name, "Acme Corp");
    assert_eq!(org.industry.as_deref(), Some("Software Development"));
    assert_eq!(org.about.as_deref(), Some("Acme builds anvils."));

    let live = &launcher.pages()[0];
    assert_eq!(live.clicks(see_more), 1);
    assert_eq!(live.navigations()[1], ACME);
}

#[tokio::test(start_paused = true)]
async fn test_13_organization_without_name_hints_at_token() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedPage::new()));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::organization("acme")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::Extraction);
    assert!(message.contains("session token"), "message was {message}");
}

// ─────────────────────── sessions and auth ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_14_session_creation_exhausted() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedPage::new()).fail_launches(u32::MAX));
    let orch = orchestrator(config, &launcher);

    let start = tokio::time::Instant::now();
    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::SessionCreation);
    assert!(message.contains("after 3 attempts"), "message was {message}");
    assert_eq!(launcher.stats().attempts(), 3);
    assert_eq!(launcher.stats().launched(), 0);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_15_transient_launch_failure_recovers() {
    let config = ExtractorConfig::default();
    let launcher =
        Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)).fail_launches(2));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    assert!(result.is_success());
    assert_eq!(launcher.stats().attempts(), 3);
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_16_cookie_failure_is_not_fatal() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    page.fail_cookie("rejected");
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    assert!(result.is_success());
    assert!(launcher.pages()[0].cookies().is_empty());
}

// ─────────────────────── release invariant ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_17_panic_mid_task_is_contained() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    page.panic_on_lookup(expr(&config.catalog.person.name, 0));
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::Unexpected);
    assert!(message.contains("content_loaded"), "message was {message}");
    assert!(message.contains("injected panic"), "message was {message}");
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_18_navigation_error_is_unexpected() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    page.fail_navigation("net::ERR_CONNECTION_RESET");
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::Unexpected);
    assert!(message.contains("ERR_CONNECTION_RESET"), "message was {message}");
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_19_hung_page_hits_deadline() {
    let mut config = ExtractorConfig::default();
    config.task_deadline = Duration::from_secs(60);
    let page = named_profile(&config.catalog);
    page.delay_navigation(Duration::from_secs(3600));
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let start = tokio::time::Instant::now();
    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::Timeout);
    assert!(message.contains("session_ready"), "message was {message}");
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_released(&orch, &launcher);
}

// ─────────────────────── concurrency ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_20_gate_bounds_live_sessions() {
    let config = ExtractorConfig::default();
    assert_eq!(config.concurrency_limit, 2);
    let page = named_profile(&config.catalog);
    page.delay_navigation(Duration::from_secs(5));
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let targets: Vec<TargetRef> = (0..5).map(|i| TargetRef::person(format!("user-{i}"))).collect();
    let results = orch.extract_many(&targets).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(ExtractionResult::is_success));
    let stats = launcher.stats();
    assert_eq!(stats.launched(), 5);
    assert_eq!(stats.peak_live(), 2);
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_21_results_keep_input_order() {
    let config = ExtractorConfig::default();
    let launcher = Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)));
    let orch = orchestrator(config, &launcher);

    let targets = vec![
        TargetRef::person("first"),
        TargetRef::organization("second"),
        TargetRef::person("third"),
    ];
    let results = orch.extract_many(&targets).await;
    assert_eq!(results[0].as_profile().map(|p| p.id.as_str()), Some("first"));
    // The profile page carries no organization name.
    assert_eq!(results[1].failure_kind(), Some(FailureKind::Extraction));
    assert_eq!(results[2].as_profile().map(|p| p.id.as_str()), Some("third"));
}

#[tokio::test(start_paused = true)]
async fn test_22_spawned_tasks_share_one_gate() {
    let mut config = ExtractorConfig::default();
    config.concurrency_limit = 3;
    let page = named_profile(&config.catalog);
    page.delay_navigation(Duration::from_secs(2));
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = Arc::new(orchestrator(config, &launcher));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.extract(&TargetRef::person(format!("p{i}"))).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    assert!(launcher.stats().peak_live() <= 3);
    assert_released(&orch, &launcher);
}

// ─────────────────────── session setup and teardown panics ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_23_launch_panic_is_contained() {
    let config = ExtractorConfig::default();
    let launcher =
        Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)).panic_on_launch());
    let orch = Arc::new(orchestrator(config, &launcher));

    let task = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.extract(&TargetRef::person("jane-doe")).await })
    };
    let result = task.await.expect("panic escaped the task");
    let (kind, message) = failure(&result);
    assert_eq!(kind, FailureKind::Unexpected);
    assert!(message.contains("slot_acquired"), "message was {message}");
    assert!(message.contains("injected panic on launch"), "message was {message}");
    assert_eq!(launcher.stats().launched(), 0);
    assert_released(&orch, &launcher);
}

#[tokio::test(start_paused = true)]
async fn test_24_launch_panic_keeps_sibling_results() {
    let config = ExtractorConfig::default();
    let launcher =
        Arc::new(ScriptedLauncher::new(named_profile(&config.catalog)).panic_on_launch());
    let orch = orchestrator(config, &launcher);

    let targets = vec![TargetRef::person("a"), TargetRef::organization("b")];
    let results = orch.extract_many(&targets).await;
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.failure_kind() == Some(FailureKind::Unexpected)));
    assert_eq!(orch.gate().available(), orch.gate().capacity());
}

#[tokio::test(start_paused = true)]
async fn test_25_close_panic_keeps_record_and_releases_slot() {
    let config = ExtractorConfig::default();
    let page = named_profile(&config.catalog);
    page.panic_on_close();
    let launcher = Arc::new(ScriptedLauncher::new(page));
    let orch = orchestrator(config, &launcher);

    let result = orch.extract(&TargetRef::person("jane-doe")).await;
    assert!(result.is_success(), "got {result:?}");
    assert_eq!(orch.gate().available(), orch.gate().capacity());
}
