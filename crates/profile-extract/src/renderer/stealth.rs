//! Anti-detection configuration applied to every launched browser.

use crate::config::BrowserSettings;

/// User agent presented by default (a current desktop Chrome on macOS).
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Runs before any page script on every new document.
pub const MASK_AUTOMATION_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
"#;

/// Command-line switches for a launch with `settings`.
///
/// The automation switches chromiumoxide adds by default are left out by the
/// launcher, so this list is the complete set.
pub fn launch_args(settings: &BrowserSettings) -> Vec<String> {
    vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--disable-background-networking".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--no-first-run".to_string(),
        "--log-level=3".to_string(),
        format!(
            "--window-size={},{}",
            settings.window_width, settings.window_height
        ),
        format!("--user-agent={}", settings.user_agent),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_carry_user_agent_and_window() {
        let settings = BrowserSettings {
            user_agent: "TestAgent/1.0".into(),
            window_width: 1280,
            window_height: 720,
            ..BrowserSettings::default()
        };
        let args = launch_args(&settings);
        assert!(args.contains(&"--user-agent=TestAgent/1.0".to_string()));
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args
            .iter()
            .any(|a| a == "--disable-blink-features=AutomationControlled"));
        assert!(!args.iter().any(|a| a == "--enable-automation"));
    }

    #[test]
    fn test_mask_script_hides_webdriver() {
        assert!(MASK_AUTOMATION_SCRIPT.contains("navigator, 'webdriver'"));
    }
}
