//! profile-extract — command-line harness for the extraction engine.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use profile_extract::renderer::chromium::ChromiumLauncher;
use profile_extract::{
    AuthCredential, ExtractionOrchestrator, ExtractorConfig, SelectorCatalog, TargetKind, TargetRef,
};

#[derive(Parser)]
#[command(
    name = "profile-extract",
    about = "Extract person and organization records from authenticated profile pages",
    version
)]
struct Cli {
    /// Show the browser window.
    #[arg(long, global = true)]
    headful: bool,

    /// Maximum number of live browser sessions.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Pretty-print results.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract person profiles by vanity id or profile URL.
    Person {
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Extract organization pages by id or company URL.
    Company {
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Extract from profile or company URLs, inferring the kind.
    Url {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Print the built-in selector catalog as JSON.
    Catalog,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   profile-extract completions bash > ~/.local/share/bash-completion/completions/profile-extract
    ///   profile-extract completions zsh > ~/.zfunc/_profile-extract
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Accept either a bare id or a URL of the expected kind.
fn resolve(kind: TargetKind, raw: &str) -> anyhow::Result<TargetRef> {
    if raw.contains("://") || raw.contains("linkedin.com/") {
        let target = TargetRef::parse_url(raw)
            .with_context(|| format!("not a recognised profile URL: {raw}"))?;
        if target.kind != kind {
            bail!("{raw} is a {} URL, expected {kind}", target.kind);
        }
        return Ok(target);
    }
    let id = raw.trim().trim_matches('/');
    if id.is_empty() {
        bail!("empty target id");
    }
    Ok(TargetRef::new(kind, id))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let targets = match &cli.command {
        Commands::Catalog => {
            print_json(&SelectorCatalog::default(), true)?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "profile-extract",
                &mut std::io::stdout(),
            );
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Person { targets } => targets
            .iter()
            .map(|t| resolve(TargetKind::Person, t))
            .collect::<anyhow::Result<Vec<_>>>()?,
        Commands::Company { targets } => targets
            .iter()
            .map(|t| resolve(TargetKind::Organization, t))
            .collect::<anyhow::Result<Vec<_>>>()?,
        Commands::Url { urls } => urls
            .iter()
            .map(|u| {
                TargetRef::parse_url(u)
                    .with_context(|| format!("not a recognised profile URL: {u}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?,
    };

    let mut config = ExtractorConfig::from_env()?;
    if cli.headful {
        config.browser.headless = false;
    }
    if let Some(limit) = cli.concurrency {
        config.concurrency_limit = limit;
    }
    config.validate()?;
    let credential = AuthCredential::from_env()?;

    tracing::info!(
        targets = targets.len(),
        concurrency = config.concurrency_limit,
        headless = config.browser.headless,
        "starting extraction run"
    );

    let orchestrator = ExtractionOrchestrator::new(config, credential, Arc::new(ChromiumLauncher));
    let results = orchestrator.extract_many(&targets).await;

    let failed = results.iter().filter(|r| !r.is_success()).count();
    for result in &results {
        print_json(result, cli.pretty)?;
    }
    if failed > 0 {
        tracing::warn!(failed, total = results.len(), "some extractions failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_id() {
        let target = resolve(TargetKind::Person, "jane-doe").unwrap();
        assert_eq!(target, TargetRef::person("jane-doe"));
    }

    #[test]
    fn test_resolve_url_checks_kind() {
        let target = resolve(
            TargetKind::Organization,
            "https://www.linkedin.com/company/acme/",
        )
        .unwrap();
        assert_eq!(target, TargetRef::organization("acme"));
        assert!(resolve(TargetKind::Person, "https://www.linkedin.com/company/acme/").is_err());
    }

    #[test]
    fn test_resolve_rejects_empty() {
        assert!(resolve(TargetKind::Person, " / ").is_err());
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "profile-extract",
            "person",
            "jane-doe",
            "--headful",
            "--concurrency",
            "3",
        ])
        .unwrap();
        assert!(cli.headful);
        assert_eq!(cli.concurrency, Some(3));
        assert!(matches!(
            cli.command,
            Commands::Person { ref targets } if targets == &["jane-doe"]
        ));
    }
}
