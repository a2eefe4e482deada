//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use markdownizer_fetch::{HttpBlockerProber, ReadabilityExtractor, ReqwestFetcher};
use markdownizer_reconcile::{
    EngineConfig, ReconcileRequest, ReconciliationEngine, ReconciliationResult, classify,
};
use markdownizer_shared::{
    AppConfig, CaptureRequest, init_config, load_config, load_config_from, redact_tokens,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Markdownizer: pick the best rendering of a page and save it as Markdown.
#[derive(Parser)]
#[command(
    name = "markdownizer",
    version,
    about = "Reconcile a browser capture with an independent fetch and emit clean Markdown.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.markdownizer/markdownizer.toml).
    #[arg(long, env = "MARKDOWNIZER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// What `reconcile` writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// The Markdown document only.
    Markdown,
    /// The full result: chosen candidate, Markdown and diagnostics.
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Reconcile a captured page and print the chosen Markdown.
    Reconcile {
        /// Capture payload (JSON). Use `-` for stdin.
        #[arg(long)]
        capture: PathBuf,

        /// Write output here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Output format.
        #[arg(short, long, default_value = "markdown")]
        format: OutputFormat,

        /// Never probe short server content for blockers.
        #[arg(long)]
        no_probe: bool,
    },

    /// Check whether two URLs name the same resource.
    Classify {
        /// The URL the user requested.
        original: String,
        /// Where the fetch landed.
        landed: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "markdownizer=info",
        1 => "markdownizer=debug",
        _ => "markdownizer=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Reconcile {
            capture,
            out,
            format,
            no_probe,
        } => {
            cmd_reconcile(
                &capture,
                out.as_deref(),
                format,
                no_probe,
                config_path.as_deref(),
            )
            .await
        }
        Command::Classify { original, landed } => cmd_classify(&original, &landed),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

async fn cmd_reconcile(
    capture: &Path,
    out: Option<&Path>,
    format: OutputFormat,
    no_probe: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if no_probe {
        config.probe.enabled = false;
    }

    let payload = read_capture(capture)?;
    let capture = CaptureRequest::from_json(&payload)?;
    let engine = build_engine(&config)?;

    let spinner = Spinner::new(format!("reconciling {}", redact_tokens(&capture.url)));
    let result = engine.reconcile(ReconcileRequest::from(&capture)).await;
    spinner.finish();
    let result = result?;

    info!(
        chosen = %result.chosen_source(),
        fast_accept = ?result.diagnostics.fast_accept,
        blocker = result.diagnostics.blocker_detected,
        content_hash = %result.diagnostics.content_hash,
        "reconciliation finished"
    );

    let rendered = render(&result, format)?;
    match out {
        Some(path) => {
            std::fs::write(path, &rendered)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} ({} capture chosen)",
                path.display(),
                result.chosen_source()
            );
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn cmd_classify(original: &str, landed: &str) -> Result<()> {
    let outcome = classify(original, landed);
    if outcome.is_redirect {
        println!(
            "redirect: {} -> {}",
            redact_tokens(&outcome.original_url),
            redact_tokens(&outcome.final_url)
        );
    } else {
        println!("same resource");
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Wire the HTTP collaborators into an engine.
fn build_engine(config: &AppConfig) -> Result<ReconciliationEngine> {
    let engine_config = EngineConfig::try_from(config)?;
    let fetcher = Arc::new(ReqwestFetcher::new(&config.fetch)?);
    let extractor = Arc::new(ReadabilityExtractor::new());

    let mut engine = ReconciliationEngine::new(engine_config, fetcher, extractor);
    if config.probe.enabled {
        let prober = HttpBlockerProber::new(&config.fetch, &config.probe)?;
        engine = engine.with_prober(Arc::new(prober));
    }
    Ok(engine)
}

fn read_capture(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read capture from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn render(result: &ReconciliationResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Markdown => result.markdown.clone(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(result)?;
            json.push('\n');
            json
        }
    })
}

/// Spinner on stderr while the engine works.
struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    fn new(message: String) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reconcile_flags() {
        let cli = Cli::try_parse_from([
            "markdownizer",
            "reconcile",
            "--capture",
            "page.json",
            "--format",
            "json",
            "--no-probe",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Reconcile {
                capture,
                out,
                format,
                no_probe,
            } => {
                assert_eq!(capture, PathBuf::from("page.json"));
                assert!(out.is_none());
                assert_eq!(format, OutputFormat::Json);
                assert!(no_probe);
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn reconcile_defaults_to_markdown() {
        let cli = Cli::try_parse_from(["markdownizer", "reconcile", "--capture", "-"]).unwrap();
        match cli.command {
            Command::Reconcile {
                format, no_probe, ..
            } => {
                assert_eq!(format, OutputFormat::Markdown);
                assert!(!no_probe);
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn reconcile_requires_capture() {
        assert!(Cli::try_parse_from(["markdownizer", "reconcile"]).is_err());
    }

    #[test]
    fn parses_classify() {
        let cli = Cli::try_parse_from([
            "markdownizer",
            "classify",
            "https://example.com/a",
            "https://example.com/login",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Classify { .. }));
    }

    #[test]
    fn engine_builds_from_defaults() {
        let mut config = AppConfig::default();
        assert!(build_engine(&config).is_ok());
        config.scoring.policy = "v0".into();
        assert!(build_engine(&config).is_err());
    }
}
