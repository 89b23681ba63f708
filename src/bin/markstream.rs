//! CLI binary for markstream.
//!
//! A thin shim over the library crate: maps CLI flags to `ClientConfig`,
//! streams the live document to stdout, and reports status on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use markstream::config::DEFAULT_OUTPUT_NAME;
use markstream::output::{plain_text, write_markdown};
use markstream::{
    ClientConfig, ConversionObserver, ConversionRequest, HttpBackend, MarkstreamError,
    SessionOutcome, SessionSlot,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Terminal observer ────────────────────────────────────────────────────────

/// Prints each snapshot's new suffix to stdout and keeps a spinner with the
/// status line on stderr.
struct TerminalObserver {
    /// `None` when progress display is disabled.
    bar: Option<ProgressBar>,
    /// Stream text to stdout as it arrives.
    echo: bool,
    /// Bytes of the snapshot already written to stdout.
    printed: Mutex<usize>,
}

impl TerminalObserver {
    fn new(show_progress: bool, echo: bool) -> Arc<Self> {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new_spinner();
            let template = "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}";
            let style = ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.set_prefix("Preparing");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Arc::new(Self {
            bar,
            echo,
            printed: Mutex::new(0),
        })
    }

    fn write_suffix(&self, text: &str) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        let Some(suffix) = text.get(*printed..) else {
            return;
        };
        if suffix.is_empty() {
            return;
        }
        let write = || {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let _ = handle.write_all(suffix.as_bytes());
            let _ = handle.flush();
        };
        match &self.bar {
            Some(bar) => bar.suspend(write),
            None => write(),
        }
        *printed = text.len();
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ConversionObserver for TerminalObserver {
    fn on_progress(&self, percent: u8, status: &str) {
        if let Some(bar) = &self.bar {
            bar.set_prefix(format!("{percent:>3}%"));
            bar.set_message(status.to_string());
        }
    }

    fn on_snapshot(&self, text: &str) {
        if self.echo {
            self.write_suffix(text);
        }
    }

    fn on_complete(&self, text: &str) {
        self.finish();
        if self.echo && !text.ends_with('\n') {
            println!();
        }
    }

    fn on_error(&self, _message: &str) {
        self.finish();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stream a PDF conversion to the terminal
  markstream report.pdf

  # Convert a web page and save it
  markstream https://example.com/article -o article.md

  # Plain text instead of Markdown
  markstream --plain notes.docx

  # Store the backend API key, then convert
  markstream --api-key sk-... paper.pdf

  # Point at a different backend
  markstream --server http://localhost:5000 page.html

SUPPORTED INPUTS:
  .pdf  .doc  .docx  .html  .htm   or any http(s) URL

ENVIRONMENT VARIABLES:
  MARKSTREAM_SERVER        Backend base URL (default http://localhost:3333)
  MARKSTREAM_API_KEY       API key to store on the backend before converting
  RUST_LOG                 Override log filtering (tracing EnvFilter syntax)
"#;

/// Stream documents and URLs through a Markdown conversion backend.
#[derive(Parser, Debug)]
#[command(
    name = "markstream",
    version,
    about = "Stream documents and URLs through a Markdown conversion backend",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path or HTTP/HTTPS URL.
    #[arg(required_unless_present_any = ["check_api_key", "reset_api_key"])]
    input: Option<String>,

    /// Conversion backend base URL.
    #[arg(long, env = "MARKSTREAM_SERVER", default_value = markstream::config::DEFAULT_BASE_URL)]
    server: String,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, env = "MARKSTREAM_OUTPUT")]
    output: Option<PathBuf>,

    /// Write to ./converted-document.md.
    #[arg(long, conflicts_with = "output")]
    save: bool,

    /// Emit plain text instead of Markdown.
    #[arg(long, env = "MARKSTREAM_PLAIN")]
    plain: bool,

    /// Store this API key on the backend before converting.
    #[arg(long, env = "MARKSTREAM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Report whether the backend has an API key, then exit.
    #[arg(long)]
    check_api_key: bool,

    /// Remove the backend's stored API key, then exit.
    #[arg(long)]
    reset_api_key: bool,

    /// Fail when no data arrives for this many seconds (0 disables).
    #[arg(long, env = "MARKSTREAM_IDLE_TIMEOUT", default_value_t = 120)]
    idle_timeout: u64,

    /// Connection timeout in seconds.
    #[arg(long, env = "MARKSTREAM_CONNECT_TIMEOUT", default_value_t = 30)]
    connect_timeout: u64,

    /// Minimum milliseconds between live renders (0 renders every chunk).
    #[arg(long, env = "MARKSTREAM_RENDER_INTERVAL_MS", default_value_t = 16)]
    render_interval_ms: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "MARKSTREAM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MARKSTREAM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MARKSTREAM_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the status; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let backend = HttpBackend::new(&config).context("Failed to create HTTP client")?;

    // ── Credential commands ──────────────────────────────────────────────
    if cli.reset_api_key {
        backend
            .reset_api_key()
            .await
            .context("Failed to reset API key")?;
        if !cli.quiet {
            eprintln!("{} API key removed from {}", green("✔"), config.base_url);
        }
        return Ok(());
    }

    if cli.check_api_key {
        let has_key = backend
            .has_api_key()
            .await
            .context("Failed to query API key status")?;
        println!("{}", if has_key { "configured" } else { "missing" });
        return Ok(());
    }

    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("No input given");
    };

    // Validate before touching the network for anything else.
    let request = ConversionRequest::parse(input).context("Invalid input")?;

    if let Some(ref key) = cli.api_key {
        backend
            .save_api_key(key)
            .await
            .context("Failed to save API key")?;
    }
    if !backend
        .has_api_key()
        .await
        .context("Failed to query API key status")?
    {
        return Err(MarkstreamError::ApiKeyMissing.into());
    }

    // ── Run the session ──────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .or_else(|| cli.save.then(|| PathBuf::from(DEFAULT_OUTPUT_NAME)));
    let echo = output_path.is_none() && !cli.plain;
    let observer = TerminalObserver::new(show_progress, echo);

    let mut slot = SessionSlot::new();
    let mut session = slot.begin(request, &config, observer.clone());
    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = session.run(&backend).await;
    match &outcome {
        SessionOutcome::Failed { partial, .. } if !cli.quiet && !partial.is_empty() && !echo => {
            let note = format!(
                "({} bytes received before the failure were discarded)",
                partial.len()
            );
            eprintln!("{}", dim(&note));
        }
        SessionOutcome::Cancelled => observer.finish(),
        _ => {}
    }
    let markdown = into_document(outcome)?;

    let rendered = if cli.plain {
        plain_text(&markdown)
    } else {
        markdown
    };

    if let Some(path) = output_path {
        write_markdown(&path, &rendered)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} bytes  →  {}",
                green("✔"),
                rendered.len(),
                bold(&path.display().to_string())
            );
        }
    } else if !echo {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    } else if !cli.quiet {
        eprintln!("{} {}", green("✔"), dim(&format!("{} bytes", rendered.len())));
    }

    Ok(())
}

/// The finished document, or the error `main` hands back to anyhow for
/// reporting. Nothing is printed here.
fn into_document(outcome: SessionOutcome) -> Result<String> {
    match outcome {
        SessionOutcome::Completed(markdown) => Ok(markdown),
        SessionOutcome::Failed { error, .. } => {
            Err(MarkstreamError::from(error)).context("Conversion failed")
        }
        SessionOutcome::Cancelled => Err(MarkstreamError::Cancelled.into()),
    }
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let idle = (cli.idle_timeout > 0).then_some(cli.idle_timeout);
    ClientConfig::builder()
        .base_url(cli.server.clone())
        .connect_timeout_secs(cli.connect_timeout)
        .idle_timeout_secs(idle)
        .render_interval_ms(cli.render_interval_ms)
        .build()
        .context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use markstream::SessionError;

    #[test]
    fn failure_message_appears_once_in_the_report() {
        let outcome = SessionOutcome::Failed {
            error: SessionError::Stream {
                message: "boom".into(),
            },
            partial: "partial".into(),
        };
        let report = format!("{:#}", into_document(outcome).unwrap_err());
        assert_eq!(report, "Conversion failed: boom");
    }

    #[test]
    fn cancelled_is_an_error() {
        let err = into_document(SessionOutcome::Cancelled).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MarkstreamError>(),
            Some(MarkstreamError::Cancelled)
        ));
    }

    #[test]
    fn completed_passes_the_document_through() {
        let doc = into_document(SessionOutcome::Completed("# Hi".into())).unwrap();
        assert_eq!(doc, "# Hi");
    }
}
