//! CLI binary for declutter.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `DeclutterConfig` and reports results.

use anyhow::{Context, Result};
use clap::Parser;
use declutter::{
    print_pdf_file, DeclutterConfig, DeclutterProgressCallback, Declutterer, FetchSource,
    FetchStrategy, IdleSettings, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner whose message follows the pipeline stage; milestones are
/// printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl DeclutterProgressCallback for CliProgressCallback {
    fn on_fetch_start(&self, url: &str, force_render: bool) {
        self.bar
            .set_prefix(if force_render { "Rendering" } else { "Fetching" });
        self.bar.set_message(url.to_string());
    }

    fn on_fallback(&self, _url: &str, reason: &str) {
        self.bar.println(format!(
            "  {} fast fetch rejected: {}",
            yellow("↻"),
            dim(reason)
        ));
        self.bar.set_prefix("Rendering");
        self.bar.set_message("headless browser…");
    }

    fn on_fetch_complete(&self, _url: &str, source: FetchSource, html_len: usize) {
        self.bar.println(format!(
            "  {} fetched {}  {}",
            green("✓"),
            dim(&format!("{html_len} bytes")),
            dim(&format!("via {source}"))
        ));
        self.bar.set_prefix("Converting");
        self.bar.set_message("HTML → Markdown");
    }

    fn on_converted(&self, markdown_len: usize) {
        self.bar.println(format!(
            "  {} converted  {}",
            green("✓"),
            dim(&format!("{markdown_len} chars"))
        ));
    }

    fn on_llm_start(&self, input_len: usize) {
        self.bar.set_prefix("Decluttering");
        self.bar.set_message(format!("{input_len} chars to the LLM"));
    }

    fn on_llm_complete(&self, input_tokens: usize, output_tokens: usize) {
        self.bar.println(format!(
            "  {} decluttered  {}  {}",
            green("✓"),
            dim(&format!("{input_tokens} in / {output_tokens} out tokens")),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Declutter a page into ~/Documents/Decluttered/<site>/
  declutter https://example.com/blog/post

  # Scheme is optional
  declutter example.com/blog/post

  # Print to stdout instead of writing files
  declutter https://example.com/blog/post --stdout

  # Skip the LLM: converted Markdown only (no API key needed)
  declutter https://example.com/blog/post --raw --stdout

  # Always use the headless browser, with an explicit Chromium
  declutter --browser -b /usr/bin/chromium https://example.com/app

  # Use a specific model
  declutter --provider anthropic --model claude-sonnet-4-20250514 https://example.com

  # JSON output with stats
  declutter --json https://example.com > page.json

  # Several pages with one browser: type URLs, then `exit`
  declutter --repl --raw

  # Print an HTML file to an A4 PDF
  declutter --html-to-pdf page.html -o page.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  DECLUTTER_BROWSER_PATH  Chromium/Chrome executable for the rendered fallback
  DECLUTTER_DIR           Output directory (default: ~/Documents)
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Fetch a web page and declutter it into Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "declutter",
    version,
    about = "Fetch a web page and declutter it into Markdown",
    long_about = "Fetch a web page (plain HTTP, falling back to headless Chromium), convert it to \
Markdown with images, links and tables preserved, and strip navigation, banners and other page \
furniture with an LLM. Supports OpenAI, Anthropic, Google Gemini, Ollama and any provider \
edgequake-llm knows.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page URL. `https://` is assumed when no scheme is given.
    #[arg(required_unless_present_any = ["html_to_pdf", "repl"])]
    url: Option<String>,

    /// Read URLs from stdin, one per line, until `exit` or EOF. One browser
    /// is shared across all of them.
    #[arg(long, conflicts_with_all = ["url", "html_to_pdf"])]
    repl: bool,

    /// Output directory; files go to <DIR>/Decluttered/<site>/.
    #[arg(short = 'd', long = "dir", env = "DECLUTTER_DIR")]
    dir: Option<PathBuf>,

    /// Skip the fast HTTP fetch and always render in the headless browser.
    #[arg(long, env = "DECLUTTER_FORCE_BROWSER")]
    browser: bool,

    /// Chromium/Chrome executable (auto-detected if unset).
    #[arg(short = 'b', long = "browser-path", env = "DECLUTTER_BROWSER_PATH")]
    browser_path: Option<PathBuf>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Max LLM output tokens.
    #[arg(short = 't', long = "max-tokens", env = "DECLUTTER_MAX_TOKENS", default_value_t = 10_000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DECLUTTER_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries on LLM failure.
    #[arg(long, env = "DECLUTTER_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DECLUTTER_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Navigation and network-idle timeout in seconds.
    #[arg(long, env = "DECLUTTER_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Skip the LLM stage and keep the converted Markdown.
    #[arg(long, env = "DECLUTTER_RAW")]
    raw: bool,

    /// Print Markdown to stdout instead of writing files.
    #[arg(long)]
    stdout: bool,

    /// Print the full result (Markdown + stats) as JSON to stdout.
    #[arg(long)]
    json: bool,

    /// Print this HTML file to an A4 PDF (requires -o).
    #[arg(long, value_name = "HTML_FILE", requires = "output", conflicts_with = "url")]
    html_to_pdf: Option<PathBuf>,

    /// PDF output path for --html-to-pdf.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "DECLUTTER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DECLUTTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DECLUTTER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would fight with the spinner, so they are hidden while it runs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.repl;
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

    // ── HTML → PDF mode ──────────────────────────────────────────────────
    if let Some(ref html_path) = cli.html_to_pdf {
        let pdf_path = cli
            .output
            .clone()
            .context("--html-to-pdf needs an output path (-o)")?;
        let config = build_config(&cli, None).await?;
        let bytes = print_pdf_file(html_path, &pdf_path, &config)
            .await
            .context("PDF printing failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}  {}",
                green("✔"),
                bold(&pdf_path.display().to_string()),
                dim(&format!("{bytes} bytes"))
            );
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|p| p as Arc<dyn DeclutterProgressCallback>),
    )
    .await?;
    let mut declutterer = Declutterer::new(config);

    // ── REPL mode ────────────────────────────────────────────────────────
    if cli.repl {
        let stdin = BufReader::new(tokio::io::stdin());
        let done = repl(&mut declutterer, &cli, stdin).await;
        declutterer.close().await.ok();
        let done = done?;
        if !cli.quiet {
            eprintln!("{}", dim(&format!("{done} page(s) decluttered")));
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let url = cli.url.clone().context("a URL is required")?;
    let result = run_one(&mut declutterer, &cli, &url, progress.as_deref()).await;
    declutterer.close().await.ok();
    result
}

/// Read URLs line by line and run each through the same `Declutterer`, so
/// the browser is launched at most once. Stops at `exit`, `quit` or EOF.
/// A failed URL is reported and the loop continues. Returns the number of
/// pages that succeeded.
async fn repl<R>(declutterer: &mut Declutterer, cli: &Cli, input: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut done = 0;
    loop {
        if !cli.quiet {
            eprint!("{} ", cyan("declutter>"));
            io::stderr().flush().ok();
        }
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let url = line.trim();
        match url {
            "" => continue,
            "exit" | "quit" => break,
            _ => {}
        }
        match run_one(declutterer, cli, url, None).await {
            Ok(()) => done += 1,
            Err(e) => eprintln!("{} {url}: {e:#}", yellow("✗")),
        }
    }
    Ok(done)
}

/// Declutter one URL and report it the way the flags ask. The spinner, if
/// any, is cleared before anything is printed.
async fn run_one(
    declutterer: &mut Declutterer,
    cli: &Cli,
    url: &str,
    progress: Option<&CliProgressCallback>,
) -> Result<()> {
    let result = if cli.stdout || cli.json {
        declutterer.declutter(url).await.map(|out| (out, None))
    } else {
        let dir = cli.dir.clone().unwrap_or_else(default_dir);
        declutterer
            .declutter_to_dir(url, &dir)
            .await
            .map(|(out, files)| (out, Some(files)))
    };
    if let Some(p) = progress {
        p.finish();
    }
    let (output, files) = result.context("Declutter failed")?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if let Some(files) = files {
        if !cli.quiet {
            eprintln!(
                "{}  {}  →  {}",
                green("✔"),
                output.url,
                bold(&files.markdown.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        let s = &output.stats;
        if s.llm_ran() {
            eprintln!(
                "   {} via {}  ·  {} tokens in  /  {} tokens out  ·  {}ms",
                cyan(s.model.as_deref().unwrap_or("?")),
                output.source,
                dim(&s.input_tokens.to_string()),
                dim(&s.output_tokens.to_string()),
                s.total_duration_ms,
            );
        } else {
            eprintln!(
                "   raw Markdown via {}  ·  {}ms",
                output.source, s.total_duration_ms
            );
        }
    }

    Ok(())
}

/// `~/Documents`, or the working directory when no home is known.
fn default_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|h| PathBuf::from(h).join("Documents"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Map CLI args to `DeclutterConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DeclutterConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = DeclutterConfig::builder()
        .strategy(if cli.browser {
            FetchStrategy::ForceRender
        } else {
            FetchStrategy::FastPreferred
        })
        .navigation_timeout_secs(cli.timeout)
        .idle(IdleSettings {
            timeout_secs: cli.timeout,
            ..IdleSettings::default()
        })
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .skip_llm(cli.raw);

    if let Some(ref path) = cli.browser_path {
        builder = builder.browser_path(path);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
