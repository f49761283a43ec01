//! Markless Preview - inline image previews for markdown files.
//!
//! Loads a document into an editor buffer, lets the previewer settle, and
//! prints the resulting blocks with preview lines shown as
//! `[image: <locator>]`.
//!
//! # Usage
//!
//! ```bash
//! markless-preview README.md
//! markless-preview --watch README.md
//! markless-preview --no-images README.md
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use markless_preview::config::{
    ConfigFlags, PreviewConfig, clear_config_flags, global_config_path, load_config_flags,
    local_override_path, parse_flag_tokens, save_config_flags,
};
use markless_preview::editor::{BlockBuffer, EditorBuffer, block_ids};
use markless_preview::perf;
use markless_preview::preview::{
    DownloadCoordinator, FileUrlFetcher, PreviewController, bound_locator, is_preview_block,
};
use markless_preview::watcher::DocumentWatcher;

/// Upper bound on how long one settle waits for outstanding downloads.
const SETTLE_LIMIT: Duration = Duration::from_secs(30);
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Inline image previews for markdown files
#[derive(Parser, Debug)]
#[command(name = "markless-preview", version, about, long_about = None)]
struct Cli {
    /// Markdown file to preview
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Watch file for changes and re-print after each reload
    #[arg(short, long)]
    watch: bool,

    /// Turn the global "preview images" switch off
    #[arg(long)]
    no_images: bool,

    /// Quiet interval after an edit before previews are reconciled
    #[arg(long, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// Enable timing logs
    #[arg(long)]
    perf: bool,

    /// Write detailed preview debug events to a file
    #[arg(long, value_name = "PATH")]
    debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

/// Poll the controller until no pass or download is outstanding.
fn settle(controller: &mut PreviewController, buffer: &mut EditorBuffer) {
    let _scope = perf::scope("settle");
    let deadline = Instant::now() + SETTLE_LIMIT;
    loop {
        let now = Instant::now();
        let changes = buffer.take_changes();
        controller.poll(buffer, changes, now);
        // Engine edits show up as fresh changes and schedule a follow-up pass.
        for change in buffer.take_changes() {
            controller.handle_content_change(change, now);
        }
        if !controller.is_busy() {
            return;
        }
        if now >= deadline {
            tracing::warn!(
                outstanding = ?controller.downloads().requested(),
                "gave up waiting for downloads"
            );
            return;
        }
        let wait = controller
            .timer()
            .remaining(now)
            .map_or(IDLE_POLL, |left| left.min(IDLE_POLL))
            .max(Duration::from_millis(1));
        std::thread::sleep(wait);
    }
}

fn render(buffer: &EditorBuffer, out: &mut impl Write) -> std::io::Result<()> {
    for block in block_ids(buffer) {
        if is_preview_block(buffer, block) {
            match bound_locator(buffer, block) {
                Some(locator) => writeln!(out, "[image: {locator}]")?,
                None => writeln!(out, "[image]")?,
            }
        } else {
            writeln!(out, "{}", buffer.block_text(block).unwrap_or_default())?;
        }
    }
    out.flush()
}

fn load_buffer(path: &Path) -> Result<EditorBuffer> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(EditorBuffer::from_text(&text))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    let debug_log_path = effective
        .debug_log
        .clone()
        .or_else(|| std::env::var_os("MARKLESS_PREVIEW_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_debug_log_path(debug_log_path.as_deref()) {
        tracing::warn!(
            path = ?debug_log_path,
            %err,
            "failed to initialize debug log"
        );
    }

    if !cli.file.exists() {
        anyhow::bail!("File not found: {}", cli.file.display());
    }

    let config = PreviewConfig::from_flags(&effective, &cli.file);
    let debounce = config.debounce;
    let mut buffer = load_buffer(&cli.file)?;
    let mut controller =
        PreviewController::new(config, DownloadCoordinator::new(Arc::new(FileUrlFetcher)));
    controller.enable(Instant::now());

    let stdout = std::io::stdout();
    settle(&mut controller, &mut buffer);
    render(&buffer, &mut stdout.lock()).context("Failed to write output")?;

    if !effective.watch {
        return Ok(());
    }

    let mut watcher =
        DocumentWatcher::new(&cli.file, debounce).context("Failed to watch document")?;
    loop {
        if watcher
            .reload_if_changed(&mut buffer)
            .with_context(|| format!("Failed to reload {}", watcher.target_path().display()))?
        {
            settle(&mut controller, &mut buffer);
            let mut out = stdout.lock();
            writeln!(out, "----").context("Failed to write output")?;
            render(&buffer, &mut out).context("Failed to write output")?;
        }
        std::thread::sleep(IDLE_POLL);
    }
}
