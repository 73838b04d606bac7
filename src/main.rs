use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use outline_rail::config::{ActiveAnchor, ConfigOverrides, OutlineConfig, PopupMode};
use outline_rail::outline::surfaces::encode_fragment;
use outline_rail::outline::Indexer;
use outline_rail::page::Page;
use outline_rail::render::{load_highlighting, plain_render, render_markdown};
use outline_rail::viewer::{run_interactive, terminal_viewport, App, ViewerOptions};

const LOG_ENV: &str = "OUTLINE_RAIL_LOG";
const FALLBACK_TERMINAL: (u16, u16) = (80, 24);

#[derive(Debug, Parser)]
#[command(
    name = "outline-rail",
    version,
    about = "Markdown pager with a floating outline rail"
)]
struct Cli {
    /// Markdown file path. Use '-' to read from stdin.
    input: Option<String>,

    /// Force interactive pager mode.
    #[arg(short, long)]
    interactive: bool,

    /// Force plain stdout rendering.
    #[arg(long)]
    plain: bool,

    /// Print the indexed outline and exit.
    #[arg(long, conflicts_with_all = ["interactive", "plain"])]
    outline: bool,

    /// Reload when the file changes (file input only).
    #[arg(long)]
    watch: bool,

    /// Write logs to this file. Filter with OUTLINE_RAIL_LOG.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Deepest heading level listed (1-3).
    #[arg(long)]
    max_level: Option<i64>,

    /// Fewest headings before the outline shows (1-100).
    #[arg(long)]
    min_items: Option<i64>,

    /// Pixels kept above a heading after navigating to it.
    #[arg(long)]
    scroll_offset: Option<i64>,

    /// Lowest anchor offset in pixels.
    #[arg(long)]
    sticky_top: Option<i64>,

    /// Pixels added to the content top when computing the anchor.
    #[arg(long)]
    title_offset: Option<i64>,

    /// Title for headings whose text is empty.
    #[arg(long)]
    default_title: Option<String>,

    /// Where the active-heading focus line sits.
    #[arg(long, value_enum)]
    active_anchor: Option<ActiveAnchor>,

    /// Full-screen popup mode.
    #[arg(long, value_enum)]
    mobile_popup: Option<PopupMode>,

    /// Media query that turns on full-screen popup mode when auto.
    #[arg(long)]
    mobile_media_query: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_level: self.max_level,
            min_items: self.min_items,
            scroll_offset: self.scroll_offset,
            sticky_top: self.sticky_top,
            title_offset: self.title_offset,
            default_title: self.default_title.clone(),
            active_anchor: self.active_anchor,
            mobile_popup: self.mobile_popup,
            mobile_media_query: self.mobile_media_query.clone(),
        }
    }
}

#[derive(Clone)]
struct LoadResult {
    path: Option<PathBuf>,
    source: String,
}

enum InputSource {
    File(PathBuf),
    Stdin,
}

fn detect_input(cli: &Cli) -> Result<InputSource> {
    match cli.input.as_deref() {
        Some("-") => Ok(InputSource::Stdin),
        Some(path) => Ok(InputSource::File(PathBuf::from(path))),
        None => {
            if io::stdin().is_terminal() {
                Err(anyhow!(
                    "No input provided. Pass a markdown file or pipe markdown into stdin."
                ))
            } else {
                Ok(InputSource::Stdin)
            }
        }
    }
}

fn read_input(source: &InputSource) -> Result<LoadResult> {
    match source {
        InputSource::File(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(LoadResult {
                path: Some(path.clone()),
                source,
            })
        }
        InputSource::Stdin => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read markdown from stdin")?;
            Ok(LoadResult {
                path: None,
                source: buf,
            })
        }
    }
}

fn default_interactive(input: &InputSource) -> bool {
    matches!(input, InputSource::File(_)) && io::stdout().is_terminal()
}

/// File logging when `--log-file` is given, stderr otherwise. The interactive
/// pager owns the terminal, so without a file it logs nothing.
fn init_tracing(log_file: Option<&Path>, interactive: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| anyhow!("--log-file needs a file name: {}", path.display()))?;
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(false)
                    .with_ansi(false),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
        return Ok(Some(guard));
    }

    if !interactive {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
            .context("Failed to install log subscriber")?;
    }
    Ok(None)
}

fn print_outline(page: &Page, config: &OutlineConfig) -> String {
    let index = Indexer::from_config(config).index(page);
    let mut out = String::new();
    for entry in index.iter() {
        let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
        out.push_str(&format!(
            "{indent}{}  #{}\n",
            entry.title,
            encode_fragment(&entry.anchor_id)
        ));
    }
    if !index.is_usable() {
        out.push_str(&format!(
            "(outline hidden: {} of {} headings required)\n",
            index.len(),
            config.min_items
        ));
    }
    out
}

fn display_title(load: &LoadResult) -> String {
    load.path
        .as_deref()
        .and_then(Path::file_name)
        .map_or_else(|| "stdin".to_string(), |name| name.to_string_lossy().into_owned())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.interactive && cli.plain {
        return Err(anyhow!("--interactive and --plain cannot be used together"));
    }

    let input = detect_input(&cli)?;
    if cli.watch && matches!(input, InputSource::Stdin) {
        return Err(anyhow!("--watch requires file input"));
    }

    let interactive = if cli.interactive {
        true
    } else if cli.plain || cli.outline {
        false
    } else {
        default_interactive(&input)
    };

    let _log_guard = init_tracing(cli.log_file.as_deref(), interactive)?;

    let load = read_input(&input)?;
    let title = display_title(&load);
    let (syntax_set, theme) = load_highlighting();
    let page = render_markdown(&load.source, &title, &syntax_set, &theme);
    debug!(lines = page.lines.len(), "document rendered");

    let terminal_size = crossterm::terminal::size().unwrap_or(FALLBACK_TERMINAL);

    if cli.outline {
        let config = OutlineConfig::resolve(
            page.config_marker(),
            &cli.overrides(),
            &terminal_viewport(terminal_size),
        );
        print!("{}", print_outline(&page, &config));
        return Ok(());
    }

    if !interactive {
        print!("{}", plain_render(&page));
        return Ok(());
    }

    info!(title = %title, watch = cli.watch, "starting pager");
    let options = ViewerOptions {
        path: load.path.clone(),
        title,
        watch: cli.watch,
        overrides: cli.overrides(),
    };
    let app = App::new(options, page, syntax_set, theme, terminal_size);
    run_interactive(app)
}
