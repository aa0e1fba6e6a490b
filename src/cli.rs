//! CLI parsing and orchestration. Stages a WXR export for review, commits it into a book
//! directory, or does both at once. Maps errors to exit codes.

use crate::config::{self, Config, ImportConfig};
use crate::import::{self, ImportError, ImportReport, Importer};
use crate::model::{ImportSelection, PostStatus, PostType};
use crate::store::{BookDir, StoreError};
use crate::PoliteClient;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Import(#[from] ImportError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Import(ImportError::SelectionMismatch { .. }) => 1,
            CliRunError::Import(ImportError::Parse(_)) => 2,
            CliRunError::Import(ImportError::Store(_)) | CliRunError::Store(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "wxrbook")]
#[command(about = "Import a WordPress WXR export as a structured book")]
#[command(
    after_help = "Config file keys (user_agent, timeout_secs, request_delay_secs, default_status, media_base_url, supported_post_types, custom_post_types, taxonomies, post_meta_keys, multi_value_meta_keys, metadata_key_prefix) are read from ./wxrbook.toml or ~/.config/wxrbook/config.toml. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress progress and summary output (warnings and errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long, global = true)]
    pub verbose: bool,
}

impl Args {
    /// Default log filter when RUST_LOG is unset.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse an export, list what can be imported, and save the selection in the output directory.
    Stage {
        /// WXR export file.
        file: PathBuf,

        #[command(flatten)]
        out: OutArgs,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Import the selection saved by `stage`. The selection is removed afterwards.
    Commit {
        #[command(flatten)]
        out: OutArgs,

        #[command(flatten)]
        net: NetArgs,
    },

    /// Stage and commit in one step.
    Import {
        /// WXR export file.
        file: PathBuf,

        #[command(flatten)]
        out: OutArgs,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        net: NetArgs,
    },
}

#[derive(ClapArgs, Debug)]
pub struct OutArgs {
    /// Book directory (book.json, media/, staged selection). Created if missing.
    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(ClapArgs, Debug, Default)]
pub struct SelectionArgs {
    /// Import only these post ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Leave out these post ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Import a post as another type, e.g. --as 12=back-matter. Repeatable.
    #[arg(long = "as", value_name = "ID=TYPE", value_parser = parse_type_override)]
    pub type_overrides: Vec<(String, PostType)>,

    /// Status for created records (publish, draft, private, pending). Parts are always published.
    #[arg(long, value_parser = parse_status)]
    pub status: Option<PostStatus>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct NetArgs {
    /// HTTP User-Agent for image downloads (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between image requests in seconds (overrides config; default 0).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,
}

fn parse_type_override(s: &str) -> Result<(String, PostType), String> {
    let (id, post_type) = s.split_once('=').ok_or_else(|| {
        format!(
            "Invalid --as: expected 'ID=TYPE' (e.g. 12=chapter), got '{}'",
            s
        )
    })?;
    let id = id.trim();
    let post_type = post_type.trim();
    if id.is_empty() || post_type.is_empty() {
        return Err(format!(
            "Invalid --as: both id and type are required, got '{}'",
            s
        ));
    }
    Ok((id.to_string(), PostType::from(post_type)))
}

fn parse_status(s: &str) -> Result<PostStatus, String> {
    PostStatus::parse(s).ok_or_else(|| {
        format!(
            "Invalid status: '{}'. Use publish, draft, private, or pending.",
            s
        )
    })
}

/// CLI flag, then config, then draft.
fn effective_status(
    flag: Option<PostStatus>,
    config: &Config,
) -> Result<PostStatus, CliRunError> {
    if let Some(status) = flag {
        return Ok(status);
    }
    match config.default_status.as_deref() {
        Some(s) => parse_status(s)
            .map_err(|e| CliRunError::InvalidInput(format!("Invalid config: {}", e))),
        None => Ok(PostStatus::default()),
    }
}

/// Narrow a fresh selection with --only, --skip and --as.
fn apply_selection_args(
    selection: &mut ImportSelection,
    args: &SelectionArgs,
    status: PostStatus,
) -> Result<(), CliRunError> {
    let unknown: Vec<&str> = args
        .only
        .iter()
        .chain(&args.skip)
        .chain(args.type_overrides.iter().map(|(id, _)| id))
        .map(String::as_str)
        .filter(|id| !selection.is_staged(id))
        .collect();
    if !unknown.is_empty() {
        return Err(CliRunError::InvalidInput(format!(
            "Unknown or non-importable post id(s): {}",
            unknown.join(", ")
        )));
    }
    if !args.only.is_empty() {
        selection.select_only(args.only.iter().map(String::as_str));
    }
    selection.deselect(args.skip.iter().map(String::as_str));
    for (id, post_type) in &args.type_overrides {
        selection
            .type_overrides
            .insert(id.clone(), post_type.clone());
    }
    selection.default_status = status;
    Ok(())
}

fn build_client(net: &NetArgs, config: &Config) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder();
    if let Some(delay) = net.delay.or(config.request_delay_secs) {
        builder = builder.delay_secs(delay);
    }
    if let Some(timeout) = net.timeout.or(config.timeout_secs) {
        builder = builder.timeout_secs(timeout);
    }
    if let Some(ua) = net.user_agent.clone().or_else(|| config.user_agent.clone()) {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn stage_file(
    file: &Path,
    selection_args: &SelectionArgs,
    config: &Config,
    import_config: &ImportConfig,
) -> Result<ImportSelection, CliRunError> {
    if !file.is_file() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot read {}: no such file.",
            file.display()
        )));
    }
    let status = effective_status(selection_args.status, config)?;
    let mut selection = import::stage(file, import_config)?;
    apply_selection_args(&mut selection, selection_args, status)?;
    Ok(selection)
}

fn print_review(selection: &ImportSelection) {
    for post in &selection.staged {
        let mark = if selection.is_selected(&post.id) { 'x' } else { ' ' };
        let post_type = selection
            .effective_type(&post.id)
            .unwrap_or_else(|| post.post_type.clone());
        println!("[{}] {:>6}  {:<13} {}", mark, post.id, post_type, post.title);
    }
}

fn write_selection(path: &Path, selection: &ImportSelection) -> Result<(), CliRunError> {
    let f = std::fs::File::create(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::to_writer_pretty(f, selection).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn read_selection(path: &Path) -> Result<ImportSelection, CliRunError> {
    let f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CliRunError::InvalidInput(format!(
                "Nothing staged in {}. Run `wxrbook stage` first.",
                path.parent().unwrap_or(path).display()
            )))
        }
        Err(e) => {
            return Err(CliRunError::Store(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }))
        }
    };
    serde_json::from_reader(std::io::BufReader::new(f)).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Invalid staged selection {}: {}",
            path.display(),
            e
        ))
    })
}

fn commit_into(
    book: &mut BookDir,
    selection: ImportSelection,
    net: &NetArgs,
    config: &Config,
    import_config: &ImportConfig,
    quiet: bool,
) -> Result<ImportReport, CliRunError> {
    let mut client = build_client(net, config)?;
    let mut media = book.media(config.media_base_url.clone());

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Importing post {}/{}", n, total));
    };

    let mut importer = Importer::new(import_config, &mut book.store, &mut media, &mut client);
    if !quiet {
        importer = importer.with_progress(&progress_cb);
    }
    let result = importer.commit(selection);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let report = result?;
    book.save()?;
    Ok(report)
}

fn print_summary(report: &ImportReport, book: &BookDir) {
    println!("{}", report.totals);
    if !report.warnings.is_empty() {
        eprintln!(
            "{} warning(s), {} broken image(s). Broken images are marked with #fixme.",
            report.warnings.len(),
            report.broken_images()
        );
    }
    eprintln!("Wrote {}", book.book_path().display());
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config()
        .map_err(CliRunError::InvalidInput)?
        .unwrap_or_default();
    let import_config = ImportConfig::from_config(&config);

    match &args.command {
        Command::Stage {
            file,
            out,
            selection,
        } => {
            let selection = stage_file(file, selection, &config, &import_config)?;
            let book = BookDir::open(&out.out)?;
            write_selection(&book.selection_path(), &selection)?;
            if !args.quiet {
                print_review(&selection);
                eprintln!(
                    "Staged {} of {} post(s). Run `wxrbook commit --out {}` to import.",
                    selection.selected_ids.len(),
                    selection.staged.len(),
                    out.out.display()
                );
            }
        }
        Command::Commit { out, net } => {
            let mut book = BookDir::open(&out.out)?;
            let selection_path = book.selection_path();
            let selection = read_selection(&selection_path)?;
            let report = commit_into(&mut book, selection, net, &config, &import_config, args.quiet)?;
            std::fs::remove_file(&selection_path).map_err(|e| StoreError::Io {
                path: selection_path.clone(),
                source: e,
            })?;
            if !args.quiet {
                print_summary(&report, &book);
            }
        }
        Command::Import {
            file,
            out,
            selection,
            net,
        } => {
            let selection = stage_file(file, selection, &config, &import_config)?;
            let mut book = BookDir::open(&out.out)?;
            let report = commit_into(&mut book, selection, net, &config, &import_config, args.quiet)?;
            if !args.quiet {
                print_summary(&report, &book);
            }
        }
    }
    Ok(())
}
