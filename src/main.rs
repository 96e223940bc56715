//! CLI entry point for `threadbook`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use threadbook::assemble::publish;
use threadbook::catalog::Catalog;
use threadbook::config::{self, Config};
use threadbook::model::content::{ContentItem, ItemKind};
use threadbook::normalize::{self, Normalizer};
use threadbook::store::curation::CurationStore;

/// Column width of item titles in `list`.
const TITLE_WIDTH: usize = 48;

#[derive(Parser)]
#[command(
    name = "threadbook",
    version,
    about = "Turn a mail export into a curated single-page chronicle"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides the standard search locations)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize an MBOX file or .eml directory into thread documents
    Normalize {
        /// Input to read instead of `[paths].mbox`
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,
    },
    /// Convert the notes XML export into the notes document
    Notes {
        /// XML export to read instead of `[paths].notes_xml`
        #[arg(value_name = "XML")]
        input: Option<PathBuf>,
    },
    /// List catalog items
    List {
        #[arg(long)]
        json: bool,
    },
    /// Append uncurated catalog items to the saved order
    Reconcile,
    /// Run the curator HTTP API
    Serve {
        /// Address to listen on instead of `[server].bind`
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Assemble the curated document into the output directory
    Assemble {
        /// Run the redaction pass on the assembled document
        #[arg(long)]
        redact: bool,
    },
    /// Redact an already assembled document in place
    Redact {
        /// File to redact instead of the published index
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Write a default configuration file
    Init {
        /// Destination (defaults to ./threadbook.toml)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Normalize { input } => {
            if let Some(input) = input {
                config.paths.mbox = input;
            }
            cmd_normalize(&config)
        }
        Commands::Notes { input } => {
            if let Some(input) = input {
                config.paths.notes_xml = input;
            }
            cmd_notes(&config)
        }
        Commands::List { json } => cmd_list(&config, json),
        Commands::Reconcile => cmd_reconcile(&config),
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            cmd_serve(&config)
        }
        Commands::Assemble { redact } => cmd_assemble(&config, redact),
        Commands::Redact { file } => {
            let path = file.unwrap_or_else(|| config.paths.output_html());
            cmd_redact(&path, &config)
        }
        Commands::Init { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(config::LOCAL_CONFIG_FILE));
            cmd_init(&path, force)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "threadbook.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "threadbook", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Normalize the mail export and print a summary.
fn cmd_normalize(config: &Config) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let input = &config.paths.mbox;
    if !input.exists() {
        anyhow::bail!("Input not found: {}", input.display());
    }

    let pb = ProgressBar::new(0);
    let template = if input.is_dir() {
        "{spinner:.green} Normalizing [{bar:40.cyan/blue}] {pos}/{len} files ({eta})"
    } else {
        "{spinner:.green} Normalizing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})"
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let stats = Normalizer::new(&config.paths).run(Some(&|current, total| {
        pb.set_length(total);
        pb.set_position(current);
    }))?;
    pb.finish_and_clear();

    let images_size = dir_size(&config.paths.images_dir());

    println!();
    println!("  {:<20} {}", "Input", input.display());
    println!("  {:<20} {}", "Messages", stats.messages);
    println!("  {:<20} {}", "Threads", stats.threads);
    println!(
        "  {:<20} {} new ({} in store)",
        "Images",
        stats.images_written,
        format_size(images_size, BINARY)
    );
    println!("  {:<20} {}", "Output", config.paths.content_dir.display());
    println!("  {:<20} {:.2?}", "Time", start.elapsed());
    println!();
    Ok(())
}

/// Convert the notes export.
fn cmd_notes(config: &Config) -> anyhow::Result<()> {
    let count = normalize::export_notes(&config.paths)?;
    println!(
        "Wrote {count} notes to {}",
        config.paths.notes_doc.display()
    );
    Ok(())
}

/// Print the catalog as a table or JSON.
fn cmd_list(config: &Config, json: bool) -> anyhow::Result<()> {
    let items = Catalog::from_config(&config.paths).list_items()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        print_items_table(&items);
    }
    Ok(())
}

fn print_items_table(items: &[ContentItem]) {
    if items.is_empty() {
        println!("No content items. Run `threadbook normalize` first.");
        return;
    }

    println!();
    println!(
        "  {}  {:<6} {:>8}  {}",
        pad_to_width("Title", TITLE_WIDTH),
        "Type",
        "Messages",
        "Reference"
    );
    for item in items {
        let kind = match item.kind {
            ItemKind::Thread => "thread",
            ItemKind::Note => "note",
        };
        println!(
            "  {}  {:<6} {:>8}  {}",
            pad_to_width(&item.title, TITLE_WIDTH),
            kind,
            item.messages,
            item.id
        );
    }
    let threads = items.iter().filter(|i| i.kind == ItemKind::Thread).count();
    println!();
    println!(
        "  {} items ({threads} threads, {} notes)",
        items.len(),
        items.len() - threads
    );
    println!();
}

/// Append uncurated items to the order document.
fn cmd_reconcile(config: &Config) -> anyhow::Result<()> {
    let items = Catalog::from_config(&config.paths).list_items()?;
    let state = CurationStore::from_config(&config.paths);
    let added = state.reconcile(&items)?;
    if added == 0 {
        println!("Order already covers all {} items", items.len());
    } else {
        println!(
            "Appended {added} items to {}",
            state.order_path().display()
        );
    }
    Ok(())
}

/// Run the curator API on a tokio runtime until interrupted.
fn cmd_serve(config: &Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start async runtime")?;
    runtime.block_on(threadbook::server::run_server(config))
}

/// Assemble and publish the curated document.
fn cmd_assemble(config: &Config, redact: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let report = publish::publish(config, redact)?;
    let size = std::fs::metadata(&report.index).map(|m| m.len()).unwrap_or(0);

    println!();
    println!("  {:<20} {}", "Document", report.index.display());
    println!("  {:<20} {}", "Size", format_size(size, BINARY));
    println!("  {:<20} {}", "Sections", report.sections);
    println!("  {:<20} {}", "Excluded entries", report.skipped_entries);
    println!("  {:<20} {}", "Hidden messages", report.hidden_messages);
    println!("  {:<20} {}", "Images", report.images_copied);
    if !report.missing.is_empty() {
        println!("  {:<20} {}", "Missing", report.missing.join(", "));
    }
    if redact {
        print_changes(&report.redactions);
    }
    println!();
    Ok(())
}

/// Redact a document in place.
fn cmd_redact(path: &Path, config: &Config) -> anyhow::Result<()> {
    let changes = publish::redact_file(path, config)?;
    println!("Redacted {}", path.display());
    print_changes(&changes);
    Ok(())
}

fn print_changes(changes: &[threadbook::redact::Change]) {
    if changes.is_empty() {
        println!("  No redactions applied");
        return;
    }
    println!("  Redactions:");
    for change in changes {
        println!("    {change}");
    }
}

/// Write the default configuration.
fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config::save_config(&Config::default(), path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Total size of the regular files directly inside `dir`.
fn dir_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

/// Truncate or pad `s` to exactly `width` display columns.
fn pad_to_width(s: &str, width: usize) -> String {
    let mut out = if UnicodeWidthStr::width(s) <= width {
        s.to_string()
    } else {
        let mut result = String::new();
        let mut current = 0;
        for ch in s.chars() {
            let w = UnicodeWidthChar::width(ch).unwrap_or(0);
            if current + w + 3 > width {
                break;
            }
            result.push(ch);
            current += w;
        }
        result.push_str("...");
        result
    };
    let used = UnicodeWidthStr::width(out.as_str());
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}
