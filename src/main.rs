//! biblionetka-meta CLI - look up book metadata and covers on biblioNETka.pl.

use anyhow::{Context, Result};
use biblionetka_meta::config::Config;
use biblionetka_meta::console::Console;
use biblionetka_meta::covers::MemoryCoverCache;
use biblionetka_meta::record::IDENTIFIER;
use biblionetka_meta::session::Session;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Book metadata and covers from biblioNETka.pl.
#[derive(Parser, Debug)]
#[command(name = "biblionetka-meta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use this config file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for a book and print the metadata found.
    Identify {
        #[command(flatten)]
        book: BookArgs,

        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Download cover images for a book.
    Covers {
        #[command(flatten)]
        book: BookArgs,

        /// Directory the images are written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Show the config file location and effective settings.
    Config,
}

#[derive(Args, Debug)]
struct BookArgs {
    /// Book title.
    #[arg(long, default_value = "")]
    title: String,

    /// Author name; repeat for several authors.
    #[arg(long = "author")]
    authors: Vec<String>,

    /// Known biblioNETka book id.
    #[arg(long)]
    id: Option<String>,
}

impl BookArgs {
    fn identifiers(&self) -> BTreeMap<String, String> {
        self.id
            .iter()
            .map(|id| (IDENTIFIER.to_string(), id.clone()))
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    biblionetka_meta::logging::init(cli.verbose)?;
    let console = Console::new();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if let Command::Config = cli.command {
        console.info(&format!("Config file: {}", config_path.display()));
        let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{rendered}");
        return Ok(());
    }

    let session = Session::new(config, Arc::new(MemoryCoverCache::new()))
        .context("Failed to create HTTP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, finishing current request");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Command::Identify { book, json } => identify(&session, &book, json, &cancel, &console).await,
        Command::Covers { book, out } => covers(&session, &book, &out, &cancel, &console).await,
        Command::Config => Ok(()),
    }
}

async fn identify(
    session: &Session,
    book: &BookArgs,
    json: bool,
    cancel: &CancellationToken,
    console: &Console,
) -> Result<()> {
    if !json {
        console.step(&format!("Searching for \"{}\"...", book.title));
    }

    let records = session
        .identify(&book.title, &book.authors, &book.identifiers(), cancel)
        .await;

    if json {
        let output = serde_json::to_string_pretty(&records).context("Failed to encode records")?;
        println!("{output}");
        return Ok(());
    }

    if records.is_empty() {
        console.warning("No matching books found");
        return Ok(());
    }

    console.success(&format!("Found {} record(s)", console.count(records.len())));
    for (index, record) in records.iter().enumerate() {
        console.record(index + 1, record);
    }
    Ok(())
}

async fn covers(
    session: &Session,
    book: &BookArgs,
    out: &Path,
    cancel: &CancellationToken,
    console: &Console,
) -> Result<()> {
    console.step(&format!("Looking for covers of \"{}\"...", book.title));

    let downloads = session
        .download_cover(&book.title, &book.authors, &book.identifiers(), cancel)
        .await;

    if downloads.is_empty() {
        console.warning("No covers downloaded");
        return Ok(());
    }

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let stem = book.id.clone().unwrap_or_else(|| file_stem(&book.title));
    let mut saved = 0;
    for (index, download) in downloads.into_iter().enumerate() {
        match download.result {
            Ok(bytes) => {
                let path = out.join(format!(
                    "{stem}-{}.{}",
                    index + 1,
                    image_extension(&download.url)
                ));
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                console.success(&format!("Saved {}", path.display()));
                saved += 1;
            }
            Err(e) => console.error(&format!("Cover {} failed: {}", download.url, e)),
        }
    }

    console.info(&format!("{} cover(s) saved", console.count(saved)));
    Ok(())
}

/// A filesystem-friendly name derived from a title.
fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "cover".to_string()
    } else {
        stem.to_string()
    }
}

/// Image extension taken from the URL path, `jpg` when there is none.
fn image_extension(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|url| {
            let path = url.path().to_string();
            Path::new(&path)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
        })
        .filter(|ext| ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string())
}
