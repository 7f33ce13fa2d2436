//! ossnav CLI - browse and transfer objects across storage accounts.
//!
//! Every command runs against one account from the configuration file,
//! either the default one or the one named with `--account`.

mod preview;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ossnav_common::{format_size, format_time, Object, TransferProgress};
use ossnav_storage::{
    create_default_registry, drive_transfer, load_config, should_show_progress, ListOptions,
    StorageProvider, TransferOutcome, TransferStream, DEFAULT_MAX_KEYS,
};

#[derive(Parser)]
#[command(name = "ossnav")]
#[command(about = "ossnav - Browse object storage and local buckets")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: ~/.config/ossnav/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Account to use instead of the configured default.
    #[arg(short, long, global = true)]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured accounts.
    Accounts,

    /// List buckets.
    Buckets,

    /// List objects in a bucket.
    Ls {
        bucket: String,

        /// Key prefix (directory) to list.
        #[arg(default_value = "")]
        prefix: String,

        /// List every nested key instead of direct children.
        #[arg(short, long)]
        recursive: bool,

        /// Page size.
        #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_KEYS)]
        max_keys: usize,

        /// Start after this key.
        #[arg(short, long)]
        marker: Option<String>,

        /// Follow pagination to the end.
        #[arg(long)]
        all: bool,
    },

    /// Preview an object.
    Cat {
        bucket: String,
        key: String,
    },

    /// Download a single object.
    Get {
        bucket: String,
        key: String,

        /// Destination file (default: the object's name).
        dest: Option<PathBuf>,
    },

    /// Upload a single file.
    Put {
        bucket: String,
        source: PathBuf,

        /// Destination key (default: the file's name).
        key: Option<String>,
    },

    /// Delete an object.
    Rm {
        bucket: String,
        key: String,

        /// Delete everything under the key as a prefix.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Copy an object, possibly into another bucket.
    Cp {
        src_bucket: String,
        src_key: String,
        dst_bucket: String,
        dst_key: String,
    },

    /// Download every object under a prefix.
    Download {
        bucket: String,
        prefix: String,
        dest: PathBuf,
    },

    /// Upload a directory; its name becomes a segment under the prefix.
    Upload {
        bucket: String,
        source: PathBuf,

        #[arg(default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact();
    match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?,
        Err(_) => tracing::subscriber::set_global_default(builder.finish())?,
    }

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Commands::Accounts = cli.command {
        return cmd_accounts(&config.account_names(), &config.default.account);
    }

    let account = if config.accounts.is_empty() && cli.account.is_none() {
        debug!(provider = %config.default.provider, "no accounts configured, using the default provider");
        config.fallback_account()
    } else {
        let (name, account) = config.account(cli.account.as_deref())?;
        info!("Using account: {}", name);
        account.clone()
    };

    let provider = create_default_registry()
        .resolve(&account)
        .context("Failed to create provider")?;

    match cli.command {
        Commands::Accounts => Ok(()),

        Commands::Buckets => cmd_buckets(provider.as_ref()).await,

        Commands::Ls {
            bucket,
            prefix,
            recursive,
            max_keys,
            marker,
            all,
        } => {
            let options = if recursive {
                ListOptions::recursive(prefix)
            } else {
                ListOptions::new(prefix)
            }
            .with_max_keys(max_keys)
            .with_marker(marker);
            cmd_ls(provider.as_ref(), &bucket, options, all).await
        }

        Commands::Cat { bucket, key } => cmd_cat(provider.as_ref(), &bucket, &key).await,

        Commands::Get { bucket, key, dest } => {
            cmd_get(provider.as_ref(), &bucket, &key, dest).await
        }

        Commands::Put {
            bucket,
            source,
            key,
        } => cmd_put(provider.as_ref(), &bucket, &source, key).await,

        Commands::Rm {
            bucket,
            key,
            recursive,
        } => cmd_rm(provider.as_ref(), &bucket, &key, recursive).await,

        Commands::Cp {
            src_bucket,
            src_key,
            dst_bucket,
            dst_key,
        } => cmd_cp(provider.as_ref(), &src_bucket, &src_key, &dst_bucket, &dst_key).await,

        Commands::Download {
            bucket,
            prefix,
            dest,
        } => {
            let stream = provider
                .download_directory(&bucket, &prefix, &dest)
                .await
                .with_context(|| format!("Failed to download {}/{}", bucket, prefix))?;
            run_transfer(stream, "Downloaded").await
        }

        Commands::Upload {
            bucket,
            source,
            prefix,
        } => {
            let stream = provider
                .upload_directory(&bucket, &source, &prefix)
                .await
                .with_context(|| format!("Failed to upload {}", source.display()))?;
            run_transfer(stream, "Uploaded").await
        }
    }
}

/// List configured accounts.
fn cmd_accounts(names: &[String], default: &str) -> Result<()> {
    if names.is_empty() {
        println!("No accounts configured.");
        return Ok(());
    }

    for name in names {
        let marker = if name == default { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}

async fn cmd_buckets(provider: &dyn StorageProvider) -> Result<()> {
    let buckets = provider
        .list_buckets()
        .await
        .context("Failed to list buckets")?;

    if buckets.is_empty() {
        println!("No buckets.");
        return Ok(());
    }

    for bucket in buckets {
        println!(
            "{:<40} {:<8} {}",
            bucket.name,
            format_time(bucket.creation_time),
            bucket.location.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_object(obj: &Object) {
    if obj.is_directory {
        println!("  [DIR]  {}", obj.key);
    } else {
        println!(
            "  [FILE] {:<50} {:>10} {}",
            obj.key,
            format_size(obj.size),
            format_time(obj.last_modified)
        );
    }
}

async fn cmd_ls(
    provider: &dyn StorageProvider,
    bucket: &str,
    mut options: ListOptions,
    all: bool,
) -> Result<()> {
    let mut count = 0;

    loop {
        let page = provider
            .list_objects(bucket, &options)
            .await
            .with_context(|| format!("Failed to list {}", bucket))?;

        count += page.objects.len();
        page.objects.iter().for_each(print_object);

        match page.next_marker {
            Some(next) if page.is_truncated && all => options.marker = Some(next),
            Some(next) if page.is_truncated => {
                println!("-- more: --marker {}", next);
                break;
            }
            _ => break,
        }
    }

    if count == 0 {
        println!("No objects.");
    }
    Ok(())
}

/// Find the listing entry for `key`, for metadata display.
async fn find_object(provider: &dyn StorageProvider, bucket: &str, key: &str) -> Option<Object> {
    let options = ListOptions::recursive(key).with_max_keys(1);
    let page = provider.list_objects(bucket, &options).await.ok()?;
    page.objects.into_iter().find(|obj| obj.key == key)
}

async fn cmd_cat(provider: &dyn StorageProvider, bucket: &str, key: &str) -> Result<()> {
    let content = provider
        .get_object(bucket, key)
        .await
        .with_context(|| format!("Failed to read {}/{}", bucket, key))?;

    if preview::is_text(key, &content) {
        let (text, truncated) = preview::preview_text(&content);
        println!("{}", text);
        if truncated {
            println!("[Truncated to {}]", format_size(preview::MAX_PREVIEW_SIZE as u64));
        }
        return Ok(());
    }

    let obj = find_object(provider, bucket, key)
        .await
        .unwrap_or_else(|| Object::file(key, content.len() as u64));

    println!("File: {}", obj.name());
    println!("Path: {}", obj.key);
    println!("Size: {}", format_size(obj.size));
    if let Some(modified) = obj.last_modified {
        println!("Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(content_type) = &obj.content_type {
        println!("Type: {}", content_type);
    }
    if let Some(etag) = &obj.etag {
        println!("ETag: {}", etag);
    }
    println!();
    println!("[Binary file - preview not available]");
    Ok(())
}

async fn cmd_get(
    provider: &dyn StorageProvider,
    bucket: &str,
    key: &str,
    dest: Option<PathBuf>,
) -> Result<()> {
    let content = provider
        .get_object(bucket, key)
        .await
        .with_context(|| format!("Failed to download {}/{}", bucket, key))?;

    let dest = dest.unwrap_or_else(|| PathBuf::from(Object::file(key, 0).name()));
    tokio::fs::write(&dest, &content)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    println!(
        "Downloaded {} ({}) to {}",
        key,
        format_size(content.len() as u64),
        dest.display()
    );
    Ok(())
}

async fn cmd_put(
    provider: &dyn StorageProvider,
    bucket: &str,
    source: &Path,
    key: Option<String>,
) -> Result<()> {
    let content = tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let key = match key {
        Some(key) => key,
        None => source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("Source has no file name; pass a key")?,
    };

    let obj = provider
        .put_object(bucket, &key, content)
        .await
        .with_context(|| format!("Failed to upload {}", source.display()))?;

    println!("Uploaded {} ({})", obj.key, format_size(obj.size));
    Ok(())
}

async fn cmd_rm(
    provider: &dyn StorageProvider,
    bucket: &str,
    key: &str,
    recursive: bool,
) -> Result<()> {
    if recursive {
        let deleted = provider
            .delete_prefix(bucket, key)
            .await
            .with_context(|| format!("Failed to delete {}/{}", bucket, key))?;
        println!("Deleted {} objects", deleted);
    } else {
        provider
            .delete_object(bucket, key)
            .await
            .with_context(|| format!("Failed to delete {}/{}", bucket, key))?;
        println!("Deleted {}", key);
    }
    Ok(())
}

async fn cmd_cp(
    provider: &dyn StorageProvider,
    src_bucket: &str,
    src_key: &str,
    dst_bucket: &str,
    dst_key: &str,
) -> Result<()> {
    let obj = provider
        .copy_object(src_bucket, src_key, dst_bucket, dst_key)
        .await
        .context("Failed to copy object")?;

    println!(
        "Copied {}/{} to {}/{} ({})",
        src_bucket,
        src_key,
        dst_bucket,
        obj.key,
        format_size(obj.size)
    );
    Ok(())
}

fn print_progress(progress: &TransferProgress) {
    eprint!(
        "\r[{}/{}] {:>5.1}% {} / {} {:<40}",
        progress.completed_files,
        progress.total_files,
        progress.percent(),
        format_size(progress.transferred_bytes),
        format_size(progress.total_bytes),
        progress.current_file
    );
}

/// Drive a transfer on a worker task, rendering progress until it ends.
///
/// Ctrl-C stops the transfer after the file in flight.
async fn run_transfer(stream: TransferStream, verb: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<TransferProgress>();

    let worker = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            drive_transfer(stream, &cancel, |progress| {
                let _ = tx.send(progress.clone());
            })
            .await
        })
    };

    let mut show_progress: Option<bool> = None;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            progress = rx.recv() => match progress {
                Some(progress) => {
                    let show = *show_progress.get_or_insert_with(|| should_show_progress(&progress));
                    if show {
                        print_progress(&progress);
                    }
                }
                None => break,
            },
            _ = &mut interrupted, if !cancel.is_cancelled() => {
                warn!("Interrupted, stopping after the current file");
                cancel.cancel();
            }
        }
    }

    if show_progress == Some(true) {
        eprintln!();
    }

    let outcome = worker.await.context("Transfer task failed")??;
    match outcome {
        TransferOutcome::Completed(last) => println!(
            "{} {} files ({})",
            verb,
            last.total_files,
            format_size(last.total_bytes)
        ),
        TransferOutcome::Empty => println!("No files to transfer."),
        TransferOutcome::Cancelled(last) => {
            let done = last.as_ref().map(|p| p.completed_files).unwrap_or(0);
            let total = last.as_ref().map(|p| p.total_files).unwrap_or(0);
            println!("Cancelled after {} of {} files", done, total);
        }
    }
    Ok(())
}

