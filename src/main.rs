//! # kvfetch CLI (`kvf`)
//!
//! Fingerprints build-output trees and downloads cached artifacts from a
//! remote key-value store.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kvf fingerprint <root>` | Print the content manifest of a directory tree |
//! | `kvf fetch <key> <dest>` | Download a cached object to a local path |
//! | `kvf ci-info` | Print detected CI provider metadata |
//! | `kvf completions <shell>` | Generate shell completions |
//!
//! ## Exit codes for `fetch`
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | object downloaded |
//! | 2 | cache miss (key not present) |
//! | 1 | any other failure |

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kvfetch::ci::CiMetadata;
use kvfetch::config::{self, Config};
use kvfetch::fingerprint::TreeFingerprinter;
use kvfetch::models::{AccessCredential, RetrievalOutcome, RetrievalRequest};
use kvfetch::retrieve::Retriever;

/// kvfetch: build-output fingerprinting and remote cache retrieval.
#[derive(Parser)]
#[command(name = "kvf", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when `KVF_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash every regular file under a directory and print the manifest.
    ///
    /// Directories are descended, symbolic links are skipped, and files
    /// that cannot be read are left out of the manifest.
    Fingerprint {
        /// Root directory to scan.
        root: PathBuf,

        /// Write the manifest JSON to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Glob (relative to the root) to leave out. Repeatable.
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Override the hashing concurrency from config.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Download a cached object to a local file.
    ///
    /// The destination's parent directory must already exist.
    Fetch {
        /// Cache key.
        key: String,

        /// Destination file path. Created or truncated.
        dest: PathBuf,

        /// Remote endpoint, e.g. `grpcs://cache.example.com:443`.
        #[arg(long)]
        endpoint: Option<String>,

        /// Environment variable holding the access token.
        #[arg(long)]
        token_env: Option<String>,

        /// Dial timeout in seconds.
        #[arg(long)]
        dial_timeout: Option<u64>,

        /// Abort the whole download after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Prefix the key with the detected CI provider and app identity.
        #[arg(long)]
        ci_scoped: bool,
    },

    /// Print the detected CI provider metadata as JSON.
    CiInfo,

    /// Generate shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("KVF_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "kvf", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(&cli.log_level);
    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Fingerprint {
            root,
            output,
            exclude,
            concurrency,
        } => {
            run_fingerprint(&cfg, root, output, exclude, concurrency).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Fetch {
            key,
            dest,
            endpoint,
            token_env,
            dial_timeout,
            timeout,
            ci_scoped,
        } => {
            let args = FetchArgs {
                key,
                dest,
                endpoint,
                token_env,
                dial_timeout,
                timeout,
                ci_scoped,
            };
            run_fetch(&cfg, args).await
        }
        Commands::CiInfo => {
            println!("{}", serde_json::to_string_pretty(&CiMetadata::from_env())?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { .. } => {
            // Handled above (before logging and config)
            unreachable!()
        }
    }
}

async fn run_fingerprint(
    cfg: &Config,
    root: PathBuf,
    output: Option<PathBuf>,
    exclude: Vec<String>,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut options = cfg.fingerprint.options();
    options.exclude_globs.extend(exclude);
    if let Some(n) = concurrency {
        options.concurrency = n.max(1);
    }

    let manifest = tokio::task::spawn_blocking(move || {
        TreeFingerprinter::new(&options)?.scan(&root)
    })
    .await
    .context("fingerprint worker panicked")??;

    let json = manifest.to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
            println!("wrote {} records to {}", manifest.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

struct FetchArgs {
    key: String,
    dest: PathBuf,
    endpoint: Option<String>,
    token_env: Option<String>,
    dial_timeout: Option<u64>,
    timeout: Option<u64>,
    ci_scoped: bool,
}

async fn run_fetch(cfg: &Config, args: FetchArgs) -> Result<ExitCode> {
    let endpoint = args
        .endpoint
        .or_else(|| cfg.remote.endpoint.clone())
        .context("no endpoint given: pass --endpoint or set remote.endpoint in config")?;

    let token_env = args.token_env.unwrap_or_else(|| cfg.remote.token_env.clone());
    let credential = AccessCredential::new(std::env::var(&token_env).unwrap_or_default());

    let mut options = cfg.remote.client_options();
    if let Some(secs) = args.dial_timeout {
        options.dial_timeout = Duration::from_secs(secs.max(1));
    }

    let key = if args.ci_scoped {
        CiMetadata::from_env().scoped_key(&args.key)
    } else {
        args.key
    };

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, args.timeout.map(Duration::from_secs));

    let request = RetrievalRequest::new(endpoint, key, credential, args.dest);
    let outcome = Retriever::new(options).retrieve(&request, &cancel).await?;
    cancel.cancel();

    match outcome {
        RetrievalOutcome::Success { bytes_written } => {
            println!(
                "downloaded {} bytes to {}",
                bytes_written,
                request.destination.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        RetrievalOutcome::NotFound => {
            println!("cache miss: {}", request.cache_key);
            Ok(ExitCode::from(2))
        }
        RetrievalOutcome::TransportFailure(failure) => {
            eprintln!("Error: {}", failure);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Cancels `cancel` on Ctrl-C or once `timeout` elapses.
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout: Option<Duration>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = on_signal.cancelled() => {}
            _ = tokio::signal::ctrl_c() => on_signal.cancel(),
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = on_timeout.cancelled() => {}
                _ = tokio::time::sleep(timeout) => on_timeout.cancel(),
            }
        });
    }
}
