use clap::{Parser, Subcommand};
use imgpress::config::{self, Config};
use imgpress::dispatch::{DispatchOptions, Dispatcher};
use imgpress::imaging::{RustBackend, supported_input_extensions};
use imgpress::output;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgpress")]
#[command(about = "Render content-addressed image variants")]
#[command(long_about = "\
Render content-addressed image variants

Each image submitted to a handler is fingerprinted (SHA-256 of its bytes),
decoded once, and rendered into every size x format x store combination the
handler declares. Variants are stored as

  {kind}-{value}-{digest}.{ext}     e.g. square-80-54c2...a7c2.webp

so processing the same image twice rewrites the same keys.

Run 'imgpress gen-config' to print a documented config file.
Set RUST_LOG (e.g. RUST_LOG=imgpress=debug) for diagnostic logs.")]
#[command(version = version_string())]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every variant of the given images through one handler
    Process {
        /// Handler config file
        #[arg(long, default_value = "imgpress.toml")]
        config: PathBuf,
        /// Handler to run
        #[arg(long)]
        handler: String,
        /// Worker threads (capped at available cores)
        #[arg(long)]
        jobs: Option<usize>,
        /// Per-variant deadline in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Image files, or directories to search for images
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Validate a config file and list its handlers
    Check {
        #[arg(long, default_value = "imgpress.toml")]
        config: PathBuf,
    },
    /// Print a stock config with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            config,
            handler,
            jobs,
            timeout_secs,
            images,
        } => {
            let config = Config::load(&config)?;
            let handler = config.handler(&handler)?;
            let options = DispatchOptions {
                workers: jobs,
                job_timeout: timeout_secs.map(Duration::from_secs),
                ..DispatchOptions::default()
            };
            let dispatcher = Dispatcher::new(RustBackend::new(), options)?;
            tracing::debug!(workers = dispatcher.workers(), "worker pool ready");

            let inputs = collect_inputs(&images);
            if inputs.is_empty() {
                return Err("no supported images found".into());
            }

            let mut failed = 0;
            for path in &inputs {
                println!("{}", output::format_upload_header(path, &handler.name));
                match process_one(&dispatcher, handler, path) {
                    Ok(true) => {}
                    Ok(false) => failed += 1,
                    Err(e) => {
                        println!("    failed: {e}");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} of {} images had failures", inputs.len()).into());
            }
        }
        Command::Check { config } => {
            println!("==> Checking {}", config.display());
            let config = Config::load(&config)?;
            output::print_check(&config);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Dispatch one file, streaming progress to stdout. Returns whether every
/// variant was stored.
fn process_one(
    dispatcher: &Dispatcher<RustBackend>,
    handler: &config::Handler,
    path: &Path,
) -> Result<bool, Box<dyn std::error::Error>> {
    let input = BufReader::new(File::open(path)?);
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_dispatch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = dispatcher.dispatch(handler, input, Some(&tx));
    drop(tx);
    printer.join().map_err(|_| "output thread panicked")?;

    let report = result?;
    output::print_report_summary(&report);
    Ok(report.is_success())
}

/// Expand directories into the supported images they contain, sorted.
/// Plain file arguments are kept as given.
fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    for path in paths {
        if !path.is_dir() {
            inputs.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        inputs.extend(found);
    }
    inputs
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| supported_input_extensions().iter().any(|s| *s == ext))
}
