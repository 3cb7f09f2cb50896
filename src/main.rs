//! # rmqdump CLI
//!
//! Command-line interface for the rmqdump library.

use std::process;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rmqdump::RmqDumpError;
use rmqdump::cli::Args;
use rmqdump::config::WriterKind;
use rmqdump::core::run;
use rmqdump::progress::{no_progress, stderr_progress};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = execute(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Logs go to stderr so the console writer owns stdout.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn execute(args: Args) -> Result<(), RmqDumpError> {
    let start = Instant::now();
    let config = args.into_config()?;

    // The progress line would interleave with console output.
    let progress = match config.output.writer {
        WriterKind::File => stderr_progress(),
        WriterKind::Console => no_progress(),
    };

    let stats = tokio::select! {
        result = run(&config, progress) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            info!("Interrupted, shutting down");
            return Ok(());
        }
    };

    eprintln!();
    eprintln!("✅ Done in {:.2}s", start.elapsed().as_secs_f64());
    eprintln!("   Consumed: {}", stats.consumed);
    eprintln!("   Exported: {}", stats.exported);
    eprintln!("   Filtered: {}", stats.filtered);
    if stats.failed_writes > 0 {
        eprintln!("   Failed writes: {}", stats.failed_writes);
    }
    if let Some(path) = config.output.output_file.as_ref().filter(|_| config.output.writer == WriterKind::File) {
        eprintln!("💾 Output: {}", path.display());
    }

    Ok(())
}
