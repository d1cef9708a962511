//! persistent-cache-stats - report how a persistent cache file is being used
//!
//! Prints the number of cached results and how long ago the least and most
//! recently used results were last touched.

mod age;
mod error;

use crate::age::format_optional_age;
use crate::error::{Result, StatsError};
use clap::error::ErrorKind;
use clap::Parser;
use persistent_cache::{CacheStats, Clock, PersistentCache, SystemClock};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{prelude::*, EnvFilter};

const PROGRAM: &str = "persistent-cache-stats";

#[derive(Parser, Debug)]
#[command(name = PROGRAM, about = "Show usage statistics of a persistent cache file")]
struct Cli {
    /// Cache file to inspect
    cache_file: PathBuf,
}

fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(std::env::args_os()) {
        Ok(Some(report)) => {
            print!("{}", report);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e @ (StatsError::Usage(_) | StatsError::MissingFile(_))) => {
            println!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Failed to read cache statistics");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> Result<()> {
    let env_filter =
        EnvFilter::from_default_env().add_directive("persistent_cache_stats=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Parse `args`, read the cache and build the report. `Ok(None)` means clap
/// already printed help or version text.
fn run<I, T>(args: I) -> Result<Option<String>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return Ok(None);
        }
        Err(e) => {
            debug!(error = %e, "Invalid arguments");
            return Err(StatsError::Usage(PROGRAM.to_string()));
        }
    };

    if !cli.cache_file.exists() {
        return Err(StatsError::MissingFile(cli.cache_file));
    }

    debug!(path = ?cli.cache_file, "Reading cache statistics");
    let cache = PersistentCache::open(&cli.cache_file)?;
    let stats = cache.stats()?;
    cache.close()?;

    Ok(Some(render_report(&stats, SystemClock.now())))
}

fn render_report(stats: &CacheStats, now: f64) -> String {
    format!(
        "Number of cached results : {}\n\
         Oldest result usage age  : {}\n\
         Latest result usage age  : {}\n",
        stats.entries,
        format_optional_age(stats.oldest_age(now)),
        format_optional_age(stats.newest_age(now)),
    )
}
