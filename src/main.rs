//! openapi-from-repo - Command-line tool inferring OpenAPI documents from web projects.
//!
//! The tool clones a Git repository (or reads a local directory), finds the
//! files that declare HTTP endpoints and prints one OpenAPI 3.0 document per
//! file together with a documentation quality score.
//!
//! # Usage
//!
//! ```bash
//! openapi-from-repo [OPTIONS] <SOURCE>
//! ```
//!
//! # Examples
//!
//! Analyse a remote repository:
//! ```bash
//! openapi-from-repo https://github.com/acme/shop-api.git -b develop
//! ```
//!
//! Analyse a local checkout and write JSON:
//! ```bash
//! openapi-from-repo ./shop-api -f json -o analysis.json
//! ```
//!
//! Enable verbose logging:
//! ```bash
//! openapi-from-repo ./shop-api -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_repo::cli;

fn main() -> Result<()> {
    // Parse once so the verbose flag can configure the logger before validation logs anything
    let args_for_verbose = cli::CliArgs::parse();

    let log_level = if args_for_verbose.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("openapi-from-repo starting...");

    let args = cli::parse_args_from_parsed(args_for_verbose)?;
    cli::run(args)?;

    info!("Analysis completed successfully");

    Ok(())
}
