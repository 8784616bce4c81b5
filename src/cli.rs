use crate::analyzer::{AnalysisResult, Analyzer};
use crate::config::AnalyzerConfig;
use crate::detector::Framework;
use crate::serializer::{serialize, write_to_file, OutputFormat};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Infer per-file OpenAPI documents and documentation quality scores from a web project
#[derive(Parser, Debug)]
#[command(name = "openapi-from-repo")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Git URL of the repository, or a local project directory
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Branch to clone (defaults to the configured default branch)
    #[arg(short = 'b', long = "branch")]
    pub branch: Option<String>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// YAML configuration file overriding the built-in defaults
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Web framework to assume (if not specified, auto-detect)
    #[arg(short = 'w', long = "framework", value_enum)]
    pub framework: Option<Framework>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Where the project comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote(String),
}

impl CliArgs {
    pub fn source(&self) -> Source {
        let path = Path::new(&self.source);
        if path.is_dir() {
            Source::Local(path.to_path_buf())
        } else {
            Source::Remote(self.source.clone())
        }
    }
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    match args.source() {
        Source::Local(path) => {
            info!("Project directory: {}", path.display());
            if args.branch.is_some() {
                warn!("--branch is ignored for local directories");
            }
        }
        Source::Remote(url) => {
            if !looks_like_remote(&url) {
                anyhow::bail!(
                    "Source is neither an existing directory nor a repository URL: {}",
                    url
                );
            }
            info!("Repository: {}", url);
        }
    }

    if let Some(ref config) = args.config {
        if !config.is_file() {
            anyhow::bail!("Configuration file does not exist: {}", config.display());
        }
    }

    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }
    if let Some(ref framework) = args.framework {
        info!("Framework: {}", framework.name());
    } else {
        info!("Framework: auto-detect");
    }

    Ok(args)
}

fn looks_like_remote(source: &str) -> bool {
    source.contains("://") || (source.starts_with("git@") && source.contains(':'))
}

/// Run the main workflow
///
/// The result is written even when the analysis failed; the failure is then
/// returned as an error so the process exits with a non-zero status.
pub fn run(args: CliArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => AnalyzerConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    let analyzer = Analyzer::new(config).with_framework(args.framework);
    let result = match args.source() {
        Source::Local(path) => analyzer.analyze_directory(&path),
        Source::Remote(url) => analyzer.analyze_repository(&url, args.branch.as_deref()),
    };

    info!("Serializing to {:?} format...", args.output_format);
    let content = serialize(&result, args.output_format)?;
    if let Some(output_path) = &args.output_path {
        write_to_file(&content, output_path)?;
        info!("Wrote analysis to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    match result {
        AnalysisResult::Success(report) => {
            info!("Summary:");
            info!("  - Files documented: {}", report.stats.total_files);
            info!("  - Files with doc comments: {}", report.stats.files_with_comments);
            info!("  - Endpoints: {}", report.stats.total_endpoints);
            info!(
                "  - Average quality: {} ({})",
                report.stats.average_quality, report.overall_quality
            );
            Ok(())
        }
        AnalysisResult::Failure(failure) => {
            anyhow::bail!("Analysis failed ({}): {}", failure.error, failure.message)
        }
    }
}
