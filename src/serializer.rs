//! Serialization of analysis results and documents to YAML or JSON.
//!
//! Every function is generic over [`Serialize`], so the same helpers write a
//! whole [`AnalysisResult`](crate::analyzer::AnalysisResult) or a single
//! [`OpenApiDocument`](crate::openapi_builder::OpenApiDocument).

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Serializes a value to YAML.
///
/// # Errors
///
/// Returns an error if serialization fails.
///
/// # Example
///
/// ```no_run
/// use openapi_from_repo::analyzer::Analyzer;
/// use openapi_from_repo::config::AnalyzerConfig;
/// use openapi_from_repo::serializer::serialize_yaml;
/// use std::path::Path;
///
/// let result = Analyzer::new(AnalyzerConfig::default()).analyze_directory(Path::new("./my-api"));
/// println!("{}", serialize_yaml(&result).unwrap());
/// ```
pub fn serialize_yaml<T: Serialize>(value: &T) -> Result<String> {
    debug!("Serializing to YAML");
    serde_yaml::to_string(value).context("Failed to serialize to YAML")
}

/// Serializes a value to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    debug!("Serializing to JSON");
    serde_json::to_string_pretty(value).context("Failed to serialize to JSON")
}

pub fn serialize<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serialize_yaml(value),
        OutputFormat::Json => serialize_json(value),
    }
}

/// Writes string content to a file, creating parent directories.
///
/// # Arguments
///
/// * `content` - The string content to write
/// * `path` - The file path to write to
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalysisResult;
    use crate::error::Error;
    use crate::openapi_builder::{Info, OpenApiDocument};
    use tempfile::TempDir;

    fn test_document() -> OpenApiDocument {
        OpenApiDocument::empty(Info {
            title: "API users".to_string(),
            version: "1.0.0".to_string(),
            description: Some("Generated".to_string()),
        })
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml = serialize_yaml(&test_document()).unwrap();
        assert!(yaml.contains("openapi: 3.0.0"));
        assert!(yaml.contains("title: API users"));
        assert!(yaml.contains("paths:"));
        assert!(!yaml.contains("components:"));
    }

    #[test]
    fn test_serialize_json() {
        let json = serialize_json(&test_document()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["openapi"], "3.0.0");
        assert_eq!(value["info"]["version"], "1.0.0");
        // Pretty printed
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_serialize_failure_result() {
        let result = AnalysisResult::failure(&Error::InvalidArgument("bad source".to_string()));
        let yaml = serialize(&result, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("success: false"));
        assert!(yaml.contains("error: invalid_argument"));
    }

    #[test]
    fn test_write_to_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/nested/result.json");
        write_to_file("{}", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_write_to_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.yaml");
        write_to_file("first", &path).unwrap();
        write_to_file("second", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
