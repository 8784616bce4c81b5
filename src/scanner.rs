use crate::config::AnalyzerConfig;
use crate::detector::{Framework, FrameworkDetection};
use crate::openapi_builder::OpenApiDocument;
use crate::scorer::QualityScore;
use crate::triage::ContentTriage;
use anyhow::{bail, Result};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories that hold file-convention routes.
pub const ROUTER_DIRS: &[&str] = &["pages/api", "src/pages/api", "app", "src/app"];

/// A source file selected for analysis.
///
/// Created by the scanner, then filled in with the synthesized document and
/// its score by the analyzer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoFile {
    /// Path relative to the workspace root, with `/` separators
    pub path: String,
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    pub has_doc_comments: bool,
    pub endpoint_count: usize,
    pub spec: Option<OpenApiDocument>,
    pub quality_score: Option<QualityScore>,
}

/// File scanner for traversing a repository workspace.
///
/// Priority directories (routes, controllers, api folders of every supported
/// ecosystem) are scanned first. When they yield no candidate the whole tree
/// is scanned instead. Dependency, build and hidden directories are always
/// skipped and the walk never goes deeper than the configured depth.
///
/// # Example
///
/// ```no_run
/// use openapi_from_repo::config::AnalyzerConfig;
/// use openapi_from_repo::detector::FrameworkDetection;
/// use openapi_from_repo::scanner::FileScanner;
/// use openapi_from_repo::triage::ContentTriage;
/// use std::path::PathBuf;
///
/// let config = AnalyzerConfig::default();
/// let triage = ContentTriage::new();
/// let detection = FrameworkDetection::none();
/// let scanner = FileScanner::new(PathBuf::from("./my-project"), &config, &detection, &triage);
/// let result = scanner.scan().unwrap();
/// println!("Found {} candidate files", result.files.len());
/// ```
pub struct FileScanner<'a> {
    root_path: PathBuf,
    config: &'a AnalyzerConfig,
    detection: &'a FrameworkDetection,
    triage: &'a ContentTriage,
}

/// Result of a scan.
pub struct ScanResult {
    /// Candidate files in walk order
    pub files: Vec<RepoFile>,
    /// Warning messages for any issues encountered (e.g., inaccessible directories)
    pub warnings: Vec<String>,
    /// Whether the whole-tree fallback was used
    pub used_fallback: bool,
}

impl<'a> FileScanner<'a> {
    pub fn new(
        root_path: PathBuf,
        config: &'a AnalyzerConfig,
        detection: &'a FrameworkDetection,
        triage: &'a ContentTriage,
    ) -> Self {
        Self {
            root_path,
            config,
            detection,
            triage,
        }
    }

    /// Scans priority directories, then the whole tree if they held no candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory does not exist.
    pub fn scan(&self) -> Result<ScanResult> {
        if !self.root_path.is_dir() {
            bail!("Workspace is not a directory: {}", self.root_path.display());
        }

        let extensions = self.detection.extensions();
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut warnings = Vec::new();

        for dir in &self.config.priority_dirs {
            let start = self.root_path.join(dir);
            if !start.is_dir() {
                continue;
            }
            debug!("Scanning priority directory {}", start.display());
            let depth_used = Path::new(dir).components().count();
            let remaining = self.config.max_depth.saturating_sub(depth_used);
            self.walk(&start, remaining, &extensions, &mut seen, &mut files, &mut warnings);
        }

        let used_fallback = files.is_empty();
        if used_fallback {
            debug!("No candidates in priority directories, scanning the whole workspace");
            let root = self.root_path.clone();
            self.walk(&root, self.config.max_depth, &extensions, &mut seen, &mut files, &mut warnings);
        }

        debug!("Scan found {} candidate files", files.len());
        Ok(ScanResult {
            files,
            warnings,
            used_fallback,
        })
    }

    fn walk(
        &self,
        start: &Path,
        max_depth: usize,
        extensions: &[&str],
        seen: &mut HashSet<PathBuf>,
        files: &mut Vec<RepoFile>,
        warnings: &mut Vec<String>,
    ) {
        let walker = WalkDir::new(start)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Don't filter the start directory itself
                if e.path() == start || !e.file_type().is_dir() {
                    return true;
                }
                !self.config.is_skipped_dir(&e.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let extension = match path.extension().and_then(|s| s.to_str()) {
                Some(ext) if extensions.contains(&ext) => ext.to_string(),
                _ => continue,
            };
            if !seen.insert(path.to_path_buf()) {
                continue;
            }

            match self.inspect(path, extension) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(warning) => {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
    }

    /// Triages one file; `Ok(None)` when it is not a candidate.
    fn inspect(&self, path: &Path, extension: String) -> std::result::Result<Option<RepoFile>, String> {
        let size = fs::metadata(path)
            .map_err(|e| format!("Failed to stat {}: {}", path.display(), e))?
            .len();
        if size > self.config.max_file_size {
            return Err(format!(
                "Skipping {} ({} bytes exceeds the size limit)",
                path.display(),
                size
            ));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

        let relative = relative_path(&self.root_path, path);
        let report = self.triage.analyze(&content);
        let routed_by_location = self.detection.frameworks.contains(&Framework::NextJs)
            && is_under_router_dir(&relative);

        if !report.is_api_relevant() && !routed_by_location {
            return Ok(None);
        }

        Ok(Some(RepoFile {
            path: relative,
            extension,
            size,
            has_doc_comments: report.has_doc_comments,
            endpoint_count: report.fallback.endpoints.len(),
            spec: None,
            quality_score: None,
        }))
    }
}

/// `path` relative to `root`, always with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a relative path lives under a file-convention router directory.
pub fn is_under_router_dir(relative: &str) -> bool {
    ROUTER_DIRS
        .iter()
        .any(|dir| relative.starts_with(&format!("{}/", dir)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn scan(root: &Path, detection: &FrameworkDetection) -> ScanResult {
        let config = AnalyzerConfig::default();
        let triage = ContentTriage::new();
        FileScanner::new(root.to_path_buf(), &config, detection, &triage)
            .scan()
            .unwrap()
    }

    fn paths(result: &ScanResult) -> Vec<&str> {
        result.files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_priority_directories_win() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "routes/users.js", "router.get('/users', list);");
        write(root, "lib/other.js", "app.get('/other', x);");
        write(root, "routes/util.js", "module.exports = 1;");

        let result = scan(root, &FrameworkDetection::forced(Framework::Express));
        assert_eq!(paths(&result), vec!["routes/users.js"]);
        assert!(!result.used_fallback);
        assert_eq!(result.files[0].endpoint_count, 1);
        assert_eq!(result.files[0].extension, "js");
    }

    #[test]
    fn test_falls_back_to_whole_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "server.js", "app.get('/health', ok);");
        write(root, "lib/math.js", "export const x = 1;");

        let result = scan(root, &FrameworkDetection::none());
        assert_eq!(paths(&result), vec!["server.js"]);
        assert!(result.used_fallback);
    }

    #[test]
    fn test_skips_dependency_and_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "node_modules/express/index.js", "app.get('/x', y);");
        write(root, "vendor/laravel/Route.php", "Route::get('/x', 'y');");
        write(root, ".cache/app.js", "app.get('/x', y);");
        write(root, "app.js", "app.get('/x', y);");

        let result = scan(root, &FrameworkDetection::none());
        assert_eq!(paths(&result), vec!["app.js"]);
    }

    #[test]
    fn test_filters_extensions_by_ecosystem() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "routes/web.php", "<?php Route::get('/a', 'A@b');");
        write(root, "routes/api.js", "router.get('/b', c);");

        let result = scan(root, &FrameworkDetection::forced(Framework::Laravel));
        assert_eq!(paths(&result), vec!["routes/web.php"]);
    }

    #[test]
    fn test_depth_limit() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "a/b/c/d/e/f/deep.js", "app.get('/deep', x);");
        write(root, "a/b/shallow.js", "app.get('/shallow', x);");

        let result = scan(root, &FrameworkDetection::none());
        assert_eq!(paths(&result), vec!["a/b/shallow.js"]);
    }

    #[test]
    fn test_next_router_files_are_candidates_by_location() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "pages/api/users/[id].ts", "export default function handler(q, s) { s.end() }");

        let result = scan(root, &FrameworkDetection::forced(Framework::NextJs));
        assert_eq!(paths(&result), vec!["pages/api/users/[id].ts"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let config = AnalyzerConfig::default();
        let triage = ContentTriage::new();
        let detection = FrameworkDetection::none();
        let scanner = FileScanner::new(PathBuf::from("/definitely/not/here"), &config, &detection, &triage);
        assert!(scanner.scan().is_err());
    }
}
