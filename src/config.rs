//! Immutable analyzer configuration.
//!
//! Every table the pipeline consults (directories to skip or favour, window
//! sizes, placeholder markers, status descriptions, branch names) lives in
//! [`AnalyzerConfig`]. Components receive a reference to it instead of reading
//! global state, so tests and callers can override any of them.

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Size of the text window scanned around a route declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindow {
    /// Characters taken before the match
    pub before: usize,
    /// Characters taken after the match
    pub after: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            before: 500,
            after: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
    /// Directories (relative to the workspace root) scanned before the full tree
    pub priority_dirs: Vec<String>,
    /// Maximum directory depth of the scan
    pub max_depth: usize,
    /// Files larger than this many bytes are skipped
    pub max_file_size: u64,
    /// Window used by the pattern-based parsers
    pub window: ContextWindow,
    /// File stems that never produce a `servers` entry
    pub generic_server_names: Vec<String>,
    /// Lower-case fragments that mark a description as a placeholder
    pub placeholder_markers: Vec<String>,
    /// Canonical response descriptions keyed by status code
    pub status_descriptions: BTreeMap<u16, String>,
    /// Branch cloned when the caller gives none
    pub default_branch: String,
    /// Branch retried once when the default branch cannot be cloned
    pub fallback_branch: String,
    /// Parent directory of ephemeral workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
    /// Seconds before a clone is killed
    pub clone_timeout_secs: u64,
    /// Pause between two calls to the enrichment collaborator
    pub enrichment_delay_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let status_descriptions = [
            (200, "Operación exitosa"),
            (201, "Recurso creado exitosamente"),
            (202, "Solicitud aceptada"),
            (204, "Sin contenido"),
            (301, "Movido permanentemente"),
            (302, "Redirección"),
            (304, "No modificado"),
            (400, "Solicitud inválida"),
            (401, "No autorizado"),
            (403, "Prohibido"),
            (404, "Recurso no encontrado"),
            (405, "Método no permitido"),
            (409, "Conflicto"),
            (422, "Error de validación"),
            (429, "Demasiadas solicitudes"),
            (500, "Error interno del servidor"),
            (502, "Puerta de enlace incorrecta"),
            (503, "Servicio no disponible"),
        ]
        .into_iter()
        .map(|(code, text)| (code, text.to_string()))
        .collect();

        Self {
            skip_dirs: strings(&[
                "node_modules",
                "vendor",
                ".git",
                "dist",
                "build",
                ".next",
                "coverage",
                "__pycache__",
                "target",
                "storage",
                "cache",
                "bower_components",
                "venv",
                ".venv",
            ]),
            priority_dirs: strings(&[
                "routes",
                "controllers",
                "api",
                "src/routes",
                "src/controllers",
                "src/api",
                "app/Http/Controllers",
                "src/Controller",
                "pages/api",
                "src/pages/api",
                "app/api",
                "src/app/api",
                "server",
                "src/server",
                "handlers",
                "src/handlers",
                "models",
                "src/models",
                "app/Models",
            ]),
            max_depth: 5,
            max_file_size: 1024 * 1024,
            window: ContextWindow::default(),
            generic_server_names: strings(&["index", "server", "app", "routes", "api", "main"]),
            placeholder_markers: strings(&[
                "todo",
                "tbd",
                "sin descripción",
                "sin descripcion",
                "descripción pendiente",
                "generada automáticamente",
                "generado automáticamente",
                "no description",
                "auto-generated",
                "lorem ipsum",
            ]),
            status_descriptions,
            default_branch: "main".to_string(),
            fallback_branch: "master".to_string(),
            workspace_root: None,
            clone_timeout_secs: 300,
            enrichment_delay_ms: 1000,
        }
    }
}

impl AnalyzerConfig {
    /// Loads a configuration from a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: AnalyzerConfig =
            serde_yaml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        if config.max_depth == 0 {
            return Err(Error::Config("max_depth must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Canonical description for a status code, with a generic fallback.
    pub fn status_description(&self, status: u16) -> String {
        if let Some(text) = self.status_descriptions.get(&status) {
            return text.clone();
        }
        match status {
            200..=299 => "Respuesta exitosa".to_string(),
            400..=499 => "Error del cliente".to_string(),
            500..=599 => "Error del servidor".to_string(),
            _ => format!("Respuesta {}", status),
        }
    }

    /// Whether `text` is empty or contains a placeholder marker as a whole word.
    pub fn is_placeholder(&self, text: &str) -> bool {
        let lowered = text.trim().to_lowercase();
        lowered.is_empty()
            || self
                .placeholder_markers
                .iter()
                .any(|marker| contains_word(&lowered, marker))
    }

    pub fn is_skipped_dir(&self, name: &str) -> bool {
        name.starts_with('.') || self.skip_dirs.iter().any(|d| d == name)
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn enrichment_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_delay_ms)
    }
}

/// `needle` occurs in `haystack` with no letter or digit directly around it.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
