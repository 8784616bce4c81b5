use crate::config::AnalyzerConfig;
use clap::ValueEnum;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Supported web frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Framework {
    /// Express and other minimal routers
    #[serde(rename = "express")]
    Express,
    /// Next.js file-based API routes
    #[serde(rename = "nextjs")]
    #[value(name = "nextjs")]
    NextJs,
    /// Fastify
    #[serde(rename = "fastify")]
    Fastify,
    /// Koa with koa-router
    #[serde(rename = "koa")]
    Koa,
    /// hapi
    #[serde(rename = "hapi")]
    Hapi,
    /// Bare Node.js `http` server
    #[serde(rename = "node-http")]
    NodeHttp,
    /// Laravel
    #[serde(rename = "laravel")]
    Laravel,
    /// Symfony
    #[serde(rename = "symfony")]
    Symfony,
    /// Flask
    #[serde(rename = "flask")]
    Flask,
    /// Django
    #[serde(rename = "django")]
    Django,
    /// FastAPI
    #[serde(rename = "fastapi")]
    #[value(name = "fastapi")]
    FastApi,
}

/// Source ecosystem family of a framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Javascript,
    Php,
    Python,
    Unknown,
}

impl Ecosystem {
    /// File extensions scanned for this ecosystem
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Ecosystem::Javascript => &["js", "jsx", "ts", "tsx", "mjs", "cjs"],
            Ecosystem::Php => &["php"],
            Ecosystem::Python => &["py"],
            Ecosystem::Unknown => &["js", "jsx", "ts", "tsx", "mjs", "cjs", "php", "py"],
        }
    }
}

/// Which manifest a framework is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Manifest {
    Package,
    Composer,
    Requirements,
}

impl Framework {
    /// Fixed check order; the first match becomes the primary framework.
    pub const DETECTION_ORDER: [Framework; 11] = [
        Framework::NextJs,
        Framework::Express,
        Framework::Fastify,
        Framework::Koa,
        Framework::Hapi,
        Framework::NodeHttp,
        Framework::Laravel,
        Framework::Symfony,
        Framework::FastApi,
        Framework::Flask,
        Framework::Django,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Framework::Express => "express",
            Framework::NextJs => "nextjs",
            Framework::Fastify => "fastify",
            Framework::Koa => "koa",
            Framework::Hapi => "hapi",
            Framework::NodeHttp => "node-http",
            Framework::Laravel => "laravel",
            Framework::Symfony => "symfony",
            Framework::Flask => "flask",
            Framework::Django => "django",
            Framework::FastApi => "fastapi",
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        match self {
            Framework::Express
            | Framework::NextJs
            | Framework::Fastify
            | Framework::Koa
            | Framework::Hapi
            | Framework::NodeHttp => Ecosystem::Javascript,
            Framework::Laravel | Framework::Symfony => Ecosystem::Php,
            Framework::Flask | Framework::Django | Framework::FastApi => Ecosystem::Python,
        }
    }

    fn manifest(&self) -> Manifest {
        match self.ecosystem() {
            Ecosystem::Php => Manifest::Composer,
            Ecosystem::Python => Manifest::Requirements,
            _ => Manifest::Package,
        }
    }

    /// Package names that declare the framework
    fn dependency_names(&self) -> &'static [&'static str] {
        match self {
            Framework::Express => &["express"],
            Framework::NextJs => &["next"],
            Framework::Fastify => &["fastify"],
            Framework::Koa => &["koa", "@koa/router", "koa-router"],
            Framework::Hapi => &["@hapi/hapi", "hapi"],
            Framework::NodeHttp => &[],
            Framework::Laravel => &["laravel/framework", "laravel/lumen-framework"],
            Framework::Symfony => &["symfony/framework-bundle", "symfony/routing"],
            Framework::Flask => &["flask"],
            Framework::Django => &["django", "djangorestframework"],
            Framework::FastApi => &["fastapi"],
        }
    }

    /// Token searched for in the raw manifest text
    fn signature_token(&self) -> Option<&'static str> {
        match self {
            Framework::Laravel => Some("Illuminate"),
            Framework::Symfony => Some("Symfony\\"),
            _ => None,
        }
    }

    /// Snippets that betray the framework inside source files
    fn source_patterns(&self) -> &'static [&'static str] {
        match self {
            Framework::Express => &["require('express')", "require(\"express\")", "from 'express'", "from \"express\""],
            Framework::NextJs => &["from 'next/server'", "from \"next/server\"", "NextApiRequest", "from 'next'", "from \"next\""],
            Framework::Fastify => &["require('fastify')", "require(\"fastify\")", "from 'fastify'", "from \"fastify\""],
            Framework::Koa => &["require('koa')", "require(\"koa\")", "from 'koa'", "koa-router", "@koa/router"],
            Framework::Hapi => &["@hapi/hapi", "require('hapi')"],
            Framework::NodeHttp => &["http.createServer", "https.createServer"],
            Framework::Laravel => &["Illuminate\\"],
            Framework::Symfony => &["Symfony\\Component\\Routing", "Symfony\\Bundle\\FrameworkBundle"],
            Framework::Flask => &["from flask import", "import flask"],
            Framework::Django => &["from django", "import django"],
            Framework::FastApi => &["from fastapi import", "import fastapi"],
        }
    }
}

/// Result of framework detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDetection {
    /// Every framework found, in detection order
    pub frameworks: Vec<Framework>,
    /// Ecosystem family of the primary framework
    #[serde(rename = "type")]
    pub kind: Ecosystem,
    /// First match in the fixed check order
    pub primary: Option<Framework>,
}

impl FrameworkDetection {
    pub fn none() -> Self {
        Self {
            frameworks: Vec::new(),
            kind: Ecosystem::Unknown,
            primary: None,
        }
    }

    fn from_frameworks(frameworks: Vec<Framework>) -> Self {
        let primary = frameworks.first().copied();
        Self {
            kind: primary.map(|f| f.ecosystem()).unwrap_or(Ecosystem::Unknown),
            frameworks,
            primary,
        }
    }

    /// Detection pinned to one framework, used when the caller overrides it.
    pub fn forced(framework: Framework) -> Self {
        Self::from_frameworks(vec![framework])
    }

    /// Extensions the scanner should look at.
    pub fn extensions(&self) -> Vec<&'static str> {
        let mut families: Vec<Ecosystem> = Vec::new();
        for framework in &self.frameworks {
            let family = framework.ecosystem();
            if !families.contains(&family) {
                families.push(family);
            }
        }
        if families.is_empty() {
            families.push(Ecosystem::Unknown);
        }
        let mut extensions = Vec::new();
        for family in families {
            for ext in family.extensions() {
                if !extensions.contains(ext) {
                    extensions.push(*ext);
                }
            }
        }
        extensions
    }
}

/// Framework detector for identifying the web frameworks of a repository.
///
/// Dependency manifests are read first, in the fixed order `package.json`,
/// `composer.json`, `requirements.txt` (plus `pyproject.toml`). When none of
/// them names a known framework, a sample of source files is searched for
/// framework imports instead.
pub struct FrameworkDetector<'a> {
    config: &'a AnalyzerConfig,
}

/// Upper bound of files opened by the source-pattern fallback.
const SOURCE_SAMPLE_LIMIT: usize = 50;

impl<'a> FrameworkDetector<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Detects web frameworks used by the repository at `root`.
    ///
    /// Missing or unreadable manifests are not errors: detection degrades to
    /// an empty result.
    pub fn detect(&self, root: &Path) -> FrameworkDetection {
        debug!("Detecting frameworks in {}", root.display());

        let mut detected = Vec::new();
        for manifest in [Manifest::Package, Manifest::Composer, Manifest::Requirements] {
            if let Some((names, raw)) = self.read_manifest(root, manifest) {
                for framework in Framework::DETECTION_ORDER
                    .iter()
                    .filter(|f| f.manifest() == manifest)
                {
                    if Self::manifest_matches(*framework, &names, &raw) && !detected.contains(framework) {
                        detected.push(*framework);
                    }
                }
            }
        }

        if detected.is_empty() {
            detected = self.detect_from_sources(root);
        }

        debug!("Detected frameworks: {:?}", detected);
        FrameworkDetection::from_frameworks(detected)
    }

    fn manifest_matches(framework: Framework, names: &HashSet<String>, raw: &str) -> bool {
        framework
            .dependency_names()
            .iter()
            .any(|dep| names.contains(*dep))
            || framework
                .signature_token()
                .map(|token| raw.contains(token))
                .unwrap_or(false)
    }

    /// Reads a manifest into its set of dependency names and its raw text.
    fn read_manifest(&self, root: &Path, manifest: Manifest) -> Option<(HashSet<String>, String)> {
        match manifest {
            Manifest::Package => {
                let raw = fs::read_to_string(root.join("package.json")).ok()?;
                let names = json_dependency_names(
                    &raw,
                    &["dependencies", "devDependencies", "peerDependencies"],
                );
                Some((names, raw))
            }
            Manifest::Composer => {
                let raw = fs::read_to_string(root.join("composer.json")).ok()?;
                let names = json_dependency_names(&raw, &["require", "require-dev"]);
                Some((names, raw))
            }
            Manifest::Requirements => {
                let requirements = fs::read_to_string(root.join("requirements.txt")).ok();
                let pyproject = fs::read_to_string(root.join("pyproject.toml")).ok();
                if requirements.is_none() && pyproject.is_none() {
                    return None;
                }
                let mut names: HashSet<String> = requirements
                    .as_deref()
                    .map(requirement_names)
                    .unwrap_or_default();
                let pyproject = pyproject.unwrap_or_default().to_lowercase();
                for framework in [Framework::FastApi, Framework::Flask, Framework::Django] {
                    for dep in framework.dependency_names() {
                        if pyproject.contains(&format!("\"{}", dep)) || pyproject.contains(&format!("{} =", dep)) {
                            names.insert(dep.to_string());
                        }
                    }
                }
                Some((names, requirements.unwrap_or_default()))
            }
        }
    }

    /// Looks for framework imports in a bounded sample of source files.
    fn detect_from_sources(&self, root: &Path) -> Vec<Framework> {
        let extensions = Ecosystem::Unknown.extensions();
        let mut detected = Vec::new();
        let mut inspected = 0usize;

        let walker = WalkDir::new(root)
            .max_depth(self.config.max_depth)
            .into_iter()
            .filter_entry(|e| {
                e.path() == root
                    || !e.file_type().is_dir()
                    || !self.config.is_skipped_dir(&e.file_name().to_string_lossy())
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if inspected >= SOURCE_SAMPLE_LIMIT {
                break;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let matches_ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }
            inspected += 1;
            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(_) => continue,
            };
            for framework in Framework::DETECTION_ORDER {
                if !detected.contains(&framework)
                    && framework.source_patterns().iter().any(|p| content.contains(p))
                {
                    detected.push(framework);
                }
            }
        }

        // Keep the fixed order regardless of which file was opened first.
        detected.sort_by_key(|f| Framework::DETECTION_ORDER.iter().position(|o| o == f));
        detected
    }
}

fn json_dependency_names(raw: &str, sections: &[&str]) -> HashSet<String> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Manifest is not valid JSON, falling back to raw text: {}", e);
            return HashSet::new();
        }
    };
    sections
        .iter()
        .filter_map(|section| value.get(section).and_then(|s| s.as_object()))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

fn requirement_names(raw: &str) -> HashSet<String> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .map(|line| {
            line.split(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!' | '[' | ';' | ' '))
                .next()
                .unwrap_or("")
                .to_lowercase()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
