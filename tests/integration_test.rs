use openapi_from_repo::{
    analyzer::{AnalysisReport, AnalysisResult, Analyzer},
    config::AnalyzerConfig,
    detector::Framework,
    extractor::HttpMethod,
    fetcher::RepoFetcher,
    scorer::{Category, QualityLevel, QualityScorer},
    serializer::{serialize_json, serialize_yaml},
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

fn analyze(dir: &TempDir) -> AnalysisReport {
    match Analyzer::new(AnalyzerConfig::default()).analyze_directory(dir.path()) {
        AnalysisResult::Success(report) => report,
        AnalysisResult::Failure(failure) => panic!("analysis failed: {}", failure.message),
    }
}

const EXPRESS_PACKAGE: &str = r#"{"name": "shop", "dependencies": {"express": "^4.19.2"}}"#;

#[test]
fn test_express_router_file() {
    let temp_dir = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", include_str!("fixtures/express_users.js")),
    ]);
    let report = analyze(&temp_dir);

    assert_eq!(report.framework.primary, Some(Framework::Express));
    let file = report.file("routes/users.js").expect("users.js should be documented");
    let users = &file.spec.paths["/users"];
    assert!(users.slot(HttpMethod::Get).is_some());
    assert!(users.slot(HttpMethod::Post).is_some());
    assert_eq!(file.endpoint_count, 2);

    let score = QualityScorer::new(&AnalyzerConfig::default()).score(&file.spec);
    assert_eq!(score.category(Category::Routes), 20);
    assert_eq!(file.quality_level, QualityLevel::Basic);
    assert!(file.quality_score <= 40);
}

#[test]
fn test_doc_block_raises_descriptions() {
    let plain = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", include_str!("fixtures/express_users.js")),
    ]);
    let documented_source = format!(
        "{}\n{}",
        include_str!("fixtures/users_doc_block.js"),
        include_str!("fixtures/express_users.js")
    );
    let documented = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", documented_source.as_str()),
    ]);

    let config = AnalyzerConfig::default();
    let scorer = QualityScorer::new(&config);
    let plain_report = analyze(&plain);
    let documented_report = analyze(&documented);
    let before = scorer.score(&plain_report.files[0].spec);
    let after = scorer.score(&documented_report.files[0].spec);

    // One of two operations is now described
    assert_eq!(before.category(Category::Descriptions), 0);
    assert_eq!(after.category(Category::Descriptions), 10);
    assert!(documented_report.files[0].has_doc_comments);
    assert_eq!(documented_report.stats.files_with_comments, 1);

    let get = documented_report.files[0].spec.paths["/users"]
        .slot(HttpMethod::Get)
        .clone()
        .unwrap();
    assert_eq!(get.summary.as_deref(), Some("List every registered user"));
}

#[test]
fn test_laravel_resource_controller() {
    let temp_dir = create_test_project(vec![
        (
            "composer.json",
            r#"{"require": {"php": "^8.2", "laravel/framework": "^11.0"}}"#,
        ),
        (
            "app/Http/Controllers/PostController.php",
            include_str!("fixtures/PostController.php"),
        ),
    ]);
    let report = analyze(&temp_dir);

    assert_eq!(report.framework.primary, Some(Framework::Laravel));
    let file = report
        .file("app/Http/Controllers/PostController.php")
        .expect("controller should be documented");
    let spec = &file.spec;
    assert!(spec.paths["/posts"].slot(HttpMethod::Get).is_some());
    assert!(spec.paths["/posts"].slot(HttpMethod::Post).is_some());
    let destroy = spec.paths["/posts/{id}"]
        .slot(HttpMethod::Delete)
        .clone()
        .unwrap();
    let parameters = destroy.parameters.unwrap();
    let id = &parameters[0];
    assert_eq!(id.name, "id");
    assert_eq!(id.location, "path");
    assert!(id.required);
    assert_eq!(file.endpoint_count, 3);
}

#[test]
fn test_nextjs_dynamic_segment() {
    let temp_dir = create_test_project(vec![
        (
            "package.json",
            r#"{"dependencies": {"next": "14.2.3", "react": "18.3.1"}}"#,
        ),
        ("pages/api/users/[id].js", include_str!("fixtures/user_by_id.js")),
    ]);
    let report = analyze(&temp_dir);

    assert_eq!(report.framework.primary, Some(Framework::NextJs));
    let file = report.file("pages/api/users/[id].js").unwrap();
    let get = file.spec.paths["/api/users/{id}"]
        .slot(HttpMethod::Get)
        .clone()
        .expect("GET handler");
    let parameters = get.parameters.unwrap();
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].name, "id");
    assert_eq!(parameters[0].location, "path");
    assert!(parameters[0].required);
    assert!(get.responses.contains_key("404"));
}

#[test]
fn test_symfony_attribute_controller() {
    let temp_dir = create_test_project(vec![
        (
            "composer.json",
            r#"{"require": {"symfony/framework-bundle": "7.0.*"}}"#,
        ),
        (
            "src/Controller/ProductController.php",
            include_str!("fixtures/ProductController.php"),
        ),
    ]);
    let report = analyze(&temp_dir);

    assert_eq!(report.framework.primary, Some(Framework::Symfony));
    let spec = &report.file("src/Controller/ProductController.php").unwrap().spec;
    let index = spec.paths["/products"].slot(HttpMethod::Get).clone().unwrap();
    assert_eq!(index.parameters.unwrap()[0].name, "category");
    let delete = spec.paths["/products/{id}"]
        .slot(HttpMethod::Delete)
        .clone()
        .unwrap();
    assert!(delete.security.is_some());
    assert!(delete.responses.contains_key("204"));
    assert!(delete.responses.contains_key("401"));
}

#[test]
fn test_duplicate_declarations_and_path_normalization() {
    let temp_dir = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        (
            "routes/orders.js",
            "const router = require('express').Router();\n\
             router.get('/orders/:orderId', show);\n\
             router.get('/orders/:orderId', showAgain);\n\
             router.delete('/orders/:orderId/', remove);\n\
             module.exports = router;\n",
        ),
    ]);
    let report = analyze(&temp_dir);
    let spec = &report.files[0].spec;

    assert_eq!(spec.paths.keys().collect::<Vec<_>>(), vec!["/orders/{orderId}"]);
    assert_eq!(report.files[0].endpoint_count, 2);
    assert_eq!(report.stats.total_endpoints, 2);
}

#[test]
fn test_skipped_directories_and_unrelated_files() {
    let temp_dir = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", include_str!("fixtures/express_users.js")),
        (
            "node_modules/express/lib/router/index.js",
            "router.get('/internal', handler);",
        ),
        ("routes/helpers.js", "module.exports = { slugify: (s) => s.toLowerCase() };"),
    ]);
    let report = analyze(&temp_dir);

    let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["routes/users.js"]);
}

#[test]
fn test_serialized_result_shape() {
    let temp_dir = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", include_str!("fixtures/express_users.js")),
    ]);
    let result = Analyzer::new(AnalyzerConfig::default()).analyze_directory(temp_dir.path());

    let json: serde_json::Value = serde_json::from_str(&serialize_json(&result).unwrap()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["framework"]["primary"], "express");
    assert_eq!(json["framework"]["type"], "javascript");
    assert_eq!(json["files"][0]["path"], "routes/users.js");
    assert_eq!(json["files"][0]["hasDocComments"], false);
    assert_eq!(json["stats"]["totalFiles"], 1);
    assert_eq!(json["overallQuality"], "basic");
    assert!(json.get("branch").is_none());

    let yaml = serialize_yaml(&result).unwrap();
    assert!(yaml.contains("overallQuality: basic"));
}

#[test]
fn test_local_directory_is_left_untouched() {
    let temp_dir = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", include_str!("fixtures/express_users.js")),
    ]);
    analyze(&temp_dir);
    assert!(temp_dir.path().join("routes/users.js").exists());
    assert!(temp_dir.path().join("package.json").exists());
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git should run");
    assert!(status.success(), "git {:?} failed", args);
}

/// Local repository whose only branch is `master`.
fn master_only_repository() -> TempDir {
    let source = create_test_project(vec![
        ("package.json", EXPRESS_PACKAGE),
        ("routes/users.js", include_str!("fixtures/express_users.js")),
    ]);
    git(source.path(), &["init", "-q"]);
    git(source.path(), &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(source.path(), &["add", "."]);
    git(source.path(), &["commit", "-q", "-m", "Initial commit"]);
    source
}

fn config_with_workspace(root: &Path) -> AnalyzerConfig {
    AnalyzerConfig {
        workspace_root: Some(root.to_path_buf()),
        ..AnalyzerConfig::default()
    }
}

fn workspace_entries(root: &Path) -> usize {
    fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn test_clone_falls_back_to_secondary_branch() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let source = master_only_repository();
    let workspaces = TempDir::new().unwrap();
    let config = config_with_workspace(workspaces.path());
    let url = format!("file://{}", source.path().display());

    let repository = RepoFetcher::new(&config).fetch(&url, None).unwrap();
    assert_eq!(repository.branch, "master");
    assert!(repository.root().join("routes/users.js").exists());
    drop(repository);
    assert_eq!(workspace_entries(workspaces.path()), 0);
}

#[test]
fn test_repository_analysis_cleans_up_workspace() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let source = master_only_repository();
    let workspaces = TempDir::new().unwrap();
    let url = format!("file://{}", source.path().display());

    let result =
        Analyzer::new(config_with_workspace(workspaces.path())).analyze_repository(&url, None);
    let report = result.report().expect("analysis should succeed");
    assert_eq!(report.branch.as_deref(), Some("master"));
    assert_eq!(report.stats.total_endpoints, 2);
    assert_eq!(workspace_entries(workspaces.path()), 0);
}

#[test]
fn test_missing_branch_fails_and_cleans_up() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let source = master_only_repository();
    let workspaces = TempDir::new().unwrap();
    let url = format!("file://{}", source.path().display());

    let result = Analyzer::new(config_with_workspace(workspaces.path()))
        .analyze_repository(&url, Some("release-9"));
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "fetch_failure");
    assert_eq!(workspace_entries(workspaces.path()), 0);
}
