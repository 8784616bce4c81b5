use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tree_sitter::{Language, Node, Parser, Tree};

/// Syntax-tree parser for JavaScript and TypeScript source files.
///
/// The grammar is picked from the file extension. Parsing never fails on
/// syntax errors: tree-sitter recovers and marks the broken spans, which the
/// extractors simply do not match.
///
/// # Example
///
/// ```no_run
/// use openapi_from_repo::parser::AstParser;
/// use std::path::Path;
///
/// let source = "router.get('/users', list);".to_string();
/// let parsed = AstParser::parse_source(Path::new("routes/users.js"), source).unwrap();
/// println!("Root node: {}", parsed.tree.root_node().kind());
/// ```
pub struct AstParser;

/// A parsed source file with its syntax tree.
#[derive(Debug)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    pub source: String,
    pub tree: Tree,
}

impl AstParser {
    /// Grammar for a file extension, `None` for non-script files
    pub fn pick_language(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "ts" | "mts" | "cts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            "tsx" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            _ => None,
        }
    }

    /// Parses already loaded source text.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension has no grammar or tree-sitter gives up.
    pub fn parse_source(path: &Path, source: String) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());
        let language = Self::pick_language(path)
            .ok_or_else(|| anyhow!("No grammar for {}", path.display()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .with_context(|| format!("Failed to load grammar for {}", path.display()))?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| anyhow!("tree-sitter parse failed for {}", path.display()))?;

        if tree.root_node().has_error() {
            warn!("Syntax errors in {}, continuing with a partial tree", path.display());
        }

        Ok(ParsedFile {
            path: path.to_path_buf(),
            source,
            tree,
        })
    }
}

/// Source text of a node.
pub fn node_text<'s>(source: &'s str, node: Node) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Value of a string literal node, or of a template literal without substitutions.
pub fn string_value(source: &str, node: Node) -> Option<String> {
    match node.kind() {
        "string" => Some(strip_quotes(node_text(source, node)).to_string()),
        "template_string" => {
            let mut cursor = node.walk();
            let has_substitution = node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "template_substitution");
            (!has_substitution).then(|| strip_quotes(node_text(source, node)).to_string())
        }
        _ => None,
    }
}

fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_javascript() {
        let parsed = AstParser::parse_source(
            Path::new("routes/users.js"),
            "const express = require('express');\nrouter.get('/users', (req, res) => res.json([]));"
                .to_string(),
        )
        .unwrap();
        assert_eq!(parsed.tree.root_node().kind(), "program");
        assert!(!parsed.tree.root_node().has_error());
    }

    #[test]
    fn test_parse_typescript() {
        let parsed = AstParser::parse_source(
            Path::new("src/routes.ts"),
            "router.get('/users', (req: Request, res: Response): void => { res.json([]) });"
                .to_string(),
        )
        .unwrap();
        assert!(!parsed.tree.root_node().has_error());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(AstParser::pick_language(Path::new("routes/web.php")).is_none());
        assert!(AstParser::parse_source(Path::new("web.php"), String::new()).is_err());
    }

    #[test]
    fn test_string_values() {
        let source = "f('a', \"b\", `c`, `d${x}`)";
        let parsed = AstParser::parse_source(Path::new("x.js"), source.to_string()).unwrap();
        let root = parsed.tree.root_node();
        let call = root.named_child(0).unwrap().named_child(0).unwrap();
        let args = call.child_by_field_name("arguments").unwrap();
        let mut cursor = args.walk();
        let values: Vec<Option<String>> = args
            .named_children(&mut cursor)
            .map(|n| string_value(source, n))
            .collect();
        assert_eq!(
            values,
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string()),
                None
            ]
        );
    }
}
