use super::context::{call_end, neighbour_window, ContextAnalyzer, EXPRESS_IDIOM};
use super::{pattern, Endpoint, EndpointExtractor, HttpMethod, ParseResult};
use crate::config::ContextWindow;
use crate::detector::Framework;
use crate::triage::CLIENT_RECEIVERS;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// Pattern-based Express route extractor
///
/// Fallback for files the syntax-tree extractor cannot make sense of. Finds
/// `<router>.<verb>('/path', ...)` calls and `.route('/path').get(...)`
/// chains, then inspects a window of text around each declaration.
pub struct ExpressExtractor {
    window: ContextWindow,
    verb_call: Regex,
    route_chain: Regex,
    chained_verb: Regex,
    use_call: Regex,
    import: Regex,
    analyzer: ContextAnalyzer,
}

/// A route declaration found in the text.
struct Declaration {
    method: HttpMethod,
    path: String,
    start: usize,
    end: usize,
}

impl ExpressExtractor {
    pub fn new(window: ContextWindow) -> Self {
        Self {
            window,
            verb_call: pattern(
                r#"\b([A-Za-z_$][\w$]*)\.(get|post|put|delete|patch|options|head)\(\s*['"`](/[^'"`]*)['"`]"#,
            ),
            route_chain: pattern(r#"\.route\(\s*['"`](/[^'"`]*)['"`]\s*\)"#),
            chained_verb: pattern(r"^\s*\.(get|post|put|delete|patch|options|head)\s*\("),
            use_call: pattern(r"\.use\(([^)]*)\)"),
            import: pattern(r#"(?:require\(\s*|from\s+)['"]([^'"]+)['"]"#),
            analyzer: ContextAnalyzer::new(EXPRESS_IDIOM),
        }
    }

    fn declarations(&self, content: &str) -> Vec<Declaration> {
        let mut found = Vec::new();

        for caps in self.verb_call.captures_iter(content) {
            if CLIENT_RECEIVERS.contains(&&caps[1]) {
                continue;
            }
            let Some(method) = HttpMethod::parse(&caps[2]) else {
                continue;
            };
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            found.push(Declaration {
                method,
                path: caps[3].to_string(),
                start,
                end: call_end(content, start),
            });
        }

        for caps in self.route_chain.captures_iter(content) {
            let Some(whole) = caps.get(0) else { continue };
            let path = caps[1].to_string();
            let mut cursor = whole.end();
            while let Some(verb) = content
                .get(cursor..)
                .and_then(|rest| self.chained_verb.captures(rest))
            {
                let Some(method) = HttpMethod::parse(&verb[1]) else {
                    break;
                };
                let end = call_end(content, cursor);
                if end <= cursor {
                    break;
                }
                found.push(Declaration {
                    method,
                    path: path.clone(),
                    start: cursor,
                    end,
                });
                cursor = end;
            }
        }

        found.sort_by_key(|d| d.start);
        found
    }
}

impl EndpointExtractor for ExpressExtractor {
    fn name(&self) -> &'static str {
        "express"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::Express));
        result.imports = self
            .import
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();
        result.has_auth = self
            .use_call
            .captures_iter(content)
            .any(|c| self.analyzer.mentions_auth(&c[1]));

        if let Some(module) = result.foreign_server_import() {
            debug!("{}: imports {}, not an Express file", file_path.display(), module);
            result.has_auth = false;
            return Ok(result);
        }

        let declarations = self.declarations(content);
        let spans: Vec<(usize, usize)> = declarations.iter().map(|d| (d.start, d.end)).collect();

        for (index, declaration) in declarations.iter().enumerate() {
            let mut endpoint = Endpoint::new(declaration.method, &declaration.path);
            let text = neighbour_window(content, &spans, index, self.window);
            self.analyzer.analyze(text).apply_to(&mut endpoint);
            result.push_endpoint(endpoint);
        }

        debug!(
            "{}: {} endpoints found by the express patterns",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ParseResult {
        ExpressExtractor::new(ContextWindow::default())
            .parse(content, Path::new("routes/users.js"))
            .unwrap()
    }

    fn keys(result: &ParseResult) -> Vec<String> {
        result.endpoints.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_fastify_file_yields_nothing() {
        let result = parse("import Fastify from 'fastify';\nconst app = Fastify();\napp.get('/ping', ping);");
        assert!(result.is_empty());
        assert_eq!(result.imports, vec!["fastify"]);
    }

    #[test]
    fn test_verb_calls() {
        let result = parse(
            r#"
const express = require('express');
const router = express.Router();
router.get("/users", listUsers);
router.post("/users", createUser);
router.delete('/users/:id', removeUser);
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/users", "POST:/users", "DELETE:/users/{id}"]);
        assert_eq!(result.imports, vec!["express"]);
        assert!(!result.has_auth);
        assert_eq!(result.flavor, Some(Framework::Express));
    }

    #[test]
    fn test_route_chain() {
        let result = parse(
            r#"
router.route('/books/:isbn')
  .get((req, res) => res.json({ isbn: req.params.isbn, title }))
  .put((req, res) => { const { title } = req.body; res.sendStatus(204); });
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/books/{isbn}", "PUT:/books/{isbn}"]);
        let put = &result.endpoints[1];
        assert_eq!(put.request_body.as_ref().unwrap().fields[0].name, "title");
        assert!(put.responses.iter().any(|r| r.status == 204));
    }

    #[test]
    fn test_use_auth_marks_file() {
        let result = parse("router.use(authenticate);\nrouter.get('/me', me);");
        assert!(result.has_auth);
        assert!(result.uses_auth());
    }

    #[test]
    fn test_bodies_do_not_leak_between_routes() {
        let result = parse(
            r#"
router.post('/a', (req, res) => { const { alpha } = req.body; res.json({ ok }); });
router.post('/b', (req, res) => { const { beta } = req.body; res.json({ ok }); });
"#,
        );
        let names = |i: usize| -> Vec<String> {
            result.endpoints[i]
                .request_body
                .as_ref()
                .unwrap()
                .fields
                .iter()
                .map(|f| f.name.clone())
                .collect()
        };
        assert_eq!(names(0), vec!["alpha"]);
        assert_eq!(names(1), vec!["beta"]);
    }

    #[test]
    fn test_client_calls_are_ignored() {
        let result = parse("axios.get('/api/users'); http.post('/login');");
        assert!(result.is_empty());
    }
}
