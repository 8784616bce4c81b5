use super::context::{ContextAnalyzer, EXPRESS_IDIOM};
use super::{Endpoint, EndpointExtractor, HttpMethod, ParseResult};
use crate::detector::Framework;
use crate::parser::{node_text, string_value, AstParser};
use crate::triage::CLIENT_RECEIVERS;
use anyhow::Result;
use log::debug;
use std::path::Path;
use tree_sitter::Node;

/// Syntax-tree based Express route extractor
///
/// Visits every `call_expression` of the file looking for
/// `<router>.<verb>('/path', ...middleware, handler)` and
/// `<router>.route('/path').<verb>(handler)`. The handler's exact byte span
/// is analysed, so neighbouring routes never bleed into each other.
pub struct ExpressAstExtractor {
    analyzer: ContextAnalyzer,
}

/// Route call found in the tree
struct RouteCall<'t> {
    method: HttpMethod,
    path: String,
    middleware: Vec<Node<'t>>,
    handler: Option<Node<'t>>,
}

impl ExpressAstExtractor {
    pub fn new() -> Self {
        Self {
            analyzer: ContextAnalyzer::new(EXPRESS_IDIOM),
        }
    }

    /// Interprets a `call_expression` as a route registration.
    fn route_call<'t>(source: &str, call: Node<'t>) -> Option<RouteCall<'t>> {
        let function = call.child_by_field_name("function")?;
        if function.kind() != "member_expression" {
            return None;
        }
        let property = function.child_by_field_name("property")?;
        let method = HttpMethod::parse(node_text(source, property))?;
        let object = function.child_by_field_name("object")?;

        let arguments = call.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        let args: Vec<Node<'t>> = arguments.named_children(&mut cursor).collect();

        let first_path = args
            .first()
            .and_then(|a| string_value(source, *a))
            .filter(|p| p.starts_with('/'));

        match first_path {
            Some(path) => {
                if object.kind() == "identifier"
                    && CLIENT_RECEIVERS.contains(&node_text(source, object))
                {
                    return None;
                }
                let handler = (args.len() > 1).then(|| args[args.len() - 1]);
                let middleware = if args.len() > 2 {
                    args[1..args.len() - 1].to_vec()
                } else {
                    Vec::new()
                };
                Some(RouteCall {
                    method,
                    path,
                    middleware,
                    handler,
                })
            }
            // `.route('/p').get(handler)`, possibly after other chained verbs
            None => {
                let path = Self::chained_route_path(source, object)?;
                let handler = args.last().copied();
                let middleware = if args.len() > 1 {
                    args[..args.len() - 1].to_vec()
                } else {
                    Vec::new()
                };
                Some(RouteCall {
                    method,
                    path,
                    middleware,
                    handler,
                })
            }
        }
    }

    /// Path of the `.route('/p')` call at the bottom of a verb chain.
    fn chained_route_path(source: &str, mut node: Node) -> Option<String> {
        loop {
            if node.kind() != "call_expression" {
                return None;
            }
            let function = node.child_by_field_name("function")?;
            if function.kind() != "member_expression" {
                return None;
            }
            let property = function.child_by_field_name("property")?;
            let name = node_text(source, property);
            if name == "route" {
                let arguments = node.child_by_field_name("arguments")?;
                let first = arguments.named_child(0)?;
                return string_value(source, first).filter(|p| p.starts_with('/'));
            }
            HttpMethod::parse(name)?;
            node = function.child_by_field_name("object")?;
        }
    }

    fn import_target(source: &str, node: Node) -> Option<String> {
        match node.kind() {
            "import_statement" => {
                let target = node.child_by_field_name("source")?;
                string_value(source, target)
            }
            "call_expression" => {
                let function = node.child_by_field_name("function")?;
                if node_text(source, function) != "require" {
                    return None;
                }
                let arguments = node.child_by_field_name("arguments")?;
                string_value(source, arguments.named_child(0)?)
            }
            _ => None,
        }
    }

    /// `app.use(auth)` style registration of authentication middleware
    fn is_auth_use(&self, source: &str, node: Node) -> bool {
        if node.kind() != "call_expression" {
            return false;
        }
        let Some(function) = node.child_by_field_name("function") else {
            return false;
        };
        let is_use = function.kind() == "member_expression"
            && function
                .child_by_field_name("property")
                .map(|p| node_text(source, p) == "use")
                .unwrap_or(false);
        is_use
            && node
                .child_by_field_name("arguments")
                .map(|a| self.analyzer.mentions_auth(node_text(source, a)))
                .unwrap_or(false)
    }

    /// Text analysed for a route: the inline handler, or the call itself when
    /// the handler is a reference defined elsewhere.
    fn handler_text<'s>(source: &'s str, call: Node, handler: Option<Node>) -> &'s str {
        match handler {
            Some(h) if matches!(h.kind(), "arrow_function" | "function_expression" | "function") => {
                node_text(source, h)
            }
            _ => node_text(source, call),
        }
    }
}

impl Default for ExpressAstExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for ExpressAstExtractor {
    fn name(&self) -> &'static str {
        "express-ast"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let parsed = AstParser::parse_source(file_path, content.to_string())?;
        let source = parsed.source.as_str();
        let mut result = ParseResult::new(Some(Framework::Express));

        let mut stack = vec![parsed.tree.root_node()];
        while let Some(node) = stack.pop() {
            if let Some(target) = Self::import_target(source, node) {
                if !result.imports.contains(&target) {
                    result.imports.push(target);
                }
            }
            if self.is_auth_use(source, node) {
                result.has_auth = true;
            }

            if node.kind() == "call_expression" {
                if let Some(call) = Self::route_call(source, node) {
                    let mut endpoint = Endpoint::new(call.method, &call.path);
                    let text = Self::handler_text(source, node, call.handler);
                    self.analyzer.analyze(text).apply_to(&mut endpoint);
                    if call
                        .middleware
                        .iter()
                        .any(|m| self.analyzer.mentions_auth(node_text(source, *m)))
                    {
                        endpoint.requires_auth = true;
                    }
                    endpoint.handler_name = call
                        .handler
                        .filter(|h| matches!(h.kind(), "identifier" | "member_expression"))
                        .map(|h| node_text(source, h).to_string());
                    result.push_endpoint(endpoint);
                }
            }

            // Reverse so the stack pops children in source order
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        if let Some(module) = result.foreign_server_import() {
            debug!("{}: imports {}, not an Express file", file_path.display(), module);
            return Ok(ParseResult::new(Some(Framework::Express)));
        }

        debug!(
            "{}: {} endpoints found in the syntax tree",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> ParseResult {
        ExpressAstExtractor::new()
            .parse(content, Path::new("routes/users.js"))
            .unwrap()
    }

    fn keys(result: &ParseResult) -> Vec<String> {
        result.endpoints.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_routes_and_imports() {
        let result = parse(
            r#"
import express from 'express';
const controller = require('../controllers/users');
const router = express.Router();

router.get('/users', controller.list);
router.post('/users', async (req, res) => {
  const { name, email } = req.body;
  if (!email) return res.status(400).json({ error: 'email' });
  res.status(201).json({ id: 1, name, email });
});
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/users", "POST:/users"]);
        assert_eq!(result.imports, vec!["express", "../controllers/users"]);
        assert_eq!(result.endpoints[0].handler_name.as_deref(), Some("controller.list"));

        let post = &result.endpoints[1];
        let body: Vec<&str> = post
            .request_body
            .as_ref()
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(body, vec!["name", "email"]);
        let statuses: Vec<u16> = post.responses.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![400, 201]);
        assert_eq!(post.responses[1].fields.len(), 3);
    }

    #[test]
    fn test_koa_router_file_is_left_to_koa() {
        let result = parse(
            "const Router = require('@koa/router');\nconst router = new Router();\nrouter.get('/tags', list);",
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_middleware_marks_auth() {
        let result = parse("router.delete('/users/:id', requireAuth, (req, res) => res.sendStatus(204));");
        let endpoint = &result.endpoints[0];
        assert_eq!(endpoint.path, "/users/{id}");
        assert!(endpoint.requires_auth);
        assert!(!result.has_auth);
    }

    #[test]
    fn test_use_auth_marks_file() {
        let result = parse("app.use(passport.authenticate('jwt'));\napp.get('/me', me);");
        assert!(result.has_auth);
    }

    #[test]
    fn test_route_chain() {
        let result = parse(
            "router.route('/books/:id').get(getBook).put(requireAuth, (req, res) => { req.body.title; });",
        );
        let mut found = keys(&result);
        found.sort();
        assert_eq!(found, vec!["GET:/books/{id}", "PUT:/books/{id}"]);
        let put = result.endpoints.iter().find(|e| e.method == HttpMethod::Put).unwrap();
        assert!(put.requires_auth);
        assert_eq!(put.request_body.as_ref().unwrap().fields[0].name, "title");
    }

    #[test]
    fn test_handlers_are_isolated() {
        let result = parse(
            r#"
router.post('/a', (req, res) => { const { alpha } = req.body; });
router.post('/b', (req, res) => { const { beta } = req.body; });
"#,
        );
        assert_eq!(result.endpoints[0].request_body.as_ref().unwrap().fields.len(), 1);
        assert_eq!(
            result.endpoints[1].request_body.as_ref().unwrap().fields[0].name,
            "beta"
        );
    }

    #[test]
    fn test_non_routes_are_ignored() {
        let result = parse("map.get('/x'); axios.get('/api'); cache.get(key); router.get(variablePath, h);");
        assert!(result.is_empty());
    }
}
