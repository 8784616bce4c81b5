use super::context::{call_end, neighbour_window, ContextAnalyzer, KOA_IDIOM};
use super::path::join_paths;
use super::{pattern, Endpoint, EndpointExtractor, HttpMethod, ParseResult};
use crate::config::ContextWindow;
use crate::detector::Framework;
use crate::triage::CLIENT_RECEIVERS;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// koa-router extractor
///
/// Finds `router.<verb>([name,] '/path', ...middleware, handler)` calls and
/// applies the router prefix given to `new Router({ prefix })` or
/// `router.prefix('/p')`, plus the paths of `parent.use('/p', router.routes())`
/// mounts declared in the same file.
pub struct KoaExtractor {
    window: ContextWindow,
    verb_call: Regex,
    constructor_prefix: Regex,
    prefix_call: Regex,
    mount_call: Regex,
    use_call: Regex,
    analyzer: ContextAnalyzer,
}

/// Nested mounts deeper than this are treated as unmounted.
const MAX_MOUNT_DEPTH: usize = 8;

/// Prefixes of the routers declared in one file.
#[derive(Debug, Default)]
struct RouterPrefixes {
    /// Own prefix per router variable
    own: HashMap<String, String>,
    /// `parent.use('/path', child.routes())`: child -> (parent, path)
    mounts: HashMap<String, (String, String)>,
}

impl RouterPrefixes {
    /// Full prefix of the routes declared on `router`, including every
    /// parent it is mounted under.
    fn resolve(&self, router: &str) -> String {
        self.resolve_at(router, 0)
    }

    fn resolve_at(&self, router: &str, depth: usize) -> String {
        let own = self.own.get(router).map(String::as_str).unwrap_or("");
        match self.mounts.get(router) {
            Some((parent, path)) if depth < MAX_MOUNT_DEPTH => {
                let base = join_paths(&self.resolve_at(parent, depth + 1), path);
                join_paths(&base, own)
            }
            _ => own.to_string(),
        }
    }
}

impl KoaExtractor {
    pub fn new(window: ContextWindow) -> Self {
        Self {
            window,
            verb_call: pattern(
                r#"\b([A-Za-z_$][\w$]*)\.(get|post|put|delete|del|patch|options|head)\(\s*(?:['"][\w.-]+['"]\s*,\s*)?['"`](/[^'"`]*)['"`]"#,
            ),
            constructor_prefix: pattern(
                r#"(?m)(?:(?:^|[^\w$.])([A-Za-z_$][\w$]*)\s*=\s*)?new\s+(?:Koa)?Router\(\s*\{[^}]*\bprefix\s*:\s*['"]([^'"]+)['"]"#,
            ),
            prefix_call: pattern(r#"\b([A-Za-z_$][\w$]*)\.prefix\(\s*['"]([^'"]+)['"]\s*\)"#),
            mount_call: pattern(
                r#"\b([A-Za-z_$][\w$]*)\.use\(\s*['"`](/[^'"`]*)['"`]\s*,\s*([A-Za-z_$][\w$]*)\.routes\(\)"#,
            ),
            use_call: pattern(r"\.use\(([^)]*)\)"),
            analyzer: ContextAnalyzer::new(KOA_IDIOM),
        }
    }

    fn router_prefixes(&self, content: &str) -> RouterPrefixes {
        let mut prefixes = RouterPrefixes::default();
        // `module.exports = new Router({ prefix })` has no variable to attach to
        let mut anonymous = None;
        for caps in self
            .constructor_prefix
            .captures_iter(content)
            .chain(self.prefix_call.captures_iter(content))
        {
            match caps.get(1) {
                Some(name) => {
                    prefixes
                        .own
                        .entry(name.as_str().to_string())
                        .or_insert_with(|| caps[2].to_string());
                }
                None => anonymous = anonymous.or_else(|| Some(caps[2].to_string())),
            }
        }
        for caps in self.mount_call.captures_iter(content) {
            if caps[1] == caps[3] {
                continue;
            }
            prefixes
                .mounts
                .insert(caps[3].to_string(), (caps[1].to_string(), caps[2].to_string()));
        }
        if let (Some(prefix), true) = (anonymous, prefixes.own.is_empty()) {
            prefixes.own.insert(String::new(), prefix);
        }
        prefixes
    }
}

impl EndpointExtractor for KoaExtractor {
    fn name(&self) -> &'static str {
        "koa"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::Koa));
        result.has_auth = self
            .use_call
            .captures_iter(content)
            .any(|c| self.analyzer.mentions_auth(&c[1]));
        let prefixes = self.router_prefixes(content);
        let anonymous = prefixes.own.get("").cloned();

        let declarations: Vec<(HttpMethod, String, usize, usize)> = self
            .verb_call
            .captures_iter(content)
            .filter(|c| !CLIENT_RECEIVERS.contains(&&c[1]))
            .filter_map(|c| {
                let start = c.get(0)?.start();
                let prefix = match &anonymous {
                    Some(prefix) => prefix.clone(),
                    None => prefixes.resolve(&c[1]),
                };
                Some((
                    HttpMethod::parse(&c[2])?,
                    join_paths(&prefix, &c[3]),
                    start,
                    call_end(content, start),
                ))
            })
            .collect();
        let spans: Vec<(usize, usize)> = declarations.iter().map(|d| (d.2, d.3)).collect();

        for (index, (method, path, _, _)) in declarations.iter().enumerate() {
            let mut endpoint = Endpoint::new(*method, path);
            let text = neighbour_window(content, &spans, index, self.window);
            self.analyzer.analyze(text).apply_to(&mut endpoint);
            result.push_endpoint(endpoint);
        }

        debug!(
            "{}: {} Koa endpoints",
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
        KoaExtractor::new(ContextWindow::default())
            .parse(content, Path::new("src/routes/articles.js"))
            .unwrap()
    }

    #[test]
    fn test_prefixed_router() {
        let result = parse(
            r#"
const Router = require('@koa/router');
const router = new Router({ prefix: '/articles' });

router.get('/', async (ctx) => {
  const { page } = ctx.query;
  ctx.body = { items, page };
});

router.post('create-article', '/', jwtAuth, async (ctx) => {
  const { title, body } = ctx.request.body;
  ctx.status = 201;
  ctx.body = { id, title };
});

router.del('/:slug', async (ctx) => {
  ctx.throw(404);
});
"#,
        );
        let keys: Vec<String> = result.endpoints.iter().map(|e| e.key()).collect();
        assert_eq!(
            keys,
            vec!["GET:/articles", "POST:/articles", "DELETE:/articles/{slug}"]
        );

        let get = &result.endpoints[0];
        assert_eq!(get.parameters[0].name, "page");
        assert!(!get.requires_auth);

        let post = &result.endpoints[1];
        assert!(post.requires_auth);
        assert_eq!(post.request_body.as_ref().unwrap().fields.len(), 2);
        assert_eq!(post.responses[0].status, 201);
        assert_eq!(post.responses[0].fields.len(), 2);

        let delete = &result.endpoints[2];
        assert!(delete.responses.iter().any(|r| r.status == 404));
    }

    #[test]
    fn test_router_use_auth() {
        let result = parse("router.use(authenticate());\nrouter.get('/me', (ctx) => { ctx.body = { id }; });");
        assert!(result.has_auth);
    }

    #[test]
    fn test_nested_router_mounts() {
        let result = parse(
            r#"
const api = new Router({ prefix: '/api' });
const users = new Router();
const admin = new Router();
admin.prefix('/admin');

users.get('/', listUsers);
users.get('/:id', getUser);
admin.delete('/users/:id', removeUser);
api.get('/health', (ctx) => { ctx.body = { ok: true }; });

users.use('/reports', admin.routes());
api.use('/v1/users', users.routes(), users.allowedMethods());
app.use(api.routes());
"#,
        );
        let keys: Vec<String> = result.endpoints.iter().map(|e| e.key()).collect();
        assert_eq!(
            keys,
            vec![
                "GET:/api/v1/users",
                "GET:/api/v1/users/{id}",
                "DELETE:/api/v1/users/reports/admin/users/{id}",
                "GET:/api/health",
            ]
        );
    }

    #[test]
    fn test_exported_router_prefix_applies_to_file() {
        let result = parse("module.exports = new Router({ prefix: '/tags' });\nrouter.get('/', list);");
        assert_eq!(result.endpoints[0].path, "/tags");
    }

    #[test]
    fn test_mount_cycle_stops() {
        let result = parse(
            "a.use('/x', b.routes());\nb.use('/y', a.routes());\na.get('/ping', ping);",
        );
        assert_eq!(result.endpoints.len(), 1);
        assert!(result.endpoints[0].path.ends_with("/ping"));
    }
}
