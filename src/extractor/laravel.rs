use super::context::{block_after, matching_delimiter};
use super::path::join_paths;
use super::{
    pattern, BodyField, Endpoint, EndpointExtractor, HttpMethod, Parameter, ParseResult,
    ResponseInfo, SecurityStyle,
};
use crate::detector::Framework;
use crate::field_types::{infer_field_type, FieldType};
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// Laravel route and controller extractor
///
/// Route files (`Route::get(...)`, resources, groups) and controller classes
/// are both understood. Controllers map their public methods through the
/// resource naming convention:
///
/// | Method  | Verb   | Path             |
/// |---------|--------|------------------|
/// | index   | GET    | `/r`             |
/// | create  | GET    | `/r/create`      |
/// | store   | POST   | `/r`             |
/// | show    | GET    | `/r/{id}`        |
/// | edit    | GET    | `/r/{id}/edit`   |
/// | update  | PUT    | `/r/{id}`        |
/// | destroy | DELETE | `/r/{id}`        |
pub struct LaravelExtractor {
    verb_route: Regex,
    match_route: Regex,
    resource_route: Regex,
    chain_group: Regex,
    array_group: Regex,
    prefix_call: Regex,
    middleware_call: Regex,
    prefix_key: Regex,
    middleware_key: Regex,
    handler_array: Regex,
    handler_string: Regex,
    only_except: Regex,
    controller_class: Regex,
    public_method: Regex,
    model_import: Regex,
    rule_entry: Regex,
    request_input: Regex,
    status_code: Regex,
    abort: Regex,
    json_array: Regex,
    constructor_auth: Regex,
}

/// Convention table: `(method name, verb, path suffix)`
const RESOURCE_ACTIONS: [(&str, HttpMethod, &str); 7] = [
    ("index", HttpMethod::Get, ""),
    ("create", HttpMethod::Get, "/create"),
    ("store", HttpMethod::Post, ""),
    ("show", HttpMethod::Get, "/{id}"),
    ("edit", HttpMethod::Get, "/{id}/edit"),
    ("update", HttpMethod::Put, "/{id}"),
    ("destroy", HttpMethod::Delete, "/{id}"),
];

/// Actions registered by `Route::apiResource`
const API_RESOURCE_ACTIONS: [&str; 5] = ["index", "store", "show", "update", "destroy"];

/// A `Route::group` / `->group()` body and what it applies to its routes.
struct GroupScope {
    open: usize,
    close: usize,
    prefix: String,
    auth: bool,
}

impl LaravelExtractor {
    pub fn new() -> Self {
        Self {
            verb_route: pattern(
                r#"Route::(?:\w+\([^;{}()]*\)->)*(get|post|put|patch|delete|options|any)\(\s*['"]([^'"]*)['"]"#,
            ),
            match_route: pattern(r#"Route::match\(\s*\[([^\]]*)\]\s*,\s*['"]([^'"]*)['"]"#),
            resource_route: pattern(
                r#"Route::(resource|apiResource)\(\s*['"]([^'"]+)['"]\s*,\s*([\w\\]+)"#,
            ),
            chain_group: pattern(
                r"(?s)Route::((?:prefix|middleware|name|controller|namespace|domain)\s*\([^;{]*?)->group\s*\(",
            ),
            array_group: pattern(r"(?s)Route::group\(\s*\[(.*?)\]\s*,\s*(?:static\s+)?function"),
            prefix_call: pattern(r#"prefix\(\s*['"]([^'"]*)['"]"#),
            middleware_call: pattern(r"middleware\(([^)]*)\)"),
            prefix_key: pattern(r#"['"]prefix['"]\s*=>\s*['"]([^'"]*)['"]"#),
            middleware_key: pattern(r#"['"]middleware['"]\s*=>\s*(\[[^\]]*\]|['"][^'"]*['"])"#),
            handler_array: pattern(r#"\[\s*([\w\\]+)::class\s*,\s*['"](\w+)['"]\s*\]"#),
            handler_string: pattern(r#"['"]([\w\\]+@\w+)['"]"#),
            only_except: pattern(r"->(only|except)\(\s*\[([^\]]*)\]"),
            controller_class: pattern(r"class\s+(\w+?)Controller\b"),
            public_method: pattern(r"public\s+function\s+(\w+)\s*\("),
            model_import: pattern(r"use\s+App\\Models\\(\w+)\s*;"),
            rule_entry: pattern(
                r#"['"]([\w.*]+)['"]\s*=>\s*(\[[^\]]*\]|['"][^'"]*['"]|[\w:]+(?:::class)?)"#,
            ),
            request_input: pattern(r#"\$request->(?:input|get|post|query)\(\s*['"](\w+)['"]"#),
            status_code: pattern(r"(?:json|response)\([^;]*?,\s*(\d{3})\s*[,)]"),
            abort: pattern(r"\babort(?:_if|_unless)?\((?:[^,()]*,\s*)?(\d{3})"),
            json_array: pattern(r"->json\(\s*\["),
            constructor_auth: pattern(r#"\$this->middleware\(\s*['"]auth"#),
        }
    }

    /// Routes declared through the `Route` facade.
    fn parse_route_table(&self, content: &str, result: &mut ParseResult) {
        let groups = self.group_scopes(content);

        for caps in self.verb_route.captures_iter(content) {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let methods = if &caps[1] == "any" {
                vec![
                    HttpMethod::Get,
                    HttpMethod::Post,
                    HttpMethod::Put,
                    HttpMethod::Patch,
                    HttpMethod::Delete,
                ]
            } else {
                HttpMethod::parse(&caps[1]).into_iter().collect()
            };
            self.push_declared(content, result, &groups, start, &methods, &caps[2]);
        }

        for caps in self.match_route.captures_iter(content) {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let methods: Vec<HttpMethod> = caps[1]
                .split(',')
                .filter_map(|m| HttpMethod::parse(m.trim().trim_matches(|c| c == '\'' || c == '"')))
                .collect();
            self.push_declared(content, result, &groups, start, &methods, &caps[2]);
        }

        for caps in self.resource_route.captures_iter(content) {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let statement = statement_at(content, start);
            let (prefix, group_auth) = Self::scope_for(&groups, start);
            let auth = group_auth || self.statement_requires_auth(statement);
            let base = join_paths(&prefix, &caps[2].replace('.', "/{id}/"));
            let controller = caps[3].rsplit('\\').next().unwrap_or(&caps[3]).to_string();

            let mut actions: Vec<&str> = if &caps[1] == "apiResource" {
                API_RESOURCE_ACTIONS.to_vec()
            } else {
                RESOURCE_ACTIONS.iter().map(|(name, _, _)| *name).collect()
            };
            if let Some(filter) = self.only_except.captures(statement) {
                let listed = quoted_items(&filter[2]);
                let keep_listed = &filter[1] == "only";
                actions.retain(|a| listed.iter().any(|l| l == a) == keep_listed);
            }

            for (name, method, suffix) in RESOURCE_ACTIONS {
                if !actions.contains(&name) {
                    continue;
                }
                let mut endpoint = Endpoint::new(method, &format!("{}{}", base, suffix));
                endpoint.requires_auth = auth;
                endpoint.handler_name = Some(format!("{}@{}", controller, name));
                result.push_endpoint(endpoint);
            }
        }
    }

    fn push_declared(
        &self,
        content: &str,
        result: &mut ParseResult,
        groups: &[GroupScope],
        start: usize,
        methods: &[HttpMethod],
        path: &str,
    ) {
        let statement = statement_at(content, start);
        let (prefix, group_auth) = Self::scope_for(groups, start);
        let auth = group_auth || self.statement_requires_auth(statement);
        let handler = self
            .handler_array
            .captures(statement)
            .map(|c| format!("{}@{}", c[1].rsplit('\\').next().unwrap_or(&c[1]), &c[2]))
            .or_else(|| self.handler_string.captures(statement).map(|c| c[1].to_string()));

        for method in methods {
            let mut endpoint = Endpoint::new(*method, &join_paths(&prefix, path));
            endpoint.requires_auth = auth;
            endpoint.handler_name = handler.clone();
            result.push_endpoint(endpoint);
        }
    }

    fn statement_requires_auth(&self, statement: &str) -> bool {
        self.middleware_call
            .captures_iter(statement)
            .any(|c| c[1].contains("auth"))
    }

    /// Route group bodies with their prefix and middleware.
    fn group_scopes(&self, content: &str) -> Vec<GroupScope> {
        let mut scopes = Vec::new();

        for caps in self.chain_group.captures_iter(content) {
            let chain = &caps[1];
            let prefix = self
                .prefix_call
                .captures(chain)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            let auth = self.statement_requires_auth(chain);
            let from = caps.get(0).map(|m| m.end()).unwrap_or(0);
            if let Some((open, close)) = group_body(content, from) {
                scopes.push(GroupScope {
                    open,
                    close,
                    prefix,
                    auth,
                });
            }
        }

        for caps in self.array_group.captures_iter(content) {
            let options = &caps[1];
            let prefix = self
                .prefix_key
                .captures(options)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            let auth = self
                .middleware_key
                .captures(options)
                .map(|c| c[1].contains("auth"))
                .unwrap_or(false);
            let from = caps.get(0).map(|m| m.end()).unwrap_or(0);
            if let Some((open, close)) = block_after(content, from) {
                scopes.push(GroupScope {
                    open,
                    close,
                    prefix,
                    auth,
                });
            }
        }

        scopes.sort_by_key(|s| s.open);
        scopes
    }

    /// Accumulated prefix and auth of every group enclosing `position`.
    fn scope_for(groups: &[GroupScope], position: usize) -> (String, bool) {
        let mut prefix = String::new();
        let mut auth = false;
        for group in groups
            .iter()
            .filter(|g| g.open < position && position < g.close)
        {
            prefix = join_paths(&prefix, &group.prefix);
            auth |= group.auth;
        }
        (prefix, auth)
    }

    /// Endpoints inferred from a controller's public methods.
    fn parse_controller(&self, content: &str, stem: &str, result: &mut ParseResult) {
        let resource = resource_name(stem);
        let base = format!("/{}", resource);
        let model = self.related_model(content, stem);
        if self.constructor_auth.is_match(content) {
            result.has_auth = true;
        }

        for caps in self.public_method.captures_iter(content) {
            let name = &caps[1];
            let Some((_, method, suffix)) = RESOURCE_ACTIONS.iter().find(|(n, _, _)| *n == name)
            else {
                continue;
            };
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let body = block_after(content, start)
                .and_then(|(open, close)| content.get(open..=close))
                .unwrap_or("");

            let mut endpoint = Endpoint::new(*method, &format!("{}{}", base, suffix));
            endpoint.handler_name = Some(format!("{}Controller@{}", stem, name));
            self.analyze_method_body(body, &mut endpoint);
            if let (Some(request), Some(model)) = (endpoint.request_body.as_mut(), model.as_ref()) {
                request.schema_name = Some(model.clone());
            }
            result.push_endpoint(endpoint);
        }
    }

    /// Validation rules, request inputs, statuses and JSON payloads of one method.
    fn analyze_method_body(&self, body: &str, endpoint: &mut Endpoint) {
        let reads_body = !matches!(endpoint.method, HttpMethod::Get | HttpMethod::Head);

        if reads_body {
            endpoint.add_body_fields(self.validation_fields(body));
        }
        for caps in self.request_input.captures_iter(body) {
            if reads_body {
                endpoint.add_body_fields(vec![BodyField::new(&caps[1])]);
            } else {
                endpoint.add_parameter(Parameter::query(&caps[1]));
            }
        }

        for caps in self.status_code.captures_iter(body).chain(self.abort.captures_iter(body)) {
            if let Ok(status) = caps[1].parse::<u16>() {
                endpoint.add_response(ResponseInfo::new(status));
            }
        }
        if body.contains("findOrFail(") {
            endpoint.add_response(ResponseInfo::new(404));
        }

        let payload = self
            .json_array
            .find_iter(body)
            .last()
            .and_then(|m| {
                let open = m.end() - 1;
                let close = matching_delimiter(body, open)?;
                body.get(open + 1..close)
            })
            .map(php_array_keys)
            .unwrap_or_default();
        if !payload.is_empty() {
            let status = endpoint
                .responses
                .iter()
                .map(|r| r.status)
                .find(|s| (200..300).contains(s))
                .unwrap_or(if endpoint.method == HttpMethod::Post { 201 } else { 200 });
            endpoint.add_response(ResponseInfo {
                status,
                fields: payload.iter().map(|k| BodyField::new(k)).collect(),
            });
        }
    }

    /// Fields of `$request->validate([...])` / `Validator::make(..., [...])` rule arrays.
    fn validation_fields(&self, body: &str) -> Vec<BodyField> {
        let mut rules_text = Vec::new();
        for marker in ["->validate(", "Validator::make("] {
            let mut from = 0;
            while let Some(offset) = body.get(from..).and_then(|rest| rest.find(marker)) {
                let call = from + offset + marker.len();
                // Validator::make takes the data first
                let search_from = if marker.starts_with("Validator") {
                    body.get(call..)
                        .and_then(|rest| rest.find(','))
                        .map(|comma| call + comma)
                        .unwrap_or(call)
                } else {
                    call
                };
                if let Some(open) = body.get(search_from..).and_then(|rest| rest.find('[')) {
                    let open = search_from + open;
                    if let Some(close) = matching_delimiter(body, open) {
                        if let Some(text) = body.get(open + 1..close) {
                            rules_text.push(text);
                        }
                    }
                }
                from = call;
            }
        }

        let mut fields: Vec<BodyField> = Vec::new();
        for text in rules_text {
            for caps in self.rule_entry.captures_iter(text) {
                let name = &caps[1];
                if name.contains('.') || fields.iter().any(|f| f.name == name) {
                    continue;
                }
                let (field_type, required) = rule_type(name, &caps[2]);
                fields.push(BodyField::typed(name, field_type, required));
            }
        }
        fields
    }

    /// Model imported through `use App\Models\X;`, preferring the controller's own.
    fn related_model(&self, content: &str, stem: &str) -> Option<String> {
        let models: Vec<String> = self
            .model_import
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();
        models
            .iter()
            .find(|m| m.as_str() == stem)
            .or_else(|| models.first())
            .cloned()
    }
}

impl Default for LaravelExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for LaravelExtractor {
    fn name(&self) -> &'static str {
        "laravel"
    }

    fn security_style(&self) -> SecurityStyle {
        SecurityStyle::Cookie
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::Laravel));
        let normalized = file_path.to_string_lossy().replace('\\', "/");
        result.mount_path = Some(if normalized.ends_with("routes/api.php") {
            "/api".to_string()
        } else {
            "/".to_string()
        });

        if content.contains("Route::") {
            self.parse_route_table(content, &mut result);
        }
        if let Some(caps) = self.controller_class.captures(content) {
            self.parse_controller(content, &caps[1], &mut result);
        }

        debug!(
            "{}: {} Laravel endpoints",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

/// Text from `start` up to the end of its statement.
fn statement_at(content: &str, start: usize) -> &str {
    let rest = content.get(start..).unwrap_or("");
    let end = rest.find(';').map(|i| i + 1).unwrap_or(rest.len());
    &rest[..end]
}

/// Body of the closure passed to `->group(`.
fn group_body(content: &str, from: usize) -> Option<(usize, usize)> {
    let function = from + content.get(from..)?.find("function")?;
    block_after(content, function)
}

fn quoted_items(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Type and requiredness from a rule string or rule array.
fn rule_type(name: &str, rules: &str) -> (FieldType, bool) {
    let tokens: Vec<String> = rules
        .split(|c: char| matches!(c, '|' | ',' | '[' | ']' | '\'' | '"') || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.split(':').next().unwrap_or("").to_lowercase())
        .collect();
    let has = |rule: &str| tokens.iter().any(|t| t == rule);

    let field_type = if has("integer") || has("int") {
        FieldType::Integer
    } else if has("numeric") || has("decimal") {
        FieldType::Number
    } else if has("boolean") || has("bool") || has("accepted") {
        FieldType::Boolean
    } else if has("array") {
        FieldType::Array
    } else if has("email") || has("date") || has("string") {
        FieldType::String
    } else {
        infer_field_type(name)
    };
    (field_type, has("required"))
}

/// Keys of a PHP array literal body such as `'id' => $x, "name" => $y`.
pub(super) fn php_array_keys(body: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in body.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            ',' if depth == 0 => {
                keys.extend(array_key(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    keys.extend(array_key(&current));
    keys
}

fn array_key(entry: &str) -> Option<String> {
    let (key, _) = entry.split_once("=>")?;
    let key = key.trim().trim_matches(|c| c == '\'' || c == '"');
    (!key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .then(|| key.to_string())
}

/// `UserProfile` -> `user-profiles`
pub fn resource_name(stem: &str) -> String {
    let mut kebab = String::new();
    for (i, c) in stem.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            kebab.push('-');
        }
        kebab.push(c.to_ascii_lowercase());
    }
    pluralize(&kebab)
}

fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let consonant_y = word.ends_with('y')
        && !word
            .chars()
            .rev()
            .nth(1)
            .map(|c| "aeiou".contains(c))
            .unwrap_or(false);
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str, path: &str) -> ParseResult {
        LaravelExtractor::new().parse(content, Path::new(path)).unwrap()
    }

    fn keys(result: &ParseResult) -> Vec<String> {
        result.endpoints.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_controller_convention() {
        let content = r#"<?php
namespace App\Http\Controllers;

use App\Models\Post;
use Illuminate\Http\Request;

class PostController extends Controller
{
    public function index()
    {
        return Post::all();
    }

    public function store(Request $request)
    {
        $validated = $request->validate([
            'title' => 'required|string|max:255',
            'views' => 'integer',
            'tags' => ['array'],
            'published' => 'boolean',
        ]);
        return response()->json(['id' => $post->id, 'title' => $post->title], 201);
    }

    public function destroy($id)
    {
        Post::findOrFail($id)->delete();
        return response()->json(null, 204);
    }

    private function helper() {}
}
"#;
        let result = parse(content, "app/Http/Controllers/PostController.php");
        assert_eq!(keys(&result), vec!["GET:/posts", "POST:/posts", "DELETE:/posts/{id}"]);

        let destroy = &result.endpoints[2];
        assert!(destroy.parameters[0].required);
        assert!(destroy.responses.iter().any(|r| r.status == 404));

        let store = &result.endpoints[1];
        let body = store.request_body.as_ref().unwrap();
        assert_eq!(body.schema_name.as_deref(), Some("Post"));
        let typed: Vec<(&str, FieldType, bool)> = body
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.field_type, f.required))
            .collect();
        assert_eq!(
            typed,
            vec![
                ("title", FieldType::String, true),
                ("views", FieldType::Integer, false),
                ("tags", FieldType::Array, false),
                ("published", FieldType::Boolean, false),
            ]
        );
        let created = store.responses.iter().find(|r| r.status == 201).unwrap();
        assert_eq!(created.fields.len(), 2);
    }

    #[test]
    fn test_route_table_with_groups() {
        let content = r#"<?php
use Illuminate\Support\Facades\Route;

Route::get('/status', [StatusController::class, 'show']);
Route::match(['get', 'post'], '/search', 'SearchController@run');

Route::prefix('admin')->middleware('auth:sanctum')->group(function () {
    Route::get('/users/{user}', [UserController::class, 'show']);
    Route::group(['prefix' => 'reports'], function () {
        Route::delete('/{id?}', [ReportController::class, 'destroy']);
    });
});
"#;
        let result = parse(content, "routes/web.php");
        assert_eq!(
            keys(&result),
            vec![
                "GET:/status",
                "GET:/admin/users/{user}",
                "DELETE:/admin/reports/{id}",
                "GET:/search",
                "POST:/search",
            ]
        );
        assert!(!result.endpoints[0].requires_auth);
        assert!(result.endpoints[1].requires_auth);
        assert!(result.endpoints[2].requires_auth);
        assert_eq!(result.endpoints[0].handler_name.as_deref(), Some("StatusController@show"));
        assert_eq!(result.endpoints[3].handler_name.as_deref(), Some("SearchController@run"));
        assert_eq!(result.mount_path.as_deref(), Some("/"));
    }

    #[test]
    fn test_resource_registration() {
        let content = r#"
Route::resource('photos', PhotoController::class);
Route::apiResource('comments', CommentController::class)->middleware('auth');
Route::resource('tags', TagController::class)->only(['index', 'show']);
"#;
        let result = parse(content, "routes/api.php");
        let photos = keys(&result)
            .into_iter()
            .filter(|k| k.contains("/photos"))
            .count();
        assert_eq!(photos, 7);
        let comments: Vec<_> = result
            .endpoints
            .iter()
            .filter(|e| e.path.starts_with("/comments"))
            .collect();
        assert_eq!(comments.len(), 5);
        assert!(comments.iter().all(|e| e.requires_auth));
        assert!(!comments.iter().any(|e| e.path.ends_with("/create")));
        let tags: Vec<String> = keys(&result).into_iter().filter(|k| k.contains("/tags")).collect();
        assert_eq!(tags, vec!["GET:/tags", "GET:/tags/{id}"]);
        assert_eq!(result.mount_path.as_deref(), Some("/api"));
    }

    #[test]
    fn test_chained_middleware_route() {
        let result = parse(
            "Route::middleware(['auth', 'verified'])->get('/profile', [ProfileController::class, 'edit']);",
            "routes/web.php",
        );
        assert_eq!(keys(&result), vec!["GET:/profile"]);
        assert!(result.endpoints[0].requires_auth);
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(resource_name("User"), "users");
        assert_eq!(resource_name("UserProfile"), "user-profiles");
        assert_eq!(resource_name("Category"), "categories");
        assert_eq!(resource_name("Address"), "addresses");
        assert_eq!(resource_name("Day"), "days");
    }

    #[test]
    fn test_php_array_keys() {
        assert_eq!(
            php_array_keys("'id' => $u->id, \"name\" => $u->name, 'meta' => ['a' => 1], $x"),
            vec!["id", "name", "meta"]
        );
    }

    #[test]
    fn test_cookie_security() {
        assert_eq!(LaravelExtractor::new().security_style(), SecurityStyle::Cookie);
    }
}
