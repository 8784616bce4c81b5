//! Path normalization into the canonical `{name}` parameter syntax.

use regex::Regex;
use std::sync::LazyLock;

static CATCH_ALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[?\.\.\.([A-Za-z_]\w*)\]\]?").expect("catch-all pattern"));
static BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z_]\w*)\]").expect("bracket pattern"));
static COLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[/.\-]):([A-Za-z_]\w*)(?:\([^)]*\))?\??").expect("colon pattern")
});
static BRACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_]\w*)[^}/]*\}").expect("brace pattern"));
static ANGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z_]\w*:)?([A-Za-z_]\w*)>").expect("angle pattern")
});
static CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_]\w*)\}").expect("canonical pattern"));

/// Rewrites every supported parameter syntax into `{name}`.
///
/// Handles `:id`, `:id?`, `:id(\\d+)`, `[id]`, `[...slug]`, `[[...slug]]`,
/// `{id?}`, `{id<\d+>}`, `{id:int}` and `<int:id>`. The result always starts
/// with `/` and never ends with one, except for the root path.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let path = CATCH_ALL.replace_all(trimmed, "{$1}");
    let path = BRACKET.replace_all(&path, "{$1}");
    let path = COLON.replace_all(&path, "${1}{${2}}");
    let path = BRACE.replace_all(&path, "{$1}");
    let path = ANGLE.replace_all(&path, "{$1}");

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parameter names of an already normalized path, in order of appearance.
pub fn path_parameters(path: &str) -> Vec<String> {
    CANONICAL
        .captures_iter(path)
        .map(|c| c[1].to_string())
        .collect()
}

/// Joins a route prefix and a path, handling slashes correctly.
pub fn join_paths(prefix: &str, path: &str) -> String {
    if prefix.trim_matches('/').is_empty() {
        return normalize_path(path);
    }

    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        normalize_path(prefix)
    } else {
        normalize_path(&format!("{}/{}", prefix, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_syntax_reaches_the_same_form() {
        let expected = "/users/{id}";
        for raw in [
            "/users/:id",
            "/users/:id?",
            "/users/:id(\\d+)",
            "/users/[id]",
            "/users/{id}",
            "/users/{id?}",
            "/users/{id<\\d+>}",
            "/users/{id:int}",
            "/users/<int:id>",
            "/users/<id>",
            "users/:id/",
        ] {
            assert_eq!(normalize_path(raw), expected, "input: {}", raw);
        }
    }

    #[test]
    fn test_catch_all_segments() {
        assert_eq!(normalize_path("/docs/[...slug]"), "/docs/{slug}");
        assert_eq!(normalize_path("/docs/[[...slug]]"), "/docs/{slug}");
    }

    #[test]
    fn test_multiple_parameters() {
        let path = normalize_path("/flights/:from-:to/seats/:seat");
        assert_eq!(path, "/flights/{from}-{to}/seats/{seat}");
        assert_eq!(path_parameters(&path), vec!["from", "to", "seat"]);
    }

    #[test]
    fn test_root_and_slashes() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("//api//users//"), "/api/users");
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("", "users/:id"), "/users/{id}");
        assert_eq!(join_paths("/api", ""), "/api");
        assert_eq!(join_paths("/", "/"), "/");
    }
}
