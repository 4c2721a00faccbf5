/// Normalizes an absolute `http`/`https` URL to its scheme+host+port origin
/// (spec.md §3, GLOSSARY "Origin"). Returns `None` for anything else
/// (relative paths, non-http(s) schemes, unparseable strings) — callers
/// store `None` rather than guessing.
pub fn normalize_origin(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    if authority.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{authority}"))
}

/// True if `url` equals `origin` or is prefixed by `<origin>/` (spec.md
/// §4.1's origin-filter matching rule, reused by V1 query tools).
pub fn url_matches_origin(url: &str, origin: &str) -> bool {
    url == origin || url.starts_with(&format!("{origin}/"))
}
