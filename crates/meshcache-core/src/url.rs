//! URL parsing — splits an absolute `http://` URL into domain and resource.
//!
//! Deliberately narrow: only the `http` scheme, no query strings or
//! fragments. Callers retry with an `http://` prefix before declaring a
//! URL invalid, so bare `domain/path` inputs are handled one level up.

/// The components of a valid URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Host part, possibly carrying an explicit `:port` suffix.
    pub domain: String,
    /// Path part, always starting with `/`. Defaults to `/`.
    pub resource: String,
}

/// Parse `raw` as an absolute http URL. Returns None if invalid.
pub fn parse(raw: &str) -> Option<ParsedUrl> {
    let rest = raw.strip_prefix("http://")?;

    let (domain, resource) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    if domain.is_empty() || domain.contains(['?', '#']) {
        return None;
    }
    // Query strings and fragments are outside the grammar.
    if resource.contains(['?', '#']) {
        return None;
    }

    Some(ParsedUrl {
        domain: domain.to_string(),
        resource: resource.to_string(),
    })
}
