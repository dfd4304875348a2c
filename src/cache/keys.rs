//! Cache key policy.
//!
//! A key is `cache:` followed by the normalized request path and, when present,
//! the normalized query string. Namespaces group keys by resource family so a
//! mutation can drop every derived view in one prefix sweep.

use std::fmt;

use axum::http::Method;
use url::form_urlencoded;

/// Prefix shared by every response-cache key.
pub const KEY_PREFIX: &str = "cache:";

/// Query parameter carrying the caller's visibility scope.
///
/// Always appended by the server; a client-supplied value is discarded.
pub const SCOPE_PARAM: &str = "__scope";

/// Fully derived response-cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for an unscoped request.
    pub fn derive(method: &Method, path: &str, query: Option<&str>) -> Self {
        Self::derive_scoped(method, path, query, None)
    }

    /// Derive the key for a request whose response depends on who asked.
    ///
    /// Non-GET methods are embedded after the prefix so they never share a key
    /// (or a namespace) with a cacheable read.
    pub fn derive_scoped(
        method: &Method,
        path: &str,
        query: Option<&str>,
        scope: Option<&str>,
    ) -> Self {
        let path = normalize_path(path);
        let query = normalize_query(query.unwrap_or(""), scope);

        let mut key = String::with_capacity(KEY_PREFIX.len() + path.len() + query.len() + 8);
        key.push_str(KEY_PREFIX);
        if *method != Method::GET {
            key.push_str(method.as_str());
            key.push(':');
        }
        key.push_str(&path);
        if !query.is_empty() {
            key.push('?');
            key.push_str(&query);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Collapse repeated slashes and drop a trailing slash (except for `/`).
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    normalized
}

/// Decode, sort by parameter name and re-encode a query string.
///
/// The sort is stable, so repeated parameters keep their relative order
/// (`a=1&a=2` and `a=2&a=1` stay distinct). Equivalent encodings such as
/// `%20` and `+` collapse to one form.
pub fn normalize_query(query: &str, scope: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(name, _)| name.as_str() != SCOPE_PARAM)
        .collect();

    if let Some(scope) = scope {
        pairs.push((SCOPE_PARAM.to_string(), scope.to_string()));
    }

    pairs.sort_by(|left, right| left.0.cmp(&right.0));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Resource families whose cached views are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Task lists, single tasks and dashboard statistics.
    Tasks,
    /// Team listings and everything else under `/api/users`.
    Users,
    /// Per-user notification feeds.
    Notifications,
}

impl CacheNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Users => "users",
            Self::Notifications => "notifications",
        }
    }

    /// Key prefixes covered by this namespace.
    pub fn prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Tasks => &["cache:/api/tasks"],
            Self::Users => &["cache:/api/users"],
            Self::Notifications => &["cache:/api/users/notifications"],
        }
    }

    pub fn contains(self, key: &CacheKey) -> bool {
        self.prefixes()
            .iter()
            .any(|prefix| key.as_str().starts_with(prefix))
    }
}
