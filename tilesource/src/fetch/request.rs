//! Request construction: transforms and URL normalization.

use std::fmt;

/// What a request is for. Passed to [`RequestTransform`] so callers can add
/// credentials or rewrite hosts per resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// TileJSON / source metadata
    Source,
    /// A single tile
    Tile,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Source => write!(f, "source"),
            ResourceKind::Tile => write!(f, "tile"),
        }
    }
}

/// A fetch request: URL plus extra headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Creates a request with no extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Rewrites a URL into the request actually sent.
///
/// Any `Fn(&str, ResourceKind) -> Request` closure is a transform.
pub trait RequestTransform: Send + Sync {
    fn transform(&self, url: &str, kind: ResourceKind) -> Request;
}

impl<F> RequestTransform for F
where
    F: Fn(&str, ResourceKind) -> Request + Send + Sync,
{
    fn transform(&self, url: &str, kind: ResourceKind) -> Request {
        self(url, kind)
    }
}

/// Transform that sends URLs unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl RequestTransform for IdentityTransform {
    fn transform(&self, url: &str, _kind: ResourceKind) -> Request {
        Request::new(url)
    }
}

/// Normalizes source and tile URLs before they are requested.
pub trait UrlNormalizer: Send + Sync {
    /// Normalizes a TileJSON URL.
    fn normalize_source_url(&self, url: &str) -> String {
        url.to_string()
    }

    /// Normalizes a tile URL template. `tile_size` lets hosted services pick
    /// a variant for 512px tiles.
    fn normalize_tile_url(&self, url: &str, _tile_size: u32) -> String {
        url.to_string()
    }
}

/// Normalizer that leaves URLs alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughNormalizer;

impl UrlNormalizer for PassthroughNormalizer {}

/// Appends an access token query parameter to every http(s) URL that does
/// not already carry one.
#[derive(Debug, Clone)]
pub struct AccessTokenNormalizer {
    param: String,
    token: String,
}

impl AccessTokenNormalizer {
    /// Uses the conventional `access_token` parameter name.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_param("access_token", token)
    }

    /// Uses a custom parameter name (e.g. `key`).
    pub fn with_param(param: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            token: token.into(),
        }
    }

    fn append(&self, url: &str) -> String {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return url.to_string();
        }
        let marker = format!("{}=", self.param);
        let has_param = url
            .split_once('?')
            .map(|(_, query)| query.split('&').any(|pair| pair.starts_with(&marker)))
            .unwrap_or(false);
        if has_param {
            return url.to_string();
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", url, separator, self.param, self.token)
    }
}

impl UrlNormalizer for AccessTokenNormalizer {
    fn normalize_source_url(&self, url: &str) -> String {
        self.append(url)
    }

    fn normalize_tile_url(&self, url: &str, _tile_size: u32) -> String {
        self.append(url)
    }
}
