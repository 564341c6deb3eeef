//! Process-wide client configuration.
//!
//! # Design
//! `ClientConfig` is built once at startup and is read-only afterwards: its
//! fields are private and `ApiClient` holds it behind an `Arc`. The base URL
//! is picked from `BuildMode` at construction and never looked at again per
//! request.

use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

pub const DEVELOPMENT_BASE_URL: &str = "http://localhost:3000";
pub const PRODUCTION_BASE_URL: &str = "https://api.example.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable that overrides the compiled build mode.
pub const BUILD_MODE_ENV: &str = "API_BUILD_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// `API_BUILD_MODE` when set to a known value, otherwise the profile the
    /// binary was compiled with.
    pub fn detect() -> Self {
        Self::with_override(std::env::var(BUILD_MODE_ENV).ok().as_deref())
    }

    /// `value` when it names a known mode, otherwise the compiled profile.
    pub fn with_override(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_else(Self::compiled)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(BuildMode::Development),
            "production" | "prod" => Some(BuildMode::Production),
            _ => None,
        }
    }

    fn compiled() -> Self {
        if cfg!(debug_assertions) {
            BuildMode::Development
        } else {
            BuildMode::Production
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            BuildMode::Development => DEVELOPMENT_BASE_URL,
            BuildMode::Production => PRODUCTION_BASE_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    default_headers: HeaderMap,
    default_timeout: Duration,
}

impl ClientConfig {
    /// Config for `base_url` with a JSON content type and the default timeout.
    pub fn new(base_url: &str) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn for_mode(mode: BuildMode) -> Self {
        Self::new(mode.base_url())
    }

    pub fn from_env() -> Self {
        Self::for_mode(BuildMode::detect())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Join a base-relative `url` onto the base URL. Absolute URLs are kept.
    pub fn resolve_url(&self, url: &str) -> String {
        if is_absolute(url) {
            return url.to_string();
        }
        let path = url.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Defaults overlaid by `headers`; a name present in `headers` replaces
    /// every default value for it.
    pub fn merge_headers(&self, headers: HeaderMap) -> HeaderMap {
        let mut merged = self.default_headers.clone();
        merged.extend(headers);
        merged
    }
}

fn is_absolute(url: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        url.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

#[cfg(test)]
mod tests {
    use http::header::ACCEPT;

    use super::*;

    #[test]
    fn mode_selects_endpoint() {
        let dev = ClientConfig::for_mode(BuildMode::Development);
        assert_eq!(dev.base_url(), DEVELOPMENT_BASE_URL);
        let prod = ClientConfig::for_mode(BuildMode::Production);
        assert_eq!(prod.base_url(), PRODUCTION_BASE_URL);
    }

    #[test]
    fn parse_accepts_short_and_long_names() {
        assert_eq!(BuildMode::parse("Production"), Some(BuildMode::Production));
        assert_eq!(BuildMode::parse(" dev "), Some(BuildMode::Development));
        assert_eq!(BuildMode::parse("staging"), None);
    }

    #[test]
    fn override_wins_over_compiled_mode() {
        assert_eq!(BuildMode::with_override(Some("production")), BuildMode::Production);
        assert_eq!(BuildMode::with_override(Some("dev")), BuildMode::Development);
        assert_eq!(BuildMode::with_override(Some("staging")), BuildMode::compiled());
        assert_eq!(BuildMode::with_override(None), BuildMode::compiled());
    }

    #[test]
    fn defaults_include_json_content_type() {
        let config = ClientConfig::new("http://localhost:3000");
        assert_eq!(config.default_headers()[CONTENT_TYPE], "application/json");
        assert_eq!(config.default_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ClientConfig::new("http://localhost:3000/");
        assert_eq!(config.resolve_url("/items"), "http://localhost:3000/items");
        assert_eq!(config.resolve_url("items"), "http://localhost:3000/items");
        assert_eq!(config.resolve_url(""), "http://localhost:3000");
    }

    #[test]
    fn absolute_urls_are_not_rebased() {
        let config = ClientConfig::new("http://localhost:3000");
        assert_eq!(config.resolve_url("https://cdn.example.com/a"), "https://cdn.example.com/a");
        assert_eq!(config.resolve_url("HTTPS://cdn.example.com/a"), "HTTPS://cdn.example.com/a");
        assert_eq!(config.resolve_url("Http://other:8080"), "Http://other:8080");
    }

    #[test]
    fn per_call_headers_win() {
        let config = ClientConfig::new("http://localhost:3000")
            .with_header(ACCEPT, HeaderValue::from_static("application/json"));
        let mut call = HeaderMap::new();
        call.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let merged = config.merge_headers(call);
        assert_eq!(merged[CONTENT_TYPE], "text/plain");
        assert_eq!(merged.get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(merged[ACCEPT], "application/json");
    }
}
