//! Base URL resolution for site-wide flushes.

use url::Url;

/// Scheme and host of the request currently being served by the host CMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    scheme: String,
    authority: String,
}

impl RequestOrigin {
    /// Parse the origin from any absolute http(s) URL; path and query are
    /// ignored. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let url = Url::parse(value).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Some(Self {
            scheme: url.scheme().to_string(),
            authority,
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }
}

/// Base URL a flush is sent to: the configured one, else the request host.
///
/// The result never ends in `/`. `None` means there is nowhere to send the
/// flush and it must be skipped.
pub fn resolve_base_url(configured: Option<String>, origin: Option<&RequestOrigin>) -> Option<String> {
    configured
        .or_else(|| origin.map(RequestOrigin::base_url))
        .map(|base| base.trim_end_matches('/').to_string())
        .filter(|base| !base.is_empty())
}
