//! Page cache entries and the remote locators derived from them.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use url::Url;

use super::error::DomainError;

/// Longest identifier or tag the database backend accepts.
pub const MAX_KEY_LEN: usize = 250;

const PAGE_TAG_PREFIX: &str = "pageId_";

/// One cached page.
///
/// The payload of the page cache is the public URL the page was rendered
/// for, so the payload doubles as the remote locator that must be purged at
/// the proxy when the entry is invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub identifier: String,
    pub locator: String,
    pub tags: Vec<String>,
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    /// Build a validated entry. Duplicate tags are collapsed.
    pub fn new(
        identifier: impl Into<String>,
        locator: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
        expires_at: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;

        let locator = locator.into();
        validate_locator(&locator)?;

        let mut unique = BTreeSet::new();
        for tag in tags {
            validate_tag(&tag)?;
            unique.insert(tag);
        }

        Ok(Self {
            identifier,
            locator,
            tags: unique.into_iter().collect(),
            expires_at,
        })
    }

    /// Build the entry for a page rendered at `request_url`.
    ///
    /// The identifier is derived from the URL so that re-rendering the same
    /// page replaces the previous entry.
    pub fn for_page(
        request_url: &str,
        tags: impl IntoIterator<Item = String>,
        lifetime: Duration,
        now: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        let identifier = page_identifier(request_url);
        let seconds = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(time::Duration::seconds(seconds));
        Self::new(identifier, request_url, tags, expires_at)
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }

    pub fn locator(&self) -> EntryLocator {
        EntryLocator {
            identifier: self.identifier.clone(),
            url: self.locator.clone(),
        }
    }
}

/// Identifier and public URL of a cached entry, as returned by tag lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntryLocator {
    pub identifier: String,
    pub url: String,
}

/// Stable identifier for the page cached under `request_url`.
pub fn page_identifier(request_url: &str) -> String {
    let digest = Sha256::digest(request_url.as_bytes());
    hex::encode(&digest[..16])
}

/// Tag the CMS attaches to every entry rendered from page `page_id`.
pub fn page_tag(page_id: u64) -> String {
    format!("{PAGE_TAG_PREFIX}{page_id}")
}

pub fn validate_identifier(identifier: &str) -> Result<(), DomainError> {
    if identifier.is_empty() {
        return Err(DomainError::identifier("identifier must not be empty"));
    }
    if identifier.len() > MAX_KEY_LEN {
        return Err(DomainError::identifier(format!(
            "identifier exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

pub fn validate_tag(tag: &str) -> Result<(), DomainError> {
    if tag.trim().is_empty() {
        return Err(DomainError::tag(tag, "tag must not be blank"));
    }
    if tag.len() > MAX_KEY_LEN {
        return Err(DomainError::tag(
            tag,
            format!("tag exceeds {MAX_KEY_LEN} bytes"),
        ));
    }
    Ok(())
}

pub fn validate_locator(locator: &str) -> Result<(), DomainError> {
    let parsed = Url::parse(locator).map_err(|err| DomainError::locator(locator, err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DomainError::locator(
                locator,
                format!("unsupported scheme `{other}`"),
            ));
        }
    }
    if parsed.host_str().is_none() {
        return Err(DomainError::locator(locator, "url has no host"));
    }
    Ok(())
}
