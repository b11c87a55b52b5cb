//! Purge batches and their per-request outcomes.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::entries::EntryLocator;

use super::client::PurgeError;

/// Outcome slot of one request in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PurgeOutcome {
    #[default]
    Pending,
    Purged,
    Failed(PurgeError),
}

impl PurgeOutcome {
    pub fn is_purged(&self) -> bool {
        matches!(self, Self::Purged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Purged => "purged",
            Self::Failed(_) => "failed",
        }
    }
}

/// One URL to purge, optionally tied to the local entry it invalidates.
///
/// The wildcard flush request has no identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub url: String,
    pub identifier: Option<String>,
    pub outcome: PurgeOutcome,
}

impl PurgeRequest {
    pub fn new(url: impl Into<String>, identifier: Option<String>) -> Self {
        Self {
            url: url.into(),
            identifier,
            outcome: PurgeOutcome::Pending,
        }
    }
}

/// Requests sent to the proxy together and reconciled together.
#[derive(Debug, Clone)]
pub struct PurgeBatch {
    id: Uuid,
    requests: Vec<PurgeRequest>,
}

impl PurgeBatch {
    pub fn new(requests: Vec<PurgeRequest>) -> Self {
        Self {
            id: Uuid::new_v4(),
            requests,
        }
    }

    /// Single `<base>/*` request that invalidates the whole site.
    pub fn wildcard(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self::new(vec![PurgeRequest::new(format!("{base}/*"), None)])
    }

    pub fn from_locators(locators: impl IntoIterator<Item = EntryLocator>) -> Self {
        Self::new(
            locators
                .into_iter()
                .map(|locator| PurgeRequest::new(locator.url, Some(locator.identifier)))
                .collect(),
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[PurgeRequest] {
        &self.requests
    }

    pub fn into_parts(self) -> (Uuid, Vec<PurgeRequest>) {
        (self.id, self.requests)
    }
}

/// Result of dispatching a batch. Requests keep their input order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub requests: Vec<PurgeRequest>,
}

impl BatchReport {
    pub fn all_purged(&self) -> bool {
        self.requests.iter().all(|request| request.outcome.is_purged())
    }

    pub fn purged_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|request| request.outcome.is_purged())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|request| matches!(request.outcome, PurgeOutcome::Failed(_)))
            .count()
    }

    pub fn purged_identifiers(&self) -> Vec<&str> {
        self.identifiers_where(|outcome| outcome.is_purged())
    }

    /// Identifiers whose purge did not succeed, still pending included.
    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.identifiers_where(|outcome| !outcome.is_purged())
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &PurgeOutcome> {
        self.requests.iter().map(|request| &request.outcome)
    }

    fn identifiers_where(&self, keep: impl Fn(&PurgeOutcome) -> bool) -> Vec<&str> {
        self.requests
            .iter()
            .filter(|request| keep(&request.outcome))
            .filter_map(|request| request.identifier.as_deref())
            .collect()
    }
}

/// Per-request summary suitable for reporting to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub url: String,
    pub identifier: Option<String>,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PurgeRequest> for PurgeSummary {
    fn from(request: &PurgeRequest) -> Self {
        let error = match &request.outcome {
            PurgeOutcome::Failed(err) => Some(err.to_string()),
            _ => None,
        };
        Self {
            url: request.url.clone(),
            identifier: request.identifier.clone(),
            outcome: request.outcome.as_str(),
            error,
        }
    }
}
