//! Endpoint fallback for the sportsbook API.
//!
//! A [`ResourceRequest`] is planned into ordered [`Candidate`]s, each tried
//! once through a [`Fetcher`] and judged by [`classify`]. The first accepted
//! payload wins; otherwise every failure comes back in
//! [`Resolution::Exhausted`].

pub mod classifier;
pub mod coordinator;
pub mod executor;
pub mod planner;

pub use classifier::{classify, ClassifyError};
pub use coordinator::resolve;
pub use executor::{Fetcher, HttpFetcher, RawResponse, TransportError};
pub use planner::CandidatePlanner;

use crate::config::UpstreamConfig;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What the caller asked for. Built by the HTTP layer from `site` / `group`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    pub site: Option<String>,
    pub group: Option<String>,
}

impl ResourceRequest {
    pub fn new(site: Option<String>, group: Option<String>) -> Self {
        Self { site, group }
    }

    /// Site code to use, falling back to `default` when absent or blank.
    pub fn site_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.site
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
    }

    /// Group id, `None` when absent or blank.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

/// One concrete location believed to serve the requested resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub host: String,
    /// Path plus query string, starting with `/`.
    pub path: String,
    /// 0 for the first pass; later passes carry a retry salt in `path`.
    pub retry_pass: u32,
}

impl Candidate {
    pub fn url(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Accepted,
    Rejected(ClassifyError),
    Transport(TransportError),
}

impl AttemptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttemptOutcome::Accepted)
    }

    /// Failure text for diagnostics, `None` when accepted.
    pub fn error(&self) -> Option<String> {
        match self {
            AttemptOutcome::Accepted => None,
            AttemptOutcome::Rejected(e) => Some(e.to_string()),
            AttemptOutcome::Transport(e) => Some(e.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct AttemptRecord {
    pub candidate: Candidate,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Terminal result of one resolution.
#[derive(Debug)]
pub enum Resolution {
    Resolved {
        candidate: Candidate,
        data: Value,
        /// Every attempt made, the accepted one last.
        attempts: Vec<AttemptRecord>,
    },
    Exhausted {
        attempts: Vec<AttemptRecord>,
    },
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Resolution::Resolved { attempts, .. } | Resolution::Exhausted { attempts } => attempts,
        }
    }

    /// Attempts that did not produce the payload.
    pub fn failures(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.attempts().iter().filter(|a| !a.outcome.is_accepted())
    }
}

/// Planner, fetcher and per-attempt timeout wired together.
#[derive(Clone)]
pub struct Relay {
    planner: CandidatePlanner,
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl Relay {
    pub fn new(planner: CandidatePlanner, fetcher: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { planner, fetcher, timeout }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self::new(
            CandidatePlanner::from_config(config),
            Arc::new(fetcher),
            config.request_timeout(),
        ))
    }

    pub fn planner(&self) -> &CandidatePlanner {
        &self.planner
    }

    /// Plan and resolve one request. Cache-bust stamp is the current time.
    pub async fn fetch(&self, request: &ResourceRequest) -> Resolution {
        let stamp = chrono::Utc::now().timestamp_millis();
        let candidates = self.planner.plan(request, stamp);
        resolve(self.fetcher.as_ref(), candidates, self.timeout).await
    }
}
