use super::{Candidate, ResourceRequest};
use crate::config::UpstreamConfig;
use std::collections::HashSet;

/// Expands a request into the ordered list of URLs worth trying.
///
/// Order is pass-major, then host (primary before mirrors), then path
/// (event group before the sport collection). Deterministic for a given
/// request and cache-bust stamp.
#[derive(Debug, Clone)]
pub struct CandidatePlanner {
    hosts: Vec<String>,
    default_site: String,
    sport_path: String,
    retry_passes: u32,
    collection_fallback: bool,
}

impl CandidatePlanner {
    /// Blank hosts are dropped; with none left the stock DraftKings hosts are
    /// used, so `plan` always has somewhere to go. A blank site falls back the same way.
    pub fn new(hosts: Vec<String>, default_site: &str, sport_path: &str) -> Self {
        let mut hosts: Vec<String> = hosts
            .into_iter()
            .map(|h| h.trim().trim_end_matches('/').to_string())
            .filter(|h| !h.is_empty())
            .collect();
        let defaults = UpstreamConfig::default();
        if hosts.is_empty() {
            tracing::warn!("no upstream hosts given, using defaults");
            hosts = defaults.hosts;
        }
        let default_site = match default_site.trim() {
            "" => defaults.default_site,
            site => site.to_string(),
        };
        Self {
            hosts,
            default_site,
            sport_path: sport_path.trim_matches('/').to_string(),
            retry_passes: 0,
            collection_fallback: false,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.hosts.clone(), &config.default_site, &config.sport_path)
            .with_retry_passes(config.retry_passes)
            .with_collection_fallback(config.collection_fallback)
    }

    pub fn with_retry_passes(mut self, passes: u32) -> Self {
        self.retry_passes = passes;
        self
    }

    pub fn with_collection_fallback(mut self, enabled: bool) -> Self {
        self.collection_fallback = enabled;
        self
    }

    pub fn default_site(&self) -> &str {
        &self.default_site
    }

    pub fn plan(&self, request: &ResourceRequest, cache_bust: i64) -> Vec<Candidate> {
        let site = encode(request.site_or(&self.default_site));
        let collection = format!("/sites/{}/api/v5/sports/{}", site, self.sport_path);

        let paths = match request.group() {
            Some(group) => {
                let mut paths = vec![format!("/sites/{}/api/v5/eventgroups/{}", site, encode(group))];
                if self.collection_fallback {
                    paths.push(collection);
                }
                paths
            }
            None => vec![collection],
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for pass in 0..=self.retry_passes {
            for host in &self.hosts {
                for base in &paths {
                    let mut path = format!("{}?format=json&t={}", base, cache_bust);
                    if pass > 0 {
                        path.push_str(&format!("&retry={}", pass));
                    }
                    let candidate = Candidate {
                        host: host.clone(),
                        path,
                        retry_pass: pass,
                    };
                    if seen.insert(candidate.url()) {
                        candidates.push(candidate);
                    }
                }
            }
        }
        candidates
    }
}

/// Percent-encode a caller-supplied value for use as a single path segment.
fn encode(segment: &str) -> String {
    // byte_serialize escapes a literal '+' as %2B, so any '+' left is a space
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
