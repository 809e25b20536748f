use crate::config::IndexConfig;
use serde::ser::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Which outbound links count as popularity votes.
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    allowed_domains: Vec<String>,
    disallowed_extensions: HashSet<String>,
}

impl LinkPolicy {
    pub fn new<D, E>(allowed_domains: D, disallowed_extensions: E) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            disallowed_extensions: disallowed_extensions.into_iter().map(|e| e.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(&config.allowed_domains, &config.disallowed_extensions)
    }

    /// Resolve `href` against `base`, drop the fragment, and apply the policy.
    pub fn canonicalize(&self, base: Option<&Url>, href: &str) -> Option<Url> {
        let mut url = match base {
            Some(b) => b.join(href).ok()?,
            None => Url::parse(href).ok()?,
        };
        url.set_fragment(None);
        self.accepts(&url).then_some(url)
    }

    pub fn accepts(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else { return false };
        let host_ok = self
            .allowed_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{d}")));
        if !host_ok {
            return false;
        }
        let last = url.path_segments().and_then(|mut s| s.next_back()).unwrap_or("");
        match last.rsplit_once('.') {
            Some((_, ext)) => !self.disallowed_extensions.contains(&ext.to_ascii_lowercase()),
            None => true,
        }
    }
}

/// Inbound reference counts per canonical URL.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutlinkVotes {
    votes: HashMap<String, u64>,
}

impl OutlinkVotes {
    pub fn new() -> Self { Self::default() }

    pub fn vote(&mut self, url: &Url) {
        *self.votes.entry(url.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, url: &str) -> u64 {
        self.votes.get(url).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize { self.votes.len() }

    pub fn is_empty(&self) -> bool { self.votes.is_empty() }

    /// Entries by descending count, URL ascending on ties.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.votes.iter().map(|(u, c)| (u.as_str(), *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub(crate) fn from_map(votes: HashMap<String, u64>) -> Self {
        Self { votes }
    }
}

impl Serialize for OutlinkVotes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.ranked())
    }
}
