//! Request classification and cache exclusion.

use crate::config::RoutingRules;
use crate::types::StrategyKind;
use std::collections::HashSet;
use url::Url;

/// URL shape of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Api,
    Static,
    Other,
}

impl RequestClass {
    pub fn strategy(&self) -> StrategyKind {
        match self {
            RequestClass::Api => StrategyKind::NetworkFirst,
            RequestClass::Static => StrategyKind::CacheFirst,
            RequestClass::Other => StrategyKind::StaleWhileRevalidate,
        }
    }
}

/// Decides whether a URL must never be written to a partition.
pub trait CacheExclusion: Send + Sync {
    fn excludes(&self, url: &str) -> bool;
}

/// Excludes URLs containing any of a list of literal substrings.
#[derive(Debug, Clone, Default)]
pub struct SubstringExclusion {
    patterns: Vec<String>,
}

impl SubstringExclusion {
    pub fn new(patterns: Vec<String>) -> Self {
        let patterns = patterns.into_iter().filter(|p| !p.is_empty()).collect();
        Self { patterns }
    }
}

impl CacheExclusion for SubstringExclusion {
    fn excludes(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

impl<F> CacheExclusion for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn excludes(&self, url: &str) -> bool {
        self(url)
    }
}

/// Maps request URLs onto a [`RequestClass`].
#[derive(Debug, Clone)]
pub struct Classifier {
    api_prefix: String,
    static_prefix: String,
    static_extensions: Vec<String>,
    manifest: HashSet<String>,
}

impl Classifier {
    /// `manifest` holds the resolved absolute URLs of every install manifest
    /// entry; those are always treated as static.
    pub fn new(rules: &RoutingRules, manifest: impl IntoIterator<Item = String>) -> Self {
        Self {
            api_prefix: rules.api_prefix.clone(),
            static_prefix: rules.static_prefix.clone(),
            static_extensions: rules
                .static_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            manifest: manifest.into_iter().collect(),
        }
    }

    pub fn classify(&self, url: &Url) -> RequestClass {
        let path = url.path();
        if path.starts_with(&self.api_prefix) {
            return RequestClass::Api;
        }
        if path.starts_with(&self.static_prefix)
            || self.in_manifest(url)
            || self.has_static_extension(path)
        {
            return RequestClass::Static;
        }
        RequestClass::Other
    }

    /// Manifest entries are stored without fragments, like cache keys.
    fn in_manifest(&self, url: &Url) -> bool {
        match url.fragment() {
            None => self.manifest.contains(url.as_str()),
            Some(_) => {
                let mut key = url.clone();
                key.set_fragment(None);
                self.manifest.contains(key.as_str())
            }
        }
    }

    fn has_static_extension(&self, path: &str) -> bool {
        let Some(file) = path.rsplit('/').next() else {
            return false;
        };
        match file.rsplit_once('.') {
            Some((_, ext)) => self
                .static_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}
