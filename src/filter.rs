//! Subset filter for restricting renderings to selected hosts
//!
//! Parsed from a comma-separated list in the `nodes` query parameter.
//! Unknown names are kept and simply match nothing; malformed input is
//! treated as an empty match rather than an error.

use std::collections::BTreeSet;

/// A caller-requested restriction to a subset of hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFilter {
    // Sorted so that equivalent filters share a cache key.
    names: BTreeSet<String>,
}

impl NodeFilter {
    /// Parse a comma-separated host list. Empty or whitespace-only input
    /// yields `None`, meaning "all hosts".
    pub fn parse(input: &str) -> Option<Self> {
        let names: BTreeSet<String> = input
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    /// Parse an optional query-string value.
    pub fn from_query(value: Option<&str>) -> Option<Self> {
        value.and_then(Self::parse)
    }

    pub fn matches(&self, host: &str) -> bool {
        self.names.contains(host)
    }

    /// Canonical key for render caching: equivalent filters (order,
    /// duplicates, whitespace) map to the same key.
    pub fn cache_key(&self) -> String {
        self.names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}
