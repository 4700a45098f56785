use std::fmt;

use serde::{Deserialize, Serialize};

/// Caching policy describing how a matched request is served from cache versus network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    StaleWhileRevalidate,
    CacheFirst,
    NetworkFirst,
    CacheOnly,
    NetworkOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::StaleWhileRevalidate,
        Strategy::CacheFirst,
        Strategy::NetworkFirst,
        Strategy::CacheOnly,
        Strategy::NetworkOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::StaleWhileRevalidate => "StaleWhileRevalidate",
            Strategy::CacheFirst => "CacheFirst",
            Strategy::NetworkFirst => "NetworkFirst",
            Strategy::CacheOnly => "CacheOnly",
            Strategy::NetworkOnly => "NetworkOnly",
        }
    }

    /// Resolve a strategy identifier.
    ///
    /// The first letter is capitalised before matching so that legacy lower-camel
    /// identifiers (`cacheOnly`) resolve to the same strategy as `CacheOnly`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let canonical = capitalize_first(identifier);
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == canonical)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
