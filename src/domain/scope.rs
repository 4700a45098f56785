//! Audiences a compiled bundle can be served to.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// The audience a bundle is compiled for. Each scope yields an independent artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Front,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Front => "front",
            Scope::Admin => "admin",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Scope::Front),
            "admin" => Ok(Scope::Admin),
            other => Err(DomainError::validation(format!(
                "unknown scope `{other}`; expected `front` or `admin`"
            ))),
        }
    }
}

/// Which scopes a declaration applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopeFilter {
    Front,
    Admin,
    #[default]
    All,
}

impl ScopeFilter {
    pub fn includes(self, scope: Scope) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Front => scope == Scope::Front,
            ScopeFilter::Admin => scope == Scope::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Front".parse::<Scope>().unwrap(), Scope::Front);
        assert_eq!(" admin ".parse::<Scope>().unwrap(), Scope::Admin);
        assert!("network".parse::<Scope>().is_err());
    }

    #[test]
    fn filter_all_includes_every_scope() {
        assert!(ScopeFilter::All.includes(Scope::Front));
        assert!(ScopeFilter::All.includes(Scope::Admin));
        assert!(ScopeFilter::Front.includes(Scope::Front));
        assert!(!ScopeFilter::Front.includes(Scope::Admin));
        assert!(!ScopeFilter::Admin.includes(Scope::Front));
    }
}
