//! Allow-list assembly from command-line flags.

use anyhow::{bail, Context, Result};
use clap::Args;
use framebridge::{AllowList, BridgeConfig, OriginSpec};

/// Origins the peer may use.
#[derive(Args, Debug, Clone, Default)]
pub struct AllowListArgs {
    /// Exact origin to trust (repeatable)
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    pub origins: Vec<String>,

    /// Regular expression an origin must match (repeatable, anchor it yourself)
    #[arg(long = "allow-origin-pattern", value_name = "REGEX")]
    pub patterns: Vec<String>,

    /// Trust every origin
    #[arg(long)]
    pub unsafe_allow_any_origin: bool,
}

impl AllowListArgs {
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty() && self.patterns.is_empty() && !self.unsafe_allow_any_origin
    }

    /// Build the allow-list.
    ///
    /// `UNSAFE_ALLOW_ANY_ORIGIN` passed as an origin is the sentinel; a bare
    /// `*` is rejected.
    pub fn build(&self) -> Result<AllowList> {
        let mut entries = Vec::new();

        for origin in &self.origins {
            if origin == BridgeConfig::UNSAFE_ALLOW_ANY_ORIGIN {
                entries.push(OriginSpec::unsafe_allow_any());
                continue;
            }
            if origin == "*" {
                bail!(
                    "'*' is not an origin; pass --unsafe-allow-any-origin or {} to trust every origin",
                    BridgeConfig::UNSAFE_ALLOW_ANY_ORIGIN
                );
            }
            entries.push(OriginSpec::exact(origin).with_context(|| format!("Invalid origin '{}'", origin))?);
        }

        for pattern in &self.patterns {
            entries.push(
                OriginSpec::pattern(pattern).with_context(|| format!("Invalid origin pattern '{}'", pattern))?,
            );
        }

        if self.unsafe_allow_any_origin {
            entries.push(OriginSpec::unsafe_allow_any());
        }

        Ok(AllowList::new(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(origins: &[&str], patterns: &[&str], any: bool) -> AllowListArgs {
        AllowListArgs {
            origins: origins.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            unsafe_allow_any_origin: any,
        }
    }

    #[test]
    fn test_exact_and_pattern() {
        let list = args(&["https://app.example"], &[r"^https://[a-z]+\.dapps\.example$"], false)
            .build()
            .unwrap();
        assert!(list.is_allowed("https://app.example"));
        assert!(list.is_allowed("https://swap.dapps.example"));
        assert!(!list.is_allowed("https://evil.example"));
    }

    #[test]
    fn test_sentinel_spellings() {
        assert!(args(&[], &[], true).build().unwrap().allows_any());
        assert!(args(&["UNSAFE_ALLOW_ANY_ORIGIN"], &[], false).build().unwrap().allows_any());
    }

    #[test]
    fn test_wildcard_and_empty_are_rejected() {
        assert!(args(&["*"], &[], false).build().is_err());
        assert!(args(&[], &[], false).build().is_err());
        assert!(args(&[], &[], false).is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = args(&[], &["(unclosed"], false).build().unwrap_err();
        assert!(err.to_string().contains("Invalid origin pattern"));
    }
}
