//! Origin allow-lists.
//!
//! Every message crossing the boundary carries the origin of the context that
//! posted it. An [`AllowList`] decides which of those origins may take part in
//! the conversation. Allowing every origin requires the dedicated
//! [`OriginSpec::UnsafeAllowAny`] entry; a literal `"*"` is refused so that an
//! insecure configuration is always spelled out.

use crate::channel::TargetOrigin;
use crate::error::{BridgeError, Result};
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;
use url::Url;

/// One entry of an allow-list.
#[derive(Debug, Clone)]
pub enum OriginSpec {
    /// A serialized origin such as `https://app.example` or `http://localhost:3000`.
    Exact(String),
    /// Any origin the expression matches. Anchor it yourself.
    Pattern(Regex),
    /// Every origin. Only ever configured on purpose.
    UnsafeAllowAny,
}

impl OriginSpec {
    /// Parse and normalise an exact origin.
    pub fn exact(origin: &str) -> Result<Self> {
        Ok(OriginSpec::Exact(normalize_origin(origin)?))
    }

    /// Compile a pattern entry.
    pub fn pattern(expr: &str) -> Result<Self> {
        Regex::new(expr)
            .map(OriginSpec::Pattern)
            .map_err(|e| BridgeError::config(format!("Invalid origin pattern '{}': {}", expr, e)))
    }

    /// The explicit allow-all sentinel.
    pub fn unsafe_allow_any() -> Self {
        OriginSpec::UnsafeAllowAny
    }

    /// Check a candidate origin against this entry.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            OriginSpec::Exact(origin) => origin == candidate,
            OriginSpec::Pattern(re) => re.is_match(candidate),
            OriginSpec::UnsafeAllowAny => true,
        }
    }
}

/// Normalise an origin to its ASCII serialization (`scheme://host[:port]`).
///
/// Default ports are elided and trailing paths dropped. A literal `"*"` and
/// opaque origins (`data:`, `file:`, ...) are configuration errors.
pub fn normalize_origin(origin: &str) -> Result<String> {
    let trimmed = origin.trim();
    if trimmed == "*" {
        return Err(BridgeError::config(
            "'*' is not an origin; use OriginSpec::UnsafeAllowAny to allow every origin",
        ));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| BridgeError::config(format!("Invalid origin '{}': {}", origin, e)))?;
    let origin_value = url.origin();
    if !origin_value.is_tuple() {
        return Err(BridgeError::config(format!(
            "Origin '{}' is opaque and cannot be allow-listed",
            origin
        )));
    }

    Ok(origin_value.ascii_serialization())
}

/// A non-empty, ordered set of permitted origins.
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: Vec<OriginSpec>,
}

impl AllowList {
    /// Build an allow-list, validating every entry.
    ///
    /// Exact entries that normalise to the same origin are kept once, so a
    /// restricted send never posts one request twice.
    pub fn new(entries: impl IntoIterator<Item = OriginSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::new();
        for entry in entries {
            let entry = match entry {
                OriginSpec::Exact(origin) => OriginSpec::exact(&origin)?,
                other => other,
            };
            if let OriginSpec::Exact(origin) = &entry {
                if !seen.insert(origin.clone()) {
                    continue;
                }
            }
            normalized.push(entry);
        }
        let entries = normalized;

        if entries.is_empty() {
            return Err(BridgeError::config(
                "Origin allow-list must not be empty; use OriginSpec::UnsafeAllowAny to allow every origin",
            ));
        }

        Ok(Self { entries })
    }

    /// Build an allow-list of exact origins.
    pub fn exact<I, S>(origins: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = origins
            .into_iter()
            .map(|o| OriginSpec::exact(o.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    /// An allow-list that accepts every origin.
    pub fn unsafe_allow_any() -> Self {
        Self {
            entries: vec![OriginSpec::UnsafeAllowAny],
        }
    }

    pub fn entries(&self) -> &[OriginSpec] {
        &self.entries
    }

    /// True when the list holds the allow-all sentinel.
    pub fn allows_any(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, OriginSpec::UnsafeAllowAny))
    }

    pub fn is_allowed(&self, candidate: &str) -> bool {
        self.entries.iter().any(|entry| entry.matches(candidate))
    }

    /// Targets a request may be posted to when sends are restricted.
    ///
    /// Pattern entries name no concrete origin and are skipped.
    pub fn send_targets(&self) -> Vec<TargetOrigin> {
        if self.allows_any() {
            return vec![TargetOrigin::Any];
        }

        self.entries
            .iter()
            .filter_map(|entry| match entry {
                OriginSpec::Exact(origin) => Some(TargetOrigin::Exact(origin.clone())),
                OriginSpec::Pattern(re) => {
                    warn!("Origin pattern '{}' cannot be used as a send target", re);
                    None
                }
                OriginSpec::UnsafeAllowAny => None,
            })
            .collect()
    }
}

/// Check whether `candidate` is permitted by `allow_list`.
pub fn is_allowed(allow_list: &AllowList, candidate: &str) -> bool {
    allow_list.is_allowed(candidate)
}
