//! Static overrides loaded from a JSON file.
//!
//! ```json
//! {
//!   "getKey": {"value": {"name": "fixed"}},
//!   "signArbitrary": {"fail": "Not supported here."},
//!   "sendTx": {"fail": null},
//!   "enable": "defer"
//! }
//! ```

use anyhow::{Context, Result};
use framebridge::{OverrideDecision, OverrideMap};
use std::collections::HashMap;
use std::path::Path;

/// Read `path` into an override map.
pub fn load_overrides(path: &Path) -> Result<OverrideMap> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides file {}", path.display()))?;
    parse_overrides(&contents).with_context(|| format!("Invalid overrides file {}", path.display()))
}

pub fn parse_overrides(contents: &str) -> Result<OverrideMap> {
    let decisions: HashMap<String, OverrideDecision> = serde_json::from_str(contents)?;
    Ok(OverrideMap::from_decisions(decisions))
}
