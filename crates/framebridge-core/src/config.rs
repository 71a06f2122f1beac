//! Centralized configuration for the frame bridge.
//!
//! Constants for method resolution, origin handling and the socket transport,
//! plus the [`TrustMode`] that selects how a correlator restricts traffic.

use std::time::Duration;

/// Protocol-level constants.
pub struct BridgeConfig;

impl BridgeConfig {
    /// Prefix older clients put in front of every method name.
    pub const LEGACY_METHOD_PREFIX: &'static str = "framebridge:";
    /// Error message used when an override fails without giving one.
    pub const DEFAULT_OVERRIDE_ERROR: &'static str = "Handled by outer wrapper.";
    /// Spelling of the allow-all sentinel on the command line.
    pub const UNSAFE_ALLOW_ANY_ORIGIN: &'static str = "UNSAFE_ALLOW_ANY_ORIGIN";
    /// Deadline applied by proxies built with `with_default_timeout`.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Socket transport limits.
pub struct IpcConfig;

impl IpcConfig {
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const MAX_CONNECTIONS: usize = 64;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Where a correlator applies its origin allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustMode {
    /// Post requests only to allow-listed origins; accept replies from any origin.
    RestrictSend,
    /// Post requests to any origin; accept replies only from allow-listed origins.
    ///
    /// Required when the counterpart cannot be addressed by a single known origin.
    #[default]
    RestrictReceive,
}

impl TrustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustMode::RestrictSend => "restrict-send",
            TrustMode::RestrictReceive => "restrict-receive",
        }
    }
}

impl std::fmt::Display for TrustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_trust_mode_restricts_receive() {
        assert_eq!(TrustMode::default(), TrustMode::RestrictReceive);
        assert_eq!(TrustMode::RestrictSend.to_string(), "restrict-send");
    }

    #[test]
    fn test_limits_are_reasonable() {
        assert!(IpcConfig::MAX_MESSAGE_SIZE > 1024);
        assert!(IpcConfig::CONNECT_TIMEOUT > Duration::ZERO);
        assert!(BridgeConfig::DEFAULT_CALL_TIMEOUT > Duration::ZERO);
    }
}
