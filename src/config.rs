// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Engine configuration.

use crate::instance::DEFAULT_COMPLETION_TIMEOUT;
use crate::resolver::MAX_INSTANCES;
use crate::service::ServiceType;
use std::time::Duration;

/// Default process name; selects the `[SSL]` section of the QAT
/// configuration file.
pub const DEFAULT_PROCESS_NAME: &str = "SSL";

/// Settings used by [`QatEngine`](crate::QatEngine) during bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QatConfig {
    /// Process name passed to the session start call.
    pub process_name: String,
    /// Primary service type for instance discovery.
    pub service_type: ServiceType,
    /// Maximum number of instance handles fetched.
    pub max_instances: usize,
    /// Completion timeout for blocking operations. `None` waits forever.
    pub completion_timeout: Option<Duration>,
}

impl Default for QatConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            service_type: ServiceType::Crypto,
            max_instances: MAX_INSTANCES,
            completion_timeout: Some(DEFAULT_COMPLETION_TIMEOUT),
        }
    }
}

impl QatConfig {
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    /// Clamped to at least 1.
    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances.max(1);
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QatConfig::default();
        assert_eq!(config.process_name, "SSL");
        assert_eq!(config.service_type, ServiceType::Crypto);
        assert_eq!(config.max_instances, 1024);
        assert_eq!(config.completion_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_setters() {
        let config = QatConfig::default()
            .with_process_name("test-proc")
            .with_service_type(ServiceType::CryptoAsym)
            .with_max_instances(0)
            .with_completion_timeout(None);
        assert_eq!(config.process_name, "test-proc");
        assert_eq!(config.service_type, ServiceType::CryptoAsym);
        assert_eq!(config.max_instances, 1);
        assert_eq!(config.completion_timeout, None);
    }
}
