// src/orchestrator/settings.rs

//! Everything the orchestrator needs to reach and talk to the daemon.

use crate::auth::AuthSettings;
use crate::session::Endpoint;
use crate::types::RemoteLogLevel;

use super::monitor::MonitorSettings;

/// Fallback principal when no identity can be resolved.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub endpoint: Endpoint,
    pub auth: AuthSettings,
    pub monitor: MonitorSettings,
    pub log_level: RemoteLogLevel,
    /// Identity the daemon runs the job as. Defaults to [`current_principal`].
    pub acting_principal: Option<String>,
}

impl RemoteSettings {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            auth: AuthSettings::default(),
            monitor: MonitorSettings::default(),
            log_level: RemoteLogLevel::default(),
            acting_principal: None,
        }
    }

    pub fn principal(&self) -> String {
        self.acting_principal
            .clone()
            .unwrap_or_else(current_principal)
    }
}

/// Name of the local user, from `USER` or `USERNAME`.
pub fn current_principal() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_PRINCIPAL.to_string())
}
