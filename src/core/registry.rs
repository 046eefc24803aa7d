//! Tool invocation registry.
//!
//! Bookkeeping for the external tool adapters the pipeline calls: how often
//! each one was invoked and when it was last used. Counters only ever grow.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GIT_MCP: &str = "git_mcp";
pub const LOGS_MCP: &str = "logs_mcp";
pub const DEPLOYMENT_MCP: &str = "deployment_mcp";
pub const HEALING_MCP: &str = "healing_mcp";

/// Registry entry for one tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRegistryEntry {
    pub server_id: String,
    pub name: String,
    pub status: String,
    pub description: String,
    pub capabilities: BTreeSet<String>,
    pub invocations: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ToolRegistryEntry {
    fn new(
        server_id: &str,
        name: &str,
        status: &str,
        description: &str,
        capabilities: &[&str],
    ) -> Self {
        Self {
            server_id: server_id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            description: description.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            invocations: 0,
            last_used: None,
        }
    }
}

/// Point-in-time copy of every registry entry
pub type RegistrySnapshot = BTreeMap<String, ToolRegistryEntry>;

#[derive(Debug)]
pub struct ToolRegistry {
    servers: Mutex<RegistrySnapshot>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Registry pre-populated with the four pipeline tool servers
    pub fn new() -> Self {
        let entries = [
            ToolRegistryEntry::new(
                GIT_MCP,
                "Git MCP",
                "connected",
                "Repository management",
                &["create_repo", "push_code", "list_commits"],
            ),
            ToolRegistryEntry::new(
                LOGS_MCP,
                "Logs MCP",
                "active",
                "Execution observability",
                &["store_log", "get_logs", "clear_logs"],
            ),
            ToolRegistryEntry::new(
                DEPLOYMENT_MCP,
                "Deployment MCP",
                "running",
                "Infrastructure orchestration",
                &["provision_container", "deploy_service", "health_check"],
            ),
            ToolRegistryEntry::new(
                HEALING_MCP,
                "Healing MCP",
                "active",
                "Code audit & vulnerability patching",
                &["audit_code", "apply_patch", "report_vulnerabilities"],
            ),
        ];

        Self {
            servers: Mutex::new(
                entries
                    .into_iter()
                    .map(|e| (e.server_id.clone(), e))
                    .collect(),
            ),
        }
    }

    /// Count one invocation. Unknown ids are ignored.
    pub fn record_invocation(&self, server_id: &str) {
        let mut servers = self.servers.lock();
        match servers.get_mut(server_id) {
            Some(entry) => {
                entry.invocations += 1;
                entry.last_used = Some(Utc::now());
            }
            None => debug!(server_id, "Ignoring invocation for unknown tool server"),
        }
    }

    /// Deep copy of all entries; changes to it never reach the registry
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.servers.lock().clone()
    }

    pub fn invocations(&self, server_id: &str) -> Option<u64> {
        self.servers.lock().get(server_id).map(|e| e.invocations)
    }
}

/// Fixed demo activity strings.
///
/// Display aid for when live tools are offline. Deliberately independent of
/// the registry counters: nothing here is derived from recorded invocations.
pub fn simulate_activity() -> Vec<String> {
    vec![
        "Git MCP: Repository initialized -> synapse-x-org/project".to_string(),
        "Logs MCP: Execution metrics stored (12 events)".to_string(),
        "Deployment MCP: Container launched on port 8000".to_string(),
        "Healing MCP: 3 vulnerabilities patched automatically".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_entries() {
        let registry = ToolRegistry::new();
        let snapshot = registry.snapshot();

        assert_eq!(snapshot.len(), 4);
        for entry in snapshot.values() {
            assert_eq!(entry.invocations, 0);
            assert!(entry.last_used.is_none());
            assert!(!entry.capabilities.is_empty());
        }
        assert!(snapshot[GIT_MCP].capabilities.contains("push_code"));
    }

    #[test]
    fn test_record_invocation() {
        let registry = ToolRegistry::new();
        registry.record_invocation(HEALING_MCP);
        registry.record_invocation(HEALING_MCP);

        assert_eq!(registry.invocations(HEALING_MCP), Some(2));
        assert!(registry.snapshot()[HEALING_MCP].last_used.is_some());
        assert_eq!(registry.invocations(GIT_MCP), Some(0));
    }

    #[test]
    fn test_unknown_server_is_noop() {
        let registry = ToolRegistry::new();
        let before = registry.snapshot();
        registry.record_invocation("slack_mcp");
        assert_eq!(registry.snapshot(), before);
        assert_eq!(registry.invocations("slack_mcp"), None);
    }

    #[test]
    fn test_simulation_is_fixed() {
        let registry = ToolRegistry::new();
        let before = simulate_activity();
        registry.record_invocation(GIT_MCP);
        assert_eq!(simulate_activity(), before);
        assert_eq!(before.len(), 4);
    }
}
