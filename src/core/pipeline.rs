//! Fixed pipeline definition.
//!
//! The stage sequence is static: Parent, Dev, DevOps, Doctor, Publish. This
//! module names the stages, maps every externally visible action to its
//! registry entry and activity string, and assembles the publish payload.

use std::collections::BTreeMap;
use std::fmt;

use super::registry::{DEPLOYMENT_MCP, GIT_MCP, HEALING_MCP, LOGS_MCP};
use crate::domain::{DeploymentBundle, HealingReport, ServiceCode, StageOutcome};

/// Title carried by every pipeline result
pub const PIPELINE_TITLE: &str = "SYNAPSE-X Orchestration Pipeline";

/// Commit message used for the publish push
pub const COMMIT_MESSAGE: &str = "feat: initial scaffold by SYNAPSE-X";

/// Agent name used for run-level log entries
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Parent,
    Dev,
    DevOps,
    Doctor,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Parent,
        Stage::Dev,
        Stage::DevOps,
        Stage::Doctor,
        Stage::Publish,
    ];

    /// Agent name recorded on the stage's log entries
    pub fn agent(&self) -> &'static str {
        match self {
            Stage::Parent => "parent_agent",
            Stage::Dev => "dev_agent",
            Stage::DevOps => "devops_agent",
            Stage::Doctor => "doctor_agent",
            Stage::Publish => "git_mcp",
        }
    }

    /// Key of the stage in the result's `stages` map
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Parent => "1_parent_analysis",
            Stage::Dev => "2_dev_agent",
            Stage::DevOps => "3_devops_agent",
            Stage::Doctor => "4_doctor_healing",
            Stage::Publish => "5_github_push",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// An externally visible action, recorded in the registry and activity trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    TelemetryInit,
    AnalysisStored,
    DevTraceStored,
    InfraProvisioned,
    Healed { issues_healed: usize },
    RepoCreated { full_name: String },
    CodePushed { sha: String },
    TraceStored { events: usize },
    /// A collaborator call that returned an error
    Failed { server_id: &'static str, action: &'static str, error: String },
}

impl ToolCall {
    pub fn server_id(&self) -> &'static str {
        match self {
            ToolCall::TelemetryInit
            | ToolCall::AnalysisStored
            | ToolCall::DevTraceStored
            | ToolCall::TraceStored { .. } => LOGS_MCP,
            ToolCall::InfraProvisioned => DEPLOYMENT_MCP,
            ToolCall::Healed { .. } => HEALING_MCP,
            ToolCall::RepoCreated { .. } | ToolCall::CodePushed { .. } => GIT_MCP,
            ToolCall::Failed { server_id, .. } => *server_id,
        }
    }

    /// Human-readable line for `mcp_activity`
    pub fn activity(&self) -> String {
        match self {
            ToolCall::TelemetryInit => "Logs MCP: Pipeline telemetry initialized".to_string(),
            ToolCall::AnalysisStored => "Logs MCP: Parent Agent analysis stored".to_string(),
            ToolCall::DevTraceStored => "Logs MCP: Dev Agent execution trace stored".to_string(),
            ToolCall::InfraProvisioned => {
                "Deployment MCP: Infrastructure provisioned".to_string()
            }
            ToolCall::Healed { issues_healed } => {
                format!("Healing MCP: {} vulnerabilities patched", issues_healed)
            }
            ToolCall::RepoCreated { full_name } => {
                format!("Git MCP: Repository created -> {}", full_name)
            }
            ToolCall::CodePushed { sha } => format!("Git MCP: Code pushed - {}", sha),
            ToolCall::TraceStored { events } => {
                format!("Logs MCP: Full execution trace stored ({} events)", events)
            }
            ToolCall::Failed {
                server_id,
                action,
                error,
            } => format!("{}: {} failed - {}", display_name(server_id), action, error),
        }
    }
}

fn display_name(server_id: &str) -> &str {
    match server_id {
        GIT_MCP => "Git MCP",
        LOGS_MCP => "Logs MCP",
        DEPLOYMENT_MCP => "Deployment MCP",
        HEALING_MCP => "Healing MCP",
        other => other,
    }
}

/// Repository name for the publish stage.
///
/// Takes the second whitespace-separated token of the prompt, keeps only
/// alphanumerics and `-`, lowercases it. Falls back to `placeholder` when the
/// prompt has a single token or nothing survives sanitization.
pub fn derive_repo_name(prompt: &str, placeholder: &str) -> String {
    let name: String = prompt
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .flat_map(char::to_lowercase)
        .collect();

    if name.is_empty() {
        placeholder.to_string()
    } else {
        name
    }
}

/// Files pushed by the publish stage, from whatever stages produced output.
///
/// `main.py` carries healed code when the Doctor produced some, otherwise the
/// generated code. Deployment files come from the DevOps bundle.
pub fn publish_files(
    dev: &StageOutcome<ServiceCode>,
    devops: &StageOutcome<DeploymentBundle>,
    doctor: &StageOutcome<HealingReport>,
) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();

    if let Some(service) = dev.output() {
        let code = doctor
            .output()
            .map(|report| report.healed_code.as_str())
            .filter(|code| !code.is_empty())
            .unwrap_or(&service.service_code);
        files.insert("main.py".to_string(), code.to_string());
    }

    if let Some(bundle) = devops.output() {
        files.extend(bundle.files());
    }

    files
}

/// Description attached to the created repository
pub fn repo_description(prompt: &str) -> String {
    let summary: String = prompt.chars().take(80).collect();
    format!("Generated from: {}", summary)
}
