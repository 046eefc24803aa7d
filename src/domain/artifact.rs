//! Artifacts produced by the generator, healer and publisher stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completion status attached to every generated artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl GenerationStatus {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            timestamp: Utc::now(),
        }
    }
}

/// A single HTTP route in generated service code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
}

impl Endpoint {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

/// Output of the Dev stage (backend scaffolder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCode {
    pub agent: String,
    pub service_code: String,
    pub endpoints: Vec<Endpoint>,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub endpoints_created: usize,
    #[serde(flatten)]
    pub status: GenerationStatus,
}

/// Output of the DevOps stage (deployment generator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentBundle {
    pub agent: String,
    pub dockerfile: String,
    pub deployment_script: String,
    pub ci_config: String,
    pub infra_metadata: InfraMetadata,
    pub status: DeploymentStatus,
}

impl DeploymentBundle {
    /// Files to publish, keyed by repository path
    pub fn files(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Dockerfile".to_string(), self.dockerfile.clone()),
            ("deploy.sh".to_string(), self.deployment_script.clone()),
            (".github/workflows/ci.yml".to_string(), self.ci_config.clone()),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraMetadata {
    pub container_runtime: String,
    pub ci_provider: String,
    pub exposed_port: u16,
    pub health_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub files_generated: usize,
    #[serde(flatten)]
    pub status: GenerationStatus,
}

/// Severity of a detected issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// An issue found by the healer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub severity: Severity,
    pub description: String,
}

/// Output of the Doctor stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingReport {
    pub agent: String,
    pub issues_detected: Vec<Issue>,
    pub healed_code: String,
    pub improvement_summary: Vec<String>,
    pub stats: HealingStats,
    pub status: GenerationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingStats {
    pub issues_found: usize,
    pub issues_healed: usize,
    pub advisory_only: usize,
}

/// Repository as reported by the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub html_url: String,
    pub clone_url: String,
    pub private: bool,
    pub created_at: DateTime<Utc>,
}

/// A commit recorded by the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    pub sha: String,
    pub message: String,
    pub files_changed: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of a push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushReceipt {
    pub commit: CommitDescriptor,
    pub repo_url: String,
}

/// Output of the Publish stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub repo: RepoDescriptor,
    pub push: PushReceipt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_files() {
        let bundle = DeploymentBundle {
            agent: "devops_agent".to_string(),
            dockerfile: "FROM python".to_string(),
            deployment_script: "#!/bin/sh".to_string(),
            ci_config: "name: ci".to_string(),
            infra_metadata: InfraMetadata {
                container_runtime: "Docker".to_string(),
                ci_provider: "GitHub Actions".to_string(),
                exposed_port: 8000,
                health_endpoint: "/health".to_string(),
            },
            status: DeploymentStatus {
                files_generated: 3,
                status: GenerationStatus::succeeded(),
            },
        };

        let files = bundle.files();
        assert_eq!(files.len(), 3);
        assert_eq!(files["Dockerfile"], "FROM python");
        assert!(files.contains_key(".github/workflows/ci.yml"));
    }

    #[test]
    fn test_service_status_flattens() {
        let status = ServiceStatus {
            endpoints_created: 6,
            status: GenerationStatus::succeeded(),
        };
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["endpoints_created"], 6);
        assert_eq!(json["success"], true);
        assert!(json.get("timestamp").is_some());
    }
}
