//! Adapter interfaces for the pipeline's external collaborators.
//!
//! The orchestrator only depends on the output shape of each collaborator.
//! Deterministic in-process implementations are provided for all of them;
//! the Gemini decomposer is the only one that touches the network.

pub mod devops;
pub mod doctor;
pub mod gemini;
pub mod github;
pub mod scaffold;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    Category, DeploymentBundle, HealingReport, PushReceipt, RepoDescriptor, ServiceCode, TaskNode,
};

pub use devops::DockerDeployer;
pub use doctor::{Detection, Remedy, Rule, RuleHealer};
pub use gemini::GeminiDecomposer;
pub use github::{MockGitHub, PublishError};
pub use scaffold::FastApiScaffolder;

/// Generates backend service code (Dev stage)
#[async_trait]
pub trait BackendGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, task_graph: &[TaskNode]) -> Result<ServiceCode>;
}

/// Generates deployment artifacts (DevOps stage)
#[async_trait]
pub trait DeploymentGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, task_graph: &[TaskNode]) -> Result<DeploymentBundle>;
}

/// Audits generated code and applies fixes (Doctor stage)
#[async_trait]
pub trait Healer: Send + Sync {
    fn name(&self) -> &str;

    async fn audit_and_heal(&self, service: &ServiceCode) -> Result<HealingReport>;
}

/// Version-control publisher (Publish stage)
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Idempotent: a second call with the same name returns the same repository
    async fn create_repo(&self, name: &str, description: &str) -> Result<RepoDescriptor>;

    /// Push files to a repository, creating it first if needed
    async fn push(
        &self,
        repo_name: &str,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<PushReceipt>;
}

/// Unvalidated decomposition returned by an external service.
///
/// Enum fields already reject unknown category/priority values during
/// deserialization; structural checks happen in the classifier.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDecomposition {
    #[serde(default)]
    pub intent: Option<String>,
    pub categories: Vec<Category>,
    pub task_graph: Vec<TaskNode>,
}

#[derive(Debug, Error)]
pub enum DecompositionError {
    #[error("Decomposition request failed: {0}")]
    Transport(String),

    #[error("Decomposition service returned HTTP {0}")]
    Status(u16),

    #[error("Decomposition timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Malformed decomposition response: {0}")]
    Malformed(String),

    #[error("Decomposition violates output contract: {0}")]
    Contract(String),
}

/// Optional external prompt decomposition
#[async_trait]
pub trait Decomposer: Send + Sync {
    fn name(&self) -> &str;

    async fn decompose(&self, prompt: &str) -> Result<RawDecomposition, DecompositionError>;
}
