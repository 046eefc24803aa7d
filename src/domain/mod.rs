//! Domain types for the synapse orchestrator.
//!
//! This module contains the core data structures:
//! - Task: categories, task graph and spawning plan
//! - Events: Immutable log entries
//! - Run: Pipeline state machine and the unified result
//! - Artifact: Stage outputs

pub mod artifact;
pub mod events;
pub mod run;
pub mod task;

// Re-export commonly used types
pub use artifact::{
    CommitDescriptor, DeploymentBundle, Endpoint, HealingReport, HealingStats, Issue,
    PublishRecord, PushReceipt, RepoDescriptor, ServiceCode, Severity,
};
pub use events::{LogEntry, LogLevel};
pub use run::{PipelineResult, PipelineState, RunMetadata, RunProgress, StageOutcome, Stages};
pub use task::{Category, Classification, Engine, Priority, SpawningPlan, TaskNode};
