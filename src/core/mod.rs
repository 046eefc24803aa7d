//! Core orchestration logic.
//!
//! This module contains:
//! - LogStore: Append-only, filterable event log shared by all runs
//! - ToolRegistry: Invocation counters for the external tool adapters
//! - Classifier: Prompt to task graph and spawning plan
//! - Pipeline: Stage sequence, activity strings and publish payload
//! - Limits: Prompt validation, cancellation and run deadline
//! - Orchestrator: Main execution engine

pub mod classifier;
pub mod limits;
pub mod log_store;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;

// Re-export commonly used types
pub use classifier::{classify_keywords, IntentClassifier};
pub use limits::{LimitViolation, RunGuard, RunLimits};
pub use log_store::{LogQuery, LogStore};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use pipeline::{derive_repo_name, Stage, ToolCall};
pub use registry::{simulate_activity, RegistrySnapshot, ToolRegistry, ToolRegistryEntry};
