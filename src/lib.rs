//! synapse - hierarchical build-request pipeline orchestrator
//!
//! Turns a natural-language build request into staged artifacts: an
//! architecture decomposition, generated service code, deployment config,
//! an audit/healing report and a publish record.
//!
//! # Architecture
//!
//! A run is a fixed state machine:
//! - The classifier decomposes the prompt into a task graph and spawning plan
//! - Dev and DevOps generators run as the plan allows
//! - The healer audits generated code, only when Dev ran
//! - The publisher creates a repository and pushes whatever was produced
//!
//! Every stage transition lands in a shared, append-only log store and every
//! collaborator call is counted in the tool registry. Stage failures are
//! recorded in the result; they never fail the run.
//!
//! # Modules
//!
//! - `adapters`: Pluggable collaborators (scaffolder, deployer, healer, publisher, Gemini)
//! - `core`: Orchestration logic (LogStore, ToolRegistry, Classifier, Orchestrator)
//! - `domain`: Data structures (TaskNode, LogEntry, PipelineResult)
//! - `server`: HTTP control plane
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a pipeline in-process
//! synapse build "Build a todo app with user authentication"
//!
//! # Serve the HTTP API
//! synapse serve --address 127.0.0.1:8000
//!
//! # Inspect a running server
//! synapse logs --agent dev_agent
//! synapse status
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;

// Re-export main types at crate root for convenience
pub use crate::core::{IntentClassifier, LogQuery, LogStore, Orchestrator, RunLimits, ToolRegistry};
pub use domain::{Classification, LogEntry, LogLevel, PipelineResult, PipelineState};
