//! Run state and the unified pipeline result.
//!
//! A run walks a fixed sequence of states:
//!
//! Start -> ParentDone -> DevDone|DevSkipped -> DevOpsDone|DevOpsSkipped
//!       -> DoctorDone|DoctorSkipped -> Published -> Complete
//!
//! An aborted run jumps straight to Complete from wherever it stopped.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use super::artifact::{DeploymentBundle, HealingReport, PublishRecord, ServiceCode};
use super::events::LogEntry;
use super::task::{Classification, Engine};

/// States of the orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    ParentDone,
    DevDone,
    DevSkipped,
    #[serde(rename = "devops_done")]
    DevOpsDone,
    #[serde(rename = "devops_skipped")]
    DevOpsSkipped,
    DoctorDone,
    DoctorSkipped,
    Published,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid pipeline transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Tracks the current state of a run and every state it has visited.
#[derive(Debug, Clone)]
pub struct RunProgress {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Start,
            history: vec![PipelineState::Start],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Check if `target` directly follows the current state
    pub fn can_transition(&self, target: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self.state, target),
            (Start, ParentDone)
                | (ParentDone, DevDone | DevSkipped)
                | (DevDone | DevSkipped, DevOpsDone | DevOpsSkipped)
                | (DevOpsDone | DevOpsSkipped, DoctorDone | DoctorSkipped)
                | (DoctorDone | DoctorSkipped, Published)
                | (Published, Complete)
        )
    }

    pub fn advance(&mut self, target: PipelineState) -> Result<(), InvalidTransition> {
        if !self.can_transition(target) {
            return Err(InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        self.history.push(target);
        Ok(())
    }

    /// Close out an aborted run without visiting the remaining states
    pub fn abort(&mut self) {
        if self.state != PipelineState::Complete {
            self.state = PipelineState::Complete;
            self.history.push(PipelineState::Complete);
        }
    }
}

/// What happened to a single stage.
///
/// Serialized as the stage output itself, or as an explicit marker:
/// `{"skipped": true}`, `{"error": "..."}`, `{"skipped": true, "cancelled": true}`.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    Completed(T),
    Skipped,
    Failed(String),
    Cancelled,
}

impl<T> StageOutcome<T> {
    pub fn output(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped | StageOutcome::Cancelled)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StageOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for StageOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StageOutcome::Completed(output) => output.serialize(serializer),
            StageOutcome::Skipped => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("skipped", &true)?;
                map.end()
            }
            StageOutcome::Failed(error) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", error)?;
                map.end()
            }
            StageOutcome::Cancelled => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("skipped", &true)?;
                map.serialize_entry("cancelled", &true)?;
                map.end()
            }
        }
    }
}

/// Stage outputs in execution order
#[derive(Debug, Clone, Serialize)]
pub struct Stages {
    #[serde(rename = "1_parent_analysis")]
    pub parent: StageOutcome<Classification>,

    #[serde(rename = "2_dev_agent")]
    pub dev: StageOutcome<ServiceCode>,

    #[serde(rename = "3_devops_agent")]
    pub devops: StageOutcome<DeploymentBundle>,

    #[serde(rename = "4_doctor_healing")]
    pub doctor: StageOutcome<HealingReport>,

    #[serde(rename = "5_github_push")]
    pub publish: StageOutcome<PublishRecord>,
}

impl Stages {
    /// All stages not yet reached, cancelled
    pub fn pending(parent: StageOutcome<Classification>) -> Self {
        Self {
            parent,
            dev: StageOutcome::Cancelled,
            devops: StageOutcome::Cancelled,
            doctor: StageOutcome::Cancelled,
            publish: StageOutcome::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    /// Absent when the run stopped before classification finished
    pub engine: Option<Engine>,
    pub final_state: PipelineState,
    pub states: Vec<PipelineState>,
    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

/// Unified result of a single pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub pipeline: String,
    pub prompt: String,
    /// Wall time in seconds, millisecond precision
    pub duration_seconds: f64,
    pub stages: Stages,
    /// Tool calls in call order
    pub mcp_activity: Vec<String>,
    /// Demo strings; not derived from the registry counters
    pub mcp_simulation: Vec<String>,
    /// Newest-first tail of the shared log store
    pub logs: Vec<LogEntry>,
    pub metadata: RunMetadata,
}

/// Round seconds to millisecond precision
pub fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
