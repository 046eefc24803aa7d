//! Task graph and spawning plan produced by intent classification.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Work category a prompt can be decomposed into.
///
/// Declaration order is the evaluation order of the classifier, so the
/// derived `Ord` keeps category sets and task ids in the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Architecture,
    Backend,
    Deployment,
}

impl Category {
    /// All categories in evaluation order
    pub const ALL: [Category; 3] = [
        Category::Architecture,
        Category::Backend,
        Category::Deployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Architecture => "architecture",
            Category::Backend => "backend",
            Category::Deployment => "deployment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A single decomposed work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Sequential id, starting at 1
    pub id: u32,

    pub category: Category,

    pub title: String,

    pub description: String,

    /// Agent expected to carry out the task (e.g. "dev_agent")
    pub assigned_agent: String,

    pub priority: Priority,
}

/// Which downstream stages should run for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawningPlan {
    pub dev: bool,
    pub devops: bool,
    /// Always true; the Doctor stage is additionally gated on Dev having run.
    pub doctor: bool,
}

impl SpawningPlan {
    /// Derive the plan from a category set.
    pub fn from_categories(categories: &BTreeSet<Category>) -> Self {
        Self {
            dev: categories.contains(&Category::Backend),
            devops: categories.contains(&Category::Deployment),
            doctor: true,
        }
    }
}

/// Which decomposition path produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    RuleBased,
    Gemini,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::RuleBased => f.write_str("rule-based"),
            Engine::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub agent: String,
    pub engine: Engine,
    pub timestamp: DateTime<Utc>,
}

/// Output of the Parent stage: categories, task graph and spawning plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub prompt: String,

    /// One-line restatement of the request
    pub intent: String,

    pub categories: BTreeSet<Category>,

    pub task_graph: Vec<TaskNode>,

    pub spawning_plan: SpawningPlan,

    pub metadata: AnalysisMetadata,
}

impl Classification {
    pub fn engine(&self) -> Engine {
        self.metadata.engine
    }

    pub fn task_count(&self) -> usize {
        self.task_graph.len()
    }
}
