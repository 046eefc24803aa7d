//! In-memory repository publisher.
//!
//! Behaves like a tiny hosted git service: repositories are keyed by name,
//! creation is idempotent, and every push appends a commit to the history.
//! State lives for the lifetime of the instance only.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::Publisher;
use crate::domain::{CommitDescriptor, PushReceipt, RepoDescriptor};

const DEFAULT_ORG: &str = "synapse-x-org";
const BOT_AUTHOR: &str = "synapse-x-bot";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Invalid repository name: '{0}'")]
    InvalidName(String),
}

#[derive(Debug)]
struct RepoRecord {
    descriptor: RepoDescriptor,
    commits: Vec<CommitDescriptor>,
}

/// Mock GitHub publisher
#[derive(Debug)]
pub struct MockGitHub {
    org: String,
    repos: Mutex<HashMap<String, RepoRecord>>,
}

impl Default for MockGitHub {
    fn default() -> Self {
        Self::new(DEFAULT_ORG)
    }
}

impl MockGitHub {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            repos: Mutex::new(HashMap::new()),
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    fn new_record(&self, name: &str, description: &str) -> RepoRecord {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let full_name = format!("{}/{}", self.org, name);
        RepoRecord {
            descriptor: RepoDescriptor {
                id,
                name: name.to_string(),
                html_url: format!("https://github.com/{}", full_name),
                clone_url: format!("https://github.com/{}.git", full_name),
                full_name,
                description: description.to_string(),
                private: false,
                created_at: Utc::now(),
            },
            commits: Vec::new(),
        }
    }

    fn validate_name(name: &str) -> Result<(), PublishError> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(PublishError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Commit history of a repository, oldest first
    pub fn list_commits(&self, repo_name: &str) -> Vec<CommitDescriptor> {
        self.repos
            .lock()
            .get(repo_name)
            .map(|r| r.commits.clone())
            .unwrap_or_default()
    }

    pub fn repo(&self, repo_name: &str) -> Option<RepoDescriptor> {
        self.repos.lock().get(repo_name).map(|r| r.descriptor.clone())
    }

    pub fn repo_count(&self) -> usize {
        self.repos.lock().len()
    }
}

/// First 7 hex chars of a SHA-256 over the commit contents
fn commit_sha(
    repo_name: &str,
    message: &str,
    files: &BTreeMap<String, String>,
    timestamp: &DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_name.as_bytes());
    hasher.update([0]);
    hasher.update(message.as_bytes());
    hasher.update([0]);
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(content.as_bytes());
        hasher.update([0]);
    }
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())[..7].to_string()
}

#[async_trait]
impl Publisher for MockGitHub {
    fn name(&self) -> &str {
        "mock-github"
    }

    async fn create_repo(&self, name: &str, description: &str) -> Result<RepoDescriptor> {
        Self::validate_name(name)?;

        let mut repos = self.repos.lock();
        if let Some(existing) = repos.get(name) {
            debug!(repo = name, "Repository already exists");
            return Ok(existing.descriptor.clone());
        }

        let record = self.new_record(name, description);
        let descriptor = record.descriptor.clone();
        repos.insert(name.to_string(), record);
        info!(repo = %descriptor.full_name, "Repository created");

        Ok(descriptor)
    }

    async fn push(
        &self,
        repo_name: &str,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<PushReceipt> {
        Self::validate_name(repo_name)?;

        let timestamp = Utc::now();
        let commit = CommitDescriptor {
            sha: commit_sha(repo_name, message, files, &timestamp),
            message: message.to_string(),
            files_changed: files.keys().cloned().collect(),
            additions: files.values().map(|content| content.split('\n').count()).sum(),
            deletions: 0,
            author: BOT_AUTHOR.to_string(),
            timestamp,
        };

        let mut repos = self.repos.lock();
        let record = repos
            .entry(repo_name.to_string())
            .or_insert_with(|| self.new_record(repo_name, "Auto-created by SYNAPSE-X"));
        record.commits.push(commit.clone());

        info!(
            repo = repo_name,
            sha = %commit.sha,
            files = commit.files_changed.len(),
            "Code pushed"
        );

        Ok(PushReceipt {
            commit,
            repo_url: record.descriptor.html_url.clone(),
        })
    }
}
