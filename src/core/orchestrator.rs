//! Main orchestrator for pipeline execution.
//!
//! Drives a run through Parent, Dev, DevOps, Doctor and Publish, honoring the
//! spawning plan produced by classification. Every stage transition appends
//! one entry to the shared [`LogStore`]; every collaborator call is recorded
//! in the [`ToolRegistry`] and the run's activity trail. Stage failures are
//! captured in the result and never abort the run. Cancellation and the run
//! deadline are checked at every stage boundary.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    BackendGenerator, DeploymentGenerator, DockerDeployer, FastApiScaffolder, GeminiDecomposer,
    Healer, MockGitHub, Publisher, RuleHealer,
};
use crate::config::ResolvedConfig;
use crate::domain::run::round_millis;
use crate::domain::{
    Classification, DeploymentBundle, LogLevel, PipelineResult, PipelineState, PublishRecord,
    RunMetadata, RunProgress, ServiceCode, StageOutcome, Stages,
};

use super::classifier::IntentClassifier;
use super::limits::{LimitViolation, RunGuard, RunLimits};
use super::log_store::{LogQuery, LogStore};
use super::pipeline::{
    derive_repo_name, publish_files, repo_description, Stage, ToolCall, COMMIT_MESSAGE,
    ORCHESTRATOR_AGENT, PIPELINE_TITLE,
};
use super::registry::{
    simulate_activity, ToolRegistry, DEPLOYMENT_MCP, GIT_MCP, HEALING_MCP, LOGS_MCP,
};

/// Per-orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub limits: RunLimits,
    /// Log entries included in each result
    pub log_tail: usize,
    /// Repository name when none can be derived from the prompt
    pub placeholder_repo: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            limits: RunLimits::default(),
            log_tail: 30,
            placeholder_repo: "synapse-project".to_string(),
        }
    }
}

/// Mutable state of a single run
struct RunContext {
    run_id: Uuid,
    progress: RunProgress,
    stages: Stages,
    activity: Vec<String>,
}

impl RunContext {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            progress: RunProgress::new(),
            stages: Stages::pending(StageOutcome::Cancelled),
            activity: Vec::new(),
        }
    }

    fn advance(&mut self, state: PipelineState) {
        if let Err(e) = self.progress.advance(state) {
            error!(run_id = %self.run_id, error = %e, "Pipeline state machine rejected transition");
        }
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    classifier: IntentClassifier,
    backend: Arc<dyn BackendGenerator>,
    deployer: Arc<dyn DeploymentGenerator>,
    healer: Arc<dyn Healer>,
    publisher: Arc<dyn Publisher>,
    logs: Arc<LogStore>,
    registry: Arc<ToolRegistry>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Orchestrator with the deterministic collaborators and the given stores
    pub fn new(logs: Arc<LogStore>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            classifier: IntentClassifier::rule_based(),
            backend: Arc::new(FastApiScaffolder::new()),
            deployer: Arc::new(DockerDeployer::new()),
            healer: Arc::new(RuleHealer::new()),
            publisher: Arc::new(MockGitHub::default()),
            logs,
            registry,
            settings: OrchestratorSettings::default(),
        }
    }

    /// Wire an orchestrator from resolved configuration
    pub fn from_config(
        config: &ResolvedConfig,
        logs: Arc<LogStore>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let decomposition = &config.decomposition;
        let classifier = match decomposition.api_key.as_deref() {
            Some(key) if decomposition.enabled() => {
                info!(model = %decomposition.model, "External decomposition enabled");
                let gemini = GeminiDecomposer::new(key)
                    .with_endpoint(decomposition.endpoint.clone())
                    .with_model(decomposition.model.clone());
                IntentClassifier::with_decomposer(Arc::new(gemini), decomposition.timeout())
            }
            _ => IntentClassifier::rule_based(),
        };

        Self::new(logs, registry)
            .with_classifier(classifier)
            .with_publisher(Arc::new(MockGitHub::new(config.publisher.org.clone())))
            .with_settings(OrchestratorSettings {
                limits: config.limits.clone(),
                log_tail: config.log_tail,
                placeholder_repo: config.publisher.placeholder_repo.clone(),
            })
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn BackendGenerator>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_deployer(mut self, deployer: Arc<dyn DeploymentGenerator>) -> Self {
        self.deployer = deployer;
        self
    }

    pub fn with_healer(mut self, healer: Arc<dyn Healer>) -> Self {
        self.healer = healer;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn logs(&self) -> &Arc<LogStore> {
        &self.logs
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Validate a prompt against the configured limits
    pub fn validate_prompt(&self, prompt: &str) -> Result<(), LimitViolation> {
        self.settings.limits.validate_prompt(prompt)
    }

    /// Run the pipeline to completion with no external cancellation
    pub async fn run_pipeline(&self, prompt: &str) -> PipelineResult {
        self.run(prompt, CancellationToken::new()).await
    }

    /// Execute a full run.
    ///
    /// Always returns a well-formed result. Cancelling `cancel` stops the run
    /// at the next stage boundary; stages not reached are marked cancelled.
    pub async fn run(&self, prompt: &str, cancel: CancellationToken) -> PipelineResult {
        let run_id = Uuid::new_v4();
        self.execute(run_id, prompt, cancel).await
    }

    #[instrument(skip_all, fields(%run_id))]
    async fn execute(
        &self,
        run_id: Uuid,
        prompt: &str,
        cancel: CancellationToken,
    ) -> PipelineResult {
        let started_at = Instant::now();
        let guard = self.settings.limits.guard(cancel);
        let mut ctx = RunContext::new(run_id);

        info!("Starting pipeline execution");
        self.logs.append(
            ORCHESTRATOR_AGENT,
            "pipeline_start",
            json!({ "run_id": run_id, "prompt": prompt }),
        );
        self.tool_call(&mut ctx, ToolCall::TelemetryInit);

        let aborted = match self.run_stages(&mut ctx, &guard, prompt).await {
            Ok(()) => {
                ctx.advance(PipelineState::Complete);
                None
            }
            Err(violation) => {
                warn!(reason = %violation, state = ?ctx.progress.state(), "Pipeline aborted");
                self.logs.append_with_level(
                    ORCHESTRATOR_AGENT,
                    "pipeline_aborted",
                    json!({
                        "reason": violation.to_string(),
                        "last_state": ctx.progress.state(),
                    }),
                    LogLevel::Warning,
                );
                ctx.progress.abort();
                Some(violation.to_string())
            }
        };

        self.logs.append(
            ORCHESTRATOR_AGENT,
            "pipeline_complete",
            json!({
                "duration_seconds": started_at.elapsed().as_secs_f64(),
                "aborted": aborted.is_some(),
            }),
        );
        let duration_seconds = round_millis(started_at.elapsed().as_secs_f64());

        let events = ctx.activity.len();
        self.tool_call(&mut ctx, ToolCall::TraceStored { events });

        info!(duration_seconds, aborted = aborted.is_some(), "Pipeline complete");

        let RunContext {
            progress,
            stages,
            activity,
            ..
        } = ctx;

        PipelineResult {
            pipeline: PIPELINE_TITLE.to_string(),
            prompt: prompt.to_string(),
            duration_seconds,
            metadata: RunMetadata {
                run_id,
                completed_at: Utc::now(),
                engine: stages.parent.output().map(Classification::engine),
                final_state: progress.state(),
                states: progress.history().to_vec(),
                aborted,
            },
            stages,
            mcp_activity: activity,
            mcp_simulation: simulate_activity(),
            logs: self.logs.query(&LogQuery::latest(self.settings.log_tail)),
        }
    }

    /// Run every stage in order. Returns early only on cancellation or deadline.
    async fn run_stages(
        &self,
        ctx: &mut RunContext,
        guard: &RunGuard,
        prompt: &str,
    ) -> Result<(), LimitViolation> {
        // Parent
        let classification = guard.race(self.classifier.classify(prompt)).await?;
        self.logs.append(
            Stage::Parent.agent(),
            "analysis_complete",
            json!({
                "stage": Stage::Parent.key(),
                "categories": classification.categories,
                "task_count": classification.task_count(),
                "engine": classification.engine(),
            }),
        );
        self.tool_call(ctx, ToolCall::AnalysisStored);
        ctx.advance(PipelineState::ParentDone);

        // Read once; not re-evaluated for the rest of the run
        let plan = classification.spawning_plan;
        let tasks = classification.task_graph.clone();
        ctx.stages.parent = StageOutcome::Completed(classification);

        // Dev and DevOps are independent; run both, record in fixed order
        let dev = async {
            if plan.dev {
                Some(self.backend.generate(prompt, &tasks).await)
            } else {
                None
            }
        };
        let devops = async {
            if plan.devops {
                Some(self.deployer.generate(prompt, &tasks).await)
            } else {
                None
            }
        };
        let (dev, devops) = guard.race(async { tokio::join!(dev, devops) }).await?;
        self.record_dev(ctx, dev);
        self.record_devops(ctx, devops);

        // Doctor runs only when the plan allows it and Dev was not skipped
        if plan.doctor && !ctx.stages.dev.is_skipped() {
            self.run_doctor(ctx, guard).await?;
        } else {
            self.stage_skipped(Stage::Doctor, "dev stage skipped");
            ctx.stages.doctor = StageOutcome::Skipped;
            ctx.advance(PipelineState::DoctorSkipped);
        }

        self.run_publish(ctx, guard, prompt).await?;
        ctx.advance(PipelineState::Published);

        Ok(())
    }

    fn record_dev(&self, ctx: &mut RunContext, outcome: Option<Result<ServiceCode>>) {
        let Some(outcome) = outcome else {
            self.stage_skipped(Stage::Dev, "backend not in spawning plan");
            ctx.stages.dev = StageOutcome::Skipped;
            ctx.advance(PipelineState::DevSkipped);
            return;
        };

        ctx.stages.dev = match outcome {
            Ok(service) => {
                self.logs.append(
                    Stage::Dev.agent(),
                    "generation_complete",
                    json!({
                        "stage": Stage::Dev.key(),
                        "endpoints": service.status.endpoints_created,
                    }),
                );
                self.tool_call(ctx, ToolCall::DevTraceStored);
                StageOutcome::Completed(service)
            }
            Err(e) => {
                let message = self.stage_failed(Stage::Dev, &e);
                self.tool_call(
                    ctx,
                    ToolCall::Failed {
                        server_id: LOGS_MCP,
                        action: "Dev Agent generation",
                        error: message.clone(),
                    },
                );
                StageOutcome::Failed(message)
            }
        };
        ctx.advance(PipelineState::DevDone);
    }

    fn record_devops(&self, ctx: &mut RunContext, outcome: Option<Result<DeploymentBundle>>) {
        let Some(outcome) = outcome else {
            self.stage_skipped(Stage::DevOps, "deployment not in spawning plan");
            ctx.stages.devops = StageOutcome::Skipped;
            ctx.advance(PipelineState::DevOpsSkipped);
            return;
        };

        ctx.stages.devops = match outcome {
            Ok(bundle) => {
                self.logs.append(
                    Stage::DevOps.agent(),
                    "generation_complete",
                    json!({
                        "stage": Stage::DevOps.key(),
                        "files": bundle.status.files_generated,
                    }),
                );
                self.tool_call(ctx, ToolCall::InfraProvisioned);
                StageOutcome::Completed(bundle)
            }
            Err(e) => {
                let message = self.stage_failed(Stage::DevOps, &e);
                self.tool_call(
                    ctx,
                    ToolCall::Failed {
                        server_id: DEPLOYMENT_MCP,
                        action: "Infrastructure provisioning",
                        error: message.clone(),
                    },
                );
                StageOutcome::Failed(message)
            }
        };
        ctx.advance(PipelineState::DevOpsDone);
    }

    async fn run_doctor(
        &self,
        ctx: &mut RunContext,
        guard: &RunGuard,
    ) -> Result<(), LimitViolation> {
        let Some(service) = ctx.stages.dev.output() else {
            // Dev ran but failed: nothing to audit
            let e = anyhow::anyhow!("no generated service code available to audit");
            ctx.stages.doctor = StageOutcome::Failed(self.stage_failed(Stage::Doctor, &e));
            ctx.advance(PipelineState::DoctorDone);
            return Ok(());
        };

        let outcome = guard.race(self.healer.audit_and_heal(service)).await?;
        ctx.stages.doctor = match outcome {
            Ok(report) => {
                self.logs.append(
                    Stage::Doctor.agent(),
                    "healing_complete",
                    json!({
                        "stage": Stage::Doctor.key(),
                        "issues_found": report.stats.issues_found,
                        "issues_healed": report.stats.issues_healed,
                    }),
                );
                self.tool_call(
                    ctx,
                    ToolCall::Healed {
                        issues_healed: report.stats.issues_healed,
                    },
                );
                StageOutcome::Completed(report)
            }
            Err(e) => {
                let message = self.stage_failed(Stage::Doctor, &e);
                self.tool_call(
                    ctx,
                    ToolCall::Failed {
                        server_id: HEALING_MCP,
                        action: "Code healing",
                        error: message.clone(),
                    },
                );
                StageOutcome::Failed(message)
            }
        };
        ctx.advance(PipelineState::DoctorDone);
        Ok(())
    }

    async fn run_publish(
        &self,
        ctx: &mut RunContext,
        guard: &RunGuard,
        prompt: &str,
    ) -> Result<(), LimitViolation> {
        let repo_name = derive_repo_name(prompt, &self.settings.placeholder_repo);
        let mut errors: Vec<String> = Vec::new();

        let created = guard
            .race(self.publisher.create_repo(&repo_name, &repo_description(prompt)))
            .await?;
        let repo = match created {
            Ok(repo) => {
                self.tool_call(
                    ctx,
                    ToolCall::RepoCreated {
                        full_name: repo.full_name.clone(),
                    },
                );
                Some(repo)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.tool_call(
                    ctx,
                    ToolCall::Failed {
                        server_id: GIT_MCP,
                        action: "Repository creation",
                        error: message.clone(),
                    },
                );
                errors.push(message);
                None
            }
        };

        // Push whatever generated files exist, even after earlier failures
        let files = publish_files(&ctx.stages.dev, &ctx.stages.devops, &ctx.stages.doctor);
        let pushed = guard
            .race(self.publisher.push(&repo_name, &files, COMMIT_MESSAGE))
            .await?;
        let push = match pushed {
            Ok(receipt) => {
                self.tool_call(
                    ctx,
                    ToolCall::CodePushed {
                        sha: receipt.commit.sha.clone(),
                    },
                );
                Some(receipt)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.tool_call(
                    ctx,
                    ToolCall::Failed {
                        server_id: GIT_MCP,
                        action: "Code push",
                        error: message.clone(),
                    },
                );
                errors.push(message);
                None
            }
        };

        ctx.stages.publish = match (repo, push) {
            (Some(repo), Some(push)) => {
                self.logs.append(
                    Stage::Publish.agent(),
                    "publish_complete",
                    json!({
                        "stage": Stage::Publish.key(),
                        "repo": repo.full_name,
                        "sha": push.commit.sha,
                        "files": push.commit.files_changed.len(),
                    }),
                );
                StageOutcome::Completed(PublishRecord { repo, push })
            }
            _ => {
                let e = anyhow::anyhow!(errors.join("; "));
                StageOutcome::Failed(self.stage_failed(Stage::Publish, &e))
            }
        };

        Ok(())
    }

    /// Bump the registry counter and extend the activity trail
    fn tool_call(&self, ctx: &mut RunContext, call: ToolCall) {
        self.registry.record_invocation(call.server_id());
        ctx.activity.push(call.activity());
    }

    fn stage_skipped(&self, stage: Stage, reason: &str) {
        self.logs.append(
            stage.agent(),
            "stage_skipped",
            json!({ "stage": stage.key(), "reason": reason }),
        );
    }

    /// Log a stage failure at error level and return the message for the result
    fn stage_failed(&self, stage: Stage, e: &anyhow::Error) -> String {
        let message = format!("{:#}", e);
        warn!(stage = %stage, error = %message, "Stage failed");
        self.logs.append_with_level(
            stage.agent(),
            "stage_failed",
            json!({ "stage": stage.key(), "error": message }),
            LogLevel::Error,
        );
        message
    }
}

/// Summary line for operator output
pub fn summarize(result: &PipelineResult) -> Value {
    json!({
        "run_id": result.metadata.run_id,
        "duration_seconds": result.duration_seconds,
        "final_state": result.metadata.final_state,
        "aborted": result.metadata.aborted,
        "activity": result.mcp_activity.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(LogStore::new()), Arc::new(ToolRegistry::new()))
    }

    #[tokio::test]
    async fn test_full_stack_run() {
        let orch = orchestrator();
        let result = orch.run_pipeline("hello world").await;

        assert!(result.stages.dev.is_completed());
        assert!(result.stages.devops.is_completed());
        assert!(result.stages.doctor.is_completed());
        assert!(result.stages.publish.is_completed());
        assert_eq!(result.metadata.final_state, PipelineState::Complete);
        assert_eq!(result.metadata.aborted, None);
        assert_eq!(
            result.mcp_activity.last().map(String::as_str),
            Some("Logs MCP: Full execution trace stored (7 events)")
        );
    }

    #[tokio::test]
    async fn test_one_log_per_stage() {
        let orch = orchestrator();
        orch.run_pipeline("Deploy app to production").await;

        // start, parent, dev skip, devops, doctor skip, publish, complete
        assert_eq!(orch.logs().len(), 7);
    }

    #[tokio::test]
    async fn test_parent_output_in_result() {
        let orch = orchestrator();
        let result = orch.run_pipeline("Run inside docker").await;
        let parent = result.stages.parent.output().unwrap();

        assert_eq!(
            parent.categories,
            [Category::Deployment].into_iter().collect()
        );
        assert!(result.stages.dev.is_skipped());
        assert_eq!(result.stages.dev.error(), None);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orch = orchestrator();
        let token = CancellationToken::new();
        token.cancel();

        let result = orch.run("hello world", token).await;
        assert!(matches!(result.stages.parent, StageOutcome::Cancelled));
        assert!(matches!(result.stages.publish, StageOutcome::Cancelled));
        assert_eq!(result.metadata.engine, None);
        assert_eq!(result.metadata.final_state, PipelineState::Complete);
        assert!(result.metadata.aborted.is_some());
    }

    #[test]
    fn test_summarize() {
        let result = tokio_test::block_on(orchestrator().run_pipeline("hello world"));
        let summary = summarize(&result);
        assert_eq!(summary["final_state"], "complete");
        assert_eq!(summary["activity"], 8);
    }
}
