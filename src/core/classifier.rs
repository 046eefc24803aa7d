//! Intent classification for the Parent stage.
//!
//! The rule-based path is always available: keyword scanning picks the
//! categories and fixed templates produce the task graph. An optional
//! [`Decomposer`] may replace that result, but only after passing the same
//! output contract, and any failure falls back to the rule-based path.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{Decomposer, DecompositionError, RawDecomposition};
use crate::domain::task::AnalysisMetadata;
use crate::domain::{Category, Classification, Engine, Priority, SpawningPlan, TaskNode};

const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "design",
    "architect",
    "structure",
    "schema",
    "database",
    "model",
    "plan",
    "system",
    "scalab",
    "pattern",
    "microservice",
];

const BACKEND_KEYWORDS: &[&str] = &[
    "api",
    "endpoint",
    "server",
    "route",
    "rest",
    "graphql",
    "crud",
    "auth",
    "login",
    "register",
    "backend",
    "service",
    "function",
    "handler",
    "middleware",
    "fastapi",
    "flask",
    "django",
];

const DEPLOYMENT_KEYWORDS: &[&str] = &[
    "deploy",
    "docker",
    "ci",
    "cd",
    "pipeline",
    "kubernetes",
    "k8s",
    "aws",
    "gcp",
    "azure",
    "infra",
    "terraform",
    "helm",
    "nginx",
    "container",
    "cloud",
    "hosting",
];

/// Default bound on an external decomposition call
pub const DEFAULT_DECOMPOSITION_TIMEOUT: Duration = Duration::from_secs(10);

fn keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Architecture => ARCHITECTURE_KEYWORDS,
        Category::Backend => BACKEND_KEYWORDS,
        Category::Deployment => DEPLOYMENT_KEYWORDS,
    }
}

/// Categories whose keywords appear in `prompt`.
///
/// Matching is a case-insensitive substring scan. A prompt that matches
/// nothing is treated as a full-stack request.
pub fn classify_keywords(prompt: &str) -> BTreeSet<Category> {
    let lower = prompt.to_lowercase();
    let found: BTreeSet<Category> = Category::ALL
        .into_iter()
        .filter(|category| keywords(*category).iter().any(|kw| lower.contains(kw)))
        .collect();

    if found.is_empty() {
        Category::ALL.into_iter().collect()
    } else {
        found
    }
}

/// Fixed task templates for a category set, ids assigned from 1
pub fn build_task_graph(prompt: &str, categories: &BTreeSet<Category>) -> Vec<TaskNode> {
    let mut templates: Vec<(Category, &str, String, &str, Priority)> = Vec::new();

    if categories.contains(&Category::Architecture) {
        templates.push((
            Category::Architecture,
            "Design system architecture",
            format!(
                "Analyze requirements from prompt and design the system architecture for: {}",
                truncate_chars(prompt, 120)
            ),
            "parent",
            Priority::High,
        ));
    }

    if categories.contains(&Category::Backend) {
        templates.push((
            Category::Backend,
            "Generate backend service code",
            "Scaffold FastAPI application with CRUD endpoints, models, and route definitions."
                .to_string(),
            "dev_agent",
            Priority::High,
        ));
        templates.push((
            Category::Backend,
            "Create API route definitions",
            "Define RESTful routes, request/response schemas, and validation logic.".to_string(),
            "dev_agent",
            Priority::Medium,
        ));
    }

    if categories.contains(&Category::Deployment) {
        templates.push((
            Category::Deployment,
            "Generate Dockerfile",
            "Create a multi-stage Dockerfile for containerised deployment.".to_string(),
            "devops_agent",
            Priority::Medium,
        ));
        templates.push((
            Category::Deployment,
            "Create CI/CD pipeline config",
            "Generate GitHub Actions / deployment script for automated builds.".to_string(),
            "devops_agent",
            Priority::Low,
        ));
    }

    templates
        .into_iter()
        .zip(1u32..)
        .map(
            |((category, title, description, agent, priority), id)| TaskNode {
                id,
                category,
                title: title.to_string(),
                description,
                assigned_agent: agent.to_string(),
                priority,
            },
        )
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn default_intent(prompt: &str) -> String {
    format!("Build a software system: {}", truncate_chars(prompt, 80))
}

fn assemble(
    prompt: &str,
    intent: String,
    categories: BTreeSet<Category>,
    task_graph: Vec<TaskNode>,
    engine: Engine,
) -> Classification {
    Classification {
        prompt: prompt.to_string(),
        intent,
        spawning_plan: SpawningPlan::from_categories(&categories),
        categories,
        task_graph,
        metadata: AnalysisMetadata {
            agent: "parent_agent".to_string(),
            engine,
            timestamp: Utc::now(),
        },
    }
}

/// Deterministic decomposition; never fails and never yields an empty graph
pub fn rule_based(prompt: &str) -> Classification {
    let categories = classify_keywords(prompt);
    let task_graph = build_task_graph(prompt, &categories);
    assemble(
        prompt,
        default_intent(prompt),
        categories,
        task_graph,
        Engine::RuleBased,
    )
}

/// Check an external decomposition against the classifier's output contract
pub fn validate(raw: &RawDecomposition) -> Result<(), DecompositionError> {
    let contract = |msg: String| Err(DecompositionError::Contract(msg));

    if raw.categories.is_empty() {
        return contract("no categories".to_string());
    }
    if raw.task_graph.is_empty() {
        return contract("empty task graph".to_string());
    }

    let declared: BTreeSet<Category> = raw.categories.iter().copied().collect();
    let mut previous: Option<Category> = None;

    // Ids run 1..=n in category evaluation order, same as the rule-based graph
    for (task, expected) in raw.task_graph.iter().zip(1u32..) {
        if task.id != expected {
            return contract(format!("task id {} at position {}", task.id, expected));
        }
        if task.title.trim().is_empty() {
            return contract(format!("task {} has no title", task.id));
        }
        if !declared.contains(&task.category) {
            return contract(format!(
                "task {} uses undeclared category {}",
                task.id, task.category
            ));
        }
        if previous.is_some_and(|p| task.category < p) {
            return contract(format!(
                "task {} ({}) is out of category order",
                task.id, task.category
            ));
        }
        previous = Some(task.category);
    }

    Ok(())
}

/// Turns prompts into a category set, task graph and spawning plan
#[derive(Clone)]
pub struct IntentClassifier {
    decomposer: Option<Arc<dyn Decomposer>>,
    timeout: Duration,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl IntentClassifier {
    /// Classifier with no external decomposition
    pub fn rule_based() -> Self {
        Self {
            decomposer: None,
            timeout: DEFAULT_DECOMPOSITION_TIMEOUT,
        }
    }

    /// Try `decomposer` first, bounded by `timeout`
    pub fn with_decomposer(decomposer: Arc<dyn Decomposer>, timeout: Duration) -> Self {
        Self {
            decomposer: Some(decomposer),
            timeout,
        }
    }

    pub fn has_decomposer(&self) -> bool {
        self.decomposer.is_some()
    }

    /// Classify a prompt. Always succeeds.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn classify(&self, prompt: &str) -> Classification {
        if let Some(decomposer) = &self.decomposer {
            match self.try_external(decomposer.as_ref(), prompt).await {
                Ok(classification) => {
                    info!(
                        decomposer = decomposer.name(),
                        tasks = classification.task_count(),
                        "External decomposition accepted"
                    );
                    return classification;
                }
                Err(e) => {
                    warn!(
                        decomposer = decomposer.name(),
                        error = %e,
                        "External decomposition failed, using rule-based fallback"
                    );
                }
            }
        }

        let classification = rule_based(prompt);
        debug!(
            categories = ?classification.categories,
            tasks = classification.task_count(),
            "Rule-based classification"
        );
        classification
    }

    async fn try_external(
        &self,
        decomposer: &dyn Decomposer,
        prompt: &str,
    ) -> Result<Classification, DecompositionError> {
        let raw = tokio::time::timeout(self.timeout, decomposer.decompose(prompt))
            .await
            .map_err(|_| DecompositionError::Timeout(self.timeout))??;

        validate(&raw)?;

        let intent = raw
            .intent
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| default_intent(prompt));
        let categories: BTreeSet<Category> = raw.categories.into_iter().collect();

        Ok(assemble(
            prompt,
            intent,
            categories,
            raw.task_graph,
            Engine::Gemini,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned(Result<RawDecomposition, fn() -> DecompositionError>);

    #[async_trait]
    impl Decomposer for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn decompose(&self, _prompt: &str) -> Result<RawDecomposition, DecompositionError> {
            match &self.0 {
                Ok(raw) => Ok(raw.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl Decomposer for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn decompose(&self, _prompt: &str) -> Result<RawDecomposition, DecompositionError> {
            std::future::pending().await
        }
    }

    fn task(id: u32, category: Category) -> TaskNode {
        TaskNode {
            id,
            category,
            title: format!("task {}", id),
            description: String::new(),
            assigned_agent: "dev_agent".to_string(),
            priority: Priority::High,
        }
    }

    fn backend_only() -> RawDecomposition {
        RawDecomposition {
            intent: Some("An API".to_string()),
            categories: vec![Category::Backend],
            task_graph: vec![task(1, Category::Backend)],
        }
    }

    #[test]
    fn test_keyword_matching() {
        let categories = classify_keywords("Build a REST API");
        assert_eq!(categories, [Category::Backend].into_iter().collect());

        // "design" and "docker"
        let categories = classify_keywords("Design it, then DOCKER it");
        assert_eq!(
            categories,
            [Category::Architecture, Category::Deployment]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_no_match_is_full_stack() {
        let classification = rule_based("hello world");
        assert_eq!(classification.categories.len(), 3);
        let ids: Vec<u32> = classification.task_graph.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(classification.engine(), Engine::RuleBased);
    }

    #[test]
    fn test_ids_are_contiguous_without_architecture() {
        let categories: BTreeSet<Category> =
            [Category::Backend, Category::Deployment].into_iter().collect();
        let graph = build_task_graph("x", &categories);
        let ids: Vec<u32> = graph.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(graph[0].title, "Generate backend service code");
        assert_eq!(graph[3].priority, Priority::Low);
    }

    #[test]
    fn test_intent_and_description_truncation() {
        let prompt = "é".repeat(200);
        let classification = rule_based(&prompt);
        assert_eq!(
            classification.intent,
            format!("Build a software system: {}", "é".repeat(80))
        );
        assert!(classification.task_graph[0]
            .description
            .ends_with(&"é".repeat(120)));
    }

    #[test]
    fn test_validate_rejects_undeclared_category() {
        let mut raw = backend_only();
        raw.task_graph.push(task(2, Category::Deployment));
        assert!(matches!(validate(&raw), Err(DecompositionError::Contract(_))));
    }

    #[test]
    fn test_validate_rejects_zero_id_and_empty_graph() {
        let mut raw = backend_only();
        raw.task_graph[0].id = 0;
        assert!(validate(&raw).is_err());

        raw.task_graph.clear();
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn test_validate_rejects_gapped_ids() {
        let raw = RawDecomposition {
            intent: None,
            categories: vec![Category::Backend, Category::Deployment],
            task_graph: vec![task(1, Category::Backend), task(3, Category::Deployment)],
        };
        assert!(matches!(validate(&raw), Err(DecompositionError::Contract(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_order_tasks() {
        let mut raw = RawDecomposition {
            intent: None,
            categories: vec![Category::Backend, Category::Deployment],
            task_graph: vec![task(7, Category::Deployment), task(3, Category::Backend)],
        };
        assert!(matches!(validate(&raw), Err(DecompositionError::Contract(_))));

        // Renumbering alone is not enough; deployment still precedes backend
        raw.task_graph[0].id = 1;
        raw.task_graph[1].id = 2;
        assert!(matches!(validate(&raw), Err(DecompositionError::Contract(_))));

        raw.task_graph.swap(0, 1);
        raw.task_graph[0].id = 1;
        raw.task_graph[1].id = 2;
        assert!(validate(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_external_result_falls_back() {
        let raw = RawDecomposition {
            intent: None,
            categories: vec![Category::Backend, Category::Deployment],
            task_graph: vec![task(7, Category::Deployment), task(3, Category::Backend)],
        };
        let classifier = IntentClassifier::with_decomposer(
            Arc::new(Canned(Ok(raw))),
            DEFAULT_DECOMPOSITION_TIMEOUT,
        );
        let classification = classifier.classify("Run inside docker").await;

        assert_eq!(classification.engine(), Engine::RuleBased);
        let ids: Vec<u32> = classification.task_graph.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_external_result_used_when_valid() {
        let classifier = IntentClassifier::with_decomposer(
            Arc::new(Canned(Ok(backend_only()))),
            DEFAULT_DECOMPOSITION_TIMEOUT,
        );
        let classification = classifier.classify("anything").await;

        assert_eq!(classification.engine(), Engine::Gemini);
        assert_eq!(classification.intent, "An API");
        assert_eq!(
            classification.spawning_plan,
            SpawningPlan {
                dev: true,
                devops: false,
                doctor: true
            }
        );
    }

    #[tokio::test]
    async fn test_error_falls_back() {
        let classifier = IntentClassifier::with_decomposer(
            Arc::new(Canned(Err(|| DecompositionError::Status(500)))),
            DEFAULT_DECOMPOSITION_TIMEOUT,
        );
        let classification = classifier.classify("Run inside docker").await;

        assert_eq!(classification.engine(), Engine::RuleBased);
        assert_eq!(
            classification.categories,
            [Category::Deployment].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let classifier =
            IntentClassifier::with_decomposer(Arc::new(Stalled), Duration::from_millis(20));
        let classification = classifier.classify("hello world").await;

        assert_eq!(classification.engine(), Engine::RuleBased);
        assert_eq!(classification.task_count(), 5);
    }
}
