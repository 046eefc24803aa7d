//! Classifier Integration Tests
//!
//! Category selection, task graph numbering and spawning plan derivation.

use std::collections::BTreeSet;

use synapse::core::classifier::{build_task_graph, classify_keywords, rule_based};
use synapse::domain::{Category, SpawningPlan};

fn set(categories: &[Category]) -> BTreeSet<Category> {
    categories.iter().copied().collect()
}

#[test]
fn test_unmatched_prompt_is_full_stack() {
    for prompt in ["hello world", "make me something nice", "xyz"] {
        let classification = rule_based(prompt);

        assert_eq!(classification.categories, set(&Category::ALL));
        let ids: Vec<u32> = classification.task_graph.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5], "prompt: {}", prompt);
    }
}

#[test]
fn test_deployment_only_prompt() {
    let classification = rule_based("Run inside docker");

    assert_eq!(classification.categories, set(&[Category::Deployment]));
    assert_eq!(classification.task_count(), 2);
    assert_eq!(
        classification.spawning_plan,
        SpawningPlan {
            dev: false,
            devops: true,
            doctor: true
        }
    );
    assert!(classification
        .task_graph
        .iter()
        .all(|t| t.assigned_agent == "devops_agent"));
}

#[test]
fn test_matching_is_case_insensitive_substring() {
    // "GraphQL" matches backend, "scalable" matches via "scalab"
    assert_eq!(
        classify_keywords("A SCALABLE GraphQL thing"),
        set(&[Category::Architecture, Category::Backend])
    );
}

#[test]
fn test_plan_follows_categories() {
    for prompt in [
        "Build a todo app with user authentication",
        "Deploy app to production",
        "Design a database schema",
        "hello world",
    ] {
        let classification = rule_based(prompt);
        let plan = classification.spawning_plan;

        assert_eq!(plan.dev, classification.categories.contains(&Category::Backend));
        assert_eq!(plan.devops, classification.categories.contains(&Category::Deployment));
        assert!(plan.doctor);
    }
}

#[test]
fn test_task_order_and_ids() {
    let graph = build_task_graph(
        "Design it",
        &set(&[Category::Architecture, Category::Deployment]),
    );

    let summary: Vec<(u32, Category)> = graph.iter().map(|t| (t.id, t.category)).collect();
    assert_eq!(
        summary,
        vec![
            (1, Category::Architecture),
            (2, Category::Deployment),
            (3, Category::Deployment)
        ]
    );
    assert!(graph[0].description.contains("Design it"));
}

#[test]
fn test_parent_record_shape() {
    let classification = rule_based("Build a REST api");
    let json = serde_json::to_value(&classification).unwrap();

    assert_eq!(json["intent"], "Build a software system: Build a REST api");
    assert_eq!(json["metadata"]["agent"], "parent_agent");
    assert_eq!(json["metadata"]["engine"], "rule-based");
    assert_eq!(json["categories"], serde_json::json!(["backend"]));
    assert_eq!(json["task_graph"][0]["priority"], "high");
}
