//! Publisher Integration Tests

use std::collections::BTreeMap;

use synapse::adapters::{MockGitHub, Publisher};

#[tokio::test]
async fn test_create_twice_keeps_identity() {
    let github = MockGitHub::default();
    let first = github.create_repo("x", "first description").await.unwrap();
    let second = github.create_repo("x", "other description").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.description, "first description");
    assert_eq!(github.repo_count(), 1);
}

#[tokio::test]
async fn test_push_to_missing_repo_creates_it() {
    let github = MockGitHub::new("acme");
    let files = BTreeMap::from([("main.py".to_string(), "print('hi')\n".to_string())]);

    let receipt = github.push("new-repo", &files, "init").await.unwrap();
    let repo = github.repo("new-repo").unwrap();

    assert_eq!(repo.full_name, "acme/new-repo");
    assert_eq!(receipt.repo_url, repo.html_url);
    assert_eq!(receipt.commit.additions, 2);
    assert_eq!(github.list_commits("new-repo").len(), 1);

    // Creating afterwards returns the auto-created repository
    let created = github.create_repo("new-repo", "later").await.unwrap();
    assert_eq!(created.id, repo.id);
}
