//! Deterministic backend scaffolder.
//!
//! Emits a small FastAPI service with CRUD routes over an `items` resource and
//! a health endpoint. Prompts that mention accounts also get register/login
//! routes.

use anyhow::Result;
use async_trait::async_trait;

use super::BackendGenerator;
use crate::domain::artifact::{GenerationStatus, ServiceStatus};
use crate::domain::{Endpoint, ServiceCode, TaskNode};

const AUTH_KEYWORDS: &[&str] = &["auth", "login", "register", "user"];

const HEADER: &str = r#""""
Auto-generated FastAPI service for: __PROMPT__
"""

from fastapi import FastAPI, HTTPException
from pydantic import BaseModel

app = FastAPI(title="SYNAPSE-X Generated Service", version="0.1.0")


class Item(BaseModel):
    id: int | None = None
    name: str
    description: str = ""
    completed: bool = False


_items: dict[int, Item] = {}
_next_id = 1


@app.get("/health")
async def health():
    return {"status": "healthy"}
"#;

const CRUD_ROUTES: &str = r#"

@app.get("/items")
async def list_items():
    return list(_items.values())


@app.get("/items/{item_id}")
async def get_item(item_id: int):
    if item_id not in _items:
        raise HTTPException(status_code=404, detail="Item not found")
    return _items[item_id]


@app.post("/items", status_code=201)
async def create_item(item: Item):
    global _next_id
    item.id = _next_id
    _items[_next_id] = item
    _next_id += 1
    return item


@app.put("/items/{item_id}")
async def update_item(item_id: int, item: Item):
    if item_id not in _items:
        raise HTTPException(status_code=404, detail="Item not found")
    item.id = item_id
    _items[item_id] = item
    return item


@app.delete("/items/{item_id}", status_code=204)
async def delete_item(item_id: int):
    if _items.pop(item_id, None) is None:
        raise HTTPException(status_code=404, detail="Item not found")
"#;

const AUTH_ROUTES: &str = r#"

secret = "synapse-dev-secret"


class Credentials(BaseModel):
    username: str
    password: str


_users: dict[str, str] = {}


@app.post("/auth/register", status_code=201)
async def register(credentials: Credentials):
    if credentials.username in _users:
        raise HTTPException(status_code=409, detail="User already exists")
    _users[credentials.username] = credentials.password
    return {"username": credentials.username}


@app.post("/auth/login")
async def login(credentials: Credentials):
    if _users.get(credentials.username) != credentials.password:
        raise HTTPException(status_code=401, detail="Invalid credentials")
    return {"token": f"{credentials.username}:{secret}"}
"#;

/// FastAPI code generator
#[derive(Debug, Default, Clone)]
pub struct FastApiScaffolder;

impl FastApiScaffolder {
    pub fn new() -> Self {
        Self
    }

    fn wants_auth(prompt: &str) -> bool {
        let lower = prompt.to_lowercase();
        AUTH_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    fn render(prompt: &str, with_auth: bool) -> (String, Vec<Endpoint>) {
        let summary: String = prompt
            .chars()
            .take(80)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();

        let mut code = HEADER.replace("__PROMPT__", &summary);
        code.push_str(CRUD_ROUTES);

        let mut endpoints = vec![
            Endpoint::new("GET", "/health"),
            Endpoint::new("GET", "/items"),
            Endpoint::new("GET", "/items/{item_id}"),
            Endpoint::new("POST", "/items"),
            Endpoint::new("PUT", "/items/{item_id}"),
            Endpoint::new("DELETE", "/items/{item_id}"),
        ];

        if with_auth {
            code.push_str(AUTH_ROUTES);
            endpoints.push(Endpoint::new("POST", "/auth/register"));
            endpoints.push(Endpoint::new("POST", "/auth/login"));
        }

        (code, endpoints)
    }
}

#[async_trait]
impl BackendGenerator for FastApiScaffolder {
    fn name(&self) -> &str {
        "fastapi-scaffolder"
    }

    async fn generate(&self, prompt: &str, _task_graph: &[TaskNode]) -> Result<ServiceCode> {
        let (service_code, endpoints) = Self::render(prompt, Self::wants_auth(prompt));

        Ok(ServiceCode {
            agent: "dev_agent".to_string(),
            service_code,
            status: ServiceStatus {
                endpoints_created: endpoints.len(),
                status: GenerationStatus::succeeded(),
            },
            endpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_only() {
        let output = FastApiScaffolder::new()
            .generate("Build an inventory api", &[])
            .await
            .unwrap();

        assert_eq!(output.status.endpoints_created, 6);
        assert!(output.service_code.contains("Build an inventory api"));
        assert!(output.service_code.contains("@app.delete(\"/items/{item_id}\""));
        assert!(!output.service_code.contains("/auth/login"));
    }

    #[tokio::test]
    async fn test_auth_routes_added() {
        let output = FastApiScaffolder::new()
            .generate("Build a todo app with user authentication", &[])
            .await
            .unwrap();

        assert_eq!(output.status.endpoints_created, 8);
        assert_eq!(output.endpoints.len(), 8);
        assert!(output
            .endpoints
            .contains(&Endpoint::new("POST", "/auth/login")));
    }

    #[test]
    fn test_prompt_summary_is_single_line() {
        let (code, _) = FastApiScaffolder::render("line one\nline two", false);
        assert!(code.contains("line one line two"));
    }
}
