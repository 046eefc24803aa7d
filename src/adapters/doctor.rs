//! Rule-based code healer.
//!
//! Every check is a [`Rule`]: an id, a severity, a detection predicate and
//! either an automatic fix or an advisory. Rules are evaluated uniformly in
//! order; fixes are applied in the same order the issues were detected.

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::{Captures, Regex};

use super::Healer;
use crate::domain::artifact::GenerationStatus;
use crate::domain::{HealingReport, HealingStats, Issue, ServiceCode, Severity};

static SECRET_ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(password|secret|api_key)\s*=\s*["'][^"']+["']"#).unwrap()
});

static FASTAPI_APP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(app\s*=\s*FastAPI\(.*?\))").unwrap());

static STANDARD_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            "MISSING_LOGGING",
            Severity::Warning,
            "No logging import or logger instance detected",
            Detection::Requires(Regex::new(r"import logging|logging\.getLogger").unwrap()),
            Remedy::Fix(heal_missing_logging),
        ),
        Rule::new(
            "NO_ERROR_HANDLING",
            Severity::Warning,
            "No try/except blocks found; service may crash on errors",
            Detection::Requires(Regex::new(r"\btry\b\s*:|exception_handler").unwrap()),
            Remedy::Fix(heal_missing_error_handling),
        ),
        Rule::new(
            "HARDCODED_SECRETS",
            Severity::Critical,
            "Potential hardcoded secret or password detected",
            Detection::Forbids(SECRET_ASSIGNMENT_RE.clone()),
            Remedy::Fix(heal_hardcoded_secrets),
        ),
        Rule::new(
            "NO_INPUT_VALIDATION",
            Severity::Info,
            "No Pydantic model used for request validation",
            Detection::Requires(Regex::new(r"BaseModel|Field\(|validator").unwrap()),
            Remedy::Advisory,
        ),
        Rule::new(
            "NO_CORS",
            Severity::Info,
            "CORS middleware not configured; may block frontend requests",
            Detection::Requires(Regex::new(r"CORSMiddleware|add_middleware").unwrap()),
            Remedy::Fix(heal_missing_cors),
        ),
        Rule::new(
            "NO_RATE_LIMITING",
            Severity::Info,
            "No rate limiting detected",
            Detection::Requires(Regex::new(r"RateLimiter|slowapi|throttle").unwrap()),
            Remedy::Advisory,
        ),
    ]
});

/// When a rule reports an issue
#[derive(Debug, Clone)]
pub enum Detection {
    /// Issue when the pattern is absent
    Requires(Regex),
    /// Issue when the pattern is present
    Forbids(Regex),
}

impl Detection {
    pub fn flags(&self, code: &str) -> bool {
        match self {
            Detection::Requires(re) => !re.is_match(code),
            Detection::Forbids(re) => re.is_match(code),
        }
    }
}

/// What to do about a detected issue
#[derive(Debug, Clone, Copy)]
pub enum Remedy {
    Fix(fn(&str) -> String),
    Advisory,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub detection: Detection,
    pub remedy: Remedy,
}

impl Rule {
    pub fn new(
        id: &'static str,
        severity: Severity,
        description: &'static str,
        detection: Detection,
        remedy: Remedy,
    ) -> Self {
        Self {
            id,
            severity,
            description,
            detection,
            remedy,
        }
    }

    fn issue(&self) -> Issue {
        Issue {
            id: self.id.to_string(),
            severity: self.severity,
            description: self.description.to_string(),
        }
    }
}

/// Healer driven by an ordered rule set
#[derive(Debug, Clone)]
pub struct RuleHealer {
    rules: Vec<Rule>,
}

impl Default for RuleHealer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleHealer {
    /// Healer with the standard rule set
    pub fn new() -> Self {
        Self::with_rules(STANDARD_RULES.clone())
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules whose detection fires on `code`, in rule order
    pub fn detect(&self, code: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.detection.flags(code))
            .collect()
    }

    /// Run detection and apply every available fix
    pub fn heal(&self, code: &str) -> HealingReport {
        let flagged = self.detect(code);

        let mut healed = code.to_string();
        let mut summary = Vec::with_capacity(flagged.len());
        let mut issues_healed = 0;

        for rule in &flagged {
            match rule.remedy {
                Remedy::Fix(fix) => {
                    healed = fix(&healed);
                    issues_healed += 1;
                    summary.push(format!("Fixed {}: {}", rule.id, rule.description));
                }
                Remedy::Advisory => {
                    summary.push(format!(
                        "Advisory {}: {} (no auto-fix)",
                        rule.id, rule.description
                    ));
                }
            }
        }

        HealingReport {
            agent: "doctor_agent".to_string(),
            issues_detected: flagged.iter().map(|r| r.issue()).collect(),
            healed_code: healed,
            improvement_summary: summary,
            stats: HealingStats {
                issues_found: flagged.len(),
                issues_healed,
                advisory_only: flagged.len() - issues_healed,
            },
            status: GenerationStatus::succeeded(),
        }
    }
}

#[async_trait]
impl Healer for RuleHealer {
    fn name(&self) -> &str {
        "rule-healer"
    }

    async fn audit_and_heal(&self, service: &ServiceCode) -> Result<HealingReport> {
        Ok(self.heal(&service.service_code))
    }
}

const LOGGING_SETUP: &str = r#"import logging

logging.basicConfig(
    level=logging.INFO,
    format="%(asctime)s | %(name)s | %(levelname)s | %(message)s",
)
logger = logging.getLogger(__name__)

"#;

const ERROR_HANDLER: &str = r#"

# Doctor Agent: global error handler
from fastapi.responses import JSONResponse


@app.exception_handler(Exception)
async def global_exception_handler(request, exc):
    logger.error(f"Unhandled error: {exc}", exc_info=True)
    return JSONResponse(
        status_code=500,
        content={"error": "Internal server error", "detail": str(exc)},
    )
"#;

const CORS_BLOCK: &str = r#"
# Doctor Agent: CORS middleware
from fastapi.middleware.cors import CORSMiddleware

app.add_middleware(
    CORSMiddleware,
    allow_origins=["*"],
    allow_credentials=True,
    allow_methods=["*"],
    allow_headers=["*"],
)
"#;

/// Insert logging setup after the module docstring, or at the top
fn heal_missing_logging(code: &str) -> String {
    if code.contains("import logging") {
        return code.to_string();
    }

    let docstring_end = code.find(r#"""""#).and_then(|start| {
        code[start + 3..]
            .find(r#"""""#)
            .map(|end| start + 3 + end + 3)
    });

    match docstring_end {
        Some(end) => format!("{}\n{}{}", &code[..end], LOGGING_SETUP, &code[end..]),
        None => format!("{}{}", LOGGING_SETUP, code),
    }
}

/// Append a global exception handler
fn heal_missing_error_handling(code: &str) -> String {
    if code.contains("try:") || code.contains("exception_handler") {
        return code.to_string();
    }
    format!("{}{}", code, ERROR_HANDLER)
}

/// Add CORS middleware right after the app is constructed
fn heal_missing_cors(code: &str) -> String {
    if code.contains("CORSMiddleware") {
        return code.to_string();
    }

    match FASTAPI_APP_RE.find(code) {
        Some(m) => format!("{}\n{}{}", &code[..m.end()], CORS_BLOCK, &code[m.end()..]),
        None => format!("{}{}", code, CORS_BLOCK),
    }
}

/// Replace literal secrets with environment lookups
fn heal_hardcoded_secrets(code: &str) -> String {
    let healed = SECRET_ASSIGNMENT_RE.replace_all(code, |caps: &Captures| {
        format!(r#"{} = os.getenv("{}", "")"#, &caps[1], caps[1].to_uppercase())
    });

    if healed.contains("import os") {
        healed.into_owned()
    } else {
        format!("import os\n{}", healed)
    }
}
