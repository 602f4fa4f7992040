//! Data model for extraction runs: fields, tier attempts, per-URL results,
//! batch aggregates, and the configuration knobs the caller can turn.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// One extraction strategy, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    /// Plain HTTP fetch + structured-data/heuristic parsing.
    Static,
    /// Headless-browser render, then the same parsing over the rendered DOM.
    Rendered,
    /// Visible page text submitted to a schema-constrained language model.
    Semantic,
}

impl std::fmt::Display for TierName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Rendered => f.write_str("rendered"),
            Self::Semantic => f.write_str("semantic"),
        }
    }
}

/// The five storable job-posting fields.
///
/// Absent fields are `None`, never a placeholder string. Produced once per
/// successful tier attempt and scrubbed by the redactor before leaving the
/// engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub description: Option<String>,
}

impl ExtractedFields {
    /// A tier result is complete when both title and company are non-empty.
    ///
    /// Location, salary, and description are best-effort; their absence does
    /// not force escalation.
    pub fn is_complete(&self) -> bool {
        fn filled(field: &Option<String>) -> bool {
            field.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        filled(&self.title) && filled(&self.company)
    }

    /// Normalize: map empty/whitespace-only strings and placeholder
    /// sentinels ("Unknown", "N/A", ...) to `None`.
    pub fn normalized(mut self) -> Self {
        fn clean(field: &mut Option<String>) {
            if field.as_deref().is_some_and(|s| {
                let trimmed = s.trim();
                trimmed.is_empty()
                    || matches!(
                        trimmed.to_ascii_lowercase().as_str(),
                        "unknown" | "n/a" | "none" | "not specified" | "null"
                    )
            }) {
                *field = None;
            }
        }
        clean(&mut self.title);
        clean(&mut self.company);
        clean(&mut self.location);
        clean(&mut self.salary);
        clean(&mut self.description);
        self
    }
}

/// Outcome classification for a single tier attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOutcome {
    /// Title and company both present; escalation stops here.
    Success,
    /// Fields extracted but missing title or company; escalate.
    Incomplete,
    /// The tier failed outright; escalate.
    Error,
}

/// Immutable record of one tier attempt within a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: TierName,
    pub outcome: TierOutcome,
    /// Present for `Success` and `Incomplete` outcomes.
    pub fields: Option<ExtractedFields>,
    /// Present for `Error` outcomes.
    pub error: Option<ExtractError>,
}

impl TierAttempt {
    /// Classify extracted fields into a success or incomplete attempt.
    pub fn from_fields(tier: TierName, fields: ExtractedFields) -> Self {
        let fields = fields.normalized();
        let outcome = if fields.is_complete() {
            TierOutcome::Success
        } else {
            TierOutcome::Incomplete
        };
        Self {
            tier,
            outcome,
            fields: Some(fields),
            error: None,
        }
    }

    /// Record a tier failure.
    pub fn from_error(tier: TierName, error: ExtractError) -> Self {
        Self {
            tier,
            outcome: TierOutcome::Error,
            fields: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TierOutcome::Success
    }
}

/// Why the compliance gate decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Fetch permitted (robots.txt allows, or no robots.txt exists).
    Ok,
    /// A matching robots.txt rule denies the fetch.
    Disallowed,
    /// robots.txt could not be fetched; gate is failing closed.
    Unreachable,
    /// robots.txt could not be fetched; gate is configured to fail open.
    Unknown,
}

/// Per-host verdict on whether an automated fetch is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl ComplianceDecision {
    pub fn ok() -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Ok,
        }
    }

    pub fn disallowed() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Disallowed,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Unreachable,
        }
    }

    /// Allowed despite an unreadable robots.txt (fail-open configuration).
    pub fn unknown() -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Unknown,
        }
    }
}

/// Terminal per-URL value returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The URL as submitted by the caller (pre-normalization).
    pub url: String,
    pub success: bool,
    /// Present iff `success`; already redacted.
    pub fields: Option<ExtractedFields>,
    /// The tier that produced the accepted fields; present iff `success`.
    pub method: Option<TierName>,
    /// Terminal cause; present iff not `success`.
    pub error: Option<ExtractError>,
    /// Ordered tier attempts recorded during the run.
    pub attempts: Vec<TierAttempt>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn success(
        url: impl Into<String>,
        method: TierName,
        fields: ExtractedFields,
        attempts: Vec<TierAttempt>,
    ) -> Self {
        Self {
            url: url.into(),
            success: true,
            fields: Some(fields),
            method: Some(method),
            error: None,
            attempts,
            extracted_at: Utc::now(),
        }
    }

    pub fn failure(
        url: impl Into<String>,
        error: ExtractError,
        attempts: Vec<TierAttempt>,
    ) -> Self {
        Self {
            url: url.into(),
            success: false,
            fields: None,
            method: None,
            error: Some(error),
            attempts,
            extracted_at: Utc::now(),
        }
    }

    /// Human-readable error reason for API surfaces, if failed.
    pub fn error_reason(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Ordered batch response: one result per input URL, input order preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<ExtractionResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    pub fn from_results(results: Vec<ExtractionResult>) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total,
            succeeded,
            failed: total - succeeded,
            results,
        }
    }
}

/// Configuration for the compliance gate.
#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    /// Master switch. Disabling skips robots.txt checks and host pacing
    /// entirely; the gate logs this loudly at construction.
    pub enabled: bool,

    /// When robots.txt cannot be fetched: `false` (default) refuses the URL
    /// as unreachable, `true` lets it through with reason `Unknown`.
    pub fail_open: bool,

    /// How long a fetched robots.txt stays valid per host.
    pub cache_ttl: Duration,

    /// Sustained per-host request rate.
    pub requests_per_minute: u32,

    /// Burst allowance on top of the sustained rate.
    pub burst: u32,

    /// Longest a pipeline will block waiting for a per-host permit before
    /// failing with `RateLimited`.
    pub max_permit_wait: Duration,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_open: false,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            requests_per_minute: 30,
            burst: 5,
            max_permit_wait: Duration::from_secs(10),
        }
    }
}

impl ComplianceConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_rate(mut self, requests_per_minute: u32, burst: u32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self.burst = burst;
        self
    }

    pub fn with_max_permit_wait(mut self, wait: Duration) -> Self {
        self.max_permit_wait = wait;
        self
    }
}

/// Configuration for a single engine instance (shared by all batch items).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Declared agent identifier, used for robots.txt evaluation and the
    /// `User-Agent` header on robots fetches.
    pub user_agent: String,

    pub compliance: ComplianceConfig,

    /// Deadline for the static tier's fetch + parse.
    pub static_timeout: Duration,

    /// Deadline for the rendered tier's navigation + settle + DOM grab.
    pub rendered_timeout: Duration,

    /// Deadline for the semantic tier's model round-trip.
    pub semantic_timeout: Duration,

    /// Gate for the rendered tier (headless browser may be absent in some
    /// deployments).
    pub rendered_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "JobflowBot/1.0".to_string(),
            compliance: ComplianceConfig::default(),
            static_timeout: Duration::from_secs(10),
            rendered_timeout: Duration::from_secs(30),
            semantic_timeout: Duration::from_secs(60),
            rendered_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_compliance(mut self, compliance: ComplianceConfig) -> Self {
        self.compliance = compliance;
        self
    }

    pub fn with_static_timeout(mut self, timeout: Duration) -> Self {
        self.static_timeout = timeout;
        self
    }

    pub fn with_rendered_timeout(mut self, timeout: Duration) -> Self {
        self.rendered_timeout = timeout;
        self
    }

    pub fn with_semantic_timeout(mut self, timeout: Duration) -> Self {
        self.semantic_timeout = timeout;
        self
    }

    pub fn with_rendered_enabled(mut self, enabled: bool) -> Self {
        self.rendered_enabled = enabled;
        self
    }
}

/// Configuration for one batch call.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Upper bound on concurrently running per-URL pipelines.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }
}
