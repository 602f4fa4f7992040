//! Typed errors for the extraction engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so every per-URL
//! outcome carries a strongly-typed, serializable cause. Errors here are
//! values recorded into tier attempts and results, never control flow for
//! the expected "incomplete, escalate" case.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TierName;

/// Why the compliance gate refused a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceReason {
    /// A matching robots.txt rule denies our agent (or the wildcard agent).
    Disallowed,
    /// The robots.txt file could not be fetched and the gate fails closed.
    Unreachable,
}

impl std::fmt::Display for ComplianceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disallowed => f.write_str("disallowed"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// How a plain HTTP fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// Transport-level failure (DNS, connect, TLS, body read).
    Network,
    /// The per-tier fetch deadline elapsed.
    Timeout,
    /// Non-success HTTP status.
    HttpStatus(u16),
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Timeout => f.write_str("timeout"),
            Self::HttpStatus(code) => write!(f, "http status {code}"),
        }
    }
}

/// How the semantic-model tier failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// The model API call itself failed (network, auth, quota, timeout).
    CallFailure,
    /// The model replied, but the reply did not match the field schema.
    SchemaViolation,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CallFailure => f.write_str("call failure"),
            Self::SchemaViolation => f.write_str("schema violation"),
        }
    }
}

/// Errors that can terminate a per-URL extraction pipeline.
///
/// One variant per failure class the caller can act on. Source errors from
/// `reqwest`, `chromiumoxide`, and `serde_json` are converted to strings at
/// the boundary so results stay `Clone` + `Serialize` for the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractError {
    /// URL failed syntactic/safety validation before any network call.
    #[error("invalid URL: {url} ({reason})")]
    InvalidUrl { url: String, reason: String },

    /// The compliance gate refused the fetch.
    #[error("compliance rejected ({reason})")]
    ComplianceRejected { reason: ComplianceReason },

    /// The per-host rate limit could not grant a permit within the bounded wait.
    #[error("rate limited: {host}")]
    RateLimited { host: String },

    /// Plain HTTP fetch of the target page failed.
    #[error("fetch failed ({kind}): {detail}")]
    Fetch { kind: FetchKind, detail: String },

    /// Static tier could not make sense of the page content.
    #[error("parse failed: {detail}")]
    Parse { detail: String },

    /// Headless-browser render failed or timed out.
    #[error("render failed: {detail}")]
    Render { detail: String },

    /// Semantic tier failed.
    #[error("model error ({kind}): {detail}")]
    Model { kind: ModelKind, detail: String },

    /// The tier's prerequisite is missing (e.g. no model credential).
    #[error("tier unavailable: {tier}")]
    TierUnavailable { tier: TierName },

    /// Every tier ran and none produced a complete result.
    #[error("all tiers exhausted without a complete result")]
    AllTiersExhausted,

    /// The batch was cancelled before or during this pipeline.
    #[error("operation cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Network-ish fetch failure with a detail message.
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Fetch {
            kind: FetchKind::Network,
            detail: detail.into(),
        }
    }

    /// Fetch timeout for the given URL.
    pub fn fetch_timeout(url: &str) -> Self {
        Self::Fetch {
            kind: FetchKind::Timeout,
            detail: format!("timed out fetching {url}"),
        }
    }

    /// Non-success HTTP status.
    pub fn http_status(code: u16, url: &str) -> Self {
        Self::Fetch {
            kind: FetchKind::HttpStatus(code),
            detail: format!("HTTP {code} for {url}"),
        }
    }

    /// Headless-render failure with a detail message.
    pub fn render(detail: impl Into<String>) -> Self {
        Self::Render {
            detail: detail.into(),
        }
    }

    /// Model call failure (transport, auth, timeout).
    pub fn model_call(detail: impl Into<String>) -> Self {
        Self::Model {
            kind: ModelKind::CallFailure,
            detail: detail.into(),
        }
    }

    /// Model reply that does not match the expected field schema.
    pub fn model_schema(detail: impl Into<String>) -> Self {
        Self::Model {
            kind: ModelKind::SchemaViolation,
            detail: detail.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ExtractError>;
