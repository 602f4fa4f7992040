//! Job Posting Extraction Engine
//!
//! Fetches job-posting pages and extracts structured fields (title, company,
//! location, salary, description) using a tiered escalation strategy: each
//! tier is more capable and more expensive than the one before it, and a URL
//! only escalates when the cheaper tier could not produce a complete result.
//!
//! # Tiers
//!
//! 1. **Static** - plain HTTP fetch, JSON-LD / meta-tag / heuristic parsing
//! 2. **Rendered** - headless Chromium render, then the same parsing
//! 3. **Semantic** - visible page text submitted to a schema-constrained
//!    language model
//!
//! # Compliance
//!
//! Every URL passes a compliance gate before any page fetch: robots.txt is
//! fetched (and cached per host), evaluated for the configured agent, and a
//! per-host rate limit paces concurrent pipelines hitting the same site.
//! Extracted fields are scrubbed of personal contact information before they
//! leave the engine.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jobflow_extract::{BatchConfig, BatchCoordinator, EngineConfig, ExtractionEngine};
//!
//! let engine = Arc::new(ExtractionEngine::new(EngineConfig::default()));
//! let coordinator = BatchCoordinator::new(engine.clone(), BatchConfig::default());
//!
//! let urls = vec!["https://jobs.example.com/backend-engineer".to_string()];
//! let batch = coordinator.run(&urls).await;
//! for result in &batch.results {
//!     println!("{}: success={}", result.url, result.success);
//! }
//! engine.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - [`engine`] - per-URL escalation pipeline
//! - [`batch`] - concurrent batch orchestration
//! - [`tiers`] - the three tier implementations and the [`tiers::Tier`] trait
//! - [`compliance`] - robots.txt evaluation and per-host pacing
//! - [`redactor`] - contact-information scrubbing
//! - [`security`] - URL validation and SSRF guards
//! - [`testing`] - mock tiers for tests

pub mod batch;
pub mod compliance;
pub mod engine;
pub mod error;
pub mod redactor;
pub mod security;
pub mod testing;
pub mod tiers;
pub mod types;

// Re-export core types at crate root
pub use error::{ComplianceReason, ExtractError, FetchKind, ModelKind, Result};
pub use types::{
    BatchConfig, BatchResult, ComplianceConfig, ComplianceDecision, DecisionReason, EngineConfig,
    ExtractedFields, ExtractionResult, TierAttempt, TierName, TierOutcome,
};

pub use batch::BatchCoordinator;
pub use compliance::{ComplianceGate, RobotsPolicy};
pub use engine::ExtractionEngine;
pub use redactor::{scrub_fields, scrub_text};
pub use security::UrlValidator;
pub use tiers::{PageContext, RenderedTier, SemanticTier, StaticTier, Tier};

// Re-export testing utilities
pub use testing::MockTier;
