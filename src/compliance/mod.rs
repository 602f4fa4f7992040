//! Crawl-compliance layer: robots.txt parsing, per-host caching, and host
//! pacing shared across all concurrently running pipelines.

pub mod gate;
pub mod robots;

pub use gate::ComplianceGate;
pub use robots::RobotsPolicy;
