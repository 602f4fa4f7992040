//! Per-host compliance gate: robots.txt verdicts plus host pacing.
//!
//! Shared by every concurrently running pipeline in a batch. Robots state is
//! cached per host with a TTL; rate-limiter and pacing state are keyed by
//! host so unrelated hosts never contend on a common lock.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::{debug, info, warn};
use url::Url;

use crate::compliance::robots::RobotsPolicy;
use crate::error::ExtractError;
use crate::types::{ComplianceConfig, ComplianceDecision};

/// Outcome of fetching a host's robots.txt.
#[derive(Debug, Clone)]
pub(crate) enum RobotsFetch {
    /// Parsed directives.
    Policy(RobotsPolicy),
    /// No robots.txt published (404/410) — everything is allowed.
    AllowAll,
    /// Could not be fetched; the fail-open/fail-closed config decides.
    Unreachable,
}

struct CacheEntry {
    fetched_at: Instant,
    robots: RobotsFetch,
}

/// Decides, per host, whether an automated fetch is permitted and paces
/// requests so no single host is overwhelmed by a batch.
pub struct ComplianceGate {
    config: ComplianceConfig,
    user_agent: String,
    client: reqwest::Client,
    cache: DashMap<String, CacheEntry>,
    limiter: DefaultKeyedRateLimiter<String>,
    /// Last permitted fetch per host, for robots crawl-delay pacing.
    last_permit: DashMap<String, Instant>,
}

impl ComplianceGate {
    pub fn new(config: ComplianceConfig, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();

        if !config.enabled {
            // Explicit configuration choice, not a silent default.
            warn!("compliance gate disabled by configuration; robots.txt and host pacing are skipped");
        }

        let rate = NonZeroU32::new(config.requests_per_minute).unwrap_or(nonzero!(30u32));
        let burst = NonZeroU32::new(config.burst).unwrap_or(nonzero!(1u32));
        let quota = Quota::per_minute(rate).allow_burst(burst);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent.clone())
            .build()
            .unwrap_or_default();

        Self {
            config,
            user_agent,
            client,
            cache: DashMap::new(),
            limiter: RateLimiter::keyed(quota),
            last_permit: DashMap::new(),
        }
    }

    /// Check whether `url` may be fetched right now.
    ///
    /// Blocks (bounded by `max_permit_wait`) until the host's token bucket
    /// grants a permit; a wait past the bound fails with `RateLimited`.
    /// A refusal by robots.txt is a normal decision, not an error.
    pub async fn check(&self, url: &Url) -> Result<ComplianceDecision, ExtractError> {
        if !self.config.enabled {
            return Ok(ComplianceDecision::ok());
        }

        let host = url
            .host_str()
            .ok_or_else(|| ExtractError::InvalidUrl {
                url: url.to_string(),
                reason: "URL has no host".to_string(),
            })?
            .to_string();

        self.acquire_permit(&host).await?;

        let robots = self.robots_for(&host, url).await;

        let decision = match &robots {
            RobotsFetch::AllowAll => ComplianceDecision::ok(),
            RobotsFetch::Unreachable => {
                if self.config.fail_open {
                    debug!(host = %host, "robots.txt unreachable; failing open");
                    ComplianceDecision::unknown()
                } else {
                    ComplianceDecision::unreachable()
                }
            }
            RobotsFetch::Policy(policy) => {
                if policy.is_allowed(&self.user_agent, url.path()) {
                    self.respect_crawl_delay(&host, policy).await?;
                    ComplianceDecision::ok()
                } else {
                    info!(url = %url, "robots.txt disallows fetch");
                    ComplianceDecision::disallowed()
                }
            }
        };

        if decision.allowed {
            self.last_permit.insert(host, Instant::now());
        }

        Ok(decision)
    }

    /// Wait for the host's token bucket, bounded.
    async fn acquire_permit(&self, host: &str) -> Result<(), ExtractError> {
        let key = host.to_string();
        let wait = self.limiter.until_key_ready(&key);
        tokio::time::timeout(self.config.max_permit_wait, wait)
            .await
            .map_err(|_| ExtractError::RateLimited {
                host: host.to_string(),
            })
    }

    /// Honor a declared crawl-delay larger than our configured pacing.
    async fn respect_crawl_delay(&self, host: &str, policy: &RobotsPolicy) -> Result<(), ExtractError> {
        let Some(delay) = policy.crawl_delay(&self.user_agent) else {
            return Ok(());
        };

        let remaining = self
            .last_permit
            .get(host)
            .map(|last| delay.saturating_sub(last.elapsed()));

        if let Some(remaining) = remaining.filter(|r| !r.is_zero()) {
            if remaining > self.config.max_permit_wait {
                return Err(ExtractError::RateLimited {
                    host: host.to_string(),
                });
            }
            debug!(host = %host, delay_ms = remaining.as_millis() as u64, "honoring crawl-delay");
            tokio::time::sleep(remaining).await;
        }

        Ok(())
    }

    /// Cached robots state for a host, refetched on first sight or TTL expiry.
    async fn robots_for(&self, host: &str, url: &Url) -> RobotsFetch {
        if let Some(entry) = self.cache.get(host) {
            if entry.fetched_at.elapsed() < self.config.cache_ttl {
                return entry.robots.clone();
            }
        }

        let robots = self.fetch_robots(url).await;
        self.cache.insert(
            host.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                robots: robots.clone(),
            },
        );
        robots
    }

    async fn fetch_robots(&self, url: &Url) -> RobotsFetch {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(_) => return RobotsFetch::Unreachable,
        };

        debug!(url = %robots_url, "fetching robots.txt");

        match self.client.get(robots_url.clone()).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(content) => RobotsFetch::Policy(RobotsPolicy::parse(&content)),
                Err(e) => {
                    warn!(url = %robots_url, error = %e, "failed to read robots.txt body");
                    RobotsFetch::Unreachable
                }
            },
            Ok(response) if matches!(response.status().as_u16(), 404 | 410) => {
                // No robots.txt published means everything is allowed.
                RobotsFetch::AllowAll
            }
            Ok(response) => {
                warn!(url = %robots_url, status = %response.status(), "unexpected robots.txt status");
                RobotsFetch::Unreachable
            }
            Err(e) => {
                warn!(url = %robots_url, error = %e, "failed to fetch robots.txt");
                RobotsFetch::Unreachable
            }
        }
    }

    /// Pre-populate the robots cache for a host. Test-only hook so gate and
    /// engine behavior can be exercised without a network.
    #[cfg(test)]
    pub(crate) fn seed_robots(&self, host: &str, robots: RobotsFetch) {
        self.cache.insert(
            host.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                robots,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecisionReason;

    fn gate_with(config: ComplianceConfig) -> ComplianceGate {
        ComplianceGate::new(config, "JobflowBot/1.0")
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn disabled_gate_always_allows() {
        let gate = gate_with(ComplianceConfig::disabled());
        let decision = gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, DecisionReason::Ok);
    }

    #[tokio::test]
    async fn disallowed_path_is_refused() {
        let gate = gate_with(ComplianceConfig::default());
        gate.seed_robots(
            "example.com",
            RobotsFetch::Policy(RobotsPolicy::parse("User-agent: *\nDisallow: /jobs/\n")),
        );

        let decision = gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::Disallowed);

        let decision = gate.check(&url("https://example.com/about")).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn missing_robots_allows_all() {
        let gate = gate_with(ComplianceConfig::default());
        gate.seed_robots("example.com", RobotsFetch::AllowAll);

        let decision = gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, DecisionReason::Ok);
    }

    #[tokio::test]
    async fn unreachable_robots_fails_closed_by_default() {
        let gate = gate_with(ComplianceConfig::default());
        gate.seed_robots("example.com", RobotsFetch::Unreachable);

        let decision = gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::Unreachable);
    }

    #[tokio::test]
    async fn unreachable_robots_fails_open_when_configured() {
        let gate = gate_with(ComplianceConfig::default().with_fail_open(true));
        gate.seed_robots("example.com", RobotsFetch::Unreachable);

        let decision = gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, DecisionReason::Unknown);
    }

    #[tokio::test]
    async fn same_host_checks_are_paced() {
        // 120/min = one permit per 500ms, burst of 1.
        let gate = gate_with(ComplianceConfig::default().with_rate(120, 1));
        gate.seed_robots("example.com", RobotsFetch::AllowAll);

        let start = Instant::now();
        for _ in 0..3 {
            gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        }
        let elapsed = start.elapsed();

        // First permit is immediate, the next two wait ~500ms each.
        assert!(elapsed >= Duration::from_millis(900), "not paced: {elapsed:?}");
    }

    #[tokio::test]
    async fn unrelated_hosts_do_not_contend() {
        let gate = gate_with(ComplianceConfig::default().with_rate(120, 1));
        for host in ["a.example", "b.example", "c.example"] {
            gate.seed_robots(host, RobotsFetch::AllowAll);
        }

        let start = Instant::now();
        for host in ["a.example", "b.example", "c.example"] {
            gate.check(&url(&format!("https://{host}/jobs/1")))
                .await
                .unwrap();
        }

        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn crawl_delay_spaces_out_same_host_checks() {
        // High token rate so only the declared crawl-delay paces the host.
        let gate = gate_with(ComplianceConfig::default().with_rate(6000, 100));
        gate.seed_robots(
            "example.com",
            RobotsFetch::Policy(RobotsPolicy::parse(
                "User-agent: *\nDisallow: /private/\nCrawl-delay: 0.3\n",
            )),
        );

        let start = Instant::now();
        gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        let decision = gate.check(&url("https://example.com/jobs/2")).await.unwrap();
        let elapsed = start.elapsed();

        assert!(decision.allowed);
        assert!(
            elapsed >= Duration::from_millis(250),
            "crawl-delay not honored: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn crawl_delay_beyond_permit_wait_is_rate_limited() {
        let config = ComplianceConfig::default()
            .with_rate(6000, 100)
            .with_max_permit_wait(Duration::from_millis(100));
        let gate = gate_with(config);
        gate.seed_robots(
            "example.com",
            RobotsFetch::Policy(RobotsPolicy::parse("User-agent: *\nCrawl-delay: 30\n")),
        );

        gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        let err = gate
            .check(&url("https://example.com/jobs/2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn bounded_wait_fails_with_rate_limited() {
        // One permit per minute and an effectively zero wait budget.
        let config = ComplianceConfig::default()
            .with_rate(1, 1)
            .with_max_permit_wait(Duration::from_millis(50));
        let gate = gate_with(config);
        gate.seed_robots("example.com", RobotsFetch::AllowAll);

        gate.check(&url("https://example.com/jobs/1")).await.unwrap();
        let err = gate
            .check(&url("https://example.com/jobs/2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RateLimited { .. }));
    }
}
