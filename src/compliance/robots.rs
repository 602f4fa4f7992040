//! robots.txt parsing and path evaluation.

use std::collections::HashMap;
use std::time::Duration;

/// Parsed crawl directives for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Rules keyed by lowercase user-agent token.
    agents: HashMap<String, AgentRules>,

    /// Wildcard (`*`) rules.
    wildcard: AgentRules,
}

/// Allow/deny prefixes for one user-agent group.
#[derive(Debug, Clone, Default)]
struct AgentRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl RobotsPolicy {
    /// Parse robots.txt content. Unknown directives are ignored.
    pub fn parse(content: &str) -> Self {
        let mut policy = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();
        // A `User-agent` line after rule lines starts a new group.
        let mut group_has_rules = false;

        let mut flush =
            |policy: &mut Self, agents: &mut Vec<String>, rules: &mut AgentRules| {
                for agent in agents.drain(..) {
                    if agent == "*" {
                        policy.wildcard = rules.clone();
                    } else {
                        policy.agents.insert(agent, rules.clone());
                    }
                }
                *rules = AgentRules::default();
            };

        for line in content.lines() {
            // Strip inline comments, then whitespace.
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if group_has_rules {
                        flush(&mut policy, &mut current_agents, &mut current_rules);
                        group_has_rules = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    group_has_rules = true;
                    if !value.is_empty() {
                        current_rules.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    group_has_rules = true;
                    if !value.is_empty() {
                        current_rules.allow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        current_rules.crawl_delay = Some(delay);
                    }
                }
                _ => {}
            }
        }

        flush(&mut policy, &mut current_agents, &mut current_rules);
        policy
    }

    fn rules_for(&self, user_agent: &str) -> &AgentRules {
        let agent_lower = user_agent.to_lowercase();
        self.agents
            .get(&agent_lower)
            .or_else(|| {
                // Token match: "JobflowBot/1.0" matches a "jobflowbot" group.
                self.agents
                    .iter()
                    .find(|(token, _)| agent_lower.contains(token.as_str()))
                    .map(|(_, rules)| rules)
            })
            .unwrap_or(&self.wildcard)
    }

    /// Whether the given path may be fetched by the given agent.
    ///
    /// Allow prefixes take precedence over disallow prefixes, matching the
    /// common-crawler interpretation.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let rules = self.rules_for(user_agent);

        for allow in &rules.allow {
            if path.starts_with(allow.as_str()) {
                return true;
            }
        }

        for disallow in &rules.disallow {
            if disallow == "/" || path.starts_with(disallow.as_str()) {
                return false;
            }
        }

        true
    }

    /// Declared crawl delay for the agent, falling back to the wildcard group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.rules_for(user_agent)
            .crawl_delay
            .or(self.wildcard.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}
