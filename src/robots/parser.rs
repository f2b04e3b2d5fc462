//! Robots.txt rule evaluation
//!
//! Allow/disallow matching is delegated to the robotstxt crate. The
//! Crawl-delay extension is not covered by it, so the groups are scanned
//! here once when the rules are built.

use robotstxt::DefaultMatcher;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Access {
    AllowAll,
    ForbidAll,
    Rules(String),
}

/// Robots rules of one host, bound to the crawler's user agent
#[derive(Debug, Clone, PartialEq)]
pub struct RobotRules {
    access: Access,
    agent: String,
    crawl_delay: Option<Duration>,
}

impl RobotRules {
    /// Rules that allow every URL (missing or unreachable robots.txt)
    pub fn allow_all() -> Self {
        Self {
            access: Access::AllowAll,
            agent: String::new(),
            crawl_delay: None,
        }
    }

    /// Rules that deny every URL (robots.txt answered 401/403)
    pub fn forbid_all() -> Self {
        Self {
            access: Access::ForbidAll,
            agent: String::new(),
            crawl_delay: None,
        }
    }

    /// Parses robots.txt content for the given agent
    ///
    /// Only the product token of the agent (`Name` in `Name/1.0 (...)`) is
    /// matched against `User-agent` lines.
    pub fn parse(content: &str, agent: &str) -> Self {
        let token = product_token(agent);
        let crawl_delay = find_crawl_delay(content, &token)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);

        Self {
            access: Access::Rules(content.to_string()),
            agent: token,
            crawl_delay,
        }
    }

    /// Returns true if `url` may be fetched
    pub fn is_allowed(&self, url: &str) -> bool {
        match &self.access {
            Access::AllowAll => true,
            Access::ForbidAll => false,
            Access::Rules(content) if content.trim().is_empty() => true,
            Access::Rules(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, &self.agent, url)
            }
        }
    }

    /// Crawl-delay advertised for this agent, if any
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

fn product_token(agent: &str) -> String {
    agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or(agent)
        .to_lowercase()
}

/// Returns the Crawl-delay of the group naming `token`, falling back to
/// the `*` group
fn find_crawl_delay(content: &str, token: &str) -> Option<f64> {
    let mut agents: Vec<String> = Vec::new();
    let mut in_group_body = false;
    let mut specific = None;
    let mut wildcard = None;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_lowercase().as_str() {
            "user-agent" => {
                if in_group_body {
                    agents.clear();
                    in_group_body = false;
                }
                agents.push(value.to_lowercase());
            }
            "crawl-delay" => {
                in_group_body = true;
                let Ok(delay) = value.parse::<f64>() else {
                    continue;
                };
                if agents.iter().any(|a| a == token) {
                    specific = specific.or(Some(delay));
                } else if agents.iter().any(|a| a == "*") {
                    wildcard = wildcard.or(Some(delay));
                }
            }
            _ => in_group_body = true,
        }
    }

    specific.or(wildcard)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "TestBot/1.0 (+https://example.com/bot)";

    #[test]
    fn test_allow_and_forbid_all() {
        assert!(RobotRules::allow_all().is_allowed("https://a.com/admin"));
        assert!(!RobotRules::forbid_all().is_allowed("https://a.com/"));
    }

    #[test]
    fn test_disallow_prefix() {
        let rules = RobotRules::parse("User-agent: *\nDisallow: /admin", AGENT);
        assert!(rules.is_allowed("https://a.com/page"));
        assert!(!rules.is_allowed("https://a.com/admin/users"));
    }

    #[test]
    fn test_specific_group_wins() {
        let content = "User-agent: TestBot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let rules = RobotRules::parse(content, AGENT);
        assert!(!rules.is_allowed("https://a.com/page"));

        let other = RobotRules::parse(content, "OtherBot/2.0");
        assert!(other.is_allowed("https://a.com/page"));
    }

    #[test]
    fn test_empty_content_allows() {
        assert!(RobotRules::parse("", AGENT).is_allowed("https://a.com/x"));
    }

    #[test]
    fn test_crawl_delay_specific_over_wildcard() {
        let content = "User-agent: *\nCrawl-delay: 10\n\nUser-agent: testbot\nCrawl-delay: 2.5";
        let rules = RobotRules::parse(content, AGENT);
        assert_eq!(rules.crawl_delay(), Some(Duration::from_millis(2500)));

        let other = RobotRules::parse(content, "OtherBot");
        assert_eq!(other.crawl_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let content = "User-agent: BotA\nUser-agent: TestBot\nDisallow: /tmp\nCrawl-delay: 3";
        let rules = RobotRules::parse(content, AGENT);
        assert_eq!(rules.crawl_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_crawl_delay_ignores_garbage() {
        let content = "User-agent: *\nCrawl-delay: soon\nCrawl-delay: -4";
        assert_eq!(RobotRules::parse(content, AGENT).crawl_delay(), None);
        assert_eq!(RobotRules::allow_all().crawl_delay(), None);
    }
}
