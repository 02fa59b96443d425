//! robots.txt permission checks.
//!
//! Rules are fetched once per origin and kept for the rest of the run. Group
//! selection follows the usual crawler convention: groups naming our agent
//! token win over `*`; within the chosen groups the longest matching
//! `Allow`/`Disallow` pattern decides, `Allow` winning ties. `*` and a
//! trailing `$` are understood.
//!
//! What happens when the file cannot be read:
//!
//! | Answer | Decision |
//! |--------|----------|
//! | 200 | parse and apply |
//! | 401 / 403 | deny everything |
//! | other 4xx | allow everything (no robots file) |
//! | 5xx, transport error | deny everything |

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::http::{RetryPolicy, send_with_retry};

#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    async fn is_allowed(&self, url: &str) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    allow: bool,
    pattern: String,
}

/// The rules that apply to one agent on one origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RobotsRules {
    AllowAll,
    DenyAll,
    Rules(Vec<Rule>),
}

impl RobotsRules {
    /// Parse a robots.txt body for the agent `agent` (product token, e.g. `AI-News-Agent`).
    pub fn parse(body: &str, agent: &str) -> Self {
        let agent = product_token(agent);
        // (user agents, rules) per group, in file order
        let mut groups: Vec<(Vec<String>, Vec<Rule>)> = Vec::new();
        let mut collecting_agents = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push((Vec::new(), Vec::new()));
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.0.push(value.to_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    let Some(group) = groups.last_mut() else {
                        continue;
                    };
                    // An empty Disallow allows everything; it adds no constraint.
                    if value.is_empty() {
                        continue;
                    }
                    group.1.push(Rule {
                        allow: key == "allow",
                        pattern: value.to_string(),
                    });
                }
                _ => {
                    collecting_agents = false;
                }
            }
        }

        let named: Vec<Rule> = groups
            .iter()
            .filter(|(agents, _)| agents.iter().any(|a| a != "*" && product_token(a) == agent))
            .flat_map(|(_, rules)| rules.iter().cloned())
            .collect();
        let has_named = groups
            .iter()
            .any(|(agents, _)| agents.iter().any(|a| a != "*" && product_token(a) == agent));
        if has_named {
            return Self::Rules(named);
        }

        let has_star = groups.iter().any(|(agents, _)| agents.iter().any(|a| a == "*"));
        if !has_star {
            return Self::AllowAll;
        }
        Self::Rules(
            groups
                .iter()
                .filter(|(agents, _)| agents.iter().any(|a| a == "*"))
                .flat_map(|(_, rules)| rules.iter().cloned())
                .collect(),
        )
    }

    /// Decide for a path (with optional `?query`).
    pub fn allows(&self, path: &str) -> bool {
        let rules = match self {
            Self::AllowAll => return true,
            Self::DenyAll => return false,
            Self::Rules(rules) => rules,
        };
        let mut best: Option<&Rule> = None;
        for rule in rules.iter().filter(|r| pattern_matches(&r.pattern, path)) {
            best = match best {
                None => Some(rule),
                Some(b) if rule.pattern.len() > b.pattern.len() => Some(rule),
                Some(b) if rule.pattern.len() == b.pattern.len() && rule.allow && !b.allow => Some(rule),
                keep => keep,
            };
        }
        best.is_none_or(|r| r.allow)
    }
}

/// Lowercased product token: `AI-News-Agent/1.2 (+url)` becomes `ai-news-agent`.
fn product_token(agent: &str) -> String {
    agent
        .split(['/', ' '])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Match a robots pattern (`*` wildcard, optional trailing `$`) against a path.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    if parts.len() == 1 {
        return !anchored || path.len() == pos;
    }
    let last_idx = parts.len() - 1;
    for (i, part) in parts.iter().enumerate().skip(1) {
        if i == last_idx && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    true
}

/// Fetches `/robots.txt` per origin over HTTP and caches the outcome.
pub struct HttpRobots {
    client: Client,
    retry: RetryPolicy,
    agent: String,
    cache: Mutex<HashMap<String, RobotsRules>>,
}

impl HttpRobots {
    pub fn new(client: Client, retry: RetryPolicy, agent: impl Into<String>) -> Self {
        Self {
            client,
            retry,
            agent: agent.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        match send_with_retry(self.client.get(&robots_url), &self.retry).await {
            Ok(resp) if resp.status() == StatusCode::OK => match resp.text().await {
                Ok(body) => RobotsRules::parse(&body, &self.agent),
                Err(e) => {
                    warn!(%robots_url, error = %e, "robots.txt unreadable; denying");
                    RobotsRules::DenyAll
                }
            },
            Ok(resp) => {
                let status = resp.status();
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    RobotsRules::DenyAll
                } else if status.is_client_error() {
                    RobotsRules::AllowAll
                } else {
                    warn!(%robots_url, status = status.as_u16(), "robots.txt unavailable; denying");
                    RobotsRules::DenyAll
                }
            }
            Err(e) => {
                warn!(%robots_url, error = %e, "robots.txt unreachable; denying");
                RobotsRules::DenyAll
            }
        }
    }
}

#[async_trait]
impl RobotsPolicy for HttpRobots {
    async fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            debug!(%url, "unparseable URL; not fetching");
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let origin = parsed.origin().ascii_serialization();
        let mut path = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            path.push('?');
            path.push_str(q);
        }

        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|c| c.get(&origin).cloned());
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = self.fetch_rules(&origin).await;
                if let Ok(mut c) = self.cache.lock() {
                    c.insert(origin.clone(), rules.clone());
                }
                rules
            }
        };

        let allowed = rules.allows(&path);
        info!(%url, allowed, "robots check");
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const AGENT: &str = "AI-News-Agent";

    #[test]
    fn test_star_group_applies_when_not_named() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /private/\nAllow: /private/open\n",
            AGENT,
        );
        assert!(rules.allows("/news/story"));
        assert!(!rules.allows("/private/secret"));
        assert!(rules.allows("/private/open/page"));
    }

    #[test]
    fn test_named_group_overrides_star() {
        let body = "\
User-agent: *
Disallow: /

# our agent may read news
User-agent: ai-news-agent
Disallow: /admin
";
        let rules = RobotsRules::parse(body, AGENT);
        assert!(rules.allows("/news/story"));
        assert!(!rules.allows("/admin/panel"));

        let other = RobotsRules::parse(body, "SomeBot");
        assert!(!other.allows("/news/story"));
    }

    #[test]
    fn test_partial_agent_names_do_not_bind() {
        let body = "User-agent: news\nDisallow: /\n\nUser-agent: agent\nDisallow: /\n\nUser-agent: *\nDisallow: /admin\n";
        let rules = RobotsRules::parse(body, AGENT);
        assert!(rules.allows("/news/story"));
        assert!(!rules.allows("/admin"));

        let versioned = RobotsRules::parse("User-agent: AI-NEWS-AGENT/1.2\nDisallow: /x\n", AGENT);
        assert!(!versioned.allows("/x"));
        assert!(versioned.allows("/y"));
    }

    #[test]
    fn test_grouped_user_agents_share_rules() {
        let body = "User-agent: GoogleBot\nUser-agent: AI-News-Agent\nDisallow: /drafts\n";
        let rules = RobotsRules::parse(body, AGENT);
        assert!(!rules.allows("/drafts/1"));
        assert!(rules.allows("/published/1"));
    }

    #[test]
    fn test_empty_disallow_and_missing_groups() {
        assert!(RobotsRules::parse("User-agent: *\nDisallow:\n", AGENT).allows("/anything"));
        assert_eq!(RobotsRules::parse("", AGENT), RobotsRules::AllowAll);
        assert_eq!(
            RobotsRules::parse("User-agent: OtherBot\nDisallow: /\n", AGENT),
            RobotsRules::AllowAll
        );
    }

    #[test]
    fn test_wildcards_and_anchor() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /*.pdf$\nDisallow: /*?print=\n",
            AGENT,
        );
        assert!(!rules.allows("/files/report.pdf"));
        assert!(rules.allows("/files/report.pdf.html"));
        assert!(!rules.allows("/story?print=1"));
        assert!(rules.allows("/story?page=2"));
    }

    #[test]
    fn test_allow_wins_equal_length_tie() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /page\nAllow: /page\n", AGENT);
        assert!(rules.allows("/page"));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("/", "/x"));
        assert!(pattern_matches("/a*b", "/a/x/b/c"));
        assert!(!pattern_matches("/a*b$", "/a/x/b/c"));
        assert!(pattern_matches("/a*b$", "/a/x/b"));
        assert!(pattern_matches("/exact$", "/exact"));
        assert!(!pattern_matches("/exact$", "/exact/"));
        assert!(pattern_matches("*", "/whatever"));
    }

    /// Answers every connection with the same response.
    async fn serve(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    fn robots() -> HttpRobots {
        let client = crate::http::build_client(Duration::from_secs(5)).unwrap();
        HttpRobots::new(client, RetryPolicy::new(0, Duration::ZERO), AGENT)
    }

    #[tokio::test]
    async fn test_http_robots_applies_rules() {
        let origin = serve(
            "HTTP/1.1 200 OK\r\nContent-Length: 37\r\nConnection: close\r\n\r\nUser-agent: *\nDisallow: /private/\n\n\n\n",
        )
        .await;
        let robots = robots();
        assert!(robots.is_allowed(&format!("{origin}/news/1")).await);
        assert!(!robots.is_allowed(&format!("{origin}/private/1")).await);
    }

    #[tokio::test]
    async fn test_http_robots_missing_file_allows() {
        let origin = serve("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        assert!(robots().is_allowed(&format!("{origin}/news/1")).await);
    }

    #[tokio::test]
    async fn test_http_robots_server_error_denies() {
        let origin = serve("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        assert!(!robots().is_allowed(&format!("{origin}/news/1")).await);
    }

    #[tokio::test]
    async fn test_http_robots_unreachable_denies() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(!robots().is_allowed(&format!("http://{addr}/news/1")).await);
    }

    #[tokio::test]
    async fn test_http_robots_rejects_bad_urls() {
        assert!(!robots().is_allowed("not a url").await);
        assert!(!robots().is_allowed("ftp://example.com/file").await);
    }
}
