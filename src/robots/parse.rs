//! robots.txt parsing and rule matching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Directives collected for one user-agent token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentGroup {
    pub disallow: Vec<String>,
    pub allow: Vec<String>,
    pub crawl_delay: Option<u64>,
}

/// A robots.txt line that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsSyntaxError {
    pub line: usize,
    pub content: String,
    pub message: String,
}

/// Parsed robots.txt: per-agent groups, sitemap references, and syntax errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsDirectiveSet {
    /// Keyed by lower-cased user-agent token.
    pub groups: BTreeMap<String, UserAgentGroup>,
    pub sitemaps: Vec<String>,
    pub syntax_errors: Vec<RobotsSyntaxError>,
}

impl RobotsDirectiveSet {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.sitemaps.is_empty()
    }

    /// Group that applies to `user_agent`: the longest token contained in the
    /// agent string, else `*`.
    pub fn group_for(&self, user_agent: &str) -> Option<&UserAgentGroup> {
        let agent = user_agent.to_ascii_lowercase();
        self.groups
            .iter()
            .filter(|(token, _)| token.as_str() != "*" && agent.contains(token.as_str()))
            .max_by_key(|(token, _)| token.len())
            .map(|(_, group)| group)
            .or_else(|| self.groups.get("*"))
    }

    /// Whether `user_agent` may crawl `path`.
    ///
    /// The longest matching rule wins and `Allow` wins a tie. Rules support
    /// `*` wildcards and a trailing `$` anchor. No matching group or rule
    /// means allowed.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|rule| !rule.is_empty() && rule_matches(rule, path))
                .map(|rule| rule.len())
                .max()
        };

        match (longest(&group.allow), longest(&group.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }

    /// True when the `*` group disallows the site root.
    pub fn blocks_everything(&self) -> bool {
        self.groups.contains_key("*") && !self.is_allowed("*", "/")
    }
}

/// Matches a robots.txt path rule against a URL path.
fn rule_matches(rule: &str, path: &str) -> bool {
    let (pattern, anchored) = match rule.strip_suffix('$') {
        Some(p) => (p, true),
        None => (rule, false),
    };
    let parts: Vec<&str> = pattern.split('*').collect();

    if !path.starts_with(parts[0]) {
        return false;
    }
    let mut pos = parts[0].len();
    let last = parts.len() - 1;

    for (i, part) in parts.iter().enumerate().skip(1) {
        if i == last && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }

    !anchored || pos == path.len()
}

fn strip_inline_comment(value: &str) -> &str {
    value.split('#').next().unwrap_or("").trim()
}

fn is_absolute_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Parses a robots.txt body.
///
/// Keys are case-insensitive. Consecutive `User-agent` lines form one group
/// that receives the rules that follow. Unknown keys are logged and ignored.
/// Rules before any `User-agent`, lines without a colon, non-absolute
/// `Sitemap` URLs, and non-integer `Crawl-delay` values are syntax errors.
pub fn parse_robots_txt(content: &str) -> RobotsDirectiveSet {
    let mut set = RobotsDirectiveSet::default();
    let mut current_agents: Vec<String> = Vec::new();
    let mut last_was_user_agent = false;

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut error = |message: &str| {
            set.syntax_errors.push(RobotsSyntaxError {
                line: line_no,
                content: line.to_string(),
                message: message.to_string(),
            });
        };

        let Some((key, raw_value)) = line.split_once(':') else {
            error("missing ':' separator");
            continue;
        };
        let key = key.trim().to_ascii_lowercase();

        match key.as_str() {
            "user-agent" => {
                let agent = strip_inline_comment(raw_value).to_ascii_lowercase();
                if agent.is_empty() {
                    error("empty User-agent value");
                    continue;
                }
                if !last_was_user_agent {
                    current_agents.clear();
                }
                set.groups.entry(agent.clone()).or_default();
                current_agents.push(agent);
                last_was_user_agent = true;
            }
            "disallow" | "allow" => {
                last_was_user_agent = false;
                if current_agents.is_empty() {
                    error("rule appears before any User-agent line");
                    continue;
                }
                let value = strip_inline_comment(raw_value);
                if value.is_empty() {
                    // An empty rule matches nothing
                    continue;
                }
                for agent in &current_agents {
                    let group = set.groups.entry(agent.clone()).or_default();
                    let rules = if key == "allow" {
                        &mut group.allow
                    } else {
                        &mut group.disallow
                    };
                    rules.push(value.to_string());
                }
            }
            "crawl-delay" => {
                last_was_user_agent = false;
                if current_agents.is_empty() {
                    error("Crawl-delay appears before any User-agent line");
                    continue;
                }
                match strip_inline_comment(raw_value).parse::<u64>() {
                    Ok(delay) => {
                        for agent in &current_agents {
                            set.groups.entry(agent.clone()).or_default().crawl_delay = Some(delay);
                        }
                    }
                    Err(_) => error("Crawl-delay must be a non-negative integer"),
                }
            }
            "sitemap" => {
                let value = raw_value.trim();
                if !is_absolute_http_url(value) {
                    error("Sitemap must be an absolute http(s) URL");
                    continue;
                }
                if !set.sitemaps.iter().any(|s| s == value) {
                    set.sitemaps.push(value.to_string());
                }
            }
            other => {
                last_was_user_agent = false;
                log::debug!("Ignoring unknown robots.txt directive '{other}' on line {line_no}");
            }
        }
    }

    set
}
