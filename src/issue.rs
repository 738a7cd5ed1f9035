// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Issue reference parsing.
//!
//! Workers are launched against an issue reference that may arrive as a bare
//! number, a `repo:42` pair, a GitHub issue/PR URL (github.com or an
//! enterprise host), or a JIRA key or browse URL. This module normalizes all
//! of those, plus slugifies issue titles into branch-name material.

use once_cell::sync::Lazy;
use regex::Regex;

/// A GitHub issue or pull request reference extracted from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIssue {
    pub owner: String,
    pub repo: String,
    /// `"issues"` or `"pull"`, as it appears in the URL path.
    pub issue_type: String,
    pub number: i64,
}

static GITHUB_URL_RE: Lazy<Regex> = Lazy::new(|| {
    // Matches github.com and enterprise hosts like github.example.net.
    Regex::new(r"^https?://(?:www\.)?github\.[^/\s]+/([^/\s]+)/([^/\s]+)/(issues|pull)/(\d+)")
        .expect("valid github url regex")
});

static JIRA_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]*-\d+$").expect("valid jira key regex"));

static JIRA_BROWSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/browse/([A-Z][A-Z0-9]*-\d+)").expect("valid jira browse regex"));

/// Parse a GitHub issue or PR URL.
///
/// Accepts http/https, an optional `www.` prefix, and any `github.*` host.
/// Paths other than `/{owner}/{repo}/issues/{n}` and `/{owner}/{repo}/pull/{n}`
/// are not issue references and yield `None`.
pub fn parse_github_url(url: &str) -> Option<ParsedIssue> {
    let caps = GITHUB_URL_RE.captures(url)?;
    let number: i64 = caps.get(4)?.as_str().parse().ok()?;
    Some(ParsedIssue {
        owner: caps.get(1)?.as_str().to_string(),
        repo: caps.get(2)?.as_str().to_string(),
        issue_type: caps.get(3)?.as_str().to_string(),
        number,
    })
}

/// Parse a JIRA issue key, either bare (`PROJ-123`) or inside an atlassian
/// `/browse/` URL. Keys are uppercase by definition; lowercase input is not
/// a key.
pub fn parse_jira_key(input: &str) -> Option<String> {
    if JIRA_KEY_RE.is_match(input) {
        return Some(input.to_string());
    }
    JIRA_BROWSE_RE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Split a `repo:issue` argument into its parts.
///
/// Returns `(issue, repo)`. URLs contain colons but are never split; a
/// reference without a repo prefix comes back with `None`.
pub fn parse_issue_arg(arg: &str) -> (String, Option<String>) {
    if arg.contains("://") {
        return (arg.to_string(), None);
    }
    match arg.split_once(':') {
        Some((repo, issue)) => (issue.to_string(), Some(repo.to_string())),
        None => (arg.to_string(), None),
    }
}

/// Turn free text into branch-name material.
///
/// Lowercases, maps every non-alphanumeric run to a single `-`, trims, and
/// truncates to `max_length` at a word boundary so the result never ends
/// mid-word or with a trailing hyphen.
pub fn slugify(text: &str, max_length: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    let slug = slug.trim_end_matches('-');

    if slug.len() <= max_length {
        return slug.to_string();
    }

    let cut = &slug[..max_length];
    let cut = match cut.rfind('-') {
        Some(idx) => &cut[..idx],
        None => cut,
    };
    cut.trim_end_matches('-').to_string()
}
