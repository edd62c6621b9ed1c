//! Output-stream scanning for interactive-input prompts and authorization
//! URLs.
//!
//! The wrapped sync tool emits plain line-oriented text. Two pattern classes
//! matter mid-stream: phrases indicating the tool is waiting for a human
//! (MFA/verification codes), and OAuth authorization URLs that a remote
//! client must render specially rather than as raw text.

use std::collections::HashSet;

use regex::Regex;

/// Phrases that mean the tool wants interactive input. Matched
/// case-insensitively against every output chunk.
const PROMPT_PHRASES: &[&str] = &[
    "mfa code",
    "verification code",
    "authentication code",
    "two-factor",
    "2fa code",
    "enter the code",
    "security code",
];

/// Authorization endpoint URLs, e.g.
/// `https://accounts.example.com/oauth/authorize?client_id=...`.
const AUTH_URL_PATTERN: &str = r#"https://[A-Za-z0-9._-]+/o(?:auth2?|idc)/(?:authorize|auth|device)[^\s"'<>]*"#;

/// Scans output chunks for prompt phrases and authorization URLs.
///
/// One scanner exists per run; it remembers the URLs it has already
/// surfaced so repeated prints of the same URL produce a single event.
pub struct OutputScanner {
    prompt_re: Regex,
    url_re: Regex,
    seen_urls: HashSet<String>,
}

impl OutputScanner {
    pub fn new() -> Self {
        let alternation = PROMPT_PHRASES
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        Self {
            prompt_re: Regex::new(&format!("(?i){alternation}"))
                .expect("prompt phrase alternation compiles"),
            url_re: Regex::new(AUTH_URL_PATTERN).expect("auth URL pattern compiles"),
            seen_urls: HashSet::new(),
        }
    }

    /// Whether the chunk contains an interactive-input prompt.
    pub fn is_prompt(&self, chunk: &str) -> bool {
        self.prompt_re.is_match(chunk)
    }

    /// Extract authorization URLs from the chunk, skipping any already
    /// surfaced by this scanner.
    pub fn auth_urls(&mut self, chunk: &str) -> Vec<String> {
        let mut found = Vec::new();
        for m in self.url_re.find_iter(chunk) {
            let url = m.as_str().to_string();
            if self.seen_urls.insert(url.clone()) {
                found.push(url);
            }
        }
        found
    }
}

impl Default for OutputScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mfa_prompt_case_insensitively() {
        let scanner = OutputScanner::new();
        assert!(scanner.is_prompt("MFA code:"));
        assert!(scanner.is_prompt("please enter your mfa CODE now"));
        assert!(scanner.is_prompt("Enter the verification code sent to your device"));
        assert!(scanner.is_prompt("Two-Factor authentication required"));
    }

    #[test]
    fn ordinary_output_is_not_a_prompt() {
        let scanner = OutputScanner::new();
        assert!(!scanner.is_prompt("synced 1432 files"));
        assert!(!scanner.is_prompt("authenticated successfully"));
        assert!(!scanner.is_prompt(""));
    }

    #[test]
    fn extracts_authorization_url() {
        let mut scanner = OutputScanner::new();
        let urls = scanner.auth_urls(
            "Visit https://accounts.example.com/oauth/authorize?client_id=abc&scope=sync to continue",
        );
        assert_eq!(
            urls,
            vec!["https://accounts.example.com/oauth/authorize?client_id=abc&scope=sync"]
        );
    }

    #[test]
    fn repeated_url_is_surfaced_once() {
        let mut scanner = OutputScanner::new();
        let line = "open https://accounts.example.com/oauth2/auth?state=x";
        assert_eq!(scanner.auth_urls(line).len(), 1);
        assert!(scanner.auth_urls(line).is_empty());
    }

    #[test]
    fn distinct_urls_are_both_surfaced() {
        let mut scanner = OutputScanner::new();
        let chunk = "https://a.example.com/oauth/authorize?s=1 then https://b.example.com/oauth/authorize?s=2";
        assert_eq!(scanner.auth_urls(chunk).len(), 2);
    }

    #[test]
    fn plain_urls_are_ignored() {
        let mut scanner = OutputScanner::new();
        assert!(scanner
            .auth_urls("docs at https://example.com/help and https://example.com/oauth.html")
            .is_empty());
    }
}
