//! Reply rules and matching.

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
    tracing::warn,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Exact,
    Contains,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRule {
    #[serde(default = "random_id")]
    pub id: String,
    pub match_type: MatchType,
    pub pattern: String,
    pub response: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn random_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}

impl ReplyRule {
    pub fn new(match_type: MatchType, pattern: &str, response: &str) -> Self {
        Self {
            id: random_id(),
            match_type,
            pattern: pattern.to_string(),
            response: response.to_string(),
            enabled: true,
        }
    }

    /// Whether this rule matches the (already trimmed) message body.
    ///
    /// Exact and contains compare case-insensitively. An invalid regex
    /// pattern is logged and never matches.
    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match self.match_type {
            MatchType::Exact => input.eq_ignore_ascii_case(self.pattern.trim()),
            MatchType::Contains => input
                .to_lowercase()
                .contains(&self.pattern.trim().to_lowercase()),
            MatchType::Regex => match Regex::new(&self.pattern) {
                Ok(regex) => regex.is_match(input),
                Err(e) => {
                    warn!(rule_id = %self.id, error = %e, "invalid reply rule regex");
                    false
                },
            },
        }
    }
}

/// Per-tenant auto-reply settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// The session owner actively uses this account: never respond to
    /// messages the owner sent themselves.
    #[serde(default)]
    pub owner_mode: bool,
    #[serde(default)]
    pub rules: Vec<ReplyRule>,
}

impl ReplyConfig {
    /// First enabled rule matching the trimmed input, in configured order.
    #[must_use]
    pub fn first_match(&self, body: &str) -> Option<&ReplyRule> {
        let input = body.trim();
        self.rules.iter().find(|rule| rule.matches(input))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exact_is_case_insensitive_and_trimmed() {
        let rule = ReplyRule::new(MatchType::Exact, "Hello", "hi there");
        assert!(rule.matches("hello"));
        assert!(rule.matches("HELLO"));
        assert!(!rule.matches("hello!"));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let rule = ReplyRule::new(MatchType::Contains, "Price", "see our rates");
        assert!(rule.matches("what's the PRICE of this?"));
        assert!(!rule.matches("how much?"));
    }

    #[test]
    fn regex_matches_raw_input() {
        let rule = ReplyRule::new(MatchType::Regex, r"^order\s+\d+$", "checking");
        assert!(rule.matches("order 123"));
        assert!(!rule.matches("order abc"));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let rule = ReplyRule::new(MatchType::Regex, "([", "broken");
        assert!(!rule.matches("(["));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let mut rule = ReplyRule::new(MatchType::Contains, "hi", "hello");
        rule.enabled = false;
        assert!(!rule.matches("hi"));
    }

    #[test]
    fn first_match_wins_in_configured_order() {
        let config = ReplyConfig {
            enabled: true,
            owner_mode: false,
            rules: vec![
                ReplyRule::new(MatchType::Contains, "help", "general help"),
                ReplyRule::new(MatchType::Contains, "help me", "specific help"),
            ],
        };
        let matched = config.first_match("  help me please ").unwrap();
        assert_eq!(matched.response, "general help");
    }

    #[test]
    fn config_round_trips_with_defaults() {
        let json = r#"{"enabled": true, "rules": [{"matchType": "exact", "pattern": "hi", "response": "hello"}]}"#;
        let config: ReplyConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert!(!config.owner_mode);
        assert!(config.rules[0].enabled);
        assert!(!config.rules[0].id.is_empty());
    }
}
