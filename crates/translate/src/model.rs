//! Client model name to upstream model id normalization.
//!
//! An ordered list of `(matcher, canonical)` rules, most specific first.
//! The first matching rule decides; a name matching no rule passes through.

use std::borrow::Cow;

/// How a rule recognises a model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Exact(String),
    Prefix(String),
    Contains(String),
    Any,
}

impl Matcher {
    /// Parse `name`, `prefix*`, `*substring*` or `*`.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
            _ if pattern == "*" => Self::Any,
            (Some(rest), _) => Self::Contains(rest.trim_end_matches('*').to_string()),
            (None, Some(head)) => Self::Prefix(head.to_string()),
            (None, None) => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(s) => name == s,
            Self::Prefix(p) => name.starts_with(p.as_str()),
            Self::Contains(c) => name.contains(c.as_str()),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRule {
    pub matcher: Matcher,
    /// `None` keeps the client's name.
    pub canonical: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRules {
    rules: Vec<ModelRule>,
}

impl Default for ModelRules {
    fn default() -> Self {
        Self::from_patterns([
            ("gemini-3*", None),
            ("*lite*", Some("gemini-2.5-flash-lite")),
            ("*flash*", Some("gemini-2.5-flash")),
            ("*pro*", Some("gemini-2.5-pro")),
        ])
    }
}

impl ModelRules {
    #[must_use]
    pub fn new(rules: Vec<ModelRule>) -> Self {
        Self { rules }
    }

    /// Build from `(pattern, canonical)` pairs in evaluation order.
    pub fn from_patterns<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(pattern, canonical)| ModelRule {
                    matcher: Matcher::parse(pattern),
                    canonical: canonical.map(str::to_string),
                })
                .collect(),
        )
    }

    /// Map a client model name to the upstream id. A `models/` prefix is
    /// accepted and stripped.
    #[must_use]
    pub fn normalize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let name = name.strip_prefix("models/").unwrap_or(name);
        match self.rules.iter().find(|r| r.matcher.matches(name)) {
            Some(ModelRule {
                canonical: Some(c), ..
            }) => Cow::Owned(c.clone()),
            _ => Cow::Borrowed(name),
        }
    }

    /// Distinct canonical ids, in rule order, for the model catalog.
    #[must_use]
    pub fn canonical_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self.rules.iter().filter_map(|r| r.canonical.as_deref()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
