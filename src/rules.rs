//! Sender-domain rules and rule-set evaluation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::{GmailError, Result};
use crate::models::Message;

/// A pure, fail-closed classification of a message.
///
/// Implementations must not mutate anything and must answer `false` whenever
/// the message lacks what they need to decide.
pub trait Predicate: Send + Sync {
    fn matches(&self, message: &Message) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn matches(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Configurable sender-domain matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classifier {
    /// Sender domain equals `domain`
    Domain { domain: String },
    /// Sender domain is one of `domains`
    DomainList { domains: Vec<String> },
}

impl Classifier {
    pub fn domain(domain: impl Into<String>) -> Self {
        Classifier::Domain {
            domain: domain.into(),
        }
    }

    pub fn domain_list<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Classifier::DomainList {
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        let domains: Vec<&String> = match self {
            Classifier::Domain { domain } => vec![domain],
            Classifier::DomainList { domains } => {
                if domains.is_empty() {
                    return Err(GmailError::ConfigError(
                        "domain_list rule needs at least one domain".to_string(),
                    ));
                }
                domains.iter().collect()
            }
        };

        for domain in domains {
            let domain = domain.trim();
            if domain.is_empty() || domain.contains('@') || domain.contains(char::is_whitespace) {
                return Err(GmailError::ConfigError(format!(
                    "invalid domain '{}' in rule",
                    domain
                )));
            }
        }
        Ok(())
    }

    fn compile(&self) -> DomainMatcher {
        let normalize = |d: &String| d.trim().to_ascii_lowercase();
        match self {
            Classifier::Domain { domain } => DomainMatcher::Equals(normalize(domain)),
            Classifier::DomainList { domains } => {
                DomainMatcher::OneOf(domains.iter().map(normalize).collect())
            }
        }
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classifier::Domain { domain } => write!(f, "domain == {}", domain),
            Classifier::DomainList { domains } => write!(f, "domain in [{}]", domains.join(", ")),
        }
    }
}

/// Normalized form of a [`Classifier`] used at evaluation time
#[derive(Debug, Clone)]
enum DomainMatcher {
    Equals(String),
    OneOf(HashSet<String>),
}

impl Predicate for DomainMatcher {
    fn matches(&self, message: &Message) -> bool {
        let Some(domain) = message.sender_domain() else {
            return false;
        };
        match self {
            DomainMatcher::Equals(expected) => domain == *expected,
            DomainMatcher::OneOf(set) => set.contains(&domain),
        }
    }
}

/// Rule as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub label: String,
    #[serde(rename = "match")]
    pub matcher: Classifier,
}

impl RuleConfig {
    pub fn new(label: impl Into<String>, matcher: Classifier) -> Self {
        Self {
            label: label.into(),
            matcher,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "rule label cannot be empty".to_string(),
            ));
        }
        self.matcher.validate()
    }
}

/// A predicate paired with the label applied when it matches
pub struct Rule {
    predicate: Box<dyn Predicate>,
    label: String,
}

impl Rule {
    pub fn new(predicate: impl Predicate + 'static, label: impl Into<String>) -> Self {
        Self {
            predicate: Box::new(predicate),
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.predicate.matches(message)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Ordered rules; every rule is evaluated against every message.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from configured rules, validating each one
    pub fn from_config(rules: &[RuleConfig]) -> Result<Self> {
        let mut set = Self::new();
        for rule in rules {
            rule.validate()?;
            set.push(Rule::new(rule.matcher.compile(), rule.label.trim()));
        }
        Ok(set)
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, predicate: impl Predicate + 'static, label: impl Into<String>) -> Self {
        self.push(Rule::new(predicate, label));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Every label name any rule can produce
    pub fn label_names(&self) -> BTreeSet<String> {
        self.rules.iter().map(|r| r.label.clone()).collect()
    }

    /// Union of the labels of all matching rules
    pub fn evaluate(&self, message: &Message) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(message))
            .map(|rule| rule.label.clone())
            .collect()
    }
}

/// Rules shipped in the default configuration
pub fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::new("Work", Classifier::domain("work.com")),
        RuleConfig::new("College", Classifier::domain("college.com")),
        RuleConfig::new(
            "Conditions",
            Classifier::domain_list(["leetcode.com", "linkedin.com", "udemymail.com"]),
        ),
    ]
}
