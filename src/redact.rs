//! Redaction pass over the published HTML.
//!
//! Plain ordered text substitution with no awareness of HTML structure.
//! Built-in contact patterns run first (case-insensitive), then the
//! configured name patterns in configuration order (case-sensitive).

use std::fmt;

use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

use crate::config::{NameReplacement, RedactConfig};
use crate::error::{BookError, Result};

/// Built-in `(pattern, replacement, description)` rules.
const BUILTIN_RULES: [(&str, &str, &str); 3] = [
    (
        r"mailto:[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
        "#",
        "email links",
    ),
    (
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
        "[email removed]",
        "email addresses",
    ),
    (
        r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b",
        "[phone removed]",
        "phone numbers",
    ),
];

struct Rule {
    regex: Regex,
    replacement: String,
    description: String,
}

/// One rule that matched at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub description: String,
    pub count: usize,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} × {}", self.count, self.description)
    }
}

/// Output of [`Redactor::redact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub text: String,
    /// Rules with at least one match, in application order.
    pub changes: Vec<Change>,
}

impl Redaction {
    /// Total number of substitutions made.
    pub fn total(&self) -> usize {
        self.changes.iter().map(|c| c.count).sum()
    }
}

pub struct Redactor {
    rules: Vec<Rule>,
}

impl Redactor {
    /// Built-in rules followed by `names`.
    ///
    /// Fails with [`BookError::InvalidPattern`] when a name pattern does not compile.
    pub fn new(names: &[NameReplacement]) -> Result<Self> {
        let mut rules = Vec::with_capacity(BUILTIN_RULES.len() + names.len());
        for (pattern, replacement, description) in BUILTIN_RULES {
            rules.push(Rule {
                regex: compile(pattern, true)?,
                replacement: replacement.to_string(),
                description: description.to_string(),
            });
        }
        for name in names {
            rules.push(Rule {
                regex: compile(&name.pattern, false)?,
                replacement: name.replacement.clone(),
                description: format!("'{}' → '{}'", name.pattern, name.replacement),
            });
        }
        Ok(Self { rules })
    }

    pub fn from_config(config: &RedactConfig) -> Result<Self> {
        if config.names.is_empty() {
            debug!("No name patterns configured, only contact details will be redacted");
        }
        Self::new(&config.names)
    }

    /// Apply every rule in order. Zero matches is a normal outcome.
    pub fn redact(&self, text: &str) -> Redaction {
        let mut current = text.to_string();
        let mut changes = Vec::new();

        for rule in &self.rules {
            let count = rule.regex.find_iter(&current).count();
            if count == 0 {
                continue;
            }
            current = rule
                .regex
                .replace_all(&current, rule.replacement.as_str())
                .into_owned();
            info!(rule = %rule.description, count, "Redacted");
            changes.push(Change {
                description: rule.description.clone(),
                count,
            });
        }

        Redaction {
            text: current,
            changes,
        }
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| BookError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(pattern: &str, replacement: &str) -> NameReplacement {
        NameReplacement {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn test_builtin_patterns_in_order() {
        let redactor = Redactor::new(&[]).unwrap();
        let out = redactor.redact(
            r#"<a href="mailto:gm@Example.com">gm@Example.com</a> call 555-123-4567 or 555.987.6543"#,
        );
        assert_eq!(
            out.text,
            r##"<a href="#">[email removed]</a> call [phone removed] or [phone removed]"##
        );
        assert_eq!(
            out.changes,
            vec![
                Change {
                    description: "email links".to_string(),
                    count: 1
                },
                Change {
                    description: "email addresses".to_string(),
                    count: 1
                },
                Change {
                    description: "phone numbers".to_string(),
                    count: 2
                },
            ]
        );
        assert_eq!(out.total(), 4);
    }

    #[test]
    fn test_name_patterns_after_builtins() {
        let redactor = Redactor::new(&[
            name(r"\bIreena\b", "the Burgomaster's daughter"),
            name("Ism", "Ismark"),
        ])
        .unwrap();
        let out = redactor.redact("Ireena met ism and Ism.");
        assert_eq!(out.text, "the Burgomaster's daughter met ism and Ismark.");
        assert_eq!(out.changes.len(), 2);
    }

    #[test]
    fn test_no_matches_is_not_an_error() {
        let out = Redactor::new(&[]).unwrap().redact("nothing to see");
        assert_eq!(out.text, "nothing to see");
        assert!(out.changes.is_empty());
    }

    #[test]
    fn test_invalid_name_pattern() {
        let err = Redactor::new(&[name("(unclosed", "x")]).err().unwrap();
        assert!(matches!(err, BookError::InvalidPattern { .. }));
    }
}
