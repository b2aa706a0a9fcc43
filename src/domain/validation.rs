//! Declarative field-rule engine.
//!
//! A [`RuleSet`] is an ordered list of field rules. Each field is
//! trimmed, then checked against its rules in declared order (stopping at the
//! first failing rule for that field), then sanitized. Every field is
//! processed in one pass so the caller always receives the complete error map.
//!
//! Validation is total: malformed or missing input produces errors, never a
//! panic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Untyped form input as submitted by the client.
///
/// Missing fields read as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawForm(BTreeMap<String, String>);

impl RawForm {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value, replacing any previous one.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Get a field value, or `""` if absent.
    pub fn get(&self, field: &str) -> &str {
        self.0.get(field).map(String::as_str).unwrap_or("")
    }

    /// Remove a field and return it.
    pub fn take(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    /// Iterate over all fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawForm {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Field name to a single human-readable message.
///
/// At most one message is kept per field: the first one recorded wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrorMap(BTreeMap<String, String>);

impl ValidationErrorMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message unless the field already has one.
    pub fn insert_first(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    /// Message recorded for a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Whether any field failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failing fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(field, message)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationErrorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// A check applied to a trimmed field value.
#[derive(Clone, Copy)]
pub enum Predicate {
    /// Character count within `min..=max`
    Length {
        /// Minimum characters
        min: usize,
        /// Maximum characters
        max: usize,
    },
    /// Non-empty after trimming
    NotEmpty,
    /// Syntactically valid email address
    Email,
    /// Arbitrary check
    Custom(fn(&str) -> bool),
}

impl Predicate {
    /// Evaluate the predicate against a trimmed value.
    pub fn holds(&self, value: &str) -> bool {
        match self {
            Predicate::Length { min, max } => {
                let len = value.chars().count();
                len >= *min && len <= *max
            }
            Predicate::NotEmpty => !value.is_empty(),
            Predicate::Email => is_valid_email(value),
            Predicate::Custom(check) => check(value),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            Predicate::NotEmpty => write!(f, "NotEmpty"),
            Predicate::Email => write!(f, "Email"),
            Predicate::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// A predicate with the message reported when it fails.
#[derive(Debug, Clone)]
pub struct Rule {
    /// The check
    pub predicate: Predicate,
    /// Message shown to the user on failure
    pub message: String,
}

/// Transformation applied to a value that passed all its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sanitizer {
    /// Keep the trimmed value as is
    #[default]
    Keep,
    /// Escape HTML-significant characters
    EscapeMarkup,
    /// Canonicalize an email address
    NormalizeEmail,
}

impl Sanitizer {
    fn apply(&self, value: &str) -> String {
        match self {
            Sanitizer::Keep => value.to_string(),
            Sanitizer::EscapeMarkup => escape_markup(value),
            Sanitizer::NormalizeEmail => normalize_email(value),
        }
    }
}

/// Rules for a single field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: &'static str,
    rules: Vec<Rule>,
    sanitizer: Sanitizer,
}

impl FieldSpec {
    /// Start describing the named field.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
            sanitizer: Sanitizer::Keep,
        }
    }

    /// Append a rule. Rules run in the order they are added.
    pub fn rule(mut self, predicate: Predicate, message: impl Into<String>) -> Self {
        self.rules.push(Rule {
            predicate,
            message: message.into(),
        });
        self
    }

    /// Append a character-length rule.
    pub fn length(self, min: usize, max: usize, message: impl Into<String>) -> Self {
        self.rule(Predicate::Length { min, max }, message)
    }

    /// Append an email syntax rule.
    pub fn email(self, message: impl Into<String>) -> Self {
        self.rule(Predicate::Email, message)
    }

    /// Escape markup in the surviving value.
    pub fn escape(mut self) -> Self {
        self.sanitizer = Sanitizer::EscapeMarkup;
        self
    }

    /// Normalize the surviving value as an email address.
    pub fn normalize_email(mut self) -> Self {
        self.sanitizer = Sanitizer::NormalizeEmail;
        self
    }

    /// Field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check and sanitize one raw value.
    fn check(&self, raw: &str) -> Result<String, &str> {
        let trimmed = raw.trim();
        match self.rules.iter().find(|rule| !rule.predicate.holds(trimmed)) {
            Some(failed) => Err(failed.message.as_str()),
            None => Ok(self.sanitizer.apply(trimmed)),
        }
    }
}

/// Sanitized values keyed by field name.
pub type CleanFields = BTreeMap<&'static str, String>;

/// Ordered list of field descriptions.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    fields: Vec<FieldSpec>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Validate a raw form against every field in declared order.
    ///
    /// Fields not mentioned by the rule set are ignored.
    pub fn validate(&self, raw: &RawForm) -> Result<CleanFields, ValidationErrorMap> {
        let mut clean = CleanFields::new();
        let mut errors = ValidationErrorMap::new();

        for spec in &self.fields {
            match spec.check(raw.get(spec.name)) {
                Ok(value) => {
                    clean.insert(spec.name, value);
                }
                Err(message) => errors.insert_first(spec.name, message),
            }
        }

        if errors.is_empty() {
            Ok(clean)
        } else {
            Err(errors)
        }
    }
}

/// Escape characters that carry meaning in HTML.
///
/// ```
/// use formgate::domain::validation::escape_markup;
///
/// assert_eq!(escape_markup("<b>\"hi\"</b>"), "&lt;b&gt;&quot;hi&quot;&lt;&#x2F;b&gt;");
/// ```
pub fn escape_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            other => out.push(other),
        }
    }
    out
}

const LOCAL_PART_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// Syntactic email check: `local@domain.tld`.
pub fn is_valid_email(value: &str) -> bool {
    if value.len() > 254 {
        return false;
    }

    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };

    valid_local_part(local) && valid_domain(domain)
}

fn valid_local_part(local: &str) -> bool {
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || LOCAL_PART_SPECIALS.contains(c))
}

fn valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let tld = labels[labels.len() - 1];
    let tld_ok = tld.len() >= 2
        && (tld.chars().all(|c| c.is_ascii_alphabetic()) || tld.starts_with("xn--"));

    labels_ok && tld_ok
}

/// Canonicalize an email address.
///
/// The whole address is lowercased. For Gmail addresses dots and `+tag`
/// sub-addresses are dropped from the local part and `googlemail.com` is
/// folded into `gmail.com`, since those variants all reach the same inbox.
pub fn normalize_email(value: &str) -> String {
    let lowered = value.to_lowercase();
    let Some((local, domain)) = lowered.rsplit_once('@') else {
        return lowered;
    };

    if domain == "gmail.com" || domain == "googlemail.com" {
        let base = local.split('+').next().unwrap_or(local);
        let stripped: String = base.chars().filter(|c| *c != '.').collect();
        format!("{stripped}@gmail.com")
    } else {
        format!("{local}@{domain}")
    }
}
