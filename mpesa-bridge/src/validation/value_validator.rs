//! Ordered rules for one field.

use serde_json::Value;

use super::{BoundRule, ErrorMessage, RuleContext};

static NULL: Value = Value::Null;

/// The rules attached to one selector, in evaluation order.
///
/// A required rule is always kept at the front, however late it is added, and its failure
/// stops the remaining rules for that field. A rule added under a name that is already
/// present replaces the earlier one in place.
#[derive(Debug, Clone, Default)]
pub struct ValueValidator {
    label: Option<String>,
    rules: Vec<BoundRule>,
}

impl ValueValidator {
    /// Creates an empty collection with an optional field label.
    #[must_use]
    pub const fn new(label: Option<String>) -> Self {
        Self { label, rules: Vec::new() }
    }

    /// Returns the field label, if one was given.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Sets the field label.
    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    /// Inserts a rule, keeping a required rule first.
    pub fn add(&mut self, rule: BoundRule) {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.name() == rule.name()) {
            *existing = rule;
            return;
        }
        if rule.is_required() {
            self.rules.insert(0, rule);
        } else {
            self.rules.push(rule);
        }
    }

    /// Removes the rule named `name`, if present.
    pub fn remove(&mut self, name: &str) {
        self.rules.retain(|r| r.name() != name);
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[BoundRule] {
        &self.rules
    }

    /// Returns true if a required rule is attached.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.rules.first().is_some_and(BoundRule::is_required)
    }

    /// Evaluates every rule against `value`, returning the failures.
    ///
    /// An absent, null or empty-string value on a field without a required rule is skipped
    /// and always passes. `path` is the concrete field path, used as the label when none was
    /// given.
    pub fn validate(
        &self,
        path: &str,
        value: Option<&Value>,
        ctx: &RuleContext<'_>,
    ) -> Vec<ErrorMessage> {
        let value = value.unwrap_or(&NULL);
        let blank = match value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if blank && !self.is_required() {
            return Vec::new();
        }

        let label = self.label.as_deref().unwrap_or(path);
        let mut failures = Vec::new();
        for rule in &self.rules {
            if rule.check(value, ctx) {
                continue;
            }
            failures.push(rule.error_message(label, value));
            if rule.is_required() {
                break;
            }
        }
        failures
    }
}
