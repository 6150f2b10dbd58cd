//! Dataset-level validation.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use tracing::debug;

use super::{
    BoundRule, ErrorMessage, RuleContext, RuleFactory, RuleSpec, Selector, ValueValidator,
};
use crate::error::{MpesaError, Result};

/// Rules for a whole dataset, keyed by selector.
///
/// The result of [`validate`](Self::validate) is cached until the data changes.
///
/// # Examples
///
/// ```
/// use mpesa_bridge::validation::Validator;
/// use serde_json::json;
///
/// let mut validator = Validator::new();
/// validator.add("Amount", "required | number | between(1,150000)").unwrap();
/// validator.add("PhoneNumber:Phone number", "required").unwrap();
///
/// assert!(!validator.validate(Some(json!({"Amount": "ten"}))));
/// assert_eq!(
///     validator.flat_messages(),
///     [
///         "Amount must be a number",
///         "Amount must be between 1 and 150000",
///         "Phone number is required",
///     ],
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Validator {
    factory: Arc<RuleFactory>,
    fields: Vec<(Selector, ValueValidator)>,
    data: Value,
    result: Option<bool>,
    messages: Vec<(String, Vec<ErrorMessage>)>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Creates a validator using the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(Arc::new(RuleFactory::new()))
    }

    /// Creates a validator that resolves rule names through `factory`.
    #[must_use]
    pub fn with_factory(factory: Arc<RuleFactory>) -> Self {
        Self {
            factory,
            fields: Vec::new(),
            data: Value::Null,
            result: None,
            messages: Vec::new(),
        }
    }

    /// Attaches rules to a selector.
    ///
    /// `selector` may carry a label after a colon (`"PhoneNumber:Phone number"`). `rules` is
    /// a `|`-separated rule list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the rules do not parse or name an unknown rule.
    pub fn add(&mut self, selector: &str, rules: &str) -> Result<&mut Self> {
        let specs = RuleSpec::parse_list(rules)?;
        let bound =
            specs.iter().map(|spec| self.factory.create(spec)).collect::<Result<Vec<_>>>()?;
        let (selector, label) = split_label(selector);
        let field = self.field_mut(selector);
        if label.is_some() {
            field.set_label(label);
        }
        for rule in bound {
            field.add(rule);
        }
        self.result = None;
        Ok(self)
    }

    /// Attaches an already bound rule to a selector.
    pub fn add_rule(&mut self, selector: &str, rule: BoundRule) -> &mut Self {
        let (selector, label) = split_label(selector);
        let field = self.field_mut(selector);
        if label.is_some() {
            field.set_label(label);
        }
        field.add(rule);
        self.result = None;
        self
    }

    /// Detaches the named rule from a selector, or every rule when `name` is `None`.
    pub fn remove(&mut self, selector: &str, name: Option<&str>) -> &mut Self {
        let (selector, _) = split_label(selector);
        match name {
            Some(name) => {
                if let Some((_, field)) =
                    self.fields.iter_mut().find(|(s, _)| s.as_str() == selector)
                {
                    field.remove(name);
                }
            }
            None => self.fields.retain(|(s, _)| s.as_str() != selector),
        }
        self.result = None;
        self
    }

    /// Replaces the dataset and discards any cached result.
    pub fn set_data(&mut self, data: Value) -> &mut Self {
        self.data = data;
        self.result = None;
        self.messages.clear();
        self
    }

    /// Returns the dataset being validated.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Validates the dataset and returns whether every rule passed.
    ///
    /// Passing `Some(data)` that differs from the current dataset replaces it first. While
    /// the data is unchanged the cached result is returned without re-running any rule.
    pub fn validate(&mut self, data: Option<Value>) -> bool {
        if let Some(data) = data
            && data != self.data
        {
            self.set_data(data);
        }
        if let Some(result) = self.result {
            return result;
        }

        let ctx = RuleContext::new(&self.data);
        let mut messages = Vec::new();
        for (selector, field) in &self.fields {
            for (path, value) in selector.resolve(&self.data) {
                let failures = field.validate(&path, value, &ctx);
                if !failures.is_empty() {
                    messages.push((path.into_owned(), failures));
                }
            }
        }

        let passed = messages.is_empty();
        debug!(fields = self.fields.len(), failed = messages.len(), passed, "validation finished");
        self.messages = messages;
        self.result = Some(passed);
        passed
    }

    /// Returns the failure messages per field path, rendered.
    #[must_use]
    pub fn messages(&self) -> BTreeMap<String, Vec<String>> {
        self.messages
            .iter()
            .map(|(path, failures)| {
                (path.clone(), failures.iter().map(ErrorMessage::render).collect())
            })
            .collect()
    }

    /// Returns the unrendered failure messages for one field path.
    #[must_use]
    pub fn messages_for(&self, path: &str) -> &[ErrorMessage] {
        self.messages.iter().find(|(p, _)| p == path).map_or(&[], |(_, failures)| failures)
    }

    /// Returns every rendered message, fields in the order they were added.
    #[must_use]
    pub fn flat_messages(&self) -> Vec<String> {
        self.messages
            .iter()
            .flat_map(|(_, failures)| failures.iter().map(ErrorMessage::render))
            .collect()
    }

    /// Validates `data` and converts a failure into a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`MpesaError::Configuration`] carrying every rendered message.
    pub fn check(&mut self, data: Value) -> Result<()> {
        if self.validate(Some(data)) {
            Ok(())
        } else {
            Err(MpesaError::validation(self.flat_messages()))
        }
    }

    /// Returns the selectors that have rules, in insertion order.
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(s, _)| s.as_str())
    }

    fn field_mut(&mut self, selector: &str) -> &mut ValueValidator {
        let idx = match self.fields.iter().position(|(s, _)| s.as_str() == selector) {
            Some(idx) => idx,
            None => {
                self.fields.push((Selector::parse(selector), ValueValidator::default()));
                self.fields.len() - 1
            }
        };
        &mut self.fields[idx].1
    }
}

fn split_label(selector: &str) -> (&str, Option<String>) {
    match selector.split_once(':') {
        Some((selector, label)) if !label.trim().is_empty() => {
            (selector.trim(), Some(label.trim().to_owned()))
        }
        Some((selector, _)) => (selector.trim(), None),
        None => (selector.trim(), None),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::validation::OptionsIndex;

    #[test]
    fn test_valid_data_passes() {
        let mut validator = Validator::new();
        validator.add("Amount", "required | number").unwrap();
        assert!(validator.validate(Some(json!({"Amount": 100}))));
        assert!(validator.messages().is_empty());
    }

    #[test]
    fn test_messages_grouped_by_field() {
        let mut validator = Validator::new();
        validator
            .add("Amount", "required | number")
            .unwrap()
            .add("PhoneNumber:Phone", "required")
            .unwrap();
        assert!(!validator.validate(Some(json!({"Amount": "abc"}))));

        let messages = validator.messages();
        assert_eq!(messages["Amount"], ["Amount must be a number"]);
        assert_eq!(messages["PhoneNumber"], ["Phone is required"]);
        assert_eq!(validator.messages_for("PhoneNumber").len(), 1);
        assert!(validator.messages_for("Other").is_empty());
    }

    #[test]
    fn test_result_cached_until_data_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut factory = RuleFactory::new();
        factory.register_callback("counted", "{label} failed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let mut validator = Validator::with_factory(Arc::new(factory));
        validator.add("Amount", "counted").unwrap();

        let data = json!({"Amount": 1});
        assert!(validator.validate(Some(data.clone())));
        assert!(validator.validate(None));
        assert!(validator.validate(Some(data)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        validator.set_data(json!({"Amount": 2}));
        assert!(validator.validate(None));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wildcard_messages_use_concrete_paths() {
        let mut validator = Validator::new();
        validator.add("items[*][price]", "required | number").unwrap();
        let data = json!({"items": [{"price": 5}, {"price": "x"}, {}]});
        assert!(!validator.validate(Some(data)));
        assert_eq!(
            validator.flat_messages(),
            ["items[1][price] must be a number", "items[2][price] is required"]
        );
    }

    #[test]
    fn test_check_returns_configuration_error() {
        let mut validator = Validator::new();
        validator.add("Amount", "required").unwrap();
        let err = validator.check(json!({})).unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.messages(), ["Amount is required"]);
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let mut validator = Validator::new();
        assert!(validator.add("Amount", "required | bogus").is_err());
        assert_eq!(validator.selectors().count(), 0);
    }

    #[test]
    fn test_add_rule_and_remove() {
        let mut factory = RuleFactory::new();
        factory.register("never", OptionsIndex::Named(Vec::new()), |_| {
            Ok(Arc::new(crate::validation::Callback::new("{label} never passes", |_| false))
                as Arc<dyn crate::validation::Rule>)
        });
        let rule = factory.create(&RuleSpec::new("never")).unwrap();

        let mut validator = Validator::new();
        validator.add_rule("Amount", rule);
        assert!(!validator.validate(Some(json!({"Amount": 1}))));

        validator.remove("Amount", Some("never"));
        assert!(validator.validate(None));

        validator.add("Amount", "required").unwrap();
        validator.remove("Amount", None);
        assert_eq!(validator.selectors().count(), 0);
    }

    #[test]
    fn test_match_rule_reads_other_field() {
        let mut validator = Validator::new();
        validator.add("PartyA", "match(PhoneNumber)").unwrap();
        assert!(validator.validate(Some(json!({"PartyA": "2547", "PhoneNumber": "2547"}))));
        assert!(!validator.validate(Some(json!({"PartyA": "2547", "PhoneNumber": "2548"}))));
        assert_eq!(validator.flat_messages(), ["PartyA must match PhoneNumber"]);
    }
}
