//! Rule construction by name.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use super::{
    ErrorMessage,
    rules::{
        Between, Callback, CharClass, Equal, GreaterThan, InList, Integer, Length, LengthBound,
        LessThan, Match, Number, Options, Pattern, Required, Rule, RuleContext, WebUrl, value_text,
    },
    spec::{RuleOptions, RuleSpec},
};
use crate::error::{MpesaError, Result};

type Builder = Arc<dyn Fn(&Options) -> Result<Arc<dyn Rule>> + Send + Sync>;

const REQUIRED: &str = "required";

/// How positional options are named for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsIndex {
    /// Positional values are assigned to these names in order.
    Named(Vec<String>),
    /// All positional values are collected into a `values` list.
    List,
}

impl OptionsIndex {
    /// Positional names from string slices.
    #[must_use]
    pub fn named(names: &[&str]) -> Self {
        Self::Named(names.iter().map(|n| (*n).to_owned()).collect())
    }
}

struct Entry {
    name: String,
    index: OptionsIndex,
    build: Builder,
}

/// A rule bound to its options, message override and label.
///
/// Cheap to clone: the executable rule is shared.
#[derive(Clone)]
pub struct BoundRule {
    name: String,
    rule: Arc<dyn Rule>,
    options: Options,
    message: Option<String>,
    label: Option<String>,
}

impl fmt::Debug for BoundRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRule")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("message", &self.message)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl BoundRule {
    /// Binds an already-constructed rule under `name`.
    pub fn new(name: impl Into<String>, rule: Arc<dyn Rule>) -> Self {
        Self { name: name.into(), rule, options: Options::new(), message: None, label: None }
    }

    /// Overrides the message template.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the field label used in messages.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the canonical rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resolved options.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the label bound to this rule, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns true for the presence rule, which always runs first.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.name == REQUIRED
    }

    /// Runs the underlying check.
    #[must_use]
    pub fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> bool {
        self.rule.check(value, ctx)
    }

    /// Builds the failure message for `value`.
    ///
    /// `{label}` is the bound label, else `fallback_label`. `{value}` is the offending
    /// value. Every option is available under its own name; list options are joined with
    /// `", "`.
    pub fn error_message(&self, fallback_label: &str, value: &Value) -> ErrorMessage {
        let template = self.message.as_deref().unwrap_or_else(|| self.rule.message());
        let mut message = ErrorMessage::new(template)
            .with_variable("label", self.label.as_deref().unwrap_or(fallback_label))
            .with_variable("value", value_text(value).unwrap_or_default());
        for (key, option) in &self.options {
            let text = match option {
                Value::Array(items) => {
                    items.iter().filter_map(value_text).collect::<Vec<_>>().join(", ")
                }
                other => value_text(other).map(std::borrow::Cow::into_owned).unwrap_or_default(),
            };
            message = message.with_variable(key.clone(), text);
        }
        message
    }
}

/// Registry of rule constructors, looked up by name.
///
/// Names match case-insensitively and ignore `_` and `-`, so `min_length`, `minLength` and
/// `MIN-LENGTH` are the same rule.
///
/// # Examples
///
/// ```
/// use mpesa_bridge::validation::{RuleFactory, RuleSpec};
///
/// let mut factory = RuleFactory::new();
/// factory.register_callback("kenyan_msisdn", "{label} must start with 254", |value| {
///     value.as_str().is_some_and(|s| s.starts_with("254"))
/// });
///
/// let rule = factory.create(&RuleSpec::parse("kenyanMsisdn").unwrap()).unwrap();
/// assert_eq!(rule.name(), "kenyan_msisdn");
/// ```
pub struct RuleFactory {
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for RuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        f.debug_struct("RuleFactory").field("rules", &names).finish()
    }
}

impl Default for RuleFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleFactory {
    /// Creates a factory with every built-in rule registered.
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self { entries: HashMap::new() };
        factory.register_builtins();
        factory
    }

    /// Registers a rule constructor under `name`, replacing any existing rule.
    pub fn register<F>(&mut self, name: &str, index: OptionsIndex, build: F)
    where
        F: Fn(&Options) -> Result<Arc<dyn Rule>> + Send + Sync + 'static,
    {
        self.entries
            .insert(squash(name), Entry { name: name.to_owned(), index, build: Arc::new(build) });
    }

    /// Registers a closure-backed rule with no options.
    pub fn register_callback<F>(&mut self, name: &str, message: &str, check: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let rule: Arc<dyn Rule> = Arc::new(Callback::new(message, check));
        self.register(name, OptionsIndex::Named(Vec::new()), move |_| Ok(Arc::clone(&rule)));
    }

    /// Registers `alias` as another name for the already registered `target`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `target` is unknown.
    pub fn alias(&mut self, alias: &str, target: &str) -> Result<()> {
        let entry = self.entries.get(&squash(target)).ok_or_else(|| {
            MpesaError::configuration(format!("unknown validation rule '{target}'"))
        })?;
        let copy = Entry {
            name: entry.name.clone(),
            index: entry.index.clone(),
            build: Arc::clone(&entry.build),
        };
        self.entries.insert(squash(alias), copy);
        Ok(())
    }

    /// Returns true if a rule is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&squash(name))
    }

    /// Builds a bound rule from a parsed spec.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown rule name or options the rule rejects.
    pub fn create(&self, spec: &RuleSpec) -> Result<BoundRule> {
        let entry = self.entries.get(&squash(&spec.name)).ok_or_else(|| {
            MpesaError::configuration(format!("unknown validation rule '{}'", spec.name))
        })?;
        let options = resolve_options(spec, &entry.index);
        let rule = (entry.build)(&options)?;
        Ok(BoundRule {
            name: entry.name.clone(),
            rule,
            options,
            message: spec.message.clone(),
            label: spec.label.clone(),
        })
    }

    fn register_builtins(&mut self) {
        fn shared<R: Rule + 'static>(rule: R) -> Result<Arc<dyn Rule>> {
            Ok(Arc::new(rule))
        }
        let none = || OptionsIndex::Named(Vec::new());

        self.register(REQUIRED, none(), |_| shared(Required));
        self.register("number", none(), |_| shared(Number));
        self.register("integer", none(), |_| shared(Integer));
        self.register("between", OptionsIndex::named(&["min", "max"]), |o| {
            shared(Between::from_options(o)?)
        });
        self.register("greater_than", OptionsIndex::named(&["min", "inclusive"]), |o| {
            shared(GreaterThan::from_options(o)?)
        });
        self.register("less_than", OptionsIndex::named(&["max", "inclusive"]), |o| {
            shared(LessThan::from_options(o)?)
        });
        self.register("length", OptionsIndex::named(&["size"]), |o| {
            shared(Length::from_options(LengthBound::Exact, o)?)
        });
        self.register("min_length", OptionsIndex::named(&["min"]), |o| {
            shared(Length::from_options(LengthBound::Min, o)?)
        });
        self.register("max_length", OptionsIndex::named(&["max"]), |o| {
            shared(Length::from_options(LengthBound::Max, o)?)
        });
        self.register("email", none(), |_| shared(Pattern::email()?));
        self.register("url", none(), |_| shared(WebUrl));
        self.register("regex", OptionsIndex::named(&["pattern"]), |o| {
            shared(Pattern::from_options(o)?)
        });
        self.register("in_list", OptionsIndex::List, |o| shared(InList::from_options(o, false)?));
        self.register("not_in_list", OptionsIndex::List, |o| {
            shared(InList::from_options(o, true)?)
        });
        self.register("alpha", none(), |_| shared(CharClass::Alpha));
        self.register("alpha_numeric", none(), |_| shared(CharClass::AlphaNumeric));
        self.register("alpha_num_hyphen", none(), |_| shared(CharClass::AlphaNumHyphen));
        self.register("equal", OptionsIndex::named(&["expected"]), |o| {
            shared(Equal::from_options(o)?)
        });
        self.register("match", OptionsIndex::named(&["item"]), |o| shared(Match::from_options(o)?));

        for (alias, target) in [
            ("numeric", "number"),
            ("int", "integer"),
            ("in", "in_list"),
            ("not_in", "not_in_list"),
            ("pattern", "regex"),
        ] {
            let registered = self.alias(alias, target);
            debug_assert!(registered.is_ok(), "alias target '{target}' is not registered");
        }
    }
}

/// Assigns names to positional options.
///
/// Rules with exactly one named slot receive the raw options text, unless named options
/// already provide that slot.
fn resolve_options(spec: &RuleSpec, index: &OptionsIndex) -> Options {
    match (&spec.options, index) {
        (RuleOptions::None, _) => Options::new(),
        (RuleOptions::Named(map), OptionsIndex::Named(names))
            if names.len() == 1 && !map.contains_key(&names[0]) =>
        {
            single_slot(&names[0], &spec.raw_options)
        }
        (RuleOptions::Named(map), _) => map.clone(),
        (_, OptionsIndex::Named(names)) if names.len() == 1 => {
            single_slot(&names[0], &spec.raw_options)
        }
        (RuleOptions::Single(value), OptionsIndex::List) => {
            [("values".to_owned(), Value::Array(vec![value.clone()]))].into_iter().collect()
        }
        (RuleOptions::List(values), OptionsIndex::List) => {
            [("values".to_owned(), Value::Array(values.clone()))].into_iter().collect()
        }
        (RuleOptions::Single(value), OptionsIndex::Named(names)) => names
            .first()
            .map(|name| [(name.clone(), value.clone())].into_iter().collect())
            .unwrap_or_default(),
        (RuleOptions::List(values), OptionsIndex::Named(names)) => {
            names.iter().cloned().zip(values.iter().cloned()).collect()
        }
    }
}

fn single_slot(name: &str, raw: &str) -> Options {
    let value = match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_owned()),
    };
    [(name.to_owned(), value)].into_iter().collect()
}

fn squash(name: &str) -> String {
    name.chars().filter(|c| *c != '_' && *c != '-').flat_map(char::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn create(spec: &str) -> Result<BoundRule> {
        RuleFactory::new().create(&RuleSpec::parse(spec)?)
    }

    fn passes(rule: &BoundRule, value: Value) -> bool {
        let data = Value::Null;
        rule.check(&value, &RuleContext::new(&data))
    }

    #[test]
    fn test_names_are_normalized() {
        for spec in ["min_length(3)", "minLength(3)", "MIN-LENGTH(3)", "MinLength(3)"] {
            let rule = create(spec).unwrap();
            assert_eq!(rule.name(), "min_length");
        }
    }

    #[test]
    fn test_unknown_rule_is_error() {
        let err = create("nonsense").unwrap_err();
        assert!(err.to_string().contains("unknown validation rule 'nonsense'"));
    }

    #[test]
    fn test_positional_options_resolved() {
        let rule = create("between(1,100)").unwrap();
        assert_eq!(rule.options()["min"], json!("1"));
        assert_eq!(rule.options()["max"], json!("100"));
        assert!(passes(&rule, json!(50)));
    }

    #[test]
    fn test_named_options_pass_through() {
        let rule = create(r#"between({"min": 10, "max": 20})"#).unwrap();
        assert!(passes(&rule, json!(15)));
        assert!(!passes(&rule, json!(25)));
    }

    #[test]
    fn test_list_rule_collects_values() {
        let rule = create("in_list(BusinessPayment,SalaryPayment,PromotionPayment)").unwrap();
        assert_eq!(rule.options()["values"].as_array().unwrap().len(), 3);
        assert!(passes(&rule, json!("PromotionPayment")));

        let single = create("in(Completed)").unwrap();
        assert_eq!(single.name(), "in_list");
        assert!(passes(&single, json!("Completed")));
    }

    #[test]
    fn test_regex_keeps_commas_and_equals() {
        let rule = create(r"regex(/^\d{1,3}$/)").unwrap();
        assert!(passes(&rule, json!("12")));
        assert!(!passes(&rule, json!("1234")));

        let eq = create("regex(/^a=b$/)").unwrap();
        assert!(passes(&eq, json!("a=b")));
    }

    #[test]
    fn test_invalid_options_fail_at_construction() {
        assert!(create("between(1)").is_err());
        assert!(create("regex").is_err());
        assert!(create("max_length(abc)").is_err());
    }

    #[test]
    fn test_error_message_variables() {
        let rule = create("between(1,10)").unwrap();
        let message = rule.error_message("Amount", &json!(50));
        assert_eq!(message.render(), "Amount must be between 1 and 10");
        assert_eq!(message.variables()["value"], "50");

        let custom = create("between(1,10)({label} out of range: {value})(Total)").unwrap();
        assert_eq!(custom.error_message("Amount", &json!(50)).render(), "Total out of range: 50");

        let list = create("in_list(a,b)").unwrap();
        assert_eq!(
            list.error_message("X", &json!("c")).render(),
            "X must be one of the following values: a, b"
        );
    }

    #[test]
    fn test_register_custom_rule() {
        let mut factory = RuleFactory::new();
        factory.register("divisible_by", OptionsIndex::named(&["divisor"]), |options| {
            let divisor = options
                .get("divisor")
                .and_then(value_text)
                .and_then(|t| t.parse::<i64>().ok())
                .filter(|d| *d != 0)
                .ok_or_else(|| MpesaError::configuration("divisor must be a non-zero integer"))?;
            Ok(Arc::new(Callback::new("{label} must be divisible by {divisor}", move |v| {
                v.as_i64().is_some_and(|n| n % divisor == 0)
            })) as Arc<dyn Rule>)
        });
        assert!(factory.contains("DivisibleBy"));

        let rule = factory.create(&RuleSpec::parse("divisible_by(5)").unwrap()).unwrap();
        assert!(passes(&rule, json!(10)));
        assert!(!passes(&rule, json!(11)));
        assert!(factory.create(&RuleSpec::parse("divisible_by(0)").unwrap()).is_err());
    }

    #[test]
    fn test_builtin_aliases_resolve() {
        let factory = RuleFactory::new();
        for (alias, target) in [
            ("numeric", "number"),
            ("int", "integer"),
            ("in", "in_list"),
            ("not_in", "not_in_list"),
            ("pattern", "regex"),
        ] {
            assert!(factory.contains(alias), "{alias}");
            assert!(factory.contains(target), "{target}");
        }
        assert_eq!(create("numeric").unwrap().name(), "number");
        assert_eq!(create("int").unwrap().name(), "integer");
        assert_eq!(create("pattern(/^a$/)").unwrap().name(), "regex");
    }

    #[test]
    fn test_alias_unknown_target() {
        let mut factory = RuleFactory::new();
        assert!(factory.alias("x", "missing").is_err());
    }

    #[test]
    fn test_required_flag() {
        assert!(create("required").unwrap().is_required());
        assert!(create("Required").unwrap().is_required());
        assert!(!create("number").unwrap().is_required());
    }
}
