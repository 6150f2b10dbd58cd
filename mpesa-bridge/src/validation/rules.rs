//! Built-in validation rules.
//!
//! Each rule is constructed from resolved named options (see
//! [`RuleFactory`](super::RuleFactory)) and checks one value. Options that a rule cannot
//! work without are checked at construction, so a misconfigured rule fails when the
//! validator is built rather than when a request arrives.

use std::{borrow::Cow, fmt, sync::Arc};

use regex::Regex;
use serde_json::{Map, Value};

use super::selector::Selector;
use crate::error::{MpesaError, Result};

/// Named rule options after positional values have been resolved.
pub type Options = Map<String, Value>;

/// The dataset a rule runs against, for rules that compare against other fields.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    data: &'a Value,
}

impl<'a> RuleContext<'a> {
    /// Wraps the full dataset being validated.
    #[must_use]
    pub const fn new(data: &'a Value) -> Self {
        Self { data }
    }

    /// Looks up another field by selector. Wildcards resolve to the first match.
    #[must_use]
    pub fn lookup(&self, selector: &str) -> Option<&'a Value> {
        Selector::parse(selector).resolve(self.data).into_iter().find_map(|(_, value)| value)
    }
}

/// A single executable check.
pub trait Rule: fmt::Debug + Send + Sync {
    /// Returns true if `value` passes.
    fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> bool;

    /// Returns the default message template. `{label}` and option names are available.
    fn message(&self) -> &str;
}

/// Returns the textual form of a scalar, or `None` for null, arrays and objects.
#[must_use]
pub fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        other => value_text(other)?.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
    }
}

fn required_option<'a>(options: &'a Options, key: &str, rule: &str) -> Result<&'a Value> {
    options
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| MpesaError::configuration(format!("rule '{rule}' requires option '{key}'")))
}

fn number_option(options: &Options, key: &str, rule: &str) -> Result<f64> {
    let value = required_option(options, key, rule)?;
    value_number(value).ok_or_else(|| {
        MpesaError::configuration(format!("option '{key}' of rule '{rule}' must be a number"))
    })
}

fn length_option(options: &Options, key: &str, rule: &str) -> Result<usize> {
    let value = required_option(options, key, rule)?;
    value_text(value)
        .and_then(|text| text.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            MpesaError::configuration(format!(
                "option '{key}' of rule '{rule}' must be a non-negative integer"
            ))
        })
}

fn bool_option(options: &Options, key: &str) -> bool {
    match options.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn list_option(options: &Options, key: &str, rule: &str) -> Result<Vec<String>> {
    match required_option(options, key, rule)? {
        Value::Array(items) => {
            Ok(items.iter().filter_map(value_text).map(Cow::into_owned).collect())
        }
        Value::String(s) => Ok(s.split(',').map(|v| v.trim().to_owned()).collect()),
        other => Ok(value_text(other).map(Cow::into_owned).into_iter().collect()),
    }
}

/// Value must be present and non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Rule for Required {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        }
    }

    fn message(&self) -> &str {
        "{label} is required"
    }
}

/// Value must parse as a finite float, or be the literal `"0"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Number;

impl Rule for Number {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        // "0" is accepted explicitly, independent of how the float parse treats it.
        value_number(value).is_some() || value_text(value).is_some_and(|t| t == "0")
    }

    fn message(&self) -> &str {
        "{label} must be a number"
    }
}

/// Value must be a whole number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integer;

impl Rule for Integer {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            other => value_text(other).is_some_and(|t| t.trim().parse::<i64>().is_ok()),
        }
    }

    fn message(&self) -> &str {
        "{label} must be an integer"
    }
}

/// Numeric value within `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct Between {
    min: f64,
    max: f64,
}

impl Between {
    /// Builds from `min` and `max` options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either bound is missing or not numeric.
    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            min: number_option(options, "min", "between")?,
            max: number_option(options, "max", "between")?,
        })
    }
}

impl Rule for Between {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        value_number(value).is_some_and(|n| n >= self.min && n <= self.max)
    }

    fn message(&self) -> &str {
        "{label} must be between {min} and {max}"
    }
}

/// Numeric value above `min`; `inclusive` allows equality.
#[derive(Debug, Clone, Copy)]
pub struct GreaterThan {
    min: f64,
    inclusive: bool,
}

impl GreaterThan {
    /// Builds from `min` and optional `inclusive` options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `min` is missing or not numeric.
    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            min: number_option(options, "min", "greater_than")?,
            inclusive: bool_option(options, "inclusive"),
        })
    }
}

impl Rule for GreaterThan {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        value_number(value)
            .is_some_and(|n| if self.inclusive { n >= self.min } else { n > self.min })
    }

    fn message(&self) -> &str {
        "{label} must be greater than {min}"
    }
}

/// Numeric value below `max`; `inclusive` allows equality.
#[derive(Debug, Clone, Copy)]
pub struct LessThan {
    max: f64,
    inclusive: bool,
}

impl LessThan {
    /// Builds from `max` and optional `inclusive` options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `max` is missing or not numeric.
    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            max: number_option(options, "max", "less_than")?,
            inclusive: bool_option(options, "inclusive"),
        })
    }
}

impl Rule for LessThan {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        value_number(value)
            .is_some_and(|n| if self.inclusive { n <= self.max } else { n < self.max })
    }

    fn message(&self) -> &str {
        "{label} must be less than {max}"
    }
}

/// Which comparison a [`Length`] rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthBound {
    /// Exactly `size` characters.
    Exact,
    /// At least `min` characters.
    Min,
    /// At most `max` characters.
    Max,
}

/// Character-count constraint on the textual value.
#[derive(Debug, Clone, Copy)]
pub struct Length {
    bound: LengthBound,
    limit: usize,
}

impl Length {
    /// Builds an exact, minimum or maximum length rule.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the limit option is missing or not an integer.
    pub fn from_options(bound: LengthBound, options: &Options) -> Result<Self> {
        let limit = match bound {
            LengthBound::Exact => length_option(options, "size", "length")?,
            LengthBound::Min => length_option(options, "min", "min_length")?,
            LengthBound::Max => length_option(options, "max", "max_length")?,
        };
        Ok(Self { bound, limit })
    }
}

impl Rule for Length {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let Some(text) = value_text(value) else {
            return false;
        };
        let count = text.chars().count();
        match self.bound {
            LengthBound::Exact => count == self.limit,
            LengthBound::Min => count >= self.limit,
            LengthBound::Max => count <= self.limit,
        }
    }

    fn message(&self) -> &str {
        match self.bound {
            LengthBound::Exact => "{label} must have {size} characters",
            LengthBound::Min => "{label} must have at least {min} characters",
            LengthBound::Max => "{label} must have at most {max} characters",
        }
    }
}

/// Textual value must match a regular expression.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    message: &'static str,
}

impl Pattern {
    /// Builds from the `pattern` option.
    ///
    /// Patterns may be wrapped in slashes with trailing flags (`/^abc$/i`); the `i`, `m`, `s`
    /// and `x` flags are honoured.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the option is missing or does not compile.
    pub fn from_options(options: &Options) -> Result<Self> {
        let raw = required_option(options, "pattern", "regex")?;
        let raw = value_text(raw).ok_or_else(|| {
            MpesaError::configuration("option 'pattern' of rule 'regex' must be a string")
        })?;
        Self::compile(&raw, "{label} does not match the required format")
    }

    fn compile(raw: &str, message: &'static str) -> Result<Self> {
        let regex = Regex::new(&delimited_pattern(raw))
            .map_err(|e| MpesaError::configuration(format!("invalid regex '{raw}': {e}")))?;
        Ok(Self { regex, message })
    }

    /// Email address with a dotted domain.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the pattern is fixed.
    pub fn email() -> Result<Self> {
        Self::compile(r"^[^@\s]+@[^@\s]+\.[^@\s]+$", "{label} must be a valid email address")
    }
}

impl Rule for Pattern {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        value_text(value).is_some_and(|text| self.regex.is_match(&text))
    }

    fn message(&self) -> &str {
        self.message
    }
}

/// Converts `/body/flags` to `(?flags)body`; other input is used as-is.
fn delimited_pattern(raw: &str) -> Cow<'_, str> {
    if let Some(rest) = raw.strip_prefix('/')
        && let Some(end) = rest.rfind('/')
    {
        let body = &rest[..end];
        let flags: String = rest[end + 1..].chars().filter(|c| "imsx".contains(*c)).collect();
        return if flags.is_empty() {
            Cow::Borrowed(body)
        } else {
            Cow::Owned(format!("(?{flags}){body}"))
        };
    }
    Cow::Borrowed(raw)
}

/// Absolute `http` or `https` URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebUrl;

impl Rule for WebUrl {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        value_text(value)
            .and_then(|text| url::Url::parse(&text).ok())
            .is_some_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
    }

    fn message(&self) -> &str {
        "{label} must be a valid URL"
    }
}

/// Textual value must (or must not) be one of `values`.
#[derive(Debug, Clone)]
pub struct InList {
    values: Vec<String>,
    negate: bool,
    case_sensitive: bool,
}

impl InList {
    /// Builds from the `values` option; `case_sensitive` defaults to true.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `values` is missing.
    pub fn from_options(options: &Options, negate: bool) -> Result<Self> {
        let name = if negate { "not_in_list" } else { "in_list" };
        let case_sensitive =
            options.get("case_sensitive").is_none_or(|_| bool_option(options, "case_sensitive"));
        Ok(Self { values: list_option(options, "values", name)?, negate, case_sensitive })
    }
}

impl Rule for InList {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let Some(text) = value_text(value) else {
            return self.negate;
        };
        let found = self.values.iter().any(|candidate| {
            if self.case_sensitive {
                candidate == text.as_ref()
            } else {
                candidate.eq_ignore_ascii_case(&text)
            }
        });
        found != self.negate
    }

    fn message(&self) -> &str {
        if self.negate {
            "{label} must not be one of the following values: {values}"
        } else {
            "{label} must be one of the following values: {values}"
        }
    }
}

/// Character-class constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Letters only.
    Alpha,
    /// Letters and digits.
    AlphaNumeric,
    /// Letters, digits, `-` and `_`.
    AlphaNumHyphen,
}

impl Rule for CharClass {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let Some(text) = value_text(value) else {
            return false;
        };
        match self {
            Self::Alpha => text.chars().all(char::is_alphabetic),
            Self::AlphaNumeric => text.chars().all(char::is_alphanumeric),
            Self::AlphaNumHyphen => {
                text.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            }
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Alpha => "{label} can contain only letters",
            Self::AlphaNumeric => "{label} can contain only letters and digits",
            Self::AlphaNumHyphen => {
                "{label} can contain only letters, digits, hyphens and underscores"
            }
        }
    }
}

/// Textual value equals the `expected` option.
#[derive(Debug, Clone)]
pub struct Equal {
    expected: String,
}

impl Equal {
    /// Builds from the `expected` option.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `expected` is missing.
    pub fn from_options(options: &Options) -> Result<Self> {
        let expected = required_option(options, "expected", "equal")?;
        let expected = value_text(expected).map(Cow::into_owned).ok_or_else(|| {
            MpesaError::configuration("option 'expected' of rule 'equal' must be a scalar")
        })?;
        Ok(Self { expected })
    }
}

impl Rule for Equal {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        value_text(value).is_some_and(|text| text == self.expected)
    }

    fn message(&self) -> &str {
        "{label} must be equal to {expected}"
    }
}

/// Value equals the field named by the `item` option.
#[derive(Debug, Clone)]
pub struct Match {
    item: String,
}

impl Match {
    /// Builds from the `item` option.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `item` is missing.
    pub fn from_options(options: &Options) -> Result<Self> {
        let item = required_option(options, "item", "match")?;
        let item = value_text(item).map(Cow::into_owned).ok_or_else(|| {
            MpesaError::configuration("option 'item' of rule 'match' must be a string")
        })?;
        Ok(Self { item })
    }
}

impl Rule for Match {
    fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> bool {
        ctx.lookup(&self.item).is_some_and(|other| {
            other == value || value_text(other).zip(value_text(value)).is_some_and(|(a, b)| a == b)
        })
    }

    fn message(&self) -> &str {
        "{label} must match {item}"
    }
}

/// A rule backed by a closure, for one-off custom checks.
pub struct Callback {
    check: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    message: String,
}

impl Callback {
    /// Wraps `check` with a message template.
    pub fn new<F>(message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self { check: Arc::new(check), message: message.into() }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("message", &self.message).finish_non_exhaustive()
    }
}

impl Rule for Callback {
    fn check(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        (self.check)(value)
    }

    fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn opts(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    fn check(rule: &dyn Rule, value: Value) -> bool {
        let data = Value::Null;
        rule.check(&value, &RuleContext::new(&data))
    }

    #[test]
    fn test_required() {
        assert!(check(&Required, json!("x")));
        assert!(check(&Required, json!(0)));
        assert!(check(&Required, json!(false)));
        assert!(!check(&Required, Value::Null));
        assert!(!check(&Required, json!("   ")));
        assert!(!check(&Required, json!([])));
    }

    #[test]
    fn test_number_accepts_zero_and_floats() {
        assert!(check(&Number, json!("0")));
        assert!(check(&Number, json!(0)));
        assert!(check(&Number, json!("12.5")));
        assert!(check(&Number, json!(" 42 ")));
        assert!(check(&Number, json!(-3)));
        assert!(!check(&Number, json!("abc")));
        assert!(!check(&Number, json!("NaN")));
        assert!(!check(&Number, json!("inf")));
        assert!(!check(&Number, json!(true)));
    }

    #[test]
    fn test_integer() {
        assert!(check(&Integer, json!(10)));
        assert!(check(&Integer, json!("10")));
        assert!(!check(&Integer, json!(10.5)));
        assert!(!check(&Integer, json!("10.5")));
    }

    #[test]
    fn test_between() {
        let rule = Between::from_options(&opts(json!({"min": "1", "max": 100}))).unwrap();
        assert!(check(&rule, json!(1)));
        assert!(check(&rule, json!("100")));
        assert!(!check(&rule, json!(0)));
        assert!(!check(&rule, json!(101)));
        assert!(Between::from_options(&opts(json!({"min": 1}))).is_err());
        assert!(Between::from_options(&opts(json!({"min": "a", "max": 2}))).is_err());
    }

    #[test]
    fn test_greater_and_less_than() {
        let gt = GreaterThan::from_options(&opts(json!({"min": 10}))).unwrap();
        assert!(!check(&gt, json!(10)));
        assert!(check(&gt, json!(11)));
        let gte = GreaterThan::from_options(&opts(json!({"min": 10, "inclusive": true}))).unwrap();
        assert!(check(&gte, json!(10)));

        let lt = LessThan::from_options(&opts(json!({"max": 10}))).unwrap();
        assert!(check(&lt, json!(9)));
        assert!(!check(&lt, json!(10)));
    }

    #[test]
    fn test_lengths() {
        let exact = Length::from_options(LengthBound::Exact, &opts(json!({"size": "3"}))).unwrap();
        assert!(check(&exact, json!("abc")));
        assert!(check(&exact, json!(123)));
        assert!(!check(&exact, json!("ab")));

        let min = Length::from_options(LengthBound::Min, &opts(json!({"min": 2}))).unwrap();
        assert!(check(&min, json!("ab")));
        assert!(!check(&min, json!("a")));

        let max = Length::from_options(LengthBound::Max, &opts(json!({"max": 2}))).unwrap();
        assert!(check(&max, json!("éé")));
        assert!(!check(&max, json!("abc")));
        assert!(Length::from_options(LengthBound::Max, &opts(json!({"max": -1}))).is_err());
    }

    #[test]
    fn test_pattern_with_delimiters_and_flags() {
        let rule = Pattern::from_options(&opts(json!({"pattern": "/^2547\\d{8}$/"}))).unwrap();
        assert!(check(&rule, json!("254712345678")));
        assert!(check(&rule, json!(254_712_345_678_u64)));
        assert!(!check(&rule, json!("0712345678")));

        let insensitive = Pattern::from_options(&opts(json!({"pattern": "/^abc$/i"}))).unwrap();
        assert!(check(&insensitive, json!("ABC")));

        assert!(Pattern::from_options(&opts(json!({"pattern": "("}))).is_err());
    }

    #[test]
    fn test_email_and_url() {
        let email = Pattern::email().unwrap();
        assert!(check(&email, json!("dev@example.com")));
        assert!(!check(&email, json!("dev@example")));

        assert!(check(&WebUrl, json!("https://example.com/callback")));
        assert!(!check(&WebUrl, json!("ftp://example.com")));
        assert!(!check(&WebUrl, json!("not a url")));
    }

    #[test]
    fn test_in_list() {
        let rule = InList::from_options(
            &opts(json!({"values": ["BusinessPayment", "SalaryPayment"]})),
            false,
        )
        .unwrap();
        assert!(check(&rule, json!("SalaryPayment")));
        assert!(!check(&rule, json!("salarypayment")));

        let relaxed = InList::from_options(
            &opts(json!({"values": "a,b", "case_sensitive": false})),
            false,
        )
        .unwrap();
        assert!(check(&relaxed, json!("A")));

        let not_in = InList::from_options(&opts(json!({"values": ["x"]})), true).unwrap();
        assert!(check(&not_in, json!("y")));
        assert!(!check(&not_in, json!("x")));
    }

    #[test]
    fn test_char_classes() {
        assert!(check(&CharClass::Alpha, json!("abc")));
        assert!(!check(&CharClass::Alpha, json!("abc1")));
        assert!(check(&CharClass::AlphaNumeric, json!("abc1")));
        assert!(!check(&CharClass::AlphaNumeric, json!("abc-1")));
        assert!(check(&CharClass::AlphaNumHyphen, json!("abc-1_2")));
        assert!(!check(&CharClass::AlphaNumHyphen, json!("abc 1")));
    }

    #[test]
    fn test_equal_and_match() {
        let equal = Equal::from_options(&opts(json!({"expected": "4"}))).unwrap();
        assert!(check(&equal, json!(4)));
        assert!(!check(&equal, json!(5)));

        let rule = Match::from_options(&opts(json!({"item": "PhoneNumber"}))).unwrap();
        let data = json!({"PhoneNumber": "254700000000"});
        let ctx = RuleContext::new(&data);
        assert!(rule.check(&json!("254700000000"), &ctx));
        assert!(rule.check(&json!(254_700_000_000_u64), &ctx));
        assert!(!rule.check(&json!("254711111111"), &ctx));
    }

    #[test]
    fn test_callback() {
        let rule =
            Callback::new("{label} must be even", |v| v.as_i64().is_some_and(|n| n % 2 == 0));
        assert!(check(&rule, json!(4)));
        assert!(!check(&rule, json!(3)));
        assert_eq!(rule.message(), "{label} must be even");
        assert!(format!("{rule:?}").contains("must be even"));
    }
}
