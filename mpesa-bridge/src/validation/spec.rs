//! Rule description language.
//!
//! A rule is written `name(options)(message)(label)`; every parenthesized group is optional.
//! Several rules are joined with `|`:
//!
//! ```text
//! required | number | between(1,150000)(Amount must be between {min} and {max})
//! ```
//!
//! Options take one of four shapes:
//!
//! | Written as            | Parsed as                                       |
//! |-----------------------|-------------------------------------------------|
//! | `{"min":1,"max":5}`   | [`RuleOptions::Named`] from JSON                |
//! | `min=1&max=5`         | [`RuleOptions::Named`] from a query string      |
//! | `1,5`                 | [`RuleOptions::List`], resolved by position     |
//! | `5`                   | [`RuleOptions::Single`]                         |
//!
//! The literals `true` and `false` become booleans in the last three forms.

use serde_json::{Map, Value};

use crate::error::{MpesaError, Result};

/// Options as written, before a rule assigns names to positional values.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RuleOptions {
    /// No options group, or an empty one.
    #[default]
    None,
    /// A single bare value.
    Single(Value),
    /// A comma-separated list.
    List(Vec<Value>),
    /// Named options.
    Named(Map<String, Value>),
}

impl RuleOptions {
    /// Returns true when no options were given.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One parsed rule description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleSpec {
    /// Rule name as written.
    pub name: String,
    /// Unresolved options.
    pub options: RuleOptions,
    /// The options group exactly as written, trimmed.
    ///
    /// Rules taking a single option (a pattern, a size) read this instead of the split form,
    /// so a regex containing `,` or `=` survives intact.
    pub raw_options: String,
    /// Message template overriding the rule's default.
    pub message: Option<String>,
    /// Field label overriding the selector's label.
    pub label: Option<String>,
}

impl RuleSpec {
    /// Creates a spec with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Parses a single rule description.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty name, unbalanced parentheses, more than
    /// three groups, or text trailing the last group.
    ///
    /// # Examples
    ///
    /// ```
    /// use mpesa_bridge::validation::{RuleOptions, RuleSpec};
    ///
    /// let spec = RuleSpec::parse("max_length(20)({label} is too long)(Reference)").unwrap();
    /// assert_eq!(spec.name, "max_length");
    /// assert_eq!(spec.options, RuleOptions::Single("20".into()));
    /// assert_eq!(spec.message.as_deref(), Some("{label} is too long"));
    /// assert_eq!(spec.label.as_deref(), Some("Reference"));
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (name, mut rest) = input.find('(').map_or((input, ""), |idx| input.split_at(idx));
        let name = name.trim();
        if name.is_empty() {
            return Err(MpesaError::configuration(format!("rule '{input}' has no name")));
        }

        let mut groups = Vec::with_capacity(3);
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            if !rest.starts_with('(') {
                return Err(MpesaError::configuration(format!(
                    "unexpected text after rule '{name}': {rest}"
                )));
            }
            let close = matching_paren(rest).ok_or_else(|| {
                MpesaError::configuration(format!("unbalanced parentheses in rule '{input}'"))
            })?;
            groups.push(&rest[1..close]);
            rest = &rest[close + 1..];
        }
        if groups.len() > 3 {
            return Err(MpesaError::configuration(format!(
                "rule '{name}' has more than three groups"
            )));
        }

        let mut groups = groups.into_iter();
        let raw_options = groups.next().unwrap_or_default().trim();
        let options = parse_options(raw_options)?;
        let message = groups.next().map(str::to_owned).filter(|m| !m.is_empty());
        let label = groups.next().map(|l| l.trim().to_owned()).filter(|l| !l.is_empty());

        Ok(Self {
            name: name.to_owned(),
            options,
            raw_options: raw_options.to_owned(),
            message,
            label,
        })
    }

    /// Parses a `|`-separated list of rule descriptions.
    ///
    /// Pipes inside parentheses do not split, so `regex(/^(a|b)$/)` stays one rule.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`RuleSpec::parse`].
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        split_top_level(input, '|')
            .into_iter()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Returns the byte index of the parenthesis closing the one at index 0.
fn matching_paren(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_options(raw: &str) -> Result<RuleOptions> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(RuleOptions::None);
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| MpesaError::configuration(format!("invalid JSON rule options: {e}")))?;
        return match value {
            Value::Object(map) => Ok(RuleOptions::Named(map)),
            _ => Err(MpesaError::configuration("JSON rule options must be an object")),
        };
    }

    if trimmed.contains('=') {
        let map = url::form_urlencoded::parse(trimmed.as_bytes())
            .map(|(k, v)| (k.trim().to_owned(), coerce(v.trim())))
            .collect();
        return Ok(RuleOptions::Named(map));
    }

    if trimmed.contains(',') {
        return Ok(RuleOptions::List(trimmed.split(',').map(|v| coerce(v.trim())).collect()));
    }

    Ok(RuleOptions::Single(coerce(trimmed)))
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_owned()),
    }
}
