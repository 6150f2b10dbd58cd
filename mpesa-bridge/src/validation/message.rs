//! Rendered rule failures.

use std::{collections::BTreeMap, fmt};

/// A message template plus the variables substituted into it.
///
/// Placeholders are written `{name}`. Placeholders without a matching variable are left in
/// the output untouched.
///
/// # Examples
///
/// ```
/// use mpesa_bridge::validation::ErrorMessage;
///
/// let message = ErrorMessage::new("{label} must be between {min} and {max}")
///     .with_variable("label", "Amount")
///     .with_variable("min", "1")
///     .with_variable("max", "150000");
/// assert_eq!(message.render(), "Amount must be between 1 and 150000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    template: String,
    variables: BTreeMap<String, String>,
}

impl ErrorMessage {
    /// Creates a message with no variables.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), variables: BTreeMap::new() }
    }

    /// Adds or replaces a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Returns the unrendered template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the substitution variables.
    #[must_use]
    pub const fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Substitutes every `{name}` placeholder.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.variables.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let message = ErrorMessage::new("{label}: {label} is {value}")
            .with_variable("label", "Amount")
            .with_variable("value", "abc");
        assert_eq!(message.render(), "Amount: Amount is abc");
        assert_eq!(message.to_string(), message.render());
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let message = ErrorMessage::new("{label} needs {missing}").with_variable("label", "X");
        assert_eq!(message.render(), "X needs {missing}");
    }

    #[test]
    fn test_unclosed_brace_kept() {
        let message = ErrorMessage::new("broken {label").with_variable("label", "X");
        assert_eq!(message.render(), "broken {label");
    }

    #[test]
    fn test_render_does_not_mutate() {
        let message = ErrorMessage::new("{a}").with_variable("a", "1");
        let _ = message.render();
        assert_eq!(message.template(), "{a}");
        assert_eq!(message.variables().len(), 1);
    }
}
