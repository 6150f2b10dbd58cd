//! Field selectors.
//!
//! A selector names a value inside the dataset: a plain key (`Amount`), a dotted path
//! (`customer.phone`), a bracket path (`items[0][price]`), or a wildcard (`items[*][price]`)
//! that expands over every child of an array or object.

use std::borrow::Cow;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Wildcard,
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    segments: Vec<Segment>,
}

impl Selector {
    /// Parses a selector. Parsing never fails; malformed brackets are treated as key text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '.' => push_segment(&mut segments, &mut current),
                '[' => {
                    push_segment(&mut segments, &mut current);
                    let mut inner = String::new();
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if next == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(next);
                    }
                    if !closed {
                        current.push('[');
                    }
                    current.push_str(&inner);
                    if closed {
                        push_segment(&mut segments, &mut current);
                    }
                }
                _ => current.push(c),
            }
        }
        push_segment(&mut segments, &mut current);
        Self { raw: raw.to_owned(), segments }
    }

    /// Returns the selector as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the selector contains `*`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&Segment::Wildcard)
    }

    /// Resolves the selector against `data`.
    ///
    /// Returns one `(path, value)` pair per match. Without wildcards there is exactly one
    /// pair, keyed by the selector as written, with `None` when the value is absent. Wildcard
    /// matches are keyed by their concrete bracket path; a wildcard over an empty or missing
    /// container yields a single absent pair, so a required rule still reports the field.
    ///
    /// A top-level key that literally equals the selector wins over path traversal.
    #[must_use]
    pub fn resolve<'a>(&self, data: &'a Value) -> Vec<(Cow<'_, str>, Option<&'a Value>)> {
        if let Some(value) = data.get(&self.raw) {
            return vec![(Cow::Borrowed(self.raw.as_str()), Some(value))];
        }

        if !self.has_wildcard() {
            let mut node = Some(data);
            for segment in &self.segments {
                node = match segment {
                    Segment::Key(key) => node.and_then(|n| child(n, key)),
                    Segment::Wildcard => None,
                };
            }
            return vec![(Cow::Borrowed(self.raw.as_str()), node)];
        }

        let mut matches = vec![(String::new(), Some(data))];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (path, node) in matches {
                match segment {
                    Segment::Key(key) => {
                        next.push((join(&path, key), node.and_then(|n| child(n, key))));
                    }
                    Segment::Wildcard => match node {
                        Some(Value::Array(items)) => next.extend(
                            items
                                .iter()
                                .enumerate()
                                .map(|(i, v)| (join(&path, &i.to_string()), Some(v))),
                        ),
                        Some(Value::Object(map)) => {
                            next.extend(map.iter().map(|(k, v)| (join(&path, k), Some(v))));
                        }
                        _ => {}
                    },
                }
            }
            matches = next;
        }

        if matches.is_empty() {
            return vec![(Cow::Borrowed(self.raw.as_str()), None)];
        }
        matches.into_iter().map(|(path, value)| (Cow::Owned(path), value)).collect()
    }
}

fn push_segment(segments: &mut Vec<Segment>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let text = std::mem::take(current);
    segments.push(if text == "*" { Segment::Wildcard } else { Segment::Key(text) });
}

fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() { key.to_owned() } else { format!("{path}[{key}]") }
}
