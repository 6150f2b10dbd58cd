//! Parameter normalization.
//!
//! Callers may spell request fields however they like (`phone`, `phoneNumber`,
//! `phone_number`, `PhoneNumber`); the provider accepts only its own PascalCase names. This
//! module translates field names through a built-in table, falls back to a PascalCase
//! conversion for unknown keys, and clamps a handful of free-text fields to the provider's
//! length limits.
//!
//! Normalization is idempotent: feeding the output back in returns it unchanged.

use std::{borrow::Cow, collections::HashMap};

use serde_json::{Map, Value};

/// Maximum length of `Remarks`, `TransactionDesc` and `Occasion`.
pub const MAX_TEXT_LENGTH: usize = 100;

/// Maximum length of `AccountReference`.
pub const MAX_ACCOUNT_REFERENCE_LENGTH: usize = 20;

const WORD_BREAKS: [char; 3] = ['_', '-', ' '];

/// Built-in spellings, keyed by the squashed form (lower case, no `_`, `-` or space).
///
/// Every canonical name is also listed as its own alias so a second pass leaves it alone.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("amount", "Amount"),
    ("phone", "PhoneNumber"),
    ("phonenumber", "PhoneNumber"),
    ("msisdn", "Msisdn"),
    ("resulturl", "ResultURL"),
    ("timeouturl", "QueueTimeOutURL"),
    ("queuetimeouturl", "QueueTimeOutURL"),
    ("callback", "CallBackURL"),
    ("callbackurl", "CallBackURL"),
    ("reference", "AccountReference"),
    ("accountreference", "AccountReference"),
    ("description", "TransactionDesc"),
    ("transactiondesc", "TransactionDesc"),
    ("transactiondescription", "TransactionDesc"),
    ("remarks", "Remarks"),
    ("occasion", "Occasion"),
    ("shortcode", "ShortCode"),
    ("businessshortcode", "BusinessShortCode"),
    ("partya", "PartyA"),
    ("partyb", "PartyB"),
    ("receiverparty", "ReceiverParty"),
    ("commandid", "CommandID"),
    ("command", "CommandID"),
    ("transactionid", "TransactionID"),
    ("checkoutrequestid", "CheckoutRequestID"),
    ("identifiertype", "IdentifierType"),
    ("initiator", "Initiator"),
    ("initiatorname", "InitiatorName"),
    ("securitycredential", "SecurityCredential"),
    ("confirmationurl", "ConfirmationURL"),
    ("validationurl", "ValidationURL"),
    ("responsetype", "ResponseType"),
    ("billrefnumber", "BillRefNumber"),
    ("transactiontype", "TransactionType"),
    ("password", "Password"),
    ("timestamp", "Timestamp"),
    ("senderidentifiertype", "SenderIdentifierType"),
    ("recieveridentifiertype", "RecieverIdentifierType"),
    ("receiveridentifiertype", "RecieverIdentifierType"),
];

/// Translates a caller-supplied field name into the provider's spelling.
pub trait FieldMapper {
    /// Returns the canonical name for `name`, borrowing when no change is needed.
    fn map_field<'a>(&self, name: &'a str) -> Cow<'a, str>;

    /// Returns true if this mapper carries call-site specific overrides.
    fn has_custom_mappings(&self) -> bool;
}

/// Field-name mapper and free-text sanitizer.
///
/// # Examples
///
/// ```
/// use mpesa_bridge::normalize::ParameterNormalizer;
/// use serde_json::json;
///
/// let normalizer = ParameterNormalizer::new();
/// let params = json!({"amount": 100, "phone": "254712345678", "bill_ref": "INV-1"});
/// let normalized = normalizer.normalize(params.as_object().unwrap());
///
/// assert_eq!(normalized["Amount"], 100);
/// assert_eq!(normalized["PhoneNumber"], "254712345678");
/// assert_eq!(normalized["BillRef"], "INV-1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParameterNormalizer {
    extra: HashMap<String, String>,
}

impl ParameterNormalizer {
    /// Creates a normalizer using only the built-in table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds call-site mappings that override the built-in table.
    ///
    /// Keys match either exactly or by squashed form, so `{"ref": "BillRefNumber"}` also
    /// catches `Ref` and `r-e-f`.
    #[must_use]
    pub fn with_mappings<I, K, V>(mut self, mappings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra.extend(mappings.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Maps every key and sanitizes the free-text fields.
    ///
    /// When two input keys map to the same canonical name, the one iterated last wins.
    #[must_use]
    pub fn normalize(&self, params: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in params {
            out.insert(self.map_field(key).into_owned(), value.clone());
        }
        sanitize(&mut out);
        out
    }

    fn lookup_extra(&self, name: &str, squashed: &str) -> Option<&str> {
        self.extra.get(name).map(String::as_str).or_else(|| {
            self.extra.iter().find(|(k, _)| squash(k) == squashed).map(|(_, v)| v.as_str())
        })
    }
}

impl FieldMapper for ParameterNormalizer {
    fn map_field<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let squashed = squash(name);
        if let Some(mapped) = self.lookup_extra(name, &squashed) {
            return Cow::Owned(mapped.to_owned());
        }
        if let Some((_, canonical)) = FIELD_ALIASES.iter().find(|(alias, _)| *alias == squashed) {
            return if *canonical == name { Cow::Borrowed(name) } else { Cow::Borrowed(canonical) };
        }
        pascal_case(name)
    }

    fn has_custom_mappings(&self) -> bool {
        !self.extra.is_empty()
    }
}

/// Normalizes `params` with the built-in table plus `extra` overrides.
#[must_use]
pub fn normalize(
    params: &Map<String, Value>,
    extra: &HashMap<String, String>,
) -> Map<String, Value> {
    ParameterNormalizer::new().with_mappings(extra.clone()).normalize(params)
}

/// Fallback casing: `_`, `-` and space are word breaks, each word gets an upper-case first
/// letter, and the breaks are removed.
///
/// Letters after the first in each word are left alone, so already-PascalCase names pass
/// through unchanged.
#[must_use]
pub fn pascal_case(name: &str) -> Cow<'_, str> {
    let needs_change = name.contains(WORD_BREAKS)
        || name.chars().next().is_some_and(char::is_lowercase);
    if !needs_change {
        return Cow::Borrowed(name);
    }

    let mut out = String::with_capacity(name.len());
    for word in name.split(WORD_BREAKS) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    Cow::Owned(out)
}

/// Lower-cases `name` and drops the same word breaks [`pascal_case`] splits on, so a
/// fallback name squashes back to the key it came from.
fn squash(name: &str) -> String {
    name.chars().filter(|c| !WORD_BREAKS.contains(c)).flat_map(char::to_lowercase).collect()
}

fn sanitize(params: &mut Map<String, Value>) {
    if let Some(remarks) = params.get_mut("Remarks") {
        let text = match &*remarks {
            Value::String(s) => clamp_text(s, MAX_TEXT_LENGTH),
            Value::Null => String::new(),
            other => clamp_text(&other.to_string(), MAX_TEXT_LENGTH),
        };
        *remarks = Value::String(if text.is_empty() { "None".to_owned() } else { text });
    }

    if let Some(Value::String(desc)) = params.get_mut("TransactionDesc") {
        *desc = clamp_text(desc, MAX_TEXT_LENGTH);
    }

    if let Some(Value::String(occasion)) = params.get("Occasion") {
        let text = clamp_text(occasion, MAX_TEXT_LENGTH);
        let value = if text.is_empty() { Value::Null } else { Value::String(text) };
        params.insert("Occasion".to_owned(), value);
    }

    if let Some(Value::String(reference)) = params.get_mut("AccountReference") {
        *reference = truncate_chars(reference, MAX_ACCOUNT_REFERENCE_LENGTH).to_owned();
    }
}

/// Trims, cuts to `max` characters, and trims the cut end again.
///
/// The second trim keeps the function idempotent, so a cut that lands on whitespace yields
/// fewer than `max` characters.
fn clamp_text(text: &str, max: usize) -> String {
    truncate_chars(text.trim(), max).trim_end().to_owned()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(idx, _)| &text[..idx])
}
