//! Rule-based request validation.
//!
//! Requests are checked before any network traffic. Rules are written in a small
//! description language and compiled once, when the validator is built:
//!
//! ```text
//! "Amount"      => "required | number | between(1,150000)"
//! "PhoneNumber" => "required | regex(/^254\d{9}$/)({label} must be a 254XXXXXXXXX number)"
//! ```
//!
//! The pieces, from the bottom up:
//!
//! - [`RuleSpec`] parses one rule description (`name(options)(message)(label)`).
//! - [`Rule`] is an executable check; the built-ins live in [`rules`].
//! - [`RuleFactory`] turns a [`RuleSpec`] into a [`BoundRule`] by name, and accepts custom rules.
//! - [`ValueValidator`] orders the rules for one field, keeping `required` first.
//! - [`Validator`] maps selectors to fields, caches its result and collects
//!   [`ErrorMessage`]s.

mod factory;
mod message;
pub mod rules;
mod selector;
mod spec;
mod validator;
mod value_validator;

pub use factory::{BoundRule, OptionsIndex, RuleFactory};
pub use message::ErrorMessage;
pub use rules::{Callback, Options, Rule, RuleContext};
pub use selector::Selector;
pub use spec::{RuleOptions, RuleSpec};
pub use validator::Validator;
pub use value_validator::ValueValidator;
