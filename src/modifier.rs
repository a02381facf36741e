//! Modifier (pipe function) registry.
//!
//! A registry is an ordinary value owned by the embedding application and
//! shared between renders through an `Arc`. Lookups take a read lock and
//! clone the function handle out, so no lock is held while a modifier runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use tracing::debug;

use crate::value::Value;

/// A modifier maps one value to another. It has no access to the environment.
pub type Modifier = Arc<dyn Fn(Value) -> Value + Send + Sync>;

lazy_static! {
    /// Built-in modifiers, allocated once and shared by every registry
    /// created through [`ModifierRegistry::with_builtins`].
    static ref BUILTINS: Vec<(&'static str, Modifier)> = vec![
        ("upper", Arc::new(upper) as Modifier),
        ("lower", Arc::new(lower) as Modifier),
        ("capitalize", Arc::new(capitalize) as Modifier),
        ("nl2br", Arc::new(nl2br) as Modifier),
        ("number_format", Arc::new(number_format) as Modifier),
        ("escape", Arc::new(escape) as Modifier),
    ];
}

#[derive(Default)]
pub struct ModifierRegistry {
    modifiers: RwLock<HashMap<String, Modifier>>,
}

impl ModifierRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in modifiers: `upper`, `lower`,
    /// `capitalize`, `nl2br`, `number_format` and `escape`.
    ///
    /// Each call returns an independent registry; registering into one is
    /// not visible through any other.
    pub fn with_builtins() -> Self {
        let modifiers = BUILTINS
            .iter()
            .map(|(name, modifier)| ((*name).to_owned(), Arc::clone(modifier)))
            .collect();
        Self {
            modifiers: RwLock::new(modifiers),
        }
    }

    /// Registers `modifier` under `name`. Returns true if an existing entry
    /// was replaced.
    pub fn register<F>(&self, name: impl Into<String>, modifier: F) -> bool
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let mut modifiers = self
            .modifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let replaced = modifiers.insert(name.clone(), Arc::new(modifier)).is_some();
        if replaced {
            debug!(modifier = %name, "replaced existing modifier");
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<Modifier> {
        self.modifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ModifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierRegistry")
            .field("modifiers", &self.names())
            .finish()
    }
}

// Built-ins. A value of the wrong type maps to Null.

fn upper(input: Value) -> Value {
    input
        .as_str()
        .map_or(Value::Null, |s| Value::String(s.to_uppercase()))
}

fn lower(input: Value) -> Value {
    input
        .as_str()
        .map_or(Value::Null, |s| Value::String(s.to_lowercase()))
}

/// Upper-cases the first letter of every whitespace-separated word.
fn capitalize(input: Value) -> Value {
    let Some(s) = input.as_str() else {
        return Value::Null;
    };
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    Value::String(out)
}

fn nl2br(input: Value) -> Value {
    input
        .as_str()
        .map_or(Value::Null, |s| Value::String(s.replace('\n', "<br />")))
}

/// Rounds to an integer and groups thousands with `,`.
fn number_format(input: Value) -> Value {
    let Some(n) = input.as_number() else {
        return Value::Null;
    };
    if !n.is_finite() {
        return Value::String(n.to_string());
    }

    let rounded = n.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    Value::String(out)
}

fn escape(input: Value) -> Value {
    let Some(s) = input.as_str() else {
        return Value::Null;
    };
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    Value::String(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(name: &str, input: Value) -> Value {
        let registry = ModifierRegistry::with_builtins();
        let modifier = registry.get(name).expect("builtin registered");
        modifier(input)
    }

    fn s(value: &str) -> Value {
        Value::String(value.to_string())
    }

    #[test]
    fn register_reports_replacement() {
        let registry = ModifierRegistry::new();
        assert!(!registry.register("twice", |v| v));
        assert!(registry.register("twice", |_| Value::Null));
        assert!(registry.contains("twice"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn empty_registry_has_no_builtins() {
        assert!(ModifierRegistry::new().names().is_empty());
        assert_eq!(
            ModifierRegistry::with_builtins().names(),
            vec!["capitalize", "escape", "lower", "nl2br", "number_format", "upper"]
        );
    }

    #[test]
    fn builtin_registries_are_independent() {
        let a = ModifierRegistry::with_builtins();
        let b = ModifierRegistry::with_builtins();
        a.register("extra", |v| v);
        assert!(a.contains("extra"));
        assert!(!b.contains("extra"));

        let (Some(upper_a), Some(upper_b)) = (a.get("upper"), b.get("upper")) else {
            panic!("upper missing");
        };
        assert!(Arc::ptr_eq(&upper_a, &upper_b));
    }

    #[test]
    fn case_modifiers() {
        assert_eq!(apply("upper", s("bbb")), s("BBB"));
        assert_eq!(apply("lower", s("ÀB")), s("àb"));
        assert_eq!(apply("capitalize", s("hello big  world")), s("Hello Big  World"));
        assert_eq!(apply("upper", Value::Number(1.0)), Value::Null);
    }

    #[test]
    fn optional_strings_are_accepted() {
        assert_eq!(apply("upper", Value::optional(Some(s("x")))), s("X"));
    }

    #[test]
    fn nl2br_inserts_breaks() {
        assert_eq!(
            apply("nl2br", s("Hello1\nHello2\nHello3")),
            s("Hello1<br />Hello2<br />Hello3")
        );
    }

    #[test]
    fn number_format_groups_thousands() {
        assert_eq!(apply("number_format", Value::Number(1_500_000.0)), s("1,500,000"));
        assert_eq!(apply("number_format", Value::Number(777_777_777.0)), s("777,777,777"));
        assert_eq!(apply("number_format", Value::Number(999.0)), s("999"));
        assert_eq!(apply("number_format", Value::Number(-1234.5)), s("-1,235"));
        assert_eq!(apply("number_format", Value::Number(0.4)), s("0"));
        assert_eq!(apply("number_format", s("12")), Value::Null);
    }

    #[test]
    fn escape_html() {
        assert_eq!(
            apply("escape", s(r#"<a href="x">Tom & 'Jerry'</a>"#)),
            s("&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;")
        );
    }
}
