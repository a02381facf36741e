//! shimmysmarty: minimal Smarty-like template engine.
//!
//! Source text goes through three stages: a tokenizer that switches between
//! literal text and tag scanning, a recursive-descent parser that builds an
//! AST (collecting every error it can find in one pass), and a tree-walking
//! evaluator that renders the AST against an [`Environment`].
//!
//! Supported subset:
//! - Literal text, copied byte-for-byte.
//! - `{$var}`, `{$var.prop}`, `{$var[0]}`, chained in any order.
//! - Pipelines: `{$var|upper|nl2br}`.
//! - `{if $a > 50 and $b}...{elseif $c}...{else}...{/if}` with `or`, `and`,
//!   `== != < <= > >=`.
//! - `{foreach from=$src item=x key=k name=n}...{foreachelse}...{/foreach}`
//!   with `$smarty.foreach.n.first` / `.last`.
//! - `{* comments *}` and `{literal}...{/literal}`.
//!
//! Not supported:
//! - Assignment, user-defined functions, loops other than foreach.
//! - Modifier arguments (`|truncate:40`).
//! - Arithmetic.
//!
//! Rendering never fails. A missing variable, a field access on a non-map,
//! an out-of-range index, a comparison of non-numbers or an unknown modifier
//! all evaluate to Null, and Null renders as nothing.
//!
//! ```
//! use shimmysmarty::{Binding, Environment, Template};
//!
//! let template = Template::parse("Hello, {$name|upper}!").unwrap();
//! let mut env = Environment::new([Binding::new("name", "Smarty")]).unwrap();
//! assert_eq!(template.render(&mut env), "Hello, SMARTY!");
//! ```

pub mod ast;
pub mod environment;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod modifier;
pub mod parser;
pub mod ser;
pub mod token;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

pub use environment::{Binding, Environment};
pub use error::{ConversionError, EnvironmentError, ParseError, SerializeError, TemplateError};
pub use eval::render;
pub use modifier::{Modifier, ModifierRegistry};
pub use parser::parse;
pub use ser::to_value;
pub use value::{IntoValue, Value};

/// A successfully parsed template. Immutable; safe to render from many
/// threads at once as long as each render has its own [`Environment`].
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    program: ast::Program,
}

impl Template {
    /// Parses `source`, failing with every diagnostic if there are any.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let (program, errors) = parser::parse(source);
        if !errors.is_empty() {
            return Err(TemplateError::Parse(errors));
        }
        Ok(Self { program })
    }

    pub fn render(&self, env: &mut Environment) -> String {
        eval::render(&self.program, env)
    }

    pub fn program(&self) -> &ast::Program {
        &self.program
    }
}

/// Named templates plus the modifier registry their environments share.
#[derive(Debug)]
pub struct Engine {
    templates: HashMap<String, Template>,
    modifiers: Arc<ModifierRegistry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with its own registry of built-in modifiers.
    pub fn new() -> Self {
        Self::with_modifiers(Arc::new(ModifierRegistry::with_builtins()))
    }

    /// An engine using an application-owned registry.
    pub fn with_modifiers(modifiers: Arc<ModifierRegistry>) -> Self {
        Self {
            templates: HashMap::new(),
            modifiers,
        }
    }

    pub fn modifiers(&self) -> &Arc<ModifierRegistry> {
        &self.modifiers
    }

    /// Registers a modifier on the engine's registry. Returns true if an
    /// existing modifier was replaced.
    pub fn register_modifier<F>(&self, name: impl Into<String>, modifier: F) -> bool
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.modifiers.register(name, modifier)
    }

    pub fn parse(&self, source: &str) -> Result<Template, TemplateError> {
        Template::parse(source)
    }

    /// Parses `source` and stores it under `name`, replacing any template
    /// already there.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: &str,
    ) -> Result<(), TemplateError> {
        let template = Template::parse(source)?;
        self.templates.insert(name.into(), template);
        Ok(())
    }

    pub fn get_template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Builds an environment wired to this engine's registry.
    pub fn environment<I>(&self, bindings: I) -> Result<Environment, EnvironmentError>
    where
        I: IntoIterator<Item = Binding>,
    {
        Environment::with_registry(bindings, Arc::clone(&self.modifiers))
    }

    pub fn render_template(
        &self,
        name: &str,
        env: &mut Environment,
    ) -> Result<String, TemplateError> {
        self.get_template(name)
            .map(|template| template.render(env))
            .ok_or_else(|| TemplateError::NotFound(name.to_owned()))
    }
}
