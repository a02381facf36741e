use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ConversionError, EnvironmentError, SerializeError};
use crate::modifier::ModifierRegistry;
use crate::ser;
use crate::value::{IntoValue, Value};

/// One variable binding handed to [`Environment::new`].
///
/// Serde-backed bindings convert eagerly; a failure is kept here and
/// reported by `Environment::new` together with every other failure.
#[derive(Debug)]
pub struct Binding {
    name: String,
    value: Result<Value, SerializeError>,
}

impl Binding {
    /// Binds a typed host value or a pre-built [`Value`].
    pub fn new(name: impl Into<String>, value: impl IntoValue) -> Self {
        Self {
            name: name.into(),
            value: Ok(value.into_value()),
        }
    }

    /// Binds any serde-serializable host value.
    pub fn serialize<T: Serialize + ?Sized>(name: impl Into<String>, value: &T) -> Self {
        Self {
            name: name.into(),
            value: ser::to_value(value),
        }
    }
}

/// Variable bindings plus the modifier registry for one render.
#[derive(Debug, Clone)]
pub struct Environment {
    vars: HashMap<String, Value>,
    modifiers: Arc<ModifierRegistry>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::empty(Arc::new(ModifierRegistry::with_builtins()))
    }
}

impl Environment {
    /// Builds an environment from `bindings`, with the built-in modifiers.
    ///
    /// Every binding is converted. If any fail, the error lists all of them
    /// and no environment is returned.
    pub fn new<I>(bindings: I) -> Result<Self, EnvironmentError>
    where
        I: IntoIterator<Item = Binding>,
    {
        Self::with_registry(bindings, Arc::new(ModifierRegistry::with_builtins()))
    }

    /// Like [`Environment::new`], using `modifiers` as the registry.
    pub fn with_registry<I>(
        bindings: I,
        modifiers: Arc<ModifierRegistry>,
    ) -> Result<Self, EnvironmentError>
    where
        I: IntoIterator<Item = Binding>,
    {
        let mut env = Self::empty(modifiers);
        let mut failures = Vec::new();
        for binding in bindings {
            match binding.value {
                Ok(value) => {
                    env.vars.insert(binding.name, value);
                }
                Err(source) => failures.push(ConversionError {
                    name: binding.name,
                    source,
                }),
            }
        }

        if failures.is_empty() {
            Ok(env)
        } else {
            Err(EnvironmentError::Conversion(failures))
        }
    }

    fn empty(modifiers: Arc<ModifierRegistry>) -> Self {
        Self {
            vars: HashMap::new(),
            modifiers,
        }
    }

    /// Chaining form of [`Environment::set`].
    pub fn with_var(mut self, name: impl Into<String>, value: impl IntoValue) -> Self {
        self.set(name, value);
        self
    }

    /// Uses `modifiers` instead of this environment's current registry.
    pub fn with_modifiers(mut self, modifiers: Arc<ModifierRegistry>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn modifiers(&self) -> &ModifierRegistry {
        &self.modifiers
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Sets `name`, returning the previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl IntoValue) -> Option<Value> {
        self.vars.insert(name.into(), value.into_value())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }
}

/// Temporary bindings on an environment.
///
/// Each name bound through a scope is remembered with its prior state. When
/// the scope is dropped the prior value is put back, or the name removed if
/// it was unbound before.
pub struct Scope<'e> {
    env: &'e mut Environment,
    saved: Vec<(String, Option<Value>)>,
}

impl<'e> Scope<'e> {
    pub fn new(env: &'e mut Environment) -> Self {
        Self {
            env,
            saved: Vec::new(),
        }
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        let previous = self.env.vars.insert(name.to_owned(), value);
        if !self.saved.iter().any(|(saved, _)| saved == name) {
            self.saved.push((name.to_owned(), previous));
        }
    }

    pub fn env(&mut self) -> &mut Environment {
        &mut *self.env
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        while let Some((name, previous)) = self.saved.pop() {
            match previous {
                Some(value) => {
                    self.env.vars.insert(name, value);
                }
                None => {
                    self.env.remove(&name);
                }
            }
        }
    }
}
