use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::ast::*;
use crate::environment::{Environment, Scope};
use crate::value::Value;

/// Render `program` against `env`. Never fails: ill-typed operations
/// degrade to Null, which renders as nothing.
pub fn render(program: &Program, env: &mut Environment) -> String {
    Evaluator::new(env).render(program)
}

/// Tree-walking evaluator. The environment is borrowed mutably only so that
/// foreach can bind loop variables; every binding is restored on exit.
pub struct Evaluator<'e> {
    env: &'e mut Environment,
}

impl<'e> Evaluator<'e> {
    pub fn new(env: &'e mut Environment) -> Self {
        Self { env }
    }

    pub fn render(&mut self, program: &Program) -> String {
        self.eval_list(&program.root)
    }

    /// Concatenates the rendered form of every non-null child.
    fn eval_list(&mut self, list: &ListNode) -> String {
        let mut output = String::new();
        for node in &list.nodes {
            if let Node::Text(text) = node {
                output.push_str(text);
                continue;
            }
            let value = self.eval_node(node);
            if !value.is_null() {
                let _ = write!(output, "{}", value.unwrapped());
            }
        }
        output
    }

    pub fn eval_node(&mut self, node: &Node) -> Value {
        match node {
            Node::Text(text) => Value::String(text.clone()),
            Node::Action(expr) => self.eval_expr(expr),
            Node::If(node) => self.eval_if(node),
            Node::Foreach(node) => self.eval_foreach(node),
        }
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> Value {
        match expr {
            Expr::Identifier(name) => self.env.get(name).cloned().unwrap_or(Value::Null),
            Expr::NumberLiteral(n) => Value::Number(*n),
            Expr::StringLiteral(s) => Value::String(s.clone()),
            Expr::FieldAccess(left, property) => match self.eval_expr(left).into_unwrapped() {
                Value::Map(entries) => entries.get(property).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            Expr::Index(left, index) => {
                let left = self.eval_expr(left).into_unwrapped();
                let index = self.eval_expr(index).into_unwrapped();
                match (left, index) {
                    (Value::Array(items), Value::Number(n)) => array_position(n, items.len())
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                }
            }
            Expr::Infix(left, op, right) => self.eval_infix(left, *op, right),
            Expr::Pipe(left, name) => {
                let value = self.eval_expr(left);
                match self.env.modifiers().get(name) {
                    Some(modifier) => modifier(value),
                    None => {
                        debug!(modifier = %name, "unknown modifier, rendering null");
                        Value::Null
                    }
                }
            }
        }
    }

    fn eval_infix(&mut self, left: &Expr, op: InfixOp, right: &Expr) -> Value {
        match op {
            InfixOp::And => {
                if !self.eval_expr(left).is_truthy() {
                    return Value::Boolean(false);
                }
                Value::Boolean(self.eval_expr(right).is_truthy())
            }
            InfixOp::Or => {
                if self.eval_expr(left).is_truthy() {
                    return Value::Boolean(true);
                }
                Value::Boolean(self.eval_expr(right).is_truthy())
            }
            InfixOp::Eq | InfixOp::NotEq => {
                let equal = self.eval_expr(left).template_eq(&self.eval_expr(right));
                Value::Boolean(equal == (op == InfixOp::Eq))
            }
            InfixOp::Lt | InfixOp::Lte | InfixOp::Gt | InfixOp::Gte => {
                let left = self.eval_expr(left).as_number();
                let right = self.eval_expr(right).as_number();
                let (Some(a), Some(b)) = (left, right) else {
                    return Value::Boolean(false);
                };
                Value::Boolean(match op {
                    InfixOp::Lt => a < b,
                    InfixOp::Lte => a <= b,
                    InfixOp::Gt => a > b,
                    _ => a >= b,
                })
            }
        }
    }

    fn eval_if(&mut self, node: &IfNode) -> Value {
        if self.eval_expr(&node.condition).is_truthy() {
            return Value::String(self.eval_list(&node.consequence));
        }
        for branch in &node.else_ifs {
            if self.eval_expr(&branch.condition).is_truthy() {
                return Value::String(self.eval_list(&branch.block));
            }
        }
        match &node.alternative {
            Some(block) => Value::String(self.eval_list(block)),
            None => Value::Null,
        }
    }

    fn eval_foreach(&mut self, node: &ForeachNode) -> Value {
        // (key, item) pairs; map keys come out of the BTreeMap sorted.
        let entries: Vec<(Value, Value)> = match self.eval_expr(&node.source).into_unwrapped() {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::Number(i as f64), item.clone()))
                .collect(),
            Value::Map(map) => map
                .iter()
                .map(|(key, item)| (Value::String(key.clone()), item.clone()))
                .collect(),
            other => {
                debug!(source = other.type_name(), "foreach source is not iterable");
                Vec::new()
            }
        };

        if entries.is_empty() {
            return match &node.alternative {
                Some(block) => Value::String(self.eval_list(block)),
                None => Value::Null,
            };
        }

        let mut output = String::new();
        let last = entries.len() - 1;
        trace!(item = %node.item, iterations = entries.len(), "foreach");
        {
            let mut scope = Scope::new(&mut *self.env);
            if let Some(name) = &node.name {
                install_loop_state(&mut scope, name);
            }
            for (index, (key, item)) in entries.into_iter().enumerate() {
                scope.bind(&node.item, item);
                if let Some(key_name) = &node.key {
                    scope.bind(key_name, key);
                }
                if let Some(name) = &node.name {
                    set_loop_flags(scope.env(), name, index == 0, index == last);
                }
                output.push_str(&Evaluator::new(scope.env()).eval_list(&node.body));
            }
        }

        if output.is_empty() {
            Value::Null
        } else {
            Value::String(output)
        }
    }
}

/// Converts a numeric index into a position, if it names one.
fn array_position(index: f64, len: usize) -> Option<usize> {
    if index.fract() != 0.0 || index < 0.0 || index >= len as f64 {
        return None;
    }
    Some(index as usize)
}

fn map_entry(value: Option<&Value>) -> BTreeMap<String, Value> {
    match value.map(Value::unwrapped) {
        Some(Value::Map(entries)) => (**entries).clone(),
        _ => BTreeMap::new(),
    }
}

/// Binds `smarty` to a copy of the current `smarty` map whose
/// `foreach.<name>` entry is fresh loop state.
fn install_loop_state(scope: &mut Scope<'_>, name: &str) {
    let mut smarty = map_entry(scope.env().get("smarty"));
    let mut foreach = map_entry(smarty.get("foreach"));
    foreach.insert(
        name.to_owned(),
        Value::map([("first", false), ("last", false)]),
    );
    smarty.insert("foreach".to_owned(), Value::Map(Arc::new(foreach)));
    scope.bind("smarty", Value::Map(Arc::new(smarty)));
}

/// Updates `smarty.foreach.<name>` in place.
fn set_loop_flags(env: &mut Environment, name: &str, first: bool, last: bool) {
    let Some(Value::Map(smarty)) = env.get_mut("smarty") else {
        return;
    };
    let Some(Value::Map(foreach)) = Arc::make_mut(smarty).get_mut("foreach") else {
        return;
    };
    let Some(Value::Map(state)) = Arc::make_mut(foreach).get_mut(name) else {
        return;
    };
    let state = Arc::make_mut(state);
    state.insert("first".to_owned(), Value::Boolean(first));
    state.insert("last".to_owned(), Value::Boolean(last));
}
