use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::config::EvalLimits;
use crate::error::EvalError;

use super::ast::{
    ArrayItem, AssignOp, BinaryOp, DeclKind, Expr, FunctionBody, LogicalOp, MemberProp,
    ObjectProp, Pattern, PropKey, Stmt, TemplatePart, UnaryOp,
};
use super::parser::Parser;
use super::value::{
    Closure, ElementType, Garbage, PropertyMap, STRING_CHARGE_BYTES, Value, check_string_len,
    number_to_string, release,
};

/// Host names evaluated source may look for but never reach.
///
/// Anything else that is not bound is a plain `ReferenceError`; these are
/// reported as capability violations so logs show the attempted escape.
pub const DENIED_GLOBALS: [&str; 27] = [
    "window",
    "document",
    "globalThis",
    "self",
    "parent",
    "top",
    "frames",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "EventSource",
    "navigator",
    "location",
    "history",
    "localStorage",
    "sessionStorage",
    "indexedDB",
    "caches",
    "eval",
    "Function",
    "require",
    "process",
    "setTimeout",
    "setInterval",
    "requestAnimationFrame",
    "Worker",
    "Date",
];

struct Binding {
    value: Value,
    mutable: bool,
}

/// Lexical environment. Function scopes receive `var` declarations; block
/// scopes hold `let`/`const`.
pub struct Scope {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Scope>>,
    function_boundary: bool,
}

impl Scope {
    pub(crate) fn root() -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
            function_boundary: true,
        })
    }

    fn child(parent: &Rc<Scope>, function_boundary: bool) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            function_boundary,
        })
    }

    pub(crate) fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.bindings
            .borrow_mut()
            .insert(name.to_owned(), Binding { value, mutable });
    }

    fn declare_var(&self, name: &str) {
        self.bindings
            .borrow_mut()
            .entry(name.to_owned())
            .or_insert(Binding {
                value: Value::Undefined,
                mutable: true,
            });
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.bindings.borrow().get(name) {
                return Some(binding.value.clone());
            }
            scope = current.parent.as_deref();
        }
        None
    }

    /// Returns `Ok(false)` when no binding with `name` exists.
    fn assign(&self, name: &str, value: Value) -> Result<bool, EvalError> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.bindings.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Err(EvalError::Type(format!(
                        "assignment to constant variable `{name}`"
                    )));
                }
                binding.value = value;
                return Ok(true);
            }
            scope = current.parent.as_deref();
        }
        Ok(false)
    }

    /// Hands the bindings and parent link to `pending` when this is the last
    /// strong reference to the scope.
    pub(super) fn unlink(self: Rc<Self>, pending: &mut Vec<Garbage>) {
        if Rc::strong_count(&self) != 1 {
            return;
        }
        if let Ok(mut bindings) = self.bindings.try_borrow_mut() {
            pending.extend(bindings.drain().map(|(_, binding)| Garbage::Value(binding.value)));
        }
        if let Some(parent) = &self.parent {
            pending.push(Garbage::Scope(Rc::clone(parent)));
        }
    }

    fn take_bindings(&self) -> Vec<Value> {
        self.bindings
            .try_borrow_mut()
            .map(|mut bindings| bindings.drain().map(|(_, binding)| binding.value).collect())
            .unwrap_or_default()
    }

    fn var_scope(self: &Rc<Self>) -> Rc<Self> {
        let mut scope = Rc::clone(self);
        while !scope.function_boundary {
            let Some(parent) = scope.parent.clone() else {
                break;
            };
            scope = parent;
        }
        scope
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let mut pending: Vec<Garbage> = self
            .bindings
            .get_mut()
            .drain()
            .map(|(_, binding)| Garbage::Value(binding.value))
            .collect();
        pending.extend(self.parent.take().map(Garbage::Scope));
        release(pending);
    }
}

/// Registered scopes are pruned of dead entries once the registry reaches
/// this many entries (or twice the live count, whichever is larger).
const SCOPE_PRUNE_MIN: usize = 64;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Tree-walking evaluator with a fixed global capability table.
///
/// Closures capture the scope that binds them, so the scope graph of a run
/// is cyclic. Dropping the interpreter empties every scope it created, which
/// also invalidates closures that outlive it.
pub struct Interpreter {
    pub(super) globals: Rc<Scope>,
    pub(super) runtime_name: String,
    limits: EvalLimits,
    steps: u64,
    depth: usize,
    nesting: usize,
    scopes: Vec<Weak<Scope>>,
    prune_at: usize,
}

impl Interpreter {
    #[must_use]
    pub fn new(runtime_name: &str, namespace_name: &str, limits: EvalLimits) -> Self {
        let globals = Scope::root();
        super::natives::install_globals(&globals, runtime_name, namespace_name);
        Self {
            globals,
            runtime_name: runtime_name.to_owned(),
            limits,
            steps: 0,
            depth: 0,
            nesting: 0,
            scopes: Vec::new(),
            prune_at: SCOPE_PRUNE_MIN,
        }
    }

    #[must_use]
    pub fn steps_used(&self) -> u64 {
        self.steps
    }

    pub fn reset_budget(&mut self) {
        self.steps = 0;
        self.depth = 0;
        self.nesting = 0;
    }

    /// Parses and runs `source`, returning the value of its last expression
    /// statement.
    pub fn run_program(&mut self, source: &str) -> Result<Value, EvalError> {
        let program = Parser::new(source, &self.runtime_name)
            .with_max_depth(self.limits.max_nesting_depth)
            .parse_program()?;
        let globals = Rc::clone(&self.globals);
        let scope = self.child_scope(&globals, true);
        self.hoist(&program, &scope, true);

        let mut completion = Value::Undefined;
        for stmt in &program {
            if let Stmt::Expr(expr) = stmt {
                self.tick()?;
                completion = self.eval(expr, &scope)?;
                continue;
            }
            match self.exec(stmt, &scope)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(value),
                Flow::Break | Flow::Continue => {
                    return Err(EvalError::Runtime(
                        "`break`/`continue` outside of a loop".to_owned(),
                    ));
                }
            }
        }
        trace!(steps = self.steps, "sandbox program finished");
        Ok(completion)
    }

    pub(super) fn charge(&mut self, amount: u64) -> Result<(), EvalError> {
        self.steps = self.steps.saturating_add(amount);
        if self.steps > self.limits.step_budget {
            return Err(EvalError::StepBudgetExhausted {
                budget: self.limits.step_budget,
            });
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        self.charge(1)
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        if self.nesting >= self.limits.max_eval_depth {
            return Err(EvalError::NestingTooDeep {
                limit: self.limits.max_eval_depth,
            });
        }
        self.nesting += 1;
        Ok(())
    }

    fn child_scope(&mut self, parent: &Rc<Scope>, function_boundary: bool) -> Rc<Scope> {
        let scope = Scope::child(parent, function_boundary);
        if self.scopes.len() >= self.prune_at {
            self.scopes.retain(|scope| scope.strong_count() > 0);
            self.prune_at = (self.scopes.len() * 2).max(SCOPE_PRUNE_MIN);
        }
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    /// `ToString` for values flowing through evaluated code; arrays pay per
    /// element visited.
    pub(super) fn js_string(&mut self, value: &Value) -> Result<String, EvalError> {
        let mut out = String::new();
        let visited = value.write_js_string(&mut out, &mut Vec::new());
        self.charge(visited as u64)?;
        check_string_len(out.len())?;
        Ok(out)
    }

    /// Wraps a freshly built string, charging for its size.
    pub(super) fn string_value(&mut self, text: String) -> Result<Value, EvalError> {
        check_string_len(text.len())?;
        self.charge((text.len() / STRING_CHARGE_BYTES) as u64)?;
        Ok(Value::Str(Rc::from(text)))
    }

    fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            self.charge(((a.len() + b.len()) / STRING_CHARGE_BYTES) as u64)?;
        }
        if op == BinaryOp::Add && (is_stringish(left) || is_stringish(right)) {
            let mut text = self.js_string(left)?;
            text.push_str(&self.js_string(right)?);
            return self.string_value(text);
        }
        Ok(binary_op(op, left, right))
    }

    // ---------------------------------------------------------------------
    // Declarations
    // ---------------------------------------------------------------------

    fn hoist(&self, body: &[Stmt], scope: &Rc<Scope>, include_vars: bool) {
        for stmt in body {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = Value::Function(Rc::new(Closure {
                        def: Rc::clone(def),
                        scope: Rc::clone(scope),
                    }));
                    scope.declare(name, closure, true);
                }
            }
        }
        if include_vars {
            let mut names = Vec::new();
            collect_var_names(body, &mut names);
            for name in names {
                scope.declare_var(&name);
            }
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        kind: DeclKind,
        scope: &Rc<Scope>,
    ) -> Result<(), EvalError> {
        match pattern {
            Pattern::Ident(name) => {
                match kind {
                    DeclKind::Var => scope.var_scope().declare(name, value, true),
                    DeclKind::Let => scope.declare(name, value, true),
                    DeclKind::Const => scope.declare(name, value, false),
                }
                Ok(())
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(EvalError::Type(format!(
                        "cannot destructure `{}`",
                        value.describe()
                    )));
                }
                for prop in props {
                    let mut item = self.get_member(&value, &prop.key)?;
                    if matches!(item, Value::Undefined) {
                        if let Some(default) = &prop.default {
                            item = self.eval(default, scope)?;
                        }
                    }
                    self.bind_pattern(&prop.value, item, kind, scope)?;
                }
                if let Some(rest) = rest {
                    let remaining: PropertyMap = match &value {
                        Value::Object(object) => object
                            .props
                            .borrow()
                            .iter()
                            .filter(|(key, _)| !props.iter().any(|prop| &prop.key == *key))
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect(),
                        _ => PropertyMap::new(),
                    };
                    self.bind_pattern(&Pattern::Ident(rest.clone()), Value::object(remaining), kind, scope)?;
                }
                Ok(())
            }
            Pattern::Array { items, rest } => {
                let values = self.iterate(&value)?;
                for (index, item) in items.iter().enumerate() {
                    let Some(item) = item else {
                        continue;
                    };
                    let mut element = values.get(index).cloned().unwrap_or(Value::Undefined);
                    if matches!(element, Value::Undefined) {
                        if let Some(default) = &item.default {
                            element = self.eval(default, scope)?;
                        }
                    }
                    self.bind_pattern(&item.value, element, kind, scope)?;
                }
                if let Some(rest) = rest {
                    let remaining = values.iter().skip(items.len()).cloned().collect();
                    self.bind_pattern(&Pattern::Ident(rest.clone()), Value::array(remaining), kind, scope)?;
                }
                Ok(())
            }
        }
    }

    /// Values produced by iterating `value` (arrays and strings only).
    pub(super) fn iterate(&mut self, value: &Value) -> Result<Vec<Value>, EvalError> {
        let values: Vec<Value> = match value {
            Value::Array(items) => items.borrow().clone(),
            Value::Str(text) => text.chars().map(|ch| Value::str(ch.encode_utf8(&mut [0; 4]))).collect(),
            other => {
                return Err(EvalError::Type(format!(
                    "{} is not iterable",
                    other.describe()
                )));
            }
        };
        self.charge(values.len() as u64)?;
        Ok(values)
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        self.enter()?;
        let flow = self.exec_stmt(stmt, scope);
        self.nesting -= 1;
        flow
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        self.tick()?;
        match stmt {
            Stmt::Decl { kind, decls } => {
                for (pattern, init) in decls {
                    let value = match init {
                        Some(init) => self.eval(init, scope)?,
                        // `var x;` keeps a hoisted value.
                        None if *kind == DeclKind::Var => continue,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(pattern, value, *kind, scope)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_scope = self.child_scope(scope, false);
                if let Some(init) = init {
                    self.exec(init, &loop_scope)?;
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, &loop_scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &loop_scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &loop_scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable, scope)?;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    let iteration_scope = self.child_scope(scope, false);
                    self.bind_pattern(pattern, item, *kind, &iteration_scope)?;
                    match self.exec(body, &iteration_scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    self.tick()?;
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => {
                let block_scope = self.child_scope(scope, false);
                self.hoist(body, &block_scope, false);
                self.exec_block(body, &block_scope)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn lookup(&self, name: &str, scope: &Scope) -> Result<Value, EvalError> {
        scope.lookup(name).ok_or_else(|| unresolved(name))
    }

    pub(super) fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        self.enter()?;
        let value = self.eval_expr(expr, scope);
        self.nesting -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        self.tick()?;
        match expr {
            Expr::Number(value) => Ok(Value::Number(*value)),
            Expr::Str(text) => Ok(Value::str(text)),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            let value = self.eval(expr, scope)?;
                            out.push_str(&self.js_string(&value)?);
                        }
                    }
                    check_string_len(out.len())?;
                }
                self.string_value(out)
            }
            Expr::Ident(name) => self.lookup(name, scope),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope)?)),
            Expr::Object(props) => self.eval_object(props, scope),
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: Rc::clone(def),
                scope: Rc::clone(scope),
            }))),
            Expr::Unary { op, expr } => {
                if *op == UnaryOp::TypeOf {
                    if let Expr::Ident(name) = expr.as_ref() {
                        return Ok(Value::str(
                            scope.lookup(name).map_or("undefined", |value| value.type_of()),
                        ));
                    }
                }
                let value = self.eval(expr, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::str(value.type_of()),
                })
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign_to(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Member { .. } | Expr::Call { .. } => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or(Value::Undefined))
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, scope)?;
                }
                Ok(last)
            }
        }
    }

    /// Member and call chains. `None` means an optional link short-circuited
    /// the whole chain.
    fn eval_chain(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Option<Value>, EvalError> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_link(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property, scope)?;
                self.get_member(&target, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let Some(function) = self.eval_link(callee, scope)? else {
                    return Ok(None);
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                if !function.is_callable() {
                    return Err(EvalError::Type(format!(
                        "{} is not a function",
                        describe_callee(callee)
                    )));
                }
                let args = self.eval_items(args, scope)?;
                self.call(&function, args).map(Some)
            }
            other => self.eval(other, scope).map(Some),
        }
    }

    fn eval_link(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Option<Value>, EvalError> {
        match expr {
            Expr::Member { .. } | Expr::Call { .. } => {
                self.tick()?;
                self.eval_chain(expr, scope)
            }
            other => self.eval(other, scope).map(Some),
        }
    }

    fn property_key(&mut self, property: &MemberProp, scope: &Rc<Scope>) -> Result<String, EvalError> {
        match property {
            MemberProp::Static(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => Ok(self.eval(expr, scope)?.to_js_string()),
        }
    }

    fn eval_items(&mut self, items: &[ArrayItem], scope: &Rc<Scope>) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => values.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let spread = self.eval(expr, scope)?;
                    values.extend(self.iterate(&spread)?);
                }
                ArrayItem::Hole => values.push(Value::Undefined),
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, props: &[ObjectProp], scope: &Rc<Scope>) -> Result<Value, EvalError> {
        let mut map = PropertyMap::new();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, expr) => {
                    let key = match key {
                        PropKey::Static(name) => name.clone(),
                        PropKey::Computed(expr) => self.eval(expr, scope)?.to_js_string(),
                    };
                    let value = self.eval(expr, scope)?;
                    map.insert(key, value);
                }
                ObjectProp::Spread(expr) => match self.eval(expr, scope)? {
                    Value::Object(object) => {
                        let source = object.props.borrow();
                        self.charge(source.len() as u64)?;
                        for (key, value) in source.iter() {
                            map.insert(key.clone(), value.clone());
                        }
                    }
                    Value::Array(items) => {
                        self.charge(items.borrow().len() as u64)?;
                        for (index, value) in items.borrow().iter().enumerate() {
                            map.insert(index.to_string(), value.clone());
                        }
                    }
                    Value::Element(element) => {
                        self.charge(element.props.len() as u64)?;
                        for (key, value) in &element.props {
                            map.insert(key.clone(), value.clone());
                        }
                    }
                    _ => {}
                },
            }
        }
        Ok(Value::object(map))
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> Result<Value, EvalError> {
        let result = match op {
            AssignOp::Assign => self.eval(value, scope)?,
            AssignOp::Arith(op) => {
                let current = self.eval(target, scope)?;
                let operand = self.eval(value, scope)?;
                self.binary(op, &current, &operand)?
            }
            AssignOp::Logical(op) => {
                let current = self.eval(target, scope)?;
                let keep = match op {
                    LogicalOp::And => !current.truthy(),
                    LogicalOp::Or => current.truthy(),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.eval(value, scope)?
            }
        };
        self.assign_to(target, result.clone(), scope)?;
        Ok(result)
    }

    fn assign_to(&mut self, target: &Expr, value: Value, scope: &Rc<Scope>) -> Result<(), EvalError> {
        match target {
            Expr::Ident(name) => {
                if scope.assign(name, value)? {
                    Ok(())
                } else {
                    Err(unresolved(name))
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object, scope)?;
                let key = self.property_key(property, scope)?;
                self.set_member(&object, &key, value)
            }
            _ => Err(EvalError::Syntax {
                line: 0,
                column: 0,
                message: "invalid assignment target".to_owned(),
            }),
        }
    }

    pub(super) fn set_member(&mut self, object: &Value, key: &str, value: Value) -> Result<(), EvalError> {
        match object {
            Value::Object(target) => {
                if target.frozen {
                    return Err(EvalError::Type(format!(
                        "cannot assign to read only property `{key}`"
                    )));
                }
                target.props.borrow_mut().insert(key.to_owned(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let length = array_length(&value)?;
                    self.charge(length as u64)?;
                    items.borrow_mut().resize(length, Value::Undefined);
                    return Ok(());
                }
                let Ok(index) = key.parse::<usize>() else {
                    return Err(EvalError::Type(format!(
                        "cannot set property `{key}` on an array"
                    )));
                };
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    let grow = index + 1 - items.len();
                    self.charge(grow as u64)?;
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                Ok(())
            }
            other => Err(EvalError::Type(format!(
                "cannot set property `{key}` of {}",
                other.describe()
            ))),
        }
    }

    pub(super) fn get_member(&mut self, object: &Value, key: &str) -> Result<Value, EvalError> {
        match object {
            Value::Undefined | Value::Null => Err(EvalError::Type(format!(
                "cannot read properties of {} (reading '{key}')",
                object.describe()
            ))),
            Value::Object(target) => Ok(target
                .props
                .borrow()
                .get(key)
                .cloned()
                .unwrap_or(Value::Undefined)),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
                }
                Ok(super::natives::array_method(key)
                    .map_or(Value::Undefined, |name| Value::method(name, object.clone())))
            }
            Value::Str(text) => {
                self.charge((text.len() / STRING_CHARGE_BYTES) as u64)?;
                if key == "length" {
                    return Ok(Value::Number(text.chars().count() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(text
                        .chars()
                        .nth(index)
                        .map_or(Value::Undefined, |ch| Value::str(ch.encode_utf8(&mut [0; 4]))));
                }
                Ok(super::natives::string_method(key)
                    .map_or(Value::Undefined, |name| Value::method(name, object.clone())))
            }
            Value::Number(_) => Ok(super::natives::number_method(key)
                .map_or(Value::Undefined, |name| Value::method(name, object.clone()))),
            Value::Native(native) if matches!(native.receiver, Value::Undefined) => {
                Ok(super::natives::static_member(native.name, key))
            }
            Value::Element(element) => Ok(match key {
                "props" => Value::object(element_props(element)),
                "key" => element
                    .key
                    .as_deref()
                    .map_or(Value::Null, Value::str),
                _ => Value::Undefined,
            }),
            _ => Ok(Value::Undefined),
        }
    }

    // ---------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------

    /// Invokes any callable value with positional arguments.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(native) => {
                let native = Rc::clone(native);
                self.call_native(&native, args)
            }
            Value::Chart(kind) => Err(EvalError::Type(format!(
                "{} must be rendered as an element, not called",
                kind.name()
            ))),
            other => Err(EvalError::Type(format!(
                "{} is not a function",
                other.describe()
            ))),
        }
    }

    pub(super) fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Result<Value, EvalError> {
        if self.depth >= self.limits.max_call_depth {
            return Err(EvalError::CallDepthExceeded {
                limit: self.limits.max_call_depth,
            });
        }
        self.depth += 1;
        let result = self.invoke_closure(closure, args);
        self.depth -= 1;
        result
    }

    fn invoke_closure(&mut self, closure: &Rc<Closure>, mut args: Vec<Value>) -> Result<Value, EvalError> {
        self.tick()?;
        let scope = self.child_scope(&closure.scope, true);
        if let Some(name) = &closure.def.name {
            scope.declare(name, Value::Function(Rc::clone(closure)), true);
        }

        for (index, param) in closure.def.params.iter().enumerate() {
            let value = if param.rest {
                Value::array(if index < args.len() {
                    args.split_off(index)
                } else {
                    Vec::new()
                })
            } else {
                let mut value = args.get(index).cloned().unwrap_or(Value::Undefined);
                if matches!(value, Value::Undefined) {
                    if let Some(default) = &param.default {
                        value = self.eval(default, &scope)?;
                    }
                }
                value
            };
            self.bind_pattern(&param.pattern, value, DeclKind::Let, &scope)?;
        }

        match &closure.def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist(body, &scope, true);
                match self.exec_block(body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Undefined),
                }
            }
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        let mut pending = self.globals.take_bindings();
        for scope in self.scopes.drain(..).filter_map(|scope| scope.upgrade()) {
            pending.extend(scope.take_bindings());
        }
        sweep(pending);
    }
}

/// Empties every array, object and scope reachable from `pending`, which
/// breaks reference cycles among them regardless of who else holds them.
fn sweep(mut pending: Vec<Value>) {
    let mut seen: HashSet<*const ()> = HashSet::new();
    while let Some(value) = pending.pop() {
        match &value {
            Value::Array(items) => {
                if let Ok(mut items) = items.try_borrow_mut() {
                    pending.append(&mut *items);
                }
            }
            Value::Object(object) => {
                if let Ok(mut props) = object.props.try_borrow_mut() {
                    pending.extend(props.drain(..).map(|(_, value)| value));
                }
            }
            Value::Function(closure) => pending.extend(closure.scope.take_bindings()),
            Value::Native(native) => {
                if seen.insert(Rc::as_ptr(native).cast()) {
                    pending.push(native.receiver.clone());
                }
            }
            Value::Element(element) => {
                if seen.insert(Rc::as_ptr(element).cast()) {
                    pending.extend(element.props.values().cloned());
                    pending.extend(element.children.iter().cloned());
                    if let ElementType::Component(closure) = &element.element_type {
                        pending.push(Value::Function(Rc::clone(closure)));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Props as seen by a component: element props plus `children`.
pub(super) fn element_props(element: &super::value::Element) -> PropertyMap {
    let mut props = element.props.clone();
    match element.children.as_slice() {
        [] => {}
        [single] => {
            props.insert("children".to_owned(), single.clone());
        }
        many => {
            props.insert("children".to_owned(), Value::array(many.to_vec()));
        }
    }
    props
}

pub(super) fn array_length(value: &Value) -> Result<usize, EvalError> {
    let length = value.to_number();
    if length.is_nan() || length < 0.0 || length.fract() != 0.0 || length > 4_294_967_295.0 {
        return Err(EvalError::Runtime(format!(
            "invalid array length {}",
            number_to_string(length)
        )));
    }
    Ok(length as usize)
}

fn unresolved(name: &str) -> EvalError {
    if DENIED_GLOBALS.contains(&name) {
        EvalError::CapabilityDenied {
            name: name.to_owned(),
        }
    } else {
        EvalError::Reference {
            name: name.to_owned(),
        }
    }
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object,
            property: MemberProp::Static(name),
            ..
        } => format!("{}.{name}", describe_callee(object)),
        Expr::Member { object, .. } => format!("{}[...]", describe_callee(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe_callee(callee)),
        _ => "expression".to_owned(),
    }
}

fn collect_var_names(body: &[Stmt], names: &mut Vec<String>) {
    for stmt in body {
        match stmt {
            Stmt::Decl {
                kind: DeclKind::Var,
                decls,
            } => {
                for (pattern, _) in decls {
                    pattern_names(pattern, names);
                }
            }
            Stmt::If {
                consequent,
                alternate,
                ..
            } => {
                collect_var_names(std::slice::from_ref(consequent.as_ref()), names);
                if let Some(alternate) = alternate {
                    collect_var_names(std::slice::from_ref(alternate.as_ref()), names);
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_var_names(std::slice::from_ref(init.as_ref()), names);
                }
                collect_var_names(std::slice::from_ref(body.as_ref()), names);
            }
            Stmt::ForOf {
                kind, pattern, body, ..
            } => {
                if *kind == DeclKind::Var {
                    pattern_names(pattern, names);
                }
                collect_var_names(std::slice::from_ref(body.as_ref()), names);
            }
            Stmt::While { body, .. } => {
                collect_var_names(std::slice::from_ref(body.as_ref()), names);
            }
            Stmt::Block(body) => collect_var_names(body, names),
            _ => {}
        }
    }
}

fn pattern_names(pattern: &Pattern, names: &mut Vec<String>) {
    match pattern {
        Pattern::Ident(name) => names.push(name.clone()),
        Pattern::Object { props, rest } => {
            for prop in props {
                pattern_names(&prop.value, names);
            }
            names.extend(rest.iter().cloned());
        }
        Pattern::Array { items, rest } => {
            for item in items.iter().flatten() {
                pattern_names(&item.value, names);
            }
            names.extend(rest.iter().cloned());
        }
    }
}

/// Operators on already-evaluated operands. String concatenation goes
/// through [`Interpreter::binary`], which charges for the result.
fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => Value::Number(left.to_number() + right.to_number()),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Pow => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn is_stringish(value: &Value) -> bool {
    matches!(
        value,
        Value::Str(_)
            | Value::Array(_)
            | Value::Object(_)
            | Value::Element(_)
            | Value::Function(_)
            | Value::Native(_)
    )
}
