//! Capability-limited evaluator for transformed chart sources.
//!
//! Source is parsed by a hand-written parser that lowers JSX into runtime
//! `createElement` calls, then executed by a tree-walking interpreter whose
//! global scope holds only the runtime binding, the charting namespace and
//! pure intrinsics. Every evaluation is bounded by a step budget and a call
//! depth limit.

mod ast;
mod interpreter;
mod lexer;
mod natives;
mod parser;
mod tree;
mod value;

pub use interpreter::DENIED_GLOBALS;
pub use tree::{
    CallbackId, CallbackInvoker, CallbackTable, ChartElement, ChartNode, ElementKind, ElementTree,
    PropValue,
};

use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::{EvalLimits, RendererConfig};
use crate::error::EvalError;
use crate::mount::RenderTicket;

use interpreter::{Interpreter, element_props};
use value::{Closure, ElementType, PropertyMap, STRING_CHARGE_BYTES, Value, number_to_string};

/// A callable component produced by [`Sandbox::evaluate`].
///
/// The component lives in the sandbox's current interpreter; evaluating
/// another source tears that interpreter down unless
/// [`Sandbox::instantiate`] already handed it to an [`ElementTree`].
#[derive(Debug, Clone)]
pub struct ComponentValue {
    closure: Rc<Closure>,
}

impl ComponentValue {
    /// Declared function name, if the component had one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.closure.def.name.as_deref()
    }
}

/// Evaluation request for one render generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalJob {
    pub ticket: RenderTicket,
    pub code: String,
}

#[derive(Debug)]
pub struct EvalResult {
    pub ticket: RenderTicket,
    pub outcome: Result<ElementTree, EvalError>,
}

/// Owns the interpreter for one evaluation at a time. Each
/// [`Sandbox::evaluate`] starts from fresh globals, so nothing leaks between
/// chart sources.
pub struct Sandbox {
    runtime_name: String,
    namespace: String,
    limits: EvalLimits,
    interpreter: Interpreter,
}

impl Sandbox {
    #[must_use]
    pub fn new(runtime_name: &str, namespace: &str, limits: EvalLimits) -> Self {
        Self {
            runtime_name: runtime_name.to_owned(),
            namespace: namespace.to_owned(),
            limits,
            interpreter: Interpreter::new(runtime_name, namespace, limits),
        }
    }

    #[must_use]
    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(&config.runtime_name, &config.transform.namespace, config.limits)
    }

    #[must_use]
    pub fn limits(&self) -> EvalLimits {
        self.limits
    }

    fn fresh_interpreter(&self) -> Interpreter {
        Interpreter::new(&self.runtime_name, &self.namespace, self.limits)
    }

    /// Runs transformed source and returns the component it yields.
    pub fn evaluate(&mut self, transformed: &str) -> Result<ComponentValue, EvalError> {
        self.interpreter = self.fresh_interpreter();
        let value = self.interpreter.run_program(transformed)?;
        match value {
            Value::Function(closure) => {
                debug!(
                    component = closure.def.name.as_deref().unwrap_or("<anonymous>"),
                    steps = self.interpreter.steps_used(),
                    "chart component evaluated"
                );
                Ok(ComponentValue { closure })
            }
            other => Err(EvalError::NotAComponent {
                found: other.describe(),
            }),
        }
    }

    /// Renders `component` with `props` and expands nested components into
    /// host-level chart nodes.
    pub fn instantiate(
        &mut self,
        component: &ComponentValue,
        props: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ElementTree, EvalError> {
        self.interpreter.reset_budget();
        let props: PropertyMap = props
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect();
        let rendered = self
            .interpreter
            .call(&Value::Function(Rc::clone(&component.closure)), vec![Value::object(props)])?;

        let mut expander = Expander {
            interpreter: &mut self.interpreter,
            callbacks: Vec::new(),
            max_depth: self.limits.max_call_depth,
        };
        let mut nodes = Vec::new();
        expander.expand(rendered, &mut nodes, 0)?;
        let callbacks = std::mem::take(&mut expander.callbacks);

        let fresh = self.fresh_interpreter();
        let interpreter = std::mem::replace(&mut self.interpreter, fresh);
        Ok(ElementTree {
            nodes,
            callbacks: CallbackTable::new(interpreter, callbacks),
        })
    }

    /// Evaluates and instantiates one job. Never panics and never returns
    /// early: failures travel inside [`EvalResult::outcome`].
    pub fn run_job(&mut self, job: EvalJob) -> EvalResult {
        let outcome = self
            .evaluate(&job.code)
            .and_then(|component| self.instantiate(&component, &serde_json::Map::new()));
        if let Err(err) = &outcome {
            warn!(
                message_id = %job.ticket.message_id,
                generation = job.ticket.generation,
                error = %err,
                "chart evaluation failed"
            );
        }
        EvalResult {
            ticket: job.ticket,
            outcome,
        }
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("runtime_name", &self.runtime_name)
            .field("namespace", &self.namespace)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

struct Expander<'a> {
    interpreter: &'a mut Interpreter,
    callbacks: Vec<Value>,
    max_depth: usize,
}

impl Expander<'_> {
    fn expand(&mut self, value: Value, out: &mut Vec<ChartNode>, depth: usize) -> Result<(), EvalError> {
        if depth > self.max_depth {
            return Err(EvalError::CallDepthExceeded {
                limit: self.max_depth,
            });
        }
        self.interpreter.charge(1)?;
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) => Ok(()),
            Value::Number(number) => {
                out.push(ChartNode::Text(number_to_string(number)));
                Ok(())
            }
            Value::Str(text) => {
                self.interpreter.charge((text.len() / STRING_CHARGE_BYTES) as u64)?;
                out.push(ChartNode::Text(text.to_string()));
                Ok(())
            }
            Value::Array(items) => {
                let items = items.borrow().clone();
                for item in items {
                    self.expand(item, out, depth + 1)?;
                }
                Ok(())
            }
            Value::Element(element) => match &element.element_type {
                ElementType::Fragment => {
                    for child in element.children.iter().cloned() {
                        self.expand(child, out, depth + 1)?;
                    }
                    Ok(())
                }
                ElementType::Component(closure) => {
                    let props = Value::object(element_props(&element));
                    let rendered = self
                        .interpreter
                        .call(&Value::Function(Rc::clone(closure)), vec![props])?;
                    self.expand(rendered, out, depth + 1)
                }
                ElementType::Intrinsic(tag) => {
                    let host = self.host_element(ElementKind::Intrinsic(tag.to_string()), &element.props, &element.children, depth)?;
                    out.push(ChartNode::Element(host));
                    Ok(())
                }
                ElementType::Chart(kind) => {
                    let host = self.host_element(ElementKind::Chart(*kind), &element.props, &element.children, depth)?;
                    out.push(ChartNode::Element(host));
                    Ok(())
                }
            },
            Value::Object(_) => Err(EvalError::Type(
                "objects are not valid as a chart child".to_owned(),
            )),
            Value::Function(_) | Value::Native(_) | Value::Chart(_) | Value::Fragment => Ok(()),
        }
    }

    fn host_element(
        &mut self,
        kind: ElementKind,
        props: &PropertyMap,
        children: &[Value],
        depth: usize,
    ) -> Result<ChartElement, EvalError> {
        let mut element = ChartElement::new(kind);
        for (name, value) in props {
            let prop = if value.is_callable() {
                self.callbacks.push(value.clone());
                PropValue::Callback(self.callbacks.len() - 1)
            } else if matches!(value, Value::Element(_)) {
                // Custom label/tooltip renderers are not drawn statically.
                continue;
            } else {
                let (json, bytes) = value.to_json_sized()?;
                self.interpreter.charge((bytes / STRING_CHARGE_BYTES) as u64)?;
                match json {
                    Some(json) => PropValue::Json(json),
                    None => continue,
                }
            };
            element.props.insert(name.clone(), prop);
        }
        for child in children.iter().cloned() {
            self.expand(child, &mut element.children, depth + 1)?;
        }
        Ok(element)
    }
}
