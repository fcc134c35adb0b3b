use indexmap::IndexMap;

use crate::chart::ChartKind;
use crate::error::EvalError;

use super::interpreter::Interpreter;
use super::value::Value;

pub type CallbackId = usize;

/// A prop after instantiation: plain data, or a handle to a sandboxed
/// function (`tickFormatter`, `label`, ...) that layout may call back into.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Json(serde_json::Value),
    Callback(CallbackId),
}

impl PropValue {
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(json) => Some(json),
            Self::Callback(_) => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self.as_json()? {
            serde_json::Value::Number(number) => number.as_f64(),
            serde_json::Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_json()?.as_str()
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_json()?.as_bool()
    }

    #[must_use]
    pub fn callback(&self) -> Option<CallbackId> {
        match self {
            Self::Callback(id) => Some(*id),
            Self::Json(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Intrinsic(String),
    Chart(ChartKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartElement {
    pub kind: ElementKind,
    pub props: IndexMap<String, PropValue>,
    pub children: Vec<ChartNode>,
}

impl ChartElement {
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            props: IndexMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_prop(mut self, name: &str, value: PropValue) -> Self {
        self.props.insert(name.to_owned(), value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: ChartNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn chart_kind(&self) -> Option<ChartKind> {
        match self.kind {
            ElementKind::Chart(kind) => Some(kind),
            ElementKind::Intrinsic(_) => None,
        }
    }

    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    #[must_use]
    pub fn prop_f64(&self, name: &str) -> Option<f64> {
        self.prop(name)?.as_f64()
    }

    #[must_use]
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.prop(name)?.as_str()
    }

    /// Missing flags default to `default`; `hide`, `dot`, etc. are booleans.
    #[must_use]
    pub fn prop_flag(&self, name: &str, default: bool) -> bool {
        match self.prop(name) {
            Some(PropValue::Json(serde_json::Value::Bool(value))) => *value,
            Some(PropValue::Json(serde_json::Value::Null)) => false,
            Some(_) => true,
            None => default,
        }
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[ChartNode], out: &mut String) {
    for node in nodes {
        match node {
            ChartNode::Text(text) => out.push_str(text),
            ChartNode::Element(element) => collect_text(&element.children, out),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartNode {
    Text(String),
    Element(ChartElement),
}

/// Calls sandboxed functions captured as [`PropValue::Callback`].
pub trait CallbackInvoker {
    /// Invokes callback `id` and converts its result to display text.
    fn format(&mut self, id: CallbackId, args: &[serde_json::Value]) -> Result<String, EvalError>;
}

/// Functions captured during instantiation together with the interpreter
/// that runs them. The step budget restarts when the table is created.
pub struct CallbackTable {
    interpreter: Option<Interpreter>,
    functions: Vec<Value>,
}

impl CallbackTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            interpreter: None,
            functions: Vec::new(),
        }
    }

    pub(super) fn new(mut interpreter: Interpreter, functions: Vec<Value>) -> Self {
        interpreter.reset_budget();
        Self {
            interpreter: Some(interpreter),
            functions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTable")
            .field("functions", &self.functions.len())
            .finish()
    }
}

impl CallbackInvoker for CallbackTable {
    fn format(&mut self, id: CallbackId, args: &[serde_json::Value]) -> Result<String, EvalError> {
        let (Some(interpreter), Some(function)) = (self.interpreter.as_mut(), self.functions.get(id))
        else {
            return Err(EvalError::Runtime(format!("callback #{id} is not available")));
        };
        let args = args.iter().map(Value::from_json).collect();
        let result = interpreter.call(function, args)?;
        Ok(if result.is_nullish() {
            String::new()
        } else {
            result.to_js_string()
        })
    }
}

/// Instantiated component output: host-level nodes plus the callbacks their
/// props refer to.
#[derive(Debug)]
pub struct ElementTree {
    pub nodes: Vec<ChartNode>,
    pub callbacks: CallbackTable,
}

impl ElementTree {
    #[must_use]
    pub fn from_nodes(nodes: Vec<ChartNode>) -> Self {
        Self {
            nodes,
            callbacks: CallbackTable::empty(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first search for the first element of `kind`.
    #[must_use]
    pub fn find(&self, kind: ChartKind) -> Option<&ChartElement> {
        fn walk(nodes: &[ChartNode], kind: ChartKind) -> Option<&ChartElement> {
            nodes.iter().find_map(|node| match node {
                ChartNode::Element(element) if element.chart_kind() == Some(kind) => Some(element),
                ChartNode::Element(element) => walk(&element.children, kind),
                ChartNode::Text(_) => None,
            })
        }
        walk(&self.nodes, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_jsx_conventions() {
        let element = ChartElement::new(ElementKind::Chart(ChartKind::Line))
            .with_prop("dot", PropValue::Json(serde_json::Value::Bool(false)))
            .with_prop("isAnimationActive", PropValue::Json(serde_json::json!(true)));
        assert!(!element.prop_flag("dot", true));
        assert!(element.prop_flag("isAnimationActive", false));
        assert!(element.prop_flag("hide", true));
    }

    #[test]
    fn numeric_strings_read_as_numbers() {
        let element = ChartElement::new(ElementKind::Chart(ChartKind::Bar))
            .with_prop("barSize", PropValue::Json(serde_json::json!("24")));
        assert_eq!(element.prop_f64("barSize"), Some(24.0));
    }

    #[test]
    fn empty_table_reports_missing_callbacks() {
        let mut table = CallbackTable::empty();
        assert!(table.format(0, &[]).is_err());
    }
}
