use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::chart::ChartKind;
use crate::error::EvalError;

use super::ast::FunctionDef;
use super::interpreter::Scope;

pub type PropertyMap = IndexMap<String, Value>;

/// Deepest array/object nesting converted to strings or JSON.
pub const MAX_VALUE_DEPTH: usize = 128;
/// Largest string evaluated code may build, in bytes.
pub const MAX_STRING_LEN: usize = 1 << 20;
/// Strings cost one interpreter step per this many bytes.
pub const STRING_CHARGE_BYTES: usize = 256;
/// Upper bound on the string payload of one JSON conversion.
const MAX_JSON_BYTES: usize = 8 << 20;

/// Runtime value of the sandbox interpreter.
///
/// Reference types share through `Rc`; the sandbox is single threaded.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<ArrayCell>),
    Object(Rc<Object>),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Element(Rc<Element>),
    /// Marker for a charting-library primitive such as `Recharts.LineChart`.
    Chart(ChartKind),
    /// The runtime's fragment marker.
    Fragment,
}

/// Backing store of an array value.
#[derive(Default)]
pub struct ArrayCell(RefCell<Vec<Value>>);

impl ArrayCell {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self(RefCell::new(items))
    }
}

impl Deref for ArrayCell {
    type Target = RefCell<Vec<Value>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ArrayCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(items) => write!(f, "Array(len = {})", items.len()),
            Err(_) => f.write_str("Array(<borrowed>)"),
        }
    }
}

impl Drop for ArrayCell {
    fn drop(&mut self) {
        let items = self.0.get_mut();
        if items.iter().any(Value::is_reference) {
            release(items.drain(..).map(Garbage::Value).collect());
        }
    }
}

#[derive(Default)]
pub struct Object {
    pub props: RefCell<PropertyMap>,
    pub frozen: bool,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Object");
        if let Ok(props) = self.props.try_borrow() {
            debug.field("keys", &props.keys().collect::<Vec<_>>());
        }
        debug.field("frozen", &self.frozen).finish()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        let props = self.props.get_mut();
        if props.values().any(Value::is_reference) {
            release(props.drain(..).map(|(_, value)| Garbage::Value(value)).collect());
        }
    }
}

impl Object {
    #[must_use]
    pub fn frozen(props: PropertyMap) -> Self {
        Self {
            props: RefCell::new(props),
            frozen: true,
        }
    }
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Rc<Scope>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.def.name)
            .field("params", &self.def.params.len())
            .finish_non_exhaustive()
    }
}

/// Host-implemented function. `name` selects the behavior; `receiver` is the
/// bound value for methods such as `[1, 2].map`.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub receiver: Value,
}

#[derive(Debug, Clone)]
pub enum ElementType {
    Intrinsic(Rc<str>),
    Chart(ChartKind),
    Fragment,
    Component(Rc<Closure>),
}

/// Result of `createElement`: an unexpanded element description.
#[derive(Debug, Clone)]
pub struct Element {
    pub element_type: ElementType,
    pub props: PropertyMap,
    pub children: Vec<Value>,
    pub key: Option<String>,
}

impl Element {
    fn unlink(&mut self, pending: &mut Vec<Garbage>) {
        pending.extend(self.props.drain(..).map(|(_, value)| Garbage::Value(value)));
        pending.extend(self.children.drain(..).map(Garbage::Value));
        if let ElementType::Component(closure) =
            std::mem::replace(&mut self.element_type, ElementType::Fragment)
        {
            pending.push(Garbage::Value(Value::Function(closure)));
        }
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.unlink(&mut pending);
        release(pending);
    }
}

/// Reference-counted state waiting to be dropped.
pub(super) enum Garbage {
    Value(Value),
    Scope(Rc<Scope>),
}

/// Drops `pending` without recursing into nested values: a container whose
/// last reference is held here is emptied into the worklist first, so its
/// own drop has nothing left to walk.
pub(super) fn release(mut pending: Vec<Garbage>) {
    while let Some(garbage) = pending.pop() {
        match garbage {
            Garbage::Value(Value::Array(mut items)) => {
                if let Some(items) = Rc::get_mut(&mut items) {
                    pending.extend(items.0.get_mut().drain(..).map(Garbage::Value));
                }
            }
            Garbage::Value(Value::Object(mut object)) => {
                if let Some(object) = Rc::get_mut(&mut object) {
                    pending.extend(
                        object
                            .props
                            .get_mut()
                            .drain(..)
                            .map(|(_, value)| Garbage::Value(value)),
                    );
                }
            }
            Garbage::Value(Value::Element(mut element)) => {
                if let Some(element) = Rc::get_mut(&mut element) {
                    element.unlink(&mut pending);
                }
            }
            Garbage::Value(Value::Function(closure)) => {
                if let Ok(closure) = Rc::try_unwrap(closure) {
                    pending.push(Garbage::Scope(closure.scope));
                }
            }
            Garbage::Value(Value::Native(native)) => {
                if let Ok(native) = Rc::try_unwrap(native) {
                    pending.push(Garbage::Value(native.receiver));
                }
            }
            Garbage::Value(_) => {}
            Garbage::Scope(scope) => scope.unlink(&mut pending),
        }
    }
}

impl Value {
    #[must_use]
    pub fn str(text: &str) -> Self {
        Self::Str(Rc::from(text))
    }

    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(ArrayCell::new(items)))
    }

    #[must_use]
    pub fn object(props: PropertyMap) -> Self {
        Self::Object(Rc::new(Object {
            props: RefCell::new(props),
            frozen: false,
        }))
    }

    #[must_use]
    pub fn native(name: &'static str) -> Self {
        Self::Native(Rc::new(NativeFunction {
            name,
            receiver: Self::Undefined,
        }))
    }

    #[must_use]
    pub fn method(name: &'static str, receiver: Value) -> Self {
        Self::Native(Rc::new(NativeFunction { name, receiver }))
    }

    /// `typeof` result.
    #[must_use]
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Function(_) | Self::Native(_) | Self::Chart(_) => "function",
            Self::Null | Self::Array(_) | Self::Object(_) | Self::Element(_) | Self::Fragment => {
                "object"
            }
        }
    }

    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Whether the value points at shared heap state.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Object(_) | Self::Function(_) | Self::Native(_) | Self::Element(_)
        )
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::Str(text) => !text.is_empty(),
            _ => true,
        }
    }

    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(value) => f64::from(u8::from(*value)),
            Self::Number(value) => *value,
            Self::Str(text) => string_to_number(text),
            Self::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// JavaScript `ToString`.
    #[must_use]
    pub fn to_js_string(&self) -> String {
        let mut out = String::new();
        self.write_js_string(&mut out, &mut Vec::new());
        out
    }

    /// Appends `ToString` of `self` to `out` and returns how many array
    /// elements were visited. An array reached again through itself prints
    /// as an empty string, like `Array.prototype.join`; output stops growing
    /// once it passes [`MAX_STRING_LEN`].
    pub(super) fn write_js_string(
        &self,
        out: &mut String,
        ancestors: &mut Vec<*const ArrayCell>,
    ) -> usize {
        match self {
            Self::Undefined => out.push_str("undefined"),
            Self::Null => out.push_str("null"),
            Self::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            Self::Number(value) => out.push_str(&number_to_string(*value)),
            Self::Str(text) => out.push_str(text),
            Self::Array(items) => {
                let pointer = Rc::as_ptr(items);
                if ancestors.contains(&pointer) || ancestors.len() >= MAX_VALUE_DEPTH {
                    return 0;
                }
                ancestors.push(pointer);
                let mut visited = 0;
                for (index, item) in items.borrow().iter().enumerate() {
                    if out.len() > MAX_STRING_LEN {
                        break;
                    }
                    if index > 0 {
                        out.push(',');
                    }
                    visited += 1;
                    if !item.is_nullish() {
                        visited += item.write_js_string(out, ancestors);
                    }
                }
                ancestors.pop();
                return visited;
            }
            Self::Object(_) | Self::Element(_) | Self::Fragment => out.push_str("[object Object]"),
            Self::Function(closure) => {
                out.push_str("function ");
                out.push_str(closure.def.name.as_deref().unwrap_or_default());
                out.push_str("() { [code] }");
            }
            Self::Native(native) => {
                out.push_str(&format!("function {}() {{ [native code] }}", native.name));
            }
            Self::Chart(kind) => {
                out.push_str(&format!("function {}() {{ [native code] }}", kind.name()));
            }
        }
        0
    }

    /// Short description used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool(value) => format!("boolean {value}"),
            Self::Number(value) => format!("number {}", number_to_string(*value)),
            Self::Str(_) => "string".to_owned(),
            Self::Array(_) => "array".to_owned(),
            Self::Object(_) => "object".to_owned(),
            Self::Function(_) | Self::Native(_) => "function".to_owned(),
            Self::Element(_) => "element".to_owned(),
            Self::Chart(kind) => kind.name().to_owned(),
            Self::Fragment => "Fragment".to_owned(),
        }
    }

    #[must_use]
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Fragment, Self::Fragment) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => {
                a.name == b.name && a.receiver.strict_equals(&b.receiver)
            }
            (Self::Element(a), Self::Element(b)) => Rc::ptr_eq(a, b),
            (Self::Chart(a), Self::Chart(b)) => a == b,
            _ => false,
        }
    }

    /// Abstract equality (`==`), restricted to primitive coercions.
    #[must_use]
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Self::Number(_) | Self::Str(_) | Self::Bool(_), Self::Number(_) | Self::Str(_) | Self::Bool(_))
                if std::mem::discriminant(self) != std::mem::discriminant(other) =>
            {
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }

    /// `JSON.stringify` semantics: functions and `undefined` vanish from
    /// objects and become `null` inside arrays. Circular structures are a
    /// type error.
    pub fn to_json(&self) -> Result<Option<serde_json::Value>, EvalError> {
        self.to_json_sized().map(|(json, _)| json)
    }

    /// [`Value::to_json`] plus the number of bytes of data walked.
    pub(super) fn to_json_sized(&self) -> Result<(Option<serde_json::Value>, usize), EvalError> {
        let mut walk = JsonWalk::default();
        let json = walk.convert(self)?;
        Ok((json, walk.bytes))
    }

    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Self::str(text),
            serde_json::Value::Array(items) => Self::array(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }
}

#[derive(Default)]
struct JsonWalk {
    ancestors: Vec<*const ()>,
    bytes: usize,
}

impl JsonWalk {
    fn convert(&mut self, value: &Value) -> Result<Option<serde_json::Value>, EvalError> {
        Ok(Some(match value {
            Value::Undefined
            | Value::Function(_)
            | Value::Native(_)
            | Value::Chart(_)
            | Value::Fragment => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Number(value) => number_to_json(*value),
            Value::Str(text) => {
                self.count(text.len())?;
                serde_json::Value::String(text.to_string())
            }
            Value::Array(items) => {
                self.enter(Rc::as_ptr(items).cast())?;
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    self.count(1)?;
                    out.push(self.convert(item)?.unwrap_or(serde_json::Value::Null));
                }
                self.ancestors.pop();
                serde_json::Value::Array(out)
            }
            Value::Object(object) => {
                self.enter(Rc::as_ptr(object).cast())?;
                let mut out = serde_json::Map::new();
                for (key, item) in object.props.borrow().iter() {
                    self.count(key.len() + 1)?;
                    if let Some(json) = self.convert(item)? {
                        out.insert(key.clone(), json);
                    }
                }
                self.ancestors.pop();
                serde_json::Value::Object(out)
            }
            Value::Element(_) => serde_json::Value::Object(serde_json::Map::new()),
        }))
    }

    fn enter(&mut self, pointer: *const ()) -> Result<(), EvalError> {
        if self.ancestors.contains(&pointer) {
            return Err(EvalError::Type(
                "converting circular structure to JSON".to_owned(),
            ));
        }
        if self.ancestors.len() >= MAX_VALUE_DEPTH {
            return Err(EvalError::Type(format!(
                "value nests deeper than {MAX_VALUE_DEPTH} levels"
            )));
        }
        self.ancestors.push(pointer);
        Ok(())
    }

    fn count(&mut self, bytes: usize) -> Result<(), EvalError> {
        self.bytes += bytes;
        if self.bytes > MAX_JSON_BYTES {
            return Err(EvalError::Runtime(format!(
                "value exceeds {MAX_JSON_BYTES} bytes of data"
            )));
        }
        Ok(())
    }
}

/// Rejects strings longer than [`MAX_STRING_LEN`], like a JavaScript
/// `RangeError: Invalid string length`.
pub(super) fn check_string_len(len: usize) -> Result<(), EvalError> {
    if len > MAX_STRING_LEN {
        return Err(EvalError::Runtime(format!(
            "invalid string length: {len} bytes exceeds the {MAX_STRING_LEN} byte limit"
        )));
    }
    Ok(())
}

pub(crate) fn number_to_json(value: f64) -> serde_json::Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(value as i64);
    }
    serde_json::Number::from_f64(value).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// JavaScript `Number::toString` for finite and special values.
#[must_use]
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    let magnitude = value.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let text = format!("{value:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => text,
        };
    }
    format!("{value}")
}

fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |value| value as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|ch| ch.is_ascii_alphabetic() && ch != 'e' && ch != 'E') => {
            f64::NAN
        }
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_numbers_like_javascript() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn coerces_strings_to_numbers() {
        assert_eq!(Value::str(" 42 ").to_number(), 42.0);
        assert_eq!(Value::str("").to_number(), 0.0);
        assert!(Value::str("12px").to_number().is_nan());
        assert_eq!(Value::str("1e3").to_number(), 1000.0);
    }

    #[test]
    fn loose_equality_bridges_nullish_and_primitives() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::str("1")));
        assert!(!Value::Number(0.0).loose_equals(&Value::Null));
        assert!(!Value::Number(1.0).strict_equals(&Value::str("1")));
    }

    #[test]
    fn json_drops_functions_from_objects() {
        let mut props = PropertyMap::new();
        props.insert("a".to_owned(), Value::Number(1.5));
        props.insert("f".to_owned(), Value::native("Math.max"));
        let json = Value::object(props).to_json().expect("json");
        assert_eq!(json, Some(serde_json::json!({ "a": 1.5 })));
    }

    #[test]
    fn circular_values_are_a_json_type_error() {
        let object = Value::object(PropertyMap::new());
        let Value::Object(inner) = &object else {
            unreachable!("object constructor");
        };
        inner.props.borrow_mut().insert("self".to_owned(), object.clone());
        let err = object.to_json().expect_err("cycle");
        assert!(matches!(err, EvalError::Type(message) if message.contains("circular")));
        inner.props.borrow_mut().clear();
    }

    #[test]
    fn shared_but_acyclic_values_serialize() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let pair = Value::array(vec![shared.clone(), shared]);
        assert_eq!(
            pair.to_json().expect("json"),
            Some(serde_json::json!([[1], [1]]))
        );
    }

    #[test]
    fn self_containing_arrays_join_as_empty() {
        let array = Value::array(vec![Value::Number(1.0)]);
        let Value::Array(items) = &array else {
            unreachable!("array constructor");
        };
        items.borrow_mut().push(array.clone());
        assert_eq!(array.to_js_string(), "1,");
        items.borrow_mut().clear();
    }

    #[test]
    fn deeply_nested_arrays_drop_without_recursion() {
        let mut value = Value::Number(0.0);
        for _ in 0..200_000 {
            value = Value::array(vec![value]);
        }
        let mut props = PropertyMap::new();
        props.insert("nested".to_owned(), value);
        drop(Value::object(props));
    }
}
