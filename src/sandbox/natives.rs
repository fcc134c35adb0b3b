//! Capability table and host-implemented intrinsics.
//!
//! Evaluated source reaches exactly what [`install_globals`] binds: the
//! runtime object, the charting namespace, and pure helpers such as `Math`.
//! None of them touch I/O, clocks, or randomness.

use std::cmp::Ordering;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::chart::ChartKind;
use crate::error::EvalError;

use super::interpreter::{Interpreter, Scope, array_length};
use super::value::{
    ArrayCell, Element, ElementType, NativeFunction, Object, PropertyMap, STRING_CHARGE_BYTES, Value,
    check_string_len, number_to_string,
};

fn frozen(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    let props: PropertyMap = entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();
    Value::Object(Rc::new(Object::frozen(props)))
}

fn natives(names: &[(&'static str, &'static str)]) -> Vec<(&'static str, Value)> {
    names
        .iter()
        .map(|(key, name)| (*key, Value::native(*name)))
        .collect()
}

/// Binds the sandbox globals. All bindings are constants.
pub(super) fn install_globals(globals: &Scope, runtime_name: &str, namespace_name: &str) {
    let mut runtime = natives(&[
        ("createElement", "createElement"),
        ("useState", "useState"),
        ("useMemo", "useMemo"),
        ("useCallback", "useCallback"),
        ("useRef", "useRef"),
        ("useEffect", "useEffect"),
        ("useLayoutEffect", "useEffect"),
    ]);
    runtime.push(("Fragment", Value::Fragment));
    globals.declare(runtime_name, frozen(runtime), false);

    let namespace = ChartKind::ALL
        .into_iter()
        .map(|kind| (kind.name(), Value::Chart(kind)));
    globals.declare(namespace_name, frozen(namespace), false);

    let mut math = natives(&[
        ("abs", "Math.abs"),
        ("max", "Math.max"),
        ("min", "Math.min"),
        ("round", "Math.round"),
        ("floor", "Math.floor"),
        ("ceil", "Math.ceil"),
        ("trunc", "Math.trunc"),
        ("sign", "Math.sign"),
        ("sqrt", "Math.sqrt"),
        ("pow", "Math.pow"),
        ("log", "Math.log"),
        ("log10", "Math.log10"),
        ("exp", "Math.exp"),
        ("sin", "Math.sin"),
        ("cos", "Math.cos"),
        ("atan2", "Math.atan2"),
    ]);
    math.push(("PI", Value::Number(std::f64::consts::PI)));
    math.push(("E", Value::Number(std::f64::consts::E)));
    globals.declare("Math", frozen(math), false);

    globals.declare(
        "JSON",
        frozen(natives(&[("stringify", "JSON.stringify"), ("parse", "JSON.parse")])),
        false,
    );
    globals.declare(
        "console",
        frozen(natives(&[
            ("log", "console.log"),
            ("info", "console.info"),
            ("debug", "console.debug"),
            ("warn", "console.warn"),
            ("error", "console.error"),
        ])),
        false,
    );

    for name in [
        "Number",
        "String",
        "Boolean",
        "Array",
        "Object",
        "parseFloat",
        "parseInt",
        "isNaN",
        "isFinite",
    ] {
        globals.declare(name, Value::native(name), false);
    }
    globals.declare("NaN", Value::Number(f64::NAN), false);
    globals.declare("Infinity", Value::Number(f64::INFINITY), false);
}

/// Members of callable globals such as `Object.keys`.
pub(super) fn static_member(owner: &str, key: &str) -> Value {
    let name = match (owner, key) {
        ("Object", "keys") => "Object.keys",
        ("Object", "values") => "Object.values",
        ("Object", "entries") => "Object.entries",
        ("Object", "assign") => "Object.assign",
        ("Object", "freeze") => "Object.freeze",
        ("Object", "fromEntries") => "Object.fromEntries",
        ("Array", "isArray") => "Array.isArray",
        ("Array", "from") => "Array.from",
        ("Number", "isFinite") => "isFinite",
        ("Number", "isNaN") => "isNaN",
        ("Number", "isInteger") => "Number.isInteger",
        ("Number", "parseFloat") => "parseFloat",
        ("Number", "parseInt") => "parseInt",
        ("Number", "MAX_SAFE_INTEGER") => return Value::Number(9_007_199_254_740_991.0),
        ("Number", "EPSILON") => return Value::Number(f64::EPSILON),
        _ => return Value::Undefined,
    };
    Value::native(name)
}

pub(super) fn array_method(key: &str) -> Option<&'static str> {
    Some(match key {
        "map" => "Array.map",
        "filter" => "Array.filter",
        "reduce" => "Array.reduce",
        "forEach" => "Array.forEach",
        "find" => "Array.find",
        "findIndex" => "Array.findIndex",
        "some" => "Array.some",
        "every" => "Array.every",
        "slice" => "Array.slice",
        "concat" => "Array.concat",
        "join" => "Array.join",
        "includes" => "Array.includes",
        "indexOf" => "Array.indexOf",
        "push" => "Array.push",
        "pop" => "Array.pop",
        "sort" => "Array.sort",
        "reverse" => "Array.reverse",
        "flat" => "Array.flat",
        "flatMap" => "Array.flatMap",
        _ => return None,
    })
}

pub(super) fn string_method(key: &str) -> Option<&'static str> {
    Some(match key {
        "toUpperCase" => "String.toUpperCase",
        "toLowerCase" => "String.toLowerCase",
        "trim" => "String.trim",
        "slice" => "String.slice",
        "substring" => "String.substring",
        "includes" => "String.includes",
        "startsWith" => "String.startsWith",
        "endsWith" => "String.endsWith",
        "indexOf" => "String.indexOf",
        "split" => "String.split",
        "padStart" => "String.padStart",
        "padEnd" => "String.padEnd",
        "replace" => "String.replace",
        "replaceAll" => "String.replaceAll",
        "charAt" => "String.charAt",
        "repeat" => "String.repeat",
        "localeCompare" => "String.localeCompare",
        "toString" => "String.toString",
        _ => return None,
    })
}

pub(super) fn number_method(key: &str) -> Option<&'static str> {
    Some(match key {
        "toFixed" => "Number.toFixed",
        "toLocaleString" => "Number.toLocaleString",
        "toString" => "Number.toString",
        _ => return None,
    })
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, Value::to_number)
}

/// Relative index as used by `slice`: negatives count from the end.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let index = value.to_number();
    if index.is_nan() {
        return 0;
    }
    let index = index.trunc();
    if index < 0.0 {
        (len as f64 + index).max(0.0) as usize
    } else {
        index.min(len as f64) as usize
    }
}

fn math_unary(name: &str, value: f64) -> f64 {
    match name {
        "Math.abs" => value.abs(),
        "Math.floor" => value.floor(),
        "Math.ceil" => value.ceil(),
        "Math.trunc" => value.trunc(),
        "Math.sqrt" => value.sqrt(),
        "Math.log" => value.ln(),
        "Math.log10" => value.log10(),
        "Math.exp" => value.exp(),
        "Math.sin" => value.sin(),
        "Math.cos" => value.cos(),
        // Ties round toward +infinity.
        "Math.round" => (value + 0.5).floor(),
        "Math.sign" => {
            if value.is_nan() || value == 0.0 {
                value
            } else {
                value.signum()
            }
        }
        _ => f64::NAN,
    }
}

fn parse_float_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = text.as_bytes();
    while end < bytes.len() {
        let byte = bytes[end];
        match byte {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    let mut candidate = &text[..end];
    while !candidate.is_empty() {
        if let Ok(value) = candidate.parse::<f64>() {
            return value;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    if text.starts_with("Infinity") || text.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if text.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    f64::NAN
}

fn parse_int_prefix(text: &str, radix: Option<u32>) -> f64 {
    let text = text.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, text) = match radix {
        Some(16) | None if text.starts_with("0x") || text.starts_with("0X") => (16, &text[2..]),
        Some(0) => (10, text),
        Some(radix) => (radix, text),
        None => (10, text),
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = text.chars().take_while(|ch| ch.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|ch| ch.to_digit(radix))
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(digit));
    if negative { -value } else { value }
}

/// `Number.prototype.toLocaleString` for the locales the dashboard uses.
/// Unknown or missing locales format as `pt-BR`.
pub(crate) fn format_locale_number(value: f64, locale: &Value, options: &Value) -> String {
    if !value.is_finite() {
        return number_to_string(value);
    }
    let english = matches!(locale, Value::Str(tag) if tag.starts_with("en"));
    let (group, decimal) = if english { (',', '.') } else { ('.', ',') };

    let option = |key: &str| -> Value {
        match options {
            Value::Object(object) => object
                .props
                .borrow()
                .get(key)
                .cloned()
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    };
    let style = option("style").to_js_string();
    let (mut min_fraction, mut max_fraction) = match style.as_str() {
        "currency" => (2, 2),
        "percent" => (0, 0),
        _ => (0, 3),
    };
    let digits = |value: Value, fallback: usize| -> usize {
        let number = value.to_number();
        if number.is_finite() && (0.0..=20.0).contains(&number) {
            number as usize
        } else {
            fallback
        }
    };
    min_fraction = digits(option("minimumFractionDigits"), min_fraction);
    max_fraction = digits(option("maximumFractionDigits"), max_fraction.max(min_fraction));
    if max_fraction < min_fraction {
        max_fraction = min_fraction;
    }

    let scaled = if style == "percent" { value * 100.0 } else { value };
    let body = group_digits(scaled.abs(), min_fraction, max_fraction, group, decimal);
    let sign = if scaled < 0.0 && body.chars().any(|ch| ch.is_ascii_digit() && ch != '0') {
        "-"
    } else {
        ""
    };

    match style.as_str() {
        "currency" => {
            let code = option("currency").to_js_string();
            let symbol = match (code.as_str(), english) {
                ("USD", true) => "$",
                ("USD", false) => "US$",
                ("EUR", _) => "€",
                ("BRL", _) | ("undefined", _) => "R$",
                (other, _) => other,
            };
            if english {
                format!("{sign}{symbol}{body}")
            } else {
                format!("{sign}{symbol} {body}")
            }
        }
        "percent" => format!("{sign}{body}%"),
        _ => format!("{sign}{body}"),
    }
}

fn group_digits(value: f64, min_fraction: usize, max_fraction: usize, group: char, decimal: char) -> String {
    let fixed = format!("{value:.max_fraction$}");
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut fraction = fraction.to_owned();
    while fraction.len() > min_fraction && fraction.ends_with('0') {
        fraction.pop();
    }

    let mut grouped = String::new();
    for (index, ch) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(group);
        }
        grouped.push(ch);
    }
    if !fraction.is_empty() {
        grouped.push(decimal);
        grouped.push_str(&fraction);
    }
    grouped
}

fn json_indent(value: &Value) -> Option<String> {
    match value {
        Value::Number(count) if *count >= 1.0 => Some(" ".repeat((*count).min(10.0) as usize)),
        Value::Str(text) if !text.is_empty() => Some(text.chars().take(10).collect()),
        _ => None,
    }
}

fn stringify(json: &serde_json::Value, indent: Option<&str>) -> Result<String, EvalError> {
    let Some(indent) = indent else {
        return serde_json::to_string(json).map_err(|e| EvalError::Runtime(e.to_string()));
    };
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(json, &mut serializer).map_err(|e| EvalError::Runtime(e.to_string()))?;
    String::from_utf8(out).map_err(|e| EvalError::Runtime(e.to_string()))
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

impl Interpreter {
    pub(super) fn call_native(
        &mut self,
        native: &NativeFunction,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        trace!(native = native.name, args = args.len(), "sandbox native call");
        let name = native.name;
        if let Some(method) = name.strip_prefix("Array.") {
            if let Value::Array(items) = &native.receiver {
                let items = Rc::clone(items);
                return self.array_call(method, &items, &native.receiver, args);
            }
        }
        if let Some(method) = name.strip_prefix("String.") {
            if let Value::Str(text) = &native.receiver {
                let text = Rc::clone(text);
                return self.string_call(method, &text, args);
            }
        }
        if let Some(method) = name.strip_prefix("Number.") {
            if let Value::Number(value) = native.receiver {
                return Ok(number_call(method, value, &args));
            }
        }
        if name.starts_with("Math.") {
            return Ok(Value::Number(match name {
                "Math.max" => args
                    .iter()
                    .map(Value::to_number)
                    .fold(f64::NEG_INFINITY, |acc, value| {
                        if acc.is_nan() || value.is_nan() { f64::NAN } else { acc.max(value) }
                    }),
                "Math.min" => args
                    .iter()
                    .map(Value::to_number)
                    .fold(f64::INFINITY, |acc, value| {
                        if acc.is_nan() || value.is_nan() { f64::NAN } else { acc.min(value) }
                    }),
                "Math.pow" => number_arg(&args, 0).powf(number_arg(&args, 1)),
                "Math.atan2" => number_arg(&args, 0).atan2(number_arg(&args, 1)),
                unary => math_unary(unary, number_arg(&args, 0)),
            }));
        }
        if let Some(level) = name.strip_prefix("console.") {
            let line = args
                .iter()
                .map(Value::to_js_string)
                .collect::<Vec<_>>()
                .join(" ");
            match level {
                "warn" | "error" => warn!(target: "dynchart::sandbox::console", method = level, "{line}"),
                _ => debug!(target: "dynchart::sandbox::console", method = level, "{line}"),
            }
            return Ok(Value::Undefined);
        }

        match name {
            "createElement" => self.create_element(args),
            "useState" => {
                let initial = arg(&args, 0);
                let value = if initial.is_callable() {
                    self.call(&initial, Vec::new())?
                } else {
                    initial
                };
                Ok(Value::array(vec![value, Value::native("setState")]))
            }
            // Charts render once; state updates and effects never run.
            "setState" | "useEffect" => Ok(Value::Undefined),
            "useMemo" => {
                let factory = arg(&args, 0);
                self.call(&factory, Vec::new())
            }
            "useCallback" => Ok(arg(&args, 0)),
            "useRef" => {
                let mut props = PropertyMap::new();
                props.insert("current".to_owned(), arg(&args, 0));
                Ok(Value::object(props))
            }
            "JSON.stringify" => {
                let indent = json_indent(&arg(&args, 2));
                match arg(&args, 0).to_json()? {
                    Some(json) => {
                        let text = stringify(&json, indent.as_deref())?;
                        self.string_value(text)
                    }
                    None => Ok(Value::Undefined),
                }
            }
            "JSON.parse" => {
                let text = arg(&args, 0).to_js_string();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| Value::from_json(&json))
                    .map_err(|e| EvalError::Runtime(format!("JSON.parse: {e}")))
            }
            "Number" => Ok(Value::Number(args.first().map_or(0.0, Value::to_number))),
            "String" => {
                let text = match args.first() {
                    Some(value) => self.js_string(value)?,
                    None => String::new(),
                };
                self.string_value(text)
            }
            "Boolean" => Ok(Value::Bool(arg(&args, 0).truthy())),
            "Object" => Ok(match arg(&args, 0) {
                value @ (Value::Object(_) | Value::Array(_)) => value,
                _ => Value::object(PropertyMap::new()),
            }),
            "Array" => {
                let length = array_length(&arg(&args, 0))?;
                self.charge(length as u64)?;
                Ok(Value::array(vec![Value::Undefined; length]))
            }
            "parseFloat" => Ok(Value::Number(parse_float_prefix(&arg(&args, 0).to_js_string()))),
            "parseInt" => {
                let radix = match arg(&args, 1) {
                    Value::Undefined => None,
                    value => Some(value.to_number() as u32),
                };
                Ok(Value::Number(parse_int_prefix(&arg(&args, 0).to_js_string(), radix)))
            }
            "isNaN" => Ok(Value::Bool(number_arg(&args, 0).is_nan())),
            "isFinite" => Ok(Value::Bool(number_arg(&args, 0).is_finite())),
            "Number.isInteger" => {
                let value = arg(&args, 0);
                Ok(Value::Bool(
                    matches!(value, Value::Number(n) if n.is_finite() && n.fract() == 0.0),
                ))
            }
            "Object.keys" | "Object.values" | "Object.entries" => {
                let entries = self.own_entries(&arg(&args, 0))?;
                Ok(Value::array(
                    entries
                        .into_iter()
                        .map(|(key, value)| match name {
                            "Object.keys" => Value::str(&key),
                            "Object.values" => value,
                            _ => Value::array(vec![Value::str(&key), value]),
                        })
                        .collect(),
                ))
            }
            "Object.fromEntries" => {
                let mut props = PropertyMap::new();
                for entry in self.iterate(&arg(&args, 0))? {
                    let key = self.get_member(&entry, "0")?.to_js_string();
                    let value = self.get_member(&entry, "1")?;
                    props.insert(key, value);
                }
                Ok(Value::object(props))
            }
            "Object.assign" => {
                let target = arg(&args, 0);
                for source in args.iter().skip(1) {
                    for (key, value) in self.own_entries(source)? {
                        self.set_member(&target, &key, value)?;
                    }
                }
                Ok(target)
            }
            "Object.freeze" => Ok(arg(&args, 0)),
            "Array.isArray" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),
            "Array.from" => {
                let source = arg(&args, 0);
                let items = match &source {
                    Value::Array(_) | Value::Str(_) => self.iterate(&source)?,
                    Value::Object(_) => {
                        let length = array_length(&self.get_member(&source, "length")?)?;
                        self.charge(length as u64)?;
                        vec![Value::Undefined; length]
                    }
                    _ => Vec::new(),
                };
                let mapper = arg(&args, 1);
                if !mapper.is_callable() {
                    return Ok(Value::array(items));
                }
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    mapped.push(self.call(&mapper, vec![item, Value::Number(index as f64)])?);
                }
                Ok(Value::array(mapped))
            }
            other => Err(EvalError::Type(format!("{other} is not a function"))),
        }
    }

    fn own_entries(&mut self, value: &Value) -> Result<Vec<(String, Value)>, EvalError> {
        let entries: Vec<(String, Value)> = match value {
            Value::Object(object) => object
                .props
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(index, value)| (index.to_string(), value.clone()))
                .collect(),
            Value::Str(_) => self
                .iterate(value)?
                .into_iter()
                .enumerate()
                .map(|(index, value)| (index.to_string(), value))
                .collect(),
            Value::Undefined | Value::Null => {
                return Err(EvalError::Type(format!(
                    "cannot convert {} to object",
                    value.describe()
                )));
            }
            _ => Vec::new(),
        };
        self.charge(entries.len() as u64)?;
        Ok(entries)
    }

    fn create_element(&mut self, args: Vec<Value>) -> Result<Value, EvalError> {
        let mut args = args.into_iter();
        let element_type = match args.next().unwrap_or(Value::Undefined) {
            Value::Str(tag) => ElementType::Intrinsic(tag),
            Value::Chart(kind) => ElementType::Chart(kind),
            Value::Fragment => ElementType::Fragment,
            Value::Function(closure) => ElementType::Component(closure),
            other => {
                return Err(EvalError::InvalidElementType {
                    found: other.describe(),
                });
            }
        };
        let mut props = match args.next().unwrap_or(Value::Null) {
            Value::Null | Value::Undefined => PropertyMap::new(),
            Value::Object(object) => object.props.borrow().clone(),
            other => {
                return Err(EvalError::Type(format!(
                    "element props must be an object, got {}",
                    other.describe()
                )));
            }
        };
        let key = props
            .shift_remove("key")
            .filter(|key| !key.is_nullish())
            .map(|key| key.to_js_string());
        let rest: Vec<Value> = args.collect();
        self.charge((props.len() + rest.len()) as u64)?;
        let explicit_children = props.shift_remove("children");
        let children = if rest.is_empty() {
            match explicit_children {
                Some(Value::Array(items)) => {
                    let items = items.borrow().clone();
                    self.charge(items.len() as u64)?;
                    items
                }
                Some(child) if !child.is_nullish() => vec![child],
                _ => Vec::new(),
            }
        } else {
            rest
        };
        Ok(Value::Element(Rc::new(Element {
            element_type,
            props,
            children,
            key,
        })))
    }

    fn array_call(
        &mut self,
        method: &str,
        items: &Rc<ArrayCell>,
        receiver: &Value,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        match method {
            "push" => {
                let mut target = items.borrow_mut();
                target.extend(args);
                return Ok(Value::Number(target.len() as f64));
            }
            "pop" => return Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
            _ => {}
        }
        let snapshot = items.borrow().clone();
        let len = snapshot.len();
        let callback = arg(&args, 0);
        let needs_callback = matches!(
            method,
            "map" | "filter" | "reduce" | "forEach" | "find" | "findIndex" | "some" | "every" | "flatMap"
        );
        if needs_callback && !callback.is_callable() {
            return Err(EvalError::Type(format!(
                "{} is not a function",
                callback.describe()
            )));
        }
        // Callback methods pay per call; everything else scans the snapshot.
        if !needs_callback {
            self.charge(len as u64)?;
        }
        let call_with = |this: &mut Self, item: &Value, index: usize| {
            this.call(
                &callback,
                vec![item.clone(), Value::Number(index as f64), receiver.clone()],
            )
        };

        match method {
            "map" => {
                let mut out = Vec::with_capacity(len);
                for (index, item) in snapshot.iter().enumerate() {
                    out.push(call_with(self, item, index)?);
                }
                Ok(Value::array(out))
            }
            "flatMap" => {
                let mut out = Vec::with_capacity(len);
                for (index, item) in snapshot.iter().enumerate() {
                    match call_with(self, item, index)? {
                        Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                self.charge(out.len() as u64)?;
                Ok(Value::array(out))
            }
            "filter" => {
                let mut out = Vec::new();
                for (index, item) in snapshot.iter().enumerate() {
                    if call_with(self, item, index)?.truthy() {
                        out.push(item.clone());
                    }
                }
                Ok(Value::array(out))
            }
            "forEach" => {
                for (index, item) in snapshot.iter().enumerate() {
                    call_with(self, item, index)?;
                }
                Ok(Value::Undefined)
            }
            "find" | "findIndex" => {
                for (index, item) in snapshot.iter().enumerate() {
                    if call_with(self, item, index)?.truthy() {
                        return Ok(if method == "find" {
                            item.clone()
                        } else {
                            Value::Number(index as f64)
                        });
                    }
                }
                Ok(if method == "find" {
                    Value::Undefined
                } else {
                    Value::Number(-1.0)
                })
            }
            "some" => {
                for (index, item) in snapshot.iter().enumerate() {
                    if call_with(self, item, index)?.truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "every" => {
                for (index, item) in snapshot.iter().enumerate() {
                    if !call_with(self, item, index)?.truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "reduce" => {
                let mut iter = snapshot.iter().enumerate();
                let mut acc = if args.len() >= 2 {
                    arg(&args, 1)
                } else {
                    match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(EvalError::Type(
                                "reduce of empty array with no initial value".to_owned(),
                            ));
                        }
                    }
                };
                for (index, item) in iter {
                    acc = self.call(
                        &callback,
                        vec![acc, item.clone(), Value::Number(index as f64), receiver.clone()],
                    )?;
                }
                Ok(acc)
            }
            "slice" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len);
                Ok(Value::array(
                    snapshot.get(start..end.max(start)).unwrap_or_default().to_vec(),
                ))
            }
            "concat" => {
                let mut out = snapshot;
                for value in args {
                    match value {
                        Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                self.charge(out.len() as u64)?;
                Ok(Value::array(out))
            }
            "join" => {
                let separator = match arg(&args, 0) {
                    Value::Undefined => ",".to_owned(),
                    value => self.js_string(&value)?,
                };
                let mut out = String::new();
                for (index, item) in snapshot.iter().enumerate() {
                    if index > 0 {
                        out.push_str(&separator);
                    }
                    if !item.is_nullish() {
                        out.push_str(&self.js_string(item)?);
                    }
                    check_string_len(out.len())?;
                }
                self.string_value(out)
            }
            "includes" => {
                let needle = arg(&args, 0);
                Ok(Value::Bool(snapshot.iter().any(|item| {
                    item.strict_equals(&needle)
                        || (matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan()))
                })))
            }
            "indexOf" => {
                let needle = arg(&args, 0);
                Ok(Value::Number(
                    snapshot
                        .iter()
                        .position(|item| item.strict_equals(&needle))
                        .map_or(-1.0, |index| index as f64),
                ))
            }
            "reverse" => {
                items.borrow_mut().reverse();
                Ok(receiver.clone())
            }
            "flat" => {
                let mut out = Vec::with_capacity(len);
                for item in snapshot {
                    match item {
                        Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                self.charge(out.len() as u64)?;
                Ok(Value::array(out))
            }
            "sort" => {
                let comparator = arg(&args, 0);
                let comparator = comparator.is_callable().then_some(comparator);
                let sorted = self.merge_sort(snapshot, comparator.as_ref())?;
                *items.borrow_mut() = sorted;
                Ok(receiver.clone())
            }
            other => Err(EvalError::Type(format!("Array.{other} is not a function"))),
        }
    }

    /// Stable merge sort that tolerates inconsistent comparators and
    /// propagates comparator errors.
    fn merge_sort(
        &mut self,
        mut items: Vec<Value>,
        comparator: Option<&Value>,
    ) -> Result<Vec<Value>, EvalError> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items, comparator)?;
        let right = self.merge_sort(right, comparator)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        loop {
            let take_right = match (left.peek(), right.peek()) {
                (Some(a), Some(b)) => self.sort_compare(b, a, comparator)? == Ordering::Less,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => break,
            };
            let next = if take_right { right.next() } else { left.next() };
            merged.extend(next);
        }
        Ok(merged)
    }

    fn sort_compare(
        &mut self,
        a: &Value,
        b: &Value,
        comparator: Option<&Value>,
    ) -> Result<Ordering, EvalError> {
        match (a, b) {
            (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
            (Value::Undefined, _) => return Ok(Ordering::Greater),
            (_, Value::Undefined) => return Ok(Ordering::Less),
            _ => {}
        }
        let Some(comparator) = comparator else {
            return Ok(a.to_js_string().cmp(&b.to_js_string()));
        };
        let result = self.call(comparator, vec![a.clone(), b.clone()])?.to_number();
        Ok(result.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
    }

    fn string_call(&mut self, method: &str, text: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        self.charge((text.len() / STRING_CHARGE_BYTES) as u64)?;
        let len = text.chars().count();
        let string_arg = |index: usize| arg(&args, index).to_js_string();
        Ok(match method {
            "toUpperCase" => Value::str(&text.to_uppercase()),
            "toLowerCase" => Value::str(&text.to_lowercase()),
            "trim" => Value::str(text.trim()),
            "toString" => Value::str(text),
            "slice" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len);
                Value::str(&char_slice(text, start, end))
            }
            "substring" => {
                let clamp = |value: Value, default: usize| match value {
                    Value::Undefined => default,
                    value => {
                        let number = value.to_number();
                        if number.is_nan() { 0 } else { number.clamp(0.0, len as f64) as usize }
                    }
                };
                let start = clamp(arg(&args, 0), 0);
                let end = clamp(arg(&args, 1), len);
                Value::str(&char_slice(text, start.min(end), start.max(end)))
            }
            "includes" => Value::Bool(text.contains(string_arg(0).as_str())),
            "startsWith" => Value::Bool(text.starts_with(string_arg(0).as_str())),
            "endsWith" => Value::Bool(text.ends_with(string_arg(0).as_str())),
            "indexOf" => Value::Number(
                text.find(string_arg(0).as_str())
                    .map_or(-1.0, |byte| text[..byte].chars().count() as f64),
            ),
            "charAt" => {
                let index = number_arg(&args, 0);
                let index = if index.is_nan() { 0 } else { index as usize };
                Value::str(&char_slice(text, index, index + 1))
            }
            "split" => match arg(&args, 0) {
                Value::Undefined => Value::array(vec![Value::str(text)]),
                separator => {
                    let separator = separator.to_js_string();
                    let parts: Vec<Value> = if separator.is_empty() {
                        self.iterate(&Value::str(text))?
                    } else {
                        text.split(separator.as_str()).map(Value::str).collect()
                    };
                    self.charge(parts.len() as u64)?;
                    Value::array(parts)
                }
            },
            "padStart" | "padEnd" => {
                let target = array_length(&arg(&args, 0)).unwrap_or(0);
                let fill = match arg(&args, 1) {
                    Value::Undefined => " ".to_owned(),
                    value => value.to_js_string(),
                };
                if target <= len || fill.is_empty() {
                    return Ok(Value::str(text));
                }
                self.charge((target - len) as u64)?;
                let padding: String = fill.chars().cycle().take(target - len).collect();
                if method == "padStart" {
                    self.string_value(format!("{padding}{text}"))?
                } else {
                    self.string_value(format!("{text}{padding}"))?
                }
            }
            "replace" => {
                let replacement = string_arg(1);
                check_string_len(text.len() + replacement.len())?;
                self.string_value(text.replacen(string_arg(0).as_str(), &replacement, 1))?
            }
            "replaceAll" => {
                let pattern = string_arg(0);
                let replacement = string_arg(1);
                let hits = if pattern.is_empty() {
                    len + 1
                } else {
                    text.matches(pattern.as_str()).count()
                };
                check_string_len(text.len().saturating_add(hits.saturating_mul(replacement.len())))?;
                self.string_value(text.replace(pattern.as_str(), &replacement))?
            }
            "repeat" => {
                let count = array_length(&arg(&args, 0))?;
                check_string_len(count.saturating_mul(text.len()))?;
                self.charge(count.saturating_mul(len) as u64)?;
                Value::str(&text.repeat(count))
            }
            "localeCompare" => Value::Number(match text.cmp(string_arg(0).as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            }),
            other => return Err(EvalError::Type(format!("String.{other} is not a function"))),
        })
    }
}

fn number_call(method: &str, value: f64, args: &[Value]) -> Value {
    match method {
        "toFixed" => {
            let digits = number_arg(args, 0);
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            if !value.is_finite() {
                return Value::str(&number_to_string(value));
            }
            Value::str(&format!("{value:.digits$}"))
        }
        "toLocaleString" => Value::str(&format_locale_number(value, &arg(args, 0), &arg(args, 1))),
        _ => {
            let radix = number_arg(args, 0);
            if radix.is_nan() || radix == 10.0 || value.fract() != 0.0 || !value.is_finite() {
                return Value::str(&number_to_string(value));
            }
            let radix = radix.clamp(2.0, 36.0) as u32;
            let mut magnitude = value.abs() as u64;
            let mut digits = Vec::new();
            loop {
                let digit = (magnitude % u64::from(radix)) as u32;
                digits.push(char::from_digit(digit, radix).unwrap_or('0'));
                magnitude /= u64::from(radix);
                if magnitude == 0 {
                    break;
                }
            }
            if value < 0.0 {
                digits.push('-');
            }
            Value::str(&digits.into_iter().rev().collect::<String>())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalLimits;

    fn eval(source: &str) -> Value {
        Interpreter::new("React", "Recharts", EvalLimits::default())
            .run_program(source)
            .expect("program runs")
    }

    fn text(source: &str) -> String {
        eval(source).to_js_string()
    }

    #[test]
    fn array_pipeline_methods() {
        assert_eq!(
            text("[3, 1, 2].map(x => x * 2).filter(x => x > 2).join('-')"),
            "6-4"
        );
        assert_eq!(text("[1, 2, 3, 4].reduce((a, b) => a + b, 0)"), "10");
        assert_eq!(text("[10, 9, 1].sort()"), "1,10,9");
        assert_eq!(text("[10, 9, 1].sort((a, b) => a - b)"), "1,9,10");
        assert_eq!(text("[1, 2, 3].slice(-2)"), "2,3");
        assert_eq!(text("[[1], [2, 3]].flat().includes(3)"), "true");
    }

    #[test]
    fn sort_survives_inconsistent_comparators() {
        assert_eq!(text("[5, 3, 4, 1, 2].sort(() => 1).length"), "5");
    }

    #[test]
    fn object_helpers() {
        assert_eq!(text("Object.keys({ a: 1, b: 2 }).join()"), "a,b");
        assert_eq!(
            text("Object.entries({ a: 1 }).map(([k, v]) => k + v).join()"),
            "a1"
        );
        assert_eq!(text("JSON.stringify({ a: [1, 'x'], f: () => 1 })"), r#"{"a":[1,"x"]}"#);
    }

    #[test]
    fn math_is_pure_and_random_is_absent() {
        assert_eq!(text("Math.max(1, 5, 3) + Math.round(2.5)"), "8");
        assert_eq!(text("typeof Math.random"), "undefined");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(text("(1234.5).toFixed(2)"), "1234.50");
        assert_eq!(text("(1234567.891).toLocaleString('pt-BR')"), "1.234.567,891");
        assert_eq!(
            text("(1234.5).toLocaleString('pt-BR', { style: 'currency', currency: 'BRL' })"),
            "R$ 1.234,50"
        );
        assert_eq!(text("(0.256).toLocaleString('en-US', { style: 'percent' })"), "26%");
        assert_eq!(text("(255).toString(16)"), "ff");
        assert_eq!(text("parseFloat('12.5px') + parseInt('08')"), "20.5");
    }

    #[test]
    fn string_methods() {
        assert_eq!(text("'Janeiro'.slice(0, 3).toUpperCase()"), "JAN");
        assert_eq!(text("'a,b,c'.split(',').length"), "3");
        assert_eq!(text("'7'.padStart(3, '0')"), "007");
    }

    #[test]
    fn create_element_collects_children_and_key() {
        let value = eval("React.createElement('div', { key: 1, id: 'x' }, 'a', 'b')");
        let Value::Element(element) = value else {
            panic!("expected element");
        };
        assert_eq!(element.key.as_deref(), Some("1"));
        assert_eq!(element.children.len(), 2);
        assert!(element.props.contains_key("id"));
        assert!(!element.props.contains_key("key"));
    }

    #[test]
    fn unknown_namespace_members_are_invalid_element_types() {
        let err = Interpreter::new("React", "Recharts", EvalLimits::default())
            .run_program("React.createElement(Recharts.ScatterChartX, null)")
            .expect_err("invalid type");
        assert_eq!(
            err,
            EvalError::InvalidElementType {
                found: "undefined".to_owned()
            }
        );
    }

    #[test]
    fn hooks_render_once_with_initial_values() {
        assert_eq!(
            text("const [v, setV] = React.useState(() => 4); setV(9); v + React.useMemo(() => 1, [])"),
            "5"
        );
    }
}
