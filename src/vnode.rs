//! Runtime values and virtual nodes.
//!
//! A vnode is a plain object `{ tag, props, children }`. `tag` is a string, the Fragment
//! symbol, or a component function. [`create_element`] is the native node constructor the
//! transformed code calls through `h`/`createElement`.

use crate::error::BuildError;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// `Symbol.for` key of the Fragment marker.
pub const FRAGMENT_KEY: &str = "ono.fragment";

pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// Registered symbol; two symbols are equal when their keys are.
    Symbol(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<dyn Callable>),
}

pub trait Callable {
    fn name(&self) -> &str;

    fn call(&self, this: &Value, args: Vec<Value>) -> JsResult<Value>;

    /// Static members, e.g. `Object.keys`.
    fn property(&self, _key: &str) -> Option<Value> {
        None
    }

    /// `new` allocates a fresh `this` only for constructors; other callables act as factories.
    fn is_constructor(&self) -> bool {
        false
    }
}

/// A value thrown by evaluated code, or by a native on its behalf.
#[derive(Debug, Clone)]
pub struct Thrown(pub Value);

pub type JsResult<T> = Result<T, Thrown>;

impl Thrown {
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Thrown(Value::error(name, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::error("ReferenceError", message)
    }

    pub fn message(&self) -> String {
        match &self.0 {
            Value::Object(obj) => {
                let obj = obj.borrow();
                let name = obj.get("name").map(Value::to_js_string);
                let message = obj.get("message").map(Value::to_js_string);
                match (name, message) {
                    (Some(n), Some(m)) if !m.is_empty() => format!("{}: {}", n, m),
                    (Some(n), _) => n,
                    (None, Some(m)) => m,
                    (None, None) => "[object Object]".to_string(),
                }
            }
            other => other.to_js_string(),
        }
    }
}

impl From<Thrown> for BuildError {
    fn from(thrown: Thrown) -> Self {
        BuildError::evaluation(format!("Uncaught {}", thrown.message()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NATIVE FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

pub type NativeFn = fn(&Value, &[Value]) -> JsResult<Value>;

pub struct NativeFunction {
    name: &'static str,
    func: NativeFn,
    statics: Vec<(&'static str, Value)>,
}

impl NativeFunction {
    pub fn value(name: &'static str, func: NativeFn) -> Value {
        Value::Function(Rc::new(NativeFunction {
            name,
            func,
            statics: Vec::new(),
        }))
    }

    pub fn with_statics(name: &'static str, func: NativeFn, statics: Vec<(&'static str, Value)>) -> Value {
        Value::Function(Rc::new(NativeFunction { name, func, statics }))
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, this: &Value, args: Vec<Value>) -> JsResult<Value> {
        (self.func)(this, &args)
    }

    fn property(&self, key: &str) -> Option<Value> {
        self.statics
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, v)| v.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE
// ═══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn empty_object() -> Value {
        Value::object(IndexMap::new())
    }

    pub fn fragment() -> Value {
        Value::Symbol(Rc::from(FRAGMENT_KEY))
    }

    pub fn error(name: &str, message: impl Into<String>) -> Value {
        let mut entries = IndexMap::new();
        entries.insert("name".to_string(), Value::string(name));
        entries.insert("message".to_string(), Value::string(message.into()));
        Value::object(entries)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, Value::Symbol(key) if &**key == FRAGMENT_KEY)
    }

    pub fn as_function(&self) -> Option<&Rc<dyn Callable>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Own property of an object, or `None` for anything else.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.borrow().get(key).cloned(),
            _ => None,
        }
    }

    pub fn is_vnode(&self) -> bool {
        match self {
            Value::Object(obj) => obj.borrow().contains_key("tag"),
            _ => false,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// `String(value)`.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Symbol(key) => format!("Symbol({})", key),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_)) => {
                Value::string(self.to_js_string()).loose_equals(other)
            }
            (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::string(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// Structural conversion used by `JSON.stringify`; functions and `undefined` are dropped.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Undefined | Value::Function(_) | Value::Symbol(_) => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(|num| {
                        if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                            serde_json::Value::from(*n as i64)
                        } else {
                            serde_json::Value::Number(num)
                        }
                    })
                    .unwrap_or(serde_json::Value::Null),
            ),
            Value::String(s) => Some(serde_json::Value::String(s.to_string())),
            Value::Array(items) => Some(serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_json().unwrap_or(serde_json::Value::Null))
                    .collect(),
            )),
            Value::Object(obj) => {
                let mut map = serde_json::Map::new();
                for (k, v) in obj.borrow().iter() {
                    if let Some(json) = v.to_json() {
                        map.insert(k.clone(), json);
                    }
                }
                Some(serde_json::Value::Object(map))
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(obj) => f.debug_map().entries(obj.borrow().iter()).finish(),
            Value::Function(func) => write!(f, "[Function {}]", func.name()),
            Value::Symbol(key) => write!(f, "Symbol({})", key),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

/// `Number.prototype.toString()` for base 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    if n.fract() == 0.0 {
        return format!("{:.0}", n);
    }
    format!("{}", n)
}

pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t.chars().any(|c| c.is_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => t.parse::<f64>().unwrap_or(f64::NAN),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// `h(tag, props, ...children)`.
pub fn create_element(args: &[Value]) -> Value {
    let tag = args.first().cloned().unwrap_or_default();
    let props = match args.get(1) {
        Some(p @ Value::Object(_)) => p.clone(),
        _ => Value::empty_object(),
    };
    let mut children = Vec::new();
    flatten_children(args.get(2..).unwrap_or(&[]), &mut children);

    let mut node = IndexMap::new();
    node.insert("tag".to_string(), tag);
    node.insert("props".to_string(), props);
    node.insert("children".to_string(), Value::array(children));
    Value::object(node)
}

/// Nested arrays are flattened; `null`, `undefined` and booleans are dropped.
pub fn flatten_children(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Undefined | Value::Null | Value::Bool(_) => {}
            Value::Array(nested) => flatten_children(&nested.borrow(), out),
            other => out.push(other.clone()),
        }
    }
}

fn native_h(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(create_element(args))
}

/// The node constructor as a callable value, bound under the configured factory name.
pub fn h_function() -> Value {
    NativeFunction::value("h", native_h)
}
