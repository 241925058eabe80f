//! Global environment and prototype method tables for the page evaluator.

use super::interp::{iterate, own_keys, property_key, spread_into, Realm, ScopeId};
use crate::vnode::{h_function, number_to_string, Callable, JsResult, NativeFn, NativeFunction, Thrown, Value};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn callback(args: &[Value], i: usize) -> JsResult<Rc<dyn Callable>> {
    match args.get(i) {
        Some(Value::Function(f)) => Ok(f.clone()),
        other => Err(Thrown::type_error(format!(
            "{} is not a function",
            other.map(Value::to_js_string).unwrap_or_else(|| "undefined".to_string())
        ))),
    }
}

/// Resolves a possibly negative index against `len`, clamped to `0..=len`.
fn relative(index: &Value, len: usize, default: usize) -> usize {
    if matches!(index, Value::Undefined) {
        return default;
    }
    let n = index.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

/// Arrays are dense, so lengths past this throw instead of allocating.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;
/// Longest string (in bytes) an operation may produce.
pub const MAX_STRING_LENGTH: usize = 1 << 26;

/// Checks a script-supplied array length.
pub fn array_length(n: f64) -> JsResult<usize> {
    if n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
        return Err(Thrown::error("RangeError", "Invalid array length"));
    }
    Ok(n as usize)
}

/// Fails when a string of `len` bytes would be too long to build.
pub fn check_string_length(len: f64) -> JsResult<()> {
    if len > MAX_STRING_LENGTH as f64 {
        return Err(Thrown::error("RangeError", "Invalid string length"));
    }
    Ok(())
}

pub fn install_globals(realm: &Realm, scope: ScopeId, factory: &str, fragment: &str) {
    let define = |name: &str, value: Value| realm.declare(scope, name, value, false);

    define("undefined", Value::Undefined);
    define("NaN", Value::Number(f64::NAN));
    define("Infinity", Value::Number(f64::INFINITY));

    define("h", h_function());
    define("createElement", h_function());
    define("Fragment", Value::fragment());
    define(factory, h_function());
    define(fragment, Value::fragment());

    define("console", console());
    define("Math", math());
    define("JSON", json());
    define("Object", NativeFunction::with_statics("Object", object_ctor, object_statics()));
    define("Array", NativeFunction::with_statics("Array", array_ctor, array_statics()));
    define("String", NativeFunction::with_statics("String", string_ctor, string_statics()));
    define("Number", NativeFunction::with_statics("Number", number_ctor, number_statics()));
    define("Boolean", NativeFunction::value("Boolean", boolean_ctor));
    define("Symbol", NativeFunction::with_statics("Symbol", symbol_ctor, symbol_statics()));
    define("Promise", NativeFunction::with_statics("Promise", promise_ctor, promise_statics()));
    define("parseInt", NativeFunction::value("parseInt", parse_int));
    define("parseFloat", NativeFunction::value("parseFloat", parse_float));
    define("isNaN", NativeFunction::value("isNaN", global_is_nan));
    define("isFinite", NativeFunction::value("isFinite", global_is_finite));
    define("encodeURIComponent", NativeFunction::value("encodeURIComponent", encode_uri_component));
    define("Error", NativeFunction::value("Error", error_ctor));
    define("TypeError", NativeFunction::value("TypeError", type_error_ctor));
    define("RangeError", NativeFunction::value("RangeError", range_error_ctor));
    define("SyntaxError", NativeFunction::value("SyntaxError", syntax_error_ctor));
}

/// `value instanceof <constructor named name>`.
pub fn instance_of(value: &Value, name: &str) -> bool {
    match name {
        "Array" => matches!(value, Value::Array(_)),
        "Object" => matches!(value, Value::Array(_) | Value::Object(_) | Value::Function(_)),
        "Function" => matches!(value, Value::Function(_)),
        "Error" => value
            .get("name")
            .map(|n| n.to_js_string().ends_with("Error"))
            .unwrap_or(false),
        "TypeError" | "RangeError" | "SyntaxError" | "ReferenceError" => value
            .get("name")
            .map(|n| n.to_js_string() == name)
            .unwrap_or(false),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMESPACE OBJECTS
// ═══════════════════════════════════════════════════════════════════════════════

fn namespace(members: Vec<(&'static str, Value)>) -> Value {
    Value::object(members.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn console_log(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let line = args.iter().map(Value::to_js_string).collect::<Vec<_>>().join(" ");
    debug!(target: "ono::console", "{}", line);
    Ok(Value::Undefined)
}

fn console() -> Value {
    namespace(
        ["log", "info", "warn", "error", "debug"]
            .into_iter()
            .map(|name| (name, NativeFunction::value(name, console_log)))
            .collect(),
    )
}

fn math() -> Value {
    fn unary(name: &'static str, f: NativeFn) -> (&'static str, Value) {
        (name, NativeFunction::value(name, f))
    }
    fn num(args: &[Value], i: usize) -> f64 {
        arg(args, i).to_number()
    }
    macro_rules! math_fn {
        ($name:literal, |$x:ident| $body:expr) => {
            unary($name, |_this, args| {
                let $x = num(args, 0);
                Ok(Value::Number($body))
            })
        };
    }
    namespace(vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        math_fn!("abs", |x| x.abs()),
        math_fn!("floor", |x| x.floor()),
        math_fn!("ceil", |x| x.ceil()),
        math_fn!("round", |x| (x + 0.5).floor()),
        math_fn!("trunc", |x| x.trunc()),
        math_fn!("sign", |x| if x.is_nan() || x == 0.0 { x } else { x.signum() }),
        math_fn!("sqrt", |x| x.sqrt()),
        math_fn!("log", |x| x.ln()),
        math_fn!("exp", |x| x.exp()),
        unary("pow", |_this, args| Ok(Value::Number(num(args, 0).powf(num(args, 1))))),
        unary("min", |_this, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else {
                    acc.min(n)
                }
            })))
        }),
        unary("max", |_this, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else {
                    acc.max(n)
                }
            })))
        }),
    ])
}

fn json_stringify(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let Some(json) = arg(args, 0).to_json() else {
        return Ok(Value::Undefined);
    };
    let pretty = arg(args, 2).is_truthy();
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Value::string)
        .map_err(|e| Thrown::type_error(e.to_string()))
}

fn json_parse(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let text = arg(args, 0).to_js_string();
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|json| Value::from_json(&json))
        .map_err(|e| Thrown::error("SyntaxError", e.to_string()))
}

fn json() -> Value {
    namespace(vec![
        ("stringify", NativeFunction::value("stringify", json_stringify)),
        ("parse", NativeFunction::value("parse", json_parse)),
    ])
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTORS & STATICS
// ═══════════════════════════════════════════════════════════════════════════════

fn object_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(match arg(args, 0) {
        v @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => v,
        _ => Value::empty_object(),
    })
}

fn object_statics() -> Vec<(&'static str, Value)> {
    fn keys(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::array(own_keys(&arg(args, 0)).into_iter().map(Value::string).collect()))
    }
    fn values(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let mut entries = IndexMap::new();
        spread_into(&arg(args, 0), &mut entries);
        Ok(Value::array(entries.into_values().collect()))
    }
    fn entries(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let mut entries = IndexMap::new();
        spread_into(&arg(args, 0), &mut entries);
        Ok(Value::array(
            entries
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::string(k), v]))
                .collect(),
        ))
    }
    fn assign(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let target = arg(args, 0);
        let Value::Object(obj) = &target else {
            return Err(Thrown::type_error("Cannot convert undefined or null to object"));
        };
        for source in args.iter().skip(1) {
            let mut entries = IndexMap::new();
            spread_into(source, &mut entries);
            obj.borrow_mut().extend(entries);
        }
        Ok(target)
    }
    fn from_entries(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let mut entries = IndexMap::new();
        for pair in iterate(&arg(args, 0))? {
            let key = match &pair {
                Value::Array(items) => items.borrow().first().cloned().unwrap_or_default(),
                _ => Value::Undefined,
            };
            let value = match &pair {
                Value::Array(items) => items.borrow().get(1).cloned().unwrap_or_default(),
                _ => Value::Undefined,
            };
            entries.insert(property_key(&key), value);
        }
        Ok(Value::object(entries))
    }
    fn freeze(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(arg(args, 0))
    }
    vec![
        ("keys", NativeFunction::value("keys", keys)),
        ("values", NativeFunction::value("values", values)),
        ("entries", NativeFunction::value("entries", entries)),
        ("assign", NativeFunction::value("assign", assign)),
        ("fromEntries", NativeFunction::value("fromEntries", from_entries)),
        ("freeze", NativeFunction::value("freeze", freeze)),
    ]
}

fn array_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    match args {
        [Value::Number(n)] => Ok(Value::array(vec![Value::Undefined; array_length(*n)?])),
        _ => Ok(Value::array(args.to_vec())),
    }
}

fn array_statics() -> Vec<(&'static str, Value)> {
    fn is_array(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
    }
    fn from(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let source = arg(args, 0);
        let items = match &source {
            Value::Object(_) => {
                let len = source.get("length").map(|v| v.to_number()).unwrap_or(0.0);
                let len = if len.is_nan() || len <= 0.0 { 0 } else { array_length(len.trunc())? };
                (0..len)
                    .map(|i| source.get(&i.to_string()).unwrap_or_default())
                    .collect()
            }
            other => iterate(other)?,
        };
        match args.get(1) {
            Some(Value::Function(map)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(map.call(&Value::Undefined, vec![item, Value::Number(i as f64)])?);
                }
                Ok(Value::array(out))
            }
            _ => Ok(Value::array(items)),
        }
    }
    fn of(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::array(args.to_vec()))
    }
    vec![
        ("isArray", NativeFunction::value("isArray", is_array)),
        ("from", NativeFunction::value("from", from)),
        ("of", NativeFunction::value("of", of)),
    ]
}

fn string_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(match args.first() {
        None => Value::string(""),
        Some(v) => Value::string(v.to_js_string()),
    })
}

fn string_statics() -> Vec<(&'static str, Value)> {
    fn from_char_code(_this: &Value, args: &[Value]) -> JsResult<Value> {
        let s: String = args
            .iter()
            .filter_map(|v| char::from_u32(u32::from(v.to_number() as u16)))
            .collect();
        Ok(Value::string(s))
    }
    vec![("fromCharCode", NativeFunction::value("fromCharCode", from_char_code))]
}

fn number_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)))
}

fn number_statics() -> Vec<(&'static str, Value)> {
    fn is_integer(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
    }
    fn is_finite(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
    }
    fn is_nan(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
    }
    vec![
        ("isInteger", NativeFunction::value("isInteger", is_integer)),
        ("isFinite", NativeFunction::value("isFinite", is_finite)),
        ("isNaN", NativeFunction::value("isNaN", is_nan)),
        ("parseFloat", NativeFunction::value("parseFloat", parse_float)),
        ("parseInt", NativeFunction::value("parseInt", parse_int)),
        ("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0)),
    ]
}

fn boolean_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Bool(arg(args, 0).is_truthy()))
}

fn symbol_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let description = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_js_string(),
    };
    Ok(Value::Symbol(Rc::from(description)))
}

fn symbol_statics() -> Vec<(&'static str, Value)> {
    vec![("for", NativeFunction::value("for", symbol_ctor))]
}

fn promise_ctor(_this: &Value, _args: &[Value]) -> JsResult<Value> {
    Err(Thrown::type_error("Promise construction is not supported during static rendering"))
}

fn promise_statics() -> Vec<(&'static str, Value)> {
    fn resolve(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(arg(args, 0))
    }
    fn all(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Ok(Value::array(iterate(&arg(args, 0))?))
    }
    fn reject(_this: &Value, args: &[Value]) -> JsResult<Value> {
        Err(Thrown(arg(args, 0)))
    }
    vec![
        ("resolve", NativeFunction::value("resolve", resolve)),
        ("all", NativeFunction::value("all", all)),
        ("reject", NativeFunction::value("reject", reject)),
    ]
}

fn parse_int(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let text = arg(args, 0).to_js_string();
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let mut radix = match arg(args, 1) {
        Value::Undefined => 10,
        r => r.to_number() as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if (radix == 10 || radix == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    Ok(Value::Number(if negative { -value } else { value }))
}

fn parse_float(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let text = arg(args, 0).to_js_string();
    let s = text.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return Ok(Value::Number(f64::INFINITY));
        }
    }
    if s.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }
    // Longest prefix that still parses.
    let mut best = f64::NAN;
    for (i, c) in s.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
            break;
        }
        if let Ok(n) = s[..i + c.len_utf8()].parse::<f64>() {
            best = n;
        }
    }
    Ok(Value::Number(best))
}

fn global_is_nan(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Bool(arg(args, 0).to_number().is_nan()))
}

fn global_is_finite(_this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Bool(arg(args, 0).to_number().is_finite()))
}

fn encode_uri_component(_this: &Value, args: &[Value]) -> JsResult<Value> {
    let text = arg(args, 0).to_js_string();
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    Ok(Value::string(out))
}

fn make_error(name: &str, args: &[Value]) -> JsResult<Value> {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_js_string(),
    };
    Ok(Value::error(name, message))
}

fn error_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    make_error("Error", args)
}

fn type_error_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    make_error("TypeError", args)
}

fn range_error_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    make_error("RangeError", args)
}

fn syntax_error_ctor(_this: &Value, args: &[Value]) -> JsResult<Value> {
    make_error("SyntaxError", args)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARRAY METHODS
// ═══════════════════════════════════════════════════════════════════════════════

fn this_items(this: &Value) -> JsResult<Vec<Value>> {
    match this {
        Value::Array(items) => Ok(items.borrow().clone()),
        other => Err(Thrown::type_error(format!("{} is not an array", other.to_js_string()))),
    }
}

fn with_array<T>(this: &Value, f: impl FnOnce(&mut Vec<Value>) -> T) -> JsResult<T> {
    match this {
        Value::Array(items) => Ok(f(&mut items.borrow_mut())),
        other => Err(Thrown::type_error(format!("{} is not an array", other.to_js_string()))),
    }
}

/// Calls `f(item, index, array)` for each element.
fn each(this: &Value, args: &[Value], mut visit: impl FnMut(usize, Value, Value) -> JsResult<bool>) -> JsResult<()> {
    let f = callback(args, 0)?;
    for (i, item) in this_items(this)?.into_iter().enumerate() {
        let result = f.call(&arg(args, 1), vec![item.clone(), Value::Number(i as f64), this.clone()])?;
        if !visit(i, item, result)? {
            break;
        }
    }
    Ok(())
}

fn array_map(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut out = Vec::new();
    each(this, args, |_, _, r| {
        out.push(r);
        Ok(true)
    })?;
    Ok(Value::array(out))
}

fn array_filter(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut out = Vec::new();
    each(this, args, |_, item, r| {
        if r.is_truthy() {
            out.push(item);
        }
        Ok(true)
    })?;
    Ok(Value::array(out))
}

fn array_for_each(this: &Value, args: &[Value]) -> JsResult<Value> {
    each(this, args, |_, _, _| Ok(true))?;
    Ok(Value::Undefined)
}

fn array_find(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut found = Value::Undefined;
    each(this, args, |_, item, r| {
        if r.is_truthy() {
            found = item;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(found)
}

fn array_find_index(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut found = -1.0;
    each(this, args, |i, _, r| {
        if r.is_truthy() {
            found = i as f64;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(Value::Number(found))
}

fn array_some(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut any = false;
    each(this, args, |_, _, r| {
        any = r.is_truthy();
        Ok(!any)
    })?;
    Ok(Value::Bool(any))
}

fn array_every(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut all = true;
    each(this, args, |_, _, r| {
        all = r.is_truthy();
        Ok(all)
    })?;
    Ok(Value::Bool(all))
}

fn array_reduce(this: &Value, args: &[Value]) -> JsResult<Value> {
    let f = callback(args, 0)?;
    let items = this_items(this)?;
    let mut iter = items.into_iter().enumerate();
    let mut acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match iter.next() {
            Some((_, first)) => first,
            None => return Err(Thrown::type_error("Reduce of empty array with no initial value")),
        },
    };
    for (i, item) in iter {
        acc = f.call(&Value::Undefined, vec![acc, item, Value::Number(i as f64), this.clone()])?;
    }
    Ok(acc)
}

fn array_includes(this: &Value, args: &[Value]) -> JsResult<Value> {
    let needle = arg(args, 0);
    Ok(Value::Bool(this_items(this)?.iter().any(|v| same_value_zero(v, &needle))))
}

fn array_index_of(this: &Value, args: &[Value]) -> JsResult<Value> {
    let needle = arg(args, 0);
    let items = this_items(this)?;
    let start = relative(&arg(args, 1), items.len(), 0);
    Ok(Value::Number(
        items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, v)| v.strict_equals(&needle))
            .map(|(i, _)| i as f64)
            .unwrap_or(-1.0),
    ))
}

fn array_last_index_of(this: &Value, args: &[Value]) -> JsResult<Value> {
    let needle = arg(args, 0);
    Ok(Value::Number(
        this_items(this)?
            .iter()
            .rposition(|v| v.strict_equals(&needle))
            .map(|i| i as f64)
            .unwrap_or(-1.0),
    ))
}

fn array_join(this: &Value, args: &[Value]) -> JsResult<Value> {
    let sep = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => other.to_js_string(),
    };
    let parts: Vec<String> = this_items(this)?
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
        .collect();
    Ok(Value::string(parts.join(&sep)))
}

fn array_to_string(this: &Value, _args: &[Value]) -> JsResult<Value> {
    array_join(this, &[])
}

fn array_slice(this: &Value, args: &[Value]) -> JsResult<Value> {
    let items = this_items(this)?;
    let start = relative(&arg(args, 0), items.len(), 0);
    let end = relative(&arg(args, 1), items.len(), items.len());
    Ok(Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
}

fn array_concat(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut items = this_items(this)?;
    for extra in args {
        match extra {
            Value::Array(more) => items.extend(more.borrow().iter().cloned()),
            other => items.push(other.clone()),
        }
    }
    Ok(Value::array(items))
}

fn flatten_depth(items: Vec<Value>, depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(nested) if depth >= 1.0 => {
                let nested = nested.borrow().clone();
                flatten_depth(nested, depth - 1.0, out)
            }
            other => out.push(other),
        }
    }
}

fn array_flat(this: &Value, args: &[Value]) -> JsResult<Value> {
    let depth = match arg(args, 0) {
        Value::Undefined => 1.0,
        d => d.to_number(),
    };
    let mut out = Vec::new();
    flatten_depth(this_items(this)?, depth, &mut out);
    Ok(Value::array(out))
}

fn array_flat_map(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mapped = this_items(&array_map(this, args)?)?;
    let mut out = Vec::new();
    flatten_depth(mapped, 1.0, &mut out);
    Ok(Value::array(out))
}

fn array_push(this: &Value, args: &[Value]) -> JsResult<Value> {
    with_array(this, |items| {
        items.extend(args.iter().cloned());
        Value::Number(items.len() as f64)
    })
}

fn array_pop(this: &Value, _args: &[Value]) -> JsResult<Value> {
    with_array(this, |items| items.pop().unwrap_or_default())
}

fn array_shift(this: &Value, _args: &[Value]) -> JsResult<Value> {
    with_array(this, |items| if items.is_empty() { Value::Undefined } else { items.remove(0) })
}

fn array_unshift(this: &Value, args: &[Value]) -> JsResult<Value> {
    with_array(this, |items| {
        items.splice(0..0, args.iter().cloned());
        Value::Number(items.len() as f64)
    })
}

fn array_reverse(this: &Value, _args: &[Value]) -> JsResult<Value> {
    with_array(this, |items| items.reverse())?;
    Ok(this.clone())
}

fn array_fill(this: &Value, args: &[Value]) -> JsResult<Value> {
    let value = arg(args, 0);
    with_array(this, |items| {
        let len = items.len();
        let start = relative(&arg(args, 1), len, 0);
        let end = relative(&arg(args, 2), len, len);
        for item in items.iter_mut().take(end).skip(start) {
            *item = value.clone();
        }
    })?;
    Ok(this.clone())
}

fn array_at(this: &Value, args: &[Value]) -> JsResult<Value> {
    let items = this_items(this)?;
    let n = arg(args, 0).to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { items.len() as f64 + n } else { n };
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    Ok(items.get(index as usize).cloned().unwrap_or_default())
}

/// Stable merge sort with a comparator that may throw.
fn merge_sort(items: Vec<Value>, less_or_equal: &dyn Fn(&Value, &Value) -> JsResult<bool>) -> JsResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, less_or_equal)?;
    let right = merge_sort(right, less_or_equal)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if less_or_equal(l, r)? {
            out.extend(left.next());
        } else {
            out.extend(right.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn array_sort(this: &Value, args: &[Value]) -> JsResult<Value> {
    let items = this_items(this)?;
    let (mut defined, undefined): (Vec<Value>, Vec<Value>) =
        items.into_iter().partition(|v| !matches!(v, Value::Undefined));
    defined = match args.first() {
        Some(Value::Function(cmp)) => merge_sort(defined, &|a, b| {
            let order = cmp.call(&Value::Undefined, vec![a.clone(), b.clone()])?.to_number();
            Ok(order.is_nan() || order <= 0.0)
        })?,
        _ => merge_sort(defined, &|a, b| Ok(a.to_js_string() <= b.to_js_string()))?,
    };
    defined.extend(undefined);
    with_array(this, |items| *items = defined)?;
    Ok(this.clone())
}

pub fn array_method(key: &str) -> Option<Value> {
    let (name, func): (&'static str, NativeFn) = match key {
        "map" => ("map", array_map),
        "filter" => ("filter", array_filter),
        "forEach" => ("forEach", array_for_each),
        "reduce" => ("reduce", array_reduce),
        "find" => ("find", array_find),
        "findIndex" => ("findIndex", array_find_index),
        "some" => ("some", array_some),
        "every" => ("every", array_every),
        "includes" => ("includes", array_includes),
        "indexOf" => ("indexOf", array_index_of),
        "lastIndexOf" => ("lastIndexOf", array_last_index_of),
        "join" => ("join", array_join),
        "slice" => ("slice", array_slice),
        "concat" => ("concat", array_concat),
        "flat" => ("flat", array_flat),
        "flatMap" => ("flatMap", array_flat_map),
        "push" => ("push", array_push),
        "pop" => ("pop", array_pop),
        "shift" => ("shift", array_shift),
        "unshift" => ("unshift", array_unshift),
        "reverse" => ("reverse", array_reverse),
        "sort" => ("sort", array_sort),
        "at" => ("at", array_at),
        "fill" => ("fill", array_fill),
        "toString" => ("toString", array_to_string),
        _ => return None,
    };
    Some(NativeFunction::value(name, func))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRING METHODS
// ═══════════════════════════════════════════════════════════════════════════════

fn this_string(this: &Value) -> String {
    this.to_js_string()
}

fn chars(this: &Value) -> Vec<char> {
    this_string(this).chars().collect()
}

fn char_slice(chars: &[char], start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect()
}

/// Char index of `needle` in `hay` at or after `from`.
fn find_chars(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(hay.len()));
    }
    (from..hay.len().saturating_sub(needle.len() - 1)).find(|&i| hay[i..i + needle.len()] == *needle)
}

fn string_simple(this: &Value, f: impl FnOnce(&str) -> String) -> JsResult<Value> {
    Ok(Value::string(f(&this_string(this))))
}

fn string_upper(this: &Value, _args: &[Value]) -> JsResult<Value> {
    string_simple(this, str::to_uppercase)
}

fn string_lower(this: &Value, _args: &[Value]) -> JsResult<Value> {
    string_simple(this, str::to_lowercase)
}

fn string_trim(this: &Value, _args: &[Value]) -> JsResult<Value> {
    string_simple(this, |s| s.trim().to_string())
}

fn string_trim_start(this: &Value, _args: &[Value]) -> JsResult<Value> {
    string_simple(this, |s| s.trim_start().to_string())
}

fn string_trim_end(this: &Value, _args: &[Value]) -> JsResult<Value> {
    string_simple(this, |s| s.trim_end().to_string())
}

fn string_split(this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(this);
    let limit = match arg(args, 1) {
        Value::Undefined => usize::MAX,
        l => l.to_number().max(0.0) as usize,
    };
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => vec![Value::string(&s)],
        sep => {
            let sep = sep.to_js_string();
            if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            }
        }
    };
    Ok(Value::array(parts.into_iter().take(limit).collect()))
}

fn string_includes(this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Bool(this_string(this).contains(arg(args, 0).to_js_string().as_str())))
}

fn string_starts_with(this: &Value, args: &[Value]) -> JsResult<Value> {
    let c = chars(this);
    let start = relative(&arg(args, 1), c.len(), 0);
    let rest: String = c[start..].iter().collect();
    Ok(Value::Bool(rest.starts_with(arg(args, 0).to_js_string().as_str())))
}

fn string_ends_with(this: &Value, args: &[Value]) -> JsResult<Value> {
    let c = chars(this);
    let end = relative(&arg(args, 1), c.len(), c.len());
    let head: String = c[..end].iter().collect();
    Ok(Value::Bool(head.ends_with(arg(args, 0).to_js_string().as_str())))
}

fn string_index_of(this: &Value, args: &[Value]) -> JsResult<Value> {
    let hay = chars(this);
    let needle: Vec<char> = arg(args, 0).to_js_string().chars().collect();
    let from = relative(&arg(args, 1), hay.len(), 0);
    Ok(Value::Number(find_chars(&hay, &needle, from).map(|i| i as f64).unwrap_or(-1.0)))
}

fn string_last_index_of(this: &Value, args: &[Value]) -> JsResult<Value> {
    let hay = chars(this);
    let needle: Vec<char> = arg(args, 0).to_js_string().chars().collect();
    if needle.len() > hay.len() {
        return Ok(Value::Number(-1.0));
    }
    let found = (0..=hay.len() - needle.len())
        .rev()
        .find(|&i| hay[i..i + needle.len()] == *needle);
    Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
}

fn string_slice(this: &Value, args: &[Value]) -> JsResult<Value> {
    let c = chars(this);
    let start = relative(&arg(args, 0), c.len(), 0);
    let end = relative(&arg(args, 1), c.len(), c.len());
    Ok(Value::string(char_slice(&c, start, end)))
}

fn string_substring(this: &Value, args: &[Value]) -> JsResult<Value> {
    let c = chars(this);
    let clamp = |v: &Value, default: usize| match v {
        Value::Undefined => default,
        other => {
            let n = other.to_number();
            if n.is_nan() || n < 0.0 {
                0
            } else {
                (n as usize).min(c.len())
            }
        }
    };
    let a = clamp(&arg(args, 0), 0);
    let b = clamp(&arg(args, 1), c.len());
    Ok(Value::string(char_slice(&c, a.min(b), a.max(b))))
}

fn replacement(replacer: &Value, matched: &str, offset: usize, whole: &str) -> JsResult<String> {
    match replacer {
        Value::Function(f) => Ok(f
            .call(
                &Value::Undefined,
                vec![Value::string(matched), Value::Number(offset as f64), Value::string(whole)],
            )?
            .to_js_string()),
        other => Ok(other.to_js_string().replace("$&", matched)),
    }
}

fn replace_occurrences(this: &Value, args: &[Value], all: bool) -> JsResult<Value> {
    let s = this_string(this);
    let pattern = arg(args, 0).to_js_string();
    let replacer = arg(args, 1);
    let mut out = String::new();
    let mut rest = 0;
    let mut offset = 0;
    while let Some(found) = s[offset..].find(pattern.as_str()) {
        let at = offset + found;
        out.push_str(&s[rest..at]);
        let chars_before = s[..at].chars().count();
        out.push_str(&replacement(&replacer, &pattern, chars_before, &s)?);
        rest = at + pattern.len();
        if !all {
            break;
        }
        offset = if pattern.is_empty() {
            match s[at..].chars().next() {
                Some(c) => {
                    out.push(c);
                    rest = at + c.len_utf8();
                    rest
                }
                None => break,
            }
        } else {
            rest
        };
    }
    out.push_str(&s[rest.min(s.len())..]);
    Ok(Value::string(out))
}

fn string_replace(this: &Value, args: &[Value]) -> JsResult<Value> {
    replace_occurrences(this, args, false)
}

fn string_replace_all(this: &Value, args: &[Value]) -> JsResult<Value> {
    replace_occurrences(this, args, true)
}

fn string_repeat(this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = arg(args, 0).to_number();
    if n < 0.0 || n.is_infinite() {
        return Err(Thrown::error("RangeError", format!("Invalid count value: {}", number_to_string(n))));
    }
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let s = this_string(this);
    if s.is_empty() || n == 0.0 {
        return Ok(Value::string(""));
    }
    check_string_length(s.len() as f64 * n)?;
    Ok(Value::string(s.repeat(n as usize)))
}

fn pad(this: &Value, args: &[Value], at_start: bool) -> JsResult<Value> {
    let s = this_string(this);
    let target = arg(args, 0).to_number();
    let target = if target.is_nan() { 0.0 } else { target.max(0.0).trunc() };
    let fill = match arg(args, 1) {
        Value::Undefined => " ".to_string(),
        f => f.to_js_string(),
    };
    let len = s.chars().count();
    if target <= len as f64 || fill.is_empty() {
        return Ok(Value::string(s));
    }
    check_string_length(target)?;
    let target = target as usize;
    let padding: String = fill.chars().cycle().take(target - len).collect();
    Ok(Value::string(if at_start {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }))
}

fn string_pad_start(this: &Value, args: &[Value]) -> JsResult<Value> {
    pad(this, args, true)
}

fn string_pad_end(this: &Value, args: &[Value]) -> JsResult<Value> {
    pad(this, args, false)
}

fn string_char_at(this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = arg(args, 0).to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        return Ok(Value::string(""));
    }
    Ok(Value::string(
        chars(this).get(n as usize).map(|c| c.to_string()).unwrap_or_default(),
    ))
}

fn string_at(this: &Value, args: &[Value]) -> JsResult<Value> {
    let c = chars(this);
    let n = arg(args, 0).to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { c.len() as f64 + n } else { n };
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    Ok(c.get(index as usize)
        .map(|ch| Value::string(ch.to_string()))
        .unwrap_or_default())
}

fn string_concat(this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut s = this_string(this);
    for a in args {
        s.push_str(&a.to_js_string());
    }
    Ok(Value::string(s))
}

fn string_to_string(this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::string(this_string(this)))
}

pub fn string_method(key: &str) -> Option<Value> {
    let (name, func): (&'static str, NativeFn) = match key {
        "toUpperCase" => ("toUpperCase", string_upper),
        "toLowerCase" => ("toLowerCase", string_lower),
        "trim" => ("trim", string_trim),
        "trimStart" => ("trimStart", string_trim_start),
        "trimEnd" => ("trimEnd", string_trim_end),
        "split" => ("split", string_split),
        "includes" => ("includes", string_includes),
        "startsWith" => ("startsWith", string_starts_with),
        "endsWith" => ("endsWith", string_ends_with),
        "indexOf" => ("indexOf", string_index_of),
        "lastIndexOf" => ("lastIndexOf", string_last_index_of),
        "slice" => ("slice", string_slice),
        "substring" => ("substring", string_substring),
        "replace" => ("replace", string_replace),
        "replaceAll" => ("replaceAll", string_replace_all),
        "repeat" => ("repeat", string_repeat),
        "padStart" => ("padStart", string_pad_start),
        "padEnd" => ("padEnd", string_pad_end),
        "charAt" => ("charAt", string_char_at),
        "at" => ("at", string_at),
        "concat" => ("concat", string_concat),
        "toString" => ("toString", string_to_string),
        _ => return None,
    };
    Some(NativeFunction::value(name, func))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NUMBER, OBJECT & FUNCTION METHODS
// ═══════════════════════════════════════════════════════════════════════════════

fn number_to_fixed(this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = this.to_number();
    let digits = arg(args, 0).to_number();
    let digits = if digits.is_nan() { 0.0 } else { digits };
    if !(0.0..=100.0).contains(&digits) {
        return Err(Thrown::error("RangeError", "toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() {
        return Ok(Value::string(number_to_string(n)));
    }
    Ok(Value::string(format!("{:.*}", digits as usize, n)))
}

fn number_to_radix_string(this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = this.to_number();
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        r => r.to_number() as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(Thrown::error("RangeError", "toString() radix must be between 2 and 36"));
    }
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return Ok(Value::string(number_to_string(n)));
    }
    let mut value = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        digits.push(std::char::from_digit((value % u64::from(radix)) as u32, radix).unwrap_or('0'));
        value /= u64::from(radix);
        if value == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::string(digits.into_iter().rev().collect::<String>()))
}

pub fn number_method(key: &str) -> Option<Value> {
    match key {
        "toFixed" => Some(NativeFunction::value("toFixed", number_to_fixed)),
        "toString" => Some(NativeFunction::value("toString", number_to_radix_string)),
        _ => None,
    }
}

fn object_has_own_property(this: &Value, args: &[Value]) -> JsResult<Value> {
    let key = property_key(&arg(args, 0));
    Ok(Value::Bool(match this {
        Value::Object(obj) => obj.borrow().contains_key(&key),
        _ => false,
    }))
}

fn object_to_string(this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::string(this.to_js_string()))
}

pub fn object_method(key: &str) -> Option<Value> {
    match key {
        "hasOwnProperty" => Some(NativeFunction::value("hasOwnProperty", object_has_own_property)),
        "toString" => Some(NativeFunction::value("toString", object_to_string)),
        _ => None,
    }
}

fn function_call(this: &Value, args: &[Value]) -> JsResult<Value> {
    let Value::Function(f) = this else {
        return Err(Thrown::type_error("Function.prototype.call called on a non-function"));
    };
    f.call(&arg(args, 0), args.get(1..).unwrap_or(&[]).to_vec())
}

fn function_apply(this: &Value, args: &[Value]) -> JsResult<Value> {
    let Value::Function(f) = this else {
        return Err(Thrown::type_error("Function.prototype.apply called on a non-function"));
    };
    let call_args = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        list => iterate(&list)?,
    };
    f.call(&arg(args, 0), call_args)
}

struct BoundFunction {
    target: Rc<dyn Callable>,
    this: Value,
    args: Vec<Value>,
}

impl Callable for BoundFunction {
    fn name(&self) -> &str {
        self.target.name()
    }

    fn call(&self, _this: &Value, args: Vec<Value>) -> JsResult<Value> {
        let mut all = self.args.clone();
        all.extend(args);
        self.target.call(&self.this, all)
    }
}

fn function_bind(this: &Value, args: &[Value]) -> JsResult<Value> {
    let Value::Function(f) = this else {
        return Err(Thrown::type_error("Bind must be called on a function"));
    };
    Ok(Value::Function(Rc::new(BoundFunction {
        target: f.clone(),
        this: arg(args, 0),
        args: args.get(1..).unwrap_or(&[]).to_vec(),
    })))
}

pub fn function_method(key: &str) -> Option<Value> {
    match key {
        "call" => Some(NativeFunction::value("call", function_call)),
        "apply" => Some(NativeFunction::value("apply", function_apply)),
        "bind" => Some(NativeFunction::value("bind", function_bind)),
        _ => None,
    }
}
