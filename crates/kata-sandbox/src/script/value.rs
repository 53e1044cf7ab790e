//! Runtime values and the conversions between them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::FunctionDef;
use super::MAX_NESTING;
use crate::dom::NodeId;

/// Shared, mutable lexical scope.
pub type Env = Rc<RefCell<Scope>>;

/// One variable binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
    /// `false` while a `let`/`const` is in its temporal dead zone.
    pub initialized: bool,
    /// `let`, `const`, function and parameter bindings, as opposed to `var`.
    pub lexical: bool,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub vars: HashMap<String, Binding>,
    pub parent: Option<Env>,
}

impl Scope {
    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }
}

/// Built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
}

impl ErrorKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::SyntaxError => "SyntaxError",
            Self::ReferenceError => "ReferenceError",
        }
    }
}

/// Global constructor functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctor {
    Object,
    Array,
    Number,
    String,
    Boolean,
    Error(ErrorKind),
}

impl Ctor {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Array => "Array",
            Self::Number => "Number",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Error(kind) => kind.name(),
        }
    }
}

/// Objects provided by the host rather than created by scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRef {
    Console,
    Math,
    Json,
    Document,
    /// Receiver of global functions such as `parseInt`.
    Global,
    Ctor(Ctor),
    Style(NodeId),
    ClassList(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjClass {
    Plain,
    Error,
}

#[derive(Debug, Clone)]
pub struct JsObject {
    pub props: IndexMap<String, Value>,
    pub class: ObjClass,
    /// Set by `Object.freeze`; writes are ignored.
    pub frozen: bool,
}

#[derive(Debug)]
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
    /// Declared name, or the name inferred from `const name = () => ...`.
    pub name: String,
}

/// A built-in method bound to its receiver.
#[derive(Debug)]
pub struct NativeFn {
    pub this: Value,
    pub name: &'static str,
}

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<JsObject>>),
    Function(Rc<Closure>),
    Native(Rc<NativeFn>),
    Host(HostRef),
    Node(NodeId),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl Value {
    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: IndexMap<String, Self>) -> Self {
        Self::Object(Rc::new(RefCell::new(JsObject {
            props,
            class: ObjClass::Plain,
            frozen: false,
        })))
    }

    pub fn error(kind: &str, message: &str) -> Self {
        let mut props = IndexMap::new();
        props.insert("name".to_string(), Self::from(kind));
        props.insert("message".to_string(), Self::from(message));
        Self::Object(Rc::new(RefCell::new(JsObject {
            props,
            class: ObjClass::Error,
            frozen: false,
        })))
    }

    pub fn native(this: Self, name: &'static str) -> Self {
        Self::Native(Rc::new(NativeFn { this, name }))
    }

    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub const fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Function(_) | Self::Native(_) | Self::Host(HostRef::Ctor(_))
        )
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null
            | Self::Array(_)
            | Self::Object(_)
            | Self::Node(_)
            | Self::Host(
                HostRef::Console
                | HostRef::Math
                | HostRef::Json
                | HostRef::Document
                | HostRef::Global
                | HostRef::Style(_)
                | HostRef::ClassList(_),
            ) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Function(_) | Self::Native(_) | Self::Host(HostRef::Ctor(_)) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Returns the error name and message if this is an error object.
    pub fn as_error(&self) -> Option<(String, String)> {
        let Self::Object(obj) = self else {
            return None;
        };
        let obj = obj.borrow();
        if obj.class != ObjClass::Error {
            return None;
        }
        let field = |key: &str| obj.props.get(key).map(to_js_string).unwrap_or_default();
        Some((field("name"), field("message")))
    }

    /// Returns the function's name, if it has one.
    pub fn function_name(&self) -> String {
        match self {
            Self::Function(closure) => closure.name.clone(),
            Self::Native(native) => native.name.to_string(),
            Self::Host(HostRef::Ctor(ctor)) => ctor.name().to_string(),
            _ => String::new(),
        }
    }
}

// ============================================================================
// Numbers
// ============================================================================

/// Formats a number the way JavaScript's `String(n)` does.
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
    if (1e-6..1e21).contains(&abs) {
        return format!("{n}");
    }
    // Exponent form: Rust prints `1e21` / `1.5e-7`, JavaScript `1e+21` / `1.5e-7`.
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => formatted,
    }
}

/// Parses a string the way JavaScript's `Number(s)` does.
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    let (sign, body) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if sign < 0.0 || s.starts_with('+') {
            return f64::NAN;
        }
        #[allow(clippy::cast_precision_loss)]
        let parsed = u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
        return parsed;
    }
    let valid = !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && body.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.');
    if !valid {
        return f64::NAN;
    }
    body.parse::<f64>().map_or(f64::NAN, |v| sign * v)
}

/// Implements `Number.prototype.toFixed`, rounding ties away from zero.
pub fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    let negative = n < 0.0;
    // Print extra digits, then round half-up on the decimal expansion.
    let expanded = format!("{:.*}", digits + 25, n.abs());
    let (int_part, frac_part) = expanded.split_once('.').unwrap_or((&expanded, ""));
    let mut kept: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(digits))
        .map(|b| b - b'0')
        .collect();
    let round_up = frac_part.as_bytes().get(digits).is_some_and(|b| *b >= b'5');
    if round_up {
        let mut i = kept.len();
        loop {
            if i == 0 {
                kept.insert(0, 1);
                break;
            }
            i -= 1;
            if kept[i] == 9 {
                kept[i] = 0;
            } else {
                kept[i] += 1;
                break;
            }
        }
    }
    let int_len = kept.len() - digits;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    for (i, d) in kept.iter().enumerate() {
        if i == int_len {
            out.push('.');
        }
        out.push(char::from(b'0' + d));
    }
    out
}

// ============================================================================
// Conversions
// ============================================================================

fn ptr_of(value: &Value) -> Option<*const ()> {
    match value {
        Value::Array(a) => Some(Rc::as_ptr(a).cast()),
        Value::Object(o) => Some(Rc::as_ptr(o).cast()),
        _ => None,
    }
}

/// `ToString`. Cyclic arrays print as empty strings at the point of the
/// cycle, and so does anything nested deeper than the nesting limit.
pub fn to_js_string(value: &Value) -> String {
    fn inner(value: &Value, seen: &mut Vec<*const ()>) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let Some(ptr) = ptr_of(value) else {
                    return String::new();
                };
                if seen.len() >= MAX_NESTING || seen.contains(&ptr) {
                    return String::new();
                }
                seen.push(ptr);
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            inner(item, seen)
                        }
                    })
                    .collect();
                seen.pop();
                parts.join(",")
            }
            Value::Object(_) => match value.as_error() {
                Some((name, message)) if message.is_empty() => name,
                Some((name, message)) => format!("{name}: {message}"),
                None => "[object Object]".to_string(),
            },
            Value::Function(_) | Value::Native(_) | Value::Host(HostRef::Ctor(_)) => {
                format!("function {}() {{ [code] }}", value.function_name())
            }
            Value::Host(HostRef::Math) => "[object Math]".to_string(),
            Value::Host(HostRef::Json) => "[object JSON]".to_string(),
            Value::Host(HostRef::Document) => "[object HTMLDocument]".to_string(),
            Value::Host(HostRef::Style(_)) => "[object CSSStyleDeclaration]".to_string(),
            Value::Host(HostRef::ClassList(_)) => "[object DOMTokenList]".to_string(),
            Value::Host(_) => "[object Object]".to_string(),
            Value::Node(_) => "[object HTMLElement]".to_string(),
        }
    }
    inner(value, &mut Vec::new())
}

/// `ToNumber`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::Str(s) => string_to_number(s),
        Value::Array(_) => string_to_number(&to_js_string(value)),
        _ => f64::NAN,
    }
}

/// Converts a value to a property key.
pub fn to_property_key(value: &Value) -> String {
    to_js_string(value)
}

/// Converts a number to an array index, if it is one.
pub fn as_index(n: f64) -> Option<usize> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    (n >= 0.0 && n.fract() == 0.0 && n < 4_294_967_295.0).then(|| n as usize)
}

/// Converts a number to an integer the way `ToIntegerOrInfinity` does,
/// clamped to `i64`.
pub fn to_integer(n: f64) -> i64 {
    if n.is_nan() {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let truncated = n.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64;
    truncated
}

/// Resolves a relative index (negative counts from the end) against `len`.
pub fn relative_index(n: f64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let idx = to_integer(n);
    let resolved = if idx < 0 { (len_i + idx).max(0) } else { idx.min(len_i) };
    usize::try_from(resolved).unwrap_or(0)
}

/// `===`
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        #[allow(clippy::float_cmp)]
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Native(x), Value::Native(y)) => {
            Rc::ptr_eq(x, y) || (x.name == y.name && strict_equals(&x.this, &y.this))
        }
        (Value::Host(x), Value::Host(y)) => x == y,
        (Value::Node(x), Value::Node(y)) => x == y,
        _ => false,
    }
}

fn is_object_like(value: &Value) -> bool {
    matches!(
        value,
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Native(_) | Value::Host(_) | Value::Node(_)
    )
}

/// `==`
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
        (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) => {
            #[allow(clippy::float_cmp)]
            let equal = to_number(a) == to_number(b);
            equal
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(to_number(b))),
        (x, y) if is_object_like(x) && !is_object_like(y) => {
            loose_equals(&Value::Str(to_js_string(x)), y)
        }
        (x, y) if !is_object_like(x) && is_object_like(y) => {
            loose_equals(x, &Value::Str(to_js_string(y)))
        }
        _ => strict_equals(a, b),
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Why a value could not be converted to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonError {
    /// The structure contains itself.
    Circular,
    /// Arrays and objects are nested past the nesting limit.
    TooDeep,
}

/// Converts a value for `JSON.stringify`. Returns `None` for values that
/// serialize to nothing (`undefined` and functions).
pub fn to_json(value: &Value) -> Result<Option<serde_json::Value>, JsonError> {
    fn inner(
        value: &Value,
        seen: &mut Vec<*const ()>,
    ) -> Result<Option<serde_json::Value>, JsonError> {
        Ok(Some(match value {
            Value::Undefined
            | Value::Function(_)
            | Value::Native(_)
            | Value::Host(HostRef::Ctor(_)) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                let ptr = Rc::as_ptr(items).cast::<()>();
                enter(seen, ptr)?;
                seen.push(ptr);
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(inner(item, seen)?.unwrap_or(serde_json::Value::Null));
                }
                seen.pop();
                serde_json::Value::Array(out)
            }
            Value::Object(obj) => {
                let ptr = Rc::as_ptr(obj).cast::<()>();
                enter(seen, ptr)?;
                seen.push(ptr);
                let mut map = serde_json::Map::new();
                let obj_ref = obj.borrow();
                for (key, item) in &obj_ref.props {
                    if obj_ref.class == ObjClass::Error && (key == "name" || key == "message") {
                        continue;
                    }
                    if let Some(json) = inner(item, seen)? {
                        map.insert(key.clone(), json);
                    }
                }
                seen.pop();
                serde_json::Value::Object(map)
            }
            Value::Host(_) | Value::Node(_) => serde_json::Value::Object(serde_json::Map::new()),
        }))
    }

    fn enter(seen: &[*const ()], ptr: *const ()) -> Result<(), JsonError> {
        if seen.len() >= MAX_NESTING {
            return Err(JsonError::TooDeep);
        }
        if seen.contains(&ptr) {
            return Err(JsonError::Circular);
        }
        Ok(())
    }

    inner(value, &mut Vec::new())
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Converts parsed JSON into a script value.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}

/// Serializes JSON with the given indent unit (empty for compact output).
pub fn json_to_string(json: &serde_json::Value, indent: &str) -> String {
    if indent.is_empty() {
        return json.to_string();
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if serde::Serialize::serialize(json, &mut serializer).is_err() {
        return json.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| json.to_string())
}

/// Formats one `console.*` argument.
///
/// Strings print verbatim, arrays and plain objects as 2-space indented
/// JSON, errors as `Name: message`, functions as `[Function: name]`.
/// Elements are formatted by the interpreter, which owns the document.
pub fn console_format(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Object(_) if value.as_error().is_some() => to_js_string(value),
        Value::Array(_) | Value::Object(_) => match to_json(value) {
            Ok(Some(json)) => json_to_string(&json, "  "),
            Ok(None) => "undefined".to_string(),
            Err(JsonError::Circular) => "[Circular]".to_string(),
            Err(JsonError::TooDeep) => "[Nested too deeply]".to_string(),
        },
        Value::Function(_) | Value::Native(_) | Value::Host(HostRef::Ctor(_)) => {
            let name = value.function_name();
            if name.is_empty() {
                "[Function (anonymous)]".to_string()
            } else {
                format!("[Function: {name}]")
            }
        }
        _ => to_js_string(value),
    }
}

/// Quotes a string for use in an error message.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("\"{s}\""),
        _ => to_js_string(value),
    }
}
