//! Built-in globals and the methods of primitive values.

use std::cmp::Ordering;

use indexmap::IndexMap;

use super::MAX_NESTING;
use super::interp::{array_index, check_string_length, iterate, own_entries, throw, Eval, Interpreter};
use super::value::{
    as_index, console_format, describe, from_json, json_to_string, number_to_string,
    relative_index, strict_equals, to_fixed, to_integer, to_js_string, to_json,
    to_number, Ctor, ErrorKind, HostRef, JsonError, Value,
};
use crate::console::LogLevel;

/// Longest string a script may build, in bytes.
pub const MAX_STRING_LENGTH: usize = 1 << 24;

/// Longest array a script may build.
pub const MAX_ARRAY_LENGTH: usize = 1 << 22;

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "includes", "indexOf",
    "lastIndexOf", "startsWith", "endsWith", "slice", "substring", "substr", "split", "replace",
    "replaceAll", "repeat", "charAt", "charCodeAt", "padStart", "padEnd", "concat", "at",
    "toString", "localeCompare",
];

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "join", "map", "filter", "reduce", "reduceRight",
    "forEach", "find", "findIndex", "findLast", "findLastIndex", "some", "every", "includes",
    "indexOf", "lastIndexOf", "slice", "splice", "concat", "reverse", "sort", "flat", "flatMap",
    "fill", "at", "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];
const CONSOLE_METHODS: &[&str] = &["log", "info", "warn", "error", "debug"];
const MATH_METHODS: &[&str] = &[
    "floor", "ceil", "round", "abs", "min", "max", "pow", "sqrt", "cbrt", "random", "trunc",
    "sign", "hypot", "log", "log2", "log10", "exp",
];
const JSON_METHODS: &[&str] = &["stringify", "parse"];
const OBJECT_STATICS: &[&str] = &[
    "keys", "values", "entries", "assign", "freeze", "isFrozen", "fromEntries",
];
const ARRAY_STATICS: &[&str] = &["isArray", "from", "of"];
const NUMBER_STATICS: &[&str] = &[
    "isInteger", "isSafeInteger", "isFinite", "isNaN", "parseInt", "parseFloat",
];

/// Bindings installed in every interpreter's outermost scope.
pub fn globals(with_document: bool) -> Vec<(&'static str, Value)> {
    let global_fn = |name| Value::native(Value::Host(HostRef::Global), name);
    let mut out = vec![
        ("console", Value::Host(HostRef::Console)),
        ("Math", Value::Host(HostRef::Math)),
        ("JSON", Value::Host(HostRef::Json)),
        ("Object", Value::Host(HostRef::Ctor(Ctor::Object))),
        ("Array", Value::Host(HostRef::Ctor(Ctor::Array))),
        ("Number", Value::Host(HostRef::Ctor(Ctor::Number))),
        ("String", Value::Host(HostRef::Ctor(Ctor::String))),
        ("Boolean", Value::Host(HostRef::Ctor(Ctor::Boolean))),
        ("parseInt", global_fn("parseInt")),
        ("parseFloat", global_fn("parseFloat")),
        ("isNaN", global_fn("isNaN")),
        ("isFinite", global_fn("isFinite")),
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
    ];
    for kind in [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::SyntaxError,
        ErrorKind::ReferenceError,
    ] {
        out.push((kind.name(), Value::Host(HostRef::Ctor(Ctor::Error(kind)))));
    }
    if with_document {
        out.push(("document", Value::Host(HostRef::Document)));
    }
    out
}

fn bound(receiver: &Value, methods: &'static [&'static str], key: &str) -> Value {
    methods
        .iter()
        .copied()
        .find(|name| *name == key)
        .map_or(Value::Undefined, |name| Value::native(receiver.clone(), name))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

pub fn check_array_length(len: usize) -> Eval<()> {
    if len > MAX_ARRAY_LENGTH {
        return throw(ErrorKind::RangeError, "Invalid array length");
    }
    Ok(())
}

fn expect_callable(value: &Value) -> Eval<()> {
    if value.is_callable() {
        Ok(())
    } else {
        throw(
            ErrorKind::TypeError,
            format!("{} is not a function", describe(value)),
        )
    }
}

// ============================================================================
// Property lookup
// ============================================================================

/// Properties of values other than plain objects and DOM handles.
pub fn property(object: &Value, key: &str) -> Value {
    match object {
        Value::Str(s) => match key {
            "length" => Value::from(s.chars().count()),
            _ => match array_index(key) {
                Some(index) => s
                    .chars()
                    .nth(index)
                    .map_or(Value::Undefined, |c| Value::Str(c.to_string())),
                None => bound(object, STRING_METHODS, key),
            },
        },
        Value::Number(_) => bound(object, NUMBER_METHODS, key),
        Value::Bool(_) => bound(object, &["toString"], key),
        Value::Array(items) => match key {
            "length" => Value::from(items.borrow().len()),
            _ => match array_index(key) {
                Some(index) => items.borrow().get(index).cloned().unwrap_or(Value::Undefined),
                None => bound(object, ARRAY_METHODS, key),
            },
        },
        Value::Function(closure) => match key {
            "name" => Value::from(object.function_name()),
            "length" => Value::from(
                closure
                    .def
                    .params
                    .iter()
                    .take_while(|param| !param.rest && param.default.is_none())
                    .count(),
            ),
            _ => Value::Undefined,
        },
        Value::Native(_) => match key {
            "name" => Value::from(object.function_name()),
            _ => Value::Undefined,
        },
        Value::Host(HostRef::Console) => bound(object, CONSOLE_METHODS, key),
        Value::Host(HostRef::Math) => match key {
            "PI" => Value::Number(std::f64::consts::PI),
            "E" => Value::Number(std::f64::consts::E),
            "LN2" => Value::Number(std::f64::consts::LN_2),
            "LN10" => Value::Number(std::f64::consts::LN_10),
            "SQRT2" => Value::Number(std::f64::consts::SQRT_2),
            _ => bound(object, MATH_METHODS, key),
        },
        Value::Host(HostRef::Json) => bound(object, JSON_METHODS, key),
        Value::Host(HostRef::Ctor(ctor)) => ctor_property(object, *ctor, key),
        _ => Value::Undefined,
    }
}

/// Inherited members of plain objects.
pub fn object_property(object: &Value, key: &str) -> Value {
    bound(object, &["hasOwnProperty", "toString"], key)
}

fn ctor_property(object: &Value, ctor: Ctor, key: &str) -> Value {
    if key == "name" {
        return Value::from(ctor.name());
    }
    match ctor {
        Ctor::Object => bound(object, OBJECT_STATICS, key),
        Ctor::Array => bound(object, ARRAY_STATICS, key),
        Ctor::Number => match key {
            "MAX_SAFE_INTEGER" => Value::Number(9_007_199_254_740_991.0),
            "MIN_SAFE_INTEGER" => Value::Number(-9_007_199_254_740_991.0),
            "EPSILON" => Value::Number(f64::EPSILON),
            "MAX_VALUE" => Value::Number(f64::MAX),
            "MIN_VALUE" => Value::Number(5e-324),
            "POSITIVE_INFINITY" => Value::Number(f64::INFINITY),
            "NEGATIVE_INFINITY" => Value::Number(f64::NEG_INFINITY),
            "NaN" => Value::Number(f64::NAN),
            _ => bound(object, NUMBER_STATICS, key),
        },
        _ => Value::Undefined,
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Calls the built-in method `name` bound to `receiver`.
pub fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Eval<Value> {
    match receiver {
        Value::Str(s) => string_method(interp, s, name, &args),
        Value::Number(n) => number_method(*n, name, &args),
        Value::Bool(b) => Ok(Value::from(b.to_string())),
        Value::Array(_) => array_method(interp, receiver, name, args),
        Value::Object(obj) => match name {
            "hasOwnProperty" => {
                let key = to_js_string(&arg(&args, 0));
                Ok(Value::Bool(obj.borrow().props.contains_key(&key)))
            }
            _ => Ok(Value::from(to_js_string(receiver))),
        },
        Value::Host(HostRef::Console) => {
            console_method(interp, name, &args);
            Ok(Value::Undefined)
        }
        Value::Host(HostRef::Math) => Ok(Value::Number(math(name, &args))),
        Value::Host(HostRef::Json) => json_method(name, &args),
        Value::Host(HostRef::Global) => Ok(global_fn(name, &args)),
        Value::Host(HostRef::Ctor(ctor)) => ctor_static(interp, *ctor, name, args),
        _ => throw(ErrorKind::TypeError, format!("{name} is not a function")),
    }
}

/// Calls a constructor without `new`.
pub fn call_ctor(interp: &mut Interpreter<'_>, ctor: Ctor, args: Vec<Value>) -> Eval<Value> {
    match ctor {
        Ctor::Number => Ok(Value::Number(args.first().map_or(0.0, to_number))),
        Ctor::String => Ok(Value::Str(args.first().map(to_js_string).unwrap_or_default())),
        Ctor::Boolean => Ok(Value::Bool(args.first().is_some_and(Value::truthy))),
        _ => construct(interp, ctor, args),
    }
}

/// Implements `new Ctor(...)`.
pub fn construct(_interp: &mut Interpreter<'_>, ctor: Ctor, args: Vec<Value>) -> Eval<Value> {
    match ctor {
        Ctor::Object => Ok(match args.into_iter().next() {
            Some(value @ (Value::Object(_) | Value::Array(_))) => value,
            _ => Value::object(IndexMap::new()),
        }),
        Ctor::Array => {
            if let [Value::Number(n)] = args.as_slice() {
                let Some(len) = as_index(*n) else {
                    return throw(ErrorKind::RangeError, "Invalid array length");
                };
                check_array_length(len)?;
                return Ok(Value::array(vec![Value::Undefined; len]));
            }
            Ok(Value::array(args))
        }
        Ctor::Error(kind) => {
            let message = match args.first() {
                None | Some(Value::Undefined) => String::new(),
                Some(value) => to_js_string(value),
            };
            Ok(Value::error(kind.name(), &message))
        }
        // Wrapper objects are not modelled; `new Number(1)` yields the primitive.
        Ctor::Number => Ok(Value::Number(args.first().map_or(0.0, to_number))),
        Ctor::String => Ok(Value::Str(args.first().map(to_js_string).unwrap_or_default())),
        Ctor::Boolean => Ok(Value::Bool(args.first().is_some_and(Value::truthy))),
    }
}

// ============================================================================
// Console
// ============================================================================

fn console_method(interp: &mut Interpreter<'_>, name: &str, args: &[Value]) {
    let level = LogLevel::from_method(name).unwrap_or(LogLevel::Log);
    let parts: Vec<String> = args
        .iter()
        .map(|value| match value {
            Value::Node(id) => interp
                .page()
                .map(|page| page.dom().outer_html(*id))
                .unwrap_or_default(),
            _ => console_format(value),
        })
        .collect();
    let line = parts.join(" ");
    interp.console().log(level, &line);
}

// ============================================================================
// Strings
// ============================================================================

/// Resolves an optional position argument against `len`, clamping to
/// `0..=len`.
fn position(args: &[Value], index: usize, default: usize, len: usize) -> usize {
    match args.get(index) {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = to_integer(to_number(value)).clamp(0, i64::try_from(len).unwrap_or(i64::MAX));
            usize::try_from(n).unwrap_or(0)
        }
    }
}

fn relative(args: &[Value], index: usize, default: usize, len: usize) -> usize {
    match args.get(index) {
        None | Some(Value::Undefined) => default,
        Some(value) => relative_index(to_number(value), len),
    }
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&i| haystack.get(i..i + needle.len()) == Some(needle))
}

fn rfind_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    let last_start = haystack.len().checked_sub(needle.len())?;
    (0..=from.min(last_start))
        .rev()
        .find(|&i| haystack.get(i..i + needle.len()) == Some(needle))
}

fn index_value(found: Option<usize>) -> Value {
    found.map_or(Value::Number(-1.0), Value::from)
}

#[allow(clippy::too_many_lines)]
fn string_method(
    interp: &mut Interpreter<'_>,
    s: &str,
    name: &str,
    args: &[Value],
) -> Eval<Value> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text = |index: usize| to_js_string(&arg(args, index));
    let collect = |range: &[char]| Value::Str(range.iter().collect());

    Ok(match name {
        "toUpperCase" => Value::Str(s.to_uppercase()),
        "toLowerCase" => Value::Str(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::from(s),
        "includes" => {
            let needle: Vec<char> = text(0).chars().collect();
            Value::Bool(find_chars(&chars, &needle, position(args, 1, 0, len)).is_some())
        }
        "indexOf" => {
            let needle: Vec<char> = text(0).chars().collect();
            index_value(find_chars(&chars, &needle, position(args, 1, 0, len)))
        }
        "lastIndexOf" => {
            let needle: Vec<char> = text(0).chars().collect();
            index_value(rfind_chars(&chars, &needle, position(args, 1, len, len)))
        }
        "startsWith" => {
            let needle: Vec<char> = text(0).chars().collect();
            let from = position(args, 1, 0, len);
            Value::Bool(chars[from..].starts_with(&needle))
        }
        "endsWith" => {
            let needle: Vec<char> = text(0).chars().collect();
            let end = position(args, 1, len, len);
            Value::Bool(chars[..end].ends_with(&needle))
        }
        "slice" => {
            let start = relative(args, 0, 0, len);
            let end = relative(args, 1, len, len);
            collect(&chars[start..end.max(start)])
        }
        "substring" => {
            let a = position(args, 0, 0, len);
            let b = position(args, 1, len, len);
            collect(&chars[a.min(b)..a.max(b)])
        }
        "substr" => {
            let start = relative(args, 0, 0, len);
            let count = position(args, 1, len - start, len - start);
            collect(&chars[start..start + count])
        }
        "charAt" => {
            let index = to_integer(to_number(&arg(args, 0)));
            usize::try_from(index)
                .ok()
                .and_then(|i| chars.get(i))
                .map_or_else(|| Value::from(""), |c| Value::Str(c.to_string()))
        }
        "charCodeAt" => {
            let index = to_integer(to_number(&arg(args, 0)));
            s.encode_utf16()
                .nth(usize::try_from(index).unwrap_or(usize::MAX))
                .map_or(Value::Number(f64::NAN), |unit| Value::Number(f64::from(unit)))
        }
        "at" => {
            let index = to_integer(to_number(&arg(args, 0)));
            let index = if index < 0 {
                i64::try_from(len).unwrap_or(i64::MAX) + index
            } else {
                index
            };
            usize::try_from(index)
                .ok()
                .and_then(|i| chars.get(i))
                .map_or(Value::Undefined, |c| Value::Str(c.to_string()))
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&to_js_string(value));
                check_string_length(out.len())?;
            }
            Value::Str(out)
        }
        "repeat" => {
            let count = to_number(&arg(args, 0));
            let count = if count.is_nan() { 0.0 } else { count };
            if count < 0.0 || count.is_infinite() {
                return throw(
                    ErrorKind::RangeError,
                    format!("Invalid count value: {}", number_to_string(count)),
                );
            }
            let count = usize::try_from(to_integer(count)).unwrap_or(usize::MAX);
            check_string_length(s.len().saturating_mul(count))?;
            Value::Str(s.repeat(count))
        }
        "padStart" | "padEnd" => {
            let target = position(args, 0, 0, MAX_STRING_LENGTH + 1);
            check_string_length(target)?;
            let filler = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(value) => to_js_string(value),
            };
            if target <= len || filler.is_empty() {
                return Ok(Value::from(s));
            }
            let pad: String = filler.chars().cycle().take(target - len).collect();
            if name == "padStart" {
                Value::Str(pad + s)
            } else {
                Value::Str(s.to_string() + &pad)
            }
        }
        "split" => {
            let limit = match args.get(1) {
                None | Some(Value::Undefined) => usize::MAX,
                Some(value) => usize::try_from(to_integer(to_number(value))).unwrap_or(0),
            };
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::from(s)],
                Some(separator) => {
                    let separator = to_js_string(separator);
                    if separator.is_empty() {
                        chars.iter().map(|c| Value::Str(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::array(parts.into_iter().take(limit).collect())
        }
        "replace" | "replaceAll" => {
            let pattern = text(0);
            let replacement = arg(args, 1);
            replace(interp, s, &pattern, &replacement, name == "replaceAll")?
        }
        "localeCompare" => {
            let other = text(0);
            Value::Number(match s.cmp(other.as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            })
        }
        _ => return throw(ErrorKind::TypeError, format!("{name} is not a function")),
    })
}

fn replace(
    interp: &mut Interpreter<'_>,
    s: &str,
    pattern: &str,
    replacement: &Value,
    all: bool,
) -> Eval<Value> {
    let mut matches = Vec::new();
    if pattern.is_empty() {
        if all {
            matches.extend(s.char_indices().map(|(i, _)| i).chain(std::iter::once(s.len())));
        } else {
            matches.push(0);
        }
    } else if all {
        matches.extend(s.match_indices(pattern).map(|(i, _)| i));
    } else if let Some(i) = s.find(pattern) {
        matches.push(i);
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for start in matches {
        out.push_str(&s[last..start]);
        let piece = if replacement.is_callable() {
            let offset = s[..start].chars().count();
            let result = interp.call_value(
                replacement,
                Value::Undefined,
                vec![Value::from(pattern), Value::from(offset), Value::from(s)],
            )?;
            to_js_string(&result)
        } else {
            expand_replacement(&to_js_string(replacement), pattern)
        };
        out.push_str(&piece);
        check_string_length(out.len())?;
        last = start + pattern.len();
    }
    out.push_str(&s[last..]);
    Ok(Value::Str(out))
}

/// Expands `$&` and `$$` in a replacement string.
fn expand_replacement(template: &str, matched: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('$', Some('$')) => {
                out.push('$');
                chars.next();
            }
            ('$', Some('&')) => {
                out.push_str(matched);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Numbers and globals
// ============================================================================

fn number_method(n: f64, name: &str, args: &[Value]) -> Eval<Value> {
    match name {
        "toFixed" => {
            let digits = to_integer(to_number(&arg(args, 0)));
            let Ok(digits @ 0..=100) = usize::try_from(digits) else {
                return throw(
                    ErrorKind::RangeError,
                    "toFixed() digits argument must be between 0 and 100",
                );
            };
            Ok(Value::Str(to_fixed(n, digits)))
        }
        _ => {
            let radix = match args.first() {
                None | Some(Value::Undefined) => 10,
                Some(value) => to_integer(to_number(value)),
            };
            let Ok(radix @ 2..=36) = u32::try_from(radix) else {
                return throw(
                    ErrorKind::RangeError,
                    "toString() radix must be between 2 and 36",
                );
            };
            Ok(Value::Str(number_to_radix(n, radix)))
        }
    }
}

fn number_to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return number_to_string(n);
    }
    let radix_f = f64::from(radix);
    let mut int_part = n.abs().trunc();
    let mut frac = n.abs().fract();
    let mut digits = Vec::new();
    while int_part >= 1.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let digit = (int_part % radix_f) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        int_part = (int_part / radix_f).trunc();
    }
    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    if digits.is_empty() {
        out.push('0');
    }
    out.extend(digits.iter().rev());
    if frac > 0.0 {
        out.push('.');
        for _ in 0..52 {
            frac *= radix_f;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let digit = frac.trunc() as u32;
            out.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            frac = frac.fract();
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let text = text.trim_start();
    let (sign, mut body) = match text.chars().next() {
        Some('-') => (-1.0, &text[1..]),
        Some('+') => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    let mut radix = match radix {
        Value::Undefined => 0,
        value => to_integer(to_number(value)),
    };
    let has_hex_prefix = body.starts_with("0x") || body.starts_with("0X");
    if radix == 0 {
        radix = if has_hex_prefix { 16 } else { 10 };
    }
    if radix == 16 && has_hex_prefix {
        body = &body[2..];
    }
    let Ok(radix @ 2..=36) = u32::try_from(radix) else {
        return f64::NAN;
    };
    let mut result: Option<f64> = None;
    for c in body.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    result.map_or(f64::NAN, |value| sign * value)
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let unsigned = text.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    // Longest prefix that forms a decimal literal.
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    if end == digits_start || &text[digits_start..end] == "." {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    text[..end].parse().unwrap_or(f64::NAN)
}

fn global_fn(name: &str, args: &[Value]) -> Value {
    let first = arg(args, 0);
    match name {
        "parseInt" => Value::Number(parse_int(&to_js_string(&first), &arg(args, 1))),
        "parseFloat" => Value::Number(parse_float(&to_js_string(&first))),
        "isNaN" => Value::Bool(to_number(&first).is_nan()),
        _ => Value::Bool(to_number(&first).is_finite()),
    }
}

#[allow(clippy::float_cmp)]
fn math(name: &str, args: &[Value]) -> f64 {
    let x = to_number(&arg(args, 0));
    let numbers = || args.iter().map(to_number);
    match name {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        // JavaScript rounds halves towards positive infinity.
        "round" => (x + 0.5).floor(),
        "abs" => x.abs(),
        "trunc" => x.trunc(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "cbrt" => x.cbrt(),
        "log" => x.ln(),
        "log2" => x.log2(),
        "log10" => x.log10(),
        "exp" => x.exp(),
        "pow" => {
            let y = to_number(&arg(args, 1));
            if y.is_nan() {
                f64::NAN
            } else {
                x.powf(y)
            }
        }
        "min" => numbers().fold(f64::INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() {
                f64::NAN
            } else {
                acc.min(n)
            }
        }),
        "max" => numbers().fold(f64::NEG_INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() {
                f64::NAN
            } else {
                acc.max(n)
            }
        }),
        "hypot" => numbers().map(|n| n * n).sum::<f64>().sqrt(),
        "random" => rand::random::<f64>(),
        _ => f64::NAN,
    }
}

fn json_method(name: &str, args: &[Value]) -> Eval<Value> {
    match name {
        "parse" => {
            let text = to_js_string(&arg(args, 0));
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => Ok(from_json(json)),
                Err(e) => throw(ErrorKind::SyntaxError, format!("JSON.parse: {e}")),
            }
        }
        _ => {
            let indent = match args.get(2) {
                Some(Value::Number(n)) => {
                    " ".repeat(usize::try_from(to_integer(*n).clamp(0, 10)).unwrap_or(0))
                }
                Some(Value::Str(s)) => s.chars().take(10).collect(),
                _ => String::new(),
            };
            match to_json(&arg(args, 0)) {
                Ok(Some(json)) => Ok(Value::Str(json_to_string(&json, &indent))),
                Ok(None) => Ok(Value::Undefined),
                Err(JsonError::Circular) => {
                    throw(ErrorKind::TypeError, "Converting circular structure to JSON")
                }
                Err(JsonError::TooDeep) => {
                    throw(ErrorKind::RangeError, "Maximum call stack size exceeded")
                }
            }
        }
    }
}

// ============================================================================
// Constructor statics
// ============================================================================

fn ctor_static(
    interp: &mut Interpreter<'_>,
    ctor: Ctor,
    name: &str,
    args: Vec<Value>,
) -> Eval<Value> {
    let first = arg(&args, 0);
    match (ctor, name) {
        (Ctor::Object, "keys" | "values" | "entries") => {
            if first.is_nullish() {
                return throw(
                    ErrorKind::TypeError,
                    "Cannot convert undefined or null to object",
                );
            }
            let entries = own_entries(&first).into_iter();
            Ok(Value::array(match name {
                "keys" => entries.map(|(key, _)| Value::Str(key)).collect(),
                "values" => entries.map(|(_, value)| value).collect(),
                _ => entries
                    .map(|(key, value)| Value::array(vec![Value::Str(key), value]))
                    .collect(),
            }))
        }
        (Ctor::Object, "assign") => {
            if first.is_nullish() {
                return throw(
                    ErrorKind::TypeError,
                    "Cannot convert undefined or null to object",
                );
            }
            for source in args.iter().skip(1) {
                for (key, value) in own_entries(source) {
                    interp.set_property(&first, &key, value)?;
                }
            }
            Ok(first)
        }
        (Ctor::Object, "freeze") => {
            if let Value::Object(obj) = &first {
                obj.borrow_mut().frozen = true;
            }
            Ok(first)
        }
        (Ctor::Object, "isFrozen") => Ok(Value::Bool(match &first {
            Value::Object(obj) => obj.borrow().frozen,
            Value::Array(_) => false,
            _ => true,
        })),
        (Ctor::Object, "fromEntries") => {
            let mut props = IndexMap::new();
            for entry in iterate(&first)? {
                let key = to_js_string(&interp.get_property(&entry, "0")?);
                let value = interp.get_property(&entry, "1")?;
                props.insert(key, value);
            }
            Ok(Value::object(props))
        }
        (Ctor::Array, "isArray") => Ok(Value::Bool(matches!(first, Value::Array(_)))),
        (Ctor::Array, "of") => Ok(Value::array(args)),
        (Ctor::Array, "from") => {
            let items = match &first {
                Value::Object(obj) => {
                    let len = obj.borrow().props.get("length").map_or(0.0, to_number);
                    let len = as_index(len).unwrap_or(0);
                    check_array_length(len)?;
                    vec![Value::Undefined; len]
                }
                Value::Array(_) | Value::Str(_) => iterate(&first)?,
                _ => Vec::new(),
            };
            let mapper = arg(&args, 1);
            if mapper.is_undefined() {
                return Ok(Value::array(items));
            }
            expect_callable(&mapper)?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(interp.call_value(&mapper, Value::Undefined, vec![item, Value::from(i)])?);
            }
            Ok(Value::array(out))
        }
        (Ctor::Number, "isInteger" | "isSafeInteger") => Ok(Value::Bool(match first {
            Value::Number(n) => {
                n.is_finite()
                    && n.fract() == 0.0
                    && (name == "isInteger" || n.abs() <= 9_007_199_254_740_991.0)
            }
            _ => false,
        })),
        (Ctor::Number, "isFinite") => {
            Ok(Value::Bool(matches!(first, Value::Number(n) if n.is_finite())))
        }
        (Ctor::Number, "isNaN") => Ok(Value::Bool(matches!(first, Value::Number(n) if n.is_nan()))),
        (Ctor::Number, "parseInt" | "parseFloat") => Ok(global_fn(name, &args)),
        _ => throw(
            ErrorKind::TypeError,
            format!("{}.{name} is not a function", ctor.name()),
        ),
    }
}

// ============================================================================
// Arrays
// ============================================================================

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: i64, level: usize) -> Eval<()> {
    if level >= MAX_NESTING {
        return throw(ErrorKind::RangeError, "Maximum call stack size exceeded");
    }
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => {
                let inner = inner.borrow().clone();
                flatten_into(out, &inner, depth - 1, level + 1)?;
            }
            _ => out.push(item.clone()),
        }
        check_array_length(out.len())?;
    }
    Ok(())
}

fn sort_order(
    interp: &mut Interpreter<'_>,
    a: &Value,
    b: &Value,
    compare: &Value,
) -> Eval<Ordering> {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
        (Value::Undefined, _) => return Ok(Ordering::Greater),
        (_, Value::Undefined) => return Ok(Ordering::Less),
        _ => {}
    }
    if compare.is_undefined() {
        return Ok(to_js_string(a).cmp(&to_js_string(b)));
    }
    let result = to_number(&interp.call_value(compare, Value::Undefined, vec![a.clone(), b.clone()])?);
    Ok(if result < 0.0 {
        Ordering::Less
    } else if result > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    })
}

/// Stable merge sort whose comparator may fail.
fn merge_sort(interp: &mut Interpreter<'_>, mut items: Vec<Value>, compare: &Value) -> Eval<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(interp, items, compare)?;
    let right = merge_sort(interp, right, compare)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        let next = if sort_order(interp, r, l, compare)? == Ordering::Less {
            right.next()
        } else {
            left.next()
        };
        out.extend(next);
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

#[allow(clippy::too_many_lines)]
fn array_method(
    interp: &mut Interpreter<'_>,
    this: &Value,
    name: &str,
    args: Vec<Value>,
) -> Eval<Value> {
    let Value::Array(items) = this else {
        return throw(ErrorKind::TypeError, format!("{name} is not a function"));
    };
    let len = items.borrow().len();
    let item_at = |i: usize| items.borrow().get(i).cloned().unwrap_or(Value::Undefined);

    match name {
        "push" => {
            check_array_length(len + args.len())?;
            let mut items = items.borrow_mut();
            items.extend(args);
            Ok(Value::from(items.len()))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            })
        }
        "unshift" => {
            check_array_length(len + args.len())?;
            let mut items = items.borrow_mut();
            items.splice(0..0, args);
            Ok(Value::from(items.len()))
        }
        "join" | "toString" => {
            let separator = match args.first() {
                Some(value) if name == "join" && !value.is_undefined() => to_js_string(value),
                _ => ",".to_string(),
            };
            let snapshot = items.borrow().clone();
            let mut out = String::new();
            for (i, item) in snapshot.iter().enumerate() {
                if i > 0 {
                    out.push_str(&separator);
                }
                if !item.is_nullish() {
                    out.push_str(&to_js_string(item));
                }
                check_string_length(out.len())?;
            }
            Ok(Value::Str(out))
        }
        "map" | "filter" | "forEach" | "some" | "every" | "find" | "findIndex" | "findLast"
        | "findLastIndex" | "flatMap" => {
            let callback = arg(&args, 0);
            expect_callable(&callback)?;
            let reverse = matches!(name, "findLast" | "findLastIndex");
            let mut out = Vec::new();
            for step in 0..len {
                let i = if reverse { len - 1 - step } else { step };
                let item = item_at(i);
                let result = interp.call_value(
                    &callback,
                    Value::Undefined,
                    vec![item.clone(), Value::from(i), this.clone()],
                )?;
                match name {
                    "map" => out.push(result),
                    "flatMap" => flatten_into(&mut out, std::slice::from_ref(&result), 1, 0)?,
                    "filter" if result.truthy() => out.push(item),
                    "some" if result.truthy() => return Ok(Value::Bool(true)),
                    "every" if !result.truthy() => return Ok(Value::Bool(false)),
                    "find" | "findLast" if result.truthy() => return Ok(item),
                    "findIndex" | "findLastIndex" if result.truthy() => return Ok(Value::from(i)),
                    _ => {}
                }
            }
            Ok(match name {
                "map" | "filter" | "flatMap" => Value::array(out),
                "some" => Value::Bool(false),
                "every" => Value::Bool(true),
                "findIndex" | "findLastIndex" => Value::Number(-1.0),
                _ => Value::Undefined,
            })
        }
        "reduce" | "reduceRight" => {
            let callback = arg(&args, 0);
            expect_callable(&callback)?;
            let mut order: Vec<usize> = (0..len).collect();
            if name == "reduceRight" {
                order.reverse();
            }
            let mut order = order.into_iter();
            let mut acc = if args.len() >= 2 {
                arg(&args, 1)
            } else {
                match order.next() {
                    Some(i) => item_at(i),
                    None => {
                        return throw(
                            ErrorKind::TypeError,
                            "Reduce of empty array with no initial value",
                        )
                    }
                }
            };
            for i in order {
                acc = interp.call_value(
                    &callback,
                    Value::Undefined,
                    vec![acc, item_at(i), Value::from(i), this.clone()],
                )?;
            }
            Ok(acc)
        }
        "includes" => {
            let needle = arg(&args, 0);
            let from = relative(&args, 1, 0, len);
            Ok(Value::Bool(
                items.borrow().iter().skip(from).any(|item| same_value_zero(item, &needle)),
            ))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            let from = relative(&args, 1, 0, len);
            let found = items
                .borrow()
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, item)| strict_equals(item, &needle))
                .map(|(i, _)| i);
            Ok(index_value(found))
        }
        "lastIndexOf" => {
            let needle = arg(&args, 0);
            let found = items
                .borrow()
                .iter()
                .enumerate()
                .rev()
                .find(|(_, item)| strict_equals(item, &needle))
                .map(|(i, _)| i);
            Ok(index_value(found))
        }
        "slice" => {
            let start = relative(&args, 0, 0, len);
            let end = relative(&args, 1, len, len);
            let items = items.borrow();
            Ok(Value::array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            }))
        }
        "splice" => {
            let start = relative(&args, 0, 0, len);
            let delete = match args.get(1) {
                None => len - start,
                Some(value) => position(std::slice::from_ref(value), 0, 0, len - start),
            };
            let inserted: Vec<Value> = args.into_iter().skip(2).collect();
            check_array_length(len - delete + inserted.len())?;
            let removed: Vec<Value> = items
                .borrow_mut()
                .splice(start..start + delete, inserted)
                .collect();
            Ok(Value::array(removed))
        }
        "concat" => {
            let mut out = items.borrow().clone();
            for value in &args {
                match value {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    _ => out.push(value.clone()),
                }
                check_array_length(out.len())?;
            }
            Ok(Value::array(out))
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(this.clone())
        }
        "sort" => {
            let compare = arg(&args, 0);
            if !compare.is_undefined() {
                expect_callable(&compare)?;
            }
            let snapshot = items.borrow().clone();
            let sorted = merge_sort(interp, snapshot, &compare)?;
            *items.borrow_mut() = sorted;
            Ok(this.clone())
        }
        "flat" => {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1,
                Some(value) => to_integer(to_number(value)),
            };
            let snapshot = items.borrow().clone();
            let mut out = Vec::new();
            flatten_into(&mut out, &snapshot, depth, 0)?;
            Ok(Value::array(out))
        }
        "fill" => {
            let value = arg(&args, 0);
            let start = relative(&args, 1, 0, len);
            let end = relative(&args, 2, len, len);
            for slot in items.borrow_mut().iter_mut().take(end).skip(start) {
                *slot = value.clone();
            }
            Ok(this.clone())
        }
        "at" => {
            let index = to_integer(to_number(&arg(&args, 0)));
            let index = if index < 0 {
                i64::try_from(len).unwrap_or(i64::MAX) + index
            } else {
                index
            };
            Ok(usize::try_from(index).map_or(Value::Undefined, item_at))
        }
        _ => throw(ErrorKind::TypeError, format!("{name} is not a function")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::console::{Console, DiscardSink, MemorySink};
    use crate::script::interp::run_isolated;
    use crate::script::{SandboxLimits, ScriptFault};

    fn eval(source: &str) -> Result<String, ScriptFault> {
        let mut console = Console::new(DiscardSink);
        run_isolated(&mut console, None, SandboxLimits::default(), |interp| {
            interp.run(source).map(|value| console_format(&value))
        })
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("'  Hello '.trim().toUpperCase()").unwrap(), "HELLO");
        assert_eq!(eval("'banana'.indexOf('an', 2)").unwrap(), "3");
        assert_eq!(eval("'banana'.lastIndexOf('an')").unwrap(), "3");
        assert_eq!(eval("'héllo'.slice(-3)").unwrap(), "llo");
        assert_eq!(eval("'abcdef'.substring(4, 1)").unwrap(), "bcd");
        assert_eq!(eval("'a,b,,c'.split(',').length").unwrap(), "4");
        assert_eq!(eval("'abc'.split('')").unwrap(), "[\n  \"a\",\n  \"b\",\n  \"c\"\n]");
        assert_eq!(eval("'5'.padStart(3, '0') + 'x'.padEnd(3, '-')").unwrap(), "005x--");
        assert_eq!(eval("'ab'.repeat(3)").unwrap(), "ababab");
        assert_eq!(eval("'a-b-c'.replace('-', '+')").unwrap(), "a+b-c");
        assert_eq!(eval("'a-b-c'.replaceAll('-', (m) => '[' + m + ']')").unwrap(), "a[-]b[-]c");
        assert_eq!(eval("'hello'.at(-1) + 'hello'.charAt(1)").unwrap(), "oe");
        assert_eq!(eval("'Hello'.startsWith('He') && 'Hello'.endsWith('lo')").unwrap(), "true");
        assert_eq!(eval("'abc'.length").unwrap(), "3");
    }

    #[test]
    fn test_repeat_rejects_negative_counts() {
        let fault = eval("'x'.repeat(-1)").unwrap_err();
        assert_eq!(fault.to_string(), "RangeError: Invalid count value: -1");
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(eval("[1, 2, 3].map(n => n * 2).join('-')").unwrap(), "2-4-6");
        assert_eq!(eval("[1, 2, 3, 4].filter(n => n % 2 === 0).length").unwrap(), "2");
        assert_eq!(eval("[1, 2, 3].reduce((sum, n) => sum + n, 0)").unwrap(), "6");
        assert_eq!(eval("[[1, 2], [3]].reduce((a, b) => a.concat(b))").unwrap(), "[\n  1,\n  2,\n  3\n]");
        assert_eq!(eval("[5, 12, 8].find(n => n > 6)").unwrap(), "12");
        assert_eq!(eval("[5, 12, 8].findIndex(n => n > 100)").unwrap(), "-1");
        assert_eq!(eval("[1, 2].some(n => n > 1) && [1, 2].every(n => n > 0)").unwrap(), "true");
        assert_eq!(eval("[NaN].includes(NaN) && [NaN].indexOf(NaN) === -1").unwrap(), "true");
        assert_eq!(eval("[1, [2, [3, [4]]]].flat(2).length").unwrap(), "4");
        assert_eq!(eval("const a = [1, 2, 3, 4]; a.splice(1, 2, 'x'); a.join()").unwrap(), "1,x,4");
        assert_eq!(eval("const a = [1, 2]; a.push(3, 4); a.shift(); a.unshift(0); a.join()").unwrap(), "0,2,3,4");
        assert_eq!(eval("[1, 2, 3].slice(-2).reverse().join()").unwrap(), "3,2");
        assert_eq!(eval("[1, 2, 3].at(-1)").unwrap(), "3");
    }

    #[test]
    fn test_sort() {
        assert_eq!(eval("[10, 9, 1, 2].sort().join()").unwrap(), "1,10,2,9");
        assert_eq!(eval("[10, 9, 1, 2].sort((a, b) => a - b).join()").unwrap(), "1,2,9,10");
        let source = "
            const people = [{ n: 'b', a: 1 }, { n: 'a', a: 1 }, { n: 'c', a: 0 }];
            people.sort((x, y) => x.a - y.a).map(p => p.n).join('')
        ";
        assert_eq!(eval(source).unwrap(), "cba");
    }

    #[test]
    fn test_reduce_of_empty_array() {
        let fault = eval("[].reduce((a, b) => a + b)").unwrap_err();
        assert_eq!(fault.to_string(), "TypeError: Reduce of empty array with no initial value");
    }

    #[test]
    fn test_numbers_and_math() {
        assert_eq!(eval("(3.14159).toFixed(2)").unwrap(), "3.14");
        assert_eq!(eval("(255).toString(16)").unwrap(), "ff");
        assert_eq!(eval("(0.5).toString(2)").unwrap(), "0.1");
        assert_eq!(eval("Math.round(2.5) + Math.round(-2.5)").unwrap(), "1");
        assert_eq!(eval("Math.max(1, 7, 3) + Math.min()").unwrap(), "Infinity");
        assert_eq!(eval("Math.floor(Math.random() * 10) < 10").unwrap(), "true");
        assert_eq!(eval("parseInt('42px') + parseFloat('1.5e1abc')").unwrap(), "57");
        assert_eq!(eval("parseInt('ff', 16)").unwrap(), "255");
        assert_eq!(eval("isNaN('abc') && Number.isNaN(NaN) && !Number.isNaN('abc')").unwrap(), "true");
        assert_eq!(eval("Number('12') + Number('') + Number(true)").unwrap(), "13");
        assert_eq!(eval("String(12) + Boolean('')").unwrap(), "12false");
        let fault = eval("(1).toFixed(101)").unwrap_err();
        assert_eq!(fault.name, "RangeError");
    }

    #[test]
    fn test_json() {
        assert_eq!(eval("JSON.stringify({ a: [1, 'x'], b: undefined })").unwrap(), r#"{"a":[1,"x"]}"#);
        assert_eq!(eval("JSON.stringify([1], null, 2)").unwrap(), "[\n  1\n]");
        assert_eq!(eval("JSON.parse('{\"k\": [1, 2]}').k[1]").unwrap(), "2");
        assert_eq!(
            eval("let name; try { JSON.parse('{') } catch (e) { name = e.name } name").unwrap(),
            "SyntaxError"
        );
        let fault = eval("const a = []; a.push(a); JSON.stringify(a)").unwrap_err();
        assert_eq!(fault.to_string(), "TypeError: Converting circular structure to JSON");
    }

    #[test]
    fn test_object_statics() {
        assert_eq!(eval("Object.keys({ b: 1, a: 2 }).join()").unwrap(), "b,a");
        assert_eq!(eval("Object.values({ b: 1, a: 2 }).join()").unwrap(), "1,2");
        assert_eq!(eval("Object.entries({ k: 'v' })[0].join('=')").unwrap(), "k=v");
        assert_eq!(eval("Object.assign({ a: 1 }, { b: 2 }, { a: 3 }).a").unwrap(), "3");
        assert_eq!(eval("const o = Object.freeze({ a: 1 }); o.a = 2; o.a").unwrap(), "1");
        assert_eq!(eval("Object.fromEntries([['x', 1]]).x").unwrap(), "1");
        assert_eq!(eval("({ a: 1 }).hasOwnProperty('a')").unwrap(), "true");
        assert_eq!(eval("Array.isArray([]) && !Array.isArray('x')").unwrap(), "true");
        assert_eq!(eval("Array.from('abc', (c, i) => c + i).join('')").unwrap(), "a0b1c2");
        assert_eq!(eval("Array.from({ length: 3 }).length").unwrap(), "3");
        assert_eq!(eval("new Array(2).length").unwrap(), "2");
    }

    #[test]
    fn test_error_constructors() {
        assert_eq!(eval("new RangeError('too big').message").unwrap(), "too big");
        assert_eq!(eval("String(Error('plain'))").unwrap(), "Error: plain");
        let fault = eval("throw new Error('boom')").unwrap_err();
        assert_eq!(fault.to_string(), "Error: boom");
    }

    #[test]
    fn test_console_levels_and_formatting() {
        let sink = MemorySink::new();
        let mut console = Console::new(sink.clone());
        run_isolated(&mut console, None, SandboxLimits::default(), |interp| {
            interp.run(
                "console.info('n', 1.5, true, null); console.error(new TypeError('x')); console.debug(undefined, () => 1)",
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            sink.lines(),
            vec!["n 1.5 true null", "TypeError: x", "undefined [Function (anonymous)]"]
        );
    }

    #[test]
    fn test_deeply_nested_arrays_fault_instead_of_recursing() {
        let build = "let a = []; for (let i = 0; i < 5000; i++) { a = [a]; }";
        assert_eq!(
            eval(&format!(
                "{build} let r; try {{ JSON.stringify(a) }} catch (e) {{ r = e.name }} r"
            ))
            .unwrap(),
            "RangeError"
        );
        assert_eq!(
            eval(&format!("{build} a.flat(Infinity)")).unwrap_err().name,
            "RangeError"
        );
        assert_eq!(eval(&format!("{build} String(a)")).unwrap(), "");
        assert_eq!(eval(&format!("{build} a.flat(2).length")).unwrap(), "1");
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_int("abc", &Value::Undefined).is_nan());
        assert_eq!(parse_int("  -0x1A", &Value::Undefined), -26.0);
        assert_eq!(parse_float("3.5.1"), 3.5);
        assert!(parse_float(".").is_nan());
        assert_eq!(parse_float("-Infinityx"), f64::NEG_INFINITY);
    }
}
