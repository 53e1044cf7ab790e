//! `document`, element, `style` and `classList` bindings.
//!
//! Every lookup starts at the page's lookup root. While a preview runs that
//! root is the preview container, so scripts cannot reach the rest of the
//! host page: `parentElement` stops at the root and selector combinators
//! never match ancestors above it.

use super::interp::{throw, Eval, Interpreter, Interrupt};
use super::value::{to_js_string, ErrorKind, HostRef, Value};
use crate::dom::{parse_style, serialize_style, Dom, NodeId, SelectorList};
use crate::host::HostPage;

const DOCUMENT_METHODS: &[&str] = &[
    "getElementById", "querySelector", "querySelectorAll", "getElementsByClassName",
    "getElementsByTagName", "createElement", "createTextNode", "addEventListener",
    "removeEventListener",
];

const ELEMENT_METHODS: &[&str] = &[
    "getAttribute", "setAttribute", "removeAttribute", "hasAttribute", "appendChild",
    "removeChild", "remove", "append", "prepend", "insertBefore", "contains", "querySelector",
    "querySelectorAll", "getElementsByClassName", "getElementsByTagName", "addEventListener",
    "removeEventListener", "matches", "closest",
];

const STYLE_METHODS: &[&str] = &["setProperty", "getPropertyValue", "removeProperty"];
const CLASS_LIST_METHODS: &[&str] = &["add", "remove", "toggle", "contains"];

/// Attributes exposed as same-named string properties.
const REFLECTED_ATTRIBUTES: &[&str] = &[
    "id", "value", "href", "src", "alt", "title", "type", "placeholder", "name",
];

/// Attributes exposed as boolean properties.
const BOOLEAN_ATTRIBUTES: &[&str] = &["hidden", "disabled", "checked"];

fn bound(receiver: &Value, methods: &'static [&'static str], key: &str) -> Option<Value> {
    methods
        .iter()
        .copied()
        .find(|name| *name == key)
        .map(|name| Value::native(receiver.clone(), name))
}

fn page_mut<'a>(interp: &'a mut Interpreter<'_>) -> Eval<&'a mut HostPage> {
    match interp.page_mut() {
        Some(page) => Ok(page),
        None => throw(ErrorKind::ReferenceError, "document is not defined"),
    }
}

/// Throws a `DOMException`-style error with the given name.
fn dom_exception<T>(name: &str, message: &str) -> Eval<T> {
    Err(Interrupt::Throw(Value::error(name, message)))
}

fn node_arg(args: &[Value], index: usize, method: &str) -> Eval<NodeId> {
    match args.get(index) {
        Some(Value::Node(id)) => Ok(*id),
        _ => throw(
            ErrorKind::TypeError,
            format!(
                "Failed to execute '{method}' on 'Node': parameter {} is not of type 'Node'.",
                index + 1
            ),
        ),
    }
}

fn string_arg(args: &[Value], index: usize) -> String {
    args.get(index).map(to_js_string).unwrap_or_default()
}

fn nodes(ids: impl IntoIterator<Item = NodeId>) -> Value {
    Value::array(ids.into_iter().map(Value::Node).collect())
}

fn node_or_null(id: Option<NodeId>) -> Value {
    id.map_or(Value::Null, Value::Node)
}

fn parse_selector(source: &str, method: &str, owner: &str) -> Eval<SelectorList> {
    SelectorList::parse(source).or_else(|e| {
        throw(
            ErrorKind::SyntaxError,
            format!("Failed to execute '{method}' on '{owner}': {e}."),
        )
    })
}

/// Converts `backgroundColor` to `background-color`.
fn css_property_name(key: &str) -> String {
    if key == "cssFloat" {
        return "float".to_string();
    }
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Properties
// ============================================================================

pub fn get_property(interp: &mut Interpreter<'_>, object: &Value, key: &str) -> Eval<Value> {
    let page = page_mut(interp)?;
    Ok(match object {
        Value::Host(HostRef::Document) => match key {
            "body" => Value::Node(page.lookup_root()),
            _ => bound(object, DOCUMENT_METHODS, key).unwrap_or(Value::Undefined),
        },
        Value::Host(HostRef::Style(id)) => {
            if let Some(method) = bound(object, STYLE_METHODS, key) {
                return Ok(method);
            }
            let style = page.dom().attr(*id, "style").unwrap_or_default();
            if key == "cssText" {
                return Ok(Value::from(style));
            }
            let name = css_property_name(key);
            let value = parse_style(style)
                .into_iter()
                .find(|(decl, _)| *decl == name)
                .map(|(_, value)| value)
                .unwrap_or_default();
            Value::Str(value)
        }
        Value::Host(HostRef::ClassList(id)) => match key {
            "length" => Value::from(page.dom().classes(*id).len()),
            "value" => Value::from(page.dom().attr(*id, "class").unwrap_or_default()),
            _ => bound(object, CLASS_LIST_METHODS, key).unwrap_or(Value::Undefined),
        },
        Value::Node(id) => element_property(page, object, *id, key),
        _ => Value::Undefined,
    })
}

fn element_property(page: &HostPage, object: &Value, id: NodeId, key: &str) -> Value {
    let dom = page.dom();
    if dom.is_text(id) {
        return match key {
            "textContent" | "nodeValue" | "data" => Value::Str(dom.text_content(id)),
            "nodeName" => Value::from("#text"),
            "nodeType" => Value::Number(3.0),
            "parentElement" | "parentNode" => node_or_null(parent_within(page, id)),
            _ => Value::Undefined,
        };
    }
    let siblings = |offset: isize| sibling(dom, id, offset);
    match key {
        "textContent" | "innerText" => Value::Str(dom.text_content(id)),
        "innerHTML" => Value::Str(dom.inner_html(id)),
        "outerHTML" => Value::Str(dom.outer_html(id)),
        "className" => Value::from(dom.attr(id, "class").unwrap_or_default()),
        "tagName" | "nodeName" => {
            Value::Str(dom.tag_name(id).unwrap_or_default().to_ascii_uppercase())
        }
        "nodeType" => Value::Number(1.0),
        "children" => nodes(dom.element_children(id)),
        "childNodes" => nodes(dom.children(id).iter().copied()),
        "childElementCount" => Value::from(dom.element_children(id).len()),
        "firstElementChild" => node_or_null(dom.element_children(id).first().copied()),
        "lastElementChild" => node_or_null(dom.element_children(id).last().copied()),
        "firstChild" => node_or_null(dom.children(id).first().copied()),
        "lastChild" => node_or_null(dom.children(id).last().copied()),
        "nextElementSibling" => node_or_null(element_sibling(dom, id, true)),
        "previousElementSibling" => node_or_null(element_sibling(dom, id, false)),
        "nextSibling" => node_or_null(siblings(1)),
        "previousSibling" => node_or_null(siblings(-1)),
        "parentElement" | "parentNode" => node_or_null(parent_within(page, id)),
        "style" => Value::Host(HostRef::Style(id)),
        "classList" => Value::Host(HostRef::ClassList(id)),
        _ if REFLECTED_ATTRIBUTES.contains(&key) => {
            Value::from(dom.attr(id, key).unwrap_or_default())
        }
        _ if BOOLEAN_ATTRIBUTES.contains(&key) => Value::Bool(dom.attr(id, key).is_some()),
        _ => bound(object, ELEMENT_METHODS, key).unwrap_or(Value::Undefined),
    }
}

/// Parent of `id`, or `None` once the lookup root is reached.
fn parent_within(page: &HostPage, id: NodeId) -> Option<NodeId> {
    if id == page.lookup_root() {
        return None;
    }
    page.dom()
        .parent(id)
        .filter(|parent| page.dom().is_element(*parent))
}

fn sibling(dom: &Dom, id: NodeId, offset: isize) -> Option<NodeId> {
    let siblings = dom.children(dom.parent(id)?);
    let position = siblings.iter().position(|s| *s == id)?;
    siblings.get(position.checked_add_signed(offset)?).copied()
}

fn element_sibling(dom: &Dom, id: NodeId, forward: bool) -> Option<NodeId> {
    let siblings = dom.element_children(dom.parent(id)?);
    let position = siblings.iter().position(|s| *s == id)?;
    if forward {
        siblings.get(position + 1).copied()
    } else {
        position.checked_sub(1).and_then(|p| siblings.get(p).copied())
    }
}

pub fn set_property(
    interp: &mut Interpreter<'_>,
    object: &Value,
    key: &str,
    value: Value,
) -> Eval<()> {
    let page = page_mut(interp)?;
    let dom = page.dom_mut();
    match object {
        Value::Host(HostRef::Style(id)) => {
            if key == "cssText" {
                dom.set_attr(*id, "style", to_js_string(&value));
            } else {
                set_style(dom, *id, &css_property_name(key), &to_js_string(&value));
            }
        }
        Value::Host(HostRef::ClassList(id)) if key == "value" => {
            dom.set_attr(*id, "class", to_js_string(&value));
        }
        Value::Node(id) if dom.is_text(*id) => {
            if matches!(key, "textContent" | "nodeValue" | "data") {
                dom.set_text_content(*id, &to_js_string(&value));
            }
        }
        Value::Node(id) => match key {
            "textContent" | "innerText" => dom.set_text_content(*id, &to_js_string(&value)),
            "innerHTML" => dom.set_inner_html(*id, &to_js_string(&value)),
            "className" => dom.set_attr(*id, "class", to_js_string(&value)),
            "style" => dom.set_attr(*id, "style", to_js_string(&value)),
            _ if REFLECTED_ATTRIBUTES.contains(&key) => {
                dom.set_attr(*id, key, to_js_string(&value));
            }
            _ if BOOLEAN_ATTRIBUTES.contains(&key) => {
                if value.truthy() {
                    dom.set_attr(*id, key, "");
                } else {
                    dom.remove_attr(*id, key);
                }
            }
            _ => tracing::trace!(property = key, "ignoring write to unsupported element property"),
        },
        _ => {}
    }
    Ok(())
}

fn set_style(dom: &mut Dom, id: NodeId, name: &str, value: &str) {
    let mut decls = parse_style(dom.attr(id, "style").unwrap_or_default());
    let value = value.trim();
    match decls.iter_mut().find(|(decl, _)| decl == name) {
        Some(slot) if !value.is_empty() => slot.1 = value.to_string(),
        Some(_) => decls.retain(|(decl, _)| decl != name),
        None if !value.is_empty() => decls.push((name.to_string(), value.to_string())),
        None => {}
    }
    if decls.is_empty() {
        dom.remove_attr(id, "style");
    } else {
        dom.set_attr(id, "style", serialize_style(&decls));
    }
}

// ============================================================================
// Methods
// ============================================================================

pub fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Eval<Value> {
    let page = page_mut(interp)?;
    match receiver {
        Value::Host(HostRef::Document) => document_method(page, name, &args),
        Value::Host(HostRef::Style(id)) => {
            let dom = page.dom_mut();
            let property = string_arg(&args, 0);
            match name {
                "setProperty" => set_style(dom, *id, &property, &string_arg(&args, 1)),
                "removeProperty" => set_style(dom, *id, &property, ""),
                _ => {
                    let value = parse_style(dom.attr(*id, "style").unwrap_or_default())
                        .into_iter()
                        .find(|(decl, _)| *decl == property)
                        .map(|(_, value)| value)
                        .unwrap_or_default();
                    return Ok(Value::Str(value));
                }
            }
            Ok(Value::Undefined)
        }
        Value::Host(HostRef::ClassList(id)) => Ok(class_list_method(page.dom_mut(), *id, name, &args)),
        Value::Node(id) => element_method(page, *id, name, &args),
        _ => throw(ErrorKind::TypeError, format!("{name} is not a function")),
    }
}

fn listener_registered(owner: &str, args: &[Value]) -> Value {
    tracing::debug!(
        owner,
        event = %string_arg(args, 0),
        "listener registered; preview events are not dispatched"
    );
    Value::Undefined
}

fn elements_by_class(dom: &Dom, scope: NodeId, names: &str) -> Value {
    let wanted: Vec<&str> = names.split_whitespace().collect();
    if wanted.is_empty() {
        return Value::array(Vec::new());
    }
    nodes(
        dom.element_descendants(scope)
            .into_iter()
            .filter(|id| wanted.iter().all(|class| dom.has_class(*id, class))),
    )
}

fn elements_by_tag(dom: &Dom, scope: NodeId, tag: &str) -> Value {
    nodes(dom.element_descendants(scope).into_iter().filter(|id| {
        tag == "*"
            || dom
                .tag_name(*id)
                .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }))
}

fn document_method(page: &mut HostPage, name: &str, args: &[Value]) -> Eval<Value> {
    let root = page.lookup_root();
    let dom = page.dom_mut();
    Ok(match name {
        "getElementById" => node_or_null(dom.find_by_id(root, &string_arg(args, 0))),
        "querySelector" | "querySelectorAll" => {
            let selector = parse_selector(&string_arg(args, 0), name, "Document")?;
            let found = dom.select_all_within(root, root, &selector);
            if name == "querySelector" {
                node_or_null(found.first().copied())
            } else {
                nodes(found)
            }
        }
        "getElementsByClassName" => elements_by_class(dom, root, &string_arg(args, 0)),
        "getElementsByTagName" => elements_by_tag(dom, root, &string_arg(args, 0)),
        "createElement" => {
            let tag = string_arg(args, 0).to_ascii_lowercase();
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return dom_exception(
                    "InvalidCharacterError",
                    &format!(
                        "Failed to execute 'createElement' on 'Document': The tag name provided ('{tag}') is not a valid name."
                    ),
                );
            }
            Value::Node(dom.create_element(&tag))
        }
        "createTextNode" => Value::Node(dom.create_text(string_arg(args, 0))),
        "addEventListener" | "removeEventListener" => listener_registered("document", args),
        _ => return throw(ErrorKind::TypeError, format!("document.{name} is not a function")),
    })
}

fn class_list_method(dom: &mut Dom, id: NodeId, name: &str, args: &[Value]) -> Value {
    let mut classes = dom.classes(id);
    let tokens: Vec<String> = args.iter().map(to_js_string).collect();
    let result = match name {
        "contains" => {
            return Value::Bool(tokens.first().is_some_and(|token| classes.contains(token)));
        }
        "add" => {
            for token in tokens {
                if !classes.contains(&token) {
                    classes.push(token);
                }
            }
            Value::Undefined
        }
        "remove" => {
            classes.retain(|class| !tokens.contains(class));
            Value::Undefined
        }
        _ => {
            let Some(token) = tokens.first() else {
                return Value::Bool(false);
            };
            let present = classes.contains(token);
            let wanted = match args.get(1) {
                None | Some(Value::Undefined) => !present,
                Some(force) => force.truthy(),
            };
            if wanted && !present {
                classes.push(token.clone());
            } else if !wanted {
                classes.retain(|class| class != token);
            }
            Value::Bool(wanted)
        }
    };
    dom.set_classes(id, &classes);
    result
}

/// Inserts `child` under `parent` at `position`, reporting cycles the way
/// browsers do.
///
/// The lookup root and its ancestors cannot be moved; otherwise a script
/// could carry the preview container out of the page.
fn insert(
    dom: &mut Dom,
    root: NodeId,
    parent: NodeId,
    position: usize,
    child: NodeId,
    method: &str,
) -> Eval<()> {
    if dom.is_inclusive_ancestor(child, root) {
        return dom_exception(
            "HierarchyRequestError",
            &format!("Failed to execute '{method}' on 'Node': The node cannot be moved out of the preview."),
        );
    }
    if dom.insert_child(parent, position, child) {
        return Ok(());
    }
    dom_exception(
        "HierarchyRequestError",
        &format!("Failed to execute '{method}' on 'Node': The new child element contains the parent."),
    )
}

/// Converts `append`/`prepend` arguments into nodes; strings become text.
fn node_list_arg(dom: &mut Dom, args: &[Value]) -> Vec<NodeId> {
    args.iter()
        .map(|value| match value {
            Value::Node(id) => *id,
            other => dom.create_text(to_js_string(other)),
        })
        .collect()
}

#[allow(clippy::too_many_lines)]
fn element_method(page: &mut HostPage, id: NodeId, name: &str, args: &[Value]) -> Eval<Value> {
    let root = page.lookup_root();
    let dom = page.dom_mut();
    Ok(match name {
        "getAttribute" => dom
            .attr(id, &string_arg(args, 0).to_ascii_lowercase())
            .map_or(Value::Null, Value::from),
        "setAttribute" => {
            dom.set_attr(id, &string_arg(args, 0).to_ascii_lowercase(), string_arg(args, 1));
            Value::Undefined
        }
        "removeAttribute" => {
            dom.remove_attr(id, &string_arg(args, 0).to_ascii_lowercase());
            Value::Undefined
        }
        "hasAttribute" => Value::Bool(
            dom.attr(id, &string_arg(args, 0).to_ascii_lowercase())
                .is_some(),
        ),
        "appendChild" => {
            let child = node_arg(args, 0, name)?;
            let end = dom.children(id).len();
            insert(dom, root, id, end, child, name)?;
            Value::Node(child)
        }
        "append" | "prepend" => {
            let mut position = if name == "append" {
                dom.children(id).len()
            } else {
                0
            };
            for child in node_list_arg(dom, args) {
                insert(dom, root, id, position, child, name)?;
                position = dom
                    .children(id)
                    .iter()
                    .position(|c| *c == child)
                    .map_or(position, |p| p + 1);
            }
            Value::Undefined
        }
        "insertBefore" => {
            let child = node_arg(args, 0, name)?;
            let position = match args.get(1) {
                None | Some(Value::Null | Value::Undefined) => dom.children(id).len(),
                Some(Value::Node(reference)) => {
                    match dom.children(id).iter().position(|c| c == reference) {
                        Some(position) => position,
                        None => {
                            return dom_exception(
                                "NotFoundError",
                                "Failed to execute 'insertBefore' on 'Node': The node before which the new node is to be inserted is not a child of this node.",
                            )
                        }
                    }
                }
                Some(_) => return node_arg(args, 1, name).map(|_| Value::Undefined),
            };
            insert(dom, root, id, position, child, name)?;
            Value::Node(child)
        }
        "removeChild" => {
            let child = node_arg(args, 0, name)?;
            if dom.parent(child) != Some(id) || dom.is_inclusive_ancestor(child, root) {
                return dom_exception(
                    "NotFoundError",
                    "Failed to execute 'removeChild' on 'Node': The node to be removed is not a child of this node.",
                );
            }
            dom.detach(child);
            Value::Node(child)
        }
        "remove" => {
            // The lookup root and its ancestors stay attached.
            if !dom.is_inclusive_ancestor(id, root) {
                dom.detach(id);
            }
            Value::Undefined
        }
        "contains" => Value::Bool(match args.first() {
            Some(Value::Node(other)) => dom.is_inclusive_ancestor(id, *other),
            _ => false,
        }),
        "querySelector" | "querySelectorAll" => {
            let selector = parse_selector(&string_arg(args, 0), name, "Element")?;
            let found = dom.select_all_within(id, root, &selector);
            if name == "querySelector" {
                node_or_null(found.first().copied())
            } else {
                nodes(found)
            }
        }
        "matches" => {
            let selector = parse_selector(&string_arg(args, 0), name, "Element")?;
            Value::Bool(dom.is_element(id) && selector.matches(dom, id, root))
        }
        "closest" => {
            let selector = parse_selector(&string_arg(args, 0), name, "Element")?;
            let mut current = Some(id);
            let mut found = None;
            while let Some(node) = current {
                if !dom.is_element(node) {
                    break;
                }
                if selector.matches(dom, node, root) {
                    found = Some(node);
                    break;
                }
                if node == root {
                    break;
                }
                current = dom.parent(node);
            }
            node_or_null(found)
        }
        "getElementsByClassName" => elements_by_class(dom, id, &string_arg(args, 0)),
        "getElementsByTagName" => elements_by_tag(dom, id, &string_arg(args, 0)),
        "addEventListener" | "removeEventListener" => listener_registered("element", args),
        _ => return throw(ErrorKind::TypeError, format!("{name} is not a function")),
    })
}
