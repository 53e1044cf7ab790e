//! CSS selector parsing and matching.
//!
//! Supported: type, `*`, `#id`, `.class`, `[attr]`, `[attr=value]`,
//! `:first-child`, `:last-child`, descendant and child combinators and
//! comma-separated groups.

use std::fmt;

use super::{Dom, NodeId};

/// A selector that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{selector}' is not a valid selector")]
pub struct SelectorError {
    /// The selector text as given.
    pub selector: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Id(String),
    Class(String),
    Attr { name: String, value: Option<String> },
    FirstChild,
    LastChild,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    simples: Vec<Simple>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.simples.is_empty()
    }

    fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        let Some(tag) = dom.tag_name(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if expected != "*" && expected != tag {
                return false;
            }
        }
        self.simples.iter().all(|simple| match simple {
            Simple::Id(id) => dom.attr(node, "id") == Some(id.as_str()),
            Simple::Class(class) => dom.has_class(node, class),
            Simple::Attr { name, value } => match (dom.attr(node, name), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Simple::FirstChild => sibling_position(dom, node, true),
            Simple::LastChild => sibling_position(dom, node, false),
        })
    }
}

fn sibling_position(dom: &Dom, node: NodeId, first: bool) -> bool {
    let Some(parent) = dom.parent(node) else {
        return false;
    };
    let siblings = dom.element_children(parent);
    let edge = if first { siblings.first() } else { siblings.last() };
    edge == Some(&node)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    // combinators[i] joins compounds[i] and compounds[i + 1]
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches_at(&self, dom: &Dom, node: NodeId, idx: usize, boundary: NodeId) -> bool {
        if !self.compounds[idx].matches(dom, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        let in_bounds = |id: NodeId| id != boundary && dom.is_inclusive_ancestor(boundary, id);
        match self.combinators[idx - 1] {
            Combinator::Child => dom
                .parent(node)
                .filter(|p| in_bounds(*p))
                .is_some_and(|p| self.matches_at(dom, p, idx - 1, boundary)),
            Combinator::Descendant => {
                let mut current = dom.parent(node);
                while let Some(ancestor) = current.filter(|p| in_bounds(*p)) {
                    if self.matches_at(dom, ancestor, idx - 1, boundary) {
                        return true;
                    }
                    current = dom.parent(ancestor);
                }
                false
            }
        }
    }
}

/// A parsed, comma-separated selector group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    source: String,
    selectors: Vec<Complex>,
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl SelectorList {
    /// Parses a selector group.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let error = || SelectorError {
            selector: source.to_string(),
        };
        let mut selectors = Vec::new();
        for group in split_groups(source).ok_or_else(error)? {
            selectors.push(parse_complex(group).ok_or_else(error)?);
        }
        if selectors.is_empty() {
            return Err(error());
        }
        Ok(Self {
            source: source.to_string(),
            selectors,
        })
    }

    /// Returns `true` if `node` matches any selector in the group.
    ///
    /// Ancestors considered by combinators are limited to strict
    /// descendants of `boundary`.
    #[must_use]
    pub fn matches(&self, dom: &Dom, node: NodeId, boundary: NodeId) -> bool {
        self.selectors.iter().any(|complex| {
            complex.matches_at(dom, node, complex.compounds.len() - 1, boundary)
        })
    }
}

fn split_groups(source: &str) -> Option<Vec<&str>> {
    let mut groups = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth -= 1,
            (None, ',') if depth == 0 => {
                groups.push(source[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return None;
    }
    groups.push(source[start..].trim());
    if groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    Some(groups)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_complex(text: &str) -> Option<Complex> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();
    let mut current = Compound::default();
    let mut pending: Option<Combinator> = None;

    let read_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() || ch == '>' {
            if !current.is_empty() {
                compounds.push(std::mem::take(&mut current));
                pending = Some(Combinator::Descendant);
            }
            if ch == '>' {
                if compounds.is_empty() || pending == Some(Combinator::Child) {
                    return None;
                }
                pending = Some(Combinator::Child);
            }
            i += 1;
            continue;
        }
        if let Some(combinator) = pending.take() {
            combinators.push(combinator);
        }
        match ch {
            '*' => {
                if current.tag.is_some() || !current.simples.is_empty() {
                    return None;
                }
                current.tag = Some("*".to_string());
                i += 1;
            }
            '#' | '.' => {
                i += 1;
                let name = read_ident(&mut i);
                if name.is_empty() {
                    return None;
                }
                current.simples.push(if ch == '#' {
                    Simple::Id(name)
                } else {
                    Simple::Class(name)
                });
            }
            '[' => {
                let close = chars[i..].iter().position(|c| *c == ']')? + i;
                let inner: String = chars[i + 1..close].iter().collect();
                let (name, value) = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim();
                        let unquoted = value
                            .strip_prefix('"')
                            .and_then(|v| v.strip_suffix('"'))
                            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                            .unwrap_or(value);
                        (name.trim(), Some(unquoted.to_string()))
                    }
                    None => (inner.trim(), None),
                };
                if name.is_empty() || !name.chars().all(is_ident_char) {
                    return None;
                }
                current.simples.push(Simple::Attr {
                    name: name.to_ascii_lowercase(),
                    value,
                });
                i = close + 1;
            }
            ':' => {
                i += 1;
                let pseudo = read_ident(&mut i);
                current.simples.push(match pseudo.as_str() {
                    "first-child" => Simple::FirstChild,
                    "last-child" => Simple::LastChild,
                    _ => return None,
                });
            }
            c if is_ident_char(c) => {
                if current.tag.is_some() || !current.simples.is_empty() {
                    return None;
                }
                current.tag = Some(read_ident(&mut i).to_ascii_lowercase());
            }
            _ => return None,
        }
    }

    if current.is_empty() {
        // Trailing combinator such as `div >`.
        if pending == Some(Combinator::Child) || compounds.is_empty() {
            return None;
        }
    } else {
        compounds.push(current);
    }
    if combinators.len() + 1 != compounds.len() {
        return None;
    }
    Some(Complex {
        compounds,
        combinators,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fixture() -> Dom {
        let mut dom = Dom::new();
        let root = dom.root();
        dom.append_html(
            root,
            r#"<div id="app"><ul class="menu main"><li>One</li><li class="on">Two</li><li data-x="y">Three</li></ul><p>Para</p></div>"#,
        );
        dom
    }

    fn texts(dom: &Dom, selector: &str) -> Vec<String> {
        let list = SelectorList::parse(selector).unwrap();
        dom.select_all(dom.root(), &list)
            .into_iter()
            .map(|n| dom.text_content(n))
            .collect()
    }

    #[test]
    fn test_simple_selectors() {
        let dom = fixture();
        assert_eq!(texts(&dom, "li.on"), vec!["Two"]);
        assert_eq!(texts(&dom, "#app > p"), vec!["Para"]);
        assert_eq!(texts(&dom, "[data-x='y']"), vec!["Three"]);
        assert_eq!(texts(&dom, "li[data-x]"), vec!["Three"]);
    }

    #[test]
    fn test_combinators_and_groups() {
        let dom = fixture();
        assert_eq!(texts(&dom, "div li:first-child"), vec!["One"]);
        assert_eq!(texts(&dom, ".menu>li:last-child, p"), vec!["Three", "Para"]);
        assert!(texts(&dom, "p li").is_empty());
        assert_eq!(texts(&dom, "*").len(), 6);
    }

    #[test]
    fn test_boundary_limits_ancestor_matching() {
        let dom = fixture();
        let ul = dom
            .select_first(dom.root(), &SelectorList::parse("ul").unwrap())
            .unwrap();
        let list = SelectorList::parse("div li").unwrap();
        assert!(dom.select_all(ul, &list).is_empty());
        let list = SelectorList::parse("li").unwrap();
        assert_eq!(dom.select_all(ul, &list).len(), 3);
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["", "div,", "> p", "p >", "a + b", "li:hover", "[x", "#", "p!"] {
            let err = SelectorList::parse(bad).unwrap_err();
            assert_eq!(err.to_string(), format!("'{bad}' is not a valid selector"));
        }
    }
}
