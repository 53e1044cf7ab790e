//! Arena-backed document model for preview rendering.
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`]. Detached
//! nodes stay in the arena until [`Dom::compact`] drops everything that is
//! no longer reachable from the document root.

mod html;
pub mod selector;

pub use selector::{SelectorError, SelectorList};

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text rather than markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Identifier of a node inside a [`Dom`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index of this node.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// A mutable HTML document.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            root: NodeId(0),
        }
    }

    /// Returns the document node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the number of nodes in the arena, detached ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena holds only the document node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Creates a detached element. The tag name is lowercased.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Returns `true` if `id` refers to a node in this arena.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Returns `true` if the node is an element.
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.data),
            Some(NodeData::Element(_))
        )
    }

    /// Returns `true` if the node is a text node.
    #[must_use]
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.data),
            Some(NodeData::Text(_))
        )
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id.0).map(|n| &n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Returns the lowercase tag name of an element.
    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Returns all child nodes.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map_or(&[], |n| n.children.as_slice())
    }

    /// Returns the element children of a node.
    #[must_use]
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Returns `true` if `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Returns all descendants of `scope` in document order, excluding `scope`.
    #[must_use]
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Returns element descendants of `scope` in document order.
    #[must_use]
    pub fn element_descendants(&self, scope: NodeId) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.is_element(*id))
            .collect()
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.element(id).and_then(|el| {
            el.attrs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Returns all attributes of an element in source order.
    #[must_use]
    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        self.element(id).map_or(&[], |el| el.attrs.as_slice())
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if let Some(el) = self.element_mut(id) {
            if let Some(slot) = el.attrs.iter_mut().find(|(k, _)| *k == name) {
                slot.1 = value;
            } else {
                el.attrs.push((name, value));
            }
        }
    }

    /// Removes an attribute. Returns `true` if it was present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.element_mut(id).map_or(false, |el| {
            let before = el.attrs.len();
            el.attrs.retain(|(k, _)| *k != name);
            el.attrs.len() != before
        })
    }

    /// Returns the class list of an element.
    #[must_use]
    pub fn classes(&self, id: NodeId) -> Vec<String> {
        self.attr(id, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Replaces the class list of an element.
    pub fn set_classes(&mut self, id: NodeId, classes: &[String]) {
        self.set_attr(id, "class", classes.join(" "));
    }

    /// Returns `true` if the element carries the class.
    #[must_use]
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|value| value.split_whitespace().any(|c| c == class))
    }

    /// Detaches a node from its parent.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            if let Some(node) = self.nodes.get_mut(parent.0) {
                node.children.retain(|c| *c != id);
            }
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent = None;
        }
    }

    /// Inserts `child` into `parent` at `position`, moving it if attached
    /// elsewhere.
    ///
    /// Returns `false` (and does nothing) if the insertion would create a
    /// cycle or either node is not in the arena.
    pub fn insert_child(&mut self, parent: NodeId, position: usize, child: NodeId) -> bool {
        if !self.contains_node(parent) || !self.contains_node(child) || self.is_text(parent) {
            return false;
        }
        // A childless node can only be an ancestor of itself.
        let cycle = if self.children(child).is_empty() {
            child == parent
        } else {
            self.is_inclusive_ancestor(child, parent)
        };
        if cycle {
            return false;
        }
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let position = position.min(children.len());
        children.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    /// Appends `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let end = self.children(parent).len();
        self.insert_child(parent, end, child)
    }

    /// Appends a freshly created, detached `child` without the cycle check.
    pub(super) fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Removes every child of a node.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = self
            .nodes
            .get_mut(id.0)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Returns the concatenated text of a node and its descendants.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(NodeData::Text(text)) = self.nodes.get(id.0).map(|n| &n.data) {
            return text.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|d| match &self.nodes[d.0].data {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replaces the children of a node with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        if let Some(NodeData::Text(existing)) = self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            *existing = text.to_string();
            return;
        }
        self.clear_children(id);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(id, text_node);
        }
    }

    /// Parses `markup` and appends the resulting nodes to `parent`.
    pub fn append_html(&mut self, parent: NodeId, markup: &str) {
        if !self.contains_node(parent) || self.is_text(parent) {
            return;
        }
        html::parse_fragment(self, parent, markup);
    }

    /// Replaces the children of `id` with the parsed `markup`.
    pub fn set_inner_html(&mut self, id: NodeId, markup: &str) {
        self.clear_children(id);
        self.append_html(id, markup);
    }

    /// Serializes the children of a node.
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let raw = self.tag_name(id).is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
        for child in self.children(id) {
            self.serialize(*child, raw, &mut out);
        }
        out
    }

    /// Serializes a node including its own tag.
    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let raw = self
            .parent(id)
            .and_then(|p| self.tag_name(p))
            .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
        let mut out = String::new();
        self.serialize(id, raw, &mut out);
        out
    }

    fn serialize(&self, id: NodeId, raw_text: bool, out: &mut String) {
        enum Step {
            Open(NodeId, bool),
            Close(NodeId),
        }

        let mut stack = vec![Step::Open(id, raw_text)];
        while let Some(step) = stack.pop() {
            let id = match step {
                Step::Close(id) => {
                    if let Some(el) = self.element(id) {
                        out.push_str("</");
                        out.push_str(&el.tag);
                        out.push('>');
                    }
                    continue;
                }
                Step::Open(id, raw_text) => match &self.nodes[id.0].data {
                    NodeData::Document => {
                        stack.extend(
                            self.children(id)
                                .iter()
                                .rev()
                                .map(|child| Step::Open(*child, false)),
                        );
                        continue;
                    }
                    NodeData::Text(text) => {
                        if raw_text {
                            out.push_str(text);
                        } else {
                            out.push_str(&escape_text(text));
                        }
                        continue;
                    }
                    NodeData::Element(_) => id,
                },
            };

            let Some(el) = self.element(id) else { continue };
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                continue;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
            stack.push(Step::Close(id));
            stack.extend(
                self.children(id)
                    .iter()
                    .rev()
                    .map(|child| Step::Open(*child, raw)),
            );
        }
    }

    /// Finds the first element below `scope` whose `id` attribute matches.
    #[must_use]
    pub fn find_by_id(&self, scope: NodeId, id: &str) -> Option<NodeId> {
        self.element_descendants(scope)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(id))
    }

    /// Returns every element below `scope` matching `selector`.
    #[must_use]
    pub fn select_all(&self, scope: NodeId, selector: &SelectorList) -> Vec<NodeId> {
        self.select_all_within(scope, scope, selector)
    }

    /// Like [`Dom::select_all`], but combinators may match ancestors up to
    /// (excluding) `boundary` instead of stopping at `scope`.
    #[must_use]
    pub fn select_all_within(
        &self,
        scope: NodeId,
        boundary: NodeId,
        selector: &SelectorList,
    ) -> Vec<NodeId> {
        self.element_descendants(scope)
            .into_iter()
            .filter(|n| selector.matches(self, *n, boundary))
            .collect()
    }

    /// Returns the first element below `scope` matching `selector`.
    #[must_use]
    pub fn select_first(&self, scope: NodeId, selector: &SelectorList) -> Option<NodeId> {
        self.select_all_within(scope, scope, selector).into_iter().next()
    }

    /// Drops every node that is not reachable from the document root.
    ///
    /// All previously issued [`NodeId`]s become invalid; the returned
    /// closure maps an old id to its new one (or `None` if it was dropped).
    pub fn compact(&mut self) -> impl Fn(NodeId) -> Option<NodeId> {
        let mut keep = vec![false; self.nodes.len()];
        keep[self.root.0] = true;
        for id in self.descendants(self.root) {
            keep[id.0] = true;
        }

        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.nodes.len());
        let mut next = 0usize;
        for kept in &keep {
            if *kept {
                remap.push(Some(next));
                next += 1;
            } else {
                remap.push(None);
            }
        }

        let old = std::mem::take(&mut self.nodes);
        self.nodes = old
            .into_iter()
            .zip(keep)
            .filter_map(|(node, kept)| kept.then_some(node))
            .map(|mut node| {
                node.parent = node.parent.and_then(|p| remap[p.0]).map(NodeId);
                node.children = node
                    .children
                    .iter()
                    .filter_map(|c| remap[c.0].map(NodeId))
                    .collect();
                node
            })
            .collect();
        self.root = NodeId(remap[self.root.0].unwrap_or(0));

        move |id: NodeId| remap.get(id.0).copied().flatten().map(NodeId)
    }
}

/// Escapes text content for serialization.
#[must_use]
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Parses an inline `style` attribute into ordered declarations.
#[must_use]
pub fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            (!name.is_empty() && !value.is_empty()).then(|| (name, value.to_string()))
        })
        .collect()
}

/// Serializes declarations back into a `style` attribute value.
#[must_use]
pub fn serialize_style(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn doc(markup: &str) -> Dom {
        let mut dom = Dom::new();
        let root = dom.root();
        dom.append_html(root, markup);
        dom
    }

    #[test]
    fn test_round_trip_serialization() {
        let markup = r#"<ul class="list"><li>One</li><li>Two &amp; three</li></ul><br>"#;
        let dom = doc(markup);
        assert_eq!(dom.inner_html(dom.root()), markup);
    }

    #[test]
    fn test_text_content_concatenates_descendants() {
        let dom = doc("<p>Hello <b>big</b> world</p>");
        assert_eq!(dom.text_content(dom.root()), "Hello big world");
    }

    #[test]
    fn test_set_text_content_replaces_children() {
        let mut dom = doc(r#"<p id="x">old <i>stuff</i></p>"#);
        let p = dom.find_by_id(dom.root(), "x").unwrap();
        dom.set_text_content(p, "<new>");
        assert_eq!(dom.inner_html(dom.root()), r#"<p id="x">&lt;new&gt;</p>"#);
    }

    #[test]
    fn test_append_child_rejects_cycles() {
        let mut dom = doc(r#"<div id="outer"><div id="inner"></div></div>"#);
        let outer = dom.find_by_id(dom.root(), "outer").unwrap();
        let inner = dom.find_by_id(dom.root(), "inner").unwrap();
        assert!(!dom.append_child(inner, outer));
        assert!(dom.append_child(dom.root(), inner));
        assert_eq!(dom.parent(inner), Some(dom.root()));
    }

    #[test]
    fn test_deep_nesting_parses_and_serializes() {
        let depth = 100_000;
        let markup = format!("{}x{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let dom = doc(&markup);
        assert_eq!(dom.len(), depth + 2);
        assert_eq!(dom.inner_html(dom.root()), markup);
    }

    #[test]
    fn test_childless_node_cannot_contain_itself() {
        let mut dom = Dom::new();
        let p = dom.create_element("p");
        assert!(!dom.append_child(p, p));
        assert!(dom.append_child(dom.root(), p));
    }

    #[test]
    fn test_classes() {
        let mut dom = doc(r#"<div id="d" class="a  b"></div>"#);
        let d = dom.find_by_id(dom.root(), "d").unwrap();
        assert!(dom.has_class(d, "a"));
        assert!(!dom.has_class(d, "c"));
        dom.set_classes(d, &["b".to_string(), "c".to_string()]);
        assert_eq!(dom.attr(d, "class"), Some("b c"));
    }

    #[test]
    fn test_compact_drops_detached_nodes() {
        let mut dom = doc(r#"<div id="keep"><span>x</span></div>"#);
        let detached = dom.create_element("p");
        let keep = dom.find_by_id(dom.root(), "keep").unwrap();
        let before = dom.len();

        let remap = dom.compact();
        assert_eq!(remap(detached), None);
        let keep = remap(keep).unwrap();
        assert_eq!(dom.len(), before - 1);
        assert_eq!(dom.attr(keep, "id"), Some("keep"));
        assert_eq!(dom.inner_html(dom.root()), r#"<div id="keep"><span>x</span></div>"#);
    }

    #[test]
    fn test_style_parse_and_serialize() {
        let decls = parse_style("color: red; background-color:blue;;");
        assert_eq!(
            decls,
            vec![
                ("color".to_string(), "red".to_string()),
                ("background-color".to_string(), "blue".to_string())
            ]
        );
        assert_eq!(serialize_style(&decls), "color: red; background-color: blue;");
    }
}
