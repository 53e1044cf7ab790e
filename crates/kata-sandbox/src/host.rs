//! The host page that previews render into.

use crate::dom::{Dom, NodeId};
use crate::error::{Result, SandboxError};

/// `id` of the element every preview renders into.
pub const PREVIEW_CONTAINER_ID: &str = "kata-preview";

/// A document holding a single preview container.
///
/// Element lookups made by scripts start at the *lookup root*, which is the
/// page body unless a [`ConfinedLookup`] guard narrows it to the container.
#[derive(Debug, Clone)]
pub struct HostPage {
    dom: Dom,
    body: NodeId,
    container: NodeId,
    lookup_root: NodeId,
}

impl Default for HostPage {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPage {
    /// Creates the default page: a body holding only the preview container.
    #[must_use]
    pub fn new() -> Self {
        let mut dom = Dom::new();
        let root = dom.root();
        let body = dom.create_element("body");
        dom.append_child(root, body);
        let container = dom.create_element("div");
        dom.set_attr(container, "id", PREVIEW_CONTAINER_ID);
        dom.append_child(body, container);
        Self {
            dom,
            body,
            container,
            lookup_root: body,
        }
    }

    /// Builds a page from an HTML template that contains an element with
    /// `id="kata-preview"`.
    pub fn from_template(markup: &str) -> Result<Self> {
        let mut dom = Dom::new();
        let root = dom.root();
        dom.append_html(root, markup);
        let container = dom
            .find_by_id(root, PREVIEW_CONTAINER_ID)
            .ok_or_else(|| SandboxError::container_missing(PREVIEW_CONTAINER_ID))?;
        let body = dom
            .element_descendants(root)
            .into_iter()
            .find(|id| dom.tag_name(*id) == Some("body"))
            .unwrap_or(root);
        Ok(Self {
            dom,
            body,
            container,
            lookup_root: body,
        })
    }

    /// Returns the page document.
    #[must_use]
    pub const fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Returns the page document mutably.
    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    /// Returns the page body.
    #[must_use]
    pub const fn body(&self) -> NodeId {
        self.body
    }

    /// Returns the preview container.
    #[must_use]
    pub const fn container(&self) -> NodeId {
        self.container
    }

    /// Returns the node element lookups currently start from.
    #[must_use]
    pub const fn lookup_root(&self) -> NodeId {
        self.lookup_root
    }

    /// Confines element lookups to the preview container until the
    /// returned guard is dropped.
    pub fn confine(&mut self) -> ConfinedLookup<'_> {
        let previous = self.lookup_root;
        self.lookup_root = self.container;
        ConfinedLookup {
            page: self,
            previous,
        }
    }

    /// Empties the preview container and drops every detached node.
    ///
    /// A body or container found outside the page is put back first, so the
    /// page layout always survives a reset.
    pub fn reset_preview(&mut self) {
        let root = self.dom.root();
        if !self.dom.is_inclusive_ancestor(root, self.body) {
            self.dom.detach(self.body);
            self.dom.append_child(root, self.body);
        }
        if !self.dom.is_inclusive_ancestor(root, self.container) {
            self.dom.detach(self.container);
            self.dom.append_child(self.body, self.container);
        }
        self.dom.clear_children(self.container);
        let remap = self.dom.compact();
        self.body = remap(self.body).unwrap_or(self.body);
        self.container = remap(self.container).unwrap_or(self.container);
        self.lookup_root = remap(self.lookup_root).unwrap_or(self.body);
    }

    /// Replaces the container content with parsed markup.
    pub fn set_preview_html(&mut self, markup: &str) {
        self.dom.set_inner_html(self.container, markup);
    }

    /// Serializes the container content.
    #[must_use]
    pub fn preview_html(&self) -> String {
        self.dom.inner_html(self.container)
    }

    /// Serializes the whole page.
    #[must_use]
    pub fn html(&self) -> String {
        self.dom.inner_html(self.dom.root())
    }
}

/// Guard returned by [`HostPage::confine`].
#[derive(Debug)]
pub struct ConfinedLookup<'p> {
    page: &'p mut HostPage,
    previous: NodeId,
}

impl ConfinedLookup<'_> {
    /// Returns the confined page.
    pub fn page(&mut self) -> &mut HostPage {
        self.page
    }
}

impl Drop for ConfinedLookup<'_> {
    fn drop(&mut self) {
        self.page.lookup_root = self.previous;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_layout() {
        let page = HostPage::new();
        assert_eq!(page.html(), r#"<body><div id="kata-preview"></div></body>"#);
        assert_eq!(page.lookup_root(), page.body());
        assert_ne!(page.container(), page.body());
    }

    #[test]
    fn test_confine_restores_lookup_root() {
        let mut page = HostPage::new();
        {
            let mut confined = page.confine();
            let page = confined.page();
            assert_eq!(page.lookup_root(), page.container());
        }
        assert_eq!(page.lookup_root(), page.body());
    }

    #[test]
    fn test_reset_preview_collects_garbage() {
        let mut page = HostPage::new();
        page.set_preview_html("<p>one</p><p>two</p>");
        page.dom_mut().create_element("span");
        page.reset_preview();
        assert_eq!(page.dom().len(), 3);
        assert_eq!(page.preview_html(), "");
        assert_eq!(page.html(), r#"<body><div id="kata-preview"></div></body>"#);
    }

    #[test]
    fn test_reset_preview_reattaches_detached_container() {
        let mut page = HostPage::new();
        let stray = page.dom_mut().create_element("div");
        let container = page.container();
        page.dom_mut().append_child(stray, container);
        assert_eq!(page.html(), "<body></body>");

        page.reset_preview();
        assert_eq!(page.html(), r#"<body><div id="kata-preview"></div></body>"#);
        page.set_preview_html("<h1>after</h1>");
        assert_eq!(page.preview_html(), "<h1>after</h1>");
        assert_eq!(
            page.html(),
            r#"<body><div id="kata-preview"><h1>after</h1></div></body>"#
        );
    }

    #[test]
    fn test_from_template() {
        let page = HostPage::from_template(
            r#"<html><body><header>Kata</header><main id="kata-preview"></main></body></html>"#,
        )
        .unwrap();
        assert_eq!(page.dom().tag_name(page.container()), Some("main"));
        assert_eq!(page.dom().tag_name(page.body()), Some("body"));

        let err = HostPage::from_template("<div></div>").unwrap_err();
        assert!(err.to_string().contains("kata-preview"));
    }
}
