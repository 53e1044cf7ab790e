//! Stylesheet scoping.
//!
//! Learner stylesheets are rewritten so every rule applies only inside the
//! preview container: each selector gets the container selector as a
//! prefix, and rules that target the page itself (`html`, `body`, `:root`)
//! target the container instead.

/// Rewrites `css` so its rules only match inside `scope`.
///
/// Conditional group rules (`@media`, `@supports`) are scoped recursively;
/// other at-rules are kept verbatim. Unterminated blocks are dropped.
#[must_use]
pub fn scope_stylesheet(css: &str, scope: &str) -> String {
    let css = strip_comments(css);
    let mut out = Vec::new();
    let mut rest = css.as_str();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let Some(open) = rest.find(['{', ';']) else {
            break;
        };
        let prelude = rest[..open].trim();
        if rest[open..].starts_with(';') {
            // Statement at-rule such as `@import`.
            out.push(format!("{prelude};"));
            rest = &rest[open + 1..];
            continue;
        }
        let Some(close) = matching_brace(rest, open) else {
            break;
        };
        let block = &rest[open + 1..close];
        rest = &rest[close + 1..];

        let lower = prelude.to_ascii_lowercase();
        if lower.starts_with("@media") || lower.starts_with("@supports") {
            let inner = scope_stylesheet(block, scope);
            out.push(format!("{prelude} {{\n{inner}\n}}"));
        } else if prelude.starts_with('@') {
            out.push(format!("{prelude} {{{block}}}"));
        } else if !prelude.is_empty() {
            let selectors = prelude
                .split(',')
                .map(|sel| scope_selector(sel.trim(), scope))
                .collect::<Vec<_>>()
                .join(", ");
            out.push(format!("{selectors} {{ {} }}", block.trim()));
        }
    }

    out.join("\n")
}

fn scope_selector(selector: &str, scope: &str) -> String {
    for page in ["html", "body", ":root"] {
        if let Some(tail) = selector.strip_prefix(page) {
            if tail.is_empty() {
                return scope.to_string();
            }
            if tail.starts_with([' ', '>', '\t', '\n']) {
                // `body > p` still scopes to the container's children.
                let tail = tail.trim_start();
                return format!("{scope} {tail}");
            }
        }
    }
    format!("{scope} {selector}")
}

fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOPE: &str = "#kata-preview";

    #[test]
    fn test_prefixes_every_selector() {
        assert_eq!(
            scope_stylesheet("h1, .title > span { color: red; }", SCOPE),
            "#kata-preview h1, #kata-preview .title > span { color: red; }"
        );
    }

    #[test]
    fn test_page_selectors_map_to_container() {
        assert_eq!(
            scope_stylesheet("body { margin: 0 } body > p { color: blue }", SCOPE),
            "#kata-preview { margin: 0 }\n#kata-preview > p { color: blue }"
        );
        assert_eq!(
            scope_stylesheet(":root{--c: red}", SCOPE),
            "#kata-preview { --c: red }"
        );
    }

    #[test]
    fn test_media_queries_are_scoped_recursively() {
        assert_eq!(
            scope_stylesheet("@media (max-width: 600px) { p { color: red } }", SCOPE),
            "@media (max-width: 600px) {\n#kata-preview p { color: red }\n}"
        );
    }

    #[test]
    fn test_comments_and_unterminated_blocks() {
        assert_eq!(
            scope_stylesheet("/* hi */ p { color: red } div { color:", SCOPE),
            "#kata-preview p { color: red }"
        );
        assert_eq!(scope_stylesheet("", SCOPE), "");
    }
}
