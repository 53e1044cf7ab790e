//! Lenient HTML fragment parser.
//!
//! Handles void and self-closing elements, raw-text `style`/`script`
//! content, comments, doctypes and the common named entities. Unbalanced
//! closing tags are ignored and unclosed elements are closed at the end of
//! the fragment.

use super::{Dom, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS};

/// Parses `markup` and appends the resulting nodes under `parent`.
pub(super) fn parse_fragment(dom: &mut Dom, parent: NodeId, markup: &str) {
    let mut parser = Parser {
        src: markup,
        pos: 0,
        stack: vec![parent],
        text: String::new(),
    };
    parser.run(dom);
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    stack: Vec<NodeId>,
    text: String,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn current(&self) -> NodeId {
        // The fragment parent is never popped.
        self.stack[self.stack.len() - 1]
    }

    fn flush_text(&mut self, dom: &mut Dom) {
        if self.text.is_empty() {
            return;
        }
        let decoded = decode_entities(&std::mem::take(&mut self.text));
        let node = dom.create_text(decoded);
        let parent = self.current();
        dom.push_child(parent, node);
    }

    fn run(&mut self, dom: &mut Dom) {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if let Some(after) = rest.strip_prefix("<!--") {
                self.flush_text(dom);
                self.pos += 4 + after.find("-->").map_or(after.len(), |end| end + 3);
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.flush_text(dom);
                self.pos += rest.find('>').map_or(rest.len(), |end| end + 1);
            } else if rest.starts_with("</") && starts_with_tag_char(&rest[2..]) {
                self.flush_text(dom);
                self.close_tag(dom);
            } else if rest.starts_with('<') && starts_with_tag_char(&rest[1..]) {
                self.flush_text(dom);
                self.open_tag(dom);
            } else {
                let ch_len = rest.chars().next().map_or(1, char::len_utf8);
                self.text.push_str(&rest[..ch_len]);
                self.pos += ch_len;
            }
        }
        self.flush_text(dom);
    }

    fn close_tag(&mut self, dom: &Dom) {
        let rest = self.rest();
        let end = rest.find('>').map_or(rest.len(), |e| e + 1);
        let name = rest[2..end]
            .trim_end_matches('>')
            .trim()
            .to_ascii_lowercase();
        self.pos += end;

        // Pop back to the nearest open element with this tag, if any.
        if let Some(depth) = self
            .stack
            .iter()
            .skip(1)
            .rposition(|id| dom.tag_name(*id) == Some(name.as_str()))
        {
            self.stack.truncate(depth + 1);
        }
    }

    fn open_tag(&mut self, dom: &mut Dom) {
        self.pos += 1;
        let name = self.read_while(|c| !c.is_whitespace() && c != '>' && c != '/');
        let tag = name.to_ascii_lowercase();
        let element = dom.create_element(&tag);

        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                break;
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }
            let attr_name = self.read_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/');
            if attr_name.is_empty() {
                self.pos += 1;
                continue;
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.read_attr_value()
            } else {
                String::new()
            };
            if dom.attr(element, &attr_name).is_none() {
                dom.set_attr(element, &attr_name, decode_entities(&value));
            }
        }

        let parent = self.current();
        dom.push_child(parent, element);

        if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
            return;
        }
        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            let rest = self.rest();
            let closing = format!("</{tag}");
            let end = rest.to_ascii_lowercase().find(&closing).unwrap_or(rest.len());
            if end > 0 {
                let text = dom.create_text(&rest[..end]);
                dom.push_child(element, text);
            }
            self.pos += end;
            let rest = self.rest();
            self.pos += rest.find('>').map_or(rest.len(), |e| e + 1);
            return;
        }
        self.stack.push(element);
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += end;
        rest[..end].to_string()
    }

    fn skip_whitespace(&mut self) {
        self.read_while(char::is_whitespace);
    }

    fn read_attr_value(&mut self) -> String {
        let rest = self.rest();
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body.find(quote).unwrap_or(body.len());
                self.pos += 1 + end + usize::from(end < body.len());
                body[..end].to_string()
            }
            _ => self.read_while(|c| !c.is_whitespace() && c != '>'),
        }
    }
}

fn starts_with_tag_char(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Decodes the named and numeric character references used in exercise
/// fixtures.
pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            decode_entity(entity).map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "copy" => Some('\u{a9}'),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
