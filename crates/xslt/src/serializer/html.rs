//! The `html` output method, following the HTML 4 serialization rules of libxml.

use super::{Encoding, escape_text, write_doctype};
use crate::ast::OutputDeclaration;
use crate::result_tree::{ElementData, NodeId, ResultDocument, ResultNodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "br", "col", "frame", "hr", "img", "input", "isindex", "link", "meta", "param",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "checked", "compact", "declare", "defer", "disabled", "ismap", "multiple", "nohref", "noresize", "noshade",
    "nowrap", "readonly", "selected",
];

const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "b", "basefont", "bdo", "big", "br", "button", "cite", "code", "dfn", "em", "font", "i",
    "img", "input", "kbd", "label", "q", "s", "samp", "select", "small", "span", "strike", "strong", "sub", "sup",
    "textarea", "tt", "u", "var",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "area", "base", "blockquote", "body", "caption", "center", "col", "colgroup", "dd", "dir", "div", "dl",
    "dt", "fieldset", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5", "h6", "head", "hr", "html",
    "iframe", "isindex", "legend", "li", "link", "map", "menu", "meta", "noframes", "noscript", "object", "ol",
    "optgroup", "option", "p", "param", "pre", "script", "style", "table", "tbody", "td", "tfoot", "th", "thead",
    "title", "tr", "ul",
];

fn is_one_of(name: &str, list: &[&str]) -> bool {
    list.iter().any(|candidate| name.eq_ignore_ascii_case(candidate))
}

/// Known block-level elements get formatting newlines. Inline and unknown elements
/// are written as they are.
fn is_formatted(name: &str) -> bool {
    is_one_of(name, BLOCK_ELEMENTS) && !is_one_of(name, INLINE_ELEMENTS)
}

/// Formatting is suppressed inside `p`, `pre` and `param`.
fn allows_newlines(name: &str) -> bool {
    !name.starts_with(['p', 'P'])
}

pub(super) fn serialize(document: &ResultDocument, output: &OutputDeclaration, encoding: Encoding) -> String {
    let mut writer = HtmlWriter {
        document,
        output,
        encoding,
        indent: output.indent.unwrap_or(true),
        out: String::new(),
    };
    writer.write_document();
    writer.out
}

/// A child as written, including the generated content-type `meta` of `head`.
#[derive(Clone, Copy)]
enum Child {
    Node(NodeId),
    ContentTypeMeta,
}

struct HtmlWriter<'d> {
    document: &'d ResultDocument,
    output: &'d OutputDeclaration,
    encoding: Encoding,
    indent: bool,
    out: String,
}

impl HtmlWriter<'_> {
    fn write_document(&mut self) {
        let document = self.document;
        if self.output.doctype_public.is_some() || self.output.doctype_system.is_some() {
            match (&self.output.doctype_public, &self.output.doctype_system) {
                (Some(public), None) => self.out.push_str(&format!("<!DOCTYPE html PUBLIC \"{}\">\n", public)),
                _ => write_doctype("html", self.output, &mut self.out),
            }
        }
        let children: Vec<Child> = document
            .children(document.root())
            .iter()
            .map(|&id| Child::Node(id))
            .collect();
        for (i, &child) in children.iter().enumerate() {
            self.write_child(child, children.get(i + 1).copied(), None);
        }
        if !children.is_empty() {
            self.out.push('\n');
        }
    }

    fn is_text(&self, child: Child) -> bool {
        match child {
            Child::Node(id) => matches!(self.document.node(id).kind, ResultNodeKind::Text { .. }),
            Child::ContentTypeMeta => false,
        }
    }

    fn write_child(&mut self, child: Child, next: Option<Child>, parent: Option<&ElementData>) {
        let document = self.document;
        let id = match child {
            Child::Node(id) => id,
            Child::ContentTypeMeta => {
                self.write_content_type_meta();
                self.newline_after("meta", next, parent);
                return;
            }
        };
        match &document.node(id).kind {
            ResultNodeKind::Root => {}
            ResultNodeKind::Element(element) => {
                self.write_element(id, element);
                self.newline_after(&element.name, next, parent);
            }
            ResultNodeKind::Text {
                content,
                disable_escaping,
            } => {
                let raw = parent.is_some_and(|p| is_one_of(p.local_name(), RAW_TEXT_ELEMENTS));
                if *disable_escaping || raw {
                    self.out.push_str(content);
                } else {
                    escape_text(content, self.encoding, &mut self.out);
                }
            }
            ResultNodeKind::Comment(text) => {
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
            ResultNodeKind::ProcessingInstruction { target, data } => {
                self.out.push_str("<?");
                self.out.push_str(target);
                if !data.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(data);
                }
                self.out.push('>');
            }
        }
    }

    /// A newline after a block element when its next sibling is not text.
    fn newline_after(&mut self, name: &str, next: Option<Child>, parent: Option<&ElementData>) {
        let Some(next) = next else {
            return;
        };
        let parent_allows = parent.is_none_or(|p| allows_newlines(&p.name));
        if self.indent && is_formatted(name) && !self.is_text(next) && parent_allows {
            self.out.push('\n');
        }
    }

    fn write_element(&mut self, id: NodeId, element: &ElementData) {
        let document = self.document;
        self.out.push('<');
        self.out.push_str(&element.name);
        for (prefix, uri) in &element.namespaces {
            match prefix {
                Some(prefix) => self.out.push_str(&format!(" xmlns:{}=\"", prefix)),
                None => self.out.push_str(" xmlns=\""),
            }
            self.push_attribute_value(uri);
            self.out.push('"');
        }
        for attr in &element.attributes {
            self.out.push(' ');
            self.out.push_str(&attr.name);
            if attr.namespace.is_none() && is_one_of(&attr.name, BOOLEAN_ATTRIBUTES) {
                continue;
            }
            self.out.push_str("=\"");
            self.push_attribute_value(&attr.value);
            self.out.push('"');
        }
        self.out.push('>');

        if element.namespace.is_none() && is_one_of(&element.name, VOID_ELEMENTS) {
            return;
        }

        let mut children: Vec<Child> = document.children(id).iter().map(|&c| Child::Node(c)).collect();
        if element.namespace.is_none() && element.name.eq_ignore_ascii_case("head") && !self.has_content_type_meta(id)
        {
            children.insert(0, Child::ContentTypeMeta);
        }

        let formatted = self.indent && is_formatted(&element.name) && allows_newlines(&element.name);
        let multiple = children.len() > 1;
        if formatted && multiple && children.first().is_some_and(|&c| !self.is_text(c)) {
            self.out.push('\n');
        }
        for (i, &child) in children.iter().enumerate() {
            self.write_child(child, children.get(i + 1).copied(), Some(element));
        }
        if formatted && multiple && children.last().is_some_and(|&c| !self.is_text(c)) {
            self.out.push('\n');
        }

        self.out.push_str("</");
        self.out.push_str(&element.name);
        self.out.push('>');
    }

    fn has_content_type_meta(&self, head: NodeId) -> bool {
        self.document.children(head).iter().any(|&c| {
            self.document.element(c).is_some_and(|e| {
                e.name.eq_ignore_ascii_case("meta")
                    && e.attributes.iter().any(|a| {
                        a.name.eq_ignore_ascii_case("http-equiv") && a.value.eq_ignore_ascii_case("content-type")
                    })
            })
        })
    }

    fn write_content_type_meta(&mut self) {
        let media_type = self.output.media_type.as_deref().unwrap_or("text/html");
        self.out.push_str(&format!(
            "<meta http-equiv=\"Content-Type\" content=\"{}; charset={}\">",
            media_type,
            self.encoding.name()
        ));
    }

    /// HTML attribute values escape `&` and `"` only.
    fn push_attribute_value(&mut self, value: &str) {
        for c in value.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '"' => self.out.push_str("&quot;"),
                c if !self.encoding.can_encode(c) => self.out.push_str(&format!("&#{};", c as u32)),
                c => self.out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputBuilder;
    use crate::result_tree::ResultTreeBuilder;

    fn render(output: &OutputDeclaration, build: impl FnOnce(&mut ResultTreeBuilder)) -> String {
        let mut builder = ResultTreeBuilder::new();
        build(&mut builder);
        serialize(&builder.finish(), output, Encoding::from_label(output.encoding.as_deref()))
    }

    fn element(b: &mut ResultTreeBuilder, name: &str, text: Option<&str>) {
        b.start_element(name, None);
        if let Some(text) = text {
            b.text(text, false);
        }
        b.end_element();
    }

    #[test]
    fn test_void_elements_and_boolean_attributes() {
        let out = render(&OutputDeclaration::default(), |b| {
            b.start_element("div", None);
            b.start_element("input", None);
            b.attribute("type", None, "checkbox");
            b.attribute("checked", None, "checked");
            b.end_element();
            b.start_element("br", None);
            b.end_element();
            b.end_element();
        });
        assert_eq!(out, "<div>\n<input type=\"checkbox\" checked><br>\n</div>\n");
    }

    #[test]
    fn test_script_content_is_raw() {
        let out = render(&OutputDeclaration::default(), |b| {
            b.start_element("span", None);
            b.text("a < b", false);
            b.end_element();
            element(b, "script", Some("if (a < b && c) {}"));
        });
        assert_eq!(out, "<span>a &lt; b</span><script>if (a < b && c) {}</script>\n");
    }

    #[test]
    fn test_meta_insertion_and_block_newlines() {
        let out = render(&OutputDeclaration::default(), |b| {
            b.start_element("html", None);
            b.start_element("head", None);
            element(b, "title", Some("T"));
            b.end_element();
            b.start_element("body", None);
            element(b, "p", Some("x"));
            b.end_element();
            b.end_element();
        });
        assert_eq!(
            out,
            "<html>\n<head>\n<meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\">\n\
             <title>T</title>\n</head>\n<body><p>x</p></body>\n</html>\n"
        );
    }

    #[test]
    fn test_existing_meta_is_kept() {
        let output = OutputDeclaration {
            indent: Some(false),
            ..Default::default()
        };
        let out = render(&output, |b| {
            b.start_element("head", None);
            b.start_element("meta", None);
            b.attribute("http-equiv", None, "content-type");
            b.attribute("content", None, "text/html");
            b.end_element();
            b.end_element();
        });
        assert_eq!(out, "<head><meta http-equiv=\"content-type\" content=\"text/html\"></head>\n");
    }

    #[test]
    fn test_doctype_and_processing_instruction() {
        let output = OutputDeclaration {
            doctype_public: Some("-//W3C//DTD HTML 4.01//EN".to_string()),
            ..Default::default()
        };
        let out = render(&output, |b| {
            b.processing_instruction("php", "echo 1;");
        });
        assert_eq!(out, "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\">\n<?php echo 1;>\n");
    }
}
