use super::{Encoding, escape_attribute, escape_text, write_doctype};
use crate::ast::{NamespaceBinding, OutputDeclaration, XML_NAMESPACE};
use crate::result_tree::{ElementData, NodeId, ResultDocument, ResultNodeKind};

pub(super) fn serialize(document: &ResultDocument, output: &OutputDeclaration, encoding: Encoding) -> String {
    let mut writer = XmlWriter {
        document,
        encoding,
        indent: output.indent.unwrap_or(false),
        out: String::new(),
        bindings: Vec::new(),
    };
    writer.write_document(output);
    writer.out
}

struct XmlWriter<'d> {
    document: &'d ResultDocument,
    encoding: Encoding,
    indent: bool,
    out: String,
    /// Namespace declarations in scope, innermost last.
    bindings: Vec<NamespaceBinding>,
}

impl XmlWriter<'_> {
    fn write_document(&mut self, output: &OutputDeclaration) {
        if !output.omit_xml_declaration {
            self.out.push_str("<?xml version=\"");
            self.out.push_str(output.version.as_deref().unwrap_or("1.0"));
            self.out.push('"');
            if output.encoding.is_some() {
                self.out.push_str(&format!(" encoding=\"{}\"", self.encoding.name()));
            }
            if let Some(standalone) = output.standalone {
                self.out
                    .push_str(if standalone { " standalone=\"yes\"" } else { " standalone=\"no\"" });
            }
            self.out.push_str("?>\n");
        }

        let document = self.document;
        if let Some(root_element) = document.document_element().and_then(|id| document.element(id)) {
            write_doctype(&root_element.name, output, &mut self.out);
        }

        let children = document.children(document.root());
        for (i, &child) in children.iter().enumerate() {
            self.write_node(child, 0);
            let is_comment = matches!(document.node(child).kind, ResultNodeKind::Comment(_));
            if is_comment && i + 1 < children.len() {
                self.out.push('\n');
            }
        }
        if !children.is_empty() {
            self.out.push('\n');
        }
    }

    fn write_node(&mut self, id: NodeId, level: usize) {
        let document = self.document;
        match &document.node(id).kind {
            ResultNodeKind::Root => {}
            ResultNodeKind::Element(element) => self.write_element(id, element, level),
            ResultNodeKind::Text {
                content,
                disable_escaping,
            } => {
                if *disable_escaping {
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
                self.out.push_str("?>");
            }
        }
    }

    fn write_element(&mut self, id: NodeId, element: &ElementData, level: usize) {
        let scope_mark = self.bindings.len();
        let (declarations, attributes) = self.fix_namespaces(element);

        self.out.push('<');
        self.out.push_str(&element.name);
        for (prefix, uri) in &declarations {
            match prefix {
                Some(prefix) => self.out.push_str(&format!(" xmlns:{}=\"", prefix)),
                None => self.out.push_str(" xmlns=\""),
            }
            escape_attribute(uri, self.encoding, &mut self.out);
            self.out.push('"');
        }
        for (name, value) in &attributes {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            escape_attribute(value, self.encoding, &mut self.out);
            self.out.push('"');
        }

        let document = self.document;
        let children = document.children(id);
        if children.is_empty() {
            self.out.push_str("/>");
        } else {
            self.out.push('>');
            let element_only = self.indent
                && children
                    .iter()
                    .all(|&c| !matches!(document.node(c).kind, ResultNodeKind::Text { .. }));
            for &child in children {
                if element_only {
                    self.newline(level + 1);
                }
                self.write_node(child, level + 1);
            }
            if element_only {
                self.newline(level);
            }
            self.out.push_str("</");
            self.out.push_str(&element.name);
            self.out.push('>');
        }
        self.bindings.truncate(scope_mark);
    }

    fn newline(&mut self, level: usize) {
        self.out.push('\n');
        self.out.push_str(&"  ".repeat(level));
    }

    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn declare(&mut self, prefix: Option<&str>, uri: &str, declarations: &mut Vec<NamespaceBinding>) {
        let binding = (prefix.map(str::to_string), uri.to_string());
        declarations.push(binding.clone());
        self.bindings.push(binding);
    }

    /// Works out the namespace declarations the element needs: its explicit ones that
    /// are not already in scope, plus any required by the names of the element and its
    /// attributes. Attributes in a namespace but without a usable prefix get one.
    fn fix_namespaces(&mut self, element: &ElementData) -> (Vec<NamespaceBinding>, Vec<(String, String)>) {
        let mut declarations = Vec::new();
        for (prefix, uri) in &element.namespaces {
            if prefix.as_deref() == Some("xml") || self.lookup(prefix.as_deref()) == Some(uri.as_str()) {
                continue;
            }
            if prefix.is_some() && uri.is_empty() {
                continue;
            }
            if prefix.is_none() && uri.is_empty() && self.lookup(None).is_none() {
                continue;
            }
            self.declare(prefix.as_deref(), uri, &mut declarations);
        }

        match (&element.namespace, element.prefix()) {
            (Some(uri), prefix) => {
                if self.lookup(prefix) != Some(uri.as_str()) {
                    self.declare(prefix, uri, &mut declarations);
                }
            }
            (None, None) => {
                if self.lookup(None).is_some_and(|uri| !uri.is_empty()) {
                    self.declare(None, "", &mut declarations);
                }
            }
            (None, Some(_)) => {}
        }

        let mut attributes = Vec::with_capacity(element.attributes.len());
        for attr in &element.attributes {
            let Some(uri) = attr.namespace.as_deref() else {
                attributes.push((attr.name.clone(), attr.value.clone()));
                continue;
            };
            let (prefix, local) = match attr.name.split_once(':') {
                Some((p, l)) => (Some(p), l),
                None => (None, attr.name.as_str()),
            };
            let prefix = match prefix {
                Some(p) if self.lookup(Some(p)) == Some(uri) => p.to_string(),
                Some(p) if self.lookup(Some(p)).is_none() => {
                    self.declare(Some(p), uri, &mut declarations);
                    p.to_string()
                }
                _ => self.prefix_for(uri, &mut declarations),
            };
            attributes.push((format!("{}:{}", prefix, local), attr.value.clone()));
        }
        (declarations, attributes)
    }

    /// A prefix bound to `uri`, declaring a generated one if none is in scope.
    fn prefix_for(&mut self, uri: &str, declarations: &mut Vec<NamespaceBinding>) -> String {
        let existing = self
            .bindings
            .iter()
            .rev()
            .filter_map(|(p, u)| p.as_deref().filter(|_| u == uri))
            .find(|p| self.lookup(Some(*p)) == Some(uri));
        if let Some(prefix) = existing {
            return prefix.to_string();
        }
        let mut n = 0;
        let prefix = loop {
            let candidate = format!("ns{}", n);
            if self.lookup(Some(&candidate)).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.declare(Some(&prefix), uri, declarations);
        prefix
    }
}
