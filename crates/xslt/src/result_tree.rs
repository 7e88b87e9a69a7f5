//! The result tree produced by a transformation: an arena of nodes owned by a
//! `ResultDocument`, plus the `OutputBuilder` that fills it.

use crate::ast::NamespaceBinding;
use crate::output::OutputBuilder;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultAttribute {
    /// The qualified name, including any prefix.
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementData {
    /// The qualified name, including any prefix.
    pub name: String,
    pub namespace: Option<String>,
    /// Namespace declarations made on this element.
    pub namespaces: Vec<NamespaceBinding>,
    pub attributes: Vec<ResultAttribute>,
}

impl ElementData {
    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultNodeKind {
    Root,
    Element(ElementData),
    Text { content: String, disable_escaping: bool },
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultNode {
    pub kind: ResultNodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// An ordered tree of output nodes. Node 0 is always the root.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDocument {
    nodes: Vec<ResultNode>,
}

impl Default for ResultDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultDocument {
    pub fn new() -> Self {
        Self {
            nodes: vec![ResultNode {
                kind: ResultNodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &ResultNode {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id].kind {
            ResultNodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Number of nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when the root has no children. Serializing such a document yields nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// The first element child of the root.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    /// The concatenated content of all text descendants of `id`.
    pub fn string_value(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            ResultNodeKind::Text { content, .. } => out.push_str(content),
            ResultNodeKind::Root | ResultNodeKind::Element(_) => {
                for &child in &self.nodes[id].children {
                    self.collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    fn append(&mut self, parent: NodeId, kind: ResultNodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ResultNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }
}

/// Builds a `ResultDocument` from the executor's output calls.
#[derive(Debug, Default)]
pub struct ResultTreeBuilder {
    document: ResultDocument,
    open: Vec<NodeId>,
}

impl ResultTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> ResultDocument {
        if !self.open.is_empty() {
            log::warn!("{} result element(s) were left open", self.open.len());
        }
        self.document
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(0)
    }

    /// The open element that can still take attributes and namespace nodes.
    fn element_accepting_attributes(&mut self, what: &str, name: &str) -> Option<&mut ElementData> {
        let Some(&id) = self.open.last() else {
            log::warn!("Ignoring {} '{}' created outside of any element", what, name);
            return None;
        };
        let node = &mut self.document.nodes[id];
        if !node.children.is_empty() {
            log::warn!("Ignoring {} '{}' created after the children of its element", what, name);
            return None;
        }
        match &mut node.kind {
            ResultNodeKind::Element(data) => Some(data),
            _ => None,
        }
    }
}

impl OutputBuilder for ResultTreeBuilder {
    fn start_element(&mut self, name: &str, namespace: Option<&str>) {
        let parent = self.current();
        let id = self.document.append(
            parent,
            ResultNodeKind::Element(ElementData {
                name: name.to_string(),
                namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
                ..Default::default()
            }),
        );
        self.open.push(id);
    }

    fn end_element(&mut self) {
        self.open.pop();
    }

    fn namespace(&mut self, prefix: Option<&str>, uri: &str) {
        let label = prefix.unwrap_or("xmlns");
        let Some(element) = self.element_accepting_attributes("namespace", label) else {
            return;
        };
        match element.namespaces.iter_mut().find(|(p, _)| p.as_deref() == prefix) {
            Some(existing) => existing.1 = uri.to_string(),
            None => element
                .namespaces
                .push((prefix.map(str::to_string), uri.to_string())),
        }
    }

    fn attribute(&mut self, name: &str, namespace: Option<&str>, value: &str) {
        let Some(element) = self.element_accepting_attributes("attribute", name) else {
            return;
        };
        let namespace = namespace.filter(|ns| !ns.is_empty());
        let local = name.split_once(':').map_or(name, |(_, l)| l);
        let existing = element.attributes.iter_mut().find(|a| {
            let a_local = a.name.split_once(':').map_or(a.name.as_str(), |(_, l)| l);
            a.namespace.as_deref() == namespace && a_local == local
        });
        match existing {
            Some(attr) => {
                attr.name = name.to_string();
                attr.value = value.to_string();
            }
            None => element.attributes.push(ResultAttribute {
                name: name.to_string(),
                namespace: namespace.map(str::to_string),
                value: value.to_string(),
            }),
        }
    }

    fn text(&mut self, text: &str, disable_escaping: bool) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        if let Some(&last) = self.document.nodes[parent].children.last()
            && let ResultNodeKind::Text {
                content,
                disable_escaping: last_flag,
            } = &mut self.document.nodes[last].kind
            && *last_flag == disable_escaping
        {
            content.push_str(text);
            return;
        }
        self.document.append(
            parent,
            ResultNodeKind::Text {
                content: text.to_string(),
                disable_escaping,
            },
        );
    }

    fn comment(&mut self, text: &str) {
        let parent = self.current();
        self.document
            .append(parent, ResultNodeKind::Comment(text.to_string()));
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        let parent = self.current();
        self.document.append(
            parent,
            ResultNodeKind::ProcessingInstruction {
                target: target.to_string(),
                data: data.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_nested_tree_and_merges_text() {
        let mut builder = ResultTreeBuilder::new();
        builder.start_element("doc", None);
        builder.attribute("id", None, "1");
        builder.text("a", false);
        builder.text("b", false);
        builder.start_element("child", None);
        builder.end_element();
        builder.end_element();
        let doc = builder.finish();

        let root_el = doc.document_element().unwrap();
        let data = doc.element(root_el).unwrap();
        assert_eq!(data.name, "doc");
        assert_eq!(data.attribute("id"), Some("1"));
        assert_eq!(doc.children(root_el).len(), 2);
        assert_eq!(doc.string_value(doc.root()), "ab");
    }

    #[test]
    fn test_attribute_rules() {
        let mut builder = ResultTreeBuilder::new();
        builder.attribute("orphan", None, "x");
        builder.start_element("e", None);
        builder.attribute("a", None, "1");
        builder.attribute("a", None, "2");
        builder.namespace(Some("p"), "urn:p");
        builder.namespace(Some("p"), "urn:p");
        builder.text("content", false);
        builder.attribute("late", None, "3");
        builder.end_element();
        let doc = builder.finish();

        let data = doc.element(doc.document_element().unwrap()).unwrap();
        assert_eq!(data.attributes.len(), 1);
        assert_eq!(data.attribute("a"), Some("2"));
        assert_eq!(data.namespaces.len(), 1);
    }

    #[test]
    fn test_empty_document() {
        let doc = ResultTreeBuilder::new().finish();
        assert!(doc.is_empty());
        assert_eq!(doc.document_element(), None);
    }
}
