//! Defines the core abstraction for a navigable, read-only source tree.
use std::hash::Hash;

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

impl std::fmt::Display for QName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_part),
            None => f.write_str(self.local_part),
        }
    }
}

/// The type of a node in the source tree, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The contract for a node in a read-only, hierarchical source document.
///
/// The XPath evaluator and the XSLT engine are written exclusively against this trait.
/// Node handles are cheap `Copy` values; equality is node identity and `Ord` must be
/// document order (attributes sort after their owner element and before its children).
///
/// `'a` is the lifetime of the underlying document.
pub trait DataSourceNode<'a>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    /// The type of the node (Element, Text, Attribute, etc.).
    fn node_type(&self) -> NodeType;

    /// The qualified name of the node. Returns `None` for node types without names,
    /// such as text or root nodes. For a processing instruction this is its target.
    fn name(&self) -> Option<QName<'a>>;

    /// The namespace URI of an element or attribute name, if it has one.
    fn namespace_uri(&self) -> Option<&'a str> {
        None
    }

    /// The namespace declarations in scope on an element, as `(prefix, uri)` pairs.
    /// `None` is the default namespace.
    fn namespaces(&self) -> Vec<(Option<&'a str>, &'a str)> {
        Vec::new()
    }

    /// The string value of the node, as defined by the XPath 1.0 `string()` function.
    /// - For a text node, this is its content.
    /// - For an element or the root, the concatenation of all descendant text nodes.
    /// - For an attribute, this is its value.
    /// - For a comment or processing instruction, this is its content.
    fn string_value(&self) -> String;

    /// An iterator over the attribute nodes of this node.
    /// The iterator will be empty for non-element nodes.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// An iterator over the child nodes of this node.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The parent node. `None` for the root. The parent of an attribute is its element.
    fn parent(&self) -> Option<Self>;
}

// Test utilities, public so downstream crates can reuse the mock tree.
pub mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::hash::Hasher;

    #[derive(Debug, Clone)]
    struct MockNodeData<'a> {
        node_type: NodeType,
        name: Option<QName<'a>>,
        value: String,
        children: Vec<usize>,
        attributes: Vec<usize>,
        parent: Option<usize>,
    }

    /// An in-memory tree whose node ids are allocated in document order.
    #[derive(Debug, Default)]
    pub struct MockTree<'a> {
        nodes: Vec<MockNodeData<'a>>,
    }

    /// A node handle that navigates through its owning tree.
    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree<'a>,
    }

    impl PartialEq for MockNode<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }
    impl Eq for MockNode<'_> {}

    impl PartialOrd for MockNode<'_> {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for MockNode<'_> {
        fn cmp(&self, other: &Self) -> Ordering {
            self.id.cmp(&other.id)
        }
    }

    impl Hash for MockNode<'_> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl<'a> DataSourceNode<'a> for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.tree.nodes[self.id].node_type
        }

        fn name(&self) -> Option<QName<'a>> {
            self.tree.nodes[self.id].name
        }

        fn string_value(&self) -> String {
            let data = &self.tree.nodes[self.id];
            match data.node_type {
                NodeType::Root | NodeType::Element => {
                    let mut out = String::new();
                    self.tree.collect_text(self.id, &mut out);
                    out
                }
                _ => data.value.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            let ids = tree.nodes[self.id].attributes.clone();
            Box::new(ids.into_iter().map(move |id| MockNode { id, tree }))
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            let ids = tree.nodes[self.id].children.clone();
            Box::new(ids.into_iter().map(move |id| MockNode { id, tree }))
        }

        fn parent(&self) -> Option<Self> {
            self.tree.nodes[self.id].parent.map(|id| MockNode {
                id,
                tree: self.tree,
            })
        }
    }

    impl<'a> MockTree<'a> {
        /// Starts a tree containing only a root node (id 0).
        pub fn new() -> Self {
            let mut tree = MockTree { nodes: Vec::new() };
            tree.push(NodeType::Root, None, String::new(), None);
            tree
        }

        pub fn root(&'a self) -> MockNode<'a> {
            self.node(0)
        }

        pub fn node(&'a self, id: usize) -> MockNode<'a> {
            MockNode { id, tree: self }
        }

        /// Appends an element under `parent` and returns its id.
        pub fn element(&mut self, parent: usize, name: &'a str) -> usize {
            let qname = split_qname(name);
            let id = self.push(NodeType::Element, Some(qname), String::new(), Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        /// Adds an attribute to `owner`. Call before adding the owner's children
        /// so ids stay in document order.
        pub fn attribute(&mut self, owner: usize, name: &'a str, value: &str) -> usize {
            let qname = split_qname(name);
            let id = self.push(NodeType::Attribute, Some(qname), value.to_string(), Some(owner));
            self.nodes[owner].attributes.push(id);
            id
        }

        pub fn text(&mut self, parent: usize, value: &str) -> usize {
            let id = self.push(NodeType::Text, None, value.to_string(), Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn comment(&mut self, parent: usize, value: &str) -> usize {
            let id = self.push(NodeType::Comment, None, value.to_string(), Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn processing_instruction(&mut self, parent: usize, target: &'a str, value: &str) -> usize {
            let name = QName {
                prefix: None,
                local_part: target,
            };
            let id = self.push(
                NodeType::ProcessingInstruction,
                Some(name),
                value.to_string(),
                Some(parent),
            );
            self.nodes[parent].children.push(id);
            id
        }

        fn push(
            &mut self,
            node_type: NodeType,
            name: Option<QName<'a>>,
            value: String,
            parent: Option<usize>,
        ) -> usize {
            self.nodes.push(MockNodeData {
                node_type,
                name,
                value,
                children: Vec::new(),
                attributes: Vec::new(),
                parent,
            });
            self.nodes.len() - 1
        }

        fn collect_text(&self, id: usize, out: &mut String) {
            for &child in &self.nodes[id].children {
                let data = &self.nodes[child];
                match data.node_type {
                    NodeType::Text => out.push_str(&data.value),
                    NodeType::Element => self.collect_text(child, out),
                    _ => {}
                }
            }
        }
    }

    fn split_qname(name: &str) -> QName<'_> {
        match name.split_once(':') {
            Some((prefix, local_part)) => QName {
                prefix: Some(prefix),
                local_part,
            },
            None => QName {
                prefix: None,
                local_part: name,
            },
        }
    }

    /// Creates a small mock tree. Node ids follow document order:
    /// ```text
    /// <root>                              0 (root), 1 (root element)
    ///   <para id="p1" xml:lang="en">      2, attrs 3 and 4
    ///     Hello                           5
    ///   </para>
    ///   <!-- comment node -->             6
    ///   <div/>                            7
    ///   <?pi-target pi-value?>            8
    ///   <para>World</para>                9, text 10
    /// </root>
    /// ```
    pub fn create_test_tree<'a>() -> MockTree<'a> {
        let mut tree = MockTree::new();
        let root_el = tree.element(0, "root");
        let para = tree.element(root_el, "para");
        tree.attribute(para, "id", "p1");
        tree.attribute(para, "xml:lang", "en");
        tree.text(para, "Hello");
        tree.comment(root_el, " comment node ");
        tree.element(root_el, "div");
        tree.processing_instruction(root_el, "pi-target", "pi-value");
        let para2 = tree.element(root_el, "para");
        tree.text(para2, "World");
        tree
    }
}
