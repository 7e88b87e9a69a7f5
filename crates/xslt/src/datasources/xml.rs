//! A `DataSourceNode` adapter over `roxmltree` documents.
use roxmltree::Node;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use xform_xpath1::{DataSourceNode, NodeType, QName};

/// A parsed source document. DTDs are accepted so documents with a doctype parse.
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, options)?;
        Ok(Self { doc })
    }

    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::Node(self.doc.root())
    }
}

/// A node of the source tree. roxmltree keeps attributes as data on their element, so
/// an attribute is addressed by its element and index.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    Node(Node<'a, 'input>),
    Attribute { parent: Node<'a, 'input>, index: usize },
}

impl<'a, 'input> XmlNode<'a, 'input> {
    pub fn new(node: Node<'a, 'input>) -> Self {
        XmlNode::Node(node)
    }

    pub fn inner(&self) -> Option<Node<'a, 'input>> {
        match self {
            XmlNode::Node(node) => Some(*node),
            XmlNode::Attribute { .. } => None,
        }
    }

    /// Document-order key: the owning node's id, then 0 for the node itself or
    /// 1 + index for its attributes.
    fn order_key(&self) -> (u32, usize) {
        match self {
            XmlNode::Node(node) => (node.id().get(), 0),
            XmlNode::Attribute { parent, index } => (parent.id().get(), index + 1),
        }
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for XmlNode<'_, '_> {}

impl PartialOrd for XmlNode<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// roxmltree ids are allocated in document order, and attributes follow their element.
impl Ord for XmlNode<'_, '_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

/// The prefix an element was most likely written with. roxmltree resolves names to
/// URIs and does not keep the lexical prefix, so the default namespace is preferred
/// when it binds the same URI.
fn prefix_for<'a>(node: Node<'a, 'a>, uri: Option<&str>) -> Option<&'a str> {
    let uri = uri?;
    let mut named = None;
    for ns in node.namespaces() {
        if ns.uri() != uri {
            continue;
        }
        match ns.name() {
            None => return None,
            Some(name) if named.is_none() => named = Some(name),
            Some(_) => {}
        }
    }
    named
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self {
            XmlNode::Node(node) => match node.node_type() {
                roxmltree::NodeType::Root => NodeType::Root,
                roxmltree::NodeType::Element => NodeType::Element,
                roxmltree::NodeType::Text => NodeType::Text,
                roxmltree::NodeType::Comment => NodeType::Comment,
                roxmltree::NodeType::PI => NodeType::ProcessingInstruction,
            },
            XmlNode::Attribute { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            XmlNode::Node(node) if node.is_element() => {
                let tag = node.tag_name();
                Some(QName {
                    prefix: prefix_for(*node, tag.namespace()),
                    local_part: tag.name(),
                })
            }
            XmlNode::Node(node) => node.pi().map(|pi| QName {
                prefix: None,
                local_part: pi.target,
            }),
            XmlNode::Attribute { parent, index } => parent.attributes().nth(*index).map(|attr| {
                let prefix = match attr.namespace() {
                    Some(crate::ast::XML_NAMESPACE) => Some("xml"),
                    Some(uri) => parent
                        .namespaces()
                        .find(|ns| ns.name().is_some() && ns.uri() == uri)
                        .and_then(|ns| ns.name()),
                    None => None,
                };
                QName {
                    prefix,
                    local_part: attr.name(),
                }
            }),
        }
    }

    fn namespace_uri(&self) -> Option<&'a str> {
        match self {
            XmlNode::Node(node) if node.is_element() => node.tag_name().namespace(),
            XmlNode::Node(_) => None,
            XmlNode::Attribute { parent, index } => parent.attributes().nth(*index).and_then(|a| a.namespace()),
        }
    }

    fn namespaces(&self) -> Vec<(Option<&'a str>, &'a str)> {
        match self {
            XmlNode::Node(node) if node.is_element() => node.namespaces().map(|ns| (ns.name(), ns.uri())).collect(),
            _ => Vec::new(),
        }
    }

    fn string_value(&self) -> String {
        match self {
            XmlNode::Node(node) => match node.node_type() {
                roxmltree::NodeType::Root | roxmltree::NodeType::Element => node
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect(),
                roxmltree::NodeType::PI => node.pi().and_then(|pi| pi.value).unwrap_or_default().to_string(),
                _ => node.text().unwrap_or_default().to_string(),
            },
            XmlNode::Attribute { parent, index } => parent
                .attributes()
                .nth(*index)
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Node(node) if node.is_element() => {
                let parent = *node;
                let count = node.attributes().len();
                Box::new((0..count).map(move |index| XmlNode::Attribute { parent, index }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Node(node) => Box::new(node.children().map(XmlNode::Node)),
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Node(node) => node.parent().map(XmlNode::Node),
            XmlNode::Attribute { parent, .. } => Some(XmlNode::Node(*parent)),
        }
    }
}
