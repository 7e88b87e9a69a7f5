//! A "dumb" XML driver that reads an XSLT source file and notifies a builder object of events.
//!
//! The driver resolves namespace prefixes and character references so that builders only
//! see expanded names and decoded text.
use crate::ast::{NamespaceBinding, XML_NAMESPACE};
use crate::error::XsltError;
use crate::util::split_qname;
use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event as XmlEvent};

/// A trait defining the callbacks the parser driver will use to build a stylesheet.
pub trait StylesheetBuilder {
    fn start_element(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError>;
    fn end_element(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError>;
    fn text(&mut self, text: String) -> Result<(), XsltError>;
}

/// An attribute with its namespace resolved. Namespace declarations are not attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    /// The name as written, including any prefix.
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

/// A start tag with every name resolved against the namespaces in scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementStart {
    /// The name as written, including any prefix.
    pub name: String,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    /// Declarations made on this element.
    pub declared_namespaces: Vec<NamespaceBinding>,
    /// All bindings in scope on this element, innermost first, without duplicates.
    pub in_scope_namespaces: Vec<NamespaceBinding>,
}

impl ElementStart {
    /// The local name if this element is in the XSLT namespace.
    pub fn xslt_name(&self) -> Option<&str> {
        (self.namespace.as_deref() == Some(crate::ast::XSLT_NAMESPACE)).then_some(self.local_name.as_str())
    }

    pub fn resolve_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }
        self.in_scope_namespaces
            .iter()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Default)]
struct NamespaceStack {
    frames: Vec<Vec<NamespaceBinding>>,
}

impl NamespaceStack {
    fn in_scope(&self) -> Vec<NamespaceBinding> {
        let mut seen: Vec<NamespaceBinding> = Vec::new();
        for frame in self.frames.iter().rev() {
            for binding in frame.iter().rev() {
                if !seen.iter().any(|(p, _)| *p == binding.0) {
                    seen.push(binding.clone());
                }
            }
        }
        // An undeclared default namespace (`xmlns=""`) is not a binding.
        seen.retain(|(_, uri)| !uri.is_empty());
        seen
    }
}

fn decode_text(raw: &[u8]) -> Result<String, XsltError> {
    let raw = std::str::from_utf8(raw)?;
    Ok(unescape(raw)
        .map_err(|e| XsltError::Compilation(e.to_string()))?
        .into_owned())
}

fn read_start(e: &BytesStart, namespaces: &mut NamespaceStack) -> Result<ElementStart, XsltError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();

    let mut declared = Vec::new();
    let mut raw_attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = decode_text(&attr.value)?;
        if key == "xmlns" {
            declared.push((None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.push((Some(prefix.to_string()), value));
        } else {
            raw_attributes.push((key, value));
        }
    }
    namespaces.frames.push(declared.clone());

    let mut element = ElementStart {
        local_name: split_qname(&name).1.to_string(),
        name,
        namespace: None,
        attributes: Vec::with_capacity(raw_attributes.len()),
        declared_namespaces: declared,
        in_scope_namespaces: namespaces.in_scope(),
    };

    let (prefix, _) = split_qname(&element.name);
    element.namespace = match prefix {
        Some(p) => Some(
            element
                .resolve_prefix(Some(p))
                .ok_or_else(|| XsltError::Compilation(format!("Undeclared namespace prefix '{}'", p)))?
                .to_string(),
        ),
        None => element.resolve_prefix(None).map(str::to_string),
    };

    for (key, value) in raw_attributes {
        // Unprefixed attributes are in no namespace.
        let namespace = match split_qname(&key).0 {
            Some(p) => Some(
                element
                    .resolve_prefix(Some(p))
                    .ok_or_else(|| XsltError::Compilation(format!("Undeclared namespace prefix '{}'", p)))?
                    .to_string(),
            ),
            None => None,
        };
        element.attributes.push(XmlAttribute {
            name: key,
            namespace,
            value,
        });
    }
    Ok(element)
}

/// Drives the parsing process, calling builder methods for each significant XML event.
/// Adjacent text, CDATA and references are delivered as one `text` call.
pub fn parse_stylesheet_content(
    source: &str,
    builder: &mut impl StylesheetBuilder,
) -> Result<(), XsltError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut namespaces = NamespaceStack::default();
    let mut open: Vec<ElementStart> = Vec::new();
    let mut pending_text = String::new();

    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event()? {
            XmlEvent::Start(e) => {
                if !pending_text.is_empty() {
                    builder.text(std::mem::take(&mut pending_text))?;
                }
                let element = read_start(&e, &mut namespaces)?;
                builder.start_element(&element, pos, source)?;
                open.push(element);
            }
            XmlEvent::End(_) => {
                if !pending_text.is_empty() {
                    builder.text(std::mem::take(&mut pending_text))?;
                }
                if let Some(element) = open.pop() {
                    builder.end_element(&element, pos, source)?;
                }
                namespaces.frames.pop();
            }
            XmlEvent::Text(e) => pending_text.push_str(&decode_text(&e)?),
            XmlEvent::CData(e) => pending_text.push_str(std::str::from_utf8(&e)?),
            XmlEvent::GeneralRef(e) => {
                let char_ref = e
                    .resolve_char_ref()
                    .map_err(|err| XsltError::QuickXml(err.to_string()))?;
                if let Some(c) = char_ref {
                    pending_text.push(c);
                } else {
                    let name = std::str::from_utf8(&e)?;
                    let resolved = resolve_predefined_entity(name).ok_or_else(|| {
                        XsltError::Compilation(format!("Unknown entity reference '&{};'", name))
                    })?;
                    pending_text.push_str(resolved);
                }
            }
            XmlEvent::Eof => break,
            _ => (),
        }
    }

    if !open.is_empty() {
        return Err(XsltError::Compilation(format!(
            "Unexpected end of stylesheet inside <{}>",
            open.last().map_or("", |e| e.name.as_str())
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        elements: Vec<ElementStart>,
    }

    impl StylesheetBuilder for Recorder {
        fn start_element(&mut self, element: &ElementStart, _pos: usize, _source: &str) -> Result<(), XsltError> {
            self.events.push(format!("start {}", element.local_name));
            self.elements.push(element.clone());
            Ok(())
        }
        fn end_element(&mut self, element: &ElementStart, _pos: usize, _source: &str) -> Result<(), XsltError> {
            self.events.push(format!("end {}", element.local_name));
            Ok(())
        }
        fn text(&mut self, text: String) -> Result<(), XsltError> {
            self.events.push(format!("text {}", text));
            Ok(())
        }
    }

    #[test]
    fn test_resolves_namespaces_and_expands_empty_elements() {
        let source = r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns="urn:out"><out a="1" xml:lang="en"/></xsl:stylesheet>"#;
        let mut recorder = Recorder::default();
        parse_stylesheet_content(source, &mut recorder).unwrap();

        assert_eq!(
            recorder.events,
            vec!["start stylesheet", "start out", "end out", "end stylesheet"]
        );
        assert_eq!(recorder.elements[0].xslt_name(), Some("stylesheet"));
        let out = &recorder.elements[1];
        assert_eq!(out.namespace.as_deref(), Some("urn:out"));
        assert_eq!(out.attributes[0].namespace, None);
        assert_eq!(out.attributes[1].namespace.as_deref(), Some(XML_NAMESPACE));
        assert_eq!(out.in_scope_namespaces.len(), 2);
    }

    #[test]
    fn test_merges_text_and_references() {
        let source = "<a>x &amp; y &#65;<![CDATA[<raw>]]></a>";
        let mut recorder = Recorder::default();
        parse_stylesheet_content(source, &mut recorder).unwrap();
        assert_eq!(recorder.events[1], "text x & y A<raw>");
    }

    #[test]
    fn test_undeclared_prefix_is_an_error() {
        let mut recorder = Recorder::default();
        assert!(parse_stylesheet_content("<p:a/>", &mut recorder).is_err());
    }
}
