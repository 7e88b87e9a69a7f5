//! Handlers for the document element and the top-level declarations.

use super::name_list;
use crate::ast::{AttributeSet, KeyDefinition, OutputMethod, SpaceTest, XSLT_NAMESPACE, XsltInstruction};
use crate::compiler::{BuilderState, CompilerBuilder};
use crate::error::XsltError;
use crate::parser::ElementStart;
use crate::util::{get_attr_optional, get_attr_required, get_yes_no, structure_error};

impl CompilerBuilder {
    pub(crate) fn handle_stylesheet_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        if !self.state_stack.is_empty() || self.saw_stylesheet {
            return Err(structure_error(
                format!("<{}> must be the document element", element.name),
                pos,
                source,
            ));
        }
        if get_attr_optional(element, "version").is_none() {
            log::warn!("<{}> has no version attribute", element.name);
        }
        if let Some(prefixes) = get_attr_optional(element, "exclude-result-prefixes") {
            for prefix in prefixes.split_whitespace() {
                let lookup = (prefix != "#default").then_some(prefix);
                let uri = element.resolve_prefix(lookup).ok_or_else(|| {
                    structure_error(
                        format!("Undeclared prefix '{}' in exclude-result-prefixes", prefix),
                        pos,
                        source,
                    )
                })?;
                self.excluded_namespaces.push(uri.to_string());
            }
        }
        self.saw_stylesheet = true;
        self.state_stack.push(BuilderState::Stylesheet);
        Ok(())
    }

    /// A literal result element carrying `xsl:version` is a whole stylesheet: its content
    /// becomes the template for the root node.
    pub(crate) fn handle_simplified_stylesheet_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let has_version = element
            .attributes
            .iter()
            .any(|a| a.namespace.as_deref() == Some(XSLT_NAMESPACE) && a.name.ends_with(":version"));
        if !has_version {
            return Err(structure_error(
                format!(
                    "Document is not a stylesheet: <{}> is neither <xsl:stylesheet> nor carries xsl:version",
                    element.name
                ),
                pos,
                source,
            ));
        }
        let root_pattern = self.parse_pattern("/")?;
        self.saw_stylesheet = true;
        self.instruction_stack.push(Vec::new());
        self.state_stack.push(BuilderState::Stylesheet);
        self.instruction_stack.push(Vec::new());
        self.state_stack.push(BuilderState::Template {
            pattern: Some(root_pattern),
            name: None,
            priority: None,
            mode: None,
            params: Vec::new(),
        });
        Ok(())
    }

    /// Handles `<xsl:output>`. Repeated declarations merge, later attributes winning.
    pub(crate) fn handle_output(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        if let Some(method) = get_attr_optional(element, "method") {
            self.output.method = match method {
                "xml" => Some(OutputMethod::Xml),
                "html" => Some(OutputMethod::Html),
                "text" => Some(OutputMethod::Text),
                other if other.contains(':') => {
                    log::warn!("Unsupported extension output method '{}', using the default", other);
                    None
                }
                other => {
                    return Err(structure_error(
                        format!("Invalid output method '{}'", other),
                        pos,
                        source,
                    ));
                }
            };
        }
        let text_attr = |name: &str| get_attr_optional(element, name).map(str::to_string);
        if let Some(version) = text_attr("version") {
            self.output.version = Some(version);
        }
        if let Some(encoding) = text_attr("encoding") {
            self.output.encoding = Some(encoding);
        }
        if let Some(public) = text_attr("doctype-public") {
            self.output.doctype_public = Some(public);
        }
        if let Some(system) = text_attr("doctype-system") {
            self.output.doctype_system = Some(system);
        }
        if let Some(media_type) = text_attr("media-type") {
            self.output.media_type = Some(media_type);
        }
        if let Some(indent) = get_yes_no(element, "indent", pos, source)? {
            self.output.indent = Some(indent);
        }
        if let Some(omit) = get_yes_no(element, "omit-xml-declaration", pos, source)? {
            self.output.omit_xml_declaration = omit;
        }
        if let Some(standalone) = get_yes_no(element, "standalone", pos, source)? {
            self.output.standalone = Some(standalone);
        }
        if get_attr_optional(element, "cdata-section-elements").is_some() {
            log::warn!("cdata-section-elements is not supported and is ignored");
        }
        self.state_stack.push(BuilderState::Leaf);
        Ok(())
    }

    /// Handles parsing an <xsl:key> element.
    pub(crate) fn handle_key(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let name = get_attr_required(element, "name", pos, source)?;
        let match_str = get_attr_required(element, "match", pos, source)?;
        let use_str = get_attr_required(element, "use", pos, source)?;

        let key_def = KeyDefinition {
            name: name.to_string(),
            pattern: self.parse_pattern(match_str)?,
            use_expr: self.parse_xpath(use_str)?,
        };
        self.keys.push(key_def);
        self.state_stack.push(BuilderState::Leaf);
        Ok(())
    }

    /// Handles `<xsl:strip-space>` (`strip == true`) and `<xsl:preserve-space>`.
    pub(crate) fn handle_space(
        &mut self,
        element: &ElementStart,
        strip: bool,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let tests = get_attr_required(element, "elements", pos, source)?
            .split_whitespace()
            .map(SpaceTest::parse);
        if strip {
            self.whitespace.strip.extend(tests);
        } else {
            self.whitespace.preserve.extend(tests);
        }
        self.state_stack.push(BuilderState::Leaf);
        Ok(())
    }

    pub(crate) fn handle_attribute_set_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let name = get_attr_required(element, "name", pos, source)?.to_string();
        self.state_stack.push(BuilderState::AttributeSet {
            name,
            use_attribute_sets: name_list(get_attr_optional(element, "use-attribute-sets")),
        });
        Ok(())
    }

    /// Attribute sets with the same name merge.
    pub(crate) fn handle_attribute_set_end(
        &mut self,
        name: String,
        use_attribute_sets: Vec<String>,
        body: Vec<XsltInstruction>,
    ) {
        let set = self
            .attribute_sets
            .entry(name.clone())
            .or_insert_with(|| AttributeSet {
                name,
                ..Default::default()
            });
        set.use_attribute_sets.extend(use_attribute_sets);
        set.attributes.extend(
            body.into_iter()
                .filter(|i| matches!(i, XsltInstruction::Attribute { .. })),
        );
    }
}
