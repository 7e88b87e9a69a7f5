//! Handlers for instructions that construct result nodes: literal result elements,
//! `xsl:element`, `xsl:attribute`, `xsl:text`, `xsl:value-of` and friends.

use super::name_list;
use crate::ast::{AttributeValueTemplate, LiteralAttribute, PreparsedTemplate, XSLT_NAMESPACE, XsltInstruction};
use crate::compiler::{BuilderState, CompilerBuilder, PendingInstruction};
use crate::error::XsltError;
use crate::parser::ElementStart;
use crate::util::{get_attr_optional, get_attr_required, get_yes_no, is_qname, parse_avt, split_qname, structure_error};

impl CompilerBuilder {
    pub(crate) fn handle_literal_result_element_start(
        &mut self,
        element: &ElementStart,
        _pos: usize,
        _source: &str,
    ) -> Result<(), XsltError> {
        let mut attrs = Vec::with_capacity(element.attributes.len());
        let mut use_attribute_sets = Vec::new();
        for attr in &element.attributes {
            if attr.namespace.as_deref() == Some(XSLT_NAMESPACE) {
                if split_qname(&attr.name).1 == "use-attribute-sets" {
                    use_attribute_sets = name_list(Some(&attr.value));
                }
                continue;
            }
            attrs.push(LiteralAttribute {
                name: attr.name.clone(),
                namespace: attr.namespace.clone(),
                value: parse_avt(&attr.value)?,
            });
        }

        // Outermost declarations first, in source order.
        let namespaces = element
            .in_scope_namespaces
            .iter()
            .rev()
            .filter(|(_, uri)| !self.excluded_namespaces.contains(uri))
            .cloned()
            .collect();

        let instr = XsltInstruction::LiteralElement {
            name: element.name.clone(),
            namespace: element.namespace.clone(),
            namespaces,
            attrs,
            use_attribute_sets,
            body: PreparsedTemplate::default(),
        };
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::Constructor(Box::new(instr))));
        Ok(())
    }

    fn name_avt(&self, element: &ElementStart, pos: usize, source: &str) -> Result<AttributeValueTemplate, XsltError> {
        let name = parse_avt(get_attr_required(element, "name", pos, source)?)?;
        if let AttributeValueTemplate::Static(s) = &name
            && !is_qname(s)
        {
            return Err(structure_error(
                format!("'{}' is not a valid name for <{}>", s, element.name),
                pos,
                source,
            ));
        }
        Ok(name)
    }

    pub(crate) fn handle_element_start(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let instr = XsltInstruction::Element {
            name: self.name_avt(element, pos, source)?,
            namespace: get_attr_optional(element, "namespace")
                .map(parse_avt)
                .transpose()?,
            in_scope: element.in_scope_namespaces.clone(),
            use_attribute_sets: name_list(get_attr_optional(element, "use-attribute-sets")),
            body: PreparsedTemplate::default(),
        };
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::Constructor(Box::new(instr))));
        Ok(())
    }

    pub(crate) fn handle_attribute_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let instr = XsltInstruction::Attribute {
            name: self.name_avt(element, pos, source)?,
            namespace: get_attr_optional(element, "namespace")
                .map(parse_avt)
                .transpose()?,
            in_scope: element.in_scope_namespaces.clone(),
            body: PreparsedTemplate::default(),
        };
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::Constructor(Box::new(instr))));
        Ok(())
    }

    pub(crate) fn handle_processing_instruction_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let name = parse_avt(get_attr_required(element, "name", pos, source)?)?;
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::ProcessingInstruction(name)));
        Ok(())
    }

    pub(crate) fn handle_copy_start(&mut self, element: &ElementStart) {
        let use_attribute_sets = name_list(get_attr_optional(element, "use-attribute-sets"));
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::Copy { use_attribute_sets }));
    }

    pub(crate) fn handle_text_start(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let disable_escaping = get_yes_no(element, "disable-output-escaping", pos, source)?.unwrap_or(false);
        self.state_stack.push(BuilderState::XslText { disable_escaping });
        Ok(())
    }

    pub(crate) fn handle_text_end(&mut self, body: Vec<XsltInstruction>) {
        if let Some(parent) = self.instruction_stack.last_mut() {
            parent.extend(body);
        }
    }

    // --- Handlers for simple, empty instructions ---

    pub(crate) fn handle_value_of(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let select = self.parse_xpath(get_attr_required(element, "select", pos, source)?)?;
        let disable_escaping = get_yes_no(element, "disable-output-escaping", pos, source)?.unwrap_or(false);
        self.push_instruction(XsltInstruction::ValueOf {
            select,
            disable_escaping,
        });
        self.state_stack.push(BuilderState::Leaf);
        Ok(())
    }

    pub(crate) fn handle_copy_of(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let select = self.parse_xpath(get_attr_required(element, "select", pos, source)?)?;
        self.push_instruction(XsltInstruction::CopyOf { select });
        self.state_stack.push(BuilderState::Leaf);
        Ok(())
    }
}
