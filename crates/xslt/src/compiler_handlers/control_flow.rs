use crate::ast::{PreparsedTemplate, When, XsltInstruction};
use crate::compiler::{BuilderState, CompilerBuilder, PendingInstruction};
use crate::error::XsltError;
use crate::parser::ElementStart;
use crate::util::{get_attr_required, get_yes_no, structure_error};
use xform_xpath1::Expression;

impl CompilerBuilder {
    pub(crate) fn handle_choose_start(&mut self) {
        self.state_stack.push(BuilderState::Choose {
            whens: Vec::new(),
            otherwise: None,
        });
    }

    pub(crate) fn handle_when_start(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        if !matches!(self.state_stack.last(), Some(BuilderState::Choose { .. })) {
            return Err(structure_error("<xsl:when> must be a child of <xsl:choose>", pos, source));
        }
        let test = self.parse_xpath(get_attr_required(element, "test", pos, source)?)?;
        self.state_stack.push(BuilderState::When(test));
        Ok(())
    }

    pub(crate) fn handle_when_end(&mut self, test: Expression, body: Vec<XsltInstruction>) {
        if let Some(BuilderState::Choose { whens, .. }) = self.state_stack.last_mut() {
            whens.push(When {
                test,
                body: PreparsedTemplate(body),
            });
        }
    }

    pub(crate) fn handle_otherwise_start(&mut self, pos: usize, source: &str) -> Result<(), XsltError> {
        match self.state_stack.last() {
            Some(BuilderState::Choose { otherwise: None, .. }) => {
                self.state_stack.push(BuilderState::Otherwise);
                Ok(())
            }
            Some(BuilderState::Choose { .. }) => Err(structure_error(
                "<xsl:choose> can have only one <xsl:otherwise>",
                pos,
                source,
            )),
            _ => Err(structure_error(
                "<xsl:otherwise> must be a child of <xsl:choose>",
                pos,
                source,
            )),
        }
    }

    pub(crate) fn handle_otherwise_end(&mut self, body: Vec<XsltInstruction>) {
        if let Some(BuilderState::Choose { otherwise, .. }) = self.state_stack.last_mut() {
            *otherwise = Some(PreparsedTemplate(body));
        }
    }

    pub(crate) fn handle_choose_end(
        &mut self,
        current_state: BuilderState,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        if let BuilderState::Choose { whens, otherwise } = current_state {
            if whens.is_empty() {
                return Err(structure_error(
                    "<xsl:choose> requires at least one <xsl:when>",
                    pos,
                    source,
                ));
            }
            self.push_instruction(XsltInstruction::Choose { whens, otherwise });
        }
        Ok(())
    }

    pub(crate) fn handle_if_start(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let test = self.parse_xpath(get_attr_required(element, "test", pos, source)?)?;
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::If { test }));
        Ok(())
    }

    pub(crate) fn handle_message_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let terminate = get_yes_no(element, "terminate", pos, source)?.unwrap_or(false);
        self.state_stack
            .push(BuilderState::Instruction(PendingInstruction::Message { terminate }));
        Ok(())
    }
}
