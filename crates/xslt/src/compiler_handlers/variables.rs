//! Handlers for `<xsl:variable>`, `<xsl:param>`, and `<xsl:with-param>`.

use crate::ast::{BindingValue, GlobalBinding, Param, PreparsedTemplate, WithParam, XsltInstruction};
use crate::compiler::{BindingKind, BuilderState, CompilerBuilder, SortableKind};
use crate::error::XsltError;
use crate::parser::ElementStart;
use crate::util::{get_attr_optional, get_attr_required, structure_error};

impl CompilerBuilder {
    fn push_binding(
        &mut self,
        element: &ElementStart,
        kind: BindingKind,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let name = get_attr_required(element, "name", pos, source)?.to_string();
        let select = get_attr_optional(element, "select")
            .map(|s| self.parse_xpath(s))
            .transpose()?;
        self.state_stack
            .push(BuilderState::Binding { name, select, kind });
        Ok(())
    }

    pub(crate) fn handle_variable_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let kind = match self.state_stack.last() {
            Some(BuilderState::Stylesheet) => BindingKind::GlobalVariable,
            _ => BindingKind::LocalVariable,
        };
        self.push_binding(element, kind, pos, source)
    }

    pub(crate) fn handle_param_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let kind = match self.state_stack.last() {
            Some(BuilderState::Stylesheet) => BindingKind::GlobalParam,
            Some(BuilderState::Template { .. }) => BindingKind::TemplateParam,
            _ => {
                return Err(structure_error(
                    "<xsl:param> must be a top-level element or a direct child of <xsl:template>",
                    pos,
                    source,
                ));
            }
        };
        self.push_binding(element, kind, pos, source)
    }

    pub(crate) fn handle_with_param_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let allowed = matches!(
            self.state_stack.last(),
            Some(BuilderState::CallTemplate { .. })
                | Some(BuilderState::Sortable {
                    kind: SortableKind::ApplyTemplates { .. },
                    ..
                })
        );
        if !allowed {
            return Err(structure_error(
                "<xsl:with-param> must be a direct child of <xsl:call-template> or <xsl:apply-templates>",
                pos,
                source,
            ));
        }
        self.push_binding(element, BindingKind::WithParam, pos, source)
    }

    /// Resolves the binding's value and files it where its kind says it belongs.
    pub(crate) fn handle_binding_end(
        &mut self,
        current_state: BuilderState,
        body: Vec<XsltInstruction>,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let BuilderState::Binding { name, select, kind } = current_state else {
            return Ok(());
        };
        let value = match (select, body.is_empty()) {
            (Some(_), false) => {
                return Err(structure_error(
                    format!("'{}' has both a select attribute and content", name),
                    pos,
                    source,
                ));
            }
            (Some(expr), true) => BindingValue::Select(expr),
            (None, false) => BindingValue::Fragment(PreparsedTemplate(body)),
            (None, true) => BindingValue::Empty,
        };

        match kind {
            BindingKind::GlobalVariable | BindingKind::GlobalParam => {
                if self.globals.iter().any(|g| g.name == name) {
                    return Err(structure_error(
                        format!("Duplicate global variable or parameter '{}'", name),
                        pos,
                        source,
                    ));
                }
                self.globals.push(GlobalBinding {
                    name,
                    value,
                    is_param: kind == BindingKind::GlobalParam,
                });
            }
            BindingKind::LocalVariable => self.push_instruction(XsltInstruction::Variable { name, value }),
            BindingKind::TemplateParam => {
                if let Some(BuilderState::Template { params, .. }) = self.state_stack.last_mut() {
                    params.push(Param {
                        name,
                        default_value: value,
                    });
                }
            }
            BindingKind::WithParam => match self.state_stack.last_mut() {
                Some(BuilderState::CallTemplate { params, .. }) | Some(BuilderState::Sortable { params, .. }) => {
                    params.push(WithParam { name, value })
                }
                _ => {}
            },
        }
        Ok(())
    }
}
