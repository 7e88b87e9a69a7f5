//! Handlers for `<xsl:template>` and the instructions that invoke templates.

use crate::ast::{
    NamedTemplate, PreparsedTemplate, SortDataType, SortKey, SortOrder, TemplateRule, XsltInstruction,
};
use crate::compiler::{BuilderState, CompilerBuilder, SortableKind};
use crate::error::XsltError;
use crate::parser::ElementStart;
use crate::util::{get_attr_optional, get_attr_required, structure_error};
use std::sync::Arc;

impl CompilerBuilder {
    pub(crate) fn handle_template_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let pattern = get_attr_optional(element, "match")
            .map(|m| self.parse_pattern(m))
            .transpose()?;
        let name = get_attr_optional(element, "name").map(str::to_string);
        if pattern.is_none() && name.is_none() {
            return Err(structure_error(
                "<xsl:template> requires a 'match' or 'name' attribute",
                pos,
                source,
            ));
        }
        let priority = match get_attr_optional(element, "priority") {
            Some(p) => Some(p.trim().parse::<f64>().map_err(|_| {
                structure_error(format!("Invalid template priority '{}'", p), pos, source)
            })?),
            None => None,
        };
        let mode = get_attr_optional(element, "mode").map(str::to_string);
        if mode.is_some() && pattern.is_none() {
            log::warn!("Ignoring mode on named template without a match pattern");
        }

        self.state_stack.push(BuilderState::Template {
            pattern,
            name,
            priority,
            mode,
            params: Vec::new(),
        });
        Ok(())
    }

    /// Registers the finished template. A template with both `match` and `name` is
    /// reachable both ways.
    pub(crate) fn handle_template_end(
        &mut self,
        current_state: BuilderState,
        body: Vec<XsltInstruction>,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let BuilderState::Template {
            pattern,
            name,
            priority,
            mode,
            params,
        } = current_state
        else {
            return Ok(());
        };
        let order = self.template_count;
        self.template_count += 1;
        let body = PreparsedTemplate(body);

        if let Some(name) = name {
            if self.named_templates.contains_key(&name) {
                return Err(structure_error(
                    format!("Duplicate named template '{}'", name),
                    pos,
                    source,
                ));
            }
            let template = NamedTemplate {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
            };
            self.named_templates.insert(name, Arc::new(template));
        }

        if let Some(pattern) = pattern {
            let alternatives = match priority {
                Some(priority) => vec![(pattern, priority)],
                None => pattern
                    .alternatives()
                    .into_iter()
                    .map(|alt| {
                        let priority = alt.default_priority();
                        (alt, priority)
                    })
                    .collect(),
            };
            let rules = self.template_rules.entry(mode.clone()).or_default();
            for (pattern, priority) in alternatives {
                rules.push(TemplateRule {
                    pattern,
                    priority,
                    mode: mode.clone(),
                    order,
                    params: params.clone(),
                    body: body.clone(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn handle_apply_templates_start(
        &mut self,
        element: &ElementStart,
        _pos: usize,
        _source: &str,
    ) -> Result<(), XsltError> {
        let select = get_attr_optional(element, "select")
            .map(|s| self.parse_xpath(s))
            .transpose()?;
        self.state_stack.push(BuilderState::Sortable {
            kind: SortableKind::ApplyTemplates {
                select,
                mode: get_attr_optional(element, "mode").map(str::to_string),
            },
            sort_keys: Vec::new(),
            params: Vec::new(),
        });
        Ok(())
    }

    pub(crate) fn handle_for_each_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let select = self.parse_xpath(get_attr_required(element, "select", pos, source)?)?;
        self.state_stack.push(BuilderState::Sortable {
            kind: SortableKind::ForEach { select },
            sort_keys: Vec::new(),
            params: Vec::new(),
        });
        Ok(())
    }

    pub(crate) fn handle_sort(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let select = self.parse_xpath(get_attr_optional(element, "select").unwrap_or("."))?;
        let order = match get_attr_optional(element, "order") {
            None | Some("ascending") => SortOrder::Ascending,
            Some("descending") => SortOrder::Descending,
            Some(other) => {
                return Err(structure_error(format!("Invalid sort order '{}'", other), pos, source));
            }
        };
        let data_type = match get_attr_optional(element, "data-type") {
            None | Some("text") => SortDataType::Text,
            Some("number") => SortDataType::Number,
            Some(other) => {
                log::warn!("Unsupported sort data-type '{}', sorting as text", other);
                SortDataType::Text
            }
        };

        let Some(BuilderState::Sortable { sort_keys, .. }) = self.state_stack.last_mut() else {
            return Err(structure_error(
                "<xsl:sort> must be a child of <xsl:apply-templates> or <xsl:for-each>",
                pos,
                source,
            ));
        };
        sort_keys.push(SortKey {
            select,
            order,
            data_type,
        });
        self.state_stack.push(BuilderState::Leaf);
        Ok(())
    }

    pub(crate) fn handle_sortable_end(&mut self, current_state: BuilderState, body: Vec<XsltInstruction>) {
        let BuilderState::Sortable {
            kind,
            sort_keys,
            params,
        } = current_state
        else {
            return;
        };
        let instr = match kind {
            SortableKind::ApplyTemplates { select, mode } => XsltInstruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
                params,
            },
            SortableKind::ForEach { select } => XsltInstruction::ForEach {
                select,
                sort_keys,
                body: PreparsedTemplate(body),
            },
        };
        self.push_instruction(instr);
    }

    pub(crate) fn handle_call_template_start(
        &mut self,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let name = get_attr_required(element, "name", pos, source)?.to_string();
        self.state_stack.push(BuilderState::CallTemplate {
            name,
            params: Vec::new(),
        });
        Ok(())
    }
}
