//! Defines the CompilerBuilder, which constructs a `CompiledStylesheet` by listening to a parser driver.
use crate::ast::{
    AttributeSet, CompiledStylesheet, GlobalBinding, KeyDefinition, NamedTemplate, OutputDeclaration,
    Param, PreparsedTemplate, SortKey, TemplateRule, When, WhitespaceRules, WithParam, XsltInstruction,
};
use crate::error::XsltError;
use crate::parser::{self, ElementStart, StylesheetBuilder};
use crate::pattern::{self, Pattern};
use crate::util::{get_line_col_from_pos, structure_error};
use std::collections::HashMap;
use std::sync::Arc;
use xform_xpath1::Expression;

/// The main entry point for compiling an XSLT stylesheet.
pub fn compile(source: &str) -> Result<CompiledStylesheet, XsltError> {
    let mut builder = CompilerBuilder::new();
    parser::parse_stylesheet_content(source, &mut builder)?;
    builder.finalize(source)
}

/// Compiles a stylesheet into the shareable form the engine consumes.
pub fn compile_stylesheet(source: &str) -> Result<Arc<CompiledStylesheet>, XsltError> {
    compile(source).map(Arc::new)
}

/// What a variable-like element binds to, decided by where it appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    GlobalVariable,
    GlobalParam,
    LocalVariable,
    TemplateParam,
    WithParam,
}

#[derive(Debug)]
pub(crate) enum SortableKind {
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<String>,
    },
    ForEach {
        select: Expression,
    },
}

/// A body-bearing instruction whose attributes have been read, waiting for its content.
#[derive(Debug)]
pub(crate) enum PendingInstruction {
    /// A literal result element, `xsl:element` or `xsl:attribute` with an empty body.
    Constructor(Box<XsltInstruction>),
    Comment,
    ProcessingInstruction(crate::ast::AttributeValueTemplate),
    Copy { use_attribute_sets: Vec<String> },
    If { test: Expression },
    Message { terminate: bool },
}

/// Represents the current state of the builder, tracking nested structures.
#[derive(Debug)]
pub(crate) enum BuilderState {
    Stylesheet,
    Template {
        pattern: Option<Pattern>,
        name: Option<String>,
        priority: Option<f64>,
        mode: Option<String>,
        params: Vec<Param>,
    },
    Binding {
        name: String,
        select: Option<Expression>,
        kind: BindingKind,
    },
    Sortable {
        kind: SortableKind,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam>,
    },
    CallTemplate {
        name: String,
        params: Vec<WithParam>,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<PreparsedTemplate>,
    },
    When(Expression),
    Otherwise,
    AttributeSet {
        name: String,
        use_attribute_sets: Vec<String>,
    },
    XslText {
        disable_escaping: bool,
    },
    Instruction(PendingInstruction),
    /// An element with no content of its own, such as `xsl:value-of` or `xsl:sort`.
    Leaf,
    /// A subtree that contributes nothing: foreign top-level elements and `xsl:fallback`.
    Ignored,
}

/// A stateful builder that constructs a `CompiledStylesheet` from parser events.
pub struct CompilerBuilder {
    pub(crate) template_rules: HashMap<Option<String>, Vec<TemplateRule>>,
    pub(crate) named_templates: HashMap<String, Arc<NamedTemplate>>,
    pub(crate) globals: Vec<GlobalBinding>,
    pub(crate) keys: Vec<KeyDefinition>,
    pub(crate) attribute_sets: HashMap<String, AttributeSet>,
    pub(crate) whitespace: WhitespaceRules,
    pub(crate) output: OutputDeclaration,
    pub(crate) namespaces: HashMap<String, String>,
    /// Namespace URIs that literal result elements do not copy.
    pub(crate) excluded_namespaces: Vec<String>,
    pub(crate) template_count: usize,
    pub(crate) saw_stylesheet: bool,
    pub(crate) instruction_stack: Vec<Vec<XsltInstruction>>,
    pub(crate) state_stack: Vec<BuilderState>,
}

impl CompilerBuilder {
    fn new() -> Self {
        Self {
            template_rules: HashMap::new(),
            named_templates: HashMap::new(),
            globals: Vec::new(),
            keys: Vec::new(),
            attribute_sets: HashMap::new(),
            whitespace: WhitespaceRules::default(),
            output: OutputDeclaration::default(),
            namespaces: HashMap::new(),
            excluded_namespaces: vec![crate::ast::XSLT_NAMESPACE.to_string()],
            template_count: 0,
            saw_stylesheet: false,
            instruction_stack: vec![],
            state_stack: vec![],
        }
    }

    /// Consumes the builder to produce the final, compiled artifact.
    fn finalize(mut self, source: &str) -> Result<CompiledStylesheet, XsltError> {
        // A literal result element used as the whole stylesheet leaves its implicit
        // template open.
        if matches!(self.state_stack.last(), Some(BuilderState::Template { .. })) {
            let body = self.instruction_stack.pop().unwrap_or_default();
            if let Some(state) = self.state_stack.pop() {
                self.handle_template_end(state, body, source.len(), source)?;
            }
        }
        if !self.saw_stylesheet {
            return Err(XsltError::Compilation(
                "Document is not a stylesheet: no xsl:stylesheet element found".to_string(),
            ));
        }

        for rules in self.template_rules.values_mut() {
            rules.sort_by(|a, b| {
                b.priority
                    .partial_cmp(&a.priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.order.cmp(&a.order))
            });
        }

        Ok(CompiledStylesheet {
            template_rules: self.template_rules,
            named_templates: self.named_templates,
            globals: self.globals,
            keys: self.keys,
            attribute_sets: self.attribute_sets,
            whitespace: self.whitespace,
            output: self.output,
            namespaces: self.namespaces,
        })
    }

    pub(crate) fn parse_xpath(&self, text: &str) -> Result<Expression, XsltError> {
        Ok(xform_xpath1::parse_expression(text)?)
    }

    pub(crate) fn parse_pattern(&self, text: &str) -> Result<Pattern, XsltError> {
        pattern::parse(text)
    }

    pub(crate) fn push_instruction(&mut self, instr: XsltInstruction) {
        if let Some(parent) = self.instruction_stack.last_mut() {
            parent.push(instr);
        }
    }

    fn handle_xslt_start(
        &mut self,
        name: &str,
        element: &ElementStart,
        pos: usize,
        source: &str,
    ) -> Result<(), XsltError> {
        let top_level = matches!(self.state_stack.last(), Some(BuilderState::Stylesheet));
        match name {
            "stylesheet" | "transform" => self.handle_stylesheet_start(element, pos, source)?,
            "template" if top_level => self.handle_template_start(element, pos, source)?,
            "output" if top_level => self.handle_output(element, pos, source)?,
            "key" if top_level => self.handle_key(element, pos, source)?,
            "strip-space" if top_level => self.handle_space(element, true, pos, source)?,
            "preserve-space" if top_level => self.handle_space(element, false, pos, source)?,
            "attribute-set" if top_level => self.handle_attribute_set_start(element, pos, source)?,
            "param" => self.handle_param_start(element, pos, source)?,
            "variable" => self.handle_variable_start(element, pos, source)?,
            "with-param" => self.handle_with_param_start(element, pos, source)?,
            "apply-templates" => self.handle_apply_templates_start(element, pos, source)?,
            "for-each" => self.handle_for_each_start(element, pos, source)?,
            "sort" => self.handle_sort(element, pos, source)?,
            "call-template" => self.handle_call_template_start(element, pos, source)?,
            "choose" => self.handle_choose_start(),
            "when" => self.handle_when_start(element, pos, source)?,
            "otherwise" => self.handle_otherwise_start(pos, source)?,
            "if" => self.handle_if_start(element, pos, source)?,
            "message" => self.handle_message_start(element, pos, source)?,
            "fallback" => self.state_stack.push(BuilderState::Ignored),
            "text" => self.handle_text_start(element, pos, source)?,
            "value-of" => self.handle_value_of(element, pos, source)?,
            "copy-of" => self.handle_copy_of(element, pos, source)?,
            "copy" => self.handle_copy_start(element),
            "element" => self.handle_element_start(element, pos, source)?,
            "attribute" => self.handle_attribute_start(element, pos, source)?,
            "comment" => self
                .state_stack
                .push(BuilderState::Instruction(PendingInstruction::Comment)),
            "processing-instruction" => self.handle_processing_instruction_start(element, pos, source)?,
            "import" | "include" | "number" | "decimal-format" | "namespace-alias" => {
                return Err(structure_error(
                    format!("<xsl:{}> is not supported", name),
                    pos,
                    source,
                ));
            }
            other => {
                return Err(structure_error(
                    format!("Unexpected XSLT element <xsl:{}>", other),
                    pos,
                    source,
                ));
            }
        }
        Ok(())
    }
}

impl StylesheetBuilder for CompilerBuilder {
    fn start_element(&mut self, element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        if matches!(self.state_stack.last(), Some(BuilderState::Ignored)) {
            self.instruction_stack.push(Vec::new());
            self.state_stack.push(BuilderState::Ignored);
            return Ok(());
        }
        if self.state_stack.is_empty() && element.xslt_name().is_none() {
            self.handle_simplified_stylesheet_start(element, pos, source)?;
        }
        self.instruction_stack.push(Vec::new());

        for (prefix, uri) in &element.declared_namespaces {
            if let Some(prefix) = prefix {
                self.namespaces
                    .entry(prefix.clone())
                    .or_insert_with(|| uri.clone());
            }
        }

        match element.xslt_name() {
            Some(name) => self.handle_xslt_start(name, element, pos, source)?,
            None if matches!(self.state_stack.last(), Some(BuilderState::Stylesheet)) => {
                if element.namespace.is_none() {
                    log::warn!(
                        "Ignoring top-level element <{}> with no namespace at line {}",
                        element.name,
                        get_line_col_from_pos(source, pos).0
                    );
                }
                self.state_stack.push(BuilderState::Ignored);
            }
            None => self.handle_literal_result_element_start(element, pos, source)?,
        }
        Ok(())
    }

    fn end_element(&mut self, _element: &ElementStart, pos: usize, source: &str) -> Result<(), XsltError> {
        let body = self.instruction_stack.pop().unwrap_or_default();
        let Some(current_state) = self.state_stack.pop() else {
            return Ok(());
        };

        match current_state {
            BuilderState::Stylesheet | BuilderState::Ignored => {}
            // Empty instructions are compiled into their own frame; hand them to the parent.
            BuilderState::Leaf => self.handle_text_end(body),
            state @ BuilderState::Template { .. } => self.handle_template_end(state, body, pos, source)?,
            state @ BuilderState::Binding { .. } => self.handle_binding_end(state, body, pos, source)?,
            state @ BuilderState::Sortable { .. } => self.handle_sortable_end(state, body),
            BuilderState::CallTemplate { name, params } => {
                self.push_instruction(XsltInstruction::CallTemplate { name, params })
            }
            state @ BuilderState::Choose { .. } => self.handle_choose_end(state, pos, source)?,
            BuilderState::When(test) => self.handle_when_end(test, body),
            BuilderState::Otherwise => self.handle_otherwise_end(body),
            BuilderState::AttributeSet {
                name,
                use_attribute_sets,
            } => self.handle_attribute_set_end(name, use_attribute_sets, body),
            BuilderState::XslText { .. } => self.handle_text_end(body),
            BuilderState::Instruction(pending) => self.handle_instruction_end(pending, body),
        }
        Ok(())
    }

    fn text(&mut self, text: String) -> Result<(), XsltError> {
        let (keeps_text, disable_escaping) = match self.state_stack.last() {
            Some(BuilderState::XslText { disable_escaping }) => (true, *disable_escaping),
            Some(
                BuilderState::Template { .. }
                | BuilderState::Binding { .. }
                | BuilderState::Sortable {
                    kind: SortableKind::ForEach { .. },
                    ..
                }
                | BuilderState::When(_)
                | BuilderState::Otherwise
                | BuilderState::Instruction(_),
            ) => (!text.trim().is_empty(), false),
            _ => (false, false),
        };

        // Preserve whitespace content if it's from <xsl:text>.
        // Otherwise, only keep text that has non-whitespace characters.
        if keeps_text && let Some(body) = self.instruction_stack.last_mut() {
            body.push(XsltInstruction::Text {
                text,
                disable_escaping,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BindingValue, OutputMethod};

    fn compile_ok(source: &str) -> CompiledStylesheet {
        compile(source).unwrap()
    }

    const HEADER: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">"#;

    #[test]
    fn test_rules_sorted_by_priority_then_order() {
        let xslt = format!(
            r#"{HEADER}
                <xsl:template match="para" priority="1"><a/></xsl:template>
                <xsl:template match="*"><b/></xsl:template>
                <xsl:template match="para" priority="2"><c/></xsl:template>
                <xsl:template match="para" priority="2"><d/></xsl:template>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        let rules = compiled.rules_for_mode(None);
        let summary: Vec<(f64, usize)> = rules.iter().map(|r| (r.priority, r.order)).collect();
        assert_eq!(summary, vec![(2.0, 3), (2.0, 2), (1.0, 0), (-0.5, 1)]);
    }

    #[test]
    fn test_union_is_split_per_alternative() {
        let xslt = format!(
            r#"{HEADER}
                <xsl:template match="a | b/c | *"><x/></xsl:template>
                <xsl:template match="d | e" priority="3"><y/></xsl:template>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        let rules = compiled.rules_for_mode(None);
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[0].priority, 3.0);
        assert_eq!(rules[0].pattern.to_string(), "d | e");
        let priorities: Vec<f64> = rules[1..].iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![0.5, 0.0, -0.5]);
    }

    #[test]
    fn test_modes_named_templates_and_params() {
        let xslt = format!(
            r#"{HEADER}
                <xsl:param name="title" select="'Default'"/>
                <xsl:variable name="count">3</xsl:variable>
                <xsl:template match="item" mode="toc"><li/></xsl:template>
                <xsl:template name="greet">
                    <xsl:param name="who" select="'World'"/>
                    <p>Hello <xsl:value-of select="$who"/></p>
                </xsl:template>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        assert_eq!(compiled.rules_for_mode(Some("toc")).len(), 1);
        assert!(compiled.rules_for_mode(None).is_empty());

        let greet = &compiled.named_templates["greet"];
        assert_eq!(greet.params.len(), 1);
        assert!(matches!(greet.params[0].default_value, BindingValue::Select(_)));

        assert_eq!(compiled.globals.len(), 2);
        assert!(compiled.globals[0].is_param);
        assert!(matches!(compiled.globals[1].value, BindingValue::Fragment(_)));
    }

    #[test]
    fn test_whitespace_text_handling() {
        let xslt = format!(
            r#"{HEADER}
                <xsl:template match="/">
                    <out>
                        <xsl:text>  </xsl:text>
                        keep
                    </out>
                </xsl:template>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        let body = &compiled.rules_for_mode(None)[0].body.0;
        let XsltInstruction::LiteralElement { body, .. } = &body[0] else {
            panic!("Expected a literal element, got {:?}", body);
        };
        assert_eq!(body.0.len(), 2);
        assert!(matches!(&body.0[0], XsltInstruction::Text { text, .. } if text == "  "));
        assert!(matches!(&body.0[1], XsltInstruction::Text { text, .. } if text.trim() == "keep"));
    }

    #[test]
    fn test_empty_instructions_land_in_parent_body() {
        let xslt = format!(
            r#"{HEADER}
                <xsl:template match="/">[<xsl:value-of select="'lit'"/>]<xsl:copy-of select="."/></xsl:template>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        let body = &compiled.rules_for_mode(None)[0].body.0;
        assert_eq!(body.len(), 4, "unexpected body: {:?}", body);
        assert!(matches!(&body[0], XsltInstruction::Text { text, .. } if text == "["));
        assert!(matches!(&body[1], XsltInstruction::ValueOf { disable_escaping: false, .. }));
        assert!(matches!(&body[2], XsltInstruction::Text { text, .. } if text == "]"));
        assert!(matches!(&body[3], XsltInstruction::CopyOf { .. }));
    }

    #[test]
    fn test_output_and_space_declarations() {
        let xslt = format!(
            r#"{HEADER}
                <xsl:output method="html" encoding="ISO-8859-1" indent="no" doctype-system="about:legacy-compat"/>
                <xsl:strip-space elements="*"/>
                <xsl:preserve-space elements="pre"/>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        assert_eq!(compiled.output.method, Some(OutputMethod::Html));
        assert_eq!(compiled.output.encoding.as_deref(), Some("ISO-8859-1"));
        assert_eq!(compiled.output.indent, Some(false));
        assert!(compiled.whitespace.strips(None, "div"));
        assert!(!compiled.whitespace.strips(None, "pre"));
    }

    #[test]
    fn test_literal_element_namespaces_exclude_xslt() {
        let xslt = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
                xmlns:svg="http://www.w3.org/2000/svg" xmlns:junk="urn:junk" exclude-result-prefixes="junk">
                <xsl:template match="/"><svg:rect xsl:use-attribute-sets="box" width="{@w}"/></xsl:template>
                <xsl:attribute-set name="box"><xsl:attribute name="x">0</xsl:attribute></xsl:attribute-set>
            </xsl:stylesheet>"#;
        let compiled = compile_ok(xslt);
        let XsltInstruction::LiteralElement {
            name,
            namespace,
            namespaces,
            attrs,
            use_attribute_sets,
            ..
        } = &compiled.rules_for_mode(None)[0].body.0[0]
        else {
            panic!("Expected a literal element");
        };
        assert_eq!(name, "svg:rect");
        assert_eq!(namespace.as_deref(), Some("http://www.w3.org/2000/svg"));
        assert_eq!(
            namespaces,
            &vec![(Some("svg".to_string()), "http://www.w3.org/2000/svg".to_string())]
        );
        assert_eq!(attrs.len(), 1);
        assert_eq!(use_attribute_sets, &vec!["box".to_string()]);
        assert_eq!(compiled.attribute_sets["box"].attributes.len(), 1);
        assert_eq!(compiled.namespaces["svg"], "http://www.w3.org/2000/svg");
    }

    #[test]
    fn test_simplified_stylesheet() {
        let xslt = r#"<html xsl:version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><body><xsl:value-of select="/doc/title"/></body></html>"#;
        let compiled = compile_ok(xslt);
        let rules = compiled.rules_for_mode(None);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern.to_string(), "/");
        let XsltInstruction::LiteralElement { attrs, .. } = &rules[0].body.0[0] else {
            panic!("Expected a literal element");
        };
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_compile_errors() {
        let unknown = format!(r#"{HEADER}<xsl:template match="/"><xsl:bogus/></xsl:template></xsl:stylesheet>"#);
        assert!(matches!(compile(&unknown), Err(XsltError::TemplateStructure { .. })));

        let bad_xpath = format!(r#"{HEADER}<xsl:template match="/"><xsl:value-of select="1 +"/></xsl:template></xsl:stylesheet>"#);
        assert!(matches!(compile(&bad_xpath), Err(XsltError::XPath(_))));

        let missing_select = format!(r#"{HEADER}<xsl:template match="/"><xsl:value-of/></xsl:template></xsl:stylesheet>"#);
        let err = compile(&missing_select).unwrap_err();
        assert!(err.to_string().contains("Missing required attribute 'select'"));

        let no_match_or_name = format!(r#"{HEADER}<xsl:template><a/></xsl:template></xsl:stylesheet>"#);
        assert!(compile(&no_match_or_name).is_err());

        assert!(compile("<not-xml").is_err());
    }

    #[test]
    fn test_fallback_and_foreign_elements_are_ignored() {
        let xslt = format!(
            r#"{HEADER}
                <foo:meta xmlns:foo="urn:foo"><xsl:bogus/></foo:meta>
                <xsl:template match="/"><xsl:fallback><xsl:bogus/></xsl:fallback><ok/></xsl:template>
            </xsl:stylesheet>"#
        );
        let compiled = compile_ok(&xslt);
        assert_eq!(compiled.rules_for_mode(None)[0].body.0.len(), 1);
    }
}
