//! The transformation driver: runs the match/instantiate cycle of a `CompiledStylesheet`
//! against a source tree and reports the result through an `OutputBuilder`.
use crate::ast::{
    AttributeValueTemplate, AvtPart, BindingValue, CompiledStylesheet, Param, PreparsedTemplate, SortDataType,
    SortKey, SortOrder, TemplateRule, XsltInstruction,
};
use crate::executor_handlers::{
    apply_templates, call_template, control_flow, copy, for_each, literals, variables,
};
use crate::fragment::{FragmentBuilder, ResultFragment};
use crate::output::OutputBuilder;
use crate::params::BoundParameters;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::rc::Rc;
use thiserror::Error;
use xform_xpath1::datasource::{DataSourceNode, NodeType};
use xform_xpath1::{EvaluationContext, Expression, KeyIndexes, VariableScope, XPathError, XPathValue};

/// Runtime options of a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// If true, references to undeclared variables and undeclared `xsl:with-param`
    /// names on `xsl:call-template` are errors.
    pub strict: bool,
    /// The maximum nesting of template instantiations. Built-in rules do not count.
    pub max_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: 1000,
        }
    }
}

impl ExecutionConfig {
    const BASE_STACK: usize = 4 * 1024 * 1024;
    const STACK_PER_LEVEL: usize = 64 * 1024;

    /// Stack reserved for the thread that runs a transformation, sized so that
    /// `max_depth` nested instantiations fit before the limit is reported.
    pub fn stack_size(&self) -> usize {
        self.max_depth
            .saturating_mul(Self::STACK_PER_LEVEL)
            .saturating_add(Self::BASE_STACK)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("XPath evaluation failed: {0}")]
    XPath(#[from] XPathError),

    #[error("Call to unknown named template: '{0}'")]
    UnknownNamedTemplate(String),

    #[error("template recursion depth exceeded (limit {0})")]
    RecursionLimit(usize),

    #[error("Transformation terminated by xsl:message: {0}")]
    Terminated(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Parameter '{name}': {message}")]
    Parameter { name: String, message: String },

    #[error("Circular definition of global variable '{0}'")]
    CircularVariable(String),
}

/// A variable's value. Variables bound from element content also keep the fragment, so
/// `xsl:copy-of` can reproduce its structure.
#[derive(Debug, Clone)]
pub(crate) struct Binding<N> {
    pub value: XPathValue<N>,
    pub fragment: Option<Rc<ResultFragment>>,
}

impl<N> Binding<N> {
    fn value(value: XPathValue<N>) -> Self {
        Self { value, fragment: None }
    }
}

/// Evaluated `xsl:with-param` values, in source order.
pub(crate) type PassedParams<N> = Vec<(String, Binding<N>)>;

/// Variable frames. Frame 0 holds the globals; a template invocation only sees the
/// frames from `base` upward plus the globals.
struct ScopeStack<N> {
    frames: Vec<HashMap<String, Binding<N>>>,
    base: usize,
}

impl<N> ScopeStack<N> {
    fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
            base: 1,
        }
    }

    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop(&mut self) {
        if self.frames.len() > self.base {
            self.frames.pop();
        }
    }

    fn enter_template(&mut self) -> usize {
        let saved = self.base;
        self.base = self.frames.len();
        self.frames.push(HashMap::new());
        saved
    }

    fn leave_template(&mut self, saved: usize) {
        self.frames.truncate(self.base);
        self.base = saved;
    }

    fn set(&mut self, name: String, binding: Binding<N>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, binding);
        }
    }

    fn set_global(&mut self, name: String, binding: Binding<N>) {
        self.frames[0].insert(name, binding);
    }

    fn has_global(&self, name: &str) -> bool {
        self.frames[0].contains_key(name)
    }

    fn binding(&self, name: &str) -> Option<&Binding<N>> {
        self.frames[self.base..]
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.frames[0].get(name))
    }
}

impl<N> VariableScope<N> for ScopeStack<N> {
    fn lookup(&self, name: &str) -> Option<&XPathValue<N>> {
        self.binding(name).map(|b| &b.value)
    }
}

/// A stateful executor that builds a result tree by processing a `CompiledStylesheet`
/// against a generic `DataSourceNode`. It implements the XSLT "push" model.
pub struct TemplateExecutor<'s, 'a, N: DataSourceNode<'a>> {
    pub(crate) stylesheet: &'s CompiledStylesheet,
    pub(crate) root_node: N,
    pub(crate) config: ExecutionConfig,
    key_indexes: KeyIndexes<N>,
    scopes: ScopeStack<N>,
    depth: usize,
    _marker: PhantomData<&'a ()>,
}

impl<'s, 'a, N: DataSourceNode<'a> + 'a> TemplateExecutor<'s, 'a, N> {
    pub fn new(stylesheet: &'s CompiledStylesheet, root_node: N, config: ExecutionConfig) -> Result<Self, ExecutionError> {
        let mut executor = Self {
            stylesheet,
            root_node,
            config,
            key_indexes: HashMap::new(),
            scopes: ScopeStack::new(),
            depth: 0,
            _marker: PhantomData,
        };
        executor.build_key_indexes()?;
        Ok(executor)
    }

    /// The main public entry point for the executor: binds the globals, then applies
    /// templates to the root in the default mode.
    pub fn execute(&mut self, params: &BoundParameters, builder: &mut dyn OutputBuilder) -> Result<(), ExecutionError> {
        self.bind_globals(params)?;
        self.apply_templates_to_nodes(&[self.root_node], None, &[], builder)
    }

    // --- Globals and keys ---

    fn bind_globals(&mut self, params: &BoundParameters) -> Result<(), ExecutionError> {
        let stylesheet = self.stylesheet;
        for (name, expr_text) in params.iter() {
            if stylesheet.global(name).is_some_and(|g| !g.is_param) {
                log::warn!("Ignoring parameter '{}': the stylesheet declares it as a variable", name);
                continue;
            }
            let to_param_error = |e: XPathError| ExecutionError::Parameter {
                name: name.to_string(),
                message: e.to_string(),
            };
            let expr = xform_xpath1::parse_expression(expr_text).map_err(to_param_error)?;
            let value = {
                let e_ctx = self.eval_context(self.root_node, 1, 1);
                xform_xpath1::evaluate(&expr, &e_ctx).map_err(to_param_error)?
            };
            log::debug!("Bound parameter ${} = {}", name, expr_text);
            self.scopes.set_global(name.to_string(), Binding::value(value));
        }

        let mut in_progress = HashSet::new();
        for global in &stylesheet.globals {
            self.bind_global(&global.name, &mut in_progress)?;
        }
        Ok(())
    }

    /// Evaluates a global once, evaluating the globals it refers to first.
    fn bind_global(&mut self, name: &str, in_progress: &mut HashSet<String>) -> Result<(), ExecutionError> {
        if self.scopes.has_global(name) {
            return Ok(());
        }
        let stylesheet = self.stylesheet;
        let Some(global) = stylesheet.global(name) else {
            return Ok(());
        };
        if !in_progress.insert(name.to_string()) {
            return Err(ExecutionError::CircularVariable(name.to_string()));
        }
        for dependency in global.value.referenced_variables(stylesheet) {
            self.bind_global(&dependency, in_progress)?;
        }
        let binding = self.evaluate_binding(&global.value, self.root_node, 1, 1)?;
        in_progress.remove(name);
        self.scopes.set_global(name.to_string(), binding);
        Ok(())
    }

    fn build_key_indexes(&mut self) -> Result<(), ExecutionError> {
        if self.stylesheet.keys.is_empty() {
            return Ok(());
        }
        let mut all_nodes = Vec::new();
        collect_nodes(self.root_node, &mut all_nodes);

        let no_vars: HashMap<String, XPathValue<N>> = HashMap::new();
        let mut indexes: KeyIndexes<N> = HashMap::new();
        for key in &self.stylesheet.keys {
            let index = indexes.entry(key.name.clone()).or_default();
            for &node in &all_nodes {
                let e_ctx = EvaluationContext::new(node, self.root_node, &no_vars)
                    .with_namespaces(&self.stylesheet.namespaces);
                if !key.pattern.matches(node, &e_ctx)? {
                    continue;
                }
                let values = match xform_xpath1::evaluate(&key.use_expr, &e_ctx)? {
                    XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
                    other => vec![other.to_string()],
                };
                for value in values {
                    let nodes = index.entry(value).or_default();
                    if nodes.last() != Some(&node) {
                        nodes.push(node);
                    }
                }
            }
        }
        self.key_indexes = indexes;
        Ok(())
    }

    // --- Scope Management ---

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push();
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn set_variable_in_current_scope(&mut self, name: String, binding: Binding<N>) {
        self.scopes.set(name, binding);
    }

    /// The fragment bound to `$name`, if the variable was built from element content.
    pub(crate) fn fragment_variable(&self, name: &str) -> Option<Rc<ResultFragment>> {
        self.scopes.binding(name).and_then(|b| b.fragment.clone())
    }

    pub(crate) fn eval_context(
        &self,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> EvaluationContext<'a, '_, N> {
        EvaluationContext::new(context_node, self.root_node, &self.scopes)
            .with_position(context_position, context_size)
            .with_keys(&self.key_indexes)
            .with_namespaces(&self.stylesheet.namespaces)
            .with_strict(self.config.strict)
    }

    pub(crate) fn evaluate_expr(
        &self,
        expr: &Expression,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<XPathValue<N>, ExecutionError> {
        let e_ctx = self.eval_context(context_node, context_position, context_size);
        Ok(xform_xpath1::evaluate(expr, &e_ctx)?)
    }

    /// Evaluates an expression that must produce a node-set.
    pub(crate) fn select_nodes(
        &self,
        expr: &Expression,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<Vec<N>, ExecutionError> {
        match self.evaluate_expr(expr, context_node, context_position, context_size)? {
            XPathValue::NodeSet(nodes) => Ok(nodes
                .into_iter()
                .filter(|n| !self.is_stripped_whitespace(*n))
                .collect()),
            other => Err(ExecutionError::XPath(XPathError::TypeError(format!(
                "Expected a node-set, found the value '{}'",
                other
            )))),
        }
    }

    /// Evaluates an AVT and returns the resulting string.
    pub(crate) fn evaluate_avt(
        &self,
        avt: &AttributeValueTemplate,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<String, ExecutionError> {
        match avt {
            AttributeValueTemplate::Static(s) => Ok(s.clone()),
            AttributeValueTemplate::Dynamic(parts) => {
                let e_ctx = self.eval_context(context_node, context_position, context_size);
                let mut result = String::new();
                for part in parts {
                    match part {
                        AvtPart::Static(s) => result.push_str(s),
                        AvtPart::Dynamic(expression) => {
                            result.push_str(&xform_xpath1::evaluate(expression, &e_ctx)?.to_string())
                        }
                    }
                }
                Ok(result)
            }
        }
    }

    /// Computes the value of a variable, parameter default or with-param.
    pub(crate) fn evaluate_binding(
        &mut self,
        value: &BindingValue,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<Binding<N>, ExecutionError> {
        match value {
            BindingValue::Select(expr) => Ok(Binding::value(self.evaluate_expr(
                expr,
                context_node,
                context_position,
                context_size,
            )?)),
            BindingValue::Fragment(body) => {
                let mut fragment_builder = FragmentBuilder::new();
                self.execute_template(body, context_node, context_position, context_size, &mut fragment_builder)?;
                let fragment = fragment_builder.finish();
                Ok(Binding {
                    value: XPathValue::String(fragment.string_value()),
                    fragment: Some(Rc::new(fragment)),
                })
            }
            BindingValue::Empty => Ok(Binding::value(XPathValue::String(String::new()))),
        }
    }

    // --- Template Execution ---

    /// Processes a list of instructions from a template body against a context node.
    /// Variables bound by the body are visible until it ends.
    pub(crate) fn execute_template(
        &mut self,
        template: &PreparsedTemplate,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        self.push_scope();
        let mut result = Ok(());
        for instr in &template.0 {
            result = self.execute_instruction(instr, context_node, context_position, context_size, builder);
            if result.is_err() {
                break;
            }
        }
        self.pop_scope();
        result
    }

    /// Processes a single XSLT instruction.
    fn execute_instruction(
        &mut self,
        instruction: &XsltInstruction,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        let (node, pos, size) = (context_node, context_position, context_size);
        match instruction {
            XsltInstruction::Text { text, disable_escaping } => builder.text(text, *disable_escaping),
            XsltInstruction::LiteralElement {
                name,
                namespace,
                namespaces,
                attrs,
                use_attribute_sets,
                body,
            } => literals::handle_literal_element(
                self,
                name,
                namespace.as_deref(),
                namespaces,
                attrs,
                use_attribute_sets,
                body,
                node,
                pos,
                size,
                builder,
            )?,
            XsltInstruction::Element {
                name,
                namespace,
                in_scope,
                use_attribute_sets,
                body,
            } => literals::handle_element(
                self,
                name,
                namespace.as_ref(),
                in_scope,
                use_attribute_sets,
                body,
                node,
                pos,
                size,
                builder,
            )?,
            XsltInstruction::Attribute {
                name,
                namespace,
                in_scope,
                body,
            } => literals::handle_attribute(self, name, namespace.as_ref(), in_scope, body, node, pos, size, builder)?,
            XsltInstruction::Comment { body } => literals::handle_comment(self, body, node, pos, size, builder)?,
            XsltInstruction::ProcessingInstruction { name, body } => {
                literals::handle_processing_instruction(self, name, body, node, pos, size, builder)?
            }
            XsltInstruction::ValueOf {
                select,
                disable_escaping,
            } => {
                let content = self.evaluate_expr(select, node, pos, size)?.to_string();
                builder.text(&content, *disable_escaping);
            }
            XsltInstruction::CopyOf { select } => copy::handle_copy_of(self, select, node, pos, size, builder)?,
            XsltInstruction::Copy {
                use_attribute_sets,
                body,
            } => copy::handle_copy(self, use_attribute_sets, body, node, pos, size, builder)?,
            XsltInstruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
                params,
            } => apply_templates::handle_apply_templates(
                self,
                select.as_ref(),
                mode.as_deref(),
                sort_keys,
                params,
                node,
                pos,
                size,
                builder,
            )?,
            XsltInstruction::CallTemplate { name, params } => {
                call_template::handle_call_template(self, name, params, node, pos, size, builder)?
            }
            XsltInstruction::If { test, body } => {
                let condition = self.evaluate_expr(test, node, pos, size)?.to_bool();
                control_flow::handle_if(self, condition, body, node, pos, size, builder)?
            }
            XsltInstruction::Choose { whens, otherwise } => {
                control_flow::handle_choose(self, whens, otherwise.as_ref(), node, pos, size, builder)?
            }
            XsltInstruction::ForEach {
                select,
                sort_keys,
                body,
            } => for_each::handle_for_each(self, select, sort_keys, body, node, pos, size, builder)?,
            XsltInstruction::Variable { name, value } => {
                variables::handle_variable(self, name, value, node, pos, size)?
            }
            XsltInstruction::Message { body, terminate } => {
                control_flow::handle_message(self, body, *terminate, node, pos, size)?
            }
        }
        Ok(())
    }

    /// Applies the best matching rule, or the built-in rule, to each node in turn.
    ///
    /// The built-in rule for roots and elements descends through an explicit stack of
    /// sibling lists, so unmatched nesting costs no call stack and no template depth.
    /// `params` only reach the rules matched by `nodes` themselves.
    pub(crate) fn apply_templates_to_nodes(
        &mut self,
        nodes: &[N],
        mode: Option<&str>,
        params: &[(String, Binding<N>)],
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        let mut siblings: Vec<(Vec<N>, usize)> = vec![(nodes.to_vec(), 0)];
        while let Some((pending, next)) = siblings.last_mut() {
            let Some(&node) = pending.get(*next) else {
                siblings.pop();
                continue;
            };
            *next += 1;
            let (context_position, context_size) = (*next, pending.len());
            let passed = if siblings.len() == 1 { params } else { &[] };
            match self.find_matching_template(node, mode)? {
                Some(rule) => {
                    self.invoke_template(&rule.params, &rule.body, passed, node, context_position, context_size, builder)?
                }
                None => match node.node_type() {
                    NodeType::Root | NodeType::Element => siblings.push((self.children_of(node), 0)),
                    NodeType::Text | NodeType::Attribute => builder.text(&node.string_value(), false),
                    NodeType::Comment | NodeType::ProcessingInstruction => {}
                },
            }
        }
        Ok(())
    }

    /// Instantiates a template body in a fresh variable scope, binding its declared
    /// parameters from `passed` or their defaults.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn invoke_template(
        &mut self,
        declared: &[Param],
        body: &PreparsedTemplate,
        passed: &[(String, Binding<N>)],
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        self.enter_depth()?;
        let saved = self.scopes.enter_template();
        let result = self
            .bind_template_params(declared, passed, context_node, context_position, context_size)
            .and_then(|()| self.execute_template(body, context_node, context_position, context_size, builder));
        self.scopes.leave_template(saved);
        self.depth -= 1;
        result
    }

    fn bind_template_params(
        &mut self,
        declared: &[Param],
        passed: &[(String, Binding<N>)],
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<(), ExecutionError> {
        for param in declared {
            let binding = match passed.iter().find(|(name, _)| *name == param.name) {
                Some((_, binding)) => binding.clone(),
                None => self.evaluate_binding(&param.default_value, context_node, context_position, context_size)?,
            };
            self.set_variable_in_current_scope(param.name.clone(), binding);
        }
        Ok(())
    }

    fn enter_depth(&mut self) -> Result<(), ExecutionError> {
        if self.depth >= self.config.max_depth {
            return Err(ExecutionError::RecursionLimit(self.config.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn find_matching_template(&self, node: N, mode: Option<&str>) -> Result<Option<&'s TemplateRule>, ExecutionError> {
        let stylesheet = self.stylesheet;
        let rules = stylesheet.rules_for_mode(mode);
        let e_ctx = self.eval_context(node, 1, 1);
        for (i, rule) in rules.iter().enumerate() {
            if !rule.pattern.matches(node, &e_ctx)? {
                continue;
            }
            for other in rules[i + 1..].iter().take_while(|r| r.priority == rule.priority) {
                if other.order != rule.order && other.pattern.matches(node, &e_ctx)? {
                    log::debug!(
                        "Ambiguous match for {:?}: '{}' and '{}' both have priority {}; using the later declaration",
                        node,
                        rule.pattern,
                        other.pattern,
                        rule.priority
                    );
                    break;
                }
            }
            log::debug!("Template '{}' matched {:?}", rule.pattern, node);
            return Ok(Some(rule));
        }
        Ok(None)
    }

    /// The children of `node`, without whitespace text stripped by `xsl:strip-space`.
    pub(crate) fn children_of(&self, node: N) -> Vec<N> {
        node.children()
            .filter(|child| !self.is_stripped_whitespace(*child))
            .collect()
    }

    pub(crate) fn is_stripped_whitespace(&self, node: N) -> bool {
        let rules = &self.stylesheet.whitespace;
        if rules.is_empty() || node.node_type() != NodeType::Text {
            return false;
        }
        if !node
            .string_value()
            .chars()
            .all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
        {
            return false;
        }
        match node.parent().filter(|p| p.node_type() == NodeType::Element).and_then(|p| p.name()) {
            Some(qname) => rules.strips(qname.prefix, qname.local_part),
            None => false,
        }
    }

    pub(crate) fn sort_node_set(&self, nodes: &mut Vec<N>, sort_keys: &[SortKey]) -> Result<(), ExecutionError> {
        if sort_keys.is_empty() {
            return Ok(());
        }

        let size = nodes.len();
        let mut keyed = Vec::with_capacity(size);
        for (i, &node) in nodes.iter().enumerate() {
            let mut values = Vec::with_capacity(sort_keys.len());
            for key in sort_keys {
                values.push(self.evaluate_expr(&key.select, node, i + 1, size)?);
            }
            keyed.push((node, values));
        }

        keyed.sort_by(|(_, a), (_, b)| {
            for (key, (val_a, val_b)) in sort_keys.iter().zip(a.iter().zip(b.iter())) {
                let ordering = match key.data_type {
                    SortDataType::Number => compare_numbers(val_a.to_number(), val_b.to_number()),
                    SortDataType::Text => val_a.to_string().cmp(&val_b.to_string()),
                };
                let final_ordering = if key.order == SortOrder::Descending {
                    ordering.reverse()
                } else {
                    ordering
                };

                if final_ordering != Ordering::Equal {
                    return final_ordering;
                }
            }
            Ordering::Equal
        });

        *nodes = keyed.into_iter().map(|(node, _)| node).collect();
        Ok(())
    }
}

/// NaN sorts before every number.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Every node of the tree in document order, attributes included.
fn collect_nodes<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    out.push(node);
    out.extend(node.attributes());
    for child in node.children() {
        collect_nodes(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::result_tree::ResultTreeBuilder;
    use xform_xpath1::datasource::tests::{MockNode, MockTree, create_test_tree};

    fn run_with(
        xslt: &str,
        tree: &MockTree<'_>,
        params: &BoundParameters,
        config: ExecutionConfig,
    ) -> Result<String, ExecutionError> {
        let stylesheet = compile(xslt).unwrap();
        let root: MockNode<'_> = tree.root();
        let mut executor = TemplateExecutor::new(&stylesheet, root, config)?;
        let mut builder = ResultTreeBuilder::new();
        executor.execute(params, &mut builder)?;
        let doc = builder.finish();
        Ok(doc.string_value(doc.root()))
    }

    fn run(xslt: &str) -> String {
        let tree = create_test_tree();
        run_with(xslt, &tree, &BoundParameters::default(), ExecutionConfig::default()).unwrap()
    }

    fn stylesheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            body
        )
    }

    #[test]
    fn test_builtin_rules_copy_text() {
        assert_eq!(run(&stylesheet("")), "HelloWorld");
    }

    #[test]
    fn test_priority_and_declaration_order() {
        let xslt = stylesheet(
            r#"<xsl:template match="para" priority="2">two</xsl:template>
               <xsl:template match="para" priority="1">one</xsl:template>"#,
        );
        assert_eq!(run(&xslt), "twotwo");

        let tie = stylesheet(
            r#"<xsl:template match="para">first</xsl:template>
               <xsl:template match="para">second</xsl:template>"#,
        );
        assert_eq!(run(&tie), "secondsecond");
    }

    #[test]
    fn test_modes_partition_rules() {
        let xslt = stylesheet(
            r#"<xsl:template match="/"><xsl:apply-templates select="//para" mode="m"/></xsl:template>
               <xsl:template match="para">default</xsl:template>
               <xsl:template match="para" mode="m">[<xsl:value-of select="."/>]</xsl:template>"#,
        );
        assert_eq!(run(&xslt), "[Hello][World]");
    }

    #[test]
    fn test_template_params_and_scoping() {
        let xslt = stylesheet(
            r#"<xsl:variable name="g" select="'G'"/>
               <xsl:template match="/">
                 <xsl:variable name="local" select="'L'"/>
                 <xsl:call-template name="show">
                   <xsl:with-param name="p" select="concat($local, $g)"/>
                 </xsl:call-template>
               </xsl:template>
               <xsl:template name="show">
                 <xsl:param name="p" select="'default'"/>
                 <xsl:param name="q" select="'Q'"/>
                 <xsl:value-of select="concat($p, $q, $local)"/>
               </xsl:template>"#,
        );
        assert_eq!(run(&xslt), "LGQ");
    }

    #[test]
    fn test_result_tree_fragment_variables() {
        let xslt = stylesheet(
            r#"<xsl:template match="/">
                 <xsl:variable name="frag"><b>bold</b> text</xsl:variable>
                 <xsl:value-of select="string-length($frag)"/>|<xsl:copy-of select="$frag"/>
               </xsl:template>"#,
        );
        assert_eq!(run(&xslt), "9|bold text");
    }

    #[test]
    fn test_for_each_sort_and_position() {
        let xslt = stylesheet(
            r#"<xsl:template match="/">
                 <xsl:for-each select="//para">
                   <xsl:sort select="." order="descending"/>
                   <xsl:value-of select="position()"/>:<xsl:value-of select="."/>;
                 </xsl:for-each>
               </xsl:template>"#,
        );
        assert_eq!(run(&xslt).split_whitespace().collect::<String>(), "1:World;2:Hello;");
    }

    #[test]
    fn test_global_params_override_defaults() {
        let xslt = stylesheet(
            r#"<xsl:param name="who" select="'nobody'"/>
               <xsl:variable name="fixed" select="'v'"/>
               <xsl:template match="/"><xsl:value-of select="concat($who, $fixed, $extra)"/></xsl:template>"#,
        );
        let tree = create_test_tree();
        let params: BoundParameters = vec![
            ("who".to_string(), "'me'".to_string()),
            ("fixed".to_string(), "'ignored'".to_string()),
            ("extra".to_string(), "1 + 1".to_string()),
        ]
        .into();
        let out = run_with(&xslt, &tree, &params, ExecutionConfig::default()).unwrap();
        assert_eq!(out, "mev2");
    }

    #[test]
    fn test_global_forward_reference_and_cycle() {
        let forward = stylesheet(
            r#"<xsl:variable name="a" select="concat($b, '!')"/>
               <xsl:variable name="b" select="'B'"/>
               <xsl:template match="/"><xsl:value-of select="$a"/></xsl:template>"#,
        );
        assert_eq!(run(&forward), "B!");

        let cycle = stylesheet(
            r#"<xsl:variable name="a" select="$b"/>
               <xsl:variable name="b" select="$a"/>"#,
        );
        let tree = create_test_tree();
        let err = run_with(&cycle, &tree, &BoundParameters::default(), ExecutionConfig::default()).unwrap_err();
        assert!(matches!(err, ExecutionError::CircularVariable(_)));
    }

    #[test]
    fn test_content_bound_globals_resolve_dependencies() {
        let forward = stylesheet(
            r#"<xsl:variable name="a">[<xsl:value-of select="$b"/>|<xsl:call-template name="c"/>]</xsl:variable>
               <xsl:variable name="b" select="'B'"/>
               <xsl:variable name="c-text">C</xsl:variable>
               <xsl:template name="c"><xsl:value-of select="$c-text"/></xsl:template>
               <xsl:template match="/"><xsl:value-of select="$a"/></xsl:template>"#,
        );
        assert_eq!(run(&forward), "[B|C]");

        // A local variable shadows the global of the same name.
        let shadowed = stylesheet(
            r#"<xsl:variable name="a"><xsl:variable name="a" select="'inner'"/><xsl:value-of select="$a"/></xsl:variable>
               <xsl:template match="/"><xsl:value-of select="$a"/></xsl:template>"#,
        );
        assert_eq!(run(&shadowed), "inner");

        let cycle = stylesheet(
            r#"<xsl:variable name="a"><xsl:value-of select="$b"/></xsl:variable>
               <xsl:variable name="b"><xsl:value-of select="$a"/></xsl:variable>
               <xsl:template match="/">[<xsl:value-of select="$a"/>|<xsl:value-of select="$b"/>]</xsl:template>"#,
        );
        let tree = create_test_tree();
        let err = run_with(&cycle, &tree, &BoundParameters::default(), ExecutionConfig::default()).unwrap_err();
        assert_eq!(err, ExecutionError::CircularVariable("a".to_string()));
    }

    #[test]
    fn test_recursion_limit() {
        let xslt = stylesheet(
            r#"<xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
               <xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>"#,
        );
        let tree = create_test_tree();
        let config = ExecutionConfig {
            max_depth: 40,
            ..Default::default()
        };
        let err = run_with(&xslt, &tree, &BoundParameters::default(), config).unwrap_err();
        assert_eq!(err, ExecutionError::RecursionLimit(40));
        assert!(err.to_string().contains("template recursion depth exceeded"));
    }

    #[test]
    fn test_builtin_descent_does_not_count_toward_depth() {
        let tree = create_test_tree();
        let config = ExecutionConfig {
            max_depth: 0,
            ..Default::default()
        };
        let out = run_with(&stylesheet(""), &tree, &BoundParameters::default(), config).unwrap();
        assert_eq!(out, "HelloWorld");
        assert!(config.stack_size() < ExecutionConfig::default().stack_size());
    }

    #[test]
    fn test_strict_mode_unknown_variable() {
        let xslt = stylesheet(r#"<xsl:template match="/">[<xsl:value-of select="$missing"/>]</xsl:template>"#);
        let tree = create_test_tree();
        assert_eq!(
            run_with(&xslt, &tree, &BoundParameters::default(), ExecutionConfig::default()).unwrap(),
            "[]"
        );
        let strict = ExecutionConfig {
            strict: true,
            ..Default::default()
        };
        let err = run_with(&xslt, &tree, &BoundParameters::default(), strict).unwrap_err();
        assert_eq!(err, ExecutionError::XPath(XPathError::UnknownVariable("missing".to_string())));
    }

    #[test]
    fn test_message_terminate() {
        let xslt = stylesheet(
            r#"<xsl:template match="/"><xsl:message terminate="yes">stop <xsl:value-of select="count(//para)"/></xsl:message></xsl:template>"#,
        );
        let tree = create_test_tree();
        let err = run_with(&xslt, &tree, &BoundParameters::default(), ExecutionConfig::default()).unwrap_err();
        assert_eq!(err, ExecutionError::Terminated("stop 2".to_string()));
    }

    #[test]
    fn test_unknown_named_template() {
        let xslt = stylesheet(r#"<xsl:template match="/"><xsl:call-template name="nope"/></xsl:template>"#);
        let tree = create_test_tree();
        let err = run_with(&xslt, &tree, &BoundParameters::default(), ExecutionConfig::default()).unwrap_err();
        assert_eq!(err, ExecutionError::UnknownNamedTemplate("nope".to_string()));
    }

    #[test]
    fn test_keys_and_choose() {
        let xslt = stylesheet(
            r#"<xsl:key name="by-id" match="para" use="@id"/>
               <xsl:template match="/">
                 <xsl:for-each select="//para">
                   <xsl:choose>
                     <xsl:when test="count(key('by-id', @id)) = 1">keyed </xsl:when>
                     <xsl:otherwise>plain </xsl:otherwise>
                   </xsl:choose>
                 </xsl:for-each>
               </xsl:template>"#,
        );
        assert_eq!(run(&xslt), "keyed plain ");
    }
}
