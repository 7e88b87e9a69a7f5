//! The compiled, executable form of an XSLT 1.0 stylesheet.

use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use xform_xpath1::Expression;

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace binding as `(prefix, uri)`; `None` is the default namespace.
pub type NamespaceBinding = (Option<String>, String);

/// Represents a pre-compiled, executable block of XSLT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparsedTemplate(pub Vec<XsltInstruction>);

impl PreparsedTemplate {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One segment of an attribute value template.
#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Static(String),
    Dynamic(Expression),
}

/// An attribute value such as `item-{@id}`, split into static and dynamic parts.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValueTemplate {
    Static(String),
    Dynamic(Vec<AvtPart>),
}

/// Where a variable, parameter or with-param gets its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    /// The `select` attribute.
    Select(Expression),
    /// Element content, which builds a result tree fragment.
    Fragment(PreparsedTemplate),
    /// Neither: the empty string.
    Empty,
}

/// An `<xsl:param>` declared by a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default_value: BindingValue,
}

/// Represents a parameter passed to a template.
#[derive(Debug, Clone, PartialEq)]
pub struct WithParam {
    pub name: String,
    pub value: BindingValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDataType {
    #[default]
    Text,
    Number,
}

/// A compiled `<xsl:sort>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub select: Expression,
    pub order: SortOrder,
    pub data_type: SortDataType,
}

/// A compiled `<xsl:when>` branch.
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub test: Expression,
    pub body: PreparsedTemplate,
}

/// An attribute written on a literal result element.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralAttribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: AttributeValueTemplate,
}

/// A single executable instruction inside a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum XsltInstruction {
    /// Literal text, or the content of `<xsl:text>`.
    Text {
        text: String,
        disable_escaping: bool,
    },
    LiteralElement {
        name: String,
        namespace: Option<String>,
        namespaces: Vec<NamespaceBinding>,
        attrs: Vec<LiteralAttribute>,
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    Element {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        /// Prefixes in scope on the instruction, used to resolve a prefixed name.
        in_scope: Vec<NamespaceBinding>,
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    Attribute {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        in_scope: Vec<NamespaceBinding>,
        body: PreparsedTemplate,
    },
    Comment {
        body: PreparsedTemplate,
    },
    ProcessingInstruction {
        name: AttributeValueTemplate,
        body: PreparsedTemplate,
    },
    ValueOf {
        select: Expression,
        disable_escaping: bool,
    },
    CopyOf {
        select: Expression,
    },
    Copy {
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<String>,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam>,
    },
    CallTemplate {
        name: String,
        params: Vec<WithParam>,
    },
    If {
        test: Expression,
        body: PreparsedTemplate,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<PreparsedTemplate>,
    },
    ForEach {
        select: Expression,
        sort_keys: Vec<SortKey>,
        body: PreparsedTemplate,
    },
    Variable {
        name: String,
        value: BindingValue,
    },
    Message {
        body: PreparsedTemplate,
        terminate: bool,
    },
}

/// Represents a single compiled `<xsl:template match="...">` rule. A union pattern
/// without an explicit priority compiles to one rule per alternative.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    pub pattern: Pattern,
    /// The specified priority, or the default priority of the pattern.
    pub priority: f64,
    /// The mode this rule belongs to. `None` represents the default mode.
    pub mode: Option<String>,
    /// Position of the `<xsl:template>` among all templates in the stylesheet.
    pub order: usize,
    pub params: Vec<Param>,
    pub body: PreparsedTemplate,
}

#[derive(Debug, Clone)]
pub struct NamedTemplate {
    pub name: String,
    pub params: Vec<Param>,
    pub body: PreparsedTemplate,
}

/// A compiled `<xsl:key>`.
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub name: String,
    pub pattern: Pattern,
    pub use_expr: Expression,
}

/// A top-level `<xsl:param>` or `<xsl:variable>`.
#[derive(Debug, Clone)]
pub struct GlobalBinding {
    pub name: String,
    pub value: BindingValue,
    pub is_param: bool,
}

/// A compiled `<xsl:attribute-set>`. `attributes` holds `Attribute` instructions.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    pub name: String,
    pub use_attribute_sets: Vec<String>,
    pub attributes: Vec<XsltInstruction>,
}

/// A name test from `xsl:strip-space` or `xsl:preserve-space`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceTest {
    Any,
    Namespace(String),
    Name(String),
}

impl SpaceTest {
    pub fn parse(token: &str) -> Self {
        if token == "*" {
            SpaceTest::Any
        } else if let Some(prefix) = token.strip_suffix(":*") {
            SpaceTest::Namespace(prefix.to_string())
        } else {
            SpaceTest::Name(token.to_string())
        }
    }

    /// Higher is more specific, mirroring the default priorities of the equivalent patterns.
    fn specificity(&self) -> u8 {
        match self {
            SpaceTest::Any => 0,
            SpaceTest::Namespace(_) => 1,
            SpaceTest::Name(_) => 2,
        }
    }

    fn matches(&self, prefix: Option<&str>, local_name: &str) -> bool {
        match self {
            SpaceTest::Any => true,
            SpaceTest::Namespace(p) => prefix == Some(p.as_str()),
            SpaceTest::Name(name) => match name.split_once(':') {
                Some((p, local)) => prefix == Some(p) && local == local_name,
                None => prefix.is_none() && name == local_name,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WhitespaceRules {
    pub strip: Vec<SpaceTest>,
    pub preserve: Vec<SpaceTest>,
}

impl WhitespaceRules {
    pub fn is_empty(&self) -> bool {
        self.strip.is_empty()
    }

    /// Whether whitespace-only text children of the named element are stripped. The most
    /// specific matching test wins and `preserve` wins ties.
    pub fn strips(&self, prefix: Option<&str>, local_name: &str) -> bool {
        let best = |tests: &[SpaceTest]| {
            tests
                .iter()
                .filter(|t| t.matches(prefix, local_name))
                .map(SpaceTest::specificity)
                .max()
        };
        match (best(&self.strip), best(&self.preserve)) {
            (Some(strip), Some(preserve)) => strip > preserve,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMethod {
    Xml,
    Html,
    Text,
}

/// The settings of `<xsl:output>`. Unset fields fall back to the defaults of the
/// resolved output method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputDeclaration {
    pub method: Option<OutputMethod>,
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub indent: Option<bool>,
    pub omit_xml_declaration: bool,
    pub standalone: Option<bool>,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    pub media_type: Option<String>,
}

/// The complete output of the XSLT compiler.
#[derive(Debug, Clone, Default)]
pub struct CompiledStylesheet {
    /// All match-based template rules, grouped by mode, sorted by priority then
    /// declaration order, both descending.
    pub template_rules: HashMap<Option<String>, Vec<TemplateRule>>,
    pub named_templates: HashMap<String, Arc<NamedTemplate>>,
    /// Top-level params and variables in declaration order.
    pub globals: Vec<GlobalBinding>,
    pub keys: Vec<KeyDefinition>,
    pub attribute_sets: HashMap<String, AttributeSet>,
    pub whitespace: WhitespaceRules,
    pub output: OutputDeclaration,
    /// Every prefix declared in the stylesheet, used for prefixed XPath name tests.
    pub namespaces: HashMap<String, String>,
}

impl CompiledStylesheet {
    pub fn rules_for_mode(&self, mode: Option<&str>) -> &[TemplateRule] {
        self.template_rules
            .get(&mode.map(str::to_string))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn global(&self, name: &str) -> Option<&GlobalBinding> {
        self.globals.iter().find(|g| g.name == name)
    }
}

impl BindingValue {
    /// The variables this value reads, in first-use order. References inside element
    /// content are followed through the named templates and attribute sets it
    /// instantiates; names bound locally are skipped while they are in scope.
    pub fn referenced_variables(&self, stylesheet: &CompiledStylesheet) -> Vec<String> {
        let mut collector = ReferenceCollector {
            stylesheet,
            locals: Vec::new(),
            seen_templates: HashSet::new(),
            seen_sets: HashSet::new(),
            found: Vec::new(),
        };
        collector.binding(self);
        collector.found
    }
}

struct ReferenceCollector<'s> {
    stylesheet: &'s CompiledStylesheet,
    locals: Vec<&'s str>,
    seen_templates: HashSet<&'s str>,
    seen_sets: HashSet<&'s str>,
    found: Vec<String>,
}

impl<'s> ReferenceCollector<'s> {
    fn binding(&mut self, value: &'s BindingValue) {
        match value {
            BindingValue::Select(expr) => self.expression(expr),
            BindingValue::Fragment(body) => self.template(body),
            BindingValue::Empty => {}
        }
    }

    fn expression(&mut self, expr: &Expression) {
        let mut names = Vec::new();
        expr.referenced_variables(&mut names);
        for name in names {
            if !self.locals.contains(&name.as_str()) && !self.found.contains(&name) {
                self.found.push(name);
            }
        }
    }

    fn avt(&mut self, avt: &AttributeValueTemplate) {
        if let AttributeValueTemplate::Dynamic(parts) = avt {
            for part in parts {
                if let AvtPart::Dynamic(expr) = part {
                    self.expression(expr);
                }
            }
        }
    }

    fn template(&mut self, body: &'s PreparsedTemplate) {
        let scope = self.locals.len();
        for instruction in &body.0 {
            self.instruction(instruction);
        }
        self.locals.truncate(scope);
    }

    fn sort_keys(&mut self, keys: &[SortKey]) {
        for key in keys {
            self.expression(&key.select);
        }
    }

    fn with_params(&mut self, params: &'s [WithParam]) {
        for param in params {
            self.binding(&param.value);
        }
    }

    fn attribute_sets(&mut self, names: &'s [String]) {
        let stylesheet = self.stylesheet;
        for name in names {
            let Some(set) = stylesheet.attribute_sets.get(name) else {
                continue;
            };
            if !self.seen_sets.insert(name.as_str()) {
                continue;
            }
            // Attribute sets only see globals.
            let outer = std::mem::take(&mut self.locals);
            self.attribute_sets(&set.use_attribute_sets);
            for attribute in &set.attributes {
                self.instruction(attribute);
            }
            self.locals = outer;
        }
    }

    fn called_template(&mut self, name: &'s str) {
        let stylesheet = self.stylesheet;
        let Some(template) = stylesheet.named_templates.get(name) else {
            return;
        };
        if !self.seen_templates.insert(name) {
            return;
        }
        let outer = std::mem::take(&mut self.locals);
        for param in &template.params {
            self.binding(&param.default_value);
            self.locals.push(&param.name);
        }
        self.template(&template.body);
        self.locals = outer;
    }

    fn instruction(&mut self, instruction: &'s XsltInstruction) {
        match instruction {
            XsltInstruction::Text { .. } => {}
            XsltInstruction::LiteralElement {
                attrs,
                use_attribute_sets,
                body,
                ..
            } => {
                self.attribute_sets(use_attribute_sets);
                for attr in attrs {
                    self.avt(&attr.value);
                }
                self.template(body);
            }
            XsltInstruction::Element {
                name,
                namespace,
                use_attribute_sets,
                body,
                ..
            } => {
                self.avt(name);
                if let Some(namespace) = namespace {
                    self.avt(namespace);
                }
                self.attribute_sets(use_attribute_sets);
                self.template(body);
            }
            XsltInstruction::Attribute {
                name, namespace, body, ..
            } => {
                self.avt(name);
                if let Some(namespace) = namespace {
                    self.avt(namespace);
                }
                self.template(body);
            }
            XsltInstruction::Comment { body } | XsltInstruction::Message { body, .. } => self.template(body),
            XsltInstruction::ProcessingInstruction { name, body } => {
                self.avt(name);
                self.template(body);
            }
            XsltInstruction::ValueOf { select, .. } | XsltInstruction::CopyOf { select } => self.expression(select),
            XsltInstruction::Copy {
                use_attribute_sets,
                body,
            } => {
                self.attribute_sets(use_attribute_sets);
                self.template(body);
            }
            XsltInstruction::ApplyTemplates {
                select,
                sort_keys,
                params,
                ..
            } => {
                if let Some(select) = select {
                    self.expression(select);
                }
                self.sort_keys(sort_keys);
                self.with_params(params);
            }
            XsltInstruction::CallTemplate { name, params } => {
                self.with_params(params);
                self.called_template(name);
            }
            XsltInstruction::If { test, body } => {
                self.expression(test);
                self.template(body);
            }
            XsltInstruction::Choose { whens, otherwise } => {
                for when in whens {
                    self.expression(&when.test);
                    self.template(&when.body);
                }
                if let Some(otherwise) = otherwise {
                    self.template(otherwise);
                }
            }
            XsltInstruction::ForEach {
                select,
                sort_keys,
                body,
            } => {
                self.expression(select);
                self.sort_keys(sort_keys);
                self.template(body);
            }
            XsltInstruction::Variable { name, value } => {
                self.binding(value);
                self.locals.push(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_rules_specificity() {
        let rules = WhitespaceRules {
            strip: vec![SpaceTest::parse("*")],
            preserve: vec![SpaceTest::parse("pre"), SpaceTest::parse("svg:*")],
        };
        assert!(rules.strips(None, "div"));
        assert!(!rules.strips(None, "pre"));
        assert!(!rules.strips(Some("svg"), "g"));
        assert!(!WhitespaceRules::default().strips(None, "div"));
    }

    #[test]
    fn test_output_declaration_serde_names() {
        let decl: OutputDeclaration =
            serde_json::from_str(r#"{"method":"html","omit-xml-declaration":true}"#).unwrap();
        assert_eq!(decl.method, Some(OutputMethod::Html));
        assert!(decl.omit_xml_declaration);
        assert_eq!(decl.encoding, None);
    }
}
