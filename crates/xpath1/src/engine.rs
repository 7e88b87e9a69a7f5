//! The evaluation engine for executing a parsed XPath AST against a generic `DataSourceNode`.

use super::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step, UnaryOperator};
use super::axes::collect_axis;
use super::{functions, operators};
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Pre-computed `xsl:key` indexes: key name, then key value, then matching nodes in
/// document order.
pub type KeyIndexes<N> = HashMap<String, HashMap<String, Vec<N>>>;

/// Represents the possible result types of an XPath expression evaluation.
/// Node-sets are kept in document order without duplicates.
#[derive(Debug, Clone)]
pub enum XPathValue<N> {
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a, N: DataSourceNode<'a>> XPathValue<N> {
    /// Coerces the XPath value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the XPath value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => parse_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map(|n| parse_number(&n.string_value()))
                .unwrap_or(f64::NAN),
        }
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Display for XPathValue<N> {
    /// Coerces the XPath value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => match nodes.first() {
                Some(n) => f.write_str(&n.string_value()),
                None => Ok(()),
            },
            XPathValue::String(s) => f.write_str(s),
            XPathValue::Number(n) => f.write_str(&number_to_string(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// The XPath 1.0 `string(number)` conversion: no exponent, integral values without a
/// fraction, and `NaN`/`Infinity` spelled out.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// The XPath 1.0 `number(string)` conversion: optional whitespace, an optional minus
/// sign and a decimal literal. Anything else is NaN.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let well_formed = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if well_formed {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Resolves `$name` references during evaluation.
pub trait VariableScope<N> {
    fn lookup(&self, name: &str) -> Option<&XPathValue<N>>;
}

impl<N> VariableScope<N> for HashMap<String, XPathValue<N>> {
    fn lookup(&self, name: &str) -> Option<&XPathValue<N>> {
        self.get(name)
    }
}

/// A container for all state needed during expression evaluation.
/// `'a` is the lifetime of the underlying source tree.
/// `'d` is the lifetime of the borrowed evaluation state.
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_node: N,
    pub root_node: N,
    /// The XSLT current node, returned by `current()`. Defaults to the context node.
    pub current_node: Option<N>,
    pub context_position: usize, // 1-based index
    pub context_size: usize,
    pub variables: &'d dyn VariableScope<N>,
    pub key_indexes: Option<&'d KeyIndexes<N>>,
    /// Prefix to namespace URI bindings used to resolve prefixed name tests.
    pub namespaces: Option<&'d HashMap<String, String>>,
    /// If true, references to unbound variables are errors.
    pub strict: bool,
    _marker: PhantomData<&'a ()>,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(context_node: N, root_node: N, variables: &'d dyn VariableScope<N>) -> Self {
        Self {
            context_node,
            root_node,
            current_node: None,
            context_position: 1,
            context_size: 1,
            variables,
            key_indexes: None,
            namespaces: None,
            strict: false,
            _marker: PhantomData,
        }
    }

    pub fn with_position(mut self, position: usize, size: usize) -> Self {
        self.context_position = position;
        self.context_size = size;
        self
    }

    pub fn with_current(mut self, current: N) -> Self {
        self.current_node = Some(current);
        self
    }

    pub fn with_keys(mut self, keys: &'d KeyIndexes<N>) -> Self {
        self.key_indexes = Some(keys);
        self
    }

    pub fn with_namespaces(mut self, namespaces: &'d HashMap<String, String>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// A derived context for evaluating a predicate against `node`. The current node
    /// carries over unchanged.
    pub fn for_node(&self, node: N, position: usize, size: usize) -> Self {
        Self {
            context_node: node,
            root_node: self.root_node,
            current_node: Some(self.current_node.unwrap_or(self.context_node)),
            context_position: position,
            context_size: size,
            variables: self.variables,
            key_indexes: self.key_indexes,
            namespaces: self.namespaces,
            strict: self.strict,
            _marker: PhantomData,
        }
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => {
            let nodes = evaluate_location_path(path, e_ctx)?;
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::Variable(name) => match e_ctx.variables.lookup(name) {
            Some(value) => Ok(value.clone()),
            None if e_ctx.strict => Err(XPathError::UnknownVariable(name.clone())),
            None => Ok(XPathValue::String(String::new())),
        },
        Expression::FunctionCall { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            functions::evaluate_function(name, evaluated_args, e_ctx)
        }
        Expression::Filter {
            primary,
            predicates,
        } => {
            let nodes = expect_node_set(evaluate(primary, e_ctx)?)?;
            Ok(XPathValue::NodeSet(apply_predicates(nodes, predicates, e_ctx)?))
        }
        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate(left, e_ctx)?;
            match op {
                BinaryOperator::Or if left_val.to_bool() => Ok(XPathValue::Boolean(true)),
                BinaryOperator::And if !left_val.to_bool() => Ok(XPathValue::Boolean(false)),
                _ => {
                    let right_val = evaluate(right, e_ctx)?;
                    operators::evaluate(*op, left_val, right_val)
                }
            }
        }
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
    }
}

fn expect_node_set<N>(value: XPathValue<N>) -> Result<Vec<N>, XPathError> {
    match value {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        _ => Err(XPathError::TypeError(
            "Expression does not evaluate to a node-set".to_string(),
        )),
    }
}

fn evaluate_location_path<'a, N>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut current_nodes = if let Some(start_expr) = &path.start_point {
        expect_node_set(evaluate(start_expr, e_ctx)?)?
    } else if path.is_absolute {
        vec![e_ctx.root_node]
    } else {
        vec![e_ctx.context_node]
    };

    for step in &path.steps {
        current_nodes = evaluate_step(step, &current_nodes, e_ctx)?;
    }
    Ok(current_nodes)
}

/// Evaluates a single step: for each context node, collect the axis, apply the node
/// test, then the predicates with positions in axis order. The union comes back in
/// document order.
fn evaluate_step<'a, N>(
    step: &Step,
    context_nodes: &[N],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut result = Vec::new();
    for &node in context_nodes {
        let candidates: Vec<N> = collect_axis(step.axis, node)
            .into_iter()
            .filter(|n| matches_node_test(*n, &step.node_test, step.axis, e_ctx.namespaces))
            .collect();
        result.extend(apply_predicates(candidates, &step.predicates, e_ctx)?);
    }
    if context_nodes.len() > 1 || step.axis.is_reverse() {
        result.sort();
        result.dedup();
    }
    Ok(result)
}

/// Tests a node against a node test. The principal node type of the attribute axis is
/// attribute; for every other axis it is element.
pub fn matches_node_test<'a, N: DataSourceNode<'a>>(
    node: N,
    test: &NodeTest,
    axis: Axis,
    namespaces: Option<&HashMap<String, String>>,
) -> bool {
    let principal = if axis == Axis::Attribute {
        NodeType::Attribute
    } else {
        NodeType::Element
    };
    match test {
        NodeTest::Wildcard => node.node_type() == principal,
        NodeTest::Name(name) => node.node_type() == principal && name_matches(node, name, namespaces),
        NodeTest::NamespaceWildcard(prefix) => {
            node.node_type() == principal && prefix_matches(node, prefix, namespaces)
        }
        NodeTest::NodeType(NodeTypeTest::Node) => true,
        NodeTest::NodeType(NodeTypeTest::Text) => node.node_type() == NodeType::Text,
        NodeTest::NodeType(NodeTypeTest::Comment) => node.node_type() == NodeType::Comment,
        NodeTest::NodeType(NodeTypeTest::ProcessingInstruction) => {
            node.node_type() == NodeType::ProcessingInstruction
        }
        NodeTest::PiTarget(target) => {
            node.node_type() == NodeType::ProcessingInstruction
                && node.name().is_some_and(|q| q.local_part == target)
        }
    }
}

fn name_matches<'a, N: DataSourceNode<'a>>(
    node: N,
    name: &str,
    namespaces: Option<&HashMap<String, String>>,
) -> bool {
    let Some(qname) = node.name() else {
        return false;
    };
    match name.split_once(':') {
        Some((prefix, local)) => qname.local_part == local && prefix_matches(node, prefix, namespaces),
        // An unprefixed name test only matches names in no namespace.
        None => {
            qname.local_part == name && qname.prefix.is_none() && node.namespace_uri().is_none()
        }
    }
}

/// Compares namespace URIs when the prefix is bound, and falls back to the literal
/// prefix for trees that do not report namespaces.
fn prefix_matches<'a, N: DataSourceNode<'a>>(
    node: N,
    prefix: &str,
    namespaces: Option<&HashMap<String, String>>,
) -> bool {
    match namespaces.and_then(|ns| ns.get(prefix)) {
        Some(uri) => node.namespace_uri() == Some(uri.as_str()),
        None => node.name().is_some_and(|q| q.prefix == Some(prefix)),
    }
}

/// Filters a node list through predicates. `nodes` must be in proximity order.
fn apply_predicates<'a, N>(
    nodes: Vec<N>,
    predicates: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut current = nodes;
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in current.iter().enumerate() {
            let predicate_ctx = e_ctx.for_node(*node, i + 1, size);
            let keep = match evaluate(predicate, &predicate_ctx)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(*node);
            }
        }
        current = kept;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};
    use crate::parser::parse_expression;

    fn eval<'a>(
        expr: &str,
        tree: &'a MockTree<'a>,
        vars: &HashMap<String, XPathValue<MockNode<'a>>>,
    ) -> XPathValue<MockNode<'a>> {
        let root = tree.root();
        let ctx = EvaluationContext::new(root, root, vars);
        evaluate(&parse_expression(expr).unwrap(), &ctx).unwrap()
    }

    fn ids(value: XPathValue<MockNode>) -> Vec<usize> {
        match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.id).collect(),
            other => panic!("Expected a node-set, got {:?}", other),
        }
    }

    #[test]
    fn test_predicate_by_attribute() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval("root/para[@id='p1']", &tree, &vars)), vec![2]);
    }

    #[test]
    fn test_positional_predicates_are_per_context_node() {
        let mut tree = MockTree::new();
        let list = tree.element(0, "list");
        for _ in 0..2 {
            let group = tree.element(list, "group");
            tree.element(group, "item");
            tree.element(group, "item");
        }
        let vars = HashMap::new();
        // First item of each group, not first of the whole document.
        assert_eq!(ids(eval("//item[1]", &tree, &vars)).len(), 2);
        assert_eq!(ids(eval("(//item)[1]", &tree, &vars)).len(), 1);
        assert_eq!(eval("count(//item[last()])", &tree, &vars).to_number(), 2.0);
    }

    #[test]
    fn test_reverse_axis_positions() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let text = tree.node(10);
        let ctx = EvaluationContext::new(text, tree.root(), &vars);
        let expr = parse_expression("ancestor::*[1]").unwrap();
        assert_eq!(ids(evaluate(&expr, &ctx).unwrap()), vec![9]);
        let expr = parse_expression("preceding-sibling::*[1]").unwrap();
        let ctx = EvaluationContext::new(tree.node(9), tree.root(), &vars);
        assert_eq!(ids(evaluate(&expr, &ctx).unwrap()), vec![7]);
    }

    #[test]
    fn test_variable_evaluation_and_strict_mode() {
        let tree = create_test_tree();
        let mut vars = HashMap::new();
        vars.insert("myVar".to_string(), XPathValue::String("test-value".to_string()));
        assert_eq!(eval("$myVar", &tree, &vars).to_string(), "test-value");
        assert_eq!(eval("$missing", &tree, &vars).to_string(), "");

        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars).with_strict(true);
        let expr = parse_expression("$missing").unwrap();
        assert!(matches!(evaluate(&expr, &ctx), Err(XPathError::UnknownVariable(_))));
    }

    #[test]
    fn test_path_from_variable_node_set() {
        let tree = create_test_tree();
        let mut vars = HashMap::new();
        vars.insert("para".to_string(), XPathValue::NodeSet(vec![tree.node(2)]));
        let result = eval("$para/text()", &tree, &vars);
        assert_eq!(ids(result.clone()), vec![5]);
        assert_eq!(result.to_string(), "Hello");
    }

    #[test]
    fn test_number_string_conversions() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert!(parse_number(" 12.5 ").eq(&12.5));
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("").is_nan());
    }

    #[test]
    fn test_short_circuit_and_current() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        // The right-hand side would fail on an unknown function if evaluated.
        assert!(eval("true() or nosuch()", &tree, &vars).to_bool());
        assert!(!eval("false() and nosuch()", &tree, &vars).to_bool());

        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars).with_current(tree.node(2));
        let expr = parse_expression("root/para[@id = current()/@id]").unwrap();
        assert_eq!(ids(evaluate(&expr, &ctx).unwrap()), vec![2]);
    }

    #[test]
    fn test_unprefixed_name_test_skips_prefixed_attributes() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(eval("count(root/para/@lang)", &tree, &vars).to_number(), 0.0);
        assert_eq!(eval("count(root/para/@xml:lang)", &tree, &vars).to_number(), 1.0);
        assert_eq!(eval("count(root/para/@*)", &tree, &vars).to_number(), 2.0);
    }
}
