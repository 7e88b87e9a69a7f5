//! A dedicated engine for parsing and evaluating XSLT `match` patterns.
use crate::error::XsltError;
use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, multispace0};
use nom::combinator::{consumed, map, opt};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated};
use std::fmt;
use xform_xpath1::ast::{Axis, Expression, NodeTest, Step};
use xform_xpath1::datasource::{DataSourceNode, NodeType};
use xform_xpath1::engine::matches_node_test;
use xform_xpath1::parser as xpath_parser;
use xform_xpath1::{EvaluationContext, XPathError, XPathValue, evaluate};

/// How a step relates to the step on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    /// `/`: the left step matches the parent.
    Parent,
    /// `//`: the left step matches some ancestor.
    Ancestor,
}

#[derive(Debug, Clone, PartialEq)]
struct MatchStep {
    connector: Connector,
    step: Step,
}

/// What the leftmost step is anchored to.
#[derive(Debug, Clone, PartialEq)]
enum Anchor {
    Relative,
    Root,
    /// An `id(...)` or `key(...)` call.
    Nodes(Expression),
}

/// A single location path within a pattern, e.g., "/doc/section/para".
#[derive(Debug, Clone, PartialEq)]
struct LocationPathPattern {
    anchor: Anchor,
    steps: Vec<MatchStep>,
    text: String,
}

/// A compiled representation of an XSLT match pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// A pattern can be a union of multiple paths, e.g., "para|note".
    paths: Vec<LocationPathPattern>,
    original_text: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original_text)
    }
}

impl Pattern {
    /// Splits a union into one pattern per alternative, in source order.
    pub fn alternatives(&self) -> Vec<Pattern> {
        self.paths
            .iter()
            .map(|path| Pattern {
                original_text: path.text.clone(),
                paths: vec![path.clone()],
            })
            .collect()
    }

    pub fn is_union(&self) -> bool {
        self.paths.len() > 1
    }

    /// The priority a template with this pattern gets when it declares none. For a
    /// union this is the highest priority of its alternatives.
    pub fn default_priority(&self) -> f64 {
        self.paths
            .iter()
            .map(LocationPathPattern::default_priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Evaluates if a given node matches this compiled pattern. `e_ctx` supplies the
    /// root, variables and keys used by predicates and `key()` anchors.
    pub fn matches<'a, N: DataSourceNode<'a> + 'a>(
        &self,
        node: N,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<bool, XPathError> {
        for path in &self.paths {
            if path.matches(node, e_ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl LocationPathPattern {
    fn default_priority(&self) -> f64 {
        match (&self.anchor, self.steps.as_slice()) {
            (Anchor::Relative, [only]) if only.step.predicates.is_empty() => match &only.step.node_test {
                NodeTest::Name(_) | NodeTest::PiTarget(_) => 0.0,
                NodeTest::NamespaceWildcard(_) => -0.25,
                NodeTest::Wildcard | NodeTest::NodeType(_) => -0.5,
            },
            _ => 0.5,
        }
    }

    fn matches<'a, N: DataSourceNode<'a> + 'a>(
        &self,
        node: N,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<bool, XPathError> {
        if self.steps.is_empty() {
            return match &self.anchor {
                // Special case for "/"
                Anchor::Root => Ok(node.node_type() == NodeType::Root),
                Anchor::Nodes(expr) => Ok(anchor_nodes(expr, e_ctx)?.contains(&node)),
                Anchor::Relative => Ok(false),
            };
        }
        self.matches_from(self.steps.len() - 1, node, e_ctx)
    }

    /// Matches steps right to left, walking up from `node`.
    fn matches_from<'a, N: DataSourceNode<'a> + 'a>(
        &self,
        index: usize,
        node: N,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<bool, XPathError> {
        let current = &self.steps[index];
        if !step_matches(&current.step, node, e_ctx)? {
            return Ok(false);
        }

        if index == 0 {
            return match (&self.anchor, current.connector) {
                (Anchor::Relative, _) => Ok(true),
                (Anchor::Root, Connector::Parent) => {
                    Ok(node.parent().is_some_and(|p| p.node_type() == NodeType::Root))
                }
                (Anchor::Root, Connector::Ancestor) => Ok(true),
                (Anchor::Nodes(expr), connector) => {
                    let anchors = anchor_nodes(expr, e_ctx)?;
                    Ok(match connector {
                        Connector::Parent => node.parent().is_some_and(|p| anchors.contains(&p)),
                        Connector::Ancestor => ancestors(node).any(|a| anchors.contains(&a)),
                    })
                }
            };
        }

        match current.connector {
            Connector::Parent => match node.parent() {
                Some(parent) => self.matches_from(index - 1, parent, e_ctx),
                None => Ok(false),
            },
            Connector::Ancestor => {
                for ancestor in ancestors(node) {
                    if self.matches_from(index - 1, ancestor, e_ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn ancestors<'a, N: DataSourceNode<'a>>(node: N) -> impl Iterator<Item = N> {
    std::iter::successors(node.parent(), |n| n.parent())
}

fn anchor_nodes<'a, N: DataSourceNode<'a> + 'a>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError> {
    match evaluate(expr, e_ctx)? {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        _ => Ok(Vec::new()),
    }
}

/// Tests one step against a node. Child steps only match nodes that can be children;
/// predicates are evaluated against the node's siblings that pass the node test.
fn step_matches<'a, N: DataSourceNode<'a> + 'a>(
    step: &Step,
    node: N,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<bool, XPathError> {
    let node_type = node.node_type();
    let on_axis = match step.axis {
        Axis::Attribute => node_type == NodeType::Attribute,
        _ => !matches!(node_type, NodeType::Attribute | NodeType::Root),
    };
    if !on_axis || !matches_node_test(node, &step.node_test, step.axis, e_ctx.namespaces) {
        return Ok(false);
    }
    if step.predicates.is_empty() {
        return Ok(true);
    }

    let Some(parent) = node.parent() else {
        return Ok(false);
    };
    let siblings: Box<dyn Iterator<Item = N> + 'a> = if step.axis == Axis::Attribute {
        parent.attributes()
    } else {
        parent.children()
    };
    let mut candidates: Vec<N> = siblings
        .filter(|n| matches_node_test(*n, &step.node_test, step.axis, e_ctx.namespaces))
        .collect();

    for predicate in &step.predicates {
        let size = candidates.len();
        let mut kept = Vec::with_capacity(size);
        for (i, candidate) in candidates.into_iter().enumerate() {
            let predicate_ctx = e_ctx.for_node(candidate, i + 1, size);
            let keep = match evaluate(predicate, &predicate_ctx)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(candidate);
            }
        }
        candidates = kept;
    }
    Ok(candidates.contains(&node))
}

// --- Parser ---

pub fn parse(text: &str) -> Result<Pattern, XsltError> {
    match pattern_parser(text.trim()) {
        Ok(("", paths)) => Ok(Pattern {
            paths,
            original_text: text.trim().to_string(),
        }),
        Ok((rem, _)) => Err(XsltError::XPath(XPathError::XPathParse(
            text.to_string(),
            format!("Unconsumed input in pattern: {}", rem),
        ))),
        Err(e) => Err(XsltError::XPath(XPathError::XPathParse(
            text.to_string(),
            e.to_string(),
        ))),
    }
}

fn ws<'a, O>(
    inner: impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>> {
    delimited(multispace0, inner, multispace0)
}

fn connector(input: &str) -> IResult<&str, Connector> {
    alt((
        map(tag("//"), |_| Connector::Ancestor),
        map(tag("/"), |_| Connector::Parent),
    ))
    .parse(input)
}

/// Patterns may only use the child and attribute axes.
fn step_parser(input: &str) -> IResult<&str, Step> {
    let (rest, step) = xpath_parser::step(input)?;
    match step.axis {
        Axis::Child | Axis::Attribute => Ok((rest, step)),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn relative_steps(first: Connector) -> impl FnMut(&str) -> IResult<&str, Vec<MatchStep>> {
    move |input: &str| {
        let (rest, head) = step_parser(input)?;
        let (rest, tail) = many0(pair(ws(connector), step_parser)).parse(rest)?;
        let mut steps = vec![MatchStep {
            connector: first,
            step: head,
        }];
        steps.extend(tail.into_iter().map(|(connector, step)| MatchStep { connector, step }));
        Ok((rest, steps))
    }
}

/// `id('literal')` or `key('name', 'literal')`.
fn id_key_anchor(input: &str) -> IResult<&str, Expression> {
    let literal = || ws(xpath_parser::string_literal);
    alt((
        map(
            preceded(pair(tag("id"), ws(char('('))), terminated(literal(), char(')'))),
            |value| Expression::FunctionCall {
                name: "id".to_string(),
                args: vec![Expression::Literal(value)],
            },
        ),
        map(
            preceded(
                pair(tag("key"), ws(char('('))),
                terminated(
                    pair(literal(), preceded(char(','), literal())),
                    char(')'),
                ),
            ),
            |(name, value)| Expression::FunctionCall {
                name: "key".to_string(),
                args: vec![Expression::Literal(name), Expression::Literal(value)],
            },
        ),
    ))
    .parse(input)
}

fn path_parser(input: &str) -> IResult<&str, LocationPathPattern> {
    let (rest, (text, (anchor, steps))) = consumed(alt((
        map(
            pair(id_key_anchor, opt(pair(connector, relative_steps(Connector::Parent)))),
            |(expr, tail)| {
                let steps = match tail {
                    Some((connector, mut steps)) => {
                        steps[0].connector = connector;
                        steps
                    }
                    None => Vec::new(),
                };
                (Anchor::Nodes(expr), steps)
            },
        ),
        map(preceded(tag("//"), relative_steps(Connector::Ancestor)), |steps| {
            (Anchor::Root, steps)
        }),
        map(preceded(char('/'), opt(relative_steps(Connector::Parent))), |steps| {
            (Anchor::Root, steps.unwrap_or_default())
        }),
        map(relative_steps(Connector::Parent), |steps| (Anchor::Relative, steps)),
    )))
    .parse(input)?;

    Ok((
        rest,
        LocationPathPattern {
            anchor,
            steps,
            text: text.trim().to_string(),
        },
    ))
}

fn pattern_parser(input: &str) -> IResult<&str, Vec<LocationPathPattern>> {
    separated_list1(ws(char('|')), ws(path_parser)).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use xform_xpath1::KeyIndexes;
    use xform_xpath1::datasource::tests::{MockNode, MockTree, create_test_tree};

    fn get_node<'a>(tree: &'a MockTree<'a>, id: usize) -> MockNode<'a> {
        MockNode { id, tree }
    }

    fn check<'a>(pattern: &str, tree: &'a MockTree<'a>, id: usize) -> bool {
        let vars: HashMap<String, XPathValue<MockNode<'a>>> = HashMap::new();
        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars);
        parse(pattern).unwrap().matches(get_node(tree, id), &ctx).unwrap()
    }

    #[test]
    fn test_pattern_parsing() {
        assert!(parse("foo").is_ok());
        assert!(parse("foo/bar").is_ok());
        assert!(parse("/").is_ok());
        assert!(parse("/*").is_ok());
        assert!(parse("/root/item").is_ok());
        assert!(parse("foo | bar").is_ok());
        assert!(parse("text()").is_ok());
        assert!(parse("@id").is_ok());
        assert!(parse("child::para[2]").is_ok());
        assert!(parse("id('a')//b").is_ok());
        assert!(parse("key('k', 'v')").is_ok());
        assert!(parse("ancestor::para").is_err());
        assert!(parse("para[").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_simple_name_match() {
        let tree = create_test_tree();
        assert!(check("para", &tree, 2));
        assert!(!check("para", &tree, 1));
        assert!(!check("para", &tree, 3));
    }

    #[test]
    fn test_absolute_match() {
        let tree = create_test_tree();
        assert!(check("/", &tree, 0));
        assert!(!check("/", &tree, 1));
        assert!(check("/*", &tree, 1));
        assert!(!check("/*", &tree, 2));
        assert!(check("/root/para", &tree, 9));
        assert!(check("//para/text()", &tree, 10));
    }

    #[test]
    fn test_path_and_descendant_match() {
        let tree = create_test_tree();
        assert!(check("para/text()", &tree, 5));
        assert!(!check("para/text()", &tree, 2));
        assert!(check("root//text()", &tree, 10));
        assert!(!check("div//text()", &tree, 10));
    }

    #[test]
    fn test_attribute_and_node_type_match() {
        let tree = create_test_tree();
        assert!(check("@id", &tree, 3));
        assert!(check("para/@*", &tree, 4));
        assert!(!check("@id", &tree, 2));
        assert!(!check("node()", &tree, 3));
        assert!(check("node()", &tree, 6));
        assert!(check("comment()", &tree, 6));
        assert!(check("processing-instruction('pi-target')", &tree, 8));
        assert!(!check("*", &tree, 0));
    }

    #[test]
    fn test_predicate_positions_use_siblings() {
        let tree = create_test_tree();
        assert!(check("para[1]", &tree, 2));
        assert!(check("para[2]", &tree, 9));
        assert!(!check("para[2]", &tree, 2));
        assert!(check("para[@id='p1']", &tree, 2));
        assert!(check("para[last()]", &tree, 9));
    }

    #[test]
    fn test_union_split_and_default_priorities() {
        let pattern = parse("para | @* | svg:* | a/b | processing-instruction('x')").unwrap();
        assert!(pattern.is_union());
        let priorities: Vec<f64> = pattern
            .alternatives()
            .iter()
            .map(Pattern::default_priority)
            .collect();
        assert_eq!(priorities, vec![0.0, -0.5, -0.25, 0.5, 0.0]);
        assert_eq!(pattern.alternatives()[3].to_string(), "a/b");
        assert_eq!(parse("/").unwrap().default_priority(), 0.5);
        assert_eq!(parse("text()").unwrap().default_priority(), -0.5);
        assert_eq!(parse("para[1]").unwrap().default_priority(), 0.5);
        assert_eq!(pattern.default_priority(), 0.5);
    }

    #[test]
    fn test_key_anchor() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let mut keys: KeyIndexes<MockNode> = HashMap::new();
        keys.entry("k".to_string())
            .or_default()
            .insert("v".to_string(), vec![tree.node(2)]);
        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars).with_keys(&keys);

        assert!(parse("key('k','v')").unwrap().matches(tree.node(2), &ctx).unwrap());
        assert!(!parse("key('k','v')").unwrap().matches(tree.node(9), &ctx).unwrap());
        assert!(parse("key('k', 'v')/text()").unwrap().matches(tree.node(5), &ctx).unwrap());
    }
}
