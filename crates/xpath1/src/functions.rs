//! Built-in implementations of the XPath 1.0 core function library, plus the
//! functions XSLT 1.0 adds to the expression language.

use super::engine::{EvaluationContext, XPathValue};
use crate::axes::collect_axis;
use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Every function name `evaluate_function` understands.
pub const SUPPORTED_FUNCTIONS: &[&str] = &[
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
    "current",
    "key",
    "generate-id",
    "format-number",
    "system-property",
    "element-available",
    "function-available",
    "unparsed-entity-uri",
];

/// XSLT instructions reported by `element-available()`.
const AVAILABLE_ELEMENTS: &[&str] = &[
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

/// Dispatches a function call to the correct implementation.
pub fn evaluate_function<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    match name {
        // Node-set
        "last" => {
            check_arity(name, &args, 0, 0)?;
            Ok(XPathValue::Number(e_ctx.context_size as f64))
        }
        "position" => {
            check_arity(name, &args, 0, 0)?;
            Ok(XPathValue::Number(e_ctx.context_position as f64))
        }
        "count" => {
            check_arity(name, &args, 1, 1)?;
            let nodes = node_set_arg(name, args)?;
            Ok(XPathValue::Number(nodes.len() as f64))
        }
        "id" => func_id(args, e_ctx),
        "local-name" => {
            let node = optional_node_arg(name, args, e_ctx)?;
            let local = node.and_then(|n| n.name()).map(|q| q.local_part.to_string());
            Ok(XPathValue::String(local.unwrap_or_default()))
        }
        "namespace-uri" => {
            let node = optional_node_arg(name, args, e_ctx)?;
            let uri = node.and_then(|n| n.namespace_uri()).unwrap_or_default();
            Ok(XPathValue::String(uri.to_string()))
        }
        "name" => {
            let node = optional_node_arg(name, args, e_ctx)?;
            let qname = node.and_then(|n| n.name()).map(|q| q.to_string());
            Ok(XPathValue::String(qname.unwrap_or_default()))
        }

        // String
        "string" => {
            check_arity(name, &args, 0, 1)?;
            Ok(XPathValue::String(string_or_context(args, e_ctx)))
        }
        "concat" => {
            check_arity(name, &args, 2, usize::MAX)?;
            Ok(XPathValue::String(args.iter().map(|v| v.to_string()).collect()))
        }
        "starts-with" => {
            let [s1, s2] = two_strings(name, args)?;
            Ok(XPathValue::Boolean(s1.starts_with(&s2)))
        }
        "contains" => {
            let [s1, s2] = two_strings(name, args)?;
            Ok(XPathValue::Boolean(s1.contains(&s2)))
        }
        "substring-before" => {
            let [s1, s2] = two_strings(name, args)?;
            let before = s1.find(&s2).map(|i| s1[..i].to_string());
            Ok(XPathValue::String(before.unwrap_or_default()))
        }
        "substring-after" => {
            let [s1, s2] = two_strings(name, args)?;
            let after = s1.find(&s2).map(|i| s1[i + s2.len()..].to_string());
            Ok(XPathValue::String(after.unwrap_or_default()))
        }
        "substring" => func_substring(args),
        "string-length" => {
            check_arity(name, &args, 0, 1)?;
            let s = string_or_context(args, e_ctx);
            Ok(XPathValue::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            check_arity(name, &args, 0, 1)?;
            let s = string_or_context(args, e_ctx);
            Ok(XPathValue::String(s.split_whitespace().collect::<Vec<_>>().join(" ")))
        }
        "translate" => func_translate(args),

        // Boolean
        "boolean" => {
            check_arity(name, &args, 1, 1)?;
            Ok(XPathValue::Boolean(args[0].to_bool()))
        }
        "not" => {
            check_arity(name, &args, 1, 1)?;
            Ok(XPathValue::Boolean(!args[0].to_bool()))
        }
        "true" => {
            check_arity(name, &args, 0, 0)?;
            Ok(XPathValue::Boolean(true))
        }
        "false" => {
            check_arity(name, &args, 0, 0)?;
            Ok(XPathValue::Boolean(false))
        }
        "lang" => func_lang(args, e_ctx),

        // Number
        "number" => {
            check_arity(name, &args, 0, 1)?;
            let n = match args.first() {
                Some(v) => v.to_number(),
                None => crate::engine::parse_number(&e_ctx.context_node.string_value()),
            };
            Ok(XPathValue::Number(n))
        }
        "sum" => {
            check_arity(name, &args, 1, 1)?;
            let nodes = node_set_arg(name, args)?;
            let sum = nodes
                .iter()
                .map(|n| crate::engine::parse_number(&n.string_value()))
                .sum();
            Ok(XPathValue::Number(sum))
        }
        "floor" => {
            check_arity(name, &args, 1, 1)?;
            Ok(XPathValue::Number(args[0].to_number().floor()))
        }
        "ceiling" => {
            check_arity(name, &args, 1, 1)?;
            Ok(XPathValue::Number(args[0].to_number().ceil()))
        }
        "round" => {
            check_arity(name, &args, 1, 1)?;
            Ok(XPathValue::Number(xpath_round(args[0].to_number())))
        }

        // XSLT additions
        "current" => {
            check_arity(name, &args, 0, 0)?;
            let node = e_ctx.current_node.unwrap_or(e_ctx.context_node);
            Ok(XPathValue::NodeSet(vec![node]))
        }
        "key" => func_key(args, e_ctx),
        "generate-id" => func_generate_id(args, e_ctx),
        "format-number" => {
            check_arity(name, &args, 2, 3)?;
            let value = args[0].to_number();
            let pattern = args[1].to_string();
            Ok(XPathValue::String(format_number(value, &pattern)))
        }
        "system-property" => {
            check_arity(name, &args, 1, 1)?;
            let property = args[0].to_string();
            Ok(match property.as_str() {
                "xsl:version" => XPathValue::Number(1.0),
                "xsl:vendor" => XPathValue::String("xform".to_string()),
                _ => XPathValue::String(String::new()),
            })
        }
        "element-available" => {
            check_arity(name, &args, 1, 1)?;
            let requested = args[0].to_string();
            let available = requested
                .strip_prefix("xsl:")
                .is_some_and(|local| AVAILABLE_ELEMENTS.contains(&local));
            Ok(XPathValue::Boolean(available))
        }
        "function-available" => {
            check_arity(name, &args, 1, 1)?;
            let requested = args[0].to_string();
            Ok(XPathValue::Boolean(SUPPORTED_FUNCTIONS.contains(&requested.as_str())))
        }
        "unparsed-entity-uri" => {
            check_arity(name, &args, 1, 1)?;
            Ok(XPathValue::String(String::new()))
        }
        _ => Err(XPathError::UnknownFunction(name.to_string())),
    }
}

// --- Argument helpers ---

fn check_arity<N>(
    name: &str,
    args: &[XPathValue<N>],
    min: usize,
    max: usize,
) -> Result<(), XPathError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(XPathError::FunctionError {
            function: format!("{}()", name),
            message: format!("Expected {} arguments, got {}", expected, args.len()),
        });
    }
    Ok(())
}

fn node_set_arg<N>(name: &str, mut args: Vec<XPathValue<N>>) -> Result<Vec<N>, XPathError> {
    match args.pop() {
        Some(XPathValue::NodeSet(nodes)) => Ok(nodes),
        _ => Err(XPathError::TypeError(format!(
            "{}() argument must be a node-set",
            name
        ))),
    }
}

/// The node argument of `name()`-style functions: the first node of the argument in
/// document order, or the context node when called without arguments.
fn optional_node_arg<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Option<N>, XPathError> {
    check_arity(name, &args, 0, 1)?;
    if args.is_empty() {
        return Ok(Some(e_ctx.context_node));
    }
    let nodes = node_set_arg(name, args)?;
    Ok(nodes.into_iter().min())
}

fn string_or_context<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> String {
    match args.pop() {
        Some(v) => v.to_string(),
        None => e_ctx.context_node.string_value(),
    }
}

fn two_strings<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
) -> Result<[String; 2], XPathError> {
    check_arity(name, &args, 2, 2)?;
    Ok([args[0].to_string(), args[1].to_string()])
}

// --- Implementations ---

pub(crate) fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        return n;
    }
    let rounded = (n + 0.5).floor();
    // round(-0.4) is negative zero.
    if rounded == 0.0 && n < 0.0 { -0.0 } else { rounded }
}

fn func_substring<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    check_arity("substring", &args, 2, 3)?;
    let s = args[0].to_string();
    let first = xpath_round(args[1].to_number());
    let last = match args.get(2) {
        Some(len) => first + xpath_round(len.to_number()),
        None => f64::INFINITY,
    };

    let result = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= first && pos < last
        })
        .map(|(_, c)| c)
        .collect::<String>();
    Ok(XPathValue::String(result))
}

fn func_translate<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    check_arity("translate", &args, 3, 3)?;
    let source = args[0].to_string();
    let from: Vec<char> = args[1].to_string().chars().collect();
    let to: Vec<char> = args[2].to_string().chars().collect();
    let result = source
        .chars()
        .filter_map(|c| match from.iter().position(|&fc| fc == c) {
            Some(pos) => to.get(pos).copied(),
            None => Some(c),
        })
        .collect::<String>();
    Ok(XPathValue::String(result))
}

fn func_id<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    check_arity("id", &args, 1, 1)?;
    let id_string = match &args[0] {
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .map(|n| n.string_value())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    };
    let wanted: HashSet<&str> = id_string.split_whitespace().collect();
    if wanted.is_empty() {
        return Ok(XPathValue::NodeSet(vec![]));
    }

    let results = collect_axis(Axis::Descendant, e_ctx.root_node)
        .into_iter()
        .filter(|node| node.node_type() == NodeType::Element)
        .filter(|node| {
            node.attributes().any(|attr| {
                attr.name().is_some_and(|q| {
                    q.local_part == "id" && matches!(q.prefix, None | Some("xml"))
                }) && wanted.contains(attr.string_value().as_str())
            })
        })
        .collect();
    Ok(XPathValue::NodeSet(results))
}

fn func_key<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    check_arity("key", &args, 2, 2)?;
    let key_name = args[0].to_string();

    let Some(index) = e_ctx.key_indexes.and_then(|keys| keys.get(&key_name)) else {
        return Err(XPathError::FunctionError {
            function: "key()".to_string(),
            message: format!("No key named '{}' is declared", key_name),
        });
    };

    let lookup_values = match &args[1] {
        XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
        other => vec![other.to_string()],
    };

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for value in lookup_values {
        for &node in index.get(&value).into_iter().flatten() {
            if seen.insert(node) {
                result.push(node);
            }
        }
    }
    result.sort();
    Ok(XPathValue::NodeSet(result))
}

fn func_generate_id<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = optional_node_arg("generate-id", args, e_ctx)?;
    Ok(XPathValue::String(match node {
        Some(node) => {
            let mut hasher = DefaultHasher::new();
            node.hash(&mut hasher);
            // A leading letter keeps the identifier a valid NCName.
            format!("id{:x}", hasher.finish())
        }
        None => String::new(),
    }))
}

fn func_lang<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    check_arity("lang", &args, 1, 1)?;
    let wanted = args[0].to_string().to_lowercase();
    let mut current = Some(e_ctx.context_node);
    if current.is_some_and(|n| n.node_type() != NodeType::Element) {
        current = current.and_then(|n| n.parent());
    }

    while let Some(node) = current {
        let declared = node.attributes().find(|attr| {
            attr.name()
                .is_some_and(|q| q.prefix == Some("xml") && q.local_part == "lang")
        });
        if let Some(attr) = declared {
            let lang = attr.string_value().to_lowercase();
            let matches = lang == wanted || lang.starts_with(&format!("{}-", wanted));
            return Ok(XPathValue::Boolean(matches));
        }
        current = node.parent();
    }
    Ok(XPathValue::Boolean(false))
}

/// Formats a number with a JDK-style decimal pattern using the default decimal format
/// (`.` decimal separator, `,` grouping separator, `-` minus sign).
pub fn format_number(value: f64, pattern: &str) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    let (positive, explicit_negative) = match pattern.split_once(';') {
        Some((p, n)) => (p, Some(n)),
        None => (pattern, None),
    };
    let negative = value < 0.0;
    let sub_pattern = match (negative, explicit_negative) {
        (true, Some(n)) => n,
        _ => positive,
    };

    let is_digit_char = |c: char| matches!(c, '#' | '0' | ',' | '.');
    let body_start = sub_pattern.find(is_digit_char).unwrap_or(sub_pattern.len());
    let body_end = sub_pattern
        .rfind(is_digit_char)
        .map(|i| i + 1)
        .unwrap_or(body_start);
    let prefix = &sub_pattern[..body_start];
    let body = &sub_pattern[body_start..body_end.max(body_start)];
    let suffix = &sub_pattern[body_end.max(body_start)..];

    let mut scaled = value.abs();
    if prefix.contains('%') || suffix.contains('%') {
        scaled *= 100.0;
    } else if prefix.contains('\u{2030}') || suffix.contains('\u{2030}') {
        scaled *= 1000.0;
    }

    let sign = if negative && explicit_negative.is_none() { "-" } else { "" };
    if scaled.is_infinite() {
        return format!("{}{}Infinity{}", sign, prefix, suffix);
    }

    let (int_pattern, frac_pattern) = body.split_once('.').unwrap_or((body, ""));
    let min_int = int_pattern.chars().filter(|&c| c == '0').count();
    let grouping = int_pattern
        .rfind(',')
        .map(|i| int_pattern[i + 1..].chars().filter(|&c| c == '#' || c == '0').count())
        .filter(|&g| g > 0);
    let min_frac = frac_pattern.chars().filter(|&c| c == '0').count();
    let max_frac = frac_pattern.chars().filter(|&c| c == '0' || c == '#').count();

    let rendered = format!("{:.*}", max_frac, scaled);
    let (int_digits, frac_digits) = rendered.split_once('.').unwrap_or((&rendered, ""));

    let mut frac = frac_digits.to_string();
    while frac.len() > min_frac && frac.ends_with('0') {
        frac.pop();
    }

    let mut int = int_digits.trim_start_matches('0').to_string();
    while int.len() < min_int {
        int.insert(0, '0');
    }
    if int.is_empty() && frac.is_empty() {
        int.push('0');
    }

    if let Some(size) = grouping {
        let digits: Vec<char> = int.chars().collect();
        let mut grouped = String::new();
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % size == 0 {
                grouped.push(',');
            }
            grouped.push(*c);
        }
        int = grouped;
    }

    let mut out = format!("{}{}{}", sign, prefix, int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out.push_str(suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::engine::{EvaluationContext, KeyIndexes};
    use std::collections::HashMap;

    fn call<'a>(
        name: &str,
        args: Vec<XPathValue<MockNode<'a>>>,
        ctx: &EvaluationContext<'a, '_, MockNode<'a>>,
    ) -> XPathValue<MockNode<'a>> {
        evaluate_function(name, args, ctx).unwrap()
    }

    fn s<'a>(v: &str) -> XPathValue<MockNode<'a>> {
        XPathValue::String(v.to_string())
    }

    #[test]
    fn test_string_functions() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars);

        assert_eq!(call("concat", vec![s("a"), s("b"), s("c")], &ctx).to_string(), "abc");
        assert_eq!(call("substring-before", vec![s("1999/04/01"), s("/")], &ctx).to_string(), "1999");
        assert_eq!(call("substring-after", vec![s("1999/04/01"), s("/")], &ctx).to_string(), "04/01");
        assert_eq!(
            call("substring", vec![s("12345"), XPathValue::Number(1.5), XPathValue::Number(2.6)], &ctx).to_string(),
            "234"
        );
        assert_eq!(
            call("normalize-space", vec![s("  a \n  b ")], &ctx).to_string(),
            "a b"
        );
        assert_eq!(call("translate", vec![s("--aaa--"), s("abc-"), s("ABC")], &ctx).to_string(), "AAA");
    }

    #[test]
    fn test_round_and_number_functions() {
        assert_eq!(xpath_round(2.5), 3.0);
        assert_eq!(xpath_round(-2.5), -2.0);
        assert!(xpath_round(-0.4).is_sign_negative());
        assert!(xpath_round(f64::NAN).is_nan());
    }

    #[test]
    fn test_name_functions_use_context_node() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let lang_attr = tree.node(4);
        let ctx = EvaluationContext::new(lang_attr, tree.root(), &vars);
        assert_eq!(call("name", vec![], &ctx).to_string(), "xml:lang");
        assert_eq!(call("local-name", vec![], &ctx).to_string(), "lang");
    }

    #[test]
    fn test_lang_walks_ancestors() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let text = tree.node(5);
        let ctx = EvaluationContext::new(text, tree.root(), &vars);
        assert!(call("lang", vec![s("EN")], &ctx).to_bool());
        assert!(!call("lang", vec![s("de")], &ctx).to_bool());
    }

    #[test]
    fn test_key_lookup_and_unknown_key() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let mut keys: KeyIndexes<MockNode> = HashMap::new();
        keys.entry("by-id".to_string())
            .or_default()
            .insert("p1".to_string(), vec![tree.node(2)]);
        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars).with_keys(&keys);

        let XPathValue::NodeSet(nodes) = call("key", vec![s("by-id"), s("p1")], &ctx) else {
            panic!("Expected a node-set");
        };
        assert_eq!(nodes, vec![tree.node(2)]);
        assert!(evaluate_function("key", vec![s("missing"), s("p1")], &ctx).is_err());
    }

    #[test]
    fn test_arity_errors_and_unknown_functions() {
        let tree = create_test_tree();
        let vars: HashMap<String, XPathValue<MockNode>> = HashMap::new();
        let ctx = EvaluationContext::new(tree.root(), tree.root(), &vars);
        assert!(matches!(
            evaluate_function("concat", vec![s("a")], &ctx),
            Err(XPathError::FunctionError { .. })
        ));
        assert!(matches!(
            evaluate_function("document", vec![s("a.xml")], &ctx),
            Err(XPathError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_format_number_patterns() {
        assert_eq!(format_number(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(format_number(0.25, "0%"), "25%");
        assert_eq!(format_number(-3.0, "0.0"), "-3.0");
        assert_eq!(format_number(-3.0, "0;(0)"), "(3)");
        assert_eq!(format_number(7.0, "000"), "007");
        assert_eq!(format_number(0.5, "#.##"), ".5");
        assert_eq!(format_number(f64::NAN, "0"), "NaN");
    }
}
