//! Pure functions for evaluating XPath binary operators with XPath 1.0 coercions.

use super::ast::BinaryOperator;
use super::engine::XPathValue;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;

/// Evaluates every operator except `and`/`or`, which the engine short-circuits.
pub fn evaluate<'a, N: DataSourceNode<'a> + 'a>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    use BinaryOperator::*;
    match op {
        Or => Ok(XPathValue::Boolean(left.to_bool() || right.to_bool())),
        And => Ok(XPathValue::Boolean(left.to_bool() && right.to_bool())),
        Equals | NotEquals | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            Ok(XPathValue::Boolean(compare(op, &left, &right)))
        }
        Plus => Ok(XPathValue::Number(left.to_number() + right.to_number())),
        Minus => Ok(XPathValue::Number(left.to_number() - right.to_number())),
        Multiply => Ok(XPathValue::Number(left.to_number() * right.to_number())),
        Divide => Ok(XPathValue::Number(left.to_number() / right.to_number())),
        Modulo => Ok(XPathValue::Number(left.to_number() % right.to_number())),
        Union => evaluate_union(left, right),
    }
}

/// Comparisons involving node-sets are existential: true if any member satisfies it.
fn compare<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    match (left, right) {
        (XPathValue::NodeSet(l), XPathValue::NodeSet(r)) => {
            let right_strings: Vec<XPathValue<N>> = r
                .iter()
                .map(|n| XPathValue::String(n.string_value()))
                .collect();
            l.iter().any(|a| {
                let a = XPathValue::String(a.string_value());
                right_strings.iter().any(|b| compare_scalar(op, &a, b))
            })
        }
        (XPathValue::NodeSet(_), XPathValue::Boolean(_))
        | (XPathValue::Boolean(_), XPathValue::NodeSet(_)) => {
            compare_scalar(
                op,
                &XPathValue::<N>::Boolean(left.to_bool()),
                &XPathValue::<N>::Boolean(right.to_bool()),
            )
        }
        (XPathValue::NodeSet(l), other) => l
            .iter()
            .any(|a| compare_scalar(op, &XPathValue::String(a.string_value()), other)),
        (other, XPathValue::NodeSet(r)) => r
            .iter()
            .any(|b| compare_scalar(op, other, &XPathValue::String(b.string_value()))),
        (l, r) => compare_scalar(op, l, r),
    }
}

fn compare_scalar<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    use BinaryOperator::*;
    match op {
        Equals | NotEquals => {
            let equal = match (left, right) {
                (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
                    left.to_bool() == right.to_bool()
                }
                (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
                    left.to_number() == right.to_number()
                }
                _ => left.to_string() == right.to_string(),
            };
            if op == Equals { equal } else { !equal }
        }
        LessThan => left.to_number() < right.to_number(),
        LessThanOrEqual => left.to_number() <= right.to_number(),
        GreaterThan => left.to_number() > right.to_number(),
        GreaterThanOrEqual => left.to_number() >= right.to_number(),
        _ => false,
    }
}

fn evaluate_union<'a, N: DataSourceNode<'a> + 'a>(
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    let (XPathValue::NodeSet(mut merged), XPathValue::NodeSet(r_nodes)) = (left, right) else {
        return Err(XPathError::TypeError(
            "Both operands of '|' must be node-sets".to_string(),
        ));
    };
    merged.extend(r_nodes);
    merged.sort();
    merged.dedup();
    Ok(XPathValue::NodeSet(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    fn holds<'a>(op: BinaryOperator, l: XPathValue<MockNode<'a>>, r: XPathValue<MockNode<'a>>) -> bool {
        evaluate(op, l, r).unwrap().to_bool()
    }

    #[test]
    fn test_arithmetic_operators() {
        let ten = || XPathValue::Number::<MockNode>(10.0);
        let three = || XPathValue::Number::<MockNode>(3.0);
        assert_eq!(evaluate(BinaryOperator::Plus, ten(), three()).unwrap().to_number(), 13.0);
        assert_eq!(evaluate(BinaryOperator::Modulo, ten(), three()).unwrap().to_number(), 1.0);
        assert_eq!(
            evaluate(BinaryOperator::Modulo, XPathValue::<MockNode>::Number(-5.0), XPathValue::Number(2.0))
                .unwrap()
                .to_number(),
            -1.0
        );
        assert!(
            evaluate(BinaryOperator::Divide, XPathValue::<MockNode>::Number(1.0), XPathValue::Number(0.0))
                .unwrap()
                .to_number()
                .is_infinite()
        );
    }

    #[test]
    fn test_scalar_equality_coercions() {
        let s = |v: &str| XPathValue::<MockNode>::String(v.to_string());
        assert!(holds(BinaryOperator::Equals, s("1.0"), XPathValue::Number(1.0)));
        assert!(!holds(BinaryOperator::Equals, s("1.0"), s("1")));
        assert!(holds(BinaryOperator::Equals, s("x"), XPathValue::Boolean(true)));
        assert!(holds(BinaryOperator::NotEquals, s("hello"), s("world")));
    }

    #[test]
    fn test_node_set_comparisons_are_existential() {
        let tree = create_test_tree();
        // Elements 2 and 9 have string values "Hello" and "World".
        let paras = || XPathValue::NodeSet(vec![tree.node(2), tree.node(9)]);
        let s = |v: &str| XPathValue::String(v.to_string());

        assert!(holds(BinaryOperator::Equals, paras(), s("World")));
        assert!(holds(BinaryOperator::NotEquals, paras(), s("World")));
        assert!(!holds(BinaryOperator::Equals, paras(), s("Other")));
        assert!(!holds(BinaryOperator::Equals, XPathValue::NodeSet(vec![]), s("")));
        assert!(holds(
            BinaryOperator::Equals,
            XPathValue::NodeSet(vec![]),
            XPathValue::Boolean(false)
        ));
        assert!(holds(
            BinaryOperator::Equals,
            paras(),
            XPathValue::NodeSet(vec![tree.node(10)])
        ));
    }

    #[test]
    fn test_node_set_against_boolean_uses_emptiness() {
        let tree = create_test_tree();
        let some = || XPathValue::NodeSet(vec![tree.node(2)]);
        let none = || XPathValue::<MockNode>::NodeSet(vec![]);

        assert!(holds(BinaryOperator::Equals, some(), XPathValue::Boolean(true)));
        assert!(holds(BinaryOperator::Equals, XPathValue::Boolean(false), none()));
        assert!(holds(BinaryOperator::NotEquals, XPathValue::Boolean(false), some()));
        assert!(holds(BinaryOperator::GreaterThan, some(), XPathValue::Boolean(false)));
        assert!(!holds(BinaryOperator::LessThan, none(), XPathValue::Boolean(false)));
    }

    #[test]
    fn test_union_operator_sorts_and_dedups() {
        let tree = create_test_tree();
        let left = XPathValue::NodeSet(vec![tree.node(2), tree.node(0)]);
        let right = XPathValue::NodeSet(vec![tree.node(2), tree.node(5)]);

        let XPathValue::NodeSet(nodes) = evaluate(BinaryOperator::Union, left, right).unwrap() else {
            panic!("Expected a node-set");
        };
        let ids: Vec<usize> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 2, 5]);
        assert!(
            evaluate(
                BinaryOperator::Union,
                XPathValue::NodeSet(vec![tree.node(2)]),
                XPathValue::Number(1.0)
            )
            .is_err()
        );
    }
}
