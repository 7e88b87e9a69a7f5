//! Node collection along each XPath axis.
//!
//! Every collector works on a single context node and returns nodes in proximity
//! order: document order for forward axes, reverse document order for reverse axes.
//! Positional predicates rely on that ordering.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

pub fn collect_axis<'a, N: DataSourceNode<'a>>(axis: Axis, node: N) -> Vec<N> {
    let mut out = Vec::new();
    match axis {
        Axis::SelfAxis => out.push(node),
        Axis::Child => out.extend(node.children()),
        Axis::Attribute => out.extend(node.attributes()),
        Axis::Descendant => push_descendants(node, &mut out),
        Axis::DescendantOrSelf => {
            out.push(node);
            push_descendants(node, &mut out);
        }
        Axis::Parent => out.extend(node.parent()),
        Axis::Ancestor => push_ancestors(node, &mut out),
        Axis::AncestorOrSelf => {
            out.push(node);
            push_ancestors(node, &mut out);
        }
        Axis::FollowingSibling => out.extend(following_siblings(node)),
        Axis::PrecedingSibling => {
            out.extend(preceding_siblings(node));
            out.reverse();
        }
        Axis::Following => push_following(node, &mut out),
        Axis::Preceding => {
            push_preceding(node, &mut out);
            out.reverse();
        }
    }
    out
}

fn is_attribute<'a, N: DataSourceNode<'a>>(node: N) -> bool {
    node.node_type() == NodeType::Attribute
}

/// Depth-first, pre-order walk so descendants come out in document order.
fn push_descendants<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut stack: Vec<N> = node.children().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        out.push(current);
        let mut children: Vec<N> = current.children().collect();
        children.reverse();
        stack.extend(children);
    }
}

fn push_ancestors<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(p) = current {
        out.push(p);
        current = p.parent();
    }
}

fn following_siblings<'a, N: DataSourceNode<'a>>(node: N) -> Vec<N> {
    if is_attribute(node) {
        return Vec::new();
    }
    match node.parent() {
        Some(parent) => parent.children().skip_while(|s| *s != node).skip(1).collect(),
        None => Vec::new(),
    }
}

fn preceding_siblings<'a, N: DataSourceNode<'a>>(node: N) -> Vec<N> {
    if is_attribute(node) {
        return Vec::new();
    }
    match node.parent() {
        Some(parent) => parent.children().take_while(|s| *s != node).collect(),
        None => Vec::new(),
    }
}

fn push_following<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node;
    if is_attribute(node) {
        // Everything inside the owner element follows its attributes.
        if let Some(owner) = node.parent() {
            push_descendants(owner, out);
            current = owner;
        }
    }
    loop {
        for sibling in following_siblings(current) {
            out.push(sibling);
            push_descendants(sibling, out);
        }
        match current.parent() {
            Some(p) => current = p,
            None => break,
        }
    }
}

/// Collects preceding nodes in document order; ancestors are excluded.
fn push_preceding<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut chain = Vec::new();
    let mut current = if is_attribute(node) { node.parent() } else { Some(node) };
    while let Some(c) = current {
        chain.push(c);
        current = c.parent();
    }
    // Walk from the outermost ancestor inwards so the output stays sorted.
    for c in chain.into_iter().rev() {
        for sibling in preceding_siblings(c) {
            out.push(sibling);
            push_descendants(sibling, out);
        }
    }
}
