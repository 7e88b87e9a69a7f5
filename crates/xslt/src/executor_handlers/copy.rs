use super::literals::apply_attribute_sets;
use crate::ast::PreparsedTemplate;
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xform_xpath1::datasource::{DataSourceNode, NodeType};
use xform_xpath1::{Expression, XPathValue};

/// Deep-copies the selected nodes. A variable bound to a result tree fragment is
/// reproduced as built; any other value is output as text.
pub(crate) fn handle_copy_of<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: &Expression,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    if let Some(name) = select.as_variable()
        && let Some(fragment) = executor.fragment_variable(name)
    {
        fragment.replay(builder);
        return Ok(());
    }
    match executor.evaluate_expr(select, context_node, context_position, context_size)? {
        XPathValue::NodeSet(nodes) => {
            for node in nodes {
                copy_node(executor, node, builder);
            }
        }
        other => builder.text(&other.to_string(), false),
    }
    Ok(())
}

/// Shallow copy of the context node: an element keeps its name and namespace nodes,
/// and the body supplies attributes and content.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_copy<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    match context_node.node_type() {
        NodeType::Element => {
            start_element_copy(context_node, builder);
            apply_attribute_sets(
                executor,
                use_attribute_sets,
                context_node,
                context_position,
                context_size,
                builder,
            )?;
            executor.execute_template(body, context_node, context_position, context_size, builder)?;
            builder.end_element();
        }
        NodeType::Root => {
            executor.execute_template(body, context_node, context_position, context_size, builder)?;
        }
        _ => copy_leaf(context_node, builder),
    }
    Ok(())
}

fn start_element_copy<'a, N: DataSourceNode<'a>>(node: N, builder: &mut dyn OutputBuilder) {
    let name = node.name().map(|q| q.to_string()).unwrap_or_default();
    builder.start_element(&name, node.namespace_uri());
    for (prefix, uri) in node.namespaces() {
        if prefix != Some("xml") {
            builder.namespace(prefix, uri);
        }
    }
}

fn copy_leaf<'a, N: DataSourceNode<'a>>(node: N, builder: &mut dyn OutputBuilder) {
    match node.node_type() {
        NodeType::Attribute => {
            let name = node.name().map(|q| q.to_string()).unwrap_or_default();
            builder.attribute(&name, node.namespace_uri(), &node.string_value());
        }
        NodeType::Text => builder.text(&node.string_value(), false),
        NodeType::Comment => builder.comment(&node.string_value()),
        NodeType::ProcessingInstruction => {
            let target = node.name().map(|q| q.local_part).unwrap_or_default();
            builder.processing_instruction(target, &node.string_value());
        }
        NodeType::Root | NodeType::Element => {}
    }
}

/// Recursively copies a source node and its descendants.
fn copy_node<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    node: N,
    builder: &mut dyn OutputBuilder,
) {
    match node.node_type() {
        NodeType::Element => {
            start_element_copy(node, builder);
            for attr in node.attributes() {
                copy_leaf(attr, builder);
            }
            for child in executor.children_of(node) {
                copy_node(executor, child, builder);
            }
            builder.end_element();
        }
        NodeType::Root => {
            for child in executor.children_of(node) {
                copy_node(executor, child, builder);
            }
        }
        _ => copy_leaf(node, builder),
    }
}
