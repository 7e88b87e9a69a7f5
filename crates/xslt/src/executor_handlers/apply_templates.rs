use super::variables::evaluate_with_params;
use crate::ast::{SortKey, WithParam};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xform_xpath1::Expression;
use xform_xpath1::datasource::DataSourceNode;

/// Without `select`, the children of the context node are processed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_apply_templates<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: Option<&Expression>,
    mode: Option<&str>,
    sort_keys: &[SortKey],
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let passed = evaluate_with_params(executor, params, context_node, context_position, context_size)?;
    let mut nodes = match select {
        Some(expr) => executor.select_nodes(expr, context_node, context_position, context_size)?,
        None => executor.children_of(context_node),
    };
    executor.sort_node_set(&mut nodes, sort_keys)?;
    executor.apply_templates_to_nodes(&nodes, mode, &passed, builder)
}
