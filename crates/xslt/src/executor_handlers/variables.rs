use crate::ast::{BindingValue, WithParam};
use crate::executor::{ExecutionError, PassedParams, TemplateExecutor};
use xform_xpath1::datasource::DataSourceNode;

pub(crate) fn handle_variable<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &str,
    value: &BindingValue,
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<(), ExecutionError> {
    let binding = executor.evaluate_binding(value, context_node, context_position, context_size)?;
    executor.set_variable_in_current_scope(name.to_string(), binding);
    Ok(())
}

/// Evaluates `xsl:with-param` values in the caller's context.
pub(crate) fn evaluate_with_params<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<PassedParams<N>, ExecutionError> {
    let mut passed = Vec::with_capacity(params.len());
    for param in params {
        let binding = executor.evaluate_binding(&param.value, context_node, context_position, context_size)?;
        passed.push((param.name.clone(), binding));
    }
    Ok(passed)
}
