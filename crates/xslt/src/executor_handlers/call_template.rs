use super::variables::evaluate_with_params;
use crate::ast::WithParam;
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xform_xpath1::datasource::DataSourceNode;

/// Calls a named template. The context node, position and size stay those of the caller.
pub(crate) fn handle_call_template<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &str,
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let stylesheet = executor.stylesheet;
    let Some(template) = stylesheet.named_templates.get(name) else {
        return Err(ExecutionError::UnknownNamedTemplate(name.to_string()));
    };

    let passed = evaluate_with_params(executor, params, context_node, context_position, context_size)?;

    // Strict mode check for undeclared parameters
    if executor.config.strict
        && let Some((undeclared, _)) = passed
            .iter()
            .find(|(passed_name, _)| !template.params.iter().any(|p| p.name == *passed_name))
    {
        return Err(ExecutionError::Parameter {
            name: undeclared.clone(),
            message: format!("not declared by template '{}'", name),
        });
    }

    executor.invoke_template(
        &template.params,
        &template.body,
        &passed,
        context_node,
        context_position,
        context_size,
        builder,
    )
}
