use crate::ast::{PreparsedTemplate, When};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::{OutputBuilder, TextCollector};
use xform_xpath1::datasource::DataSourceNode;

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_if<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    condition: bool,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    if condition {
        executor.execute_template(body, context_node, context_position, context_size, builder)?;
    }
    Ok(())
}

/// Runs the first `when` whose test is true, else the `otherwise` branch.
pub(crate) fn handle_choose<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    whens: &[When],
    otherwise: Option<&PreparsedTemplate>,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    for when in whens {
        if executor
            .evaluate_expr(&when.test, context_node, context_position, context_size)?
            .to_bool()
        {
            return executor.execute_template(&when.body, context_node, context_position, context_size, builder);
        }
    }
    if let Some(otherwise_body) = otherwise {
        executor.execute_template(otherwise_body, context_node, context_position, context_size, builder)?;
    }
    Ok(())
}

/// Reports the message text through the log. With `terminate`, the transformation stops.
pub(crate) fn handle_message<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    body: &PreparsedTemplate,
    terminate: bool,
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<(), ExecutionError> {
    let mut collector = TextCollector::new();
    executor.execute_template(body, context_node, context_position, context_size, &mut collector)?;
    let message = collector.into_string();
    if terminate {
        log::error!("xsl:message: {}", message);
        return Err(ExecutionError::Terminated(message));
    }
    log::info!("xsl:message: {}", message);
    Ok(())
}
