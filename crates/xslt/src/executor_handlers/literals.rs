//! Handlers for instructions that construct result nodes: literal result elements,
//! `xsl:element`, `xsl:attribute`, comments and processing instructions.

use crate::ast::{
    AttributeValueTemplate, LiteralAttribute, NamespaceBinding, PreparsedTemplate, XML_NAMESPACE, XsltInstruction,
};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::{OutputBuilder, TextCollector};
use crate::util::{is_qname, split_qname};
use xform_xpath1::datasource::DataSourceNode;

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_literal_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &str,
    namespace: Option<&str>,
    namespaces: &[NamespaceBinding],
    attrs: &[LiteralAttribute],
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    builder.start_element(name, namespace);
    for (prefix, uri) in namespaces {
        builder.namespace(prefix.as_deref(), uri);
    }
    apply_attribute_sets(
        executor,
        use_attribute_sets,
        context_node,
        context_position,
        context_size,
        builder,
    )?;
    for attr in attrs {
        let value = executor.evaluate_avt(&attr.value, context_node, context_position, context_size)?;
        builder.attribute(&attr.name, attr.namespace.as_deref(), &value);
    }
    executor.execute_template(body, context_node, context_position, context_size, builder)?;
    builder.end_element();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    namespace_avt: Option<&AttributeValueTemplate>,
    in_scope: &[NamespaceBinding],
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let name = executor.evaluate_avt(name_avt, context_node, context_position, context_size)?;
    let namespace = namespace_avt
        .map(|avt| executor.evaluate_avt(avt, context_node, context_position, context_size))
        .transpose()?;
    let namespace = resolve_computed_name(&name, namespace, in_scope, false)?;

    builder.start_element(&name, namespace.as_deref());
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
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_attribute<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    namespace_avt: Option<&AttributeValueTemplate>,
    in_scope: &[NamespaceBinding],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let name = executor.evaluate_avt(name_avt, context_node, context_position, context_size)?;
    let namespace = namespace_avt
        .map(|avt| executor.evaluate_avt(avt, context_node, context_position, context_size))
        .transpose()?;
    let namespace = resolve_computed_name(&name, namespace, in_scope, true)?;

    let mut collector = TextCollector::new();
    executor.execute_template(body, context_node, context_position, context_size, &mut collector)?;
    builder.attribute(&name, namespace.as_deref(), &collector.into_string());
    Ok(())
}

/// Finds the namespace of a name computed at run time. An explicit `namespace` wins;
/// otherwise the prefix is resolved against the declarations around the instruction.
/// Unprefixed attributes are never in a namespace.
fn resolve_computed_name(
    name: &str,
    namespace: Option<String>,
    in_scope: &[NamespaceBinding],
    is_attribute: bool,
) -> Result<Option<String>, ExecutionError> {
    if !is_qname(name) || (is_attribute && name == "xmlns") {
        return Err(ExecutionError::InvalidName(format!("'{}' is not a valid QName", name)));
    }
    if let Some(uri) = namespace {
        return Ok((!uri.is_empty()).then_some(uri));
    }
    let lookup = |prefix: Option<&str>| {
        in_scope
            .iter()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.clone())
    };
    match split_qname(name).0 {
        Some("xml") => Ok(Some(XML_NAMESPACE.to_string())),
        Some(prefix) => lookup(Some(prefix))
            .map(Some)
            .ok_or_else(|| ExecutionError::InvalidName(format!("undeclared prefix '{}' in '{}'", prefix, name))),
        None if is_attribute => Ok(None),
        None => Ok(lookup(None).filter(|uri| !uri.is_empty())),
    }
}

/// Adds the attributes of the named sets, the sets each one uses coming first.
pub(crate) fn apply_attribute_sets<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    names: &[String],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let mut active = Vec::new();
    apply_sets(executor, names, &mut active, context_node, context_position, context_size, builder)
}

#[allow(clippy::too_many_arguments)]
fn apply_sets<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    names: &[String],
    active: &mut Vec<String>,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let stylesheet = executor.stylesheet;
    for name in names {
        let Some(set) = stylesheet.attribute_sets.get(name) else {
            log::warn!("Unknown attribute set '{}'", name);
            continue;
        };
        if active.contains(name) {
            log::warn!("Attribute set '{}' uses itself", name);
            continue;
        }
        active.push(name.clone());
        apply_sets(
            executor,
            &set.use_attribute_sets,
            active,
            context_node,
            context_position,
            context_size,
            builder,
        )?;
        for attribute in &set.attributes {
            if let XsltInstruction::Attribute {
                name,
                namespace,
                in_scope,
                body,
            } = attribute
            {
                handle_attribute(
                    executor,
                    name,
                    namespace.as_ref(),
                    in_scope,
                    body,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                )?;
            }
        }
        active.pop();
    }
    Ok(())
}

pub(crate) fn handle_comment<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let mut collector = TextCollector::new();
    executor.execute_template(body, context_node, context_position, context_size, &mut collector)?;
    let mut text = collector.into_string().replace("--", "- -");
    if text.ends_with('-') {
        text.push(' ');
    }
    builder.comment(&text);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_processing_instruction<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let target = executor.evaluate_avt(name_avt, context_node, context_position, context_size)?;
    if !is_qname(&target) || target.contains(':') || target.eq_ignore_ascii_case("xml") {
        return Err(ExecutionError::InvalidName(format!(
            "'{}' is not a valid processing instruction target",
            target
        )));
    }
    let mut collector = TextCollector::new();
    executor.execute_template(body, context_node, context_position, context_size, &mut collector)?;
    let data = collector.into_string().replace("?>", "? >");
    builder.processing_instruction(&target, data.trim_start());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Vec<NamespaceBinding> {
        vec![
            (Some("a".to_string()), "urn:a".to_string()),
            (None, "urn:default".to_string()),
        ]
    }

    #[test]
    fn test_resolve_computed_name() {
        let in_scope = scope();
        assert_eq!(
            resolve_computed_name("a:x", None, &in_scope, false).unwrap(),
            Some("urn:a".to_string())
        );
        assert_eq!(
            resolve_computed_name("x", None, &in_scope, false).unwrap(),
            Some("urn:default".to_string())
        );
        assert_eq!(resolve_computed_name("x", None, &in_scope, true).unwrap(), None);
        assert_eq!(
            resolve_computed_name("x", Some("urn:given".to_string()), &in_scope, true).unwrap(),
            Some("urn:given".to_string())
        );
        assert_eq!(resolve_computed_name("x", Some(String::new()), &in_scope, false).unwrap(), None);
        assert_eq!(
            resolve_computed_name("xml:lang", None, &[], true).unwrap(),
            Some(XML_NAMESPACE.to_string())
        );
    }

    #[test]
    fn test_resolve_computed_name_errors() {
        let in_scope = scope();
        assert!(matches!(
            resolve_computed_name("1bad", None, &in_scope, false),
            Err(ExecutionError::InvalidName(_))
        ));
        assert!(matches!(
            resolve_computed_name("b:x", None, &in_scope, false),
            Err(ExecutionError::InvalidName(_))
        ));
        assert!(matches!(
            resolve_computed_name("xmlns", None, &in_scope, true),
            Err(ExecutionError::InvalidName(_))
        ));
    }
}
