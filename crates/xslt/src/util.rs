//! Attribute access, attribute value templates and name helpers shared by the compiler.

use crate::ast::{AttributeValueTemplate, AvtPart};
use crate::error::XsltError;
use crate::parser::ElementStart;
use xform_xpath1::parse_expression;

/// Converts a byte offset into a 1-based line and column.
pub(crate) fn get_line_col_from_pos(source: &str, pos: usize) -> (usize, usize) {
    let prefix = &source[..pos.min(source.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.rfind('\n').map_or(prefix.len(), |i| prefix.len() - i - 1) + 1;
    (line, col)
}

pub(crate) fn structure_error(message: impl Into<String>, pos: usize, source: &str) -> XsltError {
    XsltError::TemplateStructure {
        message: message.into(),
        location: get_line_col_from_pos(source, pos).into(),
    }
}

// --- Attribute Getter Utilities ---

/// Looks up an attribute in no namespace, such as `select` or `name`.
pub(crate) fn get_attr_optional<'e>(element: &'e ElementStart, name: &str) -> Option<&'e str> {
    element
        .attributes
        .iter()
        .find(|a| a.namespace.is_none() && a.name == name)
        .map(|a| a.value.as_str())
}

pub(crate) fn get_attr_required<'e>(
    element: &'e ElementStart,
    name: &str,
    pos: usize,
    source: &str,
) -> Result<&'e str, XsltError> {
    get_attr_optional(element, name).ok_or_else(|| {
        structure_error(
            format!("Missing required attribute '{}' on <{}>", name, element.name),
            pos,
            source,
        )
    })
}

/// Reads a `yes`/`no` attribute; anything else is a structure error.
pub(crate) fn get_yes_no(
    element: &ElementStart,
    name: &str,
    pos: usize,
    source: &str,
) -> Result<Option<bool>, XsltError> {
    match get_attr_optional(element, name) {
        None => Ok(None),
        Some("yes") => Ok(Some(true)),
        Some("no") => Ok(Some(false)),
        Some(other) => Err(structure_error(
            format!("Attribute '{}' must be 'yes' or 'no', found '{}'", name, other),
            pos,
            source,
        )),
    }
}

// --- Names ---

pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub fn is_qname(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(s),
    }
}

// --- Attribute Value Templates ---

/// Parses an attribute value template. `{{` and `}}` are literal braces; braces inside
/// string literals of an expression do not close it.
pub fn parse_avt(text: &str) -> Result<AttributeValueTemplate, XsltError> {
    if !text.contains('{') && !text.contains('}') {
        return Ok(AttributeValueTemplate::Static(text.to_string()));
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(XsltError::Compilation(format!(
                    "Unbalanced '}}' in attribute value template '{}'",
                    text
                )));
            }
            '{' => {
                let mut expr = String::new();
                let mut quote: Option<char> = None;
                let mut closed = false;
                for c in chars.by_ref() {
                    match (quote, c) {
                        (None, '}') => {
                            closed = true;
                            break;
                        }
                        (None, '\'' | '"') => quote = Some(c),
                        (Some(q), _) if c == q => quote = None,
                        _ => {}
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(XsltError::Compilation(format!(
                        "Unterminated expression in attribute value template '{}'",
                        text
                    )));
                }
                if !literal.is_empty() {
                    parts.push(AvtPart::Static(std::mem::take(&mut literal)));
                }
                parts.push(AvtPart::Dynamic(parse_expression(&expr)?));
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(AvtPart::Static(literal));
    }

    match parts.as_slice() {
        [] => Ok(AttributeValueTemplate::Static(String::new())),
        [AvtPart::Static(s)] => Ok(AttributeValueTemplate::Static(s.clone())),
        _ => Ok(AttributeValueTemplate::Dynamic(parts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = "ab\ncd\nef";
        assert_eq!(get_line_col_from_pos(source, 0), (1, 1));
        assert_eq!(get_line_col_from_pos(source, 4), (2, 2));
        assert_eq!(get_line_col_from_pos(source, 100), (3, 3));
    }

    #[test]
    fn test_parse_avt_static_and_escaped() {
        assert_eq!(
            parse_avt("plain").unwrap(),
            AttributeValueTemplate::Static("plain".to_string())
        );
        assert_eq!(
            parse_avt("{{literal}}").unwrap(),
            AttributeValueTemplate::Static("{literal}".to_string())
        );
    }

    #[test]
    fn test_parse_avt_dynamic_parts() {
        let AttributeValueTemplate::Dynamic(parts) = parse_avt("item-{@id}-{concat('}', 'x')}").unwrap() else {
            panic!("Expected a dynamic template");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], AvtPart::Static("item-".to_string()));
        assert!(matches!(parts[1], AvtPart::Dynamic(_)));
        assert!(matches!(parts[3], AvtPart::Dynamic(_)));
    }

    #[test]
    fn test_parse_avt_errors() {
        assert!(parse_avt("{@id").is_err());
        assert!(parse_avt("a}b").is_err());
        assert!(parse_avt("{1 +}").is_err());
    }

    #[test]
    fn test_qname_checks() {
        assert!(is_qname("svg:rect"));
        assert!(is_qname("item-1"));
        assert!(!is_qname("1item"));
        assert!(!is_qname("a:b:c"));
        assert!(!is_qname(""));
        assert_eq!(split_qname("xsl:template"), (Some("xsl"), "template"));
    }
}
