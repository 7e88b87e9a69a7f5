pub mod fixtures;

use xform::{ExecutionConfig, Parameters, XmlDocument, XmlNode, XsltError, XsltStylesheet, compile_stylesheet};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wraps top-level declarations in an `xsl:stylesheet` element.
pub fn stylesheet(body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
        body
    )
}

/// Compiles `xslt` and binds it to the root of `doc`.
pub fn session<'a>(
    xslt: &str,
    doc: &'a XmlDocument<'a>,
    config: ExecutionConfig,
) -> Result<XsltStylesheet<'a, XmlNode<'a, 'a>>, XsltError> {
    init_logger();
    let mut sheet = XsltStylesheet::new(compile_stylesheet(xslt)?).with_config(config);
    sheet.bind_document(doc.root_node());
    Ok(sheet)
}

/// Applies `xslt` to `xml` and returns the serialized result.
pub fn transform(xslt: &str, xml: &str, params: &Parameters) -> Result<Option<String>, XsltError> {
    init_logger();
    xform::XsltProcessor::new().transform(xslt, xml, params)
}
