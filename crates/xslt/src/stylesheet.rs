//! The transformation session: one compiled stylesheet, one bound source document,
//! and the result of the most recent apply.

use crate::ast::CompiledStylesheet;
use crate::error::XsltError;
use crate::executor::{ExecutionConfig, ExecutionError, TemplateExecutor};
use crate::params::{BoundParameters, Parameters};
use crate::result::TransformResult;
use crate::result_tree::{ResultDocument, ResultTreeBuilder};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::{panic, thread};
use xform_xpath1::{DataSourceNode, NodeType};

/// What one run of the executor produced.
type RunOutcome = Result<ResultDocument, ExecutionError>;

/// Applies a compiled stylesheet to a source document and serializes the outcome.
///
/// Serialization calls are only valid after a successful [`apply`](Self::apply);
/// before that they fail with [`XsltError::RequireParsedDoc`].
pub struct XsltStylesheet<'a, N: DataSourceNode<'a>> {
    compiled: Arc<CompiledStylesheet>,
    config: ExecutionConfig,
    document: Option<N>,
    result: Option<TransformResult>,
    last_failure: Option<ExecutionError>,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a, N: DataSourceNode<'a> + Send + 'a> XsltStylesheet<'a, N> {
    pub fn new(compiled: Arc<CompiledStylesheet>) -> Self {
        Self {
            compiled,
            config: ExecutionConfig::default(),
            document: None,
            result: None,
            last_failure: None,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the source document. The node must be a document root when `apply` runs.
    pub fn bind_document(&mut self, root: N) {
        self.document = Some(root);
    }

    pub fn document(&self) -> Option<N> {
        self.document
    }

    pub fn compiled(&self) -> &Arc<CompiledStylesheet> {
        &self.compiled
    }

    /// Applies the stylesheet without parameters.
    pub fn apply(&mut self) -> Result<bool, XsltError> {
        self.apply_with(&Parameters::new())
    }

    /// Applies the stylesheet. `Ok(false)` means the engine aborted; the previous
    /// result is dropped and the cause is available from [`last_failure`](Self::last_failure).
    pub fn apply_with(&mut self, params: &Parameters) -> Result<bool, XsltError> {
        let root = self.document.ok_or(XsltError::MissingDocument)?;
        if root.node_type() != NodeType::Root {
            return Err(XsltError::InvalidDocument(format!(
                "expected a document root, found a {:?} node",
                root.node_type()
            )));
        }
        let bound = params.bind()?;

        match self.run(root, &bound)? {
            Ok(document) => {
                log::debug!("Transformation produced {} result node(s)", document.node_count());
                self.result = Some(TransformResult::new(document, Arc::clone(&self.compiled)));
                self.last_failure = None;
                Ok(true)
            }
            Err(e) => {
                log::error!("Transformation failed: {}", e);
                self.result = None;
                self.last_failure = Some(e);
                Ok(false)
            }
        }
    }

    /// Applies the stylesheet with zero or one loosely typed parameter argument:
    /// a JSON object or an array of `[name, value]` pairs.
    pub fn apply_dynamic(&mut self, args: &[Value]) -> Result<bool, XsltError> {
        match args {
            [] => self.apply(),
            [params] => {
                let params = Parameters::from_json(params)?;
                self.apply_with(&params)
            }
            _ => Err(XsltError::Usage(format!(
                "wrong number of arguments ({} for 0..1)",
                args.len()
            ))),
        }
    }

    /// Runs the executor on a worker thread whose stack fits `max_depth` nested
    /// template instantiations. A panic on the worker is resumed on the caller.
    fn run(&self, root: N, params: &BoundParameters) -> Result<RunOutcome, XsltError> {
        let compiled: &CompiledStylesheet = &self.compiled;
        let config = self.config;
        thread::scope(|scope| -> Result<RunOutcome, XsltError> {
            let worker = thread::Builder::new()
                .name("xform-apply".to_string())
                .stack_size(config.stack_size())
                .spawn_scoped(scope, move || -> RunOutcome {
                    let mut executor = TemplateExecutor::new(compiled, root, config)?;
                    let mut builder = ResultTreeBuilder::new();
                    executor.execute(params, &mut builder)?;
                    Ok(builder.finish())
                })?;
            Ok(worker.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
        })
    }

    pub fn result(&self) -> Option<&TransformResult> {
        self.result.as_ref()
    }

    /// The error that made the last apply return `Ok(false)`.
    pub fn last_failure(&self) -> Option<&ExecutionError> {
        self.last_failure.as_ref()
    }

    fn require_result(&self) -> Result<&TransformResult, XsltError> {
        self.result.as_ref().ok_or(XsltError::RequireParsedDoc)
    }

    /// Writes the result to stdout.
    pub fn print(&self) -> Result<Option<usize>, XsltError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.print_to(&mut out)
    }

    /// Writes the result and returns the number of bytes written, or `None` when the
    /// result tree is empty.
    pub fn print_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<Option<usize>, XsltError> {
        let result = self.require_result()?;
        if result.is_empty() {
            return Ok(None);
        }
        let written = result.write_to(writer)?;
        writer.flush()?;
        Ok(Some(written))
    }

    pub fn to_string(&self) -> Result<Option<String>, XsltError> {
        let result = self.require_result()?;
        Ok((!result.is_empty()).then(|| result.to_text()))
    }

    /// The serialized result in its output encoding.
    pub fn to_bytes(&self) -> Result<Option<Vec<u8>>, XsltError> {
        let result = self.require_result()?;
        Ok((!result.is_empty()).then(|| result.to_bytes()))
    }

    pub fn save<W: Write + ?Sized>(&self, writer: &mut W) -> Result<bool, XsltError> {
        let result = self.require_result()?;
        if !result.is_empty() {
            result.write_to(writer)?;
        }
        writer.flush()?;
        Ok(true)
    }

    /// Saves the result to `path`, creating or truncating the file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<bool, XsltError> {
        self.require_result()?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.save(&mut writer)
    }

    /// Dumps the result tree structure to stdout.
    pub fn debug(&self) -> Result<bool, XsltError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.debug_to(&mut out)
    }

    #[cfg(feature = "debug-dump")]
    pub fn debug_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<bool, XsltError> {
        let result = self.require_result()?;
        result.dump_to(writer)?;
        writer.flush()?;
        Ok(true)
    }

    /// Without dump support there is nothing to write, whether or not a result exists.
    #[cfg(not(feature = "debug-dump"))]
    pub fn debug_to<W: Write + ?Sized>(&self, _writer: &mut W) -> Result<bool, XsltError> {
        log::warn!("xform-xslt was compiled without debugging support");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_stylesheet;
    use crate::datasources::xml::XmlDocument;
    use serde_json::json;

    const IDENTITY_TEXT: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:param name="greeting" select="'hello'"/>
        <xsl:template match="/"><out><xsl:value-of select="$greeting"/>:<xsl:value-of select="/doc/@n"/></out></xsl:template>
    </xsl:stylesheet>"#;

    fn session<'a>(
        xslt: &str,
        doc: &'a XmlDocument<'a>,
    ) -> XsltStylesheet<'a, crate::datasources::xml::XmlNode<'a, 'a>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut sheet = XsltStylesheet::new(compile_stylesheet(xslt).unwrap());
        sheet.bind_document(doc.root_node());
        sheet
    }

    #[test]
    fn test_serialization_requires_apply() {
        let doc = XmlDocument::parse("<doc n='1'/>").unwrap();
        let sheet = session(IDENTITY_TEXT, &doc);
        assert!(matches!(sheet.to_string(), Err(XsltError::RequireParsedDoc)));
        assert!(matches!(sheet.to_bytes(), Err(XsltError::RequireParsedDoc)));
        assert!(matches!(sheet.print_to(&mut Vec::new()), Err(XsltError::RequireParsedDoc)));
        assert!(matches!(sheet.save(&mut Vec::new()), Err(XsltError::RequireParsedDoc)));
    }

    #[cfg(feature = "debug-dump")]
    #[test]
    fn test_debug_dump_requires_apply() {
        let doc = XmlDocument::parse("<doc n='1'/>").unwrap();
        let sheet = session(IDENTITY_TEXT, &doc);
        assert!(matches!(sheet.debug_to(&mut Vec::new()), Err(XsltError::RequireParsedDoc)));
    }

    #[cfg(not(feature = "debug-dump"))]
    #[test]
    fn test_debug_without_dump_support_always_declines() {
        let doc = XmlDocument::parse("<doc n='1'/>").unwrap();
        let mut sheet = session(IDENTITY_TEXT, &doc);
        let mut out = Vec::new();
        assert!(!sheet.debug_to(&mut out).unwrap());
        sheet.apply().unwrap();
        assert!(!sheet.debug_to(&mut out).unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_and_invalid_document() {
        let doc = XmlDocument::parse("<doc n='1'/>").unwrap();
        let compiled = compile_stylesheet(IDENTITY_TEXT).unwrap();
        let mut sheet: XsltStylesheet<'_, crate::datasources::xml::XmlNode<'_, '_>> =
            XsltStylesheet::new(Arc::clone(&compiled));
        assert!(matches!(sheet.apply(), Err(XsltError::MissingDocument)));

        let element = doc.root_node().children().next().unwrap();
        sheet.bind_document(element);
        assert!(matches!(sheet.apply(), Err(XsltError::InvalidDocument(_))));
    }

    #[test]
    fn test_apply_and_serialize() {
        let doc = XmlDocument::parse("<doc n='7'/>").unwrap();
        let mut sheet = session(IDENTITY_TEXT, &doc);
        assert!(sheet.apply().unwrap());
        let text = sheet.to_string().unwrap().unwrap();
        assert_eq!(text, "<?xml version=\"1.0\"?>\n<out>hello:7</out>\n");

        let mut buf = Vec::new();
        assert_eq!(sheet.print_to(&mut buf).unwrap(), Some(text.len()));
        assert_eq!(String::from_utf8(buf).unwrap(), text);

        let mut saved = Vec::new();
        assert!(sheet.save(&mut saved).unwrap());
        assert_eq!(saved, text.as_bytes());
    }

    #[test]
    fn test_apply_dynamic_parameters() {
        let doc = XmlDocument::parse("<doc n='7'/>").unwrap();
        let mut sheet = session(IDENTITY_TEXT, &doc);
        assert!(sheet.apply_dynamic(&[json!({"greeting": "'hi'"})]).unwrap());
        assert!(sheet.to_string().unwrap().unwrap().contains("<out>hi:7</out>"));

        assert!(sheet.apply_dynamic(&[json!([["greeting", "'yo'"]])]).unwrap());
        assert!(sheet.to_string().unwrap().unwrap().contains("<out>yo:7</out>"));

        let err = sheet.apply_dynamic(&[json!({}), json!({})]).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of arguments (2 for 0..1)");
        assert!(matches!(sheet.apply_dynamic(&[json!(3)]), Err(XsltError::Type(_))));
        // Argument errors leave the previous result in place.
        assert!(sheet.to_string().unwrap().unwrap().contains("<out>yo:7</out>"));
    }

    #[test]
    fn test_engine_failure_clears_result() {
        let xslt = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
            <xsl:param name="stop" select="false()"/>
            <xsl:template match="/">
                <xsl:if test="$stop"><xsl:message terminate="yes">halt</xsl:message></xsl:if>
                <ok/>
            </xsl:template>
        </xsl:stylesheet>"#;
        let doc = XmlDocument::parse("<doc/>").unwrap();
        let mut sheet = session(xslt, &doc);
        assert!(sheet.apply().unwrap());
        assert!(sheet.result().is_some());

        assert!(!sheet.apply_with(&Parameters::new().param("stop", "true()")).unwrap());
        assert!(sheet.result().is_none());
        assert!(matches!(sheet.last_failure(), Some(ExecutionError::Terminated(_))));
        assert!(matches!(sheet.to_string(), Err(XsltError::RequireParsedDoc)));
    }

    #[test]
    fn test_empty_result_is_a_placeholder() {
        let xslt = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
            <xsl:template match="/"/>
        </xsl:stylesheet>"#;
        let doc = XmlDocument::parse("<doc>text</doc>").unwrap();
        let mut sheet = session(xslt, &doc);
        assert!(sheet.apply().unwrap());
        assert_eq!(sheet.to_string().unwrap(), None);
        assert_eq!(sheet.print_to(&mut Vec::new()).unwrap(), None);
        let mut saved = Vec::new();
        assert!(sheet.save(&mut saved).unwrap());
        assert!(saved.is_empty());
    }

    #[cfg(feature = "debug-dump")]
    #[test]
    fn test_debug_dump() {
        let doc = XmlDocument::parse("<doc n='7'/>").unwrap();
        let mut sheet = session(IDENTITY_TEXT, &doc);
        sheet.apply().unwrap();
        let mut out = Vec::new();
        assert!(sheet.debug_to(&mut out).unwrap());
        let dump = String::from_utf8(out).unwrap();
        assert!(dump.starts_with("DOCUMENT"));
        assert!(dump.contains("ELEMENT out"));
    }

    #[test]
    fn test_save_file() {
        let doc = XmlDocument::parse("<doc n='2'/>").unwrap();
        let mut sheet = session(IDENTITY_TEXT, &doc);
        sheet.apply().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        assert!(sheet.save_file(&path).unwrap());
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "<?xml version=\"1.0\"?>\n<out>hello:2</out>\n");
    }
}
