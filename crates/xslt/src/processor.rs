use crate::ast::CompiledStylesheet;
use crate::compiler;
use crate::datasources::xml::XmlDocument;
use crate::error::XsltError;
use crate::executor::ExecutionConfig;
use crate::params::Parameters;
use crate::stylesheet::XsltStylesheet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Compiles stylesheets and runs one-shot transformations over XML text.
#[derive(Debug, Clone, Default)]
pub struct XsltProcessor {
    config: ExecutionConfig,
}

impl XsltProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn compile(&self, source: &str) -> Result<Arc<CompiledStylesheet>, XsltError> {
        compiler::compile_stylesheet(source)
    }

    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Arc<CompiledStylesheet>, XsltError> {
        let path = path.as_ref();
        log::debug!("Compiling stylesheet {}", path.display());
        let source = fs::read_to_string(path)?;
        self.compile(&source)
    }

    /// Compiles `stylesheet`, applies it to `document` and returns the serialized
    /// result, or `None` when the result tree is empty. Engine failures come back as
    /// [`XsltError::Execution`].
    pub fn transform(&self, stylesheet: &str, document: &str, params: &Parameters) -> Result<Option<String>, XsltError> {
        let compiled = self.compile(stylesheet)?;
        let doc = XmlDocument::parse(document)?;
        let mut session = XsltStylesheet::new(compiled).with_config(self.config);
        session.bind_document(doc.root_node());
        if !session.apply_with(params)? {
            return Err(match session.last_failure() {
                Some(failure) => XsltError::Execution(failure.clone()),
                None => XsltError::Compilation("transformation failed without a recorded cause".to_string()),
            });
        }
        session.to_string()
    }
}
