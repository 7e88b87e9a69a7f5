//! The outcome of a successful transformation.

use crate::ast::{CompiledStylesheet, OutputDeclaration, OutputMethod};
use crate::result_tree::ResultDocument;
use crate::serializer;
use std::io::{self, Write};
use std::sync::Arc;

/// A result tree together with the stylesheet that produced it, whose `xsl:output`
/// settings govern serialization.
#[derive(Debug, Clone)]
pub struct TransformResult {
    document: ResultDocument,
    stylesheet: Arc<CompiledStylesheet>,
}

impl TransformResult {
    pub fn new(document: ResultDocument, stylesheet: Arc<CompiledStylesheet>) -> Self {
        Self { document, stylesheet }
    }

    pub fn document(&self) -> &ResultDocument {
        &self.document
    }

    pub fn stylesheet(&self) -> &Arc<CompiledStylesheet> {
        &self.stylesheet
    }

    pub fn output(&self) -> &OutputDeclaration {
        &self.stylesheet.output
    }

    /// True when the result tree has no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn method(&self) -> OutputMethod {
        serializer::resolve_method(&self.document, self.output())
    }

    pub fn to_text(&self) -> String {
        serializer::serialize_to_string(&self.document, self.output())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serializer::serialize(&self.document, self.output())
    }

    /// Writes the serialized result and returns the number of bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        serializer::write_to(&self.document, self.output(), writer)
    }

    #[cfg(feature = "debug-dump")]
    pub fn dump_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        serializer::dump::dump(&self.document, writer)
    }
}
