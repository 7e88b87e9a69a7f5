//! `xform` applies XSLT 1.0 stylesheets to XML documents.
//!
//! ```no_run
//! use xform::{Parameters, XmlDocument, XsltProcessor, XsltStylesheet};
//!
//! # fn main() -> Result<(), xform::XsltError> {
//! let compiled = XsltProcessor::new().compile_file("report.xsl")?;
//! let source = std::fs::read_to_string("data.xml")?;
//! let doc = XmlDocument::parse(&source)?;
//!
//! let mut sheet = XsltStylesheet::new(compiled);
//! sheet.bind_document(doc.root_node());
//! if sheet.apply_with(&Parameters::new().literal("title", "Q3"))? {
//!     sheet.print()?;
//! }
//! # Ok(())
//! # }
//! ```

pub use xform_xpath1 as xpath;
pub use xform_xslt as xslt;

pub use xform_xpath1::{DataSourceNode, NodeType, QName, XPathError};
pub use xform_xslt::{
    BoundParameters, CompiledStylesheet, ExecutionConfig, ExecutionError, Location, Parameters, ResultDocument,
    TransformResult, XmlDocument, XmlNode, XsltError, XsltProcessor, XsltStylesheet, compile_stylesheet,
};
