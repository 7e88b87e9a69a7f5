use crate::executor::ExecutionError;
use thiserror::Error;
use xform_xpath1::XPathError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

impl From<(usize, usize)> for Location {
    fn from((line, col): (usize, usize)) -> Self {
        Location { line, col }
    }
}

#[derive(Error, Debug)]
pub enum XsltError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Type(String),

    #[error("must have a parsed XML result")]
    RequireParsedDoc,

    #[error("Need a document object")]
    MissingDocument,

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    #[error("Quick-XML error: {0}")]
    QuickXml(String),

    #[error("UTF-8 string error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("XPath error: {0}")]
    XPath(#[from] XPathError),

    #[error("Stylesheet compilation error: {0}")]
    Compilation(String),

    #[error("Stylesheet structure error at {location}: {message}")]
    TemplateStructure { message: String, location: Location },

    #[error("Transformation failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl From<quick_xml::Error> for XsltError {
    fn from(e: quick_xml::Error) -> Self {
        XsltError::QuickXml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for XsltError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        XsltError::QuickXml(e.to_string())
    }
}
