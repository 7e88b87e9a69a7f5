//! XSLT 1.0 stylesheet compiler and transformation engine.
//!
//! A stylesheet is compiled once into a shareable [`CompiledStylesheet`], applied to a
//! source document through an [`XsltStylesheet`] session, and the resulting tree is
//! serialized with the `xml`, `html` or `text` output method its `xsl:output` declares.

pub mod ast;
pub mod compiler;
pub mod datasources;
pub mod error;
pub mod executor;
pub mod fragment;
pub mod output;
pub mod params;
pub mod parser;
pub mod pattern;
pub mod processor;
pub mod result;
pub mod result_tree;
pub mod serializer;
pub mod stylesheet;
pub mod util;

mod compiler_handlers;
mod executor_handlers;

pub use ast::CompiledStylesheet;
pub use compiler::compile_stylesheet;
pub use datasources::{XmlDocument, XmlNode};
pub use error::{Location, XsltError};
pub use executor::{ExecutionConfig, ExecutionError};
pub use params::{BoundParameters, Parameters};
pub use processor::XsltProcessor;
pub use result::TransformResult;
pub use result_tree::ResultDocument;
pub use stylesheet::XsltStylesheet;
pub use xform_xpath1::{DataSourceNode, NodeType, QName};
