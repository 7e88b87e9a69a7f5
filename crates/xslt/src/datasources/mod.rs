//! Source-tree adapters that expose documents to the engine as `DataSourceNode`s.

pub mod xml;

pub use xml::{XmlDocument, XmlNode};
