//! A structural dump of a result tree, one line per node, in the layout of libxml's
//! `xmlDebugDumpDocument`.

use crate::result_tree::{NodeId, ResultDocument, ResultNodeKind};
use std::io::{self, Write};

const CONTENT_PREVIEW_CHARS: usize = 40;

pub fn dump<W: Write + ?Sized>(document: &ResultDocument, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "DOCUMENT")?;
    for &child in document.children(document.root()) {
        dump_node(document, child, 1, writer)?;
    }
    writer.flush()
}

fn dump_node<W: Write + ?Sized>(document: &ResultDocument, id: NodeId, depth: usize, writer: &mut W) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    match &document.node(id).kind {
        ResultNodeKind::Root => {}
        ResultNodeKind::Element(element) => {
            writeln!(writer, "{}ELEMENT {}", indent, element.name)?;
            if let Some(uri) = &element.namespace {
                writeln!(writer, "{}  namespace href={}", indent, uri)?;
            }
            for (prefix, uri) in &element.namespaces {
                writeln!(writer, "{}  namespace {} href={}", indent, prefix.as_deref().unwrap_or("(default)"), uri)?;
            }
            for attr in &element.attributes {
                writeln!(writer, "{}  ATTRIBUTE {}", indent, attr.name)?;
                writeln!(writer, "{}    TEXT", indent)?;
                writeln!(writer, "{}      content={}", indent, preview(&attr.value))?;
            }
            for &child in document.children(id) {
                dump_node(document, child, depth + 1, writer)?;
            }
        }
        ResultNodeKind::Text { content, .. } => {
            writeln!(writer, "{}TEXT", indent)?;
            writeln!(writer, "{}  content={}", indent, preview(content))?;
        }
        ResultNodeKind::Comment(text) => {
            writeln!(writer, "{}COMMENT", indent)?;
            writeln!(writer, "{}  content={}", indent, preview(text))?;
        }
        ResultNodeKind::ProcessingInstruction { target, data } => {
            writeln!(writer, "{}PI {}", indent, target)?;
            writeln!(writer, "{}  content={}", indent, preview(data))?;
        }
    }
    Ok(())
}

/// The first characters of `text` with whitespace shown as spaces.
fn preview(text: &str) -> String {
    let mut out: String = text
        .chars()
        .take(CONTENT_PREVIEW_CHARS)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if text.chars().count() > CONTENT_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
