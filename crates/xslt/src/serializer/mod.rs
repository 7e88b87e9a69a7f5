//! Renders a `ResultDocument` as bytes, following the output method and settings of
//! the stylesheet's `xsl:output` declaration.

mod html;
mod text;
mod xml;

#[cfg(feature = "debug-dump")]
pub mod dump;

use crate::ast::{OutputDeclaration, OutputMethod};
use crate::result_tree::ResultDocument;
use quick_xml::escape::partial_escape;
use std::io::{self, Write};

/// The output encodings the serializer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Ascii,
    Latin1,
}

impl Encoding {
    /// Resolves an `xsl:output encoding` label. Unknown labels fall back to UTF-8.
    pub fn from_label(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return Encoding::Utf8;
        };
        match label.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Encoding::Utf8,
            "US-ASCII" | "ASCII" => Encoding::Ascii,
            "ISO-8859-1" | "ISO_8859-1" | "LATIN1" | "LATIN-1" => Encoding::Latin1,
            _ => {
                log::warn!("Unsupported output encoding '{}', using UTF-8", label);
                Encoding::Utf8
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Ascii => "US-ASCII",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }

    pub fn can_encode(self, c: char) -> bool {
        match self {
            Encoding::Utf8 => true,
            Encoding::Ascii => c.is_ascii(),
            Encoding::Latin1 => (c as u32) <= 0xFF,
        }
    }

    /// Encodes serialized text. Characters outside the repertoire that were not
    /// already written as character references become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Ascii | Encoding::Latin1 => text
                .chars()
                .map(|c| if self.can_encode(c) { c as u32 as u8 } else { b'?' })
                .collect(),
        }
    }
}

/// The output method: the declared one, else `html` when the first element of the
/// result is an unqualified `html`, else `xml`.
pub fn resolve_method(document: &ResultDocument, output: &OutputDeclaration) -> OutputMethod {
    if let Some(method) = output.method {
        return method;
    }
    let is_html = document
        .document_element()
        .and_then(|id| document.element(id))
        .is_some_and(|e| e.namespace.is_none() && e.name.eq_ignore_ascii_case("html"));
    if is_html { OutputMethod::Html } else { OutputMethod::Xml }
}

/// Serializes the document as text. Characters the output encoding cannot represent
/// are already written as character references where the method allows it.
pub fn serialize_to_string(document: &ResultDocument, output: &OutputDeclaration) -> String {
    let encoding = Encoding::from_label(output.encoding.as_deref());
    match resolve_method(document, output) {
        OutputMethod::Xml => xml::serialize(document, output, encoding),
        OutputMethod::Html => html::serialize(document, output, encoding),
        OutputMethod::Text => text::serialize(document),
    }
}

/// Serializes the document to bytes in the declared output encoding.
pub fn serialize(document: &ResultDocument, output: &OutputDeclaration) -> Vec<u8> {
    let text = serialize_to_string(document, output);
    Encoding::from_label(output.encoding.as_deref()).encode(&text)
}

/// Serializes the document into `writer` and returns the number of bytes written.
pub fn write_to<W: Write + ?Sized>(
    document: &ResultDocument,
    output: &OutputDeclaration,
    writer: &mut W,
) -> io::Result<usize> {
    let bytes = serialize(document, output);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(bytes.len())
}

/// Escapes character data: `&`, `<`, `>` and CR, plus characters the encoding cannot
/// represent.
pub(crate) fn escape_text(text: &str, encoding: Encoding, out: &mut String) {
    for c in partial_escape(text).chars() {
        match c {
            '\r' => out.push_str("&#13;"),
            c if !encoding.can_encode(c) => push_char_ref(c, out),
            c => out.push(c),
        }
    }
}

/// Escapes a double-quoted attribute value. Whitespace other than spaces is written
/// as character references so it survives attribute value normalization.
pub(crate) fn escape_attribute(value: &str, encoding: Encoding, out: &mut String) {
    for c in partial_escape(value).chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if !encoding.can_encode(c) => push_char_ref(c, out),
            c => out.push(c),
        }
    }
}

fn push_char_ref(c: char, out: &mut String) {
    out.push_str(&format!("&#x{:X};", c as u32));
}

/// Writes a `<!DOCTYPE>` line for the given root name, if an identifier was declared.
pub(crate) fn write_doctype(root_name: &str, output: &OutputDeclaration, out: &mut String) {
    match (&output.doctype_public, &output.doctype_system) {
        (Some(public), Some(system)) => {
            out.push_str(&format!("<!DOCTYPE {} PUBLIC \"{}\" \"{}\">\n", root_name, public, system))
        }
        (None, Some(system)) => out.push_str(&format!("<!DOCTYPE {} SYSTEM \"{}\">\n", root_name, system)),
        _ => {}
    }
}
