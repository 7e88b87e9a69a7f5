//! Defines the `OutputBuilder` trait, which decouples the XSLT executor
//! from the concrete result tree it writes into.

/// A trait that describes the semantic actions of building the output tree,
/// without exposing the underlying concrete node types.
pub trait OutputBuilder {
    fn start_element(&mut self, name: &str, namespace: Option<&str>);
    fn end_element(&mut self);

    /// Declares a namespace on the element that was just started.
    fn namespace(&mut self, prefix: Option<&str>, uri: &str);

    /// Sets an attribute on the currently open element. A later attribute with the
    /// same expanded name replaces an earlier one.
    fn attribute(&mut self, name: &str, namespace: Option<&str>, value: &str);

    fn text(&mut self, text: &str, disable_escaping: bool);
    fn comment(&mut self, text: &str);
    fn processing_instruction(&mut self, target: &str, data: &str);
}

/// Collects the text produced by a template body, for instructions whose content must
/// be a string (`xsl:attribute`, `xsl:comment`, `xsl:processing-instruction`,
/// `xsl:message`). Nodes other than text are dropped together with their content.
#[derive(Debug, Default)]
pub struct TextCollector {
    text: String,
    skipped_depth: usize,
}

impl TextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl OutputBuilder for TextCollector {
    fn start_element(&mut self, name: &str, _namespace: Option<&str>) {
        if self.skipped_depth == 0 {
            log::warn!("Ignoring element <{}> created where only text is allowed", name);
        }
        self.skipped_depth += 1;
    }

    fn end_element(&mut self) {
        self.skipped_depth = self.skipped_depth.saturating_sub(1);
    }

    fn namespace(&mut self, _prefix: Option<&str>, _uri: &str) {}

    fn attribute(&mut self, name: &str, _namespace: Option<&str>, _value: &str) {
        if self.skipped_depth == 0 {
            log::warn!("Ignoring attribute '{}' created where only text is allowed", name);
        }
    }

    fn text(&mut self, text: &str, _disable_escaping: bool) {
        if self.skipped_depth == 0 {
            self.text.push_str(text);
        }
    }

    fn comment(&mut self, _text: &str) {}

    fn processing_instruction(&mut self, _target: &str, _data: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_collector_skips_element_content() {
        let mut collector = TextCollector::new();
        collector.text("a", false);
        collector.start_element("b", None);
        collector.text("hidden", false);
        collector.end_element();
        collector.comment("c");
        collector.text("d", true);
        assert_eq!(collector.into_string(), "ad");
    }
}
