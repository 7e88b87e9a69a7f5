//! Result tree fragments: the output of a variable or parameter body, recorded as
//! builder commands so `xsl:copy-of` can replay it into another builder.

use crate::output::OutputBuilder;

#[derive(Debug, Clone, PartialEq)]
enum OutputCommand {
    StartElement {
        name: String,
        namespace: Option<String>,
    },
    EndElement,
    Namespace {
        prefix: Option<String>,
        uri: String,
    },
    Attribute {
        name: String,
        namespace: Option<String>,
        value: String,
    },
    Text {
        text: String,
        disable_escaping: bool,
    },
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFragment {
    commands: Vec<OutputCommand>,
}

impl ResultFragment {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The concatenation of all text in the fragment, which is what XPath sees.
    pub fn string_value(&self) -> String {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                OutputCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn replay(&self, target: &mut dyn OutputBuilder) {
        for cmd in &self.commands {
            match cmd {
                OutputCommand::StartElement { name, namespace } => {
                    target.start_element(name, namespace.as_deref())
                }
                OutputCommand::EndElement => target.end_element(),
                OutputCommand::Namespace { prefix, uri } => target.namespace(prefix.as_deref(), uri),
                OutputCommand::Attribute {
                    name,
                    namespace,
                    value,
                } => target.attribute(name, namespace.as_deref(), value),
                OutputCommand::Text {
                    text,
                    disable_escaping,
                } => target.text(text, *disable_escaping),
                OutputCommand::Comment(text) => target.comment(text),
                OutputCommand::ProcessingInstruction { target: t, data } => {
                    target.processing_instruction(t, data)
                }
            }
        }
    }
}

/// An `OutputBuilder` that records everything it receives.
#[derive(Debug, Default)]
pub struct FragmentBuilder {
    commands: Vec<OutputCommand>,
}

impl FragmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> ResultFragment {
        ResultFragment {
            commands: self.commands,
        }
    }
}

impl OutputBuilder for FragmentBuilder {
    fn start_element(&mut self, name: &str, namespace: Option<&str>) {
        self.commands.push(OutputCommand::StartElement {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        });
    }

    fn end_element(&mut self) {
        self.commands.push(OutputCommand::EndElement);
    }

    fn namespace(&mut self, prefix: Option<&str>, uri: &str) {
        self.commands.push(OutputCommand::Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
    }

    fn attribute(&mut self, name: &str, namespace: Option<&str>, value: &str) {
        self.commands.push(OutputCommand::Attribute {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            value: value.to_string(),
        });
    }

    fn text(&mut self, text: &str, disable_escaping: bool) {
        if text.is_empty() {
            return;
        }
        if let Some(OutputCommand::Text {
            text: last,
            disable_escaping: last_flag,
        }) = self.commands.last_mut()
            && *last_flag == disable_escaping
        {
            last.push_str(text);
            return;
        }
        self.commands.push(OutputCommand::Text {
            text: text.to_string(),
            disable_escaping,
        });
    }

    fn comment(&mut self, text: &str) {
        self.commands.push(OutputCommand::Comment(text.to_string()));
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        self.commands.push(OutputCommand::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::TextCollector;

    #[test]
    fn test_fragment_string_value_and_replay() {
        let mut builder = FragmentBuilder::new();
        builder.start_element("b", None);
        builder.attribute("id", None, "x");
        builder.text("bold", false);
        builder.end_element();
        builder.comment("ignored");
        builder.text(" tail", false);
        let fragment = builder.finish();

        assert_eq!(fragment.string_value(), "bold tail");

        let mut collector = TextCollector::new();
        fragment.replay(&mut collector);
        assert_eq!(collector.into_string(), " tail");
    }

    #[test]
    fn test_adjacent_text_is_merged() {
        let mut builder = FragmentBuilder::new();
        builder.text("a", false);
        builder.text("", false);
        builder.text("b", false);
        builder.text("<c>", true);
        let fragment = builder.finish();
        assert_eq!(fragment.commands.len(), 2);
        assert!(!fragment.is_empty());
    }
}
