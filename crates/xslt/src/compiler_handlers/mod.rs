pub(super) mod control_flow;
pub(super) mod literals;
pub(super) mod stylesheet;
pub(super) mod template;
pub(super) mod variables;

use crate::ast::{PreparsedTemplate, XsltInstruction};
use crate::compiler::{CompilerBuilder, PendingInstruction};

// These are handlers for common/shared logic that doesn't fit neatly into one file.
// They are implemented as methods on CompilerBuilder.

impl CompilerBuilder {
    /// Completes a body-bearing instruction once its end tag has been seen.
    pub(crate) fn handle_instruction_end(&mut self, pending: PendingInstruction, body: Vec<XsltInstruction>) {
        let body = PreparsedTemplate(body);
        let instr = match pending {
            PendingInstruction::Constructor(instr) => {
                let mut instr = *instr;
                match &mut instr {
                    XsltInstruction::LiteralElement { body: slot, .. }
                    | XsltInstruction::Element { body: slot, .. }
                    | XsltInstruction::Attribute { body: slot, .. } => *slot = body,
                    _ => {}
                }
                instr
            }
            PendingInstruction::Comment => XsltInstruction::Comment { body },
            PendingInstruction::ProcessingInstruction(name) => {
                XsltInstruction::ProcessingInstruction { name, body }
            }
            PendingInstruction::Copy { use_attribute_sets } => XsltInstruction::Copy {
                use_attribute_sets,
                body,
            },
            PendingInstruction::If { test } => XsltInstruction::If { test, body },
            PendingInstruction::Message { terminate } => XsltInstruction::Message { body, terminate },
        };
        self.push_instruction(instr);
    }
}

/// Splits a whitespace-separated list of names, as used by `use-attribute-sets`.
pub(crate) fn name_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
