use crate::result_tree::ResultDocument;

/// The `text` output method: the string value of the result, unescaped.
pub(super) fn serialize(document: &ResultDocument) -> String {
    document.string_value(document.root())
}
