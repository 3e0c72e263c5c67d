//! Prompt templates with `{name}` placeholders.
//!
//! Placeholders follow the familiar `str.format` style: `{name}` is replaced,
//! `{{` and `}}` produce literal braces (handy for JSON examples inside the
//! template), and a placeholder with no matching value is left as written.

/// Placeholder for the message text or caption.
pub const TEXT_CONTENT: &str = "text_content";
/// Placeholder for text extracted from an attached document.
pub const FILE_CONTENT: &str = "file_content";
/// Placeholder for the destination table's column names, comma-joined.
pub const COLUMN_NAMES: &str = "column_names";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fills the template with `values`, looked up by placeholder name.
    pub fn fill(&self, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }

            if tail.starts_with('{') {
                if let Some(end) = tail.find('}') {
                    let name = &tail[1..end];
                    if let Some((_, value)) = values.iter().find(|(key, _)| *key == name) {
                        out.push_str(value);
                        rest = &tail[end + 1..];
                        continue;
                    }
                }
            }

            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }

        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_known_placeholders() {
        let template = PromptTemplate::new("Product: {text_content}\nColumns: {column_names}");
        let prompt = template.fill(&[
            (TEXT_CONTENT, "Saucony Kinvara 14 man 41 yellow/black"),
            (COLUMN_NAMES, "brand,model,sex,color,size,price"),
        ]);
        assert_eq!(
            prompt,
            "Product: Saucony Kinvara 14 man 41 yellow/black\nColumns: brand,model,sex,color,size,price"
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = PromptTemplate::new(r#"Answer like {{"brand": "..."}} for {text_content}"#);
        assert_eq!(
            template.fill(&[(TEXT_CONTENT, "shoes")]),
            r#"Answer like {"brand": "..."} for shoes"#
        );
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let template = PromptTemplate::new("{text_content} {unknown} {");
        assert_eq!(template.fill(&[(TEXT_CONTENT, "x")]), "x {unknown} {");
    }

    #[test]
    fn values_are_not_expanded_again() {
        let template = PromptTemplate::new("{text_content}");
        assert_eq!(
            template.fill(&[(TEXT_CONTENT, "{file_content}"), (FILE_CONTENT, "oops")]),
            "{file_content}"
        );
    }
}
