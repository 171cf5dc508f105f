//! Prompt templates with a single content placeholder.

use crate::error::IngestError;

pub const CONTENT_PLACEHOLDER: &str = "{{content}}";

/// A prompt with exactly one [`CONTENT_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    before: String,
    after: String,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self, IngestError> {
        if template.trim().is_empty() {
            return Err(IngestError::MissingPrompt(String::new()));
        }

        let count = template.matches(CONTENT_PLACEHOLDER).count();
        if count != 1 {
            return Err(IngestError::InvalidTemplate(count));
        }

        let (before, after) = template
            .split_once(CONTENT_PLACEHOLDER)
            .ok_or(IngestError::InvalidTemplate(0))?;

        Ok(Self {
            before: before.to_string(),
            after: after.to_string(),
        })
    }

    /// Substitute the file content. Placeholder text inside the content is
    /// left as-is.
    pub fn render(&self, content: &str) -> String {
        let mut prompt = String::with_capacity(self.before.len() + content.len() + self.after.len());
        prompt.push_str(&self.before);
        prompt.push_str(content);
        prompt.push_str(&self.after);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_content() {
        let template = PromptTemplate::new("分析：\n{{content}}\n结束").unwrap();
        assert_eq!(template.render("# 红烧肉"), "分析：\n# 红烧肉\n结束");
    }

    #[test]
    fn test_content_containing_placeholder_is_not_resubstituted() {
        let template = PromptTemplate::new("[{{content}}]").unwrap();
        assert_eq!(template.render("a {{content}} b"), "[a {{content}} b]");
    }

    #[test]
    fn test_rejects_missing_or_duplicate_placeholder() {
        assert!(matches!(
            PromptTemplate::new("no placeholder"),
            Err(IngestError::InvalidTemplate(0))
        ));
        assert!(matches!(
            PromptTemplate::new("{{content}} and {{content}}"),
            Err(IngestError::InvalidTemplate(2))
        ));
        assert!(matches!(
            PromptTemplate::new("   "),
            Err(IngestError::MissingPrompt(_))
        ));
    }
}
