#[cfg(test)]
mod tests;

use anyhow::Result;

pub const TOPIC_PLACEHOLDER: &str = "{topic}";
pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Separator between retrieved chunks in the rendered context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// The phrase the default template asks the model to fall back on
pub const DONT_KNOW_INSTRUCTION: &str =
    "If you don't know the answer, simply state that you don't know.";

pub const DEFAULT_TEMPLATE: &str = "You are a bot that answers questions about {topic}, using only the context provided.
If you don't know the answer, simply state that you don't know.

{context}

Question: {question}";

/// Prompt with the topic already filled in, waiting for context and question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Build a template for `topic`. The template must contain the
    /// `{context}` and `{question}` placeholders.
    #[inline]
    pub fn new(template: &str, topic: &str) -> Result<Self> {
        if !template.contains(CONTEXT_PLACEHOLDER) || !template.contains(QUESTION_PLACEHOLDER) {
            anyhow::bail!(
                "Prompt template must contain {CONTEXT_PLACEHOLDER} and {QUESTION_PLACEHOLDER}"
            );
        }

        Ok(Self {
            template: template.replace(TOPIC_PLACEHOLDER, topic),
        })
    }

    /// The default question-answering template for `topic`
    #[inline]
    pub fn for_topic(topic: &str) -> Self {
        Self {
            template: DEFAULT_TEMPLATE.replace(TOPIC_PLACEHOLDER, topic),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill in the context (chunks joined by a blank line) and the question.
    /// Substituted text is never scanned for placeholders again.
    #[inline]
    pub fn render<'a, I>(&self, context_chunks: I, question: &str) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let context = itertools::join(context_chunks, CONTEXT_SEPARATOR);

        let mut rendered = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
        rendered.push_str(rest);

        rendered
    }
}
