//! System prompt assembly: base instructions, per-tool guidance, date.

use crate::contracts::ToolDescriptor;
use chrono::NaiveDate;

pub const DEFAULT_BASE_PROMPT: &str = "You are a helpful productivity assistant. \
Use the available tools when they help answer the user, and answer directly otherwise.";

const ATTACHMENT_GUIDANCE: &str = "**File Attachment Support:**\n\
Users may attach images, PDFs, text files (.txt, .md, .csv, .json) and documents (.doc, .docx). \
When they do, analyze them thoroughly and base your answer on their content.";

#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    base: String,
    attachments: bool,
    today: Option<NaiveDate>,
}

impl Default for SystemPromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PROMPT)
    }
}

impl SystemPromptBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            attachments: true,
            today: None,
        }
    }

    #[must_use]
    pub fn with_attachment_guidance(mut self, enabled: bool) -> Self {
        self.attachments = enabled;
        self
    }

    /// Pin the date line, mostly for tests. Defaults to the local date.
    #[must_use]
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn build(&self, tools: &[ToolDescriptor]) -> String {
        let mut sections = vec![self.base.trim().to_string()];

        if !tools.is_empty() {
            let mut listing = String::from("**Available tools:**");
            for tool in tools {
                listing.push_str(&format!("\n- `{}`: {}", tool.id, tool.description));
            }
            sections.push(listing);

            let hints: Vec<String> = tools
                .iter()
                .filter_map(|tool| {
                    tool.usage_hint
                        .as_deref()
                        .map(|hint| format!("- `{}`: {}", tool.id, hint))
                })
                .collect();
            if !hints.is_empty() {
                sections.push(format!("**When to use each tool:**\n{}", hints.join("\n")));
            }
        }

        if self.attachments {
            sections.push(ATTACHMENT_GUIDANCE.to_string());
        }

        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        sections.push(format!("Today's date is {}.", today.format("%Y-%m-%d")));

        sections.retain(|s| !s.is_empty());
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_tools_hints_and_date() {
        let tools = vec![
            ToolDescriptor::new("web_search", "Web Search", "Search the web")
                .with_usage_hint("for recent events"),
            ToolDescriptor::new("echo", "Echo", "Echo input"),
        ];
        let prompt = SystemPromptBuilder::new("Base.")
            .with_date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .build(&tools);
        assert!(prompt.starts_with("Base."));
        assert!(prompt.contains("- `web_search`: Search the web"));
        assert!(prompt.contains("**When to use each tool:**\n- `web_search`: for recent events"));
        assert!(!prompt.contains("- `echo`: Echo input\n- `echo`"));
        assert!(prompt.ends_with("Today's date is 2024-05-01."));
    }

    #[test]
    fn no_tools_no_listing() {
        let prompt = SystemPromptBuilder::new("Base.")
            .with_attachment_guidance(false)
            .with_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .build(&[]);
        assert_eq!(prompt, "Base.\n\nToday's date is 2024-01-02.");
    }
}
