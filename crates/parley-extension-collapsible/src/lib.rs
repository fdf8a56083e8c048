//! Collapsible content extension.
//!
//! Registers the reserved [`COLLAPSIBLE_TOOL_NAME`] tool. The model calls it
//! with long content and a short summary; the client routes the call's
//! arguments to the content panel and keeps only the summary inline.

use async_trait::async_trait;
use parley_contract::{ToolCallContext, ToolError, ToolResult, TypedTool, COLLAPSIBLE_TOOL_NAME};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Longest summary accepted, in characters.
pub const MAX_SUMMARY_CHARS: usize = 100;

const DESCRIPTION: &str = "Create collapsible content sections for the side panel. Use this tool \
    to mark long code snippets or any content that would benefit from being collapsed in the \
    main chat and expanded in a side panel. Do not use this tool for raw text unless the user \
    asks for it.";

const USAGE_HINT: &str = "Long code snippets or files (more than 10 lines), large data outputs \
    or tables, configuration files, logs or structured data: anything that would clutter the \
    main chat.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CollapsibleKind {
    Code,
    Text,
    List,
    Table,
    Explanation,
    Output,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CollapsibleArgs {
    /// The type of collapsible content.
    #[serde(rename = "type")]
    pub kind: CollapsibleKind,
    /// A brief summary that will be shown in the main chat.
    #[schemars(length(min = 1, max = 100))]
    pub summary: String,
    /// The full content that will be displayed in the side panel.
    #[schemars(length(min = 1))]
    pub content: String,
    /// Optional panel title.
    #[serde(default)]
    pub title: Option<String>,
}

/// `collapsible` tool. Echoes the content back under a fresh id.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollapsibleTool;

impl CollapsibleTool {
    pub fn new() -> Self {
        Self
    }
}

/// `collapsible_<millis>_<9 random chars>`.
fn collapsible_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("collapsible_{millis}_{}", &random[..9])
}

#[async_trait]
impl TypedTool for CollapsibleTool {
    type Args = CollapsibleArgs;

    fn tool_id(&self) -> &str {
        COLLAPSIBLE_TOOL_NAME
    }

    fn name(&self) -> &str {
        "Collapsible Content"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn usage_hint(&self) -> Option<&str> {
        Some(USAGE_HINT)
    }

    fn validate(&self, args: &CollapsibleArgs) -> Result<(), String> {
        let summary_chars = args.summary.chars().count();
        if summary_chars == 0 {
            return Err("summary must not be empty".to_string());
        }
        if summary_chars > MAX_SUMMARY_CHARS {
            return Err(format!(
                "summary must be at most {MAX_SUMMARY_CHARS} characters, got {summary_chars}"
            ));
        }
        if args.content.is_empty() {
            return Err("content must not be empty".to_string());
        }
        Ok(())
    }

    async fn execute(
        &self,
        args: CollapsibleArgs,
        ctx: &ToolCallContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let id = collapsible_id();
        tracing::debug!(call_id = ctx.call_id(), %id, kind = ?args.kind, bytes = args.content.len(), "collapsible content created");
        let mut data = json!({
            "id": id,
            "type": args.kind,
            "summary": args.summary,
            "content": args.content,
        });
        if let Some(title) = args.title {
            data["title"] = json!(title);
        }
        Ok(ToolResult::success(COLLAPSIBLE_TOOL_NAME, data))
    }
}
