//! Plain-text rendering of transcript messages and the content panel.

use parley_client::{PanelState, SessionStatus};
use parley_contract::{Message, Part, ToolInvocationState};
use serde_json::Value;

const RESULT_PREVIEW_CHARS: usize = 80;

fn state_label(state: ToolInvocationState) -> &'static str {
    match state {
        ToolInvocationState::PartialCall => "preparing",
        ToolInvocationState::Call => "running",
        ToolInvocationState::Result => "done",
        ToolInvocationState::Error => "failed",
    }
}

fn compact(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() <= RESULT_PREVIEW_CHARS {
        rendered
    } else {
        let head: String = rendered.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

/// One line per tool invocation, e.g. `[web_search: done] {"results":...}`.
pub fn tool_line(part: &Part) -> Option<String> {
    let Part::ToolInvocation {
        tool_name,
        state,
        result,
        ..
    } = part
    else {
        return None;
    };
    let mut line = format!("[{tool_name}: {}]", state_label(*state));
    if let Some(result) = result {
        line.push(' ');
        line.push_str(&compact(result));
    }
    Some(line)
}

/// Render every part of `message` in order.
pub fn render_message(message: &Message, show_tools: bool) -> String {
    let mut out = String::new();
    for part in &message.parts {
        let chunk = match part {
            Part::Text { text } => text.clone(),
            Part::ToolInvocation { .. } if show_tools => match tool_line(part) {
                Some(line) => format!("\n{line}\n"),
                None => continue,
            },
            Part::ToolInvocation { .. } => continue,
        };
        out.push_str(&chunk);
    }
    out
}

pub fn render_panel(state: &PanelState) -> Option<String> {
    let item = state.item.as_ref().filter(|_| state.open)?;
    let rule = "-".repeat(40);
    Some(format!(
        "{rule}\n{title} ({kind})\n{rule}\n{content}\n{rule}",
        title = item.title,
        kind = item.item_type.label(item.language.as_deref()),
        content = item.content,
    ))
}

pub fn status_line(status: SessionStatus, error: Option<&str>) -> Option<String> {
    match status {
        SessionStatus::Error => Some(format!("error: {}", error.unwrap_or("unknown failure"))),
        _ => None,
    }
}

/// Tracks how much of a streaming reply has been written so far.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: String,
}

impl StreamPrinter {
    /// Text to append for the latest render. Returns `None` when earlier
    /// output was rewritten and cannot be extended.
    pub fn advance(&mut self, rendered: &str) -> Option<String> {
        let tail = rendered.strip_prefix(self.printed.as_str())?;
        if tail.is_empty() {
            return None;
        }
        let tail = tail.to_string();
        self.printed = rendered.to_string();
        Some(tail)
    }

    /// Whatever the final render adds; a full reprint if it diverged.
    pub fn finish(&mut self, rendered: &str) -> String {
        let out = match rendered.strip_prefix(self.printed.as_str()) {
            Some(tail) => tail.to_string(),
            None => format!("\n{rendered}"),
        };
        self.printed.clear();
        out
    }
}
