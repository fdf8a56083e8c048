//! Pure conversions from the transcript model to genai request types.

use crate::contracts::{Attachment, Message, Part, Role, ToolDescriptor, ToolInvocationState};
use genai::chat::{ChatMessage, ChatRequest, ContentPart, MessageContent, ToolResponse};
use serde_json::Value;

pub fn to_genai_tool(desc: &ToolDescriptor) -> genai::chat::Tool {
    genai::chat::Tool::new(&desc.id)
        .with_description(&desc.description)
        .with_schema(desc.parameters.clone())
}

/// Attachment types providers take as binary input.
fn is_binary_input(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    content_type.starts_with("image/")
        || content_type.starts_with("audio/")
        || content_type == "application/pdf"
}

/// Binary content part for a supported attachment. Inline `data:` URLs must be
/// base64; anything else is passed by URL.
fn attachment_part(attachment: &Attachment) -> Option<ContentPart> {
    if !is_binary_input(&attachment.content_type) {
        return None;
    }
    let name = Some(attachment.name.clone()).filter(|n| !n.is_empty());
    let Some(inline) = attachment.url.strip_prefix("data:") else {
        return Some(ContentPart::from_binary_url(
            &attachment.content_type,
            &attachment.url,
            name,
        ));
    };
    let (meta, payload) = inline.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let mime = if mime.is_empty() { attachment.content_type.as_str() } else { mime };
    Some(ContentPart::from_binary_base64(mime, payload, name))
}

/// Text stand-in for attachments the provider can't take. Inline payloads
/// stay out of the prompt.
fn attachment_descriptor(attachment: &Attachment) -> String {
    if attachment.url.starts_with("data:") {
        format!("[Attachment: {} ({})]", attachment.name, attachment.content_type)
    } else {
        format!(
            "[Attachment: {} ({}) {}]",
            attachment.name, attachment.content_type, attachment.url
        )
    }
}

fn user_content(msg: &Message) -> MessageContent {
    let mut text = msg.text();
    let mut binaries = Vec::new();
    for attachment in &msg.attachments {
        match attachment_part(attachment) {
            Some(part) => binaries.push(part),
            None => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&attachment_descriptor(attachment));
            }
        }
    }
    let mut parts = Vec::with_capacity(binaries.len() + 1);
    if !text.is_empty() || binaries.is_empty() {
        parts.push(ContentPart::from_text(text));
    }
    parts.extend(binaries);
    MessageContent::from_parts(parts)
}

/// Pending assistant segment: text followed by the tool calls issued after it.
#[derive(Default)]
struct Segment {
    text: String,
    calls: Vec<genai::chat::ToolCall>,
    responses: Vec<ToolResponse>,
}

impl Segment {
    fn flush_into(&mut self, out: &mut Vec<ChatMessage>) {
        let segment = std::mem::take(self);
        if segment.calls.is_empty() {
            if !segment.text.is_empty() {
                out.push(ChatMessage::assistant(segment.text));
            }
            return;
        }
        let mut content = MessageContent::from(segment.text.as_str());
        for call in segment.calls {
            content.push(genai::chat::ContentPart::ToolCall(call));
        }
        out.push(ChatMessage::assistant(content));
        out.extend(segment.responses.into_iter().map(ChatMessage::from));
    }
}

/// Convert one transcript message into provider messages.
///
/// An assistant message alternates text and tool invocations; each run of
/// invocations becomes an assistant tool-call message followed by its tool
/// responses. Invocations without a result are not replayed.
pub fn to_chat_messages(msg: &Message) -> Vec<ChatMessage> {
    match msg.role {
        Role::User => vec![ChatMessage::user(user_content(msg))],
        Role::Assistant => {
            let mut out = Vec::new();
            let mut segment = Segment::default();
            for part in &msg.parts {
                match part {
                    Part::Text { text } => {
                        if !segment.calls.is_empty() {
                            segment.flush_into(&mut out);
                        }
                        segment.text.push_str(text);
                    }
                    Part::ToolInvocation {
                        tool_call_id,
                        tool_name,
                        state,
                        args,
                        result,
                    } => {
                        let Some(result) = result else {
                            continue;
                        };
                        if *state < ToolInvocationState::Result {
                            continue;
                        }
                        segment.calls.push(genai::chat::ToolCall {
                            call_id: tool_call_id.clone(),
                            fn_name: tool_name.clone(),
                            fn_arguments: args.clone(),
                            thought_signatures: None,
                        });
                        segment.responses.push(ToolResponse {
                            call_id: tool_call_id.clone(),
                            content: tool_response_content(result),
                        });
                    }
                }
            }
            segment.flush_into(&mut out);
            out
        }
    }
}

pub fn tool_response_content(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the request for one step.
pub fn build_request(
    system_prompt: &str,
    history: &[Message],
    tools: &[ToolDescriptor],
) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.extend(history.iter().flat_map(to_chat_messages));

    let mut request = ChatRequest::new(messages);
    if !tools.is_empty() {
        request = request.with_tools(tools.iter().map(to_genai_tool).collect::<Vec<_>>());
    }
    request
}
