use parley_contract::{Message, Role};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat`: the whole transcript, newest message last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawChatRequest")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChatRequest {
    #[serde(default)]
    messages: Vec<Message>,
}

impl TryFrom<RawChatRequest> for ChatRequest {
    type Error = String;

    fn try_from(raw: RawChatRequest) -> Result<Self, Self::Error> {
        let Some(last) = raw.messages.last() else {
            return Err("messages must not be empty".to_string());
        };
        if last.role != Role::User {
            return Err("last message must be from the user".to_string());
        }
        Ok(Self {
            messages: raw.messages,
        })
    }
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// The message that opened this turn.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.last().filter(|msg| msg.role == Role::User)
    }

    /// Problems with attachments on the newest message, one line each.
    /// Attachments are forwarded regardless.
    pub fn attachment_issues(&self) -> Vec<String> {
        let Some(msg) = self.last_user_message() else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        for (idx, attachment) in msg.attachments.iter().enumerate() {
            let missing = attachment.missing_fields();
            if !missing.is_empty() {
                issues.push(format!("attachment {idx} is missing {}", missing.join(", ")));
            } else if !attachment.is_supported() {
                issues.push(format!(
                    "attachment {idx} ({}) has unsupported type {}",
                    attachment.name, attachment.content_type
                ));
            }
        }
        issues
    }
}
