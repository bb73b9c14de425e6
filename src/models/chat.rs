use serde::{ Deserialize, Serialize };
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    pub agent_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DonorPracticeRequest {
    pub donor_profile: Option<String>,
    pub donor_type: Option<String>,
    pub warmth_factor: Option<String>,
    pub practice_format: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

// Clients send either plain `content` or AI SDK style `parts`.
#[derive(Deserialize)]
struct WireMessage {
    role: Role,
    content: Option<String>,
    parts: Option<Vec<WirePart>>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WirePart {
    #[serde(rename = "text")] Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestBody {
    messages: Vec<WireMessage>,
    // Anything that is not a string simply selects the default agent.
    agent_type: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DonorPracticeRequestBody {
    donor_profile: Option<String>,
    donor_type: Option<String>,
    warmth_factor: Option<String>,
    practice_format: Option<String>,
    messages: Vec<WireMessage>,
}

impl WireMessage {
    fn into_message(self, index: usize) -> Result<ConversationMessage, GatewayError> {
        let content = match (self.content, self.parts) {
            (Some(content), _) => content,
            (None, Some(parts)) =>
                parts
                    .into_iter()
                    .filter_map(|part| {
                        match part {
                            WirePart::Text { text } => Some(text),
                            WirePart::Other => None,
                        }
                    })
                    .collect::<String>(),
            (None, None) => {
                return Err(
                    GatewayError::Validation(
                        format!("message {} has neither `content` nor `parts`", index)
                    )
                );
            }
        };
        Ok(ConversationMessage { role: self.role, content })
    }
}

fn into_messages(wire: Vec<WireMessage>) -> Result<Vec<ConversationMessage>, GatewayError> {
    wire.into_iter()
        .enumerate()
        .map(|(i, m)| m.into_message(i))
        .collect()
}

pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, GatewayError> {
    let raw: ChatRequestBody = serde_json::from_slice(body)?;
    let messages = into_messages(raw.messages)?;
    if messages.is_empty() {
        return Err(GatewayError::Validation("`messages` must not be empty".to_string()));
    }
    let agent_type = raw.agent_type.as_ref().and_then(Value::as_str).map(str::to_string);
    Ok(ChatRequest { messages, agent_type })
}

/// An empty `messages` list is accepted here: the injected donor context opens the session.
pub fn parse_donor_practice_request(body: &[u8]) -> Result<DonorPracticeRequest, GatewayError> {
    let raw: DonorPracticeRequestBody = serde_json::from_slice(body)?;
    Ok(DonorPracticeRequest {
        donor_profile: raw.donor_profile,
        donor_type: raw.donor_type,
        warmth_factor: raw.warmth_factor,
        practice_format: raw.practice_format,
        messages: into_messages(raw.messages)?,
    })
}
