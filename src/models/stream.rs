use serde::{ Deserialize, Serialize };

pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const UI_MESSAGE_STREAM_VERSION: &str = "v1";
pub const STREAM_TERMINATOR: &str = "[DONE]";

/// One event of the UI message stream, sent as an SSE `data:` line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiMessageChunk {
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    FinishStep,
    Finish,
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

/// Ids shared by every chunk of one assistant reply.
#[derive(Debug, Clone)]
pub struct UiMessageFrame {
    pub message_id: String,
    pub text_id: String,
}

impl UiMessageFrame {
    pub fn new(message_id: String, text_id: String) -> Self {
        Self { message_id, text_id }
    }

    pub fn opening(&self) -> Vec<UiMessageChunk> {
        vec![
            UiMessageChunk::Start { message_id: self.message_id.clone() },
            UiMessageChunk::StartStep,
            UiMessageChunk::TextStart { id: self.text_id.clone() }
        ]
    }

    pub fn delta(&self, text: String) -> UiMessageChunk {
        UiMessageChunk::TextDelta { id: self.text_id.clone(), delta: text }
    }

    pub fn closing(&self) -> Vec<UiMessageChunk> {
        vec![
            UiMessageChunk::TextEnd { id: self.text_id.clone() },
            UiMessageChunk::FinishStep,
            UiMessageChunk::Finish
        ]
    }
}
