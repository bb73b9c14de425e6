use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use log::info;

use crate::models::chat::{ ConversationMessage, DonorPracticeRequest };

pub const NOT_SPECIFIED: &str = "Not specified";
pub const DEFAULT_WARMTH: &str = "Neutral";
pub const DEFAULT_PRACTICE_FORMAT: &str = "Two-way conversation";

const GENERAL_ASSISTANT_INSTRUCTIONS: &str =
    "You are a helpful assistant for fundraisers and nonprofit development staff. \
Help with donor research, meeting preparation, outreach drafts, and fundraising strategy. \
Be concise, practical, and honest about what you do not know.";

const DONOR_MEETING_INSTRUCTIONS: &str =
    "You simulate donors so fundraisers can rehearse meetings. \
Follow the donor profile you are given, keep your answers realistic for that donor, \
and let the fundraiser drive the conversation unless the practice format says otherwise.";

#[derive(Debug)]
pub enum PromptError {
    IoError(String, std::io::Error),
    JsonError(String, serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(path, e) =>
                write!(f, "Failed to read instructions file '{}': {}", path, e),
            PromptError::JsonError(path, e) =>
                write!(f, "Failed to parse instructions file '{}': {}", path, e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(_, e) => Some(e),
            PromptError::JsonError(_, e) => Some(e),
        }
    }
}

/// System instructions for the two agents. Only consulted by backends that do not host them.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentInstructions {
    pub general_assistant: String,
    pub donor_meeting: String,
}

impl Default for AgentInstructions {
    fn default() -> Self {
        Self {
            general_assistant: GENERAL_ASSISTANT_INSTRUCTIONS.to_string(),
            donor_meeting: DONOR_MEETING_INSTRUCTIONS.to_string(),
        }
    }
}

/// Loads instructions from a JSON file; keys missing from the file keep their built-in text.
pub fn load_instructions(path: Option<&str>) -> Result<AgentInstructions, PromptError> {
    let Some(path) = path else {
        return Ok(AgentInstructions::default());
    };
    let content = fs
        ::read_to_string(path)
        .map_err(|e| PromptError::IoError(path.to_string(), e))?;
    let instructions: AgentInstructions = serde_json
        ::from_str(&content)
        .map_err(|e| PromptError::JsonError(path.to_string(), e))?;
    info!("Loaded agent instructions from {}", path);
    Ok(instructions)
}

pub fn donor_context_prompt(
    donor_profile: Option<&str>,
    donor_type: Option<&str>,
    warmth_factor: Option<&str>,
    practice_format: Option<&str>
) -> String {
    format!(
        "You are role-playing as a potential donor in a practice meeting with a fundraiser.\n\n\
Donor Profile: {}\n\
Donor Type: {}\n\
Warmth Factor: {}\n\
Practice Format: {}\n\n\
Stay in character as this donor for the entire conversation. Respond the way this donor \
realistically would, reflecting the warmth factor in your tone, and follow the practice format. \
Do not break character or coach the fundraiser unless asked.",
        donor_profile.unwrap_or(NOT_SPECIFIED),
        donor_type.unwrap_or(NOT_SPECIFIED),
        warmth_factor.unwrap_or(DEFAULT_WARMTH),
        practice_format.unwrap_or(DEFAULT_PRACTICE_FORMAT)
    )
}

pub fn donor_context_message(req: &DonorPracticeRequest) -> ConversationMessage {
    ConversationMessage::system(
        donor_context_prompt(
            req.donor_profile.as_deref(),
            req.donor_type.as_deref(),
            req.warmth_factor.as_deref(),
            req.practice_format.as_deref()
        )
    )
}

/// Consumes the practice request and yields the sequence sent to the agent: context first, then
/// the caller's messages in their original order.
pub fn with_donor_context(req: DonorPracticeRequest) -> Vec<ConversationMessage> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    messages.push(donor_context_message(&req));
    messages.extend(req.messages);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn all_fields_absent_use_fallbacks() {
        let prompt = donor_context_prompt(None, None, None, None);
        assert!(
            prompt.contains(
                "Donor Profile: Not specified\nDonor Type: Not specified\nWarmth Factor: Neutral\nPractice Format: Two-way conversation"
            )
        );
    }

    #[test]
    fn every_presence_combination_substitutes_exactly() {
        let values = ["Alumna, 60s", "Foundation", "Warm", "Donor asks questions"];
        let labels = ["Donor Profile", "Donor Type", "Warmth Factor", "Practice Format"];
        let fallbacks = [NOT_SPECIFIED, NOT_SPECIFIED, DEFAULT_WARMTH, DEFAULT_PRACTICE_FORMAT];

        for mask in 0u8..16 {
            let pick = |i: usize| if (mask & (1 << i)) != 0 { Some(values[i]) } else { None };
            let prompt = donor_context_prompt(pick(0), pick(1), pick(2), pick(3));
            for i in 0..4 {
                let expected = pick(i).unwrap_or(fallbacks[i]);
                let line = format!("{}: {}\n", labels[i], expected);
                assert!(prompt.contains(&line), "mask {:04b}: missing {:?}", mask, line);
            }
        }
    }

    #[test]
    fn values_are_embedded_verbatim() {
        let prompt = donor_context_prompt(Some("{donor_type} & \"quotes\""), Some(""), None, None);
        assert!(prompt.contains("Donor Profile: {donor_type} & \"quotes\"\n"));
        assert!(prompt.contains("Donor Type: \n"));
    }

    #[test]
    fn context_goes_first_and_order_is_kept() {
        let req = DonorPracticeRequest {
            warmth_factor: Some("Skeptical".into()),
            messages: vec![
                ConversationMessage::user("Hello"),
                ConversationMessage::assistant("Hi."),
                ConversationMessage::user("Can we talk about the capital campaign?")
            ],
            ..DonorPracticeRequest::default()
        };
        let messages = with_donor_context(req);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Warmth Factor: Skeptical"));
        assert_eq!(messages[1].content, "Hello");
        assert_eq!(messages[2].content, "Hi.");
        assert_eq!(messages[3].content, "Can we talk about the capital campaign?");
    }

    #[test]
    fn empty_practice_conversation_is_just_context() {
        let messages = with_donor_context(DonorPracticeRequest::default());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn instructions_default_without_file() {
        assert_eq!(load_instructions(None).unwrap(), AgentInstructions::default());
    }

    #[test]
    fn instructions_file_overrides_given_keys() {
        let path = std::env::temp_dir().join(format!("instructions-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{"donorMeeting":"Be a tough donor."}"#).unwrap();
        let loaded = load_instructions(path.to_str()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded.donor_meeting, "Be a tough donor.");
        assert_eq!(loaded.general_assistant, AgentInstructions::default().general_assistant);
    }

    #[test]
    fn instructions_file_errors_name_the_path() {
        let err = load_instructions(Some("/nonexistent/instructions.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/instructions.json"));
    }
}
