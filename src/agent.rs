use crate::cli::Args;
use crate::config::prompt::AgentInstructions;
use crate::llm::chat::{ new_client, BoxError, ChatClient, TokenStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ConversationMessage;

use log::{ debug, info };
use serde::Serialize;
use std::sync::Arc;

/// `agentType` value that routes a chat request to the donor meeting agent.
pub const DONOR_MEETING_AGENT_TYPE: &str = "donor-meeting";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentHandle {
    GeneralAssistant,
    DonorMeeting,
}

impl AgentHandle {
    pub fn select(agent_type: Option<&str>) -> Self {
        match agent_type {
            Some(DONOR_MEETING_AGENT_TYPE) => AgentHandle::DonorMeeting,
            _ => AgentHandle::GeneralAssistant,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AgentHandle::GeneralAssistant => "generalAssistant",
            AgentHandle::DonorMeeting => "donorMeeting",
        }
    }
}

#[derive(Clone)]
pub struct Agent {
    handle: AgentHandle,
    instructions: String,
    client: Arc<dyn ChatClient>,
}

impl Agent {
    pub fn new(handle: AgentHandle, instructions: impl Into<String>, client: Arc<dyn ChatClient>) -> Self {
        Self { handle, instructions: instructions.into(), client }
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle
    }

    pub fn model(&self) -> String {
        self.client.get_model()
    }

    /// The sequence the backend sees. Backends that do not host the agent get its instructions
    /// as a leading system message; the caller's sequence follows unchanged.
    pub fn assemble_messages(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        if self.client.hosts_instructions() || self.instructions.trim().is_empty() {
            return messages;
        }
        let mut assembled = Vec::with_capacity(messages.len() + 1);
        assembled.push(ConversationMessage::system(self.instructions.clone()));
        assembled.extend(messages);
        assembled
    }

    pub async fn stream(&self, messages: Vec<ConversationMessage>) -> Result<TokenStream, BoxError> {
        let messages = self.assemble_messages(messages);
        debug!(
            "Agent {} streaming {} messages via {:?}",
            self.handle.name(),
            messages.len(),
            self.client.get_base_url()
        );
        self.client.stream_completion(&messages).await
    }
}

pub struct AgentRegistry {
    general_assistant: Agent,
    donor_meeting: Agent,
}

impl AgentRegistry {
    pub fn new(general_assistant: Agent, donor_meeting: Agent) -> Self {
        Self { general_assistant, donor_meeting }
    }

    pub fn from_args(args: &Args, instructions: &AgentInstructions) -> Result<Self, BoxError> {
        let llm_type: LlmType = args.agent_backend
            .parse()
            .map_err(|e| format!("Invalid agent backend: {}", e))?;

        let config_for = |agent_id: &str| LlmConfig {
            llm_type,
            api_key: args.agent_api_key(),
            completion_model: args.agent_model.clone(),
            base_url: args.agent_base_url.clone(),
            agent_id: Some(agent_id.to_string()),
            request_timeout: args.agent_timeout(),
        };

        let general_client = new_client(&config_for(&args.general_agent_id))?;
        let donor_client = new_client(&config_for(&args.donor_agent_id))?;
        info!(
            "Agents configured: Backend={}, Model={}, BaseURL={}",
            llm_type,
            args.agent_model.as_deref().unwrap_or("adapter default"),
            args.agent_base_url.as_deref().unwrap_or("adapter default")
        );

        Ok(
            Self::new(
                Agent::new(
                    AgentHandle::GeneralAssistant,
                    instructions.general_assistant.clone(),
                    general_client
                ),
                Agent::new(AgentHandle::DonorMeeting, instructions.donor_meeting.clone(), donor_client)
            )
        )
    }

    pub fn resolve(&self, handle: AgentHandle) -> &Agent {
        match handle {
            AgentHandle::GeneralAssistant => &self.general_assistant,
            AgentHandle::DonorMeeting => &self.donor_meeting,
        }
    }

    pub fn agents(&self) -> [&Agent; 2] {
        [&self.general_assistant, &self.donor_meeting]
    }
}
