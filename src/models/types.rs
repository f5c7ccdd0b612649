use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_SESSION_TITLE, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DIALOGFLOW_MODELS,
    GEMINI_MODELS, OPENAI_MODELS, SESSION_TITLE_MAX_CHARS,
};
use crate::utils::{display_timestamp, message_id, session_id, ChatError, ChatResult};

/// Text-generation service a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Provider {
    /// Line-delimited event stream (`data: ...` lines)
    #[serde(rename = "OpenAI")]
    OpenAi,
    /// Streamed array of JSON objects
    #[default]
    Gemini,
    /// No streaming endpoint; always answered locally
    Dialogflow,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Gemini, Provider::Dialogflow];

    /// Valid model identifiers for this provider
    pub fn models(self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => OPENAI_MODELS,
            Provider::Gemini => GEMINI_MODELS,
            Provider::Dialogflow => DIALOGFLOW_MODELS,
        }
    }

    /// First catalogue entry, used whenever the provider changes
    pub fn default_model(self) -> &'static str {
        self.models()[0]
    }

    pub fn supports_model(self, model: &str) -> bool {
        self.models().contains(&model)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "OpenAI",
            Provider::Gemini => "Gemini",
            Provider::Dialogflow => "Dialogflow",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "dialogflow" => Ok(Provider::Dialogflow),
            other => Err(ChatError::Configuration(format!(
                "Unknown provider '{}'. Expected one of: openai, gemini, dialogflow",
                other
            ))),
        }
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    System,
}

/// One entry of a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    /// Grows in place while a reply streams in
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    /// For bot replies, the user message being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Message {
    /// A user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: message_id(),
            sender: Sender::User,
            text: text.into(),
            timestamp: display_timestamp(),
            error: false,
            reply_to: None,
        }
    }

    /// Empty bot reply that chunks are folded into
    pub fn placeholder_for(user: &Message) -> Self {
        Self {
            id: message_id(),
            sender: Sender::Bot,
            text: String::new(),
            timestamp: display_timestamp(),
            error: false,
            reply_to: Some(user.id.clone()),
        }
    }
}

/// Per-session generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        let provider = Provider::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Settings {
    /// Same settings on another provider, model reset to its default
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self.model = provider.default_model().to_string();
        self
    }

    /// Check the provider/model pair and the temperature range
    pub fn validate(&self) -> ChatResult<()> {
        if !self.provider.supports_model(&self.model) {
            return Err(ChatError::Configuration(format!(
                "Model '{}' is not available for {} (available: {})",
                self.model,
                self.provider,
                self.provider.models().join(", ")
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ChatError::Configuration(format!(
                "Temperature {} is outside [0, 1]",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Merge the fields present in `patch`
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(provider) = patch.provider {
            self.provider = provider;
        }
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(prompt) = &patch.system_prompt {
            self.system_prompt = prompt.clone();
        }
    }
}

/// Partial settings update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

impl SettingsPatch {
    /// Provider change together with the matching default model
    pub fn switch_provider(provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            model: Some(provider.default_model().to_string()),
            ..Self::default()
        }
    }

    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }

    pub fn system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..Self::default()
        }
    }
}

/// One independent conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub settings: Settings,
    /// The title has been taken from the first user message
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub titled: bool,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            id: session_id(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            settings,
            titled: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Take the title from the first user message, once per session.
    /// Returns whether the title changed.
    pub fn derive_title(&mut self) -> bool {
        if self.titled {
            return false;
        }
        let Some(title) = self.first_user_message().map(|m| title_from(&m.text)) else {
            return false;
        };
        self.title = title;
        self.titled = true;
        true
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.sender == Sender::User)
    }
}

/// Title derived from a message: its first characters, capped in length
pub fn title_from(text: &str) -> String {
    text.chars().take(SESSION_TITLE_MAX_CHARS).collect()
}
