use serde_json::{json, Value};
use tracing::warn;

use super::transport::HttpRequest;
use crate::constants::{
    DEFAULT_GEMINI_BASE_URL, DEFAULT_OPENAI_BASE_URL, GEMINI_HISTORY_WINDOW, GEMINI_TOP_K,
    GEMINI_TOP_P, OPENAI_FALLBACK_MODEL,
};
use crate::models::{Message, Provider, Sender, Settings};
use crate::utils::{ChatError, ChatResult};

/// Credentials and endpoints for the remote providers
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl ProviderConfig {
    /// True when at least one remote provider has a credential
    pub fn any_configured(&self) -> bool {
        self.openai_api_key.is_some() || self.gemini_api_key.is_some()
    }

    /// Shape the request for `settings.provider`, or fail without touching the network
    pub fn build_request(&self, history: &[Message], settings: &Settings) -> ChatResult<HttpRequest> {
        match settings.provider {
            Provider::OpenAi => {
                let key = self.openai_api_key.as_deref().ok_or_else(|| {
                    ChatError::Configuration(
                        "OpenAI API key not configured. Please set OPENAI_API_KEY.".to_string(),
                    )
                })?;
                Ok(openai_request(&self.openai_base_url, key, history, settings))
            }
            Provider::Gemini => {
                let key = self.gemini_api_key.as_deref().ok_or_else(|| {
                    ChatError::Configuration(
                        "Gemini API key not configured. Please set GEMINI_API_KEY.".to_string(),
                    )
                })?;
                gemini_request(&self.gemini_base_url, key, history, settings)
            }
            Provider::Dialogflow => Err(ChatError::Configuration(
                "Dialogflow has no streaming endpoint".to_string(),
            )),
        }
    }
}

/// Messages worth sending back to a provider: no failed replies, no empty placeholders
fn conversation(history: &[Message]) -> impl Iterator<Item = &Message> {
    history
        .iter()
        .filter(|m| !m.error && !(m.sender == Sender::Bot && m.text.is_empty()))
}

/// Model name the provider will accept. Unknown OpenAI models fall back to
/// the cheaper chat model, anything else to the provider default.
fn catalogue_model(provider: Provider, model: &str) -> String {
    if provider.supports_model(model) {
        model.to_string()
    } else {
        let fallback = match provider {
            Provider::OpenAi => OPENAI_FALLBACK_MODEL,
            _ => provider.default_model(),
        };
        warn!("Model {} not available for {}, using {}", model, provider, fallback);
        fallback.to_string()
    }
}

fn openai_request(base_url: &str, api_key: &str, history: &[Message], settings: &Settings) -> HttpRequest {
    let mut messages = vec![json!({"role": "system", "content": settings.system_prompt})];
    messages.extend(conversation(history).filter_map(|msg| {
        let role = match msg.sender {
            Sender::User => "user",
            Sender::Bot => "assistant",
            Sender::System => return None,
        };
        Some(json!({"role": role, "content": msg.text}))
    }));

    let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
    HttpRequest {
        redacted_url: url.clone(),
        url,
        headers: vec![("Authorization".to_string(), format!("Bearer {}", api_key))],
        body: json!({
            "model": catalogue_model(Provider::OpenAi, &settings.model),
            "messages": messages,
            "temperature": settings.temperature,
            "stream": true,
        }),
    }
}

fn gemini_request(
    base_url: &str,
    api_key: &str,
    history: &[Message],
    settings: &Settings,
) -> ChatResult<HttpRequest> {
    if history.last().map(|m| m.sender) != Some(Sender::User) {
        return Err(ChatError::Configuration("No user message found".to_string()));
    }

    let turns: Vec<&Message> = conversation(history)
        .filter(|m| m.sender != Sender::System)
        .collect();
    let window = &turns[turns.len().saturating_sub(GEMINI_HISTORY_WINDOW)..];
    let contents: Vec<Value> = window
        .iter()
        .map(|msg| {
            let role = if msg.sender == Sender::User { "user" } else { "model" };
            json!({"role": role, "parts": [{"text": msg.text}]})
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": settings.temperature,
            "topP": GEMINI_TOP_P,
            "topK": GEMINI_TOP_K,
        },
    });
    if !settings.system_prompt.trim().is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": settings.system_prompt}]});
    }

    let model = catalogue_model(Provider::Gemini, &settings.model);
    let endpoint = format!(
        "{}/v1beta/models/{}:streamGenerateContent",
        base_url.trim_end_matches('/'),
        model
    );
    Ok(HttpRequest {
        url: format!("{}?key={}", endpoint, api_key),
        redacted_url: format!("{}?key=API_KEY_HIDDEN", endpoint),
        headers: Vec::new(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> ProviderConfig {
        ProviderConfig {
            openai_api_key: Some("sk-test".to_string()),
            gemini_api_key: Some("g-test".to_string()),
            ..ProviderConfig::default()
        }
    }

    fn history() -> Vec<Message> {
        let first = Message::user("Hi");
        let mut reply = Message::placeholder_for(&first);
        reply.text = "Hello!".to_string();
        let second = Message::user("Tell me more");
        let mut failed = Message::placeholder_for(&second);
        failed.text = "Error: boom".to_string();
        failed.error = true;
        let third = Message::user("Again");
        vec![first, reply, second, failed, third]
    }

    #[test]
    fn test_openai_request_shape() {
        let settings = Settings::default().with_provider(Provider::OpenAi);
        let request = config().build_request(&history(), &settings).unwrap();

        assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            request.headers,
            vec![("Authorization".to_string(), "Bearer sk-test".to_string())]
        );
        assert_eq!(request.body["model"], "gpt-4");
        assert_eq!(request.body["stream"], true);

        let roles: Vec<&str> = request.body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        // error-flagged reply is not replayed
        assert_eq!(roles, vec!["system", "user", "assistant", "user", "user"]);
    }

    #[test]
    fn test_unknown_openai_model_falls_back_to_chat_model() {
        let settings = Settings {
            model: "gpt-5-imaginary".to_string(),
            ..Settings::default().with_provider(Provider::OpenAi)
        };
        let request = config().build_request(&history(), &settings).unwrap();
        assert_eq!(request.body["model"], "gpt-3.5-turbo");
    }

    #[test]
    fn test_gemini_request_shape() {
        let settings = Settings::default();
        let request = config().build_request(&history(), &settings).unwrap();

        assert!(request
            .url
            .ends_with("/v1beta/models/gemini-2.5-flash:streamGenerateContent?key=g-test"));
        assert!(!request.redacted_url.contains("g-test"));
        assert!(request.headers.is_empty());

        let body = &request.body;
        assert_eq!(body["contents"].as_array().unwrap().len(), 4);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][3]["parts"][0]["text"], "Again");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert!(body.get("systemInstruction").is_some());
    }

    #[test]
    fn test_gemini_keeps_last_ten_turns_and_skips_blank_prompt() {
        let history: Vec<Message> = (0..14).map(|i| Message::user(format!("m{}", i))).collect();
        let settings = Settings {
            system_prompt: "   ".to_string(),
            model: "gemini-unknown".to_string(),
            ..Settings::default()
        };
        let request = config().build_request(&history, &settings).unwrap();

        let contents = request.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 10);
        assert_eq!(contents[0]["parts"][0]["text"], "m4");
        assert!(request.body.get("systemInstruction").is_none());
        assert!(request.url.contains("/models/gemini-2.5-flash:"));
    }

    #[test]
    fn test_gemini_requires_trailing_user_message() {
        let mut history = history();
        history.pop();
        let err = config().build_request(&history, &Settings::default()).unwrap_err();
        assert_eq!(err, ChatError::Configuration("No user message found".to_string()));
    }

    #[test]
    fn test_missing_credentials() {
        let config = ProviderConfig {
            gemini_api_key: Some("g".to_string()),
            ..ProviderConfig::default()
        };
        assert!(config.any_configured());

        let settings = Settings::default().with_provider(Provider::OpenAi);
        let err = config.build_request(&history(), &settings).unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(!ProviderConfig::default().any_configured());
    }
}
