use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::constants::{ERROR_TEXT_PREFIX, RETRY_DELAY_MS};
use crate::models::{Message, Session, Settings, SettingsPatch};
use crate::session::SessionStore;
use crate::stream::{StreamOrchestrator, StreamSink};
use crate::utils::ChatError;

/// Loading and error state shown alongside the conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerStatus {
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Everything a UI needs to render the chat
#[derive(Debug, Clone)]
pub struct ChatView {
    pub sessions: Vec<Session>,
    pub active_session_id: Option<String>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub settings: Settings,
}

/// Folds one streamed reply into its placeholder message
struct ReplySink {
    store: Arc<SessionStore>,
    status: Arc<watch::Sender<ControllerStatus>>,
    session_id: String,
    message_id: String,
}

impl StreamSink for ReplySink {
    fn on_chunk(&self, chunk: &str) {
        if !self.store.append_chunk(&self.session_id, &self.message_id, chunk) {
            debug!(
                "Dropping chunk for {} in {}: message no longer exists",
                self.message_id, self.session_id
            );
        }
    }

    fn on_complete(&self) {
        self.status.send_modify(|status| status.is_loading = false);
    }

    fn on_error(&self, error: ChatError) {
        warn!("Reply failed: {}", error);
        let message = error.detail().to_string();
        self.store.fail_message(
            &self.session_id,
            &self.message_id,
            &format!("{}{}", ERROR_TEXT_PREFIX, message),
        );
        self.status.send_modify(|status| {
            status.is_loading = false;
            status.error = Some(message);
        });
    }
}

/// Drives send/retry for the active session
///
/// Only one reply should be streaming per session at a time. Nothing here
/// enforces that: callers are expected to hold off on `send` while
/// `status().is_loading` is true.
pub struct ConversationController {
    store: Arc<SessionStore>,
    orchestrator: Arc<StreamOrchestrator>,
    status: Arc<watch::Sender<ControllerStatus>>,
    retry_delay: Duration,
}

impl ConversationController {
    pub fn new(store: Arc<SessionStore>, orchestrator: Arc<StreamOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
            status: Arc::new(watch::channel(ControllerStatus::default()).0),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.subscribe()
    }

    /// Submit a user turn to the active session and stream the reply into it.
    ///
    /// Resolves once the reply has completed or failed. Does nothing when
    /// there is no active session or the text is blank.
    pub async fn send(&self, text: &str) {
        let Some(session) = self.store.active_session() else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let user = Message::user(text);
        let placeholder = Message::placeholder_for(&user);
        let message_id = placeholder.id.clone();

        let mut history = session.messages;
        history.push(user.clone());
        self.store.push_messages(&session.id, vec![user, placeholder]);
        self.status.send_replace(ControllerStatus {
            is_loading: true,
            error: None,
        });

        let sink = Arc::new(ReplySink {
            store: Arc::clone(&self.store),
            status: Arc::clone(&self.status),
            session_id: session.id,
            message_id,
        });
        let handle = self
            .orchestrator
            .stream(history, session.settings, sink.clone());
        if let Err(e) = handle.await {
            sink.on_error(ChatError::Transport(format!("Stream task failed: {}", e)));
        }
    }

    /// Replay the most recent user turn after dropping its failed reply
    pub async fn retry(&self) {
        let Some(session_id) = self.store.active_session_id() else {
            return;
        };
        let Some(text) = self.store.take_last_turn(&session_id) else {
            return;
        };
        // let observers settle on the trimmed history first
        tokio::time::sleep(self.retry_delay).await;
        self.send(&text).await;
    }

    pub fn clear_chat(&self) {
        if let Some(id) = self.store.active_session_id() {
            self.store.clear(&id);
        }
    }

    pub fn update_settings(&self, patch: &SettingsPatch) {
        if let Some(id) = self.store.active_session_id() {
            self.store.update_settings(&id, patch);
        }
    }

    pub fn start_new_chat(&self) -> String {
        self.store.new_session()
    }

    pub fn switch_chat(&self, session_id: &str) -> bool {
        self.store.switch_to(session_id)
    }

    pub fn delete_chat(&self, session_id: &str) -> bool {
        self.store.delete(session_id)
    }

    pub fn view(&self) -> ChatView {
        let state = self.store.state();
        let status = self.status();
        let active = state.active();
        ChatView {
            sessions: state.sessions.clone(),
            active_session_id: state.active_session_id.clone(),
            messages: active.map(|s| s.messages.clone()).unwrap_or_default(),
            is_loading: status.is_loading,
            error: status.error,
            settings: active
                .map(|s| s.settings.clone())
                .unwrap_or_else(|| self.store.defaults().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Provider, Sender};
    use crate::session::MemoryStore;
    use crate::stream::fake::ScriptedTransport;
    use crate::stream::{LocalPacing, LocalResponder, ProviderConfig};
    use pretty_assertions::assert_eq;

    fn sse(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn controller(transport: Arc<ScriptedTransport>) -> ConversationController {
        let providers = ProviderConfig {
            openai_api_key: Some("sk-test".to_string()),
            ..ProviderConfig::default()
        };
        let store = Arc::new(SessionStore::load(
            Arc::new(MemoryStore::new()),
            Settings::default().with_provider(Provider::OpenAi),
        ));
        let orchestrator = Arc::new(StreamOrchestrator::new(providers, transport));
        ConversationController::new(store, orchestrator)
    }

    #[tokio::test]
    async fn test_reply_is_concatenation_of_chunks() {
        for pieces in [
            vec!["Hello", ", ", "world"],
            vec!["a"],
            vec!["multi\nline", " {json}", " \"quoted\""],
        ] {
            let mut body: String = pieces.iter().map(|p| sse(p)).collect();
            body.push_str("data: [DONE]\n\n");
            let transport = Arc::new(ScriptedTransport::new().respond_with(&[&body]));
            let controller = controller(transport);

            controller.send("hi").await;

            let view = controller.view();
            assert_eq!(view.messages.len(), 2);
            assert_eq!(view.messages[1].text, pieces.concat());
            assert_eq!(view.messages[1].reply_to.as_deref(), Some(view.messages[0].id.as_str()));
            assert!(!view.is_loading);
            assert_eq!(view.error, None);
        }
    }

    #[tokio::test]
    async fn test_first_reply_titles_the_session() {
        let body = format!("{}data: [DONE]\n\n", sse("sure"));
        let transport = Arc::new(ScriptedTransport::new().respond_with(&[&body]));
        let controller = controller(transport);

        controller
            .send("Please explain the borrow checker in detail")
            .await;

        let state = controller.store().state();
        assert_eq!(state.active().unwrap().title, "Please explain the borrow chec");
    }

    #[tokio::test]
    async fn test_transport_error_tags_exactly_one_reply() {
        let transport = Arc::new(
            ScriptedTransport::new().fail_with(ChatError::Transport("Rate limit reached".to_string())),
        );
        let controller = controller(transport);

        controller.send("hi").await;

        let view = controller.view();
        let failed: Vec<&Message> = view.messages.iter().filter(|m| m.error).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].sender, Sender::Bot);
        assert_eq!(failed[0].text, "Error: Rate limit reached");
        assert!(!view.is_loading);
        assert_eq!(view.error.as_deref(), Some("Rate limit reached"));
        // no chunk arrived, so the title is untouched
        assert_eq!(controller.store().state().active().unwrap().title, "New Chat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_replays_original_text() {
        let body = format!("{}data: [DONE]\n\n", sse("recovered"));
        let transport = Arc::new(
            ScriptedTransport::new()
                .fail_with(ChatError::Transport("boom".to_string()))
                .respond_with(&[&body]),
        );
        let controller = controller(transport.clone());

        controller.send("  what went wrong?  ").await;
        assert!(controller.status().error.is_some());

        controller.retry().await;

        let view = controller.view();
        let texts: Vec<(Sender, String, bool)> = view
            .messages
            .iter()
            .map(|m| (m.sender, m.text.clone(), m.error))
            .collect();
        assert_eq!(
            texts,
            vec![
                (Sender::User, "  what went wrong?  ".to_string(), false),
                (Sender::Bot, "recovered".to_string(), false),
            ]
        );
        assert_eq!(view.error, None);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body["messages"], requests[1].body["messages"]);
    }

    #[tokio::test]
    async fn test_retry_without_user_message_is_a_noop() {
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller(transport.clone());
        controller.retry().await;
        assert!(transport.requests().is_empty());
        assert!(controller.view().messages.is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller(transport.clone());
        controller.send("   ").await;
        assert!(controller.view().messages.is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_surfaces_as_error_reply() {
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller(transport.clone());
        controller.update_settings(&SettingsPatch::switch_provider(Provider::Gemini));

        controller.send("hi").await;

        let view = controller.view();
        assert!(view.messages[1].error);
        assert!(view.messages[1].text.starts_with("Error: Gemini API key not configured"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_responder_end_to_end() {
        let store = Arc::new(SessionStore::load(Arc::new(MemoryStore::new()), Settings::default()));
        let orchestrator = Arc::new(
            StreamOrchestrator::new(ProviderConfig::default(), Arc::new(ScriptedTransport::new()))
                .with_local_responder(LocalResponder::new(LocalPacing {
                    slice_chars: 4,
                    ..LocalPacing::default()
                })),
        );
        let controller = ConversationController::new(store, orchestrator);
        let mut status = controller.subscribe_status();

        controller.send("hey there").await;

        assert!(status.has_changed().unwrap());
        let view = controller.view();
        assert_eq!(view.messages[1].text, "Hello there! How can I assist you today?");
        assert!(!status.borrow_and_update().is_loading);
    }

    #[tokio::test]
    async fn test_pass_through_operations() {
        let body = format!("{}data: [DONE]\n\n", sse("x"));
        let transport = Arc::new(ScriptedTransport::new().respond_with(&[&body]));
        let controller = controller(transport);
        controller.send("hi").await;
        let first = controller.view().active_session_id.unwrap();

        let second = controller.start_new_chat();
        assert_eq!(controller.view().sessions.len(), 2);
        assert!(controller.switch_chat(&first));
        // the empty second chat was pruned on the way out
        assert_eq!(controller.view().sessions.len(), 1);
        assert!(!controller.delete_chat(&second));

        controller.clear_chat();
        assert!(controller.view().messages.is_empty());
        controller.update_settings(&SettingsPatch::temperature(0.1));
        assert_eq!(controller.view().settings.temperature, 0.1);
    }
}
