//! End-to-end conversation tests through the public API
//!
//! A canned transport stands in for the network; everything else (decoders,
//! store, persistence) is the real thing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use parley::{
    stream::{ByteStream, HttpRequest, LocalPacing, LocalResponder, ProviderConfig},
    ChatError, ChatResult, ConversationController, FileStore, Provider, Sender, SessionStore,
    Settings, StreamOrchestrator, Transport,
};

#[derive(Default)]
struct CannedTransport {
    bodies: Mutex<VecDeque<ChatResult<Vec<&'static str>>>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl CannedTransport {
    fn with(bodies: Vec<ChatResult<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            bodies: Mutex::new(bodies.into()),
            sent: Mutex::default(),
        })
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn post(&self, request: HttpRequest) -> ChatResult<ByteStream> {
        self.sent.lock().push(request);
        let pieces = self
            .bodies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::Transport("no canned body".to_string())))?;
        let chunks: Vec<ChatResult<Bytes>> = pieces
            .into_iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

fn gemini_keys() -> ProviderConfig {
    ProviderConfig {
        gemini_api_key: Some("g-key".to_string()),
        ..ProviderConfig::default()
    }
}

fn controller(
    dir: &std::path::Path,
    transport: Arc<CannedTransport>,
    providers: ProviderConfig,
) -> ConversationController {
    let storage = Arc::new(FileStore::new(dir).unwrap());
    let store = Arc::new(SessionStore::load(storage, Settings::default()));
    let orchestrator = StreamOrchestrator::new(providers, transport).with_local_responder(
        LocalResponder::new(LocalPacing {
            initial_delay: std::time::Duration::ZERO,
            slice_delay: std::time::Duration::ZERO,
            slice_chars: 4,
        }),
    );
    ConversationController::new(store, Arc::new(orchestrator))
}

#[tokio::test]
async fn gemini_reply_is_streamed_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    // object boundaries deliberately fall inside strings and escapes
    let transport = CannedTransport::with(vec![Ok(vec![
        "[{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Ferris is ",
        "a {crab}\"}]}}]},\n{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" \\\"mascot\\\"\"}]},",
        "\"finishReason\":\"STOP\"}]}\n]",
    ])]);

    let chat = controller(dir.path(), Arc::clone(&transport), gemini_keys());
    chat.send("Who is Ferris?").await;

    let view = chat.view();
    assert!(!view.is_loading);
    assert_eq!(view.messages.len(), 2);
    assert_eq!(view.messages[1].text, "Ferris is a {crab} \"mascot\"");
    assert!(!view.messages[1].error);

    let sent = transport.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].url.contains(":streamGenerateContent?key=g-key"));

    // a second process sees the same history
    let reopened = controller(dir.path(), CannedTransport::with(vec![]), gemini_keys());
    let view = reopened.view();
    assert_eq!(view.messages.len(), 2);
    assert_eq!(view.messages[1].text, "Ferris is a {crab} \"mascot\"");
    assert_eq!(view.sessions[0].title, "Who is Ferris?");
}

#[tokio::test]
async fn failed_reply_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let transport = CannedTransport::with(vec![
        Err(ChatError::Transport("Quota exceeded (Status: 429)".to_string())),
        Ok(vec![
            "[{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Second try\"}]}}]}]",
        ]),
    ]);

    let chat = controller(dir.path(), Arc::clone(&transport), gemini_keys());
    chat.send("hello").await;

    let view = chat.view();
    assert_eq!(view.messages[1].text, "Error: Quota exceeded (Status: 429)");
    assert!(view.messages[1].error);
    assert_eq!(view.error.as_deref(), Some("Quota exceeded (Status: 429)"));

    chat.retry().await;

    let view = chat.view();
    let senders: Vec<Sender> = view.messages.iter().map(|m| m.sender).collect();
    assert_eq!(senders, vec![Sender::User, Sender::Bot]);
    assert_eq!(view.messages[0].text, "hello");
    assert_eq!(view.messages[1].text, "Second try");
    assert!(view.error.is_none());

    let sent = transport.sent.lock().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].body, sent[1].body);
}

#[tokio::test]
async fn sessions_keep_their_own_history_and_settings() {
    let dir = tempfile::tempdir().unwrap();
    let chat = controller(dir.path(), CannedTransport::with(vec![]), ProviderConfig::default());

    // no credentials anywhere: the offline responder answers
    chat.send("hello").await;
    let first = chat.view().active_session_id.unwrap();
    assert!(chat.view().messages[1].text.starts_with("Hello"));

    let second = chat.start_new_chat();
    chat.update_settings(&parley::SettingsPatch::switch_provider(Provider::OpenAi));
    assert!(chat.view().messages.is_empty());
    assert_eq!(chat.view().settings.model, "gpt-4");

    assert!(chat.switch_chat(&first));
    // the empty chat we left is dropped
    let view = chat.view();
    assert_eq!(view.sessions.len(), 1);
    assert!(view.sessions.iter().all(|s| s.id != second));
    assert_eq!(view.settings.provider, Provider::Gemini);
    assert_eq!(view.messages.len(), 2);
}
