use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::decoder::ChunkDecoder;
use super::local::LocalResponder;
use super::providers::ProviderConfig;
use super::transport::{ByteStream, HttpRequest, Transport};
use crate::models::{Message, Provider, Settings};
use crate::utils::{ChatError, ChatResult};

/// Receiver of one streamed reply
///
/// For every stream, either `on_error` or `on_complete` is called exactly
/// once and nothing is called after it. Chunks arrive in source order.
pub trait StreamSink: Send + Sync {
    fn on_chunk(&self, chunk: &str);
    fn on_complete(&self);
    fn on_error(&self, error: ChatError);
}

/// Wraps a sink so terminal hooks fire at most once and close it
struct Hooks {
    sink: Arc<dyn StreamSink>,
    closed: bool,
}

impl Hooks {
    fn new(sink: Arc<dyn StreamSink>) -> Self {
        Self { sink, closed: false }
    }

    fn chunk(&mut self, text: &str) {
        if !self.closed {
            self.sink.on_chunk(text);
        }
    }

    fn complete(&mut self) {
        if !self.closed {
            self.closed = true;
            self.sink.on_complete();
        }
    }

    fn error(&mut self, error: ChatError) {
        if !self.closed {
            self.closed = true;
            self.sink.on_error(error);
        }
    }
}

/// How a particular request will be served
enum Plan {
    Local,
    Remote {
        request: HttpRequest,
        decoder: ChunkDecoder,
    },
}

/// Routes a conversation to its provider and streams the reply into a sink
pub struct StreamOrchestrator {
    providers: ProviderConfig,
    transport: Arc<dyn Transport>,
    local: LocalResponder,
}

impl StreamOrchestrator {
    pub fn new(providers: ProviderConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            providers,
            transport,
            local: LocalResponder::default(),
        }
    }

    pub fn with_local_responder(mut self, local: LocalResponder) -> Self {
        self.local = local;
        self
    }

    /// Start streaming a reply in the background.
    ///
    /// Configuration problems are reported through `on_error` before this
    /// returns, without any network call; everything else happens on the
    /// spawned task.
    pub fn stream(
        self: &Arc<Self>,
        history: Vec<Message>,
        settings: Settings,
        sink: Arc<dyn StreamSink>,
    ) -> JoinHandle<()> {
        let mut hooks = Hooks::new(sink);
        match self.plan(&history, &settings) {
            Err(e) => {
                hooks.error(e);
                tokio::spawn(async {})
            }
            Ok(plan) => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.execute(plan, &history, &mut hooks).await })
            }
        }
    }

    /// Stream a reply on the current task, returning once a terminal hook has fired
    pub async fn run(&self, history: &[Message], settings: &Settings, sink: Arc<dyn StreamSink>) {
        let mut hooks = Hooks::new(sink);
        match self.plan(history, settings) {
            Err(e) => hooks.error(e),
            Ok(plan) => self.execute(plan, history, &mut hooks).await,
        }
    }

    fn plan(&self, history: &[Message], settings: &Settings) -> ChatResult<Plan> {
        if !self.providers.any_configured() || settings.provider == Provider::Dialogflow {
            debug!("Answering locally for provider {}", settings.provider);
            return Ok(Plan::Local);
        }

        let request = self.providers.build_request(history, settings)?;
        let decoder = ChunkDecoder::for_provider(settings.provider).ok_or_else(|| {
            ChatError::Configuration(format!("{} has no streaming decoder", settings.provider))
        })?;
        Ok(Plan::Remote { request, decoder })
    }

    async fn execute(&self, plan: Plan, history: &[Message], hooks: &mut Hooks) {
        match plan {
            Plan::Local => self.respond_locally(history, hooks).await,
            Plan::Remote { request, decoder } => {
                info!("Streaming reply from {}", request.redacted_url);
                match self.transport.post(request).await {
                    Ok(body) => Self::pump(body, decoder, hooks).await,
                    Err(e) => hooks.error(e),
                }
            }
        }
    }

    /// Feed the body through the decoder until a terminal condition
    async fn pump(mut body: ByteStream, mut decoder: ChunkDecoder, hooks: &mut Hooks) {
        while let Some(next) = body.next().await {
            match next {
                Ok(bytes) => {
                    let decoded = decoder.feed(&bytes);
                    for chunk in &decoded.chunks {
                        hooks.chunk(chunk);
                    }
                    if decoded.finished {
                        debug!("Terminal marker received");
                        hooks.complete();
                        return;
                    }
                }
                Err(e) => {
                    hooks.error(e);
                    return;
                }
            }
        }

        // End of data without a terminal marker still counts as completion
        let tail = decoder.finish();
        for chunk in &tail.chunks {
            hooks.chunk(chunk);
        }
        hooks.complete();
    }

    async fn respond_locally(&self, history: &[Message], hooks: &mut Hooks) {
        let pacing = &self.local.pacing;
        tokio::time::sleep(pacing.initial_delay).await;

        let text = match self.local.respond(history) {
            Ok(text) => text,
            Err(e) => {
                hooks.error(e);
                return;
            }
        };
        for (index, slice) in self.local.slices(&text).iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(pacing.slice_delay).await;
            }
            hooks.chunk(slice);
        }
        hooks.complete();
    }
}
