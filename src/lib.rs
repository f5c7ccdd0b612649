pub mod app;
pub mod chat;
pub mod cli;
pub mod constants;
pub mod models;
pub mod runtime;
pub mod session;
pub mod stream;
pub mod utils;

pub use app::{load_config, Config};
pub use chat::{ChatView, ConversationController};
pub use models::{Message, Provider, Sender, Session, Settings, SettingsPatch};
pub use session::{FileStore, KeyValueStore, MemoryStore, SessionStore};
pub use stream::{StreamOrchestrator, StreamSink, Transport};
pub use utils::{ChatError, ChatResult};
