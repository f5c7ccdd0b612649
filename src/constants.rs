/// Constants module to avoid magic numbers in the codebase

// Provider endpoints
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 600; // 10 minutes for long generations
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

// Model catalogue (first entry of each list is the provider default)
pub const OPENAI_MODELS: &[&str] = &["gpt-4", "gpt-3.5-turbo"];
pub const GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro-preview-03-25",
    "gemini-2.5-flash-preview-05-20",
];
pub const DIALOGFLOW_MODELS: &[&str] = &["dialogflow-es", "dialogflow-cx"];
/// Sent when a session names a model OpenAI's catalogue doesn't list
pub const OPENAI_FALLBACK_MODEL: &str = "gpt-3.5-turbo";

// Default session settings
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful and friendly AI assistant. Respond in markdown format.";

// Gemini generation parameters
pub const GEMINI_TOP_P: f32 = 0.95;
pub const GEMINI_TOP_K: u32 = 40;
pub const GEMINI_HISTORY_WINDOW: usize = 10;
/// Finish reason that means "more is coming", anything else ends the stream
pub const GEMINI_CONTINUATION_REASON: &str = "MAX_TOKENS";

// Line-delimited event stream
pub const SSE_DATA_PREFIX: &str = "data: ";
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

// Sessions
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";
pub const SESSION_TITLE_MAX_CHARS: usize = 30;
pub const ERROR_TEXT_PREFIX: &str = "Error: ";
pub const RETRY_DELAY_MS: u64 = 100;

// Persistence keys
pub const SESSIONS_STORAGE_KEY: &str = "chatSessions";
pub const ACTIVE_SESSION_STORAGE_KEY: &str = "activeChatSessionId";

// Local responder
pub const DEMO_SLICE_CHARS: usize = 10;
pub const DEMO_SLICE_DELAY_MS: u64 = 50;
pub const DEMO_INITIAL_DELAY_MS: u64 = 500;
pub const DEMO_ERROR_TRIGGER: &str = "error";
pub const DEMO_SIMULATED_ERROR: &str = "I've encountered a simulated error. Please try again.";
