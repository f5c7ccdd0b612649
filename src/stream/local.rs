use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::constants::{
    DEMO_ERROR_TRIGGER, DEMO_INITIAL_DELAY_MS, DEMO_SIMULATED_ERROR, DEMO_SLICE_CHARS,
    DEMO_SLICE_DELAY_MS,
};
use crate::models::Message;
use crate::utils::{ChatError, ChatResult};

static GREETING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(hi|hello|hey|greetings)").expect("valid regex"));
static CSS_TOPIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(css|stylesheet|style|styling)\b").expect("valid regex"));
static TIME_TOPIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(minutes?|hours?|time|60)\b").expect("valid regex"));

const GREETING_REPLY: &str = "Hello there! How can I assist you today?";
const CSS_REPLY: &str = "CSS (Cascading Style Sheets) is a language used to style web pages. \
It controls colors, fonts, spacing, and layout. Would you like to learn more about a specific CSS topic?";
const TIME_REPLY: &str = "There are 60 minutes in one hour. Time conversion: 1 hour = 60 minutes = 3,600 seconds. \
How can I help you with time conversions?";
const FALLBACK_REPLY: &str = "I'm here to help! However, I'm currently in demo mode. To use real AI responses, \
please configure an API key (OpenAI or Gemini) in your environment variables. For now, I can provide basic \
information. What would you like to know?";

/// Pacing for the emulated stream
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPacing {
    pub initial_delay: Duration,
    pub slice_delay: Duration,
    pub slice_chars: usize,
}

impl Default for LocalPacing {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEMO_INITIAL_DELAY_MS),
            slice_delay: Duration::from_millis(DEMO_SLICE_DELAY_MS),
            slice_chars: DEMO_SLICE_CHARS,
        }
    }
}

/// Deterministic offline responder used when no provider is reachable
#[derive(Debug, Clone, Default)]
pub struct LocalResponder {
    pub pacing: LocalPacing,
}

impl LocalResponder {
    pub fn new(pacing: LocalPacing) -> Self {
        Self { pacing }
    }

    /// Canned answer for the last message, or the simulated failure when it
    /// mentions the trigger word
    pub fn respond(&self, history: &[Message]) -> ChatResult<String> {
        let last = history
            .last()
            .map(|m| m.text.trim().to_lowercase())
            .unwrap_or_default();

        if last.contains(DEMO_ERROR_TRIGGER) {
            return Err(ChatError::Simulated(DEMO_SIMULATED_ERROR.to_string()));
        }

        let reply = if GREETING.is_match(&last) {
            GREETING_REPLY
        } else if CSS_TOPIC.is_match(&last) {
            CSS_REPLY
        } else if TIME_TOPIC.is_match(&last) {
            TIME_REPLY
        } else {
            FALLBACK_REPLY
        };
        Ok(reply.to_string())
    }

    /// Cut a reply into the fixed-size pieces that get streamed
    pub fn slices(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.pacing.slice_chars.max(1))
            .map(|slice| slice.iter().collect())
            .collect()
    }
}
