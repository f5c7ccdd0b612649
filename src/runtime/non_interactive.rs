use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::chat::ConversationController;

/// Result of a non-interactive run
#[derive(Debug, Serialize, Deserialize)]
pub struct NonInteractiveResult {
    /// The prompt that was sent
    pub prompt: String,
    /// The reply text (the error text if the reply failed)
    pub response: String,
    /// Set when the reply ended in an error
    pub error: Option<String>,
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub provider: String,
    pub model: String,
    /// Execution time in milliseconds
    pub duration_ms: u128,
}

impl NonInteractiveResult {
    pub fn print(&self) {
        match &self.error {
            Some(error) => eprintln!("{}", error.red()),
            None => println!("{}", self.response),
        }
    }
}

/// Sends a single prompt and waits for the full reply
pub struct NonInteractiveRunner {
    controller: Arc<ConversationController>,
}

impl NonInteractiveRunner {
    pub fn new(controller: Arc<ConversationController>) -> Self {
        Self { controller }
    }

    pub async fn execute(&self, prompt: &str) -> NonInteractiveResult {
        let start = Instant::now();
        self.controller.send(prompt).await;

        let view = self.controller.view();
        let reply = view.messages.last().filter(|m| m.reply_to.is_some());
        let response = reply.map(|m| m.text.clone()).unwrap_or_default();
        let error = match reply {
            Some(m) if m.error => Some(m.text.clone()),
            Some(_) => None,
            None => Some("No reply was produced".to_string()),
        };

        NonInteractiveResult {
            prompt: prompt.to_string(),
            response,
            error,
            metadata: ExecutionMetadata {
                provider: view.settings.provider.to_string(),
                model: view.settings.model,
                duration_ms: start.elapsed().as_millis(),
            },
        }
    }
}
