use colored::Colorize;
use std::collections::HashSet;
use std::io::Write;

use crate::models::Sender;
use crate::session::StoreState;

/// Writes the newest bot reply of the active session incrementally
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    /// Bot replies that existed before the current send; never printed
    existing: HashSet<String>,
    message_id: Option<String>,
    /// Bytes of the reply already written
    printed: usize,
    failed: bool,
}

impl ReplyPrinter {
    /// Start following whatever reply appears next
    pub fn reset(&mut self, state: &StoreState) {
        *self = Self::default();
        if let Some(session) = state.active() {
            self.existing = session
                .messages
                .iter()
                .filter(|m| m.sender == Sender::Bot)
                .map(|m| m.id.clone())
                .collect();
        }
    }

    /// Text not yet written for the followed reply, if any
    pub fn pending(&mut self, state: &StoreState) -> Option<String> {
        let (id, text, error) = latest_reply(state)?;
        // a retry drops the newest reply, exposing an older one
        if self.existing.contains(id) {
            return None;
        }
        if self.message_id.as_deref() != Some(id) {
            self.message_id = Some(id.to_string());
            self.printed = 0;
            self.failed = false;
        }
        if error {
            if self.failed {
                return None;
            }
            self.failed = true;
            self.printed = text.len();
            return Some(format!("\n{}", text.red()));
        }
        // the text only ever grows by appending, so `printed` stays on a char boundary
        let fresh = text.get(self.printed..).filter(|s| !s.is_empty())?.to_string();
        self.printed = text.len();
        Some(fresh)
    }

    pub fn print(&mut self, state: &StoreState) {
        if let Some(text) = self.pending(state) {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
    }
}

fn latest_reply(state: &StoreState) -> Option<(&str, &str, bool)> {
    state
        .active()?
        .messages
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Bot)
        .map(|m| (m.id.as_str(), m.text.as_str(), m.error))
}
