//! Incremental decoding of a streamed JSON array of response objects.
//!
//! The body looks like `[{...}\r\n,{...}\r\n]` but arrives in arbitrary
//! pieces, so objects are located by brace matching before being parsed.

use serde::Deserialize;
use tracing::{debug, warn};

use super::decoder::Decoded;
use crate::constants::GEMINI_CONTINUATION_REASON;

/// Where the scanner is relative to JSON string literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    /// Just consumed a backslash inside a string
    Escaped,
}

/// Byte span `start..end` of the first complete top-level object in `buffer`
fn find_object(buffer: &str) -> Option<(usize, usize)> {
    let mut state = ScanState::Normal;
    let mut depth = 0usize;
    let mut start = None;

    for (index, ch) in buffer.char_indices() {
        state = match (state, ch) {
            (ScanState::Escaped, _) => ScanState::InString,
            (ScanState::InString, '\\') => ScanState::Escaped,
            (ScanState::InString, '"') => ScanState::Normal,
            (ScanState::InString, _) => ScanState::InString,
            (ScanState::Normal, '"') => ScanState::InString,
            (ScanState::Normal, '{') => {
                if depth == 0 {
                    start = Some(index);
                }
                depth += 1;
                ScanState::Normal
            }
            (ScanState::Normal, '}') => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        return start.map(|start| (start, index + 1));
                    }
                }
                ScanState::Normal
            }
            (ScanState::Normal, _) => ScanState::Normal,
        };
    }
    None
}

/// Pulls complete objects out of the buffered text as they become available
#[derive(Debug, Default)]
pub struct ObjectDecoder {
    buffer: String,
    /// The object at the head of the buffer failed to parse once already
    head_failed: bool,
    done: bool,
}

impl ObjectDecoder {
    pub fn push(&mut self, text: &str) -> Decoded {
        let mut decoded = Decoded::default();
        if self.done {
            return decoded;
        }
        self.buffer.push_str(text);

        loop {
            if self.strip_separators() {
                self.mark_done(&mut decoded);
                break;
            }

            let Some((start, end)) = find_object(&self.buffer) else {
                break;
            };

            match serde_json::from_str::<GenerateChunk>(&self.buffer[start..end]) {
                Ok(chunk) => {
                    self.buffer.drain(..end);
                    self.head_failed = false;
                    if chunk.collect_into(&mut decoded) {
                        self.mark_done(&mut decoded);
                        break;
                    }
                }
                Err(e) if self.head_failed => {
                    // More bytes arrived and the same span still fails: it is
                    // not partial, drop it
                    warn!(
                        "Skipping invalid response object ({}): {}",
                        e,
                        preview(&self.buffer[start..end])
                    );
                    self.buffer.drain(..end);
                    self.head_failed = false;
                }
                Err(e) => {
                    debug!("Response object did not parse yet, waiting for more data: {}", e);
                    self.buffer.drain(..start);
                    self.head_failed = true;
                    break;
                }
            }
        }
        decoded
    }

    /// Discard anything left when the transport ends
    pub fn finish(&mut self) -> Decoded {
        if !self.done && find_object(&self.buffer).is_some() {
            warn!(
                "Stream ended with an unparseable object: {}",
                preview(&self.buffer)
            );
        }
        self.buffer.clear();
        Decoded::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn mark_done(&mut self, decoded: &mut Decoded) {
        self.done = true;
        self.buffer.clear();
        decoded.finished = true;
    }

    /// Drop whitespace, `[` and `,` ahead of the next object.
    /// Returns true when the closing `]` is reached.
    fn strip_separators(&mut self) -> bool {
        loop {
            let trimmed = self.buffer.trim_start();
            let skip = self.buffer.len() - trimmed.len();
            if skip > 0 {
                self.buffer.drain(..skip);
            }
            match self.buffer.chars().next() {
                Some('[') | Some(',') => {
                    self.buffer.drain(..1);
                }
                Some(']') => return true,
                _ => return false,
            }
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateChunk {
    /// Push the text parts of the first candidate; true if it carries a terminal finish reason
    fn collect_into(self, decoded: &mut Decoded) -> bool {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return false;
        };
        if let Some(content) = candidate.content {
            decoded.chunks.extend(
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .filter(|text| !text.is_empty()),
            );
        }
        candidate
            .finish_reason
            .is_some_and(|reason| reason != GEMINI_CONTINUATION_REASON)
    }
}
