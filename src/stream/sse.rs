//! Line-delimited event stream decoding (`data: {...}` lines, `[DONE]` terminator).

use serde::Deserialize;
use tracing::debug;

use super::decoder::Decoded;
use crate::constants::{SSE_DATA_PREFIX, SSE_DONE_SENTINEL};
use crate::utils::ChatResult;

/// Splits text into lines and pulls the content delta out of each event
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Text after the last newline, waiting for the rest of its line
    buffer: String,
    done: bool,
}

impl LineDecoder {
    pub fn push(&mut self, text: &str) -> Decoded {
        let mut decoded = Decoded::default();
        if self.done {
            return decoded;
        }
        self.buffer.push_str(text);

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if Self::process_line(&line, &mut decoded) {
                self.mark_done(&mut decoded);
                break;
            }
        }
        decoded
    }

    /// Treat a final unterminated line as complete
    pub fn finish(&mut self) -> Decoded {
        let mut decoded = Decoded::default();
        if self.done || self.buffer.is_empty() {
            return decoded;
        }
        let line = std::mem::take(&mut self.buffer);
        if Self::process_line(&line, &mut decoded) {
            self.mark_done(&mut decoded);
        }
        decoded
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn mark_done(&mut self, decoded: &mut Decoded) {
        self.done = true;
        self.buffer.clear();
        decoded.finished = true;
    }

    /// Returns true when the line is the terminal marker
    fn process_line(line: &str, decoded: &mut Decoded) -> bool {
        let line = line.trim_end_matches(['\n', '\r']);
        let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
            return false;
        };
        if payload.trim() == SSE_DONE_SENTINEL {
            return true;
        }

        match parse_delta(payload) {
            Ok(Some(delta)) => decoded.chunks.push(delta),
            Ok(None) => {}
            Err(e) => debug!("Skipping malformed event payload: {}", e),
        }
        false
    }
}

/// Non-empty `choices[0].delta.content` of one event payload
fn parse_delta(payload: &str) -> ChatResult<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|content| !content.is_empty()))
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_malformed_payload_is_a_decode_error() {
        assert!(matches!(
            parse_delta("{\"choices\": [oops"),
            Err(crate::utils::ChatError::Decode(_))
        ));
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap(),
            Some("hi".to_string())
        );
    }

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn sample_stream() -> String {
        let mut body = String::from(": keep-alive\n\n");
        body.push_str("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
        body.push_str(&event("Hello"));
        body.push_str(&event(", wor"));
        body.push_str("data: {not json\n\n");
        body.push_str(&event("ld!"));
        body.push_str("data: [DONE]\n\n");
        body.push_str(&event("ignored"));
        body
    }

    fn decode_in_pieces(body: &str, cuts: &[usize]) -> Decoded {
        let mut decoder = LineDecoder::default();
        let mut all = Decoded::default();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&body.len())) {
            let piece = decoder.push(&body[start..cut]);
            all.chunks.extend(piece.chunks);
            all.finished |= piece.finished;
            start = cut;
        }
        all
    }

    #[test]
    fn test_decodes_deltas_until_done() {
        let decoded = decode_in_pieces(&sample_stream(), &[]);
        assert_eq!(decoded.chunks, vec!["Hello", ", wor", "ld!"]);
        assert!(decoded.finished);
    }

    #[test]
    fn test_split_points_do_not_change_output() {
        let body = sample_stream();
        let whole = decode_in_pieces(&body, &[]);

        // every single split point, including inside "data: " and mid-payload
        for cut in 1..body.len() {
            assert_eq!(decode_in_pieces(&body, &[cut]), whole, "split at {}", cut);
        }

        let byte_by_byte: Vec<usize> = (1..body.len()).collect();
        assert_eq!(decode_in_pieces(&body, &byte_by_byte), whole);
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = LineDecoder::default();
        let decoded = decoder.push(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n\r\ndata: [DONE]\r\n",
        );
        assert_eq!(decoded.chunks, vec!["hi"]);
        assert!(decoded.finished);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = LineDecoder::default();
        let decoded = decoder.push("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
        assert!(decoded.chunks.is_empty());

        let flushed = decoder.finish();
        assert_eq!(flushed.chunks, vec!["tail"]);
        assert!(!flushed.finished);
    }

    #[test]
    fn test_nothing_decoded_after_done() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push("data: [DONE]\n").finished);
        assert!(decoder.is_done());
        assert_eq!(decoder.push(&event("late")), Decoded::default());
        assert_eq!(decoder.finish(), Decoded::default());
    }
}
