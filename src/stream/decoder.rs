use super::json_objects::ObjectDecoder;
use super::sse::LineDecoder;
use crate::models::Provider;

/// Text increments and completion signal extracted from one network buffer
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Decoded {
    pub chunks: Vec<String>,
    /// A terminal marker was seen; nothing after it is decoded
    pub finished: bool,
}

/// Holds an incomplete trailing UTF-8 sequence until the rest arrives
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // Sequence cut at the buffer edge
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[derive(Debug)]
enum Format {
    Lines(LineDecoder),
    Objects(ObjectDecoder),
}

/// Per-stream decoder turning raw body bytes into text chunks
///
/// Owned by exactly one stream for its lifetime. Never fails: malformed
/// fragments are skipped and partial ones wait for more bytes.
#[derive(Debug)]
pub struct ChunkDecoder {
    utf8: Utf8Carry,
    format: Format,
}

impl ChunkDecoder {
    /// Decoder for `data: ` prefixed event lines
    pub fn lines() -> Self {
        Self {
            utf8: Utf8Carry::default(),
            format: Format::Lines(LineDecoder::default()),
        }
    }

    /// Decoder for a streamed array of JSON objects
    pub fn objects() -> Self {
        Self {
            utf8: Utf8Carry::default(),
            format: Format::Objects(ObjectDecoder::default()),
        }
    }

    /// Decoder matching a remote provider's wire format
    pub fn for_provider(provider: Provider) -> Option<Self> {
        match provider {
            Provider::OpenAi => Some(Self::lines()),
            Provider::Gemini => Some(Self::objects()),
            Provider::Dialogflow => None,
        }
    }

    /// Feed the next network buffer
    pub fn feed(&mut self, bytes: &[u8]) -> Decoded {
        let text = self.utf8.push(bytes);
        if text.is_empty() {
            return Decoded::default();
        }
        match &mut self.format {
            Format::Lines(decoder) => decoder.push(&text),
            Format::Objects(decoder) => decoder.push(&text),
        }
    }

    /// Flush whatever is left once the transport reports end-of-data
    pub fn finish(&mut self) -> Decoded {
        let rest = self.utf8.finish();
        let mut decoded = match &mut self.format {
            Format::Lines(decoder) => decoder.push(&rest),
            Format::Objects(decoder) => decoder.push(&rest),
        };
        if !decoded.finished {
            let tail = match &mut self.format {
                Format::Lines(decoder) => decoder.finish(),
                Format::Objects(decoder) => decoder.finish(),
            };
            decoded.chunks.extend(tail.chunks);
            decoded.finished = tail.finished;
        }
        decoded
    }

    pub fn is_done(&self) -> bool {
        match &self.format {
            Format::Lines(decoder) => decoder.is_done(),
            Format::Objects(decoder) => decoder.is_done(),
        }
    }
}
