/// Streaming module - Gateway
///
/// Turns provider responses into ordered text chunks delivered through
/// [`StreamSink`]. Each provider is a variant picked by `Settings::provider`.

mod decoder;
mod json_objects;
mod local;
mod orchestrator;
mod providers;
mod sse;
mod transport;

pub use decoder::{ChunkDecoder, Decoded};
pub use local::{LocalPacing, LocalResponder};
pub use orchestrator::{StreamOrchestrator, StreamSink};
pub use providers::ProviderConfig;
pub use transport::{error_message, ByteStream, HttpRequest, HttpTransport, Transport};

#[cfg(test)]
pub(crate) use transport::fake;
