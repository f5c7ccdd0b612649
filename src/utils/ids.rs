use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_suffix() -> (i64, u64) {
    (
        Local::now().timestamp_millis(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed),
    )
}

/// Identifier for a new message, unique within the process and ordered by creation
pub fn message_id() -> String {
    let (millis, seq) = next_suffix();
    format!("{}-{}", millis, seq)
}

/// Identifier for a new session
pub fn session_id() -> String {
    let (millis, seq) = next_suffix();
    format!("session_{}_{}", millis, seq)
}

/// Wall-clock time formatted for display next to a message
pub fn display_timestamp() -> String {
    Local::now().format("%-I:%M:%S %p").to_string()
}
