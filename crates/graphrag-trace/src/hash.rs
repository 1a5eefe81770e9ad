//! BLAKE3 content hashing for tamper evidence.

use serde::Serialize;

use crate::{RunTrace, TraceEvent, TraceId, Transition};

/// Hashable view of a trace (excludes content_hash).
#[derive(Serialize)]
struct HashableTrace<'a> {
    id: &'a TraceId,
    session_id: &'a str,
    question: &'a str,
    transitions: &'a [Transition],
    events: &'a [TraceEvent],
    status: &'a Option<String>,
    started_at: &'a chrono::DateTime<chrono::Utc>,
    completed_at: &'a Option<chrono::DateTime<chrono::Utc>>,
}

/// Serialize all fields except `content_hash` to JSON and hash with BLAKE3.
///
/// Returns the hex-encoded hash.
pub fn compute_trace_hash(trace: &RunTrace) -> String {
    let hashable = HashableTrace {
        id: &trace.id,
        session_id: &trace.session_id,
        question: &trace.question,
        transitions: &trace.transitions,
        events: &trace.events,
        status: &trace.status,
        started_at: &trace.started_at,
        completed_at: &trace.completed_at,
    };

    // Plain structs of strings, timestamps and JSON values always serialize.
    let bytes = serde_json::to_vec(&hashable).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
