//! Run trace helpers for workflow runs.

use std::path::Path;

use graphrag_core::{SimilarityHit, SubgraphContext, WorkflowStatus};
use graphrag_trace::{FileTraceStore, RunTrace, TraceRecorder};
use serde_json::json;

use crate::answer::SynthesizedAnswer;

/// Record the action list produced by PLAN.
pub fn record_plan(recorder: &mut TraceRecorder, plan: &[String]) {
    recorder.event(
        "plan",
        &format!("{} planned actions", plan.len()),
        json!({ "actions": plan }),
        true,
    );
}

/// Record what retrieval found, and whether it degraded.
pub fn record_retrieval(
    recorder: &mut TraceRecorder,
    hits: &[SimilarityHit],
    context: &SubgraphContext,
    degraded: Option<&str>,
) {
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    recorder.event(
        "similarity_search",
        &format!("{} similar entities", hits.len()),
        json!({ "hits": ids, "degraded": degraded }),
        degraded.is_none(),
    );
    recorder.event(
        "expand_traversal",
        &format!(
            "{} entities, {} connections",
            context.nodes.len(),
            context.relationships.len()
        ),
        json!({
            "nodes": context.nodes.len(),
            "relationships": context.relationships.len(),
        }),
        true,
    );
}

/// Record how the answer was produced.
pub fn record_answer(recorder: &mut TraceRecorder, answer: &SynthesizedAnswer, confidence: f64) {
    recorder.event(
        "answer",
        &format!("answered via {}", answer.plan_summary.join(" > ")),
        json!({
            "stages": answer.plan_summary,
            "multi_pass": answer.multi_pass,
            "flagged": answer.flagged,
            "confidence": confidence,
        }),
        !answer.flagged,
    );
}

/// Seal the trace and, when a directory is configured, store it.
///
/// Storage problems are logged and never fail the run.
pub fn finalize_and_store(
    recorder: TraceRecorder,
    status: WorkflowStatus,
    dir: Option<&Path>,
) -> RunTrace {
    let trace = recorder.finish(&status.to_string());
    let Some(dir) = dir else {
        return trace;
    };

    match FileTraceStore::open(dir) {
        Ok(store) => match store.save(&trace) {
            Ok(path) => tracing::debug!(trace_id = %trace.id, path = %path.display(), "Run trace stored"),
            Err(e) => tracing::warn!(error = %e, "Failed to store run trace"),
        },
        Err(e) => tracing::warn!(error = %e, "Failed to initialize trace store"),
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_trace_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = TraceRecorder::new("s1", "Which patients have diabetes?");
        record_plan(&mut recorder, &["similarity_search".to_string()]);
        record_retrieval(&mut recorder, &[], &SubgraphContext::default(), Some("embedding failed"));

        let trace = finalize_and_store(recorder, WorkflowStatus::Done, Some(dir.path()));
        assert_eq!(trace.status.as_deref(), Some("done"));
        assert_eq!(trace.events.len(), 3);
        assert!(!trace.events[1].success);

        let store = FileTraceStore::open(dir.path()).unwrap();
        let loaded = store.load(trace.id).unwrap();
        assert_eq!(loaded.id, trace.id);
    }

    #[test]
    fn no_directory_means_nothing_is_written() {
        let recorder = TraceRecorder::new("s1", "q");
        let trace = finalize_and_store(recorder, WorkflowStatus::Failed, None);
        assert!(trace.verify_integrity());
    }
}
